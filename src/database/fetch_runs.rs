use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::{parse_datetime, Database};
use crate::models::*;

fn run_from_row(row: &SqliteRow) -> Result<FetchRun> {
    let type_str: String = row.get("run_type");
    let status_str: String = row.get("status");
    let finished_at: Option<String> = row.get("finished_at");

    Ok(FetchRun {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        provider_id: Uuid::parse_str(&row.get::<String, _>("provider_id"))?,
        run_type: FetchRunType::parse(&type_str)
            .ok_or_else(|| anyhow::anyhow!("unknown fetch run type: {}", type_str))?,
        status: FetchRunStatus::parse(&status_str)
            .ok_or_else(|| anyhow::anyhow!("unknown fetch run status: {}", status_str))?,
        started_at: parse_datetime(&row.get::<String, _>("started_at"))?,
        finished_at: finished_at.map(|s| parse_datetime(&s)).transpose()?,
        playlist_bytes: row.get("playlist_bytes"),
        guide_bytes: row.get("guide_bytes"),
        channel_count_seen: row.get("channel_count_seen"),
        error_summary: row.get("error_summary"),
    })
}

const RUN_COLUMNS: &str = "id, provider_id, run_type, status, started_at, finished_at,
     playlist_bytes, guide_bytes, channel_count_seen, error_summary";

impl Database {
    /// Create a run in `running` state. A crash between here and the final
    /// mark leaves the row as `running`, which is the intended trace.
    pub async fn create_fetch_run(
        &self,
        provider_id: Uuid,
        run_type: FetchRunType,
    ) -> Result<FetchRun> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO fetch_runs (id, provider_id, run_type, status, started_at)
             VALUES (?, ?, ?, 'running', ?)",
        )
        .bind(id.to_string())
        .bind(provider_id.to_string())
        .bind(run_type.as_str())
        .bind(now.to_rfc3339())
        .execute(self.pool())
        .await?;

        self.get_fetch_run(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("fetch run {} vanished after insert", id))
    }

    pub async fn mark_fetch_run_ok(
        &self,
        id: Uuid,
        playlist_bytes: i64,
        guide_bytes: i64,
        channel_count_seen: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE fetch_runs
             SET status = 'ok', finished_at = ?, playlist_bytes = ?, guide_bytes = ?,
                 channel_count_seen = ?
             WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(playlist_bytes)
        .bind(guide_bytes)
        .bind(channel_count_seen)
        .bind(id.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn mark_fetch_run_failed(&self, id: Uuid, error_summary: &str) -> Result<()> {
        sqlx::query(
            "UPDATE fetch_runs SET status = 'fail', finished_at = ?, error_summary = ?
             WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(error_summary)
        .bind(id.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_fetch_run(&self, id: Uuid) -> Result<Option<FetchRun>> {
        let row = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM fetch_runs WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(run_from_row).transpose()
    }

    /// Most recent snapshot-type run for a provider; previews are an
    /// operator dry-run and do not count as "the last refresh".
    pub async fn latest_snapshot_run(&self, provider_id: Uuid) -> Result<Option<FetchRun>> {
        let row = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM fetch_runs
             WHERE provider_id = ? AND run_type = 'snapshot'
             ORDER BY started_at DESC, id DESC LIMIT 1"
        ))
        .bind(provider_id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(run_from_row).transpose()
    }

    pub async fn count_fetch_runs(&self, provider_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM fetch_runs WHERE provider_id = ?")
            .bind(provider_id.to_string())
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}
