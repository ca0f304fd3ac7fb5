use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use super::{parse_datetime, Database};
use crate::models::*;

fn snapshot_from_row(row: &SqliteRow) -> Result<Snapshot> {
    let status_str: String = row.get("status");

    Ok(Snapshot {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        profile_id: Uuid::parse_str(&row.get::<String, _>("profile_id"))?,
        status: SnapshotStatus::parse(&status_str)
            .ok_or_else(|| anyhow::anyhow!("unknown snapshot status: {}", status_str))?,
        created_at: parse_datetime(&row.get::<String, _>("created_at"))?,
        channel_index_path: row.get("channel_index_path"),
        guide_path: row.get("guide_path"),
        channel_count_published: row.get("channel_count_published"),
        error_summary: row.get("error_summary"),
    })
}

const SNAPSHOT_COLUMNS: &str = "id, profile_id, status, created_at, channel_index_path,
     guide_path, channel_count_published, error_summary";

impl Database {
    /// Insert a new snapshot row in `staged` state. Artifact files must
    /// already exist at the recorded paths.
    pub async fn insert_staged_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        sqlx::query(
            "INSERT INTO snapshots
             (id, profile_id, status, created_at, channel_index_path, guide_path,
              channel_count_published, error_summary)
             VALUES (?, ?, 'staged', ?, ?, ?, ?, ?)",
        )
        .bind(snapshot.id.to_string())
        .bind(snapshot.profile_id.to_string())
        .bind(snapshot.created_at.to_rfc3339())
        .bind(&snapshot.channel_index_path)
        .bind(&snapshot.guide_path)
        .bind(snapshot.channel_count_published)
        .bind(&snapshot.error_summary)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Atomic promotion: archive any currently active snapshot of this
    /// profile and activate the staged one, in a single transaction. No
    /// concurrent reader ever observes zero or two active snapshots.
    pub async fn promote_snapshot(&self, profile_id: Uuid, snapshot_id: Uuid) -> Result<()> {
        let mut transaction = self.pool().begin().await?;

        sqlx::query(
            "UPDATE snapshots SET status = 'archived'
             WHERE profile_id = ? AND status = 'active'",
        )
        .bind(profile_id.to_string())
        .execute(&mut *transaction)
        .await?;

        sqlx::query("UPDATE snapshots SET status = 'active' WHERE id = ?")
            .bind(snapshot_id.to_string())
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;
        info!("Snapshot {} promoted to active", snapshot_id);
        Ok(())
    }

    pub async fn get_active_snapshot(&self, profile_id: Uuid) -> Result<Option<Snapshot>> {
        let row = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
             WHERE profile_id = ? AND status = 'active'"
        ))
        .bind(profile_id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    pub async fn get_snapshot(&self, id: Uuid) -> Result<Option<Snapshot>> {
        let row = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    /// All snapshots of a profile, newest first.
    pub async fn list_snapshots(&self, profile_id: Uuid) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
             WHERE profile_id = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(profile_id.to_string())
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(snapshot_from_row).collect()
    }

    pub async fn delete_snapshot_row(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM snapshots WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
