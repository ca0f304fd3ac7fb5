use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{parse_datetime, Database};
use crate::models::*;

fn group_from_row(row: &SqliteRow) -> Result<ProviderGroup> {
    let kind_str: String = row.get("content_kind");
    Ok(ProviderGroup {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        provider_id: Uuid::parse_str(&row.get::<String, _>("provider_id"))?,
        name: row.get("name"),
        content_kind: GroupContentKind::parse(&kind_str)
            .ok_or_else(|| anyhow::anyhow!("unknown group content kind: {}", kind_str))?,
        channel_count: row.get("channel_count"),
        active: row.get("active"),
        first_seen_at: parse_datetime(&row.get::<String, _>("first_seen_at"))?,
        last_seen_at: parse_datetime(&row.get::<String, _>("last_seen_at"))?,
    })
}

impl Database {
    /// Upsert one observed group under its raw-name identity. Returns the
    /// row id. Reconcile-scoped: runs on the caller's transaction.
    pub async fn upsert_provider_group(
        &self,
        conn: &mut SqliteConnection,
        provider_id: Uuid,
        name: &str,
        content_kind: GroupContentKind,
        channel_count: i64,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM provider_groups WHERE provider_id = ? AND name = ?",
        )
        .bind(provider_id.to_string())
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(id) = existing {
            sqlx::query(
                "UPDATE provider_groups
                 SET last_seen_at = ?, active = 1, channel_count = ?, content_kind = ?
                 WHERE id = ?",
            )
            .bind(now.to_rfc3339())
            .bind(channel_count)
            .bind(content_kind.as_str())
            .bind(&id)
            .execute(&mut *conn)
            .await?;
            return Ok(Uuid::parse_str(&id)?);
        }

        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO provider_groups
             (id, provider_id, name, content_kind, channel_count, active, first_seen_at, last_seen_at)
             VALUES (?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(id.to_string())
        .bind(provider_id.to_string())
        .bind(name)
        .bind(content_kind.as_str())
        .bind(channel_count)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *conn)
        .await?;

        Ok(id)
    }

    /// Deactivate groups of this provider whose raw name is absent from the
    /// current fetch. Rows are never deleted.
    pub async fn deactivate_groups_not_seen(
        &self,
        conn: &mut SqliteConnection,
        provider_id: Uuid,
        seen_names: &std::collections::HashSet<String>,
    ) -> Result<u64> {
        let rows = sqlx::query(
            "SELECT id, name FROM provider_groups WHERE provider_id = ? AND active = 1",
        )
        .bind(provider_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

        let mut deactivated = 0;
        for row in rows {
            let name: String = row.get("name");
            if seen_names.contains(&name) {
                continue;
            }
            let id: String = row.get("id");
            sqlx::query(
                "UPDATE provider_groups SET active = 0, channel_count = 0 WHERE id = ?",
            )
            .bind(&id)
            .execute(&mut *conn)
            .await?;
            deactivated += 1;
        }

        Ok(deactivated)
    }

    pub async fn list_provider_groups(&self, provider_id: Uuid) -> Result<Vec<ProviderGroup>> {
        let rows = sqlx::query(
            "SELECT id, provider_id, name, content_kind, channel_count, active,
                    first_seen_at, last_seen_at
             FROM provider_groups WHERE provider_id = ? ORDER BY name",
        )
        .bind(provider_id.to_string())
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(group_from_row).collect()
    }

    pub async fn get_provider_group_by_name(
        &self,
        provider_id: Uuid,
        name: &str,
    ) -> Result<Option<ProviderGroup>> {
        let row = sqlx::query(
            "SELECT id, provider_id, name, content_kind, channel_count, active,
                    first_seen_at, last_seen_at
             FROM provider_groups WHERE provider_id = ? AND name = ?",
        )
        .bind(provider_id.to_string())
        .bind(name)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(group_from_row).transpose()
    }
}
