use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::{parse_datetime, Database};
use crate::models::*;

fn channel_from_row(row: &SqliteRow) -> Result<ProviderChannel> {
    let kind_str: String = row.get("content_kind");
    let group_id: Option<String> = row.get("group_id");
    let last_run: Option<String> = row.get("last_fetch_run_id");

    Ok(ProviderChannel {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        provider_id: Uuid::parse_str(&row.get::<String, _>("provider_id"))?,
        stable_key: row.get("stable_key"),
        display_name: row.get("display_name"),
        tvg_id: row.get("tvg_id"),
        tvg_name: row.get("tvg_name"),
        logo_url: row.get("logo_url"),
        stream_url: row.get("stream_url"),
        group_name: row.get("group_name"),
        group_id: group_id.map(|s| Uuid::parse_str(&s)).transpose()?,
        content_kind: ContentKind::parse(&kind_str)
            .ok_or_else(|| anyhow::anyhow!("unknown channel content kind: {}", kind_str))?,
        active: row.get("active"),
        first_seen_at: parse_datetime(&row.get::<String, _>("first_seen_at"))?,
        last_seen_at: parse_datetime(&row.get::<String, _>("last_seen_at"))?,
        last_fetch_run_id: last_run.map(|s| Uuid::parse_str(&s)).transpose()?,
    })
}

const CHANNEL_COLUMNS: &str = "id, provider_id, stable_key, display_name, tvg_id, tvg_name,
     logo_url, stream_url, group_name, group_id, content_kind, active,
     first_seen_at, last_seen_at, last_fetch_run_id";

/// Field set the reconciler refreshes on every observation of a channel.
pub struct ChannelUpsert<'a> {
    pub stable_key: &'a str,
    pub display_name: &'a str,
    pub tvg_id: Option<&'a str>,
    pub tvg_name: Option<&'a str>,
    pub logo_url: Option<&'a str>,
    pub stream_url: &'a str,
    pub group_name: Option<&'a str>,
    pub group_id: Option<Uuid>,
    pub content_kind: ContentKind,
}

impl Database {
    /// Upsert one observed channel keyed by its stable hash key.
    /// Reconcile-scoped: runs on the caller's transaction.
    pub async fn upsert_provider_channel(
        &self,
        conn: &mut SqliteConnection,
        provider_id: Uuid,
        upsert: &ChannelUpsert<'_>,
        fetch_run_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM provider_channels WHERE provider_id = ? AND stable_key = ?",
        )
        .bind(provider_id.to_string())
        .bind(upsert.stable_key)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(id) = existing {
            sqlx::query(
                "UPDATE provider_channels
                 SET display_name = ?, tvg_id = ?, tvg_name = ?, logo_url = ?,
                     stream_url = ?, group_name = ?, group_id = ?, content_kind = ?,
                     active = 1, last_seen_at = ?, last_fetch_run_id = ?
                 WHERE id = ?",
            )
            .bind(upsert.display_name)
            .bind(upsert.tvg_id)
            .bind(upsert.tvg_name)
            .bind(upsert.logo_url)
            .bind(upsert.stream_url)
            .bind(upsert.group_name)
            .bind(upsert.group_id.map(|g| g.to_string()))
            .bind(upsert.content_kind.as_str())
            .bind(now.to_rfc3339())
            .bind(fetch_run_id.to_string())
            .bind(&id)
            .execute(&mut *conn)
            .await?;
            return Ok(Uuid::parse_str(&id)?);
        }

        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO provider_channels
             (id, provider_id, stable_key, display_name, tvg_id, tvg_name, logo_url,
              stream_url, group_name, group_id, content_kind, active,
              first_seen_at, last_seen_at, last_fetch_run_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(provider_id.to_string())
        .bind(upsert.stable_key)
        .bind(upsert.display_name)
        .bind(upsert.tvg_id)
        .bind(upsert.tvg_name)
        .bind(upsert.logo_url)
        .bind(upsert.stream_url)
        .bind(upsert.group_name)
        .bind(upsert.group_id.map(|g| g.to_string()))
        .bind(upsert.content_kind.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(fetch_run_id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(id)
    }

    /// Deactivate every channel of this provider that was not observed by
    /// the given fetch run. Step 4 stamps `last_fetch_run_id` on each
    /// observed row, so the sweep is a single statement.
    pub async fn deactivate_channels_not_in_run(
        &self,
        conn: &mut SqliteConnection,
        provider_id: Uuid,
        fetch_run_id: Uuid,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE provider_channels SET active = 0
             WHERE provider_id = ? AND active = 1
               AND (last_fetch_run_id IS NULL OR last_fetch_run_id != ?)",
        )
        .bind(provider_id.to_string())
        .bind(fetch_run_id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Channels eligible for snapshot assembly: active, and either live or
    /// gated in by the provider-level vod/series flags.
    pub async fn list_publishable_channels(
        &self,
        provider: &Provider,
    ) -> Result<Vec<ProviderChannel>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM provider_channels
             WHERE provider_id = ? AND active = 1
             ORDER BY display_name, stream_url"
        ))
        .bind(provider.id.to_string())
        .fetch_all(self.pool())
        .await?;

        let mut channels = Vec::with_capacity(rows.len());
        for row in &rows {
            let channel = channel_from_row(row)?;
            let eligible = match channel.content_kind {
                ContentKind::Live => true,
                ContentKind::Vod => provider.include_vod,
                ContentKind::Series => provider.include_series,
            };
            if eligible {
                channels.push(channel);
            }
        }

        Ok(channels)
    }

    pub async fn get_channel_by_stable_key(
        &self,
        provider_id: Uuid,
        stable_key: &str,
    ) -> Result<Option<ProviderChannel>> {
        let row = sqlx::query(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM provider_channels
             WHERE provider_id = ? AND stable_key = ?"
        ))
        .bind(provider_id.to_string())
        .bind(stable_key)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(channel_from_row).transpose()
    }

    pub async fn list_provider_channels(&self, provider_id: Uuid) -> Result<Vec<ProviderChannel>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM provider_channels
             WHERE provider_id = ? ORDER BY display_name, stream_url"
        ))
        .bind(provider_id.to_string())
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(channel_from_row).collect()
    }
}
