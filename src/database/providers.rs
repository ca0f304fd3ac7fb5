use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use super::{parse_datetime, with_retry, Database};
use crate::models::*;

fn provider_from_row(row: &SqliteRow) -> Result<Provider> {
    let headers_json: Option<String> = row.get("request_headers");
    let request_headers = headers_json
        .map(|s| serde_json::from_str(&s))
        .transpose()?;

    Ok(Provider {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        name: row.get("name"),
        playlist_url: row.get("playlist_url"),
        guide_url: row.get("guide_url"),
        request_headers,
        user_agent: row.get("user_agent"),
        timeout_seconds: row.get::<i64, _>("timeout_seconds") as u32,
        enabled: row.get("enabled"),
        is_active: row.get("is_active"),
        include_vod: row.get("include_vod"),
        include_series: row.get("include_series"),
        created_at: parse_datetime(&row.get::<String, _>("created_at"))?,
        updated_at: parse_datetime(&row.get::<String, _>("updated_at"))?,
    })
}

fn profile_from_row(row: &SqliteRow) -> Result<Profile> {
    Ok(Profile {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        name: row.get("name"),
        output_name: row.get("output_name"),
        enabled: row.get("enabled"),
        created_at: parse_datetime(&row.get::<String, _>("created_at"))?,
        updated_at: parse_datetime(&row.get::<String, _>("updated_at"))?,
    })
}

const PROVIDER_COLUMNS: &str = "id, name, playlist_url, guide_url, request_headers, user_agent,
     timeout_seconds, enabled, is_active, include_vod, include_series, created_at, updated_at";

impl Database {
    pub async fn create_provider(&self, request: &ProviderCreateRequest) -> Result<Provider> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let headers_json = request
            .request_headers
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        // Per-request timeout is clamped to the supported 1-300s window.
        let timeout_seconds = request.timeout_seconds.clamp(1, 300);

        info!("Creating provider '{}' ({})", request.name, id);

        sqlx::query(
            "INSERT INTO providers
             (id, name, playlist_url, guide_url, request_headers, user_agent,
              timeout_seconds, enabled, is_active, include_vod, include_series,
              created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 1, 0, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&request.name)
        .bind(&request.playlist_url)
        .bind(&request.guide_url)
        .bind(&headers_json)
        .bind(&request.user_agent)
        .bind(timeout_seconds as i64)
        .bind(request.include_vod)
        .bind(request.include_series)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(self.pool())
        .await?;

        self.get_provider(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("provider {} vanished after insert", id))
    }

    pub async fn get_provider(&self, id: Uuid) -> Result<Option<Provider>> {
        let row = sqlx::query(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM providers WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(provider_from_row).transpose()
    }

    /// The provider currently flagged active, if any. Callers that build
    /// output additionally require `enabled`.
    pub async fn get_active_provider(&self) -> Result<Option<Provider>> {
        let row = sqlx::query(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM providers WHERE is_active = 1"
        ))
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(provider_from_row).transpose()
    }

    /// Make `id` the active provider.
    ///
    /// Two separate statements: the partial unique index on `is_active` is
    /// evaluated per statement, so clear-then-set is required; a combined
    /// swap would conflict against the constraint.
    pub async fn set_provider_active(&self, id: Uuid) -> Result<()> {
        let pool = self.pool().clone();
        with_retry("set_provider_active", || {
            let pool = pool.clone();
            let id = id.to_string();
            async move {
                sqlx::query("UPDATE providers SET is_active = 0 WHERE is_active = 1")
                    .execute(&pool)
                    .await?;
                sqlx::query("UPDATE providers SET is_active = 1, updated_at = ? WHERE id = ?")
                    .bind(Utc::now().to_rfc3339())
                    .bind(&id)
                    .execute(&pool)
                    .await?;
                Ok(())
            }
        })
        .await?;

        info!("Provider {} is now active", id);
        Ok(())
    }

    pub async fn set_provider_enabled(&self, id: Uuid, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE providers SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn create_profile(&self, name: &str, output_name: &str) -> Result<Profile> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO profiles (id, name, output_name, enabled, created_at, updated_at)
             VALUES (?, ?, ?, 1, ?, ?)",
        )
        .bind(id.to_string())
        .bind(name)
        .bind(output_name)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(self.pool())
        .await?;

        self.get_profile(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("profile {} vanished after insert", id))
    }

    pub async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        let row = sqlx::query(
            "SELECT id, name, output_name, enabled, created_at, updated_at
             FROM profiles WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    pub async fn get_profile_by_output_name(&self, output_name: &str) -> Result<Option<Profile>> {
        let row = sqlx::query(
            "SELECT id, name, output_name, enabled, created_at, updated_at
             FROM profiles WHERE output_name = ?",
        )
        .bind(output_name)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    pub async fn link_profile_provider(
        &self,
        profile_id: Uuid,
        provider_id: Uuid,
        priority: i32,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO profile_providers (profile_id, provider_id, priority, enabled)
             VALUES (?, ?, ?, 1)
             ON CONFLICT(profile_id, provider_id) DO UPDATE SET priority = excluded.priority",
        )
        .bind(profile_id.to_string())
        .bind(provider_id.to_string())
        .bind(priority)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// The enabled profile associated with this provider, lowest priority
    /// first. This is "the" profile the refresh pipeline publishes.
    pub async fn profile_for_provider(&self, provider_id: Uuid) -> Result<Option<Profile>> {
        let row = sqlx::query(
            "SELECT p.id, p.name, p.output_name, p.enabled, p.created_at, p.updated_at
             FROM profiles p
             JOIN profile_providers pp ON pp.profile_id = p.id
             WHERE pp.provider_id = ? AND pp.enabled = 1 AND p.enabled = 1
             ORDER BY pp.priority ASC, p.name ASC
             LIMIT 1",
        )
        .bind(provider_id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(profile_from_row).transpose()
    }
}
