use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::Database;
use crate::models::*;

fn filter_from_row(row: &SqliteRow) -> Result<ProfileGroupFilter> {
    let decision_str: String = row.get("decision");
    let mode_str: String = row.get("channel_mode");

    Ok(ProfileGroupFilter {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        profile_id: Uuid::parse_str(&row.get::<String, _>("profile_id"))?,
        provider_group_id: Uuid::parse_str(&row.get::<String, _>("provider_group_id"))?,
        decision: FilterDecision::parse(&decision_str)
            .ok_or_else(|| anyhow::anyhow!("unknown filter decision: {}", decision_str))?,
        channel_mode: ChannelMode::parse(&mode_str)
            .ok_or_else(|| anyhow::anyhow!("unknown channel mode: {}", mode_str))?,
        output_name: row.get("output_name"),
        auto_num_start: row.get("auto_num_start"),
        auto_num_end: row.get("auto_num_end"),
        track_new_channels: row.get("track_new_channels"),
    })
}

/// A group filter joined with the raw name of the group it governs; the
/// snapshot builder works in raw-name space.
#[derive(Debug, Clone)]
pub struct GroupFilterWithName {
    pub filter: ProfileGroupFilter,
    pub group_name: String,
    pub group_active: bool,
}

impl Database {
    /// Insert a `pending` filter for every group of this provider that the
    /// profile has not decided on yet. This is how new groups surface to
    /// the operator. Reconcile-scoped: runs on the caller's transaction.
    pub async fn backfill_pending_group_filters(
        &self,
        conn: &mut SqliteConnection,
        profile_id: Uuid,
        provider_id: Uuid,
    ) -> Result<u64> {
        let missing: Vec<String> = sqlx::query_scalar(
            "SELECT g.id FROM provider_groups g
             WHERE g.provider_id = ?
               AND NOT EXISTS (
                   SELECT 1 FROM profile_group_filters f
                   WHERE f.profile_id = ? AND f.provider_group_id = g.id
               )",
        )
        .bind(provider_id.to_string())
        .bind(profile_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

        for group_id in &missing {
            sqlx::query(
                "INSERT INTO profile_group_filters
                 (id, profile_id, provider_group_id, decision, channel_mode, track_new_channels)
                 VALUES (?, ?, ?, 'pending', 'all', 0)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(profile_id.to_string())
            .bind(group_id)
            .execute(&mut *conn)
            .await?;
        }

        Ok(missing.len() as u64)
    }

    /// Raw names of this provider's groups whose filter decision is
    /// `exclude` under the given profile. Reconcile skips their channels.
    pub async fn excluded_group_names(
        &self,
        conn: &mut SqliteConnection,
        profile_id: Uuid,
        provider_id: Uuid,
    ) -> Result<std::collections::HashSet<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT g.name FROM provider_groups g
             JOIN profile_group_filters f ON f.provider_group_id = g.id
             WHERE g.provider_id = ? AND f.profile_id = ? AND f.decision = 'exclude'",
        )
        .bind(provider_id.to_string())
        .bind(profile_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

        Ok(names.into_iter().collect())
    }

    /// All group filters for this profile/provider pair, joined to the raw
    /// group name.
    pub async fn load_group_filters(
        &self,
        profile_id: Uuid,
        provider_id: Uuid,
    ) -> Result<Vec<GroupFilterWithName>> {
        let rows = sqlx::query(
            "SELECT f.id, f.profile_id, f.provider_group_id, f.decision, f.channel_mode,
                    f.output_name, f.auto_num_start, f.auto_num_end, f.track_new_channels,
                    g.name AS group_name, g.active AS group_active
             FROM profile_group_filters f
             JOIN provider_groups g ON g.id = f.provider_group_id
             WHERE f.profile_id = ? AND g.provider_id = ?",
        )
        .bind(profile_id.to_string())
        .bind(provider_id.to_string())
        .fetch_all(self.pool())
        .await?;

        let mut filters = Vec::with_capacity(rows.len());
        for row in &rows {
            filters.push(GroupFilterWithName {
                filter: filter_from_row(row)?,
                group_name: row.get("group_name"),
                group_active: row.get("group_active"),
            });
        }

        Ok(filters)
    }

    pub async fn get_group_filter(
        &self,
        profile_id: Uuid,
        provider_group_id: Uuid,
    ) -> Result<Option<ProfileGroupFilter>> {
        let row = sqlx::query(
            "SELECT id, profile_id, provider_group_id, decision, channel_mode,
                    output_name, auto_num_start, auto_num_end, track_new_channels
             FROM profile_group_filters
             WHERE profile_id = ? AND provider_group_id = ?",
        )
        .bind(profile_id.to_string())
        .bind(provider_group_id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(filter_from_row).transpose()
    }

    /// Admin-boundary write: update a filter's decision and output shaping.
    pub async fn update_group_filter(&self, filter: &ProfileGroupFilter) -> Result<()> {
        sqlx::query(
            "UPDATE profile_group_filters
             SET decision = ?, channel_mode = ?, output_name = ?,
                 auto_num_start = ?, auto_num_end = ?, track_new_channels = ?
             WHERE id = ?",
        )
        .bind(filter.decision.as_str())
        .bind(filter.channel_mode.as_str())
        .bind(&filter.output_name)
        .bind(filter.auto_num_start)
        .bind(filter.auto_num_end)
        .bind(filter.track_new_channels)
        .bind(filter.id.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Admin-boundary write: add or update a per-channel override under a
    /// `select`-mode group filter.
    pub async fn upsert_channel_filter(
        &self,
        group_filter_id: Uuid,
        provider_channel_id: Uuid,
        output_group_name: Option<&str>,
        channel_number: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO profile_group_channel_filters
             (id, group_filter_id, provider_channel_id, output_group_name, channel_number)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(group_filter_id, provider_channel_id)
             DO UPDATE SET output_group_name = excluded.output_group_name,
                           channel_number = excluded.channel_number",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(group_filter_id.to_string())
        .bind(provider_channel_id.to_string())
        .bind(output_group_name)
        .bind(channel_number)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Per-channel overrides for one group filter.
    pub async fn load_channel_filters(
        &self,
        group_filter_id: Uuid,
    ) -> Result<Vec<ProfileGroupChannelFilter>> {
        let rows = sqlx::query(
            "SELECT id, group_filter_id, provider_channel_id, output_group_name, channel_number
             FROM profile_group_channel_filters WHERE group_filter_id = ?",
        )
        .bind(group_filter_id.to_string())
        .fetch_all(self.pool())
        .await?;

        let mut overrides = Vec::with_capacity(rows.len());
        for row in rows {
            overrides.push(ProfileGroupChannelFilter {
                id: Uuid::parse_str(&row.get::<String, _>("id"))?,
                group_filter_id: Uuid::parse_str(&row.get::<String, _>("group_filter_id"))?,
                provider_channel_id: Uuid::parse_str(
                    &row.get::<String, _>("provider_channel_id"),
                )?,
                output_group_name: row.get("output_group_name"),
                channel_number: row.get("channel_number"),
            });
        }

        Ok(overrides)
    }
}
