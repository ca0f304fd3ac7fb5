//! Catalog reconciliation.
//!
//! Merges one fetch's parsed entries into the catalog: group upsert and
//! deactivation, pending-filter backfill, channel upsert under stable
//! identities, and channel deactivation. The five steps run strictly in
//! order inside a single transaction, and the whole sequence is idempotent
//! apart from `last_seen` timestamps.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::channels::ChannelUpsert;
use crate::database::Database;
use crate::ingestor::ParsedEntry;
use crate::models::*;
use crate::pipeline::stream_key;

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub groups_seen: usize,
    pub groups_deactivated: u64,
    pub filters_created: u64,
    pub channels_seen: usize,
    pub channels_skipped_excluded: usize,
    pub channels_deactivated: u64,
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct GroupTally {
    live: usize,
    vod: usize,
    series: usize,
}

impl GroupTally {
    fn add(&mut self, kind: ContentKind) {
        match kind {
            ContentKind::Live => self.live += 1,
            ContentKind::Vod => self.vod += 1,
            ContentKind::Series => self.series += 1,
        }
    }

    pub(crate) fn total(&self) -> usize {
        self.live + self.vod + self.series
    }

    /// Homogeneous tallies keep their kind; combinations are `mixed`;
    /// an empty tally defaults to live.
    pub(crate) fn content_kind(&self) -> GroupContentKind {
        let kinds_present = [self.live, self.vod, self.series]
            .iter()
            .filter(|&&n| n > 0)
            .count();
        match kinds_present {
            0 => GroupContentKind::Live,
            1 if self.live > 0 => GroupContentKind::Live,
            1 if self.vod > 0 => GroupContentKind::Vod,
            1 => GroupContentKind::Series,
            _ => GroupContentKind::Mixed,
        }
    }
}

/// Aggregate entries by raw group title. Entries without a group belong to
/// no provider group; their channels keep a NULL group reference.
pub(crate) fn tally_groups(entries: &[ParsedEntry]) -> BTreeMap<String, GroupTally> {
    let mut tallies: BTreeMap<String, GroupTally> = BTreeMap::new();
    for entry in entries {
        if let Some(group) = entry.group_title.as_deref() {
            let group = group.trim();
            if group.is_empty() {
                continue;
            }
            tallies
                .entry(group.to_string())
                .or_default()
                .add(entry.content_kind);
        }
    }
    tallies
}

/// Merge one fetch's entries into the catalog for `provider_id`, creating
/// pending filters under `profile_id` for newly seen groups.
pub async fn reconcile(
    db: &Database,
    provider_id: Uuid,
    profile_id: Uuid,
    fetch_run_id: Uuid,
    entries: &[ParsedEntry],
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome> {
    let mut outcome = ReconcileOutcome::default();
    let mut transaction = db.pool().begin().await?;
    let conn = &mut *transaction;

    // Step 1: group upsert.
    let tallies = tally_groups(entries);
    let mut group_ids: HashMap<String, Uuid> = HashMap::new();
    for (name, tally) in &tallies {
        let group_id = db
            .upsert_provider_group(
                conn,
                provider_id,
                name,
                tally.content_kind(),
                tally.total() as i64,
                now,
            )
            .await?;
        group_ids.insert(name.clone(), group_id);
    }
    outcome.groups_seen = tallies.len();

    // Step 2: deactivate groups absent from this fetch.
    let seen_names: HashSet<String> = tallies.keys().cloned().collect();
    outcome.groups_deactivated = db
        .deactivate_groups_not_seen(conn, provider_id, &seen_names)
        .await?;

    // Step 3: pending-filter backfill, before channels so the excluded-group
    // skip below observes a complete filter set.
    outcome.filters_created = db
        .backfill_pending_group_filters(conn, profile_id, provider_id)
        .await?;

    // Step 4: channel upsert under stable identities.
    let excluded = db
        .excluded_group_names(conn, profile_id, provider_id)
        .await?;
    let mut occurrences: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        if entry.display_name.trim().is_empty() || entry.stream_url.trim().is_empty() {
            continue;
        }

        let group = entry
            .group_title
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty());

        // Count repeats of the bare identity so exact-duplicate playlist
        // lines survive under distinct keys.
        let bare_identity = stream_key::channel_identity(
            entry.tvg_id.as_deref(),
            &entry.display_name,
            &entry.stream_url,
            group,
            1,
        );
        let occurrence = {
            let counter = occurrences.entry(bare_identity).or_insert(0);
            *counter += 1;
            *counter
        };

        if let Some(group_name) = group {
            if excluded.contains(group_name) {
                outcome.channels_skipped_excluded += 1;
                continue;
            }
        }

        let key = stream_key::stable_key(
            entry.tvg_id.as_deref(),
            &entry.display_name,
            &entry.stream_url,
            group,
            occurrence,
        );

        let upsert = ChannelUpsert {
            stable_key: &key,
            display_name: &entry.display_name,
            tvg_id: entry.tvg_id.as_deref(),
            tvg_name: entry.tvg_name.as_deref(),
            logo_url: entry.tvg_logo.as_deref(),
            stream_url: &entry.stream_url,
            group_name: group,
            group_id: group.and_then(|g| group_ids.get(g).copied()),
            content_kind: entry.content_kind,
        };
        db.upsert_provider_channel(conn, provider_id, &upsert, fetch_run_id, now)
            .await?;
        outcome.channels_seen += 1;
    }

    // Step 5: deactivate channels not observed by this fetch.
    outcome.channels_deactivated = db
        .deactivate_channels_not_in_run(conn, provider_id, fetch_run_id)
        .await?;

    transaction.commit().await?;

    info!(
        "Reconciled provider {}: {} groups ({} deactivated), {} channels ({} deactivated, {} skipped as excluded), {} new pending filters",
        provider_id,
        outcome.groups_seen,
        outcome.groups_deactivated,
        outcome.channels_seen,
        outcome.channels_deactivated,
        outcome.channels_skipped_excluded,
        outcome.filters_created,
    );
    debug!("Reconcile outcome: {:?}", outcome);

    Ok(outcome)
}
