//! Snapshot assembly and promotion.
//!
//! Two entry points: a full refresh (fetch, reconcile, build) and a
//! build-only cycle that re-publishes from the current catalog, reusing
//! the previous active snapshot's guide file. Either way the artifact is
//! written before the row turns `active`, the promotion is atomic, and a
//! failed fetch leaves the previous active snapshot serving.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SnapshotConfig;
use crate::database::filters::GroupFilterWithName;
use crate::database::Database;
use crate::models::*;
use crate::pipeline::reconcile::{self, tally_groups};
use crate::pipeline::stream_key;
use crate::sources::UpstreamFetcher;

/// Substituted when the provider has no guide source or the guide fetch
/// fails; guide failure never blocks a snapshot.
const EMPTY_GUIDE: &[u8] = b"<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<tv></tv>\n";

const MOVIES_BUCKET: &str = "Movies";
const SERIES_BUCKET: &str = "Series";

/// Result of one refresh or build-only cycle.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub succeeded: bool,
    pub snapshot_id: Option<Uuid>,
    pub error_summary: Option<String>,
}

impl RefreshOutcome {
    pub(crate) fn noop() -> Self {
        Self {
            succeeded: true,
            snapshot_id: None,
            error_summary: None,
        }
    }

    pub(crate) fn published(snapshot_id: Uuid) -> Self {
        Self {
            succeeded: true,
            snapshot_id: Some(snapshot_id),
            error_summary: None,
        }
    }

    pub(crate) fn failed(error_summary: String) -> Self {
        Self {
            succeeded: false,
            snapshot_id: None,
            error_summary: Some(error_summary),
        }
    }
}

enum GuideSource {
    Bytes(Vec<u8>),
    CopyFrom(PathBuf),
}

pub struct RefreshPipeline {
    db: Database,
    fetcher: UpstreamFetcher,
    snapshot_config: SnapshotConfig,
    /// Fetch run currently in flight, so a cancelled run can still be
    /// persisted as failed from a fresh context.
    current_run: Arc<Mutex<Option<Uuid>>>,
}

impl RefreshPipeline {
    pub fn new(db: Database, snapshot_config: SnapshotConfig) -> Self {
        Self {
            db,
            fetcher: UpstreamFetcher::new(),
            snapshot_config,
            current_run: Arc::new(Mutex::new(None)),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The id of the fetch run currently in flight, if any. Used by the
    /// coordinator to fail the run when the deadline cancels it mid-fetch.
    pub fn in_flight_run(&self) -> Option<Uuid> {
        *self.current_run.lock().expect("run tracker poisoned")
    }

    fn set_in_flight(&self, run: Option<Uuid>) {
        *self.current_run.lock().expect("run tracker poisoned") = run;
    }

    /// Forget the in-flight run after its failure has been persisted.
    pub fn clear_in_flight(&self) {
        self.set_in_flight(None);
    }

    /// The unique active and enabled provider plus its lowest-priority
    /// enabled profile. Anything less is a no-op, not an error.
    async fn select_targets(&self) -> Result<Option<(Provider, Profile)>> {
        let Some(provider) = self.db.get_active_provider().await? else {
            return Ok(None);
        };
        if !provider.enabled {
            return Ok(None);
        }
        let Some(profile) = self.db.profile_for_provider(provider.id).await? else {
            return Ok(None);
        };
        Ok(Some((provider, profile)))
    }

    /// Fetch, reconcile and publish a new snapshot.
    pub async fn full_refresh(&self) -> Result<RefreshOutcome> {
        let Some((provider, profile)) = self.select_targets().await? else {
            info!("No active provider with an enabled profile; skipping refresh");
            return Ok(RefreshOutcome::noop());
        };

        let run = self
            .db
            .create_fetch_run(provider.id, FetchRunType::Snapshot)
            .await?;
        self.set_in_flight(Some(run.id));

        let result = self.full_refresh_inner(&provider, &profile, run.id).await;
        self.set_in_flight(None);
        result
    }

    async fn full_refresh_inner(
        &self,
        provider: &Provider,
        profile: &Profile,
        run_id: Uuid,
    ) -> Result<RefreshOutcome> {
        info!(
            "Starting full refresh for provider '{}' -> profile '{}'",
            provider.name, profile.output_name
        );

        let playlist = match self.fetcher.fetch_playlist(provider).await {
            Ok(playlist) => playlist,
            Err(e) => {
                let summary = e.to_string();
                warn!(
                    "Refresh failed for provider '{}': {}; previous snapshot keeps serving",
                    provider.name, summary
                );
                self.db.mark_fetch_run_failed(run_id, &summary).await?;
                return Ok(RefreshOutcome::failed(summary));
            }
        };

        let now = Utc::now();
        if let Err(e) = reconcile::reconcile(
            &self.db,
            provider.id,
            profile.id,
            run_id,
            &playlist.entries,
            now,
        )
        .await
        {
            let summary = format!("reconcile failed: {e}");
            self.db.mark_fetch_run_failed(run_id, &summary).await?;
            return Err(e);
        }

        // Guide failure is recovered locally: an empty guide document
        // stands in and the snapshot is still built.
        let guide_bytes = match &provider.guide_url {
            Some(url) => match self.fetcher.fetch_guide(provider, url).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(
                        "Guide fetch failed for provider '{}', substituting empty guide: {}",
                        provider.name, e
                    );
                    EMPTY_GUIDE.to_vec()
                }
            },
            None => EMPTY_GUIDE.to_vec(),
        };
        let guide_len = guide_bytes.len() as i64;

        let snapshot = match self
            .build_and_promote(provider, profile, GuideSource::Bytes(guide_bytes))
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let summary = format!("snapshot build failed: {e}");
                self.db.mark_fetch_run_failed(run_id, &summary).await?;
                return Ok(RefreshOutcome::failed(summary));
            }
        };

        self.db
            .mark_fetch_run_ok(
                run_id,
                playlist.byte_count as i64,
                guide_len,
                playlist.entries.len() as i64,
            )
            .await?;

        info!(
            "Refresh complete: snapshot {} with {} channels",
            snapshot.id, snapshot.channel_count_published
        );
        Ok(RefreshOutcome::published(snapshot.id))
    }

    /// Re-publish from the current catalog without fetching. The previous
    /// active snapshot's guide file is carried over unchanged.
    pub async fn build_only(&self) -> Result<RefreshOutcome> {
        let Some((provider, profile)) = self.select_targets().await? else {
            info!("No active provider with an enabled profile; skipping build");
            return Ok(RefreshOutcome::noop());
        };

        let guide = match self.db.get_active_snapshot(profile.id).await? {
            Some(prior) => GuideSource::CopyFrom(PathBuf::from(prior.guide_path)),
            None => GuideSource::Bytes(EMPTY_GUIDE.to_vec()),
        };

        let snapshot = self.build_and_promote(&provider, &profile, guide).await?;
        info!(
            "Build-only complete: snapshot {} with {} channels",
            snapshot.id, snapshot.channel_count_published
        );
        Ok(RefreshOutcome::published(snapshot.id))
    }

    /// Operator dry-run: fetch, parse and classify, recording a preview
    /// fetch run, but leave catalog rows and snapshots untouched.
    pub async fn preview(&self, provider_id: Uuid) -> Result<PreviewSummary> {
        let provider = self
            .db
            .get_provider(provider_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("provider {} not found", provider_id))?;

        let run = self
            .db
            .create_fetch_run(provider.id, FetchRunType::Preview)
            .await?;

        let playlist = match self.fetcher.fetch_playlist(&provider).await {
            Ok(playlist) => playlist,
            Err(e) => {
                self.db.mark_fetch_run_failed(run.id, &e.to_string()).await?;
                return Err(e.into());
            }
        };

        self.db
            .mark_fetch_run_ok(
                run.id,
                playlist.byte_count as i64,
                0,
                playlist.entries.len() as i64,
            )
            .await?;

        let groups = tally_groups(&playlist.entries)
            .into_iter()
            .map(|(name, tally)| PreviewGroup {
                name,
                content_kind: tally.content_kind(),
                channel_count: tally.total(),
            })
            .collect();

        Ok(PreviewSummary {
            channel_count: playlist.entries.len(),
            playlist_bytes: playlist.byte_count,
            groups,
        })
    }

    /// Assemble the channel index, write the artifact files, insert the
    /// staged row, promote it, and sweep retention.
    async fn build_and_promote(
        &self,
        provider: &Provider,
        profile: &Profile,
        guide: GuideSource,
    ) -> Result<Snapshot> {
        let channels = self.db.list_publishable_channels(provider).await?;
        let filters = self.db.load_group_filters(profile.id, provider.id).await?;

        let mut overrides: HashMap<Uuid, HashMap<Uuid, ProfileGroupChannelFilter>> =
            HashMap::new();
        for entry in &filters {
            if entry.filter.channel_mode == ChannelMode::Select {
                let per_channel = self
                    .db
                    .load_channel_filters(entry.filter.id)
                    .await?
                    .into_iter()
                    .map(|o| (o.provider_channel_id, o))
                    .collect();
                overrides.insert(entry.filter.id, per_channel);
            }
        }

        let index = assemble_channel_index(profile.id, &channels, &filters, &overrides);

        let snapshot_id = Uuid::new_v4();
        let dir = self
            .snapshot_config
            .directory
            .join(&profile.output_name)
            .join(snapshot_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let channel_index_path = dir.join("channel_index.json");
        let mut body = serde_json::to_vec_pretty(&index)?;
        body.push(b'\n');
        tokio::fs::write(&channel_index_path, &body).await?;

        let guide_path = dir.join("guide.xml");
        match guide {
            GuideSource::Bytes(bytes) => tokio::fs::write(&guide_path, &bytes).await?,
            GuideSource::CopyFrom(prior) => {
                if let Err(e) = tokio::fs::copy(&prior, &guide_path).await {
                    warn!(
                        "Could not carry over prior guide {}: {}; substituting empty guide",
                        prior.display(),
                        e
                    );
                    tokio::fs::write(&guide_path, EMPTY_GUIDE).await?;
                }
            }
        }

        let snapshot = Snapshot {
            id: snapshot_id,
            profile_id: profile.id,
            status: SnapshotStatus::Staged,
            created_at: Utc::now(),
            channel_index_path: channel_index_path.display().to_string(),
            guide_path: guide_path.display().to_string(),
            channel_count_published: index.len() as i64,
            error_summary: None,
        };
        self.db.insert_staged_snapshot(&snapshot).await?;
        self.db.promote_snapshot(profile.id, snapshot_id).await?;
        self.retention_sweep(profile.id).await?;

        Ok(Snapshot {
            status: SnapshotStatus::Active,
            ..snapshot
        })
    }

    /// Delete snapshots beyond the retention count, newest first. The
    /// directory is removed best-effort before the row; an active snapshot
    /// is never touched.
    pub async fn retention_sweep(&self, profile_id: Uuid) -> Result<()> {
        let snapshots = self.db.list_snapshots(profile_id).await?;
        let keep = self.snapshot_config.retention_count as usize;

        for snapshot in snapshots.into_iter().skip(keep) {
            if snapshot.status == SnapshotStatus::Active {
                warn!(
                    "Retention would remove active snapshot {}; skipping",
                    snapshot.id
                );
                continue;
            }

            if let Some(dir) = Path::new(&snapshot.channel_index_path).parent() {
                if let Err(e) = tokio::fs::remove_dir_all(dir).await {
                    warn!(
                        "Failed to remove snapshot directory {}: {}",
                        dir.display(),
                        e
                    );
                }
            }
            self.db.delete_snapshot_row(snapshot.id).await?;
            info!("Retention removed snapshot {}", snapshot.id);
        }

        Ok(())
    }
}

struct Emitted<'a> {
    channel: &'a ProviderChannel,
    output_group: String,
    number: Option<i64>,
    filter: Option<&'a ProfileGroupFilter>,
}

/// Assemble the published channel list from catalog state.
///
/// Live channels are opt-in through an `include` group decision; vod and
/// series channels bypass group decisions and are gated upstream by the
/// provider-level flags, falling back to the literal Movies and Series
/// buckets when their raw group is unknown. Output is deterministic:
/// groups in byte order, explicit numbers first, then name/url order with
/// auto-numbering per parent filter.
pub fn assemble_channel_index(
    profile_id: Uuid,
    channels: &[ProviderChannel],
    filters: &[GroupFilterWithName],
    overrides: &HashMap<Uuid, HashMap<Uuid, ProfileGroupChannelFilter>>,
) -> Vec<ChannelIndexEntry> {
    let filters_by_group: HashMap<&str, &GroupFilterWithName> = filters
        .iter()
        .map(|entry| (entry.group_name.as_str(), entry))
        .collect();

    let mut grouped: BTreeMap<String, Vec<Emitted<'_>>> = BTreeMap::new();

    for channel in channels {
        let raw_group = channel.group_name.as_deref();
        let matched = raw_group.and_then(|g| filters_by_group.get(g).copied());

        let emitted = match channel.content_kind {
            ContentKind::Live => {
                let Some(entry) = matched else {
                    continue;
                };
                if entry.filter.decision != FilterDecision::Include {
                    continue;
                }
                let base_group = entry
                    .filter
                    .output_name
                    .clone()
                    .unwrap_or_else(|| entry.group_name.clone());
                match entry.filter.channel_mode {
                    ChannelMode::All => Emitted {
                        channel,
                        output_group: base_group,
                        number: None,
                        filter: Some(&entry.filter),
                    },
                    ChannelMode::Select => {
                        let Some(row) = overrides
                            .get(&entry.filter.id)
                            .and_then(|m| m.get(&channel.id))
                        else {
                            continue;
                        };
                        Emitted {
                            channel,
                            output_group: row
                                .output_group_name
                                .clone()
                                .unwrap_or(base_group),
                            number: row.channel_number,
                            filter: Some(&entry.filter),
                        }
                    }
                }
            }
            ContentKind::Vod | ContentKind::Series => {
                let bucket = if channel.content_kind == ContentKind::Vod {
                    MOVIES_BUCKET
                } else {
                    SERIES_BUCKET
                };
                let output_group = match matched {
                    Some(entry) => entry
                        .filter
                        .output_name
                        .clone()
                        .unwrap_or_else(|| entry.group_name.clone()),
                    None => bucket.to_string(),
                };
                Emitted {
                    channel,
                    output_group,
                    number: None,
                    filter: matched.map(|entry| &entry.filter),
                }
            }
        };

        grouped.entry(emitted.output_group.clone()).or_default().push(emitted);
    }

    let mut auto_counters: HashMap<Uuid, i64> = HashMap::new();
    let mut index = Vec::new();

    for (_, mut members) in grouped {
        let (mut numbered, mut unnumbered): (Vec<_>, Vec<_>) = {
            let mut numbered = Vec::new();
            let mut unnumbered = Vec::new();
            for member in members.drain(..) {
                if member.number.is_some() {
                    numbered.push(member);
                } else {
                    unnumbered.push(member);
                }
            }
            (numbered, unnumbered)
        };

        numbered.sort_by(|a, b| {
            a.number
                .cmp(&b.number)
                .then_with(|| a.channel.display_name.cmp(&b.channel.display_name))
                .then_with(|| a.channel.stream_url.cmp(&b.channel.stream_url))
        });
        unnumbered.sort_by(|a, b| {
            a.channel
                .display_name
                .cmp(&b.channel.display_name)
                .then_with(|| a.channel.stream_url.cmp(&b.channel.stream_url))
        });

        // Consecutive auto-numbering per parent filter; assignment stops
        // once the configured end would be exceeded.
        for member in &mut unnumbered {
            let Some(filter) = member.filter else { continue };
            let Some(start) = filter.auto_num_start else { continue };
            let next = auto_counters.entry(filter.id).or_insert(start);
            if filter.auto_num_end.map_or(true, |end| *next <= end) {
                member.number = Some(*next);
                *next += 1;
            }
        }

        for member in numbered.into_iter().chain(unnumbered) {
            let channel = member.channel;
            index.push(ChannelIndexEntry {
                stream_key: stream_key::stream_key(
                    channel.tvg_id.as_deref(),
                    &channel.display_name,
                    &channel.stream_url,
                    &member.output_group,
                    profile_id,
                ),
                display_name: channel.display_name.clone(),
                tvg_id: channel.tvg_id.clone(),
                tvg_name: channel.tvg_name.clone(),
                logo_url: channel.logo_url.clone(),
                group_title: Some(member.output_group.clone()),
                tvg_chno: member.number,
                stream_url: channel.stream_url.clone(),
            });
        }
    }

    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn channel(
        name: &str,
        url: &str,
        group: Option<&str>,
        kind: ContentKind,
    ) -> ProviderChannel {
        ProviderChannel {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            stable_key: Some(stream_key::stable_key(None, name, url, group, 1)),
            display_name: name.to_string(),
            tvg_id: None,
            tvg_name: None,
            logo_url: None,
            stream_url: url.to_string(),
            group_name: group.map(str::to_string),
            group_id: None,
            content_kind: kind,
            active: true,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
            last_fetch_run_id: None,
        }
    }

    fn group_filter(
        group_name: &str,
        decision: FilterDecision,
        mode: ChannelMode,
    ) -> GroupFilterWithName {
        GroupFilterWithName {
            filter: ProfileGroupFilter {
                id: Uuid::new_v4(),
                profile_id: Uuid::new_v4(),
                provider_group_id: Uuid::new_v4(),
                decision,
                channel_mode: mode,
                output_name: None,
                auto_num_start: None,
                auto_num_end: None,
                track_new_channels: false,
            },
            group_name: group_name.to_string(),
            group_active: true,
        }
    }

    #[test]
    fn live_channels_are_strictly_opt_in() {
        let profile_id = Uuid::new_v4();
        let channels = vec![
            channel("CNN", "http://x/1.ts", Some("News"), ContentKind::Live),
            channel("BBC", "http://x/2.ts", Some("World"), ContentKind::Live),
            channel("Stray", "http://x/3.ts", None, ContentKind::Live),
        ];
        let filters = vec![
            group_filter("News", FilterDecision::Include, ChannelMode::All),
            group_filter("World", FilterDecision::Pending, ChannelMode::All),
        ];

        let index =
            assemble_channel_index(profile_id, &channels, &filters, &HashMap::new());
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].display_name, "CNN");
        assert_eq!(index[0].group_title.as_deref(), Some("News"));
    }

    #[test]
    fn vod_and_series_bypass_group_decisions() {
        let profile_id = Uuid::new_v4();
        let channels = vec![
            channel("Film A", "http://x/a.mkv", Some("Cinema"), ContentKind::Vod),
            channel("Film B", "http://x/b.mkv", None, ContentKind::Vod),
            channel("Show C", "http://x/c/series/1.mp4", None, ContentKind::Series),
        ];
        // Cinema is excluded, but vod output is gated by provider flags,
        // not group decisions.
        let filters = vec![group_filter(
            "Cinema",
            FilterDecision::Exclude,
            ChannelMode::All,
        )];

        let index =
            assemble_channel_index(profile_id, &channels, &filters, &HashMap::new());
        assert_eq!(index.len(), 3);

        let groups: Vec<_> = index.iter().filter_map(|e| e.group_title.clone()).collect();
        assert!(groups.contains(&"Cinema".to_string()));
        assert!(groups.contains(&"Movies".to_string()));
        assert!(groups.contains(&"Series".to_string()));
    }

    #[test]
    fn select_mode_emits_only_overridden_channels() {
        let profile_id = Uuid::new_v4();
        let picked = channel("Keep", "http://x/1.ts", Some("News"), ContentKind::Live);
        let skipped = channel("Drop", "http://x/2.ts", Some("News"), ContentKind::Live);
        let filter = group_filter("News", FilterDecision::Include, ChannelMode::Select);

        let mut per_channel = HashMap::new();
        per_channel.insert(
            picked.id,
            ProfileGroupChannelFilter {
                id: Uuid::new_v4(),
                group_filter_id: filter.filter.id,
                provider_channel_id: picked.id,
                output_group_name: Some("Headlines".to_string()),
                channel_number: Some(7),
            },
        );
        let mut overrides = HashMap::new();
        overrides.insert(filter.filter.id, per_channel);

        let index = assemble_channel_index(
            profile_id,
            &[picked, skipped],
            &[filter],
            &overrides,
        );
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].display_name, "Keep");
        assert_eq!(index[0].group_title.as_deref(), Some("Headlines"));
        assert_eq!(index[0].tvg_chno, Some(7));
    }

    #[test]
    fn ordering_is_numbered_then_name_then_url() {
        let profile_id = Uuid::new_v4();
        let filter = group_filter("News", FilterDecision::Include, ChannelMode::Select);
        let ch_a = channel("Alpha", "http://x/a.ts", Some("News"), ContentKind::Live);
        let ch_b = channel("Beta", "http://x/b.ts", Some("News"), ContentKind::Live);
        let ch_c = channel("Beta", "http://x/a2.ts", Some("News"), ContentKind::Live);
        let ch_d = channel("Zed", "http://x/z.ts", Some("News"), ContentKind::Live);

        let mut per_channel = HashMap::new();
        for (ch, number) in [(&ch_d, Some(1)), (&ch_a, None), (&ch_b, None), (&ch_c, None)] {
            per_channel.insert(
                ch.id,
                ProfileGroupChannelFilter {
                    id: Uuid::new_v4(),
                    group_filter_id: filter.filter.id,
                    provider_channel_id: ch.id,
                    output_group_name: None,
                    channel_number: number,
                },
            );
        }
        let mut overrides = HashMap::new();
        overrides.insert(filter.filter.id, per_channel);

        let index = assemble_channel_index(
            profile_id,
            &[ch_a, ch_b, ch_c, ch_d],
            &[filter],
            &overrides,
        );

        let names: Vec<&str> = index.iter().map(|e| e.display_name.as_str()).collect();
        // Zed carries the explicit number, then byte order with stream URL
        // breaking the Beta tie.
        assert_eq!(names, vec!["Zed", "Alpha", "Beta", "Beta"]);
        assert_eq!(index[2].stream_url, "http://x/a2.ts");
    }

    #[test]
    fn auto_numbering_stops_at_the_configured_end() {
        let profile_id = Uuid::new_v4();
        let mut filter = group_filter("News", FilterDecision::Include, ChannelMode::All);
        filter.filter.auto_num_start = Some(100);
        filter.filter.auto_num_end = Some(101);

        let channels = vec![
            channel("A", "http://x/a.ts", Some("News"), ContentKind::Live),
            channel("B", "http://x/b.ts", Some("News"), ContentKind::Live),
            channel("C", "http://x/c.ts", Some("News"), ContentKind::Live),
        ];

        let index =
            assemble_channel_index(profile_id, &channels, &[filter], &HashMap::new());
        let numbers: Vec<Option<i64>> = index.iter().map(|e| e.tvg_chno).collect();
        assert_eq!(numbers, vec![Some(100), Some(101), None]);
    }

    #[test]
    fn output_groups_are_emitted_in_byte_order() {
        let profile_id = Uuid::new_v4();
        let channels = vec![
            channel("Z1", "http://x/z.ts", Some("Zulu"), ContentKind::Live),
            channel("A1", "http://x/a.ts", Some("Alpha"), ContentKind::Live),
        ];
        let filters = vec![
            group_filter("Zulu", FilterDecision::Include, ChannelMode::All),
            group_filter("Alpha", FilterDecision::Include, ChannelMode::All),
        ];

        let index =
            assemble_channel_index(profile_id, &channels, &filters, &HashMap::new());
        let groups: Vec<_> = index.iter().filter_map(|e| e.group_title.clone()).collect();
        assert_eq!(groups, vec!["Alpha", "Zulu"]);
    }

    #[test]
    fn output_name_renames_the_published_group() {
        let profile_id = Uuid::new_v4();
        let mut filter = group_filter("raw|news", FilterDecision::Include, ChannelMode::All);
        filter.filter.output_name = Some("News".to_string());

        let channels = vec![channel(
            "CNN",
            "http://x/1.ts",
            Some("raw|news"),
            ContentKind::Live,
        )];
        let index =
            assemble_channel_index(profile_id, &channels, &[filter], &HashMap::new());
        assert_eq!(index[0].group_title.as_deref(), Some("News"));
    }
}
