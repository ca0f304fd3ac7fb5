use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Content classification for a single channel, derived purely from its
/// stream URL. Governs whether the channel is subject to group-decision
/// filtering (live) or to the provider-level include flags (vod, series).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Live,
    Vod,
    Series,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Live => "live",
            ContentKind::Vod => "vod",
            ContentKind::Series => "series",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "live" => Some(ContentKind::Live),
            "vod" => Some(ContentKind::Vod),
            "series" => Some(ContentKind::Series),
            _ => None,
        }
    }
}

/// Content label for a provider group: the channel kind seen in it, or
/// `mixed` when a fetch produced a combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupContentKind {
    Live,
    Vod,
    Series,
    Mixed,
}

impl GroupContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupContentKind::Live => "live",
            GroupContentKind::Vod => "vod",
            GroupContentKind::Series => "series",
            GroupContentKind::Mixed => "mixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "live" => Some(GroupContentKind::Live),
            "vod" => Some(GroupContentKind::Vod),
            "series" => Some(GroupContentKind::Series),
            "mixed" => Some(GroupContentKind::Mixed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterDecision {
    Pending,
    Include,
    Exclude,
}

impl FilterDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterDecision::Pending => "pending",
            FilterDecision::Include => "include",
            FilterDecision::Exclude => "exclude",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FilterDecision::Pending),
            "include" => Some(FilterDecision::Include),
            "exclude" => Some(FilterDecision::Exclude),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    All,
    Select,
}

impl ChannelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelMode::All => "all",
            ChannelMode::Select => "select",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(ChannelMode::All),
            "select" => Some(ChannelMode::Select),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchRunType {
    Snapshot,
    Preview,
}

impl FetchRunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchRunType::Snapshot => "snapshot",
            FetchRunType::Preview => "preview",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "snapshot" => Some(FetchRunType::Snapshot),
            "preview" => Some(FetchRunType::Preview),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchRunStatus {
    Running,
    Ok,
    Fail,
}

impl FetchRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchRunStatus::Running => "running",
            FetchRunStatus::Ok => "ok",
            FetchRunStatus::Fail => "fail",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(FetchRunStatus::Running),
            "ok" => Some(FetchRunStatus::Ok),
            "fail" => Some(FetchRunStatus::Fail),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Staged,
    Active,
    Archived,
}

impl SnapshotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotStatus::Staged => "staged",
            SnapshotStatus::Active => "active",
            SnapshotStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "staged" => Some(SnapshotStatus::Staged),
            "active" => Some(SnapshotStatus::Active),
            "archived" => Some(SnapshotStatus::Archived),
            _ => None,
        }
    }
}

/// An upstream playlist provider. Edited from the admin boundary; the core
/// only reads these rows, apart from the two-step activation helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub name: String,
    pub playlist_url: String,
    pub guide_url: Option<String>,
    pub request_headers: Option<HashMap<String, String>>,
    pub user_agent: Option<String>,
    pub timeout_seconds: u32,
    pub enabled: bool,
    pub is_active: bool,
    pub include_vod: bool,
    pub include_series: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCreateRequest {
    pub name: String,
    pub playlist_url: String,
    pub guide_url: Option<String>,
    pub request_headers: Option<HashMap<String, String>>,
    pub user_agent: Option<String>,
    pub timeout_seconds: u32,
    pub include_vod: bool,
    pub include_series: bool,
}

/// A published lineup. `output_name` is the client-facing file stem
/// (`/<output_name>.m3u`, `/<output_name>.xml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub output_name: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ordered association between a profile and a provider; lowest priority
/// wins when the core picks "the" profile for the active provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileProvider {
    pub profile_id: Uuid,
    pub provider_id: Uuid,
    pub priority: i32,
    pub enabled: bool,
}

/// A group as observed upstream. Created and updated only by the
/// reconciler; never deleted, absence is expressed via `active = false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderGroup {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub name: String,
    pub content_kind: GroupContentKind,
    pub channel_count: i64,
    pub active: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// A channel as observed upstream, keyed by its stable hash key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderChannel {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub stable_key: Option<String>,
    pub display_name: String,
    pub tvg_id: Option<String>,
    pub tvg_name: Option<String>,
    pub logo_url: Option<String>,
    pub stream_url: String,
    pub group_name: Option<String>,
    pub group_id: Option<Uuid>,
    pub content_kind: ContentKind,
    pub active: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_fetch_run_id: Option<Uuid>,
}

/// Per-group publishing decision for a profile. Newly seen groups get a
/// `pending` row during reconcile and stay out of the output until an
/// operator decides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileGroupFilter {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub provider_group_id: Uuid,
    pub decision: FilterDecision,
    pub channel_mode: ChannelMode,
    pub output_name: Option<String>,
    pub auto_num_start: Option<i64>,
    pub auto_num_end: Option<i64>,
    pub track_new_channels: bool,
}

/// Per-channel override under a `select`-mode group filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileGroupChannelFilter {
    pub id: Uuid,
    pub group_filter_id: Uuid,
    pub provider_channel_id: Uuid,
    pub output_group_name: Option<String>,
    pub channel_number: Option<i64>,
}

/// One fetch attempt against a provider. A crash leaves a run as
/// `running`; the next start performs no recovery, the stale row remains
/// as an operator-visible trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRun {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub run_type: FetchRunType,
    pub status: FetchRunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub playlist_bytes: i64,
    pub guide_bytes: i64,
    pub channel_count_seen: i64,
    pub error_summary: Option<String>,
}

/// A published artifact set: channel index JSON plus guide XML on disk,
/// tracked through staged -> active -> archived -> deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub status: SnapshotStatus,
    pub created_at: DateTime<Utc>,
    pub channel_index_path: String,
    pub guide_path: String,
    pub channel_count_published: i64,
    pub error_summary: Option<String>,
}

/// One emitted channel in `channel_index.json`. The stream key is the
/// opaque token clients see; the resolved upstream URL never leaves the
/// server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelIndexEntry {
    pub stream_key: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvg_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvg_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvg_chno: Option<i64>,
    pub stream_url: String,
}

/// Summary returned by a preview run: fetch + parse + classify without
/// touching catalog rows or snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewSummary {
    pub channel_count: usize,
    pub playlist_bytes: u64,
    pub groups: Vec<PreviewGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewGroup {
    pub name: String,
    pub content_kind: GroupContentKind,
    pub channel_count: usize,
}
