//! Shared harness for pipeline and endpoint tests: a file-backed catalog
//! in a temp directory, one provider reading a `file://` playlist, and its
//! linked profile.

use tempfile::TempDir;

use m3undle::config::{DatabaseConfig, SnapshotConfig};
use m3undle::database::Database;
use m3undle::models::*;
use m3undle::pipeline::RefreshPipeline;

pub const CNN_LINE: &str =
    "#EXTINF:-1 tvg-id=\"cnn.us\" group-title=\"News\",CNN\nhttp://x/s/1\n";
pub const OTHER_LINE: &str = "#EXTINF:-1,Other\nhttp://x/s/2\n";

pub struct Harness {
    pub db: Database,
    pub pipeline: RefreshPipeline,
    pub provider: Provider,
    pub profile: Profile,
    pub temp: TempDir,
}

impl Harness {
    pub fn playlist_path(&self) -> std::path::PathBuf {
        self.temp.path().join("playlist.m3u")
    }

    pub fn write_playlist(&self, content: &str) {
        std::fs::write(self.playlist_path(), content).unwrap();
    }

    /// Flip one group's filter decision for the harness profile.
    pub async fn set_group_decision(&self, group_name: &str, decision: FilterDecision) {
        let group = self
            .db
            .get_provider_group_by_name(self.provider.id, group_name)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("group {group_name} not in catalog"));
        let mut filter = self
            .db
            .get_group_filter(self.profile.id, group.id)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("no filter for group {group_name}"));
        filter.decision = decision;
        self.db.update_group_filter(&filter).await.unwrap();
    }

    pub async fn active_snapshot(&self) -> Option<Snapshot> {
        self.db.get_active_snapshot(self.profile.id).await.unwrap()
    }

    pub async fn read_channel_index(&self) -> Vec<ChannelIndexEntry> {
        let snapshot = self.active_snapshot().await.expect("no active snapshot");
        let bytes = std::fs::read(&snapshot.channel_index_path).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

pub async fn harness_with_retention(playlist: &str, retention_count: u32) -> Harness {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("playlist.m3u"), playlist).unwrap();

    let db = Database::new(&DatabaseConfig {
        url: format!("sqlite:{}/catalog.db", temp.path().display()),
        max_connections: Some(5),
    })
    .await
    .unwrap();
    db.migrate().await.unwrap();

    let provider = db
        .create_provider(&ProviderCreateRequest {
            name: "p1".to_string(),
            playlist_url: format!("file://{}/playlist.m3u", temp.path().display()),
            guide_url: None,
            request_headers: None,
            user_agent: None,
            timeout_seconds: 30,
            include_vod: false,
            include_series: false,
        })
        .await
        .unwrap();
    db.set_provider_active(provider.id).await.unwrap();
    let provider = db.get_provider(provider.id).await.unwrap().unwrap();

    let profile = db.create_profile("Default", "m3undle").await.unwrap();
    db.link_profile_provider(profile.id, provider.id, 0)
        .await
        .unwrap();

    let pipeline = RefreshPipeline::new(
        db.clone(),
        SnapshotConfig {
            directory: temp.path().join("snapshots"),
            retention_count,
        },
    );

    Harness {
        db,
        pipeline,
        provider,
        profile,
        temp,
    }
}

pub async fn harness(playlist: &str) -> Harness {
    harness_with_retention(playlist, 3).await
}
