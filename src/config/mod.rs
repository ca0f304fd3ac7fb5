use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub refresh: RefreshConfig,
    pub snapshot: SnapshotConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    /// External base URL used for absolute `url-tvg` and `/stream/<key>`
    /// URLs in the rendered playlist.
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Schedule-loop sleep between automatic full refreshes.
    pub interval_hours: u64,
    /// Hard deadline for a single refresh run.
    pub timeout_minutes: u64,
    /// Sleep before the first automatic refresh after startup.
    pub startup_delay_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Root for snapshot artifact directories:
    /// `<directory>/<output_name>/<snapshot_id>/{channel_index.json, guide.xml}`.
    pub directory: PathBuf,
    /// Per-profile snapshot retention; older rows and their directories
    /// are swept after each promotion.
    pub retention_count: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://./m3undle.db".to_string(),
                max_connections: Some(10),
            },
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            refresh: RefreshConfig {
                interval_hours: 4,
                timeout_minutes: 5,
                startup_delay_seconds: 30,
            },
            snapshot: SnapshotConfig {
                directory: PathBuf::from("./data/snapshots"),
                retention_count: 3,
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::create_dir_all(&default_config.snapshot.directory)?;
            std::fs::write(path, contents)?;
            Ok(default_config)
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours * 3600)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes * 60)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_seconds)
    }
}
