//! Upstream document retrieval.
//!
//! Given a provider, returns either a parsed playlist or a guide document.
//! http(s) URLs get a single GET with the provider's header map, optional
//! user-agent, and per-request timeout enforced as a hard deadline;
//! `file://` URLs are read from the local filesystem. URLs may contain
//! `${VAR}` placeholders resolved against the process environment.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::errors::FetchError;
use crate::ingestor::{ParsedEntry, PlaylistParser};
use crate::models::Provider;
use crate::utils::UrlUtils;

/// A parsed playlist with the size of the document it came from.
#[derive(Debug)]
pub struct FetchedPlaylist {
    pub entries: Vec<ParsedEntry>,
    pub byte_count: u64,
}

pub struct UpstreamFetcher {
    client: Client,
}

impl Default for UpstreamFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamFetcher {
    pub fn new() -> Self {
        // The per-provider deadline is applied per request; the client
        // itself only bounds connection establishment.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }

    /// Fetch and parse the provider's playlist. Stream URLs in the result
    /// are normalized (https on literal port 80 becomes http).
    pub async fn fetch_playlist(
        &self,
        provider: &Provider,
    ) -> Result<FetchedPlaylist, FetchError> {
        let (bytes, resolved_url) = self.fetch_bytes(provider, &provider.playlist_url).await?;
        let byte_count = bytes.len() as u64;

        let content = String::from_utf8_lossy(&bytes);
        let mut entries = PlaylistParser::parse(&content)
            .map_err(|e| FetchError::parse(&resolved_url, e.to_string()))?;

        for entry in &mut entries {
            entry.stream_url = UrlUtils::normalize_port_80_scheme(&entry.stream_url);
        }

        debug!(
            "Fetched playlist for provider '{}': {} bytes, {} entries",
            provider.name,
            byte_count,
            entries.len()
        );

        Ok(FetchedPlaylist {
            entries,
            byte_count,
        })
    }

    /// Fetch the provider's guide document. The caller decides what a
    /// missing or failed guide means; this method only reports.
    pub async fn fetch_guide(&self, provider: &Provider, url: &str) -> Result<Vec<u8>, FetchError> {
        let (bytes, _) = self.fetch_bytes(provider, url).await?;
        debug!(
            "Fetched guide for provider '{}': {} bytes",
            provider.name,
            bytes.len()
        );
        Ok(bytes)
    }

    /// Retrieve raw bytes from an http(s) or file URL. Returns the bytes
    /// together with the resolved URL used for error reporting.
    async fn fetch_bytes(
        &self,
        provider: &Provider,
        raw_url: &str,
    ) -> Result<(Vec<u8>, String), FetchError> {
        let resolved = UrlUtils::substitute_env_vars(raw_url).map_err(|var| {
            FetchError::fetch(raw_url, format!("unresolved environment variable ${{{var}}}"))
        })?;
        let resolved = UrlUtils::normalize_port_80_scheme(&resolved);

        let parsed = Url::parse(&resolved)
            .map_err(|e| FetchError::fetch(&resolved, format!("invalid URL: {e}")))?;

        let bytes = match parsed.scheme() {
            "file" => {
                let path = parsed.to_file_path().map_err(|_| {
                    FetchError::fetch(&resolved, "file URL has no usable path".to_string())
                })?;
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| FetchError::fetch(&resolved, e.to_string()))?
            }
            "http" | "https" => self.fetch_http(provider, &resolved).await?,
            other => {
                return Err(FetchError::fetch(
                    &resolved,
                    format!("unsupported URL scheme: {other}"),
                ))
            }
        };

        Ok((bytes, resolved))
    }

    async fn fetch_http(&self, provider: &Provider, url: &str) -> Result<Vec<u8>, FetchError> {
        let timeout = Duration::from_secs(u64::from(provider.timeout_seconds.clamp(1, 300)));

        let response = self
            .client
            .get(url)
            .headers(provider_headers(provider))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                FetchError::fetch(
                    UrlUtils::obfuscate_credentials(url),
                    UrlUtils::obfuscate_credentials(&e.to_string()),
                )
            })?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::fetch(
                UrlUtils::obfuscate_credentials(url),
                format!(
                    "HTTP {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::fetch(UrlUtils::obfuscate_credentials(url), e.to_string()))?;

        Ok(bytes.to_vec())
    }
}

/// Header map forwarded on every upstream request for a provider: the
/// configured header map plus the optional user-agent override.
pub fn provider_headers(provider: &Provider) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(map) = &provider.request_headers {
        for (name, value) in map {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(
                    "Provider '{}': skipping invalid request header '{}'",
                    provider.name, name
                ),
            }
        }
    }

    if let Some(user_agent) = &provider.user_agent {
        if let Ok(value) = HeaderValue::from_str(user_agent) {
            headers.insert(USER_AGENT, value);
        }
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Write;
    use uuid::Uuid;

    fn file_provider(playlist_url: String) -> Provider {
        Provider {
            id: Uuid::new_v4(),
            name: "test".to_string(),
            playlist_url,
            guide_url: None,
            request_headers: None,
            user_agent: None,
            timeout_seconds: 30,
            enabled: true,
            is_active: true,
            include_vod: false,
            include_series: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn reads_playlists_from_file_urls() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "#EXTM3U\n#EXTINF:-1 group-title=\"News\",CNN\nhttp://x/s/1\n"
        )
        .unwrap();

        let fetcher = UpstreamFetcher::new();
        let provider = file_provider(format!("file://{}", file.path().display()));
        let playlist = fetcher.fetch_playlist(&provider).await.unwrap();

        assert_eq!(playlist.entries.len(), 1);
        assert_eq!(playlist.entries[0].display_name, "CNN");
        assert!(playlist.byte_count > 0);
    }

    #[tokio::test]
    async fn missing_file_is_a_fetch_failure() {
        let fetcher = UpstreamFetcher::new();
        let provider = file_provider("file:///nonexistent/playlist.m3u".to_string());
        match fetcher.fetch_playlist(&provider).await {
            Err(FetchError::FetchFailed { .. }) => {}
            other => panic!("expected FetchFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_content_is_a_parse_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<html>not a playlist</html>").unwrap();

        let fetcher = UpstreamFetcher::new();
        let provider = file_provider(format!("file://{}", file.path().display()));
        match fetcher.fetch_playlist(&provider).await {
            Err(FetchError::ParseFailed { .. }) => {}
            other => panic!("expected ParseFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unresolved_env_var_is_a_fetch_failure() {
        let fetcher = UpstreamFetcher::new();
        let provider = file_provider("http://x/${M3UNDLE_MISSING_VAR}/p.m3u".to_string());
        match fetcher.fetch_playlist(&provider).await {
            Err(FetchError::FetchFailed { message, .. }) => {
                assert!(message.contains("M3UNDLE_MISSING_VAR"));
            }
            other => panic!("expected FetchFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn entry_stream_urls_are_normalized() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "#EXTM3U\n#EXTINF:-1,Ch\nhttps://up.example.com:80/live/u/p/1.ts\n"
        )
        .unwrap();

        let fetcher = UpstreamFetcher::new();
        let provider = file_provider(format!("file://{}", file.path().display()));
        let playlist = fetcher.fetch_playlist(&provider).await.unwrap();
        assert_eq!(
            playlist.entries[0].stream_url,
            "http://up.example.com:80/live/u/p/1.ts"
        );
    }
}
