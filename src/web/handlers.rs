use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use super::AppState;
use crate::models::*;

const RETRY_AFTER_SECONDS: &str = "60";

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Dispatch `/<output>.m3u` and `/<output>.xml` on the file extension.
pub async fn serve_lineup_file(
    Path(file): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let Some((stem, extension)) = file.rsplit_once('.') else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match extension {
        "m3u" => serve_playlist(&state, stem).await,
        "xml" => serve_guide(&state, stem).await,
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Resolve the active snapshot for an output name, or the appropriate
/// error response.
async fn active_snapshot_for(
    state: &AppState,
    output_name: &str,
) -> Result<(Profile, Snapshot), Response> {
    let profile = match state.database.get_profile_by_output_name(output_name).await {
        Ok(Some(profile)) => profile,
        Ok(None) => return Err(StatusCode::NOT_FOUND.into_response()),
        Err(e) => {
            error!("Profile lookup failed for '{}': {}", output_name, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    };

    match state.database.get_active_snapshot(profile.id).await {
        Ok(Some(snapshot)) => Ok((profile, snapshot)),
        Ok(None) => Err(no_active_snapshot_response()),
        Err(e) => {
            error!("Snapshot lookup failed for '{}': {}", output_name, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

fn no_active_snapshot_response() -> Response {
    Response::builder()
        .status(StatusCode::SERVICE_UNAVAILABLE)
        .header(header::RETRY_AFTER, RETRY_AFTER_SECONDS)
        .body(Body::from("no active snapshot"))
        .unwrap_or_else(|_| StatusCode::SERVICE_UNAVAILABLE.into_response())
}

/// Read and decode the active snapshot's channel index. A corrupt index on
/// an active snapshot degrades to 503 rather than crashing the endpoint.
pub(super) async fn read_channel_index(
    snapshot: &Snapshot,
) -> Result<Vec<ChannelIndexEntry>, Response> {
    let bytes = match tokio::fs::read(&snapshot.channel_index_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(
                "Channel index missing for active snapshot {}: {}",
                snapshot.id, e
            );
            return Err(no_active_snapshot_response());
        }
    };

    serde_json::from_slice(&bytes).map_err(|e| {
        error!(
            "Channel index corrupt for active snapshot {}: {}",
            snapshot.id, e
        );
        no_active_snapshot_response()
    })
}

async fn serve_playlist(state: &AppState, output_name: &str) -> Response {
    let (_, snapshot) = match active_snapshot_for(state, output_name).await {
        Ok(found) => found,
        Err(response) => return response,
    };
    let entries = match read_channel_index(&snapshot).await {
        Ok(entries) => entries,
        Err(response) => return response,
    };

    let body = render_playlist(&state.config.web.base_url, output_name, &entries);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-mpegurl; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Render the extended-M3U document. Upstream URLs never appear here; each
/// stanza points at the opaque `/stream/<key>` relay.
fn render_playlist(base_url: &str, output_name: &str, entries: &[ChannelIndexEntry]) -> String {
    let base = base_url.trim_end_matches('/');
    let guide_url = format!("{base}/{output_name}.xml");

    let mut m3u = format!("#EXTM3U url-tvg=\"{guide_url}\" x-tvg-url=\"{guide_url}\"\n");

    for entry in entries {
        let mut extinf = String::from("#EXTINF:-1");

        if let Some(tvg_id) = &entry.tvg_id {
            extinf.push_str(&format!(" tvg-id=\"{tvg_id}\""));
        }
        let tvg_name = entry.tvg_name.as_deref().unwrap_or(&entry.display_name);
        extinf.push_str(&format!(" tvg-name=\"{tvg_name}\""));
        if let Some(logo) = &entry.logo_url {
            extinf.push_str(&format!(" tvg-logo=\"{logo}\""));
        }
        if let Some(group) = &entry.group_title {
            extinf.push_str(&format!(" group-title=\"{group}\""));
        }
        if let Some(number) = entry.tvg_chno {
            extinf.push_str(&format!(" tvg-chno=\"{number}\""));
        }
        extinf.push_str(&format!(",{}\n", entry.display_name));

        m3u.push_str(&extinf);
        m3u.push_str(&format!("{base}/stream/{}\n", entry.stream_key));
    }

    m3u
}

async fn serve_guide(state: &AppState, output_name: &str) -> Response {
    let (_, snapshot) = match active_snapshot_for(state, output_name).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    match tokio::fs::read(&snapshot.guide_path).await {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/xml; charset=utf-8")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from(bytes))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => {
            warn!(
                "Guide file missing for active snapshot {}: {}",
                snapshot.id, e
            );
            no_active_snapshot_response()
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusDocument {
    status: &'static str,
    lineups: Vec<LineupStatus>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LineupStatus {
    name: String,
    status: &'static str,
    active_provider: Option<ProviderRef>,
    active_snapshot: Option<SnapshotRef>,
    last_refresh: Option<RefreshRef>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProviderRef {
    id: Uuid,
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRef {
    id: Uuid,
    profile_id: Uuid,
    created_utc: chrono::DateTime<chrono::Utc>,
    channel_count_published: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRef {
    status: String,
    started_utc: chrono::DateTime<chrono::Utc>,
    finished_utc: Option<chrono::DateTime<chrono::Utc>>,
    channel_count_seen: i64,
    playlist_bytes: i64,
    guide_bytes: i64,
    error_summary: Option<String>,
}

/// Lineup status document: `ok`, `degraded` (active snapshot but the most
/// recent fetch run failed) or `no_active_snapshot`.
pub async fn status(State(state): State<AppState>) -> Response {
    match build_status(&state).await {
        Ok(document) => Json(document).into_response(),
        Err(e) => {
            error!("Status document failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn build_status(state: &AppState) -> anyhow::Result<StatusDocument> {
    let Some(provider) = state.database.get_active_provider().await? else {
        return Ok(StatusDocument {
            status: "no_active_snapshot",
            lineups: Vec::new(),
        });
    };
    let Some(profile) = state.database.profile_for_provider(provider.id).await? else {
        return Ok(StatusDocument {
            status: "no_active_snapshot",
            lineups: Vec::new(),
        });
    };

    let snapshot = state.database.get_active_snapshot(profile.id).await?;
    let last_run = state.database.latest_snapshot_run(provider.id).await?;

    let lineup_status = match (&snapshot, &last_run) {
        (None, _) => "no_active_snapshot",
        (Some(_), Some(run)) if run.status == FetchRunStatus::Fail => "degraded",
        (Some(_), _) => "ok",
    };

    let lineup = LineupStatus {
        name: profile.output_name.clone(),
        status: lineup_status,
        active_provider: Some(ProviderRef {
            id: provider.id,
            name: provider.name.clone(),
        }),
        active_snapshot: snapshot.map(|s| SnapshotRef {
            id: s.id,
            profile_id: s.profile_id,
            created_utc: s.created_at,
            channel_count_published: s.channel_count_published,
        }),
        last_refresh: last_run.map(|run| RefreshRef {
            status: run.status.as_str().to_string(),
            started_utc: run.started_at,
            finished_utc: run.finished_at,
            channel_count_seen: run.channel_count_seen,
            playlist_bytes: run.playlist_bytes,
            guide_bytes: run.guide_bytes,
            error_summary: run.error_summary,
        }),
    };

    Ok(StatusDocument {
        status: lineup_status,
        lineups: vec![lineup],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, name: &str, group: Option<&str>, number: Option<i64>) -> ChannelIndexEntry {
        ChannelIndexEntry {
            stream_key: key.to_string(),
            display_name: name.to_string(),
            tvg_id: Some(format!("{name}.id")),
            tvg_name: None,
            logo_url: None,
            group_title: group.map(str::to_string),
            tvg_chno: number,
            stream_url: "http://up/user1/pass1/stream.ts".to_string(),
        }
    }

    #[test]
    fn playlist_render_hides_upstream_urls() {
        let entries = vec![entry("abc123", "CNN", Some("News"), Some(5))];
        let body = render_playlist("http://localhost:8080/", "m3undle", &entries);

        assert!(body.starts_with(
            "#EXTM3U url-tvg=\"http://localhost:8080/m3undle.xml\" \
             x-tvg-url=\"http://localhost:8080/m3undle.xml\"\n"
        ));
        assert!(body.contains(
            "#EXTINF:-1 tvg-id=\"CNN.id\" tvg-name=\"CNN\" group-title=\"News\" tvg-chno=\"5\",CNN\n"
        ));
        assert!(body.contains("http://localhost:8080/stream/abc123\n"));
        assert!(!body.contains("http://up/"));
        assert!(!body.contains('\r'));
    }

    #[test]
    fn playlist_render_omits_absent_attributes() {
        let mut plain = entry("k", "Ch", None, None);
        plain.tvg_id = None;
        let body = render_playlist("http://h", "out", &[plain]);
        assert!(body.contains("#EXTINF:-1 tvg-name=\"Ch\",Ch\n"));
        assert!(!body.contains("tvg-chno"));
        assert!(!body.contains("group-title"));
    }

    #[test]
    fn tvg_name_falls_back_to_display_name() {
        let mut named = entry("k", "Ch", None, None);
        named.tvg_name = Some("Proper Name".to_string());
        let body = render_playlist("http://h", "out", &[named]);
        assert!(body.contains("tvg-name=\"Proper Name\""));
    }
}
