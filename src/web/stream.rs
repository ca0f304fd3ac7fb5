//! Credential-hiding stream relay.
//!
//! Resolves an opaque stream key against the active snapshot and proxies
//! the upstream response. The relay never redirects: upstream URLs
//! frequently embed credentials in the path, and a 302 would leak them.
//! The upstream body is streamed, not buffered, with no body timeout;
//! a tune-in can stay open for hours.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use tracing::{info, warn};

use super::{handlers, AppState};
use crate::models::ChannelIndexEntry;
use crate::sources::fetcher::provider_headers;
use crate::utils::UrlUtils;

pub async fn relay_stream(
    Path(stream_key): Path<String>,
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request_headers: HeaderMap,
) -> Response {
    let client_addr = connect_info
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let (provider, entry) = match resolve_stream_key(&state, &stream_key, &client_addr).await {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };

    // Forward the provider's header map and user-agent; pass the client's
    // Range through so catchup and vod seeking work.
    let mut upstream_headers = provider_headers(&provider);
    if let Some(range) = request_headers.get(header::RANGE) {
        upstream_headers.insert(header::RANGE, range.clone());
    }

    let upstream = match state
        .relay_client
        .get(&entry.stream_url)
        .headers(upstream_headers)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(
                "Upstream connect failed for stream {} ({}): {}",
                stream_key,
                UrlUtils::obfuscate_credentials(&entry.stream_url),
                UrlUtils::obfuscate_credentials(&e.to_string())
            );
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    // Mirror status, content type and length; then hand the body stream
    // through until either side closes.
    let status = StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let content_length = upstream
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());

    let key_for_log = stream_key.clone();
    let body_stream = upstream.bytes_stream().inspect(move |chunk| {
        if let Err(e) = chunk {
            // Mid-body termination is a normal end of a tune-in.
            info!("Stream {} ended mid-body: {}", key_for_log, e);
        }
    });

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache");
    if let Some(length) = content_length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    match builder.body(Body::from_stream(body_stream)) {
        Ok(response) => {
            info!("Relaying stream {} to {}", stream_key, client_addr);
            response
        }
        Err(e) => {
            warn!("Failed to build relay response for {}: {}", stream_key, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Look up the stream key in the current active snapshot and return the
/// matched entry together with the provider whose headers the upstream
/// request must carry.
async fn resolve_stream_key(
    state: &AppState,
    stream_key: &str,
    client_addr: &str,
) -> Result<(crate::models::Provider, ChannelIndexEntry), Response> {
    let provider = match state.database.get_active_provider().await {
        Ok(Some(provider)) => provider,
        Ok(None) => return Err(service_unavailable()),
        Err(e) => {
            warn!("Provider lookup failed during relay: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    };
    let profile = match state.database.profile_for_provider(provider.id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => return Err(service_unavailable()),
        Err(e) => {
            warn!("Profile lookup failed during relay: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    };
    let snapshot = match state.database.get_active_snapshot(profile.id).await {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => return Err(service_unavailable()),
        Err(e) => {
            warn!("Snapshot lookup failed during relay: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    };

    let entries = match handlers::read_channel_index(&snapshot).await {
        Ok(entries) => entries,
        Err(response) => return Err(response),
    };

    match entries.into_iter().find(|e| e.stream_key == stream_key) {
        Some(entry) => Ok((provider, entry)),
        None => {
            warn!(
                "Unknown stream key {} requested by {}",
                stream_key, client_addr
            );
            Err(StatusCode::NOT_FOUND.into_response())
        }
    }
}

fn service_unavailable() -> Response {
    Response::builder()
        .status(StatusCode::SERVICE_UNAVAILABLE)
        .header(header::RETRY_AFTER, "60")
        .body(Body::from("no active snapshot"))
        .unwrap_or_else(|_| StatusCode::SERVICE_UNAVAILABLE.into_response())
}
