//! Read-endpoint contracts: playlist render, guide passthrough, status
//! document and the credential-hiding stream relay, driven through the
//! router with `tower::ServiceExt::oneshot`.

mod common;

use std::collections::HashMap;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use common::{harness, Harness, CNN_LINE};
use m3undle::config::Config;
use m3undle::models::*;
use m3undle::web::{AppState, WebServer};

fn router_for(h: &Harness) -> Router {
    let mut config = Config::default();
    config.web.base_url = "http://lineup.test".to_string();
    WebServer::create_router(AppState::new(config, h.db.clone()))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, headers, body)
}

fn playlist(lines: &[&str]) -> String {
    let mut doc = String::from("#EXTM3U\n");
    for line in lines {
        doc.push_str(line);
    }
    doc
}

#[tokio::test]
async fn reads_return_503_with_retry_after_before_first_snapshot() {
    let h = harness(&playlist(&[CNN_LINE])).await;
    let app = router_for(&h);

    for uri in ["/m3undle.m3u", "/m3undle.xml", "/stream/whatever"] {
        let (status, headers, _) = get(&app, uri).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        assert_eq!(
            headers.get(header::RETRY_AFTER).unwrap().to_str().unwrap(),
            "60",
            "{uri}"
        );
    }

    let (status, _, body) = get(&app, "/status").await;
    assert_eq!(status, StatusCode::OK);
    let document: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(document["status"], "no_active_snapshot");
}

#[tokio::test]
async fn unknown_output_name_is_not_found() {
    let h = harness(&playlist(&[CNN_LINE])).await;
    let app = router_for(&h);

    let (status, _, _) = get(&app, "/nope.m3u").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = get(&app, "/m3undle.mp4").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn playlist_renders_relay_urls_only() {
    let h = harness(&playlist(&[CNN_LINE])).await;
    h.pipeline.full_refresh().await.unwrap();
    h.set_group_decision("News", FilterDecision::Include).await;
    h.pipeline.full_refresh().await.unwrap();

    let app = router_for(&h);
    let (status, headers, body) = get(&app, "/m3undle.m3u").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap().to_str().unwrap(),
        "application/x-mpegurl; charset=utf-8"
    );

    let body = String::from_utf8(body).unwrap();
    assert!(body.starts_with("#EXTM3U url-tvg=\"http://lineup.test/m3undle.xml\""));
    assert!(body.contains("tvg-id=\"cnn.us\""));
    assert!(body.contains(",CNN\n"));
    assert!(body.contains("http://lineup.test/stream/"));
    // The upstream URL never appears in client output.
    assert!(!body.contains("http://x/s/1"));
}

#[tokio::test]
async fn guide_is_served_verbatim_as_xml() {
    let h = harness(&playlist(&[CNN_LINE])).await;
    h.pipeline.full_refresh().await.unwrap();

    let app = router_for(&h);
    let (status, headers, body) = get(&app, "/m3undle.xml").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap().to_str().unwrap(),
        "application/xml; charset=utf-8"
    );

    let snapshot = h.active_snapshot().await.unwrap();
    let on_disk = std::fs::read(&snapshot.guide_path).unwrap();
    assert_eq!(body, on_disk);
}

#[tokio::test]
async fn status_reports_ok_then_degraded() {
    let h = harness(&playlist(&[CNN_LINE])).await;
    h.pipeline.full_refresh().await.unwrap();
    h.set_group_decision("News", FilterDecision::Include).await;
    h.pipeline.full_refresh().await.unwrap();

    let app = router_for(&h);
    let (_, _, body) = get(&app, "/status").await;
    let document: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(document["status"], "ok");
    let lineup = &document["lineups"][0];
    assert_eq!(lineup["name"], "m3undle");
    assert_eq!(lineup["activeProvider"]["name"], "p1");
    assert_eq!(lineup["activeSnapshot"]["channelCountPublished"], 1);
    assert_eq!(lineup["lastRefresh"]["status"], "ok");

    // Upstream failure degrades the lineup but keeps the snapshot.
    let snapshot_before = h.active_snapshot().await.unwrap();
    std::fs::remove_file(h.playlist_path()).unwrap();
    let outcome = h.pipeline.full_refresh().await.unwrap();
    assert!(!outcome.succeeded);

    let (_, _, body) = get(&app, "/status").await;
    let document: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(document["status"], "degraded");
    let lineup = &document["lineups"][0];
    assert_eq!(lineup["lastRefresh"]["status"], "fail");
    assert!(lineup["lastRefresh"]["errorSummary"].is_string());
    assert_eq!(
        lineup["activeSnapshot"]["id"],
        snapshot_before.id.to_string()
    );
}

#[tokio::test]
async fn unknown_stream_key_is_not_found() {
    let h = harness(&playlist(&[CNN_LINE])).await;
    h.pipeline.full_refresh().await.unwrap();

    let app = router_for(&h);
    let (status, _, _) = get(&app, "/stream/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Local upstream that records what the relay forwarded: serves a fixed
/// payload on the credentialed path and echoes selected request headers.
async fn spawn_upstream() -> std::net::SocketAddr {
    use axum::extract::Request as AxumRequest;
    use axum::routing::get as axum_get;

    async fn stream_handler(request: AxumRequest) -> impl axum::response::IntoResponse {
        let token = request
            .headers()
            .get("x-token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        let range = request
            .headers()
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();

        (
            [(header::CONTENT_TYPE, "video/mp2t")],
            format!("PAYLOAD|{token}|{user_agent}|{range}"),
        )
    }

    let app = Router::new().route("/user1/pass1/stream.ts", axum_get(stream_handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn relay_harness(upstream: std::net::SocketAddr) -> Harness {
    let stream_line = format!(
        "#EXTINF:-1 group-title=\"News\",Secret\nhttp://{upstream}/user1/pass1/stream.ts\n"
    );
    let mut h = harness(&playlist(&[&stream_line])).await;

    // Swap in a provider that carries a header map and user-agent.
    let mut request_headers = HashMap::new();
    request_headers.insert("x-token".to_string(), "tok123".to_string());
    let provider = h
        .db
        .create_provider(&ProviderCreateRequest {
            name: "relay-upstream".to_string(),
            playlist_url: h.provider.playlist_url.clone(),
            guide_url: None,
            request_headers: Some(request_headers),
            user_agent: Some("m3undle-relay-test".to_string()),
            timeout_seconds: 5,
            include_vod: false,
            include_series: false,
        })
        .await
        .unwrap();
    h.db.set_provider_active(provider.id).await.unwrap();
    h.db.link_profile_provider(h.profile.id, provider.id, 0)
        .await
        .unwrap();
    h.provider = h.db.get_provider(provider.id).await.unwrap().unwrap();

    h.pipeline.full_refresh().await.unwrap();
    h.set_group_decision("News", FilterDecision::Include).await;
    h.pipeline.full_refresh().await.unwrap();
    h
}

#[tokio::test]
async fn relay_proxies_upstream_without_redirecting() {
    let upstream = spawn_upstream().await;
    let h = relay_harness(upstream).await;

    let index = h.read_channel_index().await;
    assert_eq!(index.len(), 1);
    let stream_key = &index[0].stream_key;

    let app = router_for(&h);
    let (status, headers, body) = get(&app, &format!("/stream/{stream_key}")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(header::LOCATION).is_none(), "relay must not redirect");
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap().to_str().unwrap(),
        "video/mp2t"
    );

    // Byte-for-byte upstream body, with the provider's header map and
    // user-agent forwarded on the upstream request.
    let body = String::from_utf8(body).unwrap();
    assert_eq!(body, "PAYLOAD|tok123|m3undle-relay-test|-");
}

#[tokio::test]
async fn relay_forwards_the_client_range_header() {
    let upstream = spawn_upstream().await;
    let h = relay_harness(upstream).await;
    let stream_key = h.read_channel_index().await[0].stream_key.clone();

    let app = router_for(&h);
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri(format!("/stream/{stream_key}"))
                .header(header::RANGE, "bytes=0-99")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.ends_with("|bytes=0-99"));
}

#[tokio::test]
async fn relay_returns_502_when_upstream_is_down() {
    // Reserve a port, then free it so the connect is refused.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = listener.local_addr().unwrap();
    drop(listener);

    let h = relay_harness(spawn_upstream().await).await;

    // Rewrite the published index to point at the dead upstream; the entry
    // resolves but the connection fails before any response.
    let snapshot = h.active_snapshot().await.unwrap();
    let mut index: Vec<ChannelIndexEntry> =
        serde_json::from_slice(&std::fs::read(&snapshot.channel_index_path).unwrap()).unwrap();
    index[0].stream_url = format!("http://{dead_addr}/user1/pass1/stream.ts");
    std::fs::write(
        &snapshot.channel_index_path,
        serde_json::to_vec_pretty(&index).unwrap(),
    )
    .unwrap();

    let app = router_for(&h);
    let (status, _, _) = get(&app, &format!("/stream/{}", index[0].stream_key)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn corrupt_channel_index_degrades_to_503() {
    let h = harness(&playlist(&[CNN_LINE])).await;
    h.pipeline.full_refresh().await.unwrap();

    let snapshot = h.active_snapshot().await.unwrap();
    std::fs::write(&snapshot.channel_index_path, b"{not json").unwrap();

    let app = router_for(&h);
    let (status, headers, _) = get(&app, "/m3undle.m3u").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(headers.get(header::RETRY_AFTER).is_some());
}

#[tokio::test]
async fn health_endpoint_is_always_up() {
    let h = harness(&playlist(&[CNN_LINE])).await;
    let app = router_for(&h);
    let (status, _, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let document: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(document["status"], "ok");
}
