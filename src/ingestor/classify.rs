//! Content-type classification.
//!
//! `classify_stream_url` is a pure function of the stream URL and is the
//! single source of truth for content-type throughout the pipeline.

use url::Url;

use crate::models::ContentKind;

const VOD_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "3gp",
];
const LIVE_EXTENSIONS: &[&str] = &["ts", "m3u8", "m2ts", "mts"];

/// Classify a stream URL as live, vod or series.
///
/// Precedence: path segments, then a `type`/`kind` query parameter, then
/// the final path extension, then live as the default. URLs that do not
/// parse as absolute URIs fall back to a substring scan over the raw text.
pub fn classify_stream_url(raw: &str) -> ContentKind {
    match Url::parse(raw) {
        Ok(parsed) => {
            let segments: Vec<String> = parsed
                .path_segments()
                .map(|s| s.map(|seg| seg.to_ascii_lowercase()).collect())
                .unwrap_or_default();
            let query: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_ascii_lowercase()))
                .collect();
            classify_parts(&segments, &query)
        }
        Err(_) => classify_raw(raw),
    }
}

fn classify_parts(segments: &[String], query: &[(String, String)]) -> ContentKind {
    if segments.iter().any(|s| s == "live") {
        return ContentKind::Live;
    }
    if segments.iter().any(|s| s == "series") {
        return ContentKind::Series;
    }
    if segments
        .iter()
        .any(|s| s == "movie" || s == "movies" || s == "vod")
    {
        return ContentKind::Vod;
    }

    for (key, value) in query {
        if key == "type" || key == "kind" {
            match value.as_str() {
                "live" => return ContentKind::Live,
                "series" => return ContentKind::Series,
                "vod" | "movie" => return ContentKind::Vod,
                _ => {}
            }
        }
    }

    if let Some(ext) = segments
        .last()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
    {
        if LIVE_EXTENSIONS.contains(&ext) {
            return ContentKind::Live;
        }
        if VOD_EXTENSIONS.contains(&ext) {
            return ContentKind::Vod;
        }
    }

    ContentKind::Live
}

/// Substring fallback for URLs the parser rejects: reconstruct segments and
/// query pairs by plain text splitting, then apply the same rules.
fn classify_raw(raw: &str) -> ContentKind {
    let lower = raw.to_ascii_lowercase();
    let (path_part, query_part) = match lower.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (lower.as_str(), None),
    };

    let segments: Vec<String> = path_part
        .split('/')
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .map(str::to_string)
        .collect();

    let query: Vec<(String, String)> = query_part
        .map(|q| {
            q.split('&')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default();

    classify_parts(&segments, &query)
}
