//! Upstream playlist ingestion: parsing and content classification.

pub mod classify;
pub mod m3u_parser;

pub use classify::classify_stream_url;
pub use m3u_parser::PlaylistParser;

use crate::models::ContentKind;

/// One entry parsed out of an upstream playlist, with its classification
/// already applied. The display name is always non-empty after fallback
/// resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEntry {
    pub display_name: String,
    pub tvg_id: Option<String>,
    pub tvg_name: Option<String>,
    pub tvg_logo: Option<String>,
    pub group_title: Option<String>,
    pub stream_url: String,
    pub content_kind: ContentKind,
}
