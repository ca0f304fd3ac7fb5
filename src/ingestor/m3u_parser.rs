use anyhow::{bail, Result};
use tracing::debug;

use super::{classify_stream_url, ParsedEntry};

/// Parser for the extended-M3U dialect.
///
/// Each entry carries one or more metadata lines followed by a stream URL.
/// Attribute names on the `#EXTINF` line are matched case-insensitively.
/// An explicit `#EXTGRP` marker takes precedence over the `group-title`
/// attribute.
pub struct PlaylistParser;

#[derive(Default)]
struct PendingEntry {
    tvg_id: Option<String>,
    tvg_name: Option<String>,
    tvg_logo: Option<String>,
    group_title: Option<String>,
    extgrp: Option<String>,
    label: Option<String>,
}

impl PlaylistParser {
    pub fn parse(content: &str) -> Result<Vec<ParsedEntry>> {
        let mut entries = Vec::new();
        let mut pending: Option<PendingEntry> = None;
        let mut saw_header = false;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if strip_prefix_ignore_case(line, "#EXTM3U").is_some() {
                saw_header = true;
            } else if let Some(rest) = strip_prefix_ignore_case(line, "#EXTINF:") {
                pending = Some(Self::parse_extinf(rest));
            } else if let Some(rest) = strip_prefix_ignore_case(line, "#EXTGRP:") {
                if let Some(entry) = pending.as_mut() {
                    let group = rest.trim();
                    if !group.is_empty() {
                        entry.extgrp = Some(group.to_string());
                    }
                }
            } else if line.starts_with('#') {
                // Other directives are metadata we do not act on.
                continue;
            } else if let Some(entry) = pending.take() {
                entries.push(entry.finish(line));
            } else {
                debug!("Ignoring stray URL line without metadata: {}", line);
            }
        }

        if !saw_header && entries.is_empty() {
            bail!("not an extended-M3U document");
        }

        Ok(entries)
    }

    /// Split an `#EXTINF` remainder into attributes and the trailing
    /// comma-delimited display label.
    fn parse_extinf(rest: &str) -> PendingEntry {
        let mut entry = PendingEntry::default();

        // The label is everything after the last comma outside quotes.
        let (attributes_part, label) = split_at_label_comma(rest);
        if let Some(label) = label {
            let label = label.trim();
            if !label.is_empty() {
                entry.label = Some(label.to_string());
            }
        }

        for (key, value) in parse_attributes(attributes_part) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.to_ascii_lowercase().as_str() {
                "tvg-id" => entry.tvg_id = Some(value.to_string()),
                "tvg-name" => entry.tvg_name = Some(value.to_string()),
                "tvg-logo" => entry.tvg_logo = Some(value.to_string()),
                "group-title" => entry.group_title = Some(value.to_string()),
                _ => {}
            }
        }

        entry
    }
}

impl PendingEntry {
    fn finish(self, url_line: &str) -> ParsedEntry {
        // Display name fallback chain: trailing label, tvg-name, literal.
        let display_name = self
            .label
            .clone()
            .or_else(|| self.tvg_name.clone())
            .unwrap_or_else(|| "Unnamed Channel".to_string());

        // Explicit group marker wins over the group-title attribute.
        let group_title = self.extgrp.or(self.group_title);

        let stream_url = url_line.trim().to_string();
        let content_kind = classify_stream_url(&stream_url);

        ParsedEntry {
            display_name,
            tvg_id: self.tvg_id,
            tvg_name: self.tvg_name,
            tvg_logo: self.tvg_logo,
            group_title,
            stream_url,
            content_kind,
        }
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// Find the comma separating attributes from the display label, ignoring
/// commas inside quoted attribute values.
fn split_at_label_comma(rest: &str) -> (&str, Option<&str>) {
    let mut in_quotes = false;
    let mut last_comma = None;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => last_comma = Some(idx),
            _ => {}
        }
    }
    match last_comma {
        Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
        None => (rest, None),
    }
}

/// Attribute scanner for `key="value"` and bare `key=value` pairs. Empty
/// quoted values (`tvg-id=""`) terminate the pair cleanly instead of
/// swallowing the following attribute.
fn parse_attributes(attributes: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut current_key = String::new();
    let mut current_value = String::new();
    let mut in_quotes = false;
    let mut in_value = false;
    let mut value_quoted = false;

    let mut flush = |key: &mut String, value: &mut String, in_value: &mut bool, quoted: &mut bool| {
        if *in_value && !key.trim().is_empty() {
            attrs.push((key.trim().to_string(), std::mem::take(value)));
        }
        key.clear();
        value.clear();
        *in_value = false;
        *quoted = false;
    };

    for ch in attributes.chars() {
        match ch {
            '"' if in_value => {
                in_quotes = !in_quotes;
                value_quoted = true;
            }
            '=' if !in_quotes && !in_value => in_value = true,
            ' ' | '\t' if !in_quotes => {
                if in_value && (value_quoted || !current_value.is_empty()) {
                    flush(
                        &mut current_key,
                        &mut current_value,
                        &mut in_value,
                        &mut value_quoted,
                    );
                } else if !in_value {
                    current_key.clear();
                }
            }
            _ => {
                if in_value {
                    current_value.push(ch);
                } else {
                    current_key.push(ch);
                }
            }
        }
    }
    flush(
        &mut current_key,
        &mut current_value,
        &mut in_value,
        &mut value_quoted,
    );

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentKind;

    #[test]
    fn parses_attributes_and_label() {
        let playlist = concat!(
            "#EXTM3U\n",
            "#EXTINF:-1 tvg-id=\"cnn.us\" tvg-name=\"CNN US\" tvg-logo=\"http://x/l.png\" ",
            "group-title=\"News\",CNN\n",
            "http://x/s/1\n",
        );

        let entries = PlaylistParser::parse(playlist).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.display_name, "CNN");
        assert_eq!(entry.tvg_id.as_deref(), Some("cnn.us"));
        assert_eq!(entry.tvg_name.as_deref(), Some("CNN US"));
        assert_eq!(entry.tvg_logo.as_deref(), Some("http://x/l.png"));
        assert_eq!(entry.group_title.as_deref(), Some("News"));
        assert_eq!(entry.stream_url, "http://x/s/1");
        assert_eq!(entry.content_kind, ContentKind::Live);
    }

    #[test]
    fn attribute_names_match_case_insensitively() {
        let playlist = "#EXTM3U\n#EXTINF:-1 TVG-ID=\"a\" Group-Title=\"G\",Ch\nhttp://x/1.ts\n";
        let entries = PlaylistParser::parse(playlist).unwrap();
        assert_eq!(entries[0].tvg_id.as_deref(), Some("a"));
        assert_eq!(entries[0].group_title.as_deref(), Some("G"));
    }

    #[test]
    fn extgrp_marker_overrides_group_title() {
        let playlist = concat!(
            "#EXTM3U\n",
            "#EXTINF:-1 group-title=\"Attr Group\",Ch\n",
            "#EXTGRP:Marker Group\n",
            "http://x/1.ts\n",
        );
        let entries = PlaylistParser::parse(playlist).unwrap();
        assert_eq!(entries[0].group_title.as_deref(), Some("Marker Group"));
    }

    #[test]
    fn display_name_falls_back_to_tvg_name_then_literal() {
        let playlist = concat!(
            "#EXTM3U\n",
            "#EXTINF:-1 tvg-name=\"Named\",\n",
            "http://x/1.ts\n",
            "#EXTINF:-1,   \n",
            "http://x/2.ts\n",
        );
        let entries = PlaylistParser::parse(playlist).unwrap();
        assert_eq!(entries[0].display_name, "Named");
        assert_eq!(entries[1].display_name, "Unnamed Channel");
    }

    #[test]
    fn commas_inside_quoted_attributes_do_not_split_the_label() {
        let playlist =
            "#EXTM3U\n#EXTINF:-1 tvg-name=\"News, World\" group-title=\"A, B\",Label\nhttp://x/1.ts\n";
        let entries = PlaylistParser::parse(playlist).unwrap();
        assert_eq!(entries[0].display_name, "Label");
        assert_eq!(entries[0].group_title.as_deref(), Some("A, B"));
    }

    #[test]
    fn empty_quoted_value_does_not_swallow_the_next_attribute() {
        let playlist =
            "#EXTM3U\n#EXTINF:-1 tvg-id=\"\" group-title=\"News\",Ch\nhttp://x/1.ts\n";
        let entries = PlaylistParser::parse(playlist).unwrap();
        assert_eq!(entries[0].tvg_id, None);
        assert_eq!(entries[0].group_title.as_deref(), Some("News"));
    }

    #[test]
    fn whitespace_only_attribute_values_are_absent() {
        let playlist = "#EXTM3U\n#EXTINF:-1 tvg-id=\"  \",Ch\nhttp://x/1.ts\n";
        let entries = PlaylistParser::parse(playlist).unwrap();
        assert_eq!(entries[0].tvg_id, None);
    }

    #[test]
    fn non_m3u_content_is_a_parse_error() {
        assert!(PlaylistParser::parse("<html>gateway timeout</html>").is_err());
        assert!(PlaylistParser::parse("").is_err());
    }

    #[test]
    fn stray_urls_and_unknown_directives_are_skipped() {
        let playlist = concat!(
            "#EXTM3U\n",
            "http://x/stray.ts\n",
            "#EXT-X-SESSION-DATA:id=1\n",
            "#EXTINF:-1,Ch\n",
            "http://x/1.ts\n",
        );
        let entries = PlaylistParser::parse(playlist).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_name, "Ch");
    }
}
