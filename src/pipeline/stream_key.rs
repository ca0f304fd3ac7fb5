//! Stable-identity and stream-key hashing.
//!
//! Both keys are SHA-256 digests truncated to 128 bits via unpadded
//! base64url (16 characters). The collision space is large enough at
//! catalog scale that keying the hash is unnecessary.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Unit-separator byte used to join identity components.
pub const US: char = '\u{1F}';

/// Hash an identity string down to the 16-character key form.
pub fn hash_identity(identity: &str) -> String {
    let digest = Sha256::digest(identity.as_bytes());
    let mut encoded = URL_SAFE_NO_PAD.encode(digest);
    encoded.truncate(16);
    encoded
}

/// The stable identity of a parsed channel within its provider.
///
/// Base: `tvg-id` when present, else `displayName US streamUrl`. The
/// stream URL, group title and display name are appended to disambiguate
/// items sharing a tvg-id across groups. `occurrence` counts repeats of
/// the same identity within one fetch; the Nth repeat (N >= 2) gets a
/// `dup:N` suffix so exact-duplicate playlist lines survive.
pub fn channel_identity(
    tvg_id: Option<&str>,
    display_name: &str,
    stream_url: &str,
    group_title: Option<&str>,
    occurrence: usize,
) -> String {
    let base = match tvg_id {
        Some(id) => id.to_string(),
        None => format!("{display_name}{US}{stream_url}"),
    };

    let mut identity = format!(
        "{base}{US}{stream_url}{US}{}{US}{display_name}",
        group_title.unwrap_or("")
    );
    if occurrence >= 2 {
        identity.push(US);
        identity.push_str(&format!("dup:{occurrence}"));
    }
    identity
}

/// Derive the channel's stable key from its identity.
pub fn stable_key(
    tvg_id: Option<&str>,
    display_name: &str,
    stream_url: &str,
    group_title: Option<&str>,
    occurrence: usize,
) -> String {
    hash_identity(&channel_identity(
        tvg_id,
        display_name,
        stream_url,
        group_title,
        occurrence,
    ))
}

/// Derive the opaque stream key clients see for one emitted channel.
///
/// The identity leads with the channel's upstream identity key (tvg-id)
/// when it has one; the profile id is mixed in so distinct lineups never
/// share keys. Stable across refreshes whenever the inputs are stable.
pub fn stream_key(
    tvg_id: Option<&str>,
    display_name: &str,
    stream_url: &str,
    output_group: &str,
    profile_id: Uuid,
) -> String {
    let identity = match tvg_id {
        Some(id) => format!("{id}{US}{stream_url}{US}{output_group}{US}{display_name}"),
        None => format!("{display_name}{US}{stream_url}{US}{output_group}"),
    };
    hash_identity(&format!("{identity}:{profile_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_sixteen_base64url_characters() {
        let key = hash_identity("anything");
        assert_eq!(key.len(), 16);
        assert!(key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn stream_key_matches_reference_derivation() {
        // base64url(sha256("cnn.us US http://x/s/1 US News US CNN:<profile>"))[:16]
        let profile_id = Uuid::parse_str("6ba7b810-9dad-11d1-80b4-00c04fd430c8").unwrap();
        let expected = {
            let identity = format!(
                "cnn.us\u{1F}http://x/s/1\u{1F}News\u{1F}CNN:{profile_id}"
            );
            let digest = Sha256::digest(identity.as_bytes());
            let mut encoded = URL_SAFE_NO_PAD.encode(digest);
            encoded.truncate(16);
            encoded
        };

        let key = stream_key(Some("cnn.us"), "CNN", "http://x/s/1", "News", profile_id);
        assert_eq!(key, expected);
    }

    #[test]
    fn stream_key_is_stable_and_input_sensitive() {
        let profile_id = Uuid::new_v4();
        let a = stream_key(Some("cnn.us"), "CNN", "http://x/s/1", "News", profile_id);
        let b = stream_key(Some("cnn.us"), "CNN", "http://x/s/1", "News", profile_id);
        assert_eq!(a, b);

        assert_ne!(
            a,
            stream_key(Some("cnn.us"), "CNN", "http://x/s/1", "World", profile_id)
        );
        assert_ne!(
            a,
            stream_key(Some("cnn.us"), "CNN", "http://x/s/1", "News", Uuid::new_v4())
        );
    }

    #[test]
    fn channels_without_tvg_id_use_the_fallback_arm() {
        let profile_id = Uuid::new_v4();
        let key = stream_key(None, "Other", "http://x/s/2", "Misc", profile_id);
        let expected =
            hash_identity(&format!("Other\u{1F}http://x/s/2\u{1F}Misc:{profile_id}"));
        assert_eq!(key, expected);
    }

    #[test]
    fn duplicate_occurrences_get_distinct_identities() {
        let first = channel_identity(None, "Ch", "http://x/1.ts", Some("G"), 1);
        let second = channel_identity(None, "Ch", "http://x/1.ts", Some("G"), 2);
        let third = channel_identity(None, "Ch", "http://x/1.ts", Some("G"), 3);
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert!(second.ends_with("dup:2"));
    }

    #[test]
    fn shared_tvg_id_across_groups_stays_distinct() {
        let a = stable_key(Some("id1"), "Ch", "http://x/1.ts", Some("A"), 1);
        let b = stable_key(Some("id1"), "Ch", "http://x/1.ts", Some("B"), 1);
        assert_ne!(a, b);
    }
}
