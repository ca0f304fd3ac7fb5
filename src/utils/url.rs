//! URL utilities for consistent URL handling.

use std::env;

use url::Url;

/// URL utilities for consistent URL handling.
pub struct UrlUtils;

impl UrlUtils {
    /// Rewrite `https://` to `http://` when the authority carries a literal
    /// port 80. Some upstreams mislabel plain HTTP as HTTPS on port 80 and
    /// otherwise fail TLS immediately. All other URLs pass through
    /// unchanged, byte for byte.
    pub fn normalize_port_80_scheme(raw: &str) -> String {
        if let Ok(parsed) = Url::parse(raw) {
            if parsed.scheme() == "https" && parsed.port() == Some(80) {
                // String-level swap keeps the rest of the URL untouched.
                return format!("http://{}", &raw["https://".len()..]);
            }
        }
        raw.to_string()
    }

    /// Resolve `${VAR}` placeholders against the process environment.
    /// A missing variable is an error carrying the variable name.
    pub fn substitute_env_vars(raw: &str) -> Result<String, String> {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                // Unterminated placeholder, keep it literal.
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let name = &after[..end];
            match env::var(name) {
                Ok(value) => out.push_str(&value),
                Err(_) => return Err(name.to_string()),
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Mask credential material in a URL for logging: userinfo, interior
    /// path segments on credentialed stream paths, and credential-looking
    /// query parameters. Upstream stream URLs must never reach a log sink
    /// in the clear.
    pub fn obfuscate_credentials(raw: &str) -> String {
        let Ok(mut parsed) = Url::parse(raw) else {
            return raw.to_string();
        };

        if !parsed.username().is_empty() {
            let _ = parsed.set_username("***");
        }
        if parsed.password().is_some() {
            let _ = parsed.set_password(Some("***"));
        }

        // Xtream-shaped stream paths embed user/pass as interior segments:
        // keep the final segment, mask everything before it.
        let segments: Vec<String> = parsed
            .path_segments()
            .map(|s| s.map(str::to_string).collect())
            .unwrap_or_default();
        if segments.len() >= 3 {
            let mut masked = segments.clone();
            let last = masked.len() - 1;
            for segment in masked.iter_mut().take(last) {
                *segment = "***".to_string();
            }
            parsed.set_path(&masked.join("/"));
        }

        let query_pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| {
                let lower = k.to_ascii_lowercase();
                if lower == "username" || lower == "password" || lower == "token" {
                    (k.to_string(), "***".to_string())
                } else {
                    (k.to_string(), v.to_string())
                }
            })
            .collect();
        if !query_pairs.is_empty() {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in &query_pairs {
                serializer.append_pair(k, v);
            }
            parsed.set_query(Some(&serializer.finish()));
        }

        parsed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_80_https_is_rewritten_to_http() {
        assert_eq!(
            UrlUtils::normalize_port_80_scheme("https://example.com:80/live/a/b/1.ts"),
            "http://example.com:80/live/a/b/1.ts"
        );
    }

    #[test]
    fn other_urls_pass_through_unchanged() {
        for url in [
            "https://example.com/live/1.ts",
            "https://example.com:8443/live/1.ts",
            "http://example.com:80/live/1.ts",
            "not a url",
        ] {
            assert_eq!(UrlUtils::normalize_port_80_scheme(url), url);
        }
    }

    #[test]
    fn env_substitution_resolves_placeholders() {
        std::env::set_var("M3UNDLE_TEST_TOKEN", "sekrit");
        assert_eq!(
            UrlUtils::substitute_env_vars("http://x/${M3UNDLE_TEST_TOKEN}/p.m3u").unwrap(),
            "http://x/sekrit/p.m3u"
        );
    }

    #[test]
    fn env_substitution_fails_on_missing_variable() {
        let err = UrlUtils::substitute_env_vars("http://x/${M3UNDLE_NO_SUCH_VAR}/p.m3u")
            .unwrap_err();
        assert_eq!(err, "M3UNDLE_NO_SUCH_VAR");
    }

    #[test]
    fn obfuscation_masks_path_credentials() {
        let masked = UrlUtils::obfuscate_credentials("http://up/user1/pass1/stream.ts");
        assert!(!masked.contains("user1"));
        assert!(!masked.contains("pass1"));
        assert!(masked.ends_with("/stream.ts"));
    }

    #[test]
    fn obfuscation_masks_userinfo_and_query() {
        let masked =
            UrlUtils::obfuscate_credentials("http://u:p@host/get.php?username=a&password=b&type=m3u");
        assert!(!masked.contains("u:p@"));
        assert!(!masked.contains("password=b"));
        assert!(masked.contains("type=m3u"));
    }
}
