//! `callback_url` scheme/host allow-listing (spec §4.5, §6:
//! `callback_url_allowlist` per tier). Patterns are `scheme://host`, where
//! `host` of `*` matches any host under that scheme. No external URL
//! parser is pulled in for this — the grammar is narrow enough that a
//! manual split is clearer than a dependency.

pub fn split_scheme_host(url: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = url.split_once("://")?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    if host.is_empty() {
        return None;
    }
    Some((scheme, host))
}

pub fn is_allowed(url: &str, patterns: &[String]) -> bool {
    let Some((scheme, host)) = split_scheme_host(url) else {
        return false;
    };
    patterns.iter().any(|pattern| {
        let Some((pattern_scheme, pattern_host)) = split_scheme_host(pattern) else {
            return false;
        };
        pattern_scheme == scheme && (pattern_host == "*" || pattern_host.eq_ignore_ascii_case(host))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_host_matches_any_host_of_same_scheme() {
        let patterns = vec!["https://*".to_string()];
        assert!(is_allowed("https://example.com/hook", &patterns));
        assert!(!is_allowed("http://example.com/hook", &patterns));
    }

    #[test]
    fn exact_host_pattern_matches_only_that_host() {
        let patterns = vec!["https://partner.example.com".to_string()];
        assert!(is_allowed("https://partner.example.com/cb", &patterns));
        assert!(!is_allowed("https://other.example.com/cb", &patterns));
    }

    #[test]
    fn malformed_url_is_rejected() {
        let patterns = vec!["https://*".to_string()];
        assert!(!is_allowed("not-a-url", &patterns));
    }
}
