//! Remote image allow-list.
//!
//! Hostname patterns are matched label by label: `*` matches exactly one
//! label, `**` matches one or more. Pathname patterns work the same way on
//! `/`-separated segments, except `**` also matches zero segments.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CrmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePattern {
    pub protocol: Protocol,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pathname: Option<String>,
}

impl RemotePattern {
    /// Any host over `protocol`.
    pub fn any(protocol: Protocol) -> Self {
        Self {
            protocol,
            hostname: "**".to_string(),
            port: None,
            pathname: None,
        }
    }

    pub fn is_wildcard_all(&self) -> bool {
        self.hostname == "**" && self.port.is_none() && self.pathname.is_none()
    }

    pub fn matches(&self, url: &Url) -> bool {
        if url.scheme() != self.protocol.as_str() {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        if let Some(port) = self.port
            && url.port_or_known_default() != Some(port)
        {
            return false;
        }
        let pattern: Vec<&str> = self.hostname.split('.').collect();
        let labels: Vec<String> = host.split('.').map(str::to_ascii_lowercase).collect();
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        if !glob_match(&pattern, &labels, 1) {
            return false;
        }
        match &self.pathname {
            None => true,
            Some(path_pattern) => {
                let pattern: Vec<&str> = path_pattern.trim_start_matches('/').split('/').collect();
                let segments: Vec<&str> = url.path().trim_start_matches('/').split('/').collect();
                glob_match(&pattern, &segments, 0)
            }
        }
    }
}

/// Segment glob. `double_min` is the fewest segments `**` may consume.
fn glob_match(pattern: &[&str], input: &[&str], double_min: usize) -> bool {
    match pattern.split_first() {
        None => input.is_empty(),
        Some((&"**", rest)) => (double_min..=input.len())
            .any(|taken| glob_match(rest, &input[taken..], double_min)),
        Some((&"*", rest)) => match input.split_first() {
            Some((seg, tail)) if !seg.is_empty() => glob_match(rest, tail, double_min),
            _ => false,
        },
        Some((lit, rest)) => match input.split_first() {
            Some((seg, tail)) if seg.eq_ignore_ascii_case(lit) => {
                glob_match(rest, tail, double_min)
            }
            _ => false,
        },
    }
}

/// Ordered allow-list; a URL is accepted when any pattern matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePolicy {
    patterns: Vec<RemotePattern>,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

impl ImagePolicy {
    pub fn new(patterns: Vec<RemotePattern>) -> Self {
        Self { patterns }
    }

    /// `https://**` and `http://**`: every remote host is accepted.
    pub fn permissive() -> Self {
        Self::new(vec![
            RemotePattern::any(Protocol::Https),
            RemotePattern::any(Protocol::Http),
        ])
    }

    pub fn patterns(&self) -> &[RemotePattern] {
        &self.patterns
    }

    pub fn allows(&self, url: &Url) -> bool {
        self.patterns.iter().any(|p| p.matches(url))
    }

    /// Protocols for which the list accepts any host.
    pub fn unrestricted_protocols(&self) -> Vec<Protocol> {
        self.patterns
            .iter()
            .filter(|p| p.is_wildcard_all())
            .map(|p| p.protocol)
            .collect()
    }

    /// Parse `raw` and ensure it is an absolute, allowed image URL.
    pub fn check(&self, raw: &str) -> Result<Url, CrmError> {
        let url = Url::parse(raw).map_err(|e| CrmError::ImageUrl(format!("{raw}: {e}")))?;
        if url.host_str().is_none() {
            return Err(CrmError::ImageUrl(format!("{raw}: missing host")));
        }
        if !self.allows(&url) {
            return Err(CrmError::ImageNotAllowed(
                url.host_str().unwrap_or_default().to_string(),
            ));
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn pattern(protocol: Protocol, hostname: &str) -> RemotePattern {
        RemotePattern {
            protocol,
            hostname: hostname.to_string(),
            port: None,
            pathname: None,
        }
    }

    #[test]
    fn permissive_accepts_every_http_and_https_host() {
        let policy = ImagePolicy::permissive();
        for raw in [
            "https://images.unsplash.com/photo.jpg",
            "http://localhost:3000/a.png",
            "https://10.0.0.1/x.webp",
            "http://a.b.c.d.example.org/",
        ] {
            assert!(policy.allows(&url(raw)), "{raw}");
        }
        assert_eq!(
            policy.unrestricted_protocols(),
            vec![Protocol::Https, Protocol::Http]
        );
    }

    #[test]
    fn other_schemes_are_rejected() {
        let policy = ImagePolicy::permissive();
        assert!(!policy.allows(&url("ftp://example.com/a.png")));
        assert!(matches!(
            policy.check("data:image/png;base64,AAAA"),
            Err(CrmError::ImageUrl(_))
        ));
    }

    #[test]
    fn single_star_matches_one_label() {
        let p = pattern(Protocol::Https, "*.example.com");
        assert!(p.matches(&url("https://cdn.example.com/a.png")));
        assert!(!p.matches(&url("https://a.cdn.example.com/a.png")));
        assert!(!p.matches(&url("https://example.com/a.png")));
        assert!(!p.matches(&url("http://cdn.example.com/a.png")));
    }

    #[test]
    fn double_star_matches_any_subdomain_depth() {
        let p = pattern(Protocol::Https, "**.example.com");
        assert!(p.matches(&url("https://cdn.example.com/")));
        assert!(p.matches(&url("https://a.b.cdn.example.com/")));
        assert!(!p.matches(&url("https://example.com/")));
        assert!(!p.matches(&url("https://example.org/")));
    }

    #[test]
    fn port_and_pathname_narrow_the_match() {
        let p = RemotePattern {
            protocol: Protocol::Https,
            hostname: "assets.test".to_string(),
            port: Some(8443),
            pathname: Some("/avatars/**".to_string()),
        };
        assert!(p.matches(&url("https://assets.test:8443/avatars/1.png")));
        assert!(p.matches(&url("https://assets.test:8443/avatars/a/b/1.png")));
        assert!(!p.matches(&url("https://assets.test/avatars/1.png")));
        assert!(!p.matches(&url("https://assets.test:8443/logos/1.png")));
        assert!(!p.is_wildcard_all());
    }

    #[test]
    fn check_reports_the_rejected_host() {
        let policy = ImagePolicy::new(vec![pattern(Protocol::Https, "images.test")]);
        assert!(policy.check("https://images.test/a.png").is_ok());
        match policy.check("https://evil.test/a.png") {
            Err(CrmError::ImageNotAllowed(host)) => assert_eq!(host, "evil.test"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(policy.unrestricted_protocols().is_empty());
    }

    #[test]
    fn patterns_deserialize_from_config_shape() {
        let patterns: Vec<RemotePattern> = serde_json::from_str(
            r#"[{"protocol":"https","hostname":"**"},{"protocol":"http","hostname":"**"}]"#,
        )
        .unwrap();
        assert_eq!(ImagePolicy::new(patterns), ImagePolicy::permissive());
    }
}
