//! Cross-origin embedding policy: `X-Frame-Options` plus the CSP
//! `frame-ancestors` directive that lets the builder iframe host the app.

use axum::http::{HeaderName, HeaderValue, header};

use crate::error::CrmError;

pub const X_FRAME_OPTIONS_VALUE: &str = "SAMEORIGIN";
pub const SELF_ANCESTOR: &str = "'self'";
pub const LOCALHOST_ANCESTOR: &str = "localhost:*";
pub const VERCEL_PREVIEW_ANCESTOR: &str = "*.vercel.app";

/// Render the `frame-ancestors` directive from an ordered list of sources.
///
/// Tokens are emitted verbatim, space separated, in input order. An empty
/// list renders as `'none'`, which forbids framing entirely.
pub fn frame_ancestors_directive<S: AsRef<str>>(ancestors: &[S]) -> String {
    if ancestors.is_empty() {
        return "frame-ancestors 'none'".to_string();
    }
    std::iter::once("frame-ancestors")
        .chain(ancestors.iter().map(AsRef::as_ref))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ordered, validated list of origins allowed to embed the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameAncestors(Vec<String>);

impl FrameAncestors {
    /// Accepts an explicit token list. Tokens must be non-empty and must not
    /// contain whitespace, `;` or `,`, which would split the directive.
    pub fn new<I, S>(tokens: I) -> Result<Self, CrmError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        for token in &tokens {
            if token.is_empty()
                || token
                    .chars()
                    .any(|c| c.is_whitespace() || c == ';' || c == ',' || c.is_control())
            {
                return Err(CrmError::InvalidSetting {
                    name: "CRM_FRAME_ANCESTORS",
                    reason: format!("`{token}` is not a valid frame-ancestors source"),
                });
            }
        }
        Ok(Self(tokens))
    }

    /// Builds the template's default list:
    /// `'self' [localhost:*] *.<domain> <domain> ... *.vercel.app`.
    pub fn for_domains<I, S>(domains: I, allow_localhost: bool) -> Result<Self, CrmError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tokens = vec![SELF_ANCESTOR.to_string()];
        if allow_localhost {
            tokens.push(LOCALHOST_ANCESTOR.to_string());
        }
        for domain in domains {
            let domain = domain.as_ref().trim().trim_start_matches("*.");
            if domain.is_empty() {
                continue;
            }
            tokens.push(format!("*.{domain}"));
            tokens.push(domain.to_string());
        }
        tokens.push(VERCEL_PREVIEW_ANCESTOR.to_string());
        Self::new(tokens)
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn directive(&self) -> String {
        frame_ancestors_directive(&self.0)
    }

    /// Tokens that open framing to hosts beyond a fixed origin: any port on
    /// localhost, bare `*`, and subdomain wildcards.
    pub fn permissive_tokens(&self) -> Vec<&str> {
        self.0
            .iter()
            .map(String::as_str)
            .filter(|t| *t == "*" || t.starts_with("*.") || t.ends_with(":*"))
            .collect()
    }
}

/// Header set emitted on every response.
#[derive(Debug, Clone)]
pub struct EmbeddingPolicy {
    ancestors: FrameAncestors,
    x_frame_options: HeaderValue,
    content_security_policy: HeaderValue,
}

impl EmbeddingPolicy {
    pub fn new(ancestors: FrameAncestors) -> Result<Self, CrmError> {
        let content_security_policy =
            HeaderValue::from_str(&ancestors.directive()).map_err(|e| CrmError::InvalidSetting {
                name: "CRM_FRAME_ANCESTORS",
                reason: e.to_string(),
            })?;
        Ok(Self {
            ancestors,
            x_frame_options: HeaderValue::from_static(X_FRAME_OPTIONS_VALUE),
            content_security_policy,
        })
    }

    pub fn ancestors(&self) -> &FrameAncestors {
        &self.ancestors
    }

    pub fn headers(&self) -> [(HeaderName, HeaderValue); 2] {
        [
            (header::X_FRAME_OPTIONS, self.x_frame_options.clone()),
            (
                header::CONTENT_SECURITY_POLICY,
                self.content_security_policy.clone(),
            ),
        ]
    }
}
