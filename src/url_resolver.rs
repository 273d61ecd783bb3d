//! Resolution of CSS and HTML references against a base location.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static SCHEME_WITH_AUTHORITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z][a-z0-9+.\-]*://").expect("valid regex"));
static ANY_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z][a-z0-9+.\-]*:").expect("valid regex"));

/// Canonicalizes references the way an anchor element in a throwaway
/// document would, without touching any live document state.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    document_protocol: String,
    document_url: Option<Url>,
}

impl Default for UrlResolver {
    fn default() -> Self {
        Self::new("https:")
    }
}

impl UrlResolver {
    pub fn new(document_protocol: impl Into<String>) -> Self {
        Self {
            document_protocol: document_protocol.into(),
            document_url: None,
        }
    }

    /// Base used when a call supplies none, standing in for the document URL.
    pub fn with_document_url(mut self, document_url: &str) -> Self {
        self.document_url = Url::parse(document_url).ok();
        self
    }

    /// Resolve `reference` against `base_url`.
    ///
    /// Absolute URLs and non-hierarchical schemes (`data:`, `mailto:`, ...)
    /// come back unchanged, protocol-relative references take the document
    /// protocol. Everything else is joined onto the base; when no usable base
    /// exists the reference is returned as-is.
    pub fn resolve(&self, reference: &str, base_url: Option<&str>) -> String {
        let reference = reference.trim();

        if SCHEME_WITH_AUTHORITY.is_match(reference) {
            return reference.to_string();
        }

        if reference.starts_with("//") {
            return format!("{}{}", self.document_protocol, reference);
        }

        if ANY_SCHEME.is_match(reference) {
            return reference.to_string();
        }

        let base = base_url
            .and_then(|base| self.parse_base(base))
            .or_else(|| self.document_url.clone());

        match base {
            Some(base) => base
                .join(reference)
                .map(|resolved| resolved.to_string())
                .unwrap_or_else(|_| reference.to_string()),
            None => reference.to_string(),
        }
    }

    fn parse_base(&self, base: &str) -> Option<Url> {
        match Url::parse(base) {
            Ok(url) => Some(url),
            // A relative base is itself resolved against the document first.
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                self.document_url.as_ref()?.join(base).ok()
            }
            Err(_) => None,
        }
    }
}

/// Whether `url` already carries an `http://` or `https://` scheme.
pub fn is_http_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

/// Force a secure absolute form for a reference that failed to resolve.
pub fn force_https(url: &str) -> String {
    if is_http_url(url) {
        return url.to_string();
    }
    format!("https://{}", url.trim_start_matches('/'))
}
