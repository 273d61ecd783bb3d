//! Configuration management with serde serialization/deserialization
//!
//! This module provides the option bag consumed by every stage of the
//! embedding pipeline, plus the process-level settings used to build the
//! HTTP fetcher.

use crate::EmbedError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for the embedding tool
///
/// # Examples
///
/// ```rust
/// use snapshot_embed::Config;
///
/// let config = Config {
///     user_agent: Some("snapshot-embed/0.1".to_string()),
///     ..Default::default()
/// };
/// assert_eq!(config.max_redirects, 10);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Options applied to every embedding call
    pub options: EmbedOptions,

    /// Custom User-Agent string sent with resource requests (default: reqwest default)
    pub user_agent: Option<String>,

    /// Maximum number of redirects followed per request (default: 10)
    pub max_redirects: usize,

    /// Protocol prepended to protocol-relative references (default: "https:")
    ///
    /// Stands in for the protocol of the document the snapshot was taken from.
    pub document_protocol: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            options: EmbedOptions::default(),
            user_agent: None,
            max_redirects: 10,
            document_protocol: "https:".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), EmbedError> {
        if self.options.fetch_timeout.is_zero() {
            return Err(EmbedError::Configuration(
                "Fetch timeout must be greater than 0".to_string(),
            ));
        }

        if self.options.font_embed_timeout.is_zero() {
            return Err(EmbedError::Configuration(
                "Font embedding timeout must be greater than 0".to_string(),
            ));
        }

        if !self.document_protocol.ends_with(':') {
            return Err(EmbedError::Configuration(format!(
                "Document protocol must end with ':' (got {:?})",
                self.document_protocol
            )));
        }

        if let Some(placeholder) = &self.options.image_placeholder {
            if !placeholder.starts_with("data:") {
                return Err(EmbedError::Configuration(
                    "Image placeholder must be a data URL".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Options recognised by the resource cache, the font orchestrator and the
/// web font pipeline.
///
/// # Examples
///
/// ```rust
/// use snapshot_embed::EmbedOptions;
/// use std::time::Duration;
///
/// let options = EmbedOptions {
///     include_query_params: true,
///     fetch_timeout: Duration::from_secs(1),
///     ..Default::default()
/// };
/// assert!(!options.cache_bust);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbedOptions {
    /// Keep the query string in cache keys (default: false)
    ///
    /// When false, `a.png?v=1` and `a.png?v=2` share one cache entry.
    pub include_query_params: bool,

    /// Append a timestamp parameter to every request that misses the cache (default: false)
    pub cache_bust: bool,

    /// Data URL whose payload is used when a resource cannot be fetched
    pub image_placeholder: Option<String>,

    /// Caller-supplied font CSS used verbatim instead of extracting it
    pub font_embed_css: Option<String>,

    /// Skip font embedding entirely (default: false)
    pub skip_fonts: bool,

    /// Font format kept when a `src:` list offers several (e.g. "woff2")
    pub preferred_font_format: Option<String>,

    /// Budget for a single network request (default: 3 seconds)
    pub fetch_timeout: Duration,

    /// Budget for embedding all fonts of one style sheet (default: 5 seconds)
    ///
    /// References still in flight when it elapses stay remote.
    pub font_embed_timeout: Duration,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            include_query_params: false,
            cache_bust: false,
            image_placeholder: None,
            font_embed_css: None,
            skip_fonts: false,
            preferred_font_format: None,
            fetch_timeout: Duration::from_millis(3000),
            font_embed_timeout: Duration::from_millis(5000),
        }
    }
}
