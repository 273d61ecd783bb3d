//! Rewriting of `url()` references into inline data URLs
//!
//! `FontEmbedder::embed_fonts` handles whole fetched style sheets under a
//! global deadline; `FontEmbedder::embed_resources` handles individual
//! font-face rules collected from the document.
//!
//! Both collect `(matched text, replacement)` pairs as fetches complete and
//! apply them to the original text in a single pass at the end, so the result
//! does not depend on completion order. Every occurrence of a matched
//! reference is rewritten, including duplicates.

use crate::url_resolver::{force_https, is_http_url};
use crate::utils::{
    get_mime_type, make_data_url, parse_url_references, rewrite_url_references, UrlReference,
};
use crate::{EmbedError, EmbedOptions, ResourceCache, ResourceMetadata, StyleSheetFetch, UrlResolver};
use futures::stream::{FuturesUnordered, StreamExt};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tokio::time::Instant;
use tracing::{debug, warn};

static FONT_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)src\s*:\s*((?:url\([^)]+\)\s*(?:format\([^)]+\))?\s*,?\s*)+);?")
        .expect("valid regex")
});

static URL_WITH_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\([^)]+\)\s*format\(\s*['"]?([^'")]+?)['"]?\s*\)"#)
        .expect("valid regex")
});

#[derive(Clone)]
pub struct FontEmbedder {
    resources: Arc<ResourceCache>,
    resolver: UrlResolver,
}

impl FontEmbedder {
    pub fn new(resources: Arc<ResourceCache>, resolver: UrlResolver) -> Self {
        Self {
            resources,
            resolver,
        }
    }

    pub fn resources(&self) -> &Arc<ResourceCache> {
        &self.resources
    }

    pub fn resolver(&self) -> &UrlResolver {
        &self.resolver
    }

    /// Inline every font referenced by a fetched style sheet.
    ///
    /// All references are fetched concurrently through the resource cache.
    /// Whatever has completed when `options.font_embed_timeout` elapses is
    /// embedded; the rest stay remote. Timed-out fetches are not cancelled and
    /// still populate the cache for later callers.
    pub async fn embed_fonts(
        &self,
        sheet: &StyleSheetFetch,
        options: &EmbedOptions,
    ) -> Result<String, EmbedError> {
        let css_text = sheet.css_text().await?;
        let references = parse_url_references(&css_text);
        if references.is_empty() {
            return Ok(css_text);
        }

        let deadline = Instant::now() + options.font_embed_timeout;
        let mut pending: FuturesUnordered<_> = references
            .into_iter()
            .map(|reference| {
                let target = self.font_url(&reference.url, &sheet.url);
                let resources = self.resources.clone();
                let options = options.clone();
                tokio::spawn(async move {
                    let metadata = resources.get_resource(&target, &options).await;
                    (reference, target, metadata)
                })
            })
            .collect();

        let mut replacements = HashMap::new();
        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some(Ok((reference, target, metadata)))) => {
                    if metadata.is_placeholder() {
                        warn!("Leaving font {} unembedded: fetch failed", target);
                        continue;
                    }
                    let data_url = make_data_url(&metadata.content, &metadata.content_type);
                    replacements.insert(reference.matched, format!("url({data_url})"));
                }
                Ok(Some(Err(e))) => warn!("Font embedding task failed: {}", e),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Font embedding for {} timed out after {:?}; {} references left remote",
                        sheet.url,
                        options.font_embed_timeout,
                        pending.len()
                    );
                    break;
                }
            }
        }

        debug!("Embedded {} font references from {}", replacements.len(), sheet.url);
        Ok(rewrite_url_references(&css_text, &replacements))
    }

    /// Inline every resource referenced by `css_text`, resolving relative
    /// references against `base_url`.
    ///
    /// Text without remote references is returned unchanged, even when a
    /// preferred font format is set. Failed fetches keep their remote
    /// reference unless a placeholder payload is configured, in which case
    /// the placeholder is embedded instead.
    pub async fn embed_resources(
        &self,
        css_text: &str,
        base_url: Option<&str>,
        options: &EmbedOptions,
    ) -> String {
        if parse_url_references(css_text).is_empty() {
            return css_text.to_string();
        }

        let filtered = match &options.preferred_font_format {
            Some(format) => filter_preferred_font_format(css_text, format),
            None => css_text.to_string(),
        };

        let fetches = parse_url_references(&filtered)
            .into_iter()
            .map(|reference| async move {
                let target = self.resolver.resolve(&reference.url, base_url);
                let metadata = self.resources.get_resource(&target, options).await;
                (reference, target, metadata)
            });
        let results = futures::future::join_all(fetches).await;

        let replacements: HashMap<String, String> = results
            .into_iter()
            .filter_map(|(reference, target, metadata)| {
                embedded_reference(&reference, &target, &metadata)
            })
            .collect();

        rewrite_url_references(&filtered, &replacements)
    }

    fn font_url(&self, reference: &str, sheet_url: &str) -> String {
        let resolved = self.resolver.resolve(reference, Some(sheet_url));
        if is_http_url(&resolved) {
            resolved
        } else {
            force_https(&resolved)
        }
    }
}

fn embedded_reference(
    reference: &UrlReference,
    target: &str,
    metadata: &ResourceMetadata,
) -> Option<(String, String)> {
    if metadata.content.is_empty() {
        warn!("Leaving {} unembedded: fetch failed", target);
        return None;
    }

    let mime_type = get_mime_type(target)
        .map(str::to_string)
        .or_else(|| Some(metadata.content_type.clone()).filter(|c| !c.is_empty()))
        .unwrap_or_else(|| crate::utils::FALLBACK_CONTENT_TYPE.to_string());
    let data_url = make_data_url(&metadata.content, &mime_type);

    Some((reference.matched.clone(), format!("url({data_url})")))
}

/// Reduce each `src:` list to the entry whose `format()` matches `preferred`.
///
/// Lists without a matching entry are left unchanged.
pub fn filter_preferred_font_format(css_text: &str, preferred: &str) -> String {
    FONT_SRC
        .replace_all(css_text, |captures: &regex::Captures<'_>| {
            let declaration = &captures[0];
            URL_WITH_FORMAT
                .captures_iter(&captures[1])
                .find(|entry| entry[1].eq_ignore_ascii_case(preferred))
                .map(|entry| format!("src: {};", &entry[0]))
                .unwrap_or_else(|| declaration.to_string())
        })
        .into_owned()
}
