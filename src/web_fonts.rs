//! Web font collection for a cloned subtree
//!
//! This module provides the `EmbedService`, which owns the caches shared by
//! one embedding session and produces the font CSS inserted into a snapshot.

use crate::css_rules::extract_rules;
use crate::utils::should_embed;
use crate::{
    CacheStats, Config, CssRule, CssRuleKind, Document, DocumentHandle, Element, EmbedError,
    EmbedOptions, FontEmbedder, HttpFetcher, ResourceCache, ResourceFetcher, ResourceMetadata,
    StyleSheetCache, StyleSheetFetch, UrlResolver,
};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where rules recovered from a fetched sheet are inserted.
#[derive(Debug, Clone, Copy)]
enum InlineTarget {
    /// After the `@import` rule at `position` of sheet `sheet`
    Import { sheet: usize, position: usize },
    /// Appended to sheet `sheet` in place of an unreadable cross-origin sheet
    Fallback { sheet: usize },
}

#[derive(Debug, Clone)]
struct InlineJob {
    target: InlineTarget,
    url: String,
}

/// Embedding session composing the resource cache, the style sheet cache and
/// the URL resolver.
///
/// Caches live as long as the service; nothing is ever evicted, so one
/// service per embedding run (or per process) is the intended lifetime.
///
/// # Examples
///
/// ```rust,no_run
/// use snapshot_embed::{Config, Document, Element, EmbedService, StyleSheet};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let service = EmbedService::new(&config)?;
///
///     let document = Document::new("https://example.com/")
///         .with_style_sheet(StyleSheet::inline("@import url(fonts.css);"))
///         .into_handle();
///     let mut root = Element::new("div").attached_to(document);
///
///     service.embed_web_fonts(&mut root, &config.options).await?;
///     println!("{:?}", root.children.first().and_then(|c| c.text_content.as_ref()));
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct EmbedService {
    embedder: FontEmbedder,
    style_sheets: Arc<StyleSheetCache>,
}

impl EmbedService {
    pub fn new(config: &Config) -> Result<Self, EmbedError> {
        let fetcher = Arc::new(HttpFetcher::new(config)?);
        Ok(Self::with_fetcher(config, fetcher))
    }

    pub fn with_fetcher(config: &Config, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        let resources = Arc::new(ResourceCache::new(fetcher.clone()));
        let resolver = UrlResolver::new(config.document_protocol.clone());

        Self {
            embedder: FontEmbedder::new(resources, resolver),
            style_sheets: Arc::new(StyleSheetCache::new(fetcher)),
        }
    }

    pub async fn get_resource(&self, url: &str, options: &EmbedOptions) -> Arc<ResourceMetadata> {
        self.embedder.resources().get_resource(url, options).await
    }

    pub fn fetch_style_sheet_text(&self, url: &str, options: &EmbedOptions) -> StyleSheetFetch {
        self.style_sheets.fetch_style_sheet_text(url, options)
    }

    pub async fn embed_fonts(
        &self,
        sheet: &StyleSheetFetch,
        options: &EmbedOptions,
    ) -> Result<String, EmbedError> {
        self.embedder.embed_fonts(sheet, options).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.embedder.resources().stats()
    }

    /// Flatten every rule reachable from the document's style sheets.
    ///
    /// `@import` targets are fetched, their fonts embedded and their rules
    /// inserted into the importing sheet. Cross-origin sheets are fetched by
    /// URL and their rules appended to the first inline sheet (or the first
    /// sheet when none is inline). Fetch and insertion failures are logged
    /// and skipped.
    pub async fn get_css_rules(
        &self,
        document: &DocumentHandle,
        options: &EmbedOptions,
    ) -> Vec<CssRule> {
        let jobs = {
            let document = document.read().await;
            self.collect_inline_jobs(&document)
        };

        let fetched = join_all(jobs.into_iter().map(|job| async move {
            let sheet = self.style_sheets.fetch_style_sheet_text(&job.url, options);
            let css_text = self.embedder.embed_fonts(&sheet, options).await;
            (job, css_text)
        }))
        .await;

        {
            let mut document = document.write().await;
            let mut inserted_imports: HashMap<usize, usize> = HashMap::new();
            for (job, css_text) in fetched {
                match css_text {
                    Ok(css_text) => {
                        insert_fetched_rules(&mut document, &job, &css_text, &mut inserted_imports)
                    }
                    Err(e) => warn!("Error loading remote css {}: {}", job.url, e),
                }
            }
        }

        let document = document.read().await;
        let mut rules = Vec::new();
        for sheet in &document.style_sheets {
            match sheet.css_rules() {
                Ok(sheet_rules) => rules.extend_from_slice(sheet_rules),
                Err(e) => warn!(
                    "Error while reading CSS rules from {}: {}",
                    sheet.href().unwrap_or("inline sheet"),
                    e
                ),
            }
        }
        rules
    }

    fn collect_inline_jobs(&self, document: &Document) -> Vec<InlineJob> {
        let resolver = self.embedder.resolver().clone().with_document_url(&document.url);
        let fallback_sheet = document
            .style_sheets
            .iter()
            .position(|sheet| sheet.href().is_none())
            .unwrap_or(0);

        let mut jobs = Vec::new();
        for (index, sheet) in document.style_sheets.iter().enumerate() {
            match sheet.css_rules() {
                Ok(rules) => {
                    for (position, rule) in rules.iter().enumerate() {
                        if let Some(href) = rule.import_href() {
                            jobs.push(InlineJob {
                                target: InlineTarget::Import {
                                    sheet: index,
                                    position,
                                },
                                url: resolver.resolve(href, sheet.href()),
                            });
                        }
                    }
                }
                Err(e) => {
                    if let Some(href) = sheet.href() {
                        jobs.push(InlineJob {
                            target: InlineTarget::Fallback {
                                sheet: fallback_sheet,
                            },
                            url: href.to_string(),
                        });
                    }
                    warn!("Error inlining remote css file: {}", e);
                }
            }
        }
        jobs
    }

    /// Font-face rules whose `src` carries a `url()` source.
    pub async fn get_web_font_rules(
        &self,
        document: &DocumentHandle,
        options: &EmbedOptions,
    ) -> Vec<CssRule> {
        self.get_css_rules(document, options)
            .await
            .into_iter()
            .filter(|rule| rule.kind == CssRuleKind::FontFace)
            .filter(|rule| rule.font_src().is_some_and(should_embed))
            .collect()
    }

    /// Embedded font CSS for the document owning `root`, one rule per line.
    pub async fn get_web_font_css(
        &self,
        root: &Element,
        options: &EmbedOptions,
    ) -> Result<String, EmbedError> {
        let document = root
            .owner_document()
            .ok_or(EmbedError::MissingOwnerDocument)?;
        let document_url = document.read().await.url.clone();

        let rules = self.get_web_font_rules(document, options).await;
        debug!("Embedding {} font-face rules", rules.len());

        let embedded = join_all(rules.iter().map(|rule| {
            let base_url = rule.parent_href.as_deref().unwrap_or(&document_url);
            self.embedder
                .embed_resources(&rule.css_text, Some(base_url), options)
        }))
        .await;

        Ok(embedded.join("\n"))
    }

    /// Prepend a `<style>` element carrying the font CSS to `root`.
    ///
    /// `options.font_embed_css` is used verbatim when set; otherwise nothing
    /// happens when `options.skip_fonts` is set.
    pub async fn embed_web_fonts(
        &self,
        root: &mut Element,
        options: &EmbedOptions,
    ) -> Result<(), EmbedError> {
        let css_text = match &options.font_embed_css {
            Some(css_text) => css_text.clone(),
            None if options.skip_fonts => return Ok(()),
            None => self.get_web_font_css(root, options).await?,
        };

        if css_text.is_empty() {
            return Ok(());
        }

        info!("Embedding {} bytes of font CSS", css_text.len());
        let mut style = Element::new("style");
        style.text_content = Some(css_text);
        root.prepend_child(style);
        Ok(())
    }
}

/// Insert rules recovered from a fetched sheet.
///
/// Nested imports go right after their importing rule, behind imports already
/// inserted there; everything else is appended. `inserted_imports` tracks how
/// far earlier insertions shifted later import positions of each sheet.
fn insert_fetched_rules(
    document: &mut Document,
    job: &InlineJob,
    css_text: &str,
    inserted_imports: &mut HashMap<usize, usize>,
) {
    let (sheet_index, mut next_import) = match job.target {
        InlineTarget::Import { sheet, position } => {
            let shift = inserted_imports.get(&sheet).copied().unwrap_or(0);
            (sheet, Some(position + shift + 1))
        }
        InlineTarget::Fallback { sheet } => (sheet, None),
    };

    let Some(sheet) = document.style_sheets.get_mut(sheet_index) else {
        warn!("No style sheet to receive rules from {}", job.url);
        return;
    };

    for rule in extract_rules(css_text) {
        let is_import = rule
            .get(..7)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("@import"));
        let index = match next_import {
            Some(position) if is_import => position,
            _ => sheet.len(),
        };

        match sheet.insert_rule(&rule, index) {
            Ok(_) => {
                if let (true, Some(position)) = (is_import, next_import.as_mut()) {
                    *position += 1;
                    *inserted_imports.entry(sheet_index).or_insert(0) += 1;
                }
            }
            Err(e) => warn!("Error inserting rule from remote css {}: {}", job.url, e),
        }
    }
}
