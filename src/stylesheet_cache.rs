//! Deduplicated fetching of remote style sheet text, keyed by exact URL.

use crate::{EmbedError, EmbedOptions, ResourceFetcher};
use dashmap::DashMap;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tracing::debug;

type PendingText = Shared<BoxFuture<'static, Result<String, EmbedError>>>;

/// A style sheet whose text may still be downloading.
#[derive(Clone)]
pub struct StyleSheetFetch {
    pub url: String,
    css_text: PendingText,
}

impl StyleSheetFetch {
    /// Wrap text that is already available, e.g. an inline sheet.
    pub fn from_text(url: impl Into<String>, css_text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            css_text: future::ready(Ok(css_text.into())).boxed().shared(),
        }
    }

    pub async fn css_text(&self) -> Result<String, EmbedError> {
        self.css_text.clone().await
    }
}

impl std::fmt::Debug for StyleSheetFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StyleSheetFetch")
            .field("url", &self.url)
            .field("settled", &self.css_text.peek().is_some())
            .finish()
    }
}

pub struct StyleSheetCache {
    fetcher: Arc<dyn ResourceFetcher>,
    entries: DashMap<String, StyleSheetFetch>,
}

impl StyleSheetCache {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            fetcher,
            entries: DashMap::new(),
        }
    }

    /// Start (or join) the download of the sheet at `url`.
    ///
    /// The body is decoded lossily as UTF-8, so a byte-order mark survives as
    /// U+FEFF at the start of the text and invalid bytes become U+FFFD.
    pub fn fetch_style_sheet_text(&self, url: &str, options: &EmbedOptions) -> StyleSheetFetch {
        self.entries
            .entry(url.to_string())
            .or_insert_with(|| {
                debug!("Fetching style sheet {}", url);
                StyleSheetFetch {
                    url: url.to_string(),
                    css_text: self.start_fetch(url, options),
                }
            })
            .clone()
    }

    fn start_fetch(&self, url: &str, options: &EmbedOptions) -> PendingText {
        let fetcher = self.fetcher.clone();
        let url = url.to_string();
        let timeout = options.fetch_timeout;

        let handle = tokio::spawn(async move {
            let resource = tokio::time::timeout(timeout, fetcher.fetch(&url))
                .await
                .map_err(|_| EmbedError::Timeout(timeout))??;
            Ok::<_, EmbedError>(String::from_utf8_lossy(&resource.data).into_owned())
        });

        async move {
            handle
                .await
                .map_err(|e| EmbedError::Network(e.to_string()))?
        }
        .boxed()
        .shared()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{StubFetcher, StubResponse};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_url_fetched_once() {
        let fetcher = Arc::new(StubFetcher::new().with(
            "https://a.test/site.css",
            StubResponse::text("a{x:y}").delayed(Duration::from_millis(10)),
        ));
        let cache = StyleSheetCache::new(fetcher.clone());
        let options = EmbedOptions::default();

        let first = cache.fetch_style_sheet_text("https://a.test/site.css", &options);
        let second = cache.fetch_style_sheet_text("https://a.test/site.css", &options);

        assert_eq!(first.css_text().await.unwrap(), "a{x:y}");
        assert_eq!(second.css_text().await.unwrap(), "a{x:y}");
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_urls_are_not_normalized() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .with("https://a.test/site.css", StubResponse::text("a{}"))
                .with("https://a.test/site.css?v=2", StubResponse::text("b{}")),
        );
        let cache = StyleSheetCache::new(fetcher.clone());
        let options = EmbedOptions::default();

        let plain = cache.fetch_style_sheet_text("https://a.test/site.css", &options);
        let versioned = cache.fetch_style_sheet_text("https://a.test/site.css?v=2", &options);

        assert_eq!(plain.css_text().await.unwrap(), "a{}");
        assert_eq!(versioned.css_text().await.unwrap(), "b{}");
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_shared() {
        let fetcher = Arc::new(StubFetcher::new());
        let cache = StyleSheetCache::new(fetcher.clone());
        let options = EmbedOptions::default();

        let sheet = cache.fetch_style_sheet_text("https://a.test/gone.css", &options);
        let again = cache.fetch_style_sheet_text("https://a.test/gone.css", &options);

        assert!(matches!(
            sheet.css_text().await,
            Err(EmbedError::HttpStatus { status: 404, .. })
        ));
        assert!(again.css_text().await.is_err());
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_byte_order_mark_is_kept() {
        let fetcher = Arc::new(StubFetcher::new().with(
            "https://a.test/bom.css",
            StubResponse::body(b"\xEF\xBB\xBFa{}".to_vec(), Some("text/css")),
        ));
        let cache = StyleSheetCache::new(fetcher);

        let text = cache
            .fetch_style_sheet_text("https://a.test/bom.css", &EmbedOptions::default())
            .css_text()
            .await
            .unwrap();
        assert_eq!(text, "\u{FEFF}a{}");
    }

    #[tokio::test]
    async fn test_from_text() {
        let sheet = StyleSheetFetch::from_text("https://a.test/inline", "b{}");
        assert_eq!(sheet.css_text().await.unwrap(), "b{}");
        assert_eq!(sheet.url, "https://a.test/inline");
    }
}
