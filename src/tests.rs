//! Shared test doubles and crate-level integration tests.

use crate::{EmbedError, FetchedResource, ResourceFetcher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Canned answer for one URL.
#[derive(Debug, Clone)]
pub(crate) enum StubResponse {
    Body {
        data: Vec<u8>,
        content_type: Option<String>,
        delay: Option<Duration>,
    },
    Fail {
        error: EmbedError,
        delay: Option<Duration>,
    },
    /// Never completes
    Hang,
}

impl StubResponse {
    pub(crate) fn body(data: Vec<u8>, content_type: Option<&str>) -> Self {
        StubResponse::Body {
            data,
            content_type: content_type.map(str::to_string),
            delay: None,
        }
    }

    pub(crate) fn text(css_text: &str) -> Self {
        Self::body(css_text.as_bytes().to_vec(), Some("text/css"))
    }

    pub(crate) fn fail(error: EmbedError) -> Self {
        StubResponse::Fail { error, delay: None }
    }

    pub(crate) fn delayed(self, by: Duration) -> Self {
        match self {
            StubResponse::Body {
                data, content_type, ..
            } => StubResponse::Body {
                data,
                content_type,
                delay: Some(by),
            },
            StubResponse::Fail { error, .. } => StubResponse::Fail {
                error,
                delay: Some(by),
            },
            StubResponse::Hang => StubResponse::Hang,
        }
    }
}

/// In-memory fetcher recording every requested URL.
///
/// A URL without a canned response answers HTTP 404. Lookups fall back to the
/// URL without its query string so cache-busted requests still match.
#[derive(Debug, Default)]
pub(crate) struct StubFetcher {
    responses: HashMap<String, StubResponse>,
    calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, url: &str, response: StubResponse) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls().len()
    }

    fn lookup(&self, url: &str) -> Option<StubResponse> {
        self.responses
            .get(url)
            .or_else(|| {
                let without_query = url.split('?').next().unwrap_or(url);
                self.responses.get(without_query)
            })
            .cloned()
    }
}

#[async_trait]
impl ResourceFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResource, EmbedError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(url.to_string());
        }

        match self.lookup(url) {
            Some(StubResponse::Body {
                data,
                content_type,
                delay,
            }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(FetchedResource::new(url, data, content_type))
            }
            Some(StubResponse::Fail { error, delay }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Err(error)
            }
            Some(StubResponse::Hang) => std::future::pending().await,
            None => Err(EmbedError::HttpStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::{Config, Document, Element, EmbedOptions, EmbedService, StyleSheet};
    use std::sync::Arc;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.document_protocol, "https:");
        assert!(config.user_agent.is_none());
        assert_eq!(config.options.fetch_timeout, Duration::from_millis(3000));
        assert_eq!(config.options.font_embed_timeout, Duration::from_millis(5000));
        assert!(!config.options.include_query_params);
        assert!(!config.options.skip_fonts);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let zero_timeout = Config {
            options: EmbedOptions {
                fetch_timeout: Duration::ZERO,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(zero_timeout.validate(), Err(EmbedError::Configuration(_))));

        let bad_protocol = Config {
            document_protocol: "https".to_string(),
            ..Default::default()
        };
        assert!(bad_protocol.validate().is_err());

        let bad_placeholder = Config {
            options: EmbedOptions {
                image_placeholder: Some("placeholder.png".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(bad_placeholder.validate().is_err());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: Config = serde_json::from_str(
            r#"{"document_protocol": "http:", "options": {"skip_fonts": true}}"#,
        )
        .unwrap();
        assert_eq!(config.document_protocol, "http:");
        assert!(config.options.skip_fonts);
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.options.font_embed_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn test_error_recoverable() {
        assert!(EmbedError::Network("reset".to_string()).is_recoverable());
        assert!(EmbedError::Timeout(Duration::from_secs(3)).is_recoverable());
        assert!(EmbedError::CrossOrigin("https://cdn.test/a.css".to_string()).is_recoverable());
        assert!(!EmbedError::MissingOwnerDocument.is_recoverable());
        assert!(!EmbedError::Configuration("bad".to_string()).is_recoverable());
    }

    #[test]
    fn test_stub_fetcher_records_calls() {
        let fetcher = StubFetcher::new().with("https://a.test/x.css", StubResponse::text("a{}"));

        let found = tokio_test::block_on(fetcher.fetch("https://a.test/x.css?v=9")).unwrap();
        assert_eq!(found.data, b"a{}");
        let missing = tokio_test::block_on(fetcher.fetch("https://a.test/y.css"));
        assert!(matches!(missing, Err(EmbedError::HttpStatus { status: 404, .. })));

        assert_eq!(
            fetcher.calls(),
            vec!["https://a.test/x.css?v=9", "https://a.test/y.css"]
        );
    }

    #[tokio::test]
    async fn test_end_to_end_font_embedding() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .with(
                    "https://site.test/css/fonts.css",
                    StubResponse::text(
                        "/* fonts */ @font-face { font-family: Body; src: url(\"../f/body.woff2\") format(\"woff2\"); }",
                    ),
                )
                .with(
                    "https://site.test/f/body.woff2",
                    StubResponse::body(b"wOF2".to_vec(), Some("font/woff2")),
                )
                .with(
                    "https://cdn.test/icons.css",
                    StubResponse::text("@font-face{font-family:Icons;src:url(//cdn.test/icons.ttf)}"),
                )
                .with(
                    "https://cdn.test/icons.ttf",
                    StubResponse::body(b"true".to_vec(), None),
                ),
        );
        let service = EmbedService::with_fetcher(&Config::default(), fetcher.clone());

        let document = Document::new("https://site.test/index.html")
            .with_style_sheet(StyleSheet::linked(
                "https://site.test/css/main.css",
                "@import url(fonts.css); body { font-family: Body }",
            ))
            .with_style_sheet(StyleSheet::cross_origin("https://cdn.test/icons.css"))
            .into_handle();
        let mut root = Element::new("div").attached_to(document);

        service
            .embed_web_fonts(&mut root, &EmbedOptions::default())
            .await
            .unwrap();

        let style = &root.children[0];
        assert_eq!(style.tag_name, "style");
        let css = style.text_content.as_deref().unwrap_or_default();
        let lines: Vec<&str> = css.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("font-family: Body"));
        assert!(lines[0].contains("url(data:font/woff2;base64,d09GMg==)"));
        assert!(lines[1].contains("url(data:application/font-truetype;base64,dHJ1ZQ==)"));

        // Each font was requested once even though its rule was seen twice.
        let font_calls = fetcher
            .calls()
            .into_iter()
            .filter(|url| url.ends_with(".woff2") || url.ends_with(".ttf"))
            .count();
        assert_eq!(font_calls, 2);
        assert_eq!(service.cache_stats().entries, 2);
    }
}
