//! Deduplicating, memoizing cache for binary resources (images, fonts)
//!
//! Every resource is fetched at most once per cache key for the lifetime of
//! the cache. Concurrent callers share the in-flight request, and failures
//! are remembered as placeholder results exactly like successes.

use crate::utils::{data_url_content, encode_base64, get_mime_type, FALLBACK_CONTENT_TYPE};
use crate::{EmbedError, EmbedOptions, ResourceFetcher};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, warn};

static FONT_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(ttf|otf|eot|woff2?)$").expect("valid regex"));

/// Encoded payload of a fetched resource.
///
/// `content` holds only the base64 payload, without any `data:` prefix. A
/// placeholder produced for a failed fetch has an empty `content_type`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceMetadata {
    pub content: String,
    pub content_type: String,
}

impl ResourceMetadata {
    fn placeholder(image_placeholder: Option<&str>) -> Self {
        Self {
            content: image_placeholder
                .map(data_url_content)
                .unwrap_or_default()
                .to_string(),
            content_type: String::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.content_type.is_empty()
    }
}

type PendingFetch = Shared<BoxFuture<'static, Arc<ResourceMetadata>>>;

/// Normalized key identifying a resource for deduplication.
///
/// The query string and fragment are dropped unless `include_query_params`
/// is set. Font files are further reduced to their file name so the same font
/// served from different hosts shares one entry.
pub fn cache_key(url: &str, include_query_params: bool) -> String {
    if include_query_params {
        return url.to_string();
    }

    let path = url.split(['?', '#']).next().unwrap_or(url);
    if FONT_EXTENSION.is_match(path) {
        return path.rsplit('/').next().unwrap_or(path).to_string();
    }

    path.to_string()
}

/// Append a timestamp parameter so intermediate HTTP caches are bypassed.
pub fn cache_bust_url(url: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, chrono::Utc::now().timestamp_millis())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
    pub failures: usize,
}

pub struct ResourceCache {
    fetcher: Arc<dyn ResourceFetcher>,
    entries: DashMap<String, PendingFetch>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    failures: Arc<AtomicUsize>,
}

impl ResourceCache {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            fetcher,
            entries: DashMap::new(),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fetch `url` as encoded metadata, reusing any earlier or in-flight fetch
    /// with the same cache key.
    ///
    /// Never fails: network errors, timeouts and bad statuses resolve to a
    /// placeholder built from `options.image_placeholder`.
    pub async fn get_resource(&self, url: &str, options: &EmbedOptions) -> Arc<ResourceMetadata> {
        let key = cache_key(url, options.include_query_params);

        // The entry guard is released before awaiting so other callers can
        // join the same pending fetch.
        let pending = match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Resource cache hit for {}", entry.key());
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let pending = self.start_fetch(url, options);
                entry.insert(pending.clone());
                pending
            }
        };

        pending.await
    }

    /// Spawn the request so it keeps running even if every caller stops waiting.
    fn start_fetch(&self, url: &str, options: &EmbedOptions) -> PendingFetch {
        let request_url = if options.cache_bust {
            cache_bust_url(url)
        } else {
            url.to_string()
        };
        let fetcher = self.fetcher.clone();
        let failures = self.failures.clone();
        let timeout = options.fetch_timeout;
        let placeholder = options.image_placeholder.clone();
        let fallback = placeholder.clone();

        let handle = tokio::spawn(async move {
            match fetch_encoded(fetcher.as_ref(), &request_url, timeout).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    warn!("Failed to fetch resource {}: {}", request_url, e);
                    ResourceMetadata::placeholder(placeholder.as_deref())
                }
            }
        });

        async move {
            let metadata = handle.await.unwrap_or_else(|e| {
                warn!("Resource fetch task ended unexpectedly: {}", e);
                ResourceMetadata::placeholder(fallback.as_deref())
            });
            Arc::new(metadata)
        }
        .boxed()
        .shared()
    }

    pub fn contains(&self, url: &str, options: &EmbedOptions) -> bool {
        self.entries
            .contains_key(&cache_key(url, options.include_query_params))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

async fn fetch_encoded(
    fetcher: &dyn ResourceFetcher,
    url: &str,
    timeout: Duration,
) -> Result<ResourceMetadata, EmbedError> {
    let resource = tokio::time::timeout(timeout, fetcher.fetch(url))
        .await
        .map_err(|_| EmbedError::Timeout(timeout))??;

    let content_type = resource
        .content_type
        .filter(|content_type| !content_type.trim().is_empty())
        .or_else(|| get_mime_type(url).map(str::to_string))
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());

    Ok(ResourceMetadata {
        content: encode_base64(&resource.data),
        content_type,
    })
}
