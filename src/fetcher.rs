//! Network access behind a trait so caches can be exercised without a network.

use crate::{Config, EmbedError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Raw bytes of a fetched resource with its declared content type.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub url: String,
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchedResource {
    pub fn new(url: impl Into<String>, data: Vec<u8>, content_type: Option<String>) -> Self {
        Self {
            url: url.into(),
            data,
            content_type,
        }
    }
}

/// Source of remote resources.
///
/// Implementations issue one request per call; deduplication, timeouts and
/// failure recovery live in the caches built on top.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedResource, EmbedError>;
}

#[async_trait]
impl<T: ResourceFetcher + ?Sized> ResourceFetcher for Arc<T> {
    async fn fetch(&self, url: &str) -> Result<FetchedResource, EmbedError> {
        (**self).fetch(url).await
    }
}

/// Default fetcher backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self, EmbedError> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder
            .build()
            .map_err(|e| EmbedError::Configuration(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResource, EmbedError> {
        debug!("Requesting {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EmbedError::HttpStatus {
                url: response.url().to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let final_url = response.url().to_string();
        let data = response.bytes().await?.to_vec();

        Ok(FetchedResource::new(final_url, data, content_type))
    }
}
