//! Prefetch transport.
//!
//! The coordinator only sees the [`Fetcher`] trait; [`HttpPrefetcher`] is
//! the reqwest-backed implementation used outside tests.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::types::{PredictorError, PredictorResult};

/// Marker header identifying prediction-driven requests.
pub const MARKER_HEADER: &str = "x-precache-predictor";

/// A completed prefetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub url: String,
    pub status: u16,
    pub bytes: u64,
    /// Wall time from request to fully drained body.
    pub elapsed_ms: u64,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn prefetch(&self, url: &str) -> PredictorResult<FetchReport>;
}

/// Prefetcher settings.
#[derive(Debug, Clone)]
pub struct HttpPrefetcherConfig {
    pub timeout_ms: u64,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for HttpPrefetcherConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_redirects: 5,
            user_agent: format!("precache-predictor/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Issues credential-less GET requests marked as prefetches.
#[derive(Clone)]
pub struct HttpPrefetcher {
    client: reqwest::Client,
}

impl HttpPrefetcher {
    pub fn new(config: HttpPrefetcherConfig) -> PredictorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .referer(false)
            .user_agent(config.user_agent)
            .default_headers(prefetch_headers())
            .build()?;
        Ok(Self { client })
    }
}

fn prefetch_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    let prefetch = HeaderValue::from_static("prefetch");
    headers.insert(HeaderName::from_static("purpose"), prefetch.clone());
    headers.insert(HeaderName::from_static("sec-purpose"), prefetch);
    headers.insert(
        HeaderName::from_static(MARKER_HEADER),
        HeaderValue::from_static("true"),
    );
    headers
}

#[async_trait]
impl Fetcher for HttpPrefetcher {
    async fn prefetch(&self, url: &str) -> PredictorResult<FetchReport> {
        let start = Instant::now();
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PredictorError::Fetch(format!("{url} returned {status}")));
        }

        // Drain the body so the response reaches any intermediary cache.
        let body = response.bytes().await?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        Ok(FetchReport {
            url: url.to_string(),
            status: status.as_u16(),
            bytes: body.len() as u64,
            elapsed_ms,
        })
    }
}

/// Prefetch several URLs with bounded concurrency, outside the
/// coordinator. Results come back in completion order.
pub async fn prefetch_all(
    fetcher: &dyn Fetcher,
    urls: &[String],
    concurrency: usize,
) -> Vec<(String, PredictorResult<FetchReport>)> {
    use futures::stream::{self, StreamExt};

    stream::iter(urls.iter())
        .map(|url| async move { (url.clone(), fetcher.prefetch(url).await) })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}
