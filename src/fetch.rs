// src/fetch.rs

//! Shared HTTP client and retry policy.
//!
//! A single pooled client is built at startup and handed to both stages;
//! discovery and enrichment differ only in per-request timeout and headers.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Default per-request timeout for discovery index fetches.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-request timeout for enrichment detail-page fetches.
pub const ENRICHMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry policy for enrichment fetches.
///
/// Delay before attempt `k` (1-based, after the first) is `k * base_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Run `op` under the retry policy, observing cancellation between attempts.
///
/// Non-retryable errors (see `AppError::is_retryable`) short-circuit; the
/// in-flight attempt itself is bounded by the request timeout.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err: Option<AppError> = None;

    for attempt in 0..policy.max_retries {
        if attempt > 0 {
            let delay = policy.base_delay * attempt;
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
            }
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                tracing::info!(
                    "Attempt {}/{} failed: {err}",
                    attempt + 1,
                    policy.max_retries
                );
                last_err = Some(err);
            }
        }
    }

    Err(last_err.unwrap_or(AppError::Cancelled))
}

/// Pooled HTTP client shared by discovery and enrichment.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build the shared client with connection pooling.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self { client })
    }

    /// GET a URL and return the raw body bytes.
    ///
    /// Non-success statuses map to `AppError::Status`.
    pub async fn get_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// GET a detail page as text, with browser-like accept headers.
    pub async fn get_page(&self, url: &str, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }

    /// Execute a configured API request (method, headers, optional body).
    pub async fn execute(
        &self,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<&str>,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| AppError::config(format!("invalid HTTP method {method}: {e}")))?;

        let mut header_map = HeaderMap::new();
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| AppError::config(format!("invalid header name {key}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AppError::config(format!("invalid header value for {key}: {e}")))?;
            header_map.insert(name, value);
        }

        let mut request = self
            .client
            .request(method, url)
            .headers(header_map)
            .timeout(timeout);
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
