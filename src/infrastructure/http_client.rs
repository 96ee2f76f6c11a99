//! HTTP client for catalog fetching and poster downloads
//!
//! One reqwest client shared process-wide, with optional rate limiting and a
//! transport-level retry on 429/5xx and connection failures. Certificate
//! verification is off by default because many catalog sources run on
//! self-signed certificates; `HttpConfig::accept_invalid_certs` turns it back on.

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::{Client, Response};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::domain::services::{CatalogTransport, FetchError, ImageFetcher, RequestOptions};
use crate::infrastructure::config::HttpConfig;
use crate::infrastructure::retry_manager::RetryPolicy;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared HTTP client implementing both network seams
pub struct HttpClient {
    client: Client,
    rate_limiter: Option<DirectRateLimiter>,
    retry_base_delay: Duration,
    /// Extra headers for poster requests; image hosts often reject hotlinks
    poster_headers: HeaderMap,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .brotli(true)
            .build()
            .context("Failed to create HTTP client")?;

        let rate_limiter = NonZeroU32::new(config.max_requests_per_second)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        let mut poster_headers = HeaderMap::new();
        let referer = config.poster_referer.trim();
        if !referer.is_empty() {
            poster_headers.insert(
                REFERER,
                HeaderValue::from_str(referer).context("Invalid poster referer")?,
            );
        }

        Ok(Self {
            client,
            rate_limiter,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            poster_headers,
        })
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }
    }

    /// Sends one GET and maps failures onto `FetchError`.
    async fn send_once(
        &self,
        url: &str,
        timeout: Duration,
        headers: &HeaderMap,
    ) -> Result<Response, FetchError> {
        self.throttle().await;
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::status(url, status.as_u16()));
        }
        Ok(response)
    }

    /// GET with transport-level retry on recoverable failures.
    async fn send_with_retry(&self, url: &str, options: RequestOptions) -> Result<Response, FetchError> {
        // `max_retries` counts retries, so the first attempt is extra.
        let policy = RetryPolicy::exponential(options.max_retries.saturating_add(1), self.retry_base_delay);
        let headers = HeaderMap::new();
        policy
            .run_while(
                url,
                |err: &FetchError| err.is_recoverable(),
                |_| self.send_once(url, options.timeout, &headers),
            )
            .await
    }
}

fn map_reqwest_error(url: &str, err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout { url: url.to_string() }
    } else if err.is_builder() {
        FetchError::InvalidUrl {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else if let Some(status) = err.status() {
        FetchError::status(url, status.as_u16())
    } else {
        FetchError::transport(url, err.to_string())
    }
}

#[async_trait]
impl CatalogTransport for HttpClient {
    async fn get_text(&self, url: &str, options: RequestOptions) -> Result<String, FetchError> {
        debug!("Fetching catalog page: {url}");
        let response = self.send_with_retry(url, options).await?;
        let text = response.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        debug!("Fetched {url} ({} bytes)", text.len());
        Ok(text)
    }
}

#[async_trait]
impl ImageFetcher for HttpClient {
    async fn download(&self, url: &str, dest: &Path, timeout: Duration) -> Result<u64, FetchError> {
        let response = self.send_once(url, timeout, &self.poster_headers).await?;
        let part = partial_path(dest);

        match stream_to_file(url, response, &part).await {
            Ok(written) => {
                tokio::fs::rename(&part, dest)
                    .await
                    .map_err(|e| FetchError::io(dest, &e))?;
                Ok(written)
            }
            Err(err) => {
                if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial download {}: {cleanup}", part.display());
                    }
                }
                Err(err)
            }
        }
    }
}

/// `poster.jpg` downloads to `poster.jpg.part` before being renamed
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

async fn stream_to_file(url: &str, response: Response, path: &Path) -> Result<u64, FetchError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| FetchError::io(path, &e))?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        file.write_all(&chunk).await.map_err(|e| FetchError::io(path, &e))?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| FetchError::io(path, &e))?;
    Ok(written)
}
