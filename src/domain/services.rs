//! Network seams used by the pipelines
//!
//! The collection job talks to upstream catalogs through `CatalogTransport`
//! and the localizer downloads posters through `ImageFetcher`. The reqwest
//! implementation lives in `infrastructure::http_client`; tests plug in
//! scripted implementations.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Per-request limits chosen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub timeout: Duration,
    /// Transport-level retries on 429/5xx and connection failures
    pub max_retries: u32,
}

impl RequestOptions {
    pub const fn new(timeout: Duration, max_retries: u32) -> Self {
        Self { timeout, max_retries }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("failed to read body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("failed to write {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

impl FetchError {
    pub fn transport(url: &str, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn status(url: &str, status: u16) -> Self {
        Self::Status {
            url: url.to_string(),
            status,
        }
    }

    pub fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Whether retrying the same request may succeed
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } | Self::Body { .. } => true,
            Self::Status { status, .. } => is_retryable_status(*status),
            Self::Io { .. } | Self::InvalidUrl { .. } => false,
        }
    }
}

/// 429 and the gateway/server errors worth retrying
pub const fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Fetches catalog listing bodies
#[async_trait]
pub trait CatalogTransport: Send + Sync {
    async fn get_text(&self, url: &str, options: RequestOptions) -> Result<String, FetchError>;
}

/// Downloads a remote file to `dest`, returning the number of bytes written.
/// Implementations must not leave a partial file at `dest` on failure.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn download(&self, url: &str, dest: &Path, timeout: Duration) -> Result<u64, FetchError>;
}
