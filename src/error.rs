//! # Error Module
//!
//! Error types shared by the schedulers, the orchestrators and the capability
//! traits.
//!
//! Two families exist:
//!
//! - [`CrawlError`]: errors reported synchronously to the caller. In practice
//!   these are lifecycle misuse (configuring a running crawler, starting twice)
//!   and invalid configuration. Transient crawl problems never surface here.
//! - [`DownloadError`]: returned by a [`Downloader`](crate::Downloader) when a
//!   fetch fails. The orchestrators treat every variant as "retry later" and
//!   push the request back into the scheduler.

use crate::state::LifecycleState;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = CrawlError> = std::result::Result<T, E>;

/// Errors surfaced to the caller of a crawler or builder.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// A lifecycle transition or configuration change was attempted in the wrong state.
    #[error("cannot {action}: crawler is {actual}, expected {expected}")]
    IllegalState {
        action: &'static str,
        expected: LifecycleState,
        actual: LifecycleState,
    },

    /// A configuration value was rejected during validation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl CrawlError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns `true` for lifecycle misuse errors.
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState { .. })
    }
}

/// A failed fetch. Every variant is treated as transient by the orchestrators.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side answered with a status the downloader refuses to hand on.
    #[error("unexpected status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("{0}")]
    Other(String),
}

impl DownloadError {
    /// Creates a free-form download error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
