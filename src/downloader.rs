//! # Downloader Module
//!
//! Defines the fetch capability consumed by the orchestrators.
//!
//! A [`Downloader`] turns a [`Request`] into a [`Response`]. Wire-level
//! implementations (HTTP clients, FTP sessions, fixtures in tests) live
//! outside this crate and plug in through this trait.
//!
//! ## Failure semantics
//!
//! Every `Err` from [`Downloader::download`] is read as "try again later": the
//! orchestrator pushes the request back into the scheduler with no backoff and
//! no retry cap. A target that always fails is therefore retried forever.
//!
//! ## Sharing
//!
//! [`ConcurrentCrawler`](crate::ConcurrentCrawler) shares one downloader by
//! reference across all of its fetch workers, so implementations must tolerate
//! concurrent calls to `download`.

use crate::error::DownloadError;
use crate::request::Request;
use crate::response::Response;

/// Fetch capability.
pub trait Downloader: Send + Sync {
    /// A short name used in log messages.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether this downloader can fetch `request`. The sequential
    /// [`Crawler`](crate::Crawler) uses the first downloader that returns `true`.
    fn supports(&self, _request: &Request) -> bool {
        true
    }

    /// Fetches the target of `request`.
    fn download(&self, request: &Request) -> Result<Response, DownloadError>;

    /// Releases held resources. Called once when the crawl ends.
    fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<D: Downloader + ?Sized> Downloader for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn supports(&self, request: &Request) -> bool {
        (**self).supports(request)
    }

    fn download(&self, request: &Request) -> Result<Response, DownloadError> {
        (**self).download(request)
    }

    fn close(&self) -> anyhow::Result<()> {
        (**self).close()
    }
}
