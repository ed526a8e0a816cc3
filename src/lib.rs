//! # spider-engine
//!
//! Crawl orchestration core: task schedulers with composable duplicate
//! filters, and crawl engines that drive fetch and process stages until no
//! work remains.
//!
//! Fetching, extraction and result persistence are plugged in through the
//! [`Downloader`], [`PageProcessor`] and [`Pipeline`] traits. The crate ships
//! schedulers, dedup filters, two orchestrators and a few text pipelines; it
//! does not ship a network client.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::prelude::*;
//!
//! struct Titles;
//!
//! impl PageProcessor for Titles {
//!     fn supports(&self, response: &Response) -> bool {
//!         response.is_success()
//!     }
//!
//!     fn process(&self, response: &Response) -> ResultItems {
//!         let mut items = ResultItems::new(response.request().clone());
//!         items.put("length", response.body.len());
//!         items
//!     }
//! }
//!
//! fn run() -> Result<(), CrawlError> {
//!     let crawler = CrawlerBuilder::new()
//!         .add_downloader(MyHttpDownloader::default())
//!         .add_processor(Titles)
//!         .add_start_request(Request::parse("https://example.com")?)
//!         .build()?;
//!     crawler.start()
//! }
//! ```

pub mod builder;
pub mod crawler;
pub mod downloader;
pub mod error;
pub mod item;
pub mod pipeline;
pub mod prelude;
pub mod processor;
pub mod request;
pub mod response;
pub mod scheduler;
pub mod state;
pub mod stats;

pub use builder::{CrawlerBuilder, CrawlerConfig, FilterKind};
pub use crawler::{ConcurrentCrawler, Crawler, StopHandle};
pub use downloader::Downloader;
pub use error::{CrawlError, DownloadError};
pub use item::ResultItems;
pub use pipeline::Pipeline;
pub use processor::PageProcessor;
pub use request::{Method, Request};
pub use response::Response;
pub use scheduler::Scheduler;
pub use state::LifecycleState;
pub use stats::StatCollector;
