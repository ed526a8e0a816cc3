//! A "prelude" for users of the `spider-engine` crate.
//!
//! Re-exports the traits and structs needed to implement capabilities and
//! run a crawl.
//!
//! # Example
//!
//! ```
//! use spider_engine::prelude::*;
//! ```

pub use crate::{
    // Orchestrators
    ConcurrentCrawler,
    Crawler,
    CrawlerBuilder,
    CrawlerConfig,
    FilterKind,
    StopHandle,
    // Capability traits
    Downloader,
    PageProcessor,
    Pipeline,
    Scheduler,
    // Data
    Request,
    Response,
    ResultItems,
    // Errors
    CrawlError,
    DownloadError,
};

pub use crate::pipeline::{ConsolePipeline, FilePipeline, WriterPipeline};
pub use crate::scheduler::{BloomFilterScheduler, DistinctScheduler, QueueScheduler};
