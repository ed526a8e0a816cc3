//! # Builder Module
//!
//! Provides the `CrawlerBuilder`, a fluent API for assembling a crawler from
//! a scheduler, capabilities and a [`CrawlerConfig`].
//!
//! ## Overview
//!
//! The builder collects every part of a crawl before anything is started,
//! validates the configuration once, and then produces either a
//! [`ConcurrentCrawler`] (`build`) or a sequential [`Crawler`]
//! (`build_sequential`).
//!
//! ## Key Features
//!
//! - **Pool sizing**: fetch and process worker counts, quiescence interval
//! - **Dedup selection**: exact, Bloom filter or none, wrapped around the
//!   chosen scheduler (a FIFO [`QueueScheduler`] by default)
//! - **Serde configuration**: [`CrawlerConfig`] can be read from JSON
//! - **Default handling**: a [`ConsolePipeline`] is installed when no
//!   pipeline is registered
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::{CrawlerBuilder, FilterKind, Request};
//!
//! let crawler = CrawlerBuilder::new()
//!     .fetch_workers(8)
//!     .filter(FilterKind::Bloom { expected_insertions: 100_000, false_positive_rate: 0.001 })
//!     .add_downloader(MyDownloader::default())
//!     .add_processor(MyProcessor)
//!     .add_start_request(Request::parse("https://example.com")?)
//!     .build()?;
//! crawler.start()?;
//! ```

use crate::crawler::{
    ConcurrentCrawler, Crawler, DEFAULT_FETCH_WORKERS, DEFAULT_PROCESS_WORKERS,
    DEFAULT_WAIT_INTERVAL,
};
use crate::downloader::Downloader;
use crate::error::{CrawlError, Result};
use crate::pipeline::{ConsolePipeline, Pipeline};
use crate::processor::PageProcessor;
use crate::request::Request;
use crate::scheduler::{BloomFilterScheduler, DistinctScheduler, QueueScheduler, Scheduler};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

fn default_expected_insertions() -> usize {
    500
}

fn default_false_positive_rate() -> f64 {
    0.01
}

/// Duplicate filter wrapped around the scheduler.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterKind {
    /// Every push is accepted.
    None,
    /// Exact filter backed by a hash set.
    #[default]
    Distinct,
    /// Probabilistic filter with bounded memory.
    Bloom {
        #[serde(default = "default_expected_insertions")]
        expected_insertions: usize,
        #[serde(default = "default_false_positive_rate")]
        false_positive_rate: f64,
    },
}

impl FilterKind {
    fn wrap(&self, inner: Box<dyn Scheduler>) -> Result<Box<dyn Scheduler>> {
        Ok(match *self {
            FilterKind::None => inner,
            FilterKind::Distinct => Box::new(DistinctScheduler::distinct(inner)),
            FilterKind::Bloom {
                expected_insertions,
                false_positive_rate,
            } => Box::new(BloomFilterScheduler::bloom(
                inner,
                expected_insertions,
                false_positive_rate,
            )?),
        })
    }
}

/// Configuration for the crawler's pools and duplicate filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Number of fetch worker threads.
    pub fetch_workers: usize,
    /// Number of process worker threads.
    pub process_workers: usize,
    /// Interval between two quiescence checks, in milliseconds.
    pub wait_millis: u64,
    pub filter: FilterKind,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        CrawlerConfig {
            fetch_workers: DEFAULT_FETCH_WORKERS,
            process_workers: DEFAULT_PROCESS_WORKERS,
            wait_millis: DEFAULT_WAIT_INTERVAL.as_millis() as u64,
            filter: FilterKind::default(),
        }
    }
}

impl CrawlerConfig {
    /// Reads a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CrawlerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_millis)
    }

    /// Checks pool sizes, the wait interval and the filter sizing.
    pub fn validate(&self) -> Result<()> {
        if self.fetch_workers == 0 {
            return Err(CrawlError::config("fetch_workers must be at least 1"));
        }
        if self.process_workers == 0 {
            return Err(CrawlError::config("process_workers must be at least 1"));
        }
        if self.wait_millis == 0 {
            return Err(CrawlError::config("wait_millis must be greater than zero"));
        }
        if let FilterKind::Bloom {
            expected_insertions,
            false_positive_rate,
        } = self.filter
        {
            if expected_insertions == 0 {
                return Err(CrawlError::config("expected_insertions must be greater than zero"));
            }
            if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
                return Err(CrawlError::config(format!(
                    "false_positive_rate must be in (0, 1), got {false_positive_rate}"
                )));
            }
        }
        Ok(())
    }
}

/// Fluent assembly of a crawler.
#[derive(Default)]
pub struct CrawlerBuilder {
    config: CrawlerConfig,
    scheduler: Option<Box<dyn Scheduler>>,
    downloaders: Vec<Box<dyn Downloader>>,
    processors: Vec<Box<dyn PageProcessor>>,
    pipelines: Vec<Box<dyn Pipeline>>,
    start_requests: Vec<Request>,
}

impl CrawlerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: CrawlerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn fetch_workers(mut self, count: usize) -> Self {
        self.config.fetch_workers = count;
        self
    }

    pub fn process_workers(mut self, count: usize) -> Self {
        self.config.process_workers = count;
        self
    }

    /// Sets the interval between two quiescence checks. Truncated to milliseconds.
    pub fn wait_interval(mut self, wait: Duration) -> Self {
        self.config.wait_millis = wait.as_millis() as u64;
        self
    }

    pub fn filter(mut self, filter: FilterKind) -> Self {
        self.config.filter = filter;
        self
    }

    /// Sets the scheduler the duplicate filter is wrapped around.
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    pub fn add_downloader(mut self, downloader: impl Downloader + 'static) -> Self {
        self.downloaders.push(Box::new(downloader));
        self
    }

    pub fn add_processor(mut self, processor: impl PageProcessor + 'static) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    pub fn add_pipeline(mut self, pipeline: impl Pipeline + 'static) -> Self {
        self.pipelines.push(Box::new(pipeline));
        self
    }

    pub fn add_start_request(mut self, request: Request) -> Self {
        self.start_requests.push(request);
        self
    }

    /// Builds a [`ConcurrentCrawler`]. Exactly one downloader must be registered.
    pub fn build(mut self) -> Result<ConcurrentCrawler> {
        self.config.validate()?;
        if self.downloaders.len() != 1 {
            return Err(CrawlError::config(format!(
                "concurrent crawler needs exactly one downloader, got {}",
                self.downloaders.len()
            )));
        }
        let scheduler = self.take_scheduler()?;
        let downloaders = std::mem::take(&mut self.downloaders);

        let crawler = ConcurrentCrawler::new(
            scheduler,
            downloaders.into_iter().next().ok_or_else(|| {
                CrawlError::config("concurrent crawler needs exactly one downloader")
            })?,
            self.config.fetch_workers,
            self.config.process_workers,
            self.config.wait_interval(),
        )?;
        for processor in self.processors {
            crawler.add_processor(processor)?;
        }
        for pipeline in with_default_pipeline(self.pipelines) {
            crawler.add_pipeline(pipeline)?;
        }
        for request in self.start_requests {
            crawler.add_start_request(request)?;
        }
        Ok(crawler)
    }

    /// Builds a sequential [`Crawler`]. At least one downloader must be
    /// registered; pool sizes are validated but unused.
    pub fn build_sequential(mut self) -> Result<Crawler> {
        self.config.validate()?;
        if self.downloaders.is_empty() {
            return Err(CrawlError::config("crawler needs at least one downloader"));
        }
        let crawler = Crawler::new(self.take_scheduler()?);
        for downloader in self.downloaders {
            crawler.add_downloader(downloader)?;
        }
        for processor in self.processors {
            crawler.add_processor(processor)?;
        }
        for pipeline in with_default_pipeline(self.pipelines) {
            crawler.add_pipeline(pipeline)?;
        }
        for request in self.start_requests {
            crawler.add_start_request(request)?;
        }
        Ok(crawler)
    }

    fn take_scheduler(&mut self) -> Result<Box<dyn Scheduler>> {
        let inner = self
            .scheduler
            .take()
            .unwrap_or_else(|| Box::new(QueueScheduler::new()));
        debug!("Wrapping scheduler with {:?} filter", self.config.filter);
        self.config.filter.wrap(inner)
    }
}

fn with_default_pipeline(mut pipelines: Vec<Box<dyn Pipeline>>) -> Vec<Box<dyn Pipeline>> {
    if pipelines.is_empty() {
        debug!("No pipelines registered, adding ConsolePipeline");
        pipelines.push(Box::new(ConsolePipeline::new()));
    }
    pipelines
}
