//! # Crawler Module
//!
//! The orchestrators that drive a crawl.
//!
//! ## Key Components
//!
//! - **Crawler**: sequential reference engine; one request at a time on the
//!   calling thread, ends when the scheduler runs dry.
//! - **ConcurrentCrawler**: a fetch pool and a process pool connected by a
//!   handoff queue, with a control loop that detects completion.
//! - **StopHandle**: external cancellation for a running `ConcurrentCrawler`.
//!
//! ## Internal Components
//!
//! - `fetch_worker`: the loop run by each `fetch-<n>` thread
//! - `process_worker`: the loop run by each `process-<n>` thread, plus the
//!   processor selection and pipeline chain shared with `Crawler`
//!
//! Both orchestrators share the lifecycle rules of [`crate::state`]:
//! configuration is only accepted while initializing, `start` succeeds once,
//! and resources are released once the crawl has ended.

mod concurrent;
mod core;
mod fetch_worker;
mod process_worker;

pub use self::concurrent::{
    ConcurrentCrawler, DEFAULT_FETCH_WORKERS, DEFAULT_PROCESS_WORKERS, DEFAULT_WAIT_INTERVAL,
    StopHandle,
};
pub use self::core::Crawler;
