//! # Statistics Module
//!
//! Collects counters about a crawl while it runs.
//!
//! ## Overview
//!
//! The `StatCollector` is shared by every worker of an orchestrator and
//! updated with atomic operations, so it can be read at any time, including
//! from another thread while the crawl is still running.
//!
//! ## Key Metrics Tracked
//!
//! - **Request Metrics**: enqueued, rejected as duplicates, dropped for lack of a downloader
//! - **Fetch Metrics**: started, succeeded, failed (every failure is a requeue)
//! - **Response Metrics**: dropped for lack of a processor, status code distribution
//! - **Item Metrics**: processed carriers and pipeline chains cut short
//!
//! ## Example
//!
//! ```rust,ignore
//! let stats = crawler.stats();
//! crawler.start()?;
//! println!("{}", stats);
//! println!("{}", stats.to_json_string_pretty()?);
//! ```

use crate::error::Result;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

// A consistent copy of the counters, used by the export and display methods.
struct StatsSnapshot {
    requests_enqueued: usize,
    requests_rejected: usize,
    requests_unsupported: usize,
    fetches_started: usize,
    fetches_succeeded: usize,
    fetches_failed: usize,
    responses_unprocessed: usize,
    items_processed: usize,
    pipeline_short_circuits: usize,
    response_status_counts: BTreeMap<u16, usize>,
    elapsed_duration: Duration,
}

impl StatsSnapshot {
    fn formatted_duration(&self) -> String {
        format!("{:?}", self.elapsed_duration)
    }

    fn fetches_per_second(&self) -> f64 {
        let total_seconds = self.elapsed_duration.as_secs_f64();
        if total_seconds > 0.0 {
            self.fetches_succeeded as f64 / total_seconds
        } else {
            0.0
        }
    }

    fn items_per_second(&self) -> f64 {
        let total_seconds = self.elapsed_duration.as_secs_f64();
        if total_seconds > 0.0 {
            self.items_processed as f64 / total_seconds
        } else {
            0.0
        }
    }

    fn status_list(&self, separator: &str, fmt: impl Fn(u16, usize) -> String) -> Option<String> {
        if self.response_status_counts.is_empty() {
            return None;
        }
        Some(
            self.response_status_counts
                .iter()
                .map(|(code, count)| fmt(*code, *count))
                .collect::<Vec<String>>()
                .join(separator),
        )
    }
}

/// Collects and stores statistics about a crawl.
#[derive(Debug, serde::Serialize)]
pub struct StatCollector {
    #[serde(skip)]
    pub start_time: Instant,

    // Request-related metrics
    pub requests_enqueued: AtomicUsize,
    pub requests_rejected: AtomicUsize,
    pub requests_unsupported: AtomicUsize,

    // Fetch-related metrics
    pub fetches_started: AtomicUsize,
    pub fetches_succeeded: AtomicUsize,
    pub fetches_failed: AtomicUsize,

    // Response-related metrics
    pub responses_unprocessed: AtomicUsize,
    pub response_status_counts: Arc<dashmap::DashMap<u16, usize>>,

    // Item-related metrics
    pub items_processed: AtomicUsize,
    pub pipeline_short_circuits: AtomicUsize,
}

impl StatCollector {
    /// Creates a new `StatCollector` with all counters at zero.
    pub fn new() -> Self {
        StatCollector {
            start_time: Instant::now(),
            requests_enqueued: AtomicUsize::new(0),
            requests_rejected: AtomicUsize::new(0),
            requests_unsupported: AtomicUsize::new(0),
            fetches_started: AtomicUsize::new(0),
            fetches_succeeded: AtomicUsize::new(0),
            fetches_failed: AtomicUsize::new(0),
            responses_unprocessed: AtomicUsize::new(0),
            response_status_counts: Arc::new(dashmap::DashMap::new()),
            items_processed: AtomicUsize::new(0),
            pipeline_short_circuits: AtomicUsize::new(0),
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let response_status_counts = self
            .response_status_counts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        StatsSnapshot {
            requests_enqueued: self.requests_enqueued.load(Ordering::SeqCst),
            requests_rejected: self.requests_rejected.load(Ordering::SeqCst),
            requests_unsupported: self.requests_unsupported.load(Ordering::SeqCst),
            fetches_started: self.fetches_started.load(Ordering::SeqCst),
            fetches_succeeded: self.fetches_succeeded.load(Ordering::SeqCst),
            fetches_failed: self.fetches_failed.load(Ordering::SeqCst),
            responses_unprocessed: self.responses_unprocessed.load(Ordering::SeqCst),
            items_processed: self.items_processed.load(Ordering::SeqCst),
            pipeline_short_circuits: self.pipeline_short_circuits.load(Ordering::SeqCst),
            response_status_counts,
            elapsed_duration: self.start_time.elapsed(),
        }
    }

    /// Records the outcome of a scheduler push.
    pub(crate) fn record_push(&self, accepted: bool) {
        if accepted {
            self.requests_enqueued.fetch_add(1, Ordering::SeqCst);
        } else {
            self.requests_rejected.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn increment_requests_unsupported(&self) {
        self.requests_unsupported.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_fetches_started(&self) {
        self.fetches_started.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_fetches_succeeded(&self) {
        self.fetches_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_fetches_failed(&self) {
        self.fetches_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_responses_unprocessed(&self) {
        self.responses_unprocessed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_response_status(&self, status_code: u16) {
        *self.response_status_counts.entry(status_code).or_insert(0) += 1;
    }

    pub(crate) fn increment_items_processed(&self) {
        self.items_processed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_pipeline_short_circuits(&self) {
        self.pipeline_short_circuits.fetch_add(1, Ordering::SeqCst);
    }

    /// Converts the collector into a JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Converts the collector into a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Exports the current statistics as Markdown.
    pub fn to_markdown_string(&self) -> String {
        let snapshot = self.snapshot();
        let status_codes_output = snapshot
            .status_list("\n", |code, count| format!("- **{}**: {}", code, count))
            .unwrap_or_else(|| "N/A".to_string());

        format!(
            r#"# Crawl Statistics Report

- **Duration**: {}
- **Average Speed**: {:.2} fetch/s, {:.2} item/s

## Requests
| Metric      | Count |
|-------------|-------|
| Enqueued    | {}     |
| Duplicates  | {}     |
| Unsupported | {}     |

## Fetches
| Metric      | Count |
|-------------|-------|
| Started     | {}     |
| Succeeded   | {}     |
| Requeued    | {}     |

## Items
| Metric        | Count |
|---------------|-------|
| Processed     | {}     |
| Unprocessed   | {}     |
| Short-circuit | {}     |

## Status Codes
{}
"#,
            snapshot.formatted_duration(),
            snapshot.fetches_per_second(),
            snapshot.items_per_second(),
            snapshot.requests_enqueued,
            snapshot.requests_rejected,
            snapshot.requests_unsupported,
            snapshot.fetches_started,
            snapshot.fetches_succeeded,
            snapshot.fetches_failed,
            snapshot.items_processed,
            snapshot.responses_unprocessed,
            snapshot.pipeline_short_circuits,
            status_codes_output
        )
    }
}

impl Default for StatCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StatCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();

        writeln!(f, "\nCrawl Statistics")?;
        writeln!(f, "----------------")?;
        writeln!(f, "  duration : {}", snapshot.formatted_duration())?;
        writeln!(
            f,
            "  speed    : fetch/s: {:.2}, item/s: {:.2}",
            snapshot.fetches_per_second(),
            snapshot.items_per_second()
        )?;
        writeln!(
            f,
            "  requests : enqueued: {}, duplicate: {}, unsupported: {}",
            snapshot.requests_enqueued, snapshot.requests_rejected, snapshot.requests_unsupported
        )?;
        writeln!(
            f,
            "  fetches  : started: {}, ok: {}, requeued: {}",
            snapshot.fetches_started, snapshot.fetches_succeeded, snapshot.fetches_failed
        )?;
        writeln!(
            f,
            "  items    : processed: {}, unprocessed: {}, short-circuit: {}",
            snapshot.items_processed,
            snapshot.responses_unprocessed,
            snapshot.pipeline_short_circuits
        )?;

        let status_string = snapshot
            .status_list(", ", |code, count| format!("{}: {}", code, count))
            .unwrap_or_else(|| "none".to_string());

        writeln!(f, "  status   : {}\n", status_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_pushes_by_outcome() {
        let stats = StatCollector::new();
        stats.record_push(true);
        stats.record_push(true);
        stats.record_push(false);
        assert_eq!(stats.requests_enqueued.load(Ordering::SeqCst), 2);
        assert_eq!(stats.requests_rejected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exports_json() {
        let stats = StatCollector::new();
        stats.increment_fetches_started();
        stats.increment_fetches_succeeded();
        stats.record_response_status(200);
        stats.record_response_status(200);

        let json: serde_json::Value = serde_json::from_str(&stats.to_json_string().unwrap()).unwrap();
        assert_eq!(json["fetches_started"], 1);
        assert_eq!(json["fetches_succeeded"], 1);
        assert_eq!(json["response_status_counts"]["200"], 2);
        assert!(json.get("start_time").is_none());
    }

    #[test]
    fn display_and_markdown_list_status_codes() {
        let stats = StatCollector::new();
        assert!(stats.to_string().contains("status   : none"));
        assert!(stats.to_markdown_string().contains("N/A"));

        stats.record_response_status(404);
        stats.record_response_status(200);
        assert!(stats.to_string().contains("status   : 200: 1, 404: 1"));
        assert!(stats.to_markdown_string().contains("- **404**: 1"));
    }
}
