//! Duplicate-filtering scheduler decorators.
//!
//! A [`FilterScheduler`] wraps another [`Scheduler`] and rejects pushes for
//! targets it has already seen. The membership test is pluggable through the
//! [`DuplicateFilter`] trait:
//!
//! - [`HashSetFilter`] keeps every identity in a `HashSet`. Exact, but memory
//!   grows with the number of distinct targets.
//! - [`BloomFilter`] keeps a fixed-size Bloom filter sized from an expected
//!   insertion count and a target false-positive rate. It never re-accepts a
//!   recorded identity, but may wrongly reject a new one as the filter fills up;
//!   such a target is dropped silently.
//!
//! Polling is delegated unchanged.

use super::Scheduler;
use crate::error::{CrawlError, Result};
use crate::request::Request;
use bloomfilter::Bloom;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Default sizing of [`BloomFilter::with_defaults`].
pub const DEFAULT_EXPECTED_INSERTIONS: usize = 500;
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Membership predicate over previously recorded target identities.
pub trait DuplicateFilter: Send {
    /// Returns `true` if `identity` has not been recorded before.
    fn should_add(&self, identity: &str) -> bool;

    /// Records `identity` as seen.
    fn record(&mut self, identity: &str);
}

/// Exact duplicate filter backed by a hash set.
#[derive(Debug, Default, Clone)]
pub struct HashSetFilter {
    seen: HashSet<String>,
}

impl HashSetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct identities recorded.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl DuplicateFilter for HashSetFilter {
    fn should_add(&self, identity: &str) -> bool {
        !self.seen.contains(identity)
    }

    fn record(&mut self, identity: &str) {
        self.seen.insert(identity.to_owned());
    }
}

/// Space-bounded duplicate filter backed by a Bloom filter.
pub struct BloomFilter {
    bloom: Bloom<str>,
    expected_insertions: usize,
    false_positive_rate: f64,
    recorded: usize,
}

impl BloomFilter {
    /// Sizes the filter for `expected_insertions` identities at the given
    /// false-positive rate.
    pub fn new(expected_insertions: usize, false_positive_rate: f64) -> Result<Self> {
        if expected_insertions == 0 {
            return Err(CrawlError::config(
                "bloom filter expected_insertions must be greater than 0",
            ));
        }
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(CrawlError::config(format!(
                "bloom filter false_positive_rate must be in (0, 1), got {false_positive_rate}"
            )));
        }
        let bloom = Bloom::new_for_fp_rate(expected_insertions, false_positive_rate)
            .map_err(|e| CrawlError::config(format!("failed to size bloom filter: {e}")))?;
        Ok(Self {
            bloom,
            expected_insertions,
            false_positive_rate,
            recorded: 0,
        })
    }

    /// 500 expected insertions at a 1% false-positive rate.
    pub fn with_defaults() -> Result<Self> {
        Self::new(DEFAULT_EXPECTED_INSERTIONS, DEFAULT_FALSE_POSITIVE_RATE)
    }

    pub fn expected_insertions(&self) -> usize {
        self.expected_insertions
    }

    pub fn false_positive_rate(&self) -> f64 {
        self.false_positive_rate
    }

    /// Number of `record` calls so far, duplicates included.
    pub fn recorded(&self) -> usize {
        self.recorded
    }
}

impl fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BloomFilter")
            .field("expected_insertions", &self.expected_insertions)
            .field("false_positive_rate", &self.false_positive_rate)
            .field("recorded", &self.recorded)
            .finish()
    }
}

impl DuplicateFilter for BloomFilter {
    fn should_add(&self, identity: &str) -> bool {
        !self.bloom.check(identity)
    }

    fn record(&mut self, identity: &str) {
        self.bloom.set(identity);
        self.recorded += 1;
    }
}

impl<F: DuplicateFilter + ?Sized> DuplicateFilter for Box<F> {
    fn should_add(&self, identity: &str) -> bool {
        (**self).should_add(identity)
    }

    fn record(&mut self, identity: &str) {
        (**self).record(identity)
    }
}

type IdentityFn = Box<dyn Fn(&Request) -> String + Send + Sync>;

/// A scheduler decorator that drops requests for already-seen targets.
pub struct FilterScheduler<S, F> {
    inner: S,
    filter: F,
    identity: IdentityFn,
}

/// Exact duplicate filtering.
pub type DistinctScheduler<S> = FilterScheduler<S, HashSetFilter>;

/// Probabilistic, space-bounded duplicate filtering.
pub type BloomFilterScheduler<S> = FilterScheduler<S, BloomFilter>;

impl<S: Scheduler> FilterScheduler<S, HashSetFilter> {
    /// Wraps `inner` with an exact hash-set filter.
    pub fn distinct(inner: S) -> Self {
        Self::new(inner, HashSetFilter::new())
    }
}

impl<S: Scheduler> FilterScheduler<S, BloomFilter> {
    /// Wraps `inner` with a Bloom filter of the given sizing.
    pub fn bloom(inner: S, expected_insertions: usize, false_positive_rate: f64) -> Result<Self> {
        Ok(Self::new(
            inner,
            BloomFilter::new(expected_insertions, false_positive_rate)?,
        ))
    }
}

impl<S: Scheduler, F: DuplicateFilter> FilterScheduler<S, F> {
    /// Wraps `inner`, identifying targets by [`Request::fingerprint`].
    pub fn new(inner: S, filter: F) -> Self {
        Self {
            inner,
            filter,
            identity: Box::new(Request::fingerprint),
        }
    }

    /// Replaces the target-identity extraction function.
    pub fn with_identity<I>(mut self, identity: I) -> Self
    where
        I: Fn(&Request) -> String + Send + Sync + 'static,
    {
        self.identity = Box::new(identity);
        self
    }

    /// Pushes `request` regardless of history. The identity is still recorded.
    pub fn push_by_force(&mut self, request: Request) -> bool {
        let identity = (self.identity)(&request);
        self.filter.record(&identity);
        self.inner.push(request)
    }

    /// Reports whether the filter considers `request` already seen, without recording it.
    pub fn has_seen(&self, request: &Request) -> bool {
        !self.filter.should_add(&(self.identity)(request))
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn filter(&self) -> &F {
        &self.filter
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Scheduler, F: DuplicateFilter> Scheduler for FilterScheduler<S, F> {
    fn push(&mut self, request: Request) -> bool {
        let identity = (self.identity)(&request);
        if !self.filter.should_add(&identity) {
            debug!("Duplicate request rejected: {}", identity);
            return false;
        }
        self.filter.record(&identity);
        self.inner.push(request)
    }

    fn poll(&mut self) -> Option<Request> {
        self.inner.poll()
    }

    // The identity was recorded when the request was first accepted.
    fn requeue(&mut self, request: Request) -> bool {
        self.inner.requeue(request)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<S: fmt::Debug, F: fmt::Debug> fmt::Debug for FilterScheduler<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterScheduler")
            .field("inner", &self.inner)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::QueueScheduler;

    fn request(url: &str) -> Request {
        Request::parse(url).unwrap()
    }

    #[test]
    fn distinct_rejects_second_push() {
        let mut scheduler = DistinctScheduler::distinct(QueueScheduler::new());
        assert!(scheduler.push(request("https://example.com/a")));
        assert!(!scheduler.push(request("https://example.com/a")));
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.filter().len(), 1);
    }

    #[test]
    fn distinct_rejects_after_poll() {
        let mut scheduler = DistinctScheduler::distinct(QueueScheduler::new());
        scheduler.push(request("https://example.com/a"));
        assert!(scheduler.poll().is_some());
        assert!(!scheduler.push(request("https://example.com/a")));
        assert!(scheduler.poll().is_none());
    }

    #[test]
    fn fragments_share_an_identity() {
        let mut scheduler = DistinctScheduler::distinct(QueueScheduler::new());
        assert!(scheduler.push(request("https://example.com/a#top")));
        assert!(!scheduler.push(request("https://example.com/a#bottom")));
    }

    #[test]
    fn push_by_force_records_and_delegates() {
        let mut scheduler = DistinctScheduler::distinct(QueueScheduler::new());
        assert!(scheduler.push(request("https://example.com/a")));
        assert!(scheduler.push_by_force(request("https://example.com/a")));
        assert_eq!(scheduler.len(), 2);

        assert!(scheduler.push_by_force(request("https://example.com/b")));
        assert!(scheduler.has_seen(&request("https://example.com/b")));
        assert!(!scheduler.push(request("https://example.com/b")));
        assert_eq!(scheduler.len(), 3);
    }

    #[test]
    fn requeue_bypasses_the_filter() {
        let mut scheduler = DistinctScheduler::distinct(QueueScheduler::new());
        scheduler.push(request("https://example.com/a"));
        let polled = scheduler.poll().unwrap();
        assert!(scheduler.requeue(polled));
        assert_eq!(scheduler.poll().unwrap().url.path(), "/a");
        assert!(!scheduler.push(request("https://example.com/a")));
    }

    #[test]
    fn has_seen_does_not_record() {
        let mut scheduler = DistinctScheduler::distinct(QueueScheduler::new());
        assert!(!scheduler.has_seen(&request("https://example.com/a")));
        assert!(scheduler.push(request("https://example.com/a")));
    }

    #[test]
    fn custom_identity_extractor() {
        let mut scheduler = DistinctScheduler::distinct(QueueScheduler::new())
            .with_identity(|r: &Request| r.url.host_str().unwrap_or_default().to_string());
        assert!(scheduler.push(request("https://example.com/a")));
        assert!(!scheduler.push(request("https://example.com/b")));
        assert!(scheduler.push(request("https://example.org/a")));
    }

    #[test]
    fn rejected_push_is_not_delegated() {
        struct Counting(usize);
        impl Scheduler for Counting {
            fn push(&mut self, _request: Request) -> bool {
                self.0 += 1;
                true
            }
            fn poll(&mut self) -> Option<Request> {
                None
            }
            fn len(&self) -> usize {
                0
            }
        }

        let mut scheduler = FilterScheduler::new(Counting(0), HashSetFilter::new());
        scheduler.push(request("https://example.com/a"));
        scheduler.push(request("https://example.com/a"));
        assert_eq!(scheduler.inner().0, 1);
    }

    #[test]
    fn bloom_rejects_invalid_sizing() {
        assert!(BloomFilter::new(0, 0.01).is_err());
        assert!(BloomFilter::new(100, 0.0).is_err());
        assert!(BloomFilter::new(100, 1.0).is_err());
        assert!(BloomFilter::new(100, f64::NAN).is_err());
    }

    #[test]
    fn bloom_has_no_false_negatives() {
        let mut scheduler =
            BloomFilterScheduler::bloom(QueueScheduler::new(), 2_000, 0.01).unwrap();
        let urls: Vec<String> = (0..2_000)
            .map(|i| format!("https://example.com/page/{i}"))
            .collect();
        for url in &urls {
            scheduler.push(request(url));
        }
        for url in &urls {
            assert!(!scheduler.push(request(url)), "re-accepted {url}");
        }
        assert_eq!(scheduler.filter().recorded(), scheduler.len());
    }

    #[test]
    fn bloom_false_positive_rate_stays_near_target() {
        let mut filter = BloomFilter::new(10_000, 0.01).unwrap();
        for i in 0..10_000 {
            filter.record(&format!("https://seen.example.com/{i}"));
        }
        let trials = 10_000;
        let false_positives = (0..trials)
            .filter(|i| !filter.should_add(&format!("https://unseen.example.org/{i}")))
            .count();
        let rate = false_positives as f64 / trials as f64;
        assert!(rate < 0.03, "false positive rate {rate} too high");
    }

    #[test]
    fn bloom_defaults() {
        let filter = BloomFilter::with_defaults().unwrap();
        assert_eq!(filter.expected_insertions(), DEFAULT_EXPECTED_INSERTIONS);
        assert_eq!(filter.false_positive_rate(), DEFAULT_FALSE_POSITIVE_RATE);
        assert_eq!(filter.recorded(), 0);
    }

    #[test]
    fn boxed_filter_composes() {
        let filter: Box<dyn DuplicateFilter> = Box::new(HashSetFilter::new());
        let mut scheduler = FilterScheduler::new(QueueScheduler::new(), filter);
        assert!(scheduler.push(request("https://example.com/a")));
        assert!(!scheduler.push(request("https://example.com/a")));
    }
}
