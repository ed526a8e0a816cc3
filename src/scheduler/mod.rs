//! # Scheduler Module
//!
//! Implements the task queue that holds the crawl frontier, plus the
//! duplicate-filtering decorators in [`filter`].
//!
//! ## Overview
//!
//! A [`Scheduler`] is a plain mutable collection of pending
//! [`Request`]s with two operations: `push` adds a request (returning whether
//! it was accepted) and `poll` removes one, or returns `None` when nothing is
//! pending. `poll` never blocks; waiting for work is layered on top by the
//! orchestrators.
//!
//! Schedulers are not synchronized. The orchestrators own the scheduler behind
//! a single lock and only touch it while holding that lock.
//!
//! ## Ordering
//!
//! The order in which requests come back is a property of the implementation,
//! not of the trait. [`QueueScheduler`] is FIFO by default and can be switched
//! to LIFO for depth-first crawls. The only contract is that a request handed
//! out by `poll` is never handed out again unless it has been pushed again.
//!
//! ## Example
//!
//! ```rust
//! use spider_engine::{Request, Scheduler};
//! use spider_engine::scheduler::{DistinctScheduler, QueueScheduler};
//!
//! let mut scheduler = DistinctScheduler::distinct(QueueScheduler::new());
//! let request = Request::parse("https://example.com").unwrap();
//! assert!(scheduler.push(request.clone()));
//! assert!(!scheduler.push(request));
//! assert!(scheduler.poll().is_some());
//! assert!(scheduler.poll().is_none());
//! ```

pub mod filter;

pub use filter::{
    BloomFilter, BloomFilterScheduler, DistinctScheduler, DuplicateFilter, FilterScheduler,
    HashSetFilter,
};

use crate::request::Request;
use std::collections::VecDeque;
use tracing::trace;

/// A mutable collection of pending requests.
pub trait Scheduler: Send {
    /// Adds a request. Returns `true` if it was accepted.
    fn push(&mut self, request: Request) -> bool;

    /// Removes and returns one pending request, or `None` if there is none.
    fn poll(&mut self) -> Option<Request>;

    /// Puts back a request handed out by `poll` whose fetch failed.
    /// Duplicate filters must not reject it.
    fn requeue(&mut self, request: Request) -> bool {
        self.push(request)
    }

    /// Number of pending requests.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Scheduler + ?Sized> Scheduler for Box<S> {
    fn push(&mut self, request: Request) -> bool {
        (**self).push(request)
    }

    fn poll(&mut self) -> Option<Request> {
        (**self).poll()
    }

    fn requeue(&mut self, request: Request) -> bool {
        (**self).requeue(request)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }
}

/// Retrieval order of a [`QueueScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueOrder {
    /// Breadth-first: oldest request first.
    #[default]
    Fifo,
    /// Depth-first: newest request first.
    Lifo,
}

/// An unbounded in-memory queue of requests.
#[derive(Debug, Default)]
pub struct QueueScheduler {
    queue: VecDeque<Request>,
    order: QueueOrder,
}

impl QueueScheduler {
    /// Creates an empty FIFO queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty queue with the given retrieval order.
    pub fn with_order(order: QueueOrder) -> Self {
        Self {
            queue: VecDeque::new(),
            order,
        }
    }

    pub fn order(&self) -> QueueOrder {
        self.order
    }
}

impl Scheduler for QueueScheduler {
    fn push(&mut self, request: Request) -> bool {
        trace!("Queueing request: {}", request.url);
        self.queue.push_back(request);
        true
    }

    fn poll(&mut self) -> Option<Request> {
        match self.order {
            QueueOrder::Fifo => self.queue.pop_front(),
            QueueOrder::Lifo => self.queue.pop_back(),
        }
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

impl Extend<Request> for QueueScheduler {
    fn extend<I: IntoIterator<Item = Request>>(&mut self, iter: I) {
        for request in iter {
            self.push(request);
        }
    }
}

impl FromIterator<Request> for QueueScheduler {
    fn from_iter<I: IntoIterator<Item = Request>>(iter: I) -> Self {
        let mut scheduler = QueueScheduler::new();
        scheduler.extend(iter);
        scheduler
    }
}
