//! # Concurrent Crawler
//!
//! A thread-pool orchestrator with two fixed stages.
//!
//! ## Architecture
//!
//! `F` fetch workers poll the scheduler and download; `P` process workers
//! take the downloaded responses off a handoff queue, run the processors and
//! pipelines, and push discovered requests back into the scheduler. The
//! scheduler is guarded by one lock (the task lock) and the handoff queue by
//! another (the handoff lock). No worker ever holds both.
//!
//! A worker with nothing to do parks on its queue's condition variable and
//! is counted in `parked`. That counter only changes while the worker holds
//! the lock of the queue it parks on.
//!
//! ## Completion
//!
//! There is no explicit "done" message. The calling thread runs a control
//! loop that wakes every `wait` interval, takes the task lock and then the
//! handoff lock, and declares the crawl complete when every worker is parked
//! and both queues are empty. Because each change of `parked` happens under
//! one of those locks, the sample is exact: a worker in the middle of a fetch
//! or of processing is never parked.
//!
//! ## Cancellation
//!
//! Completion and an external [`StopHandle::stop`] both raise the same
//! cancellation flag and wake every parked worker. Workers observe the flag
//! only when they next look for work; a fetch or process call in progress
//! runs to completion. Workers are then joined, the crawler enters `Ended`
//! and the downloader and pipelines are closed.

use crate::crawler::core::{Components, CrawlerCore};
use crate::crawler::{fetch_worker, process_worker};
use crate::downloader::Downloader;
use crate::error::{CrawlError, Result};
use crate::pipeline::Pipeline;
use crate::processor::PageProcessor;
use crate::request::Request;
use crate::response::Response;
use crate::scheduler::Scheduler;
use crate::state::LifecycleState;
use crate::stats::StatCollector;
use kanal::{Receiver, ReceiveErrorTimeout, Sender};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

pub const DEFAULT_FETCH_WORKERS: usize = 5;
pub const DEFAULT_PROCESS_WORKERS: usize = 1;
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_millis(500);

/// Fetched responses waiting for a process worker.
pub(crate) struct Handoff {
    pub(crate) queue: Mutex<VecDeque<Response>>,
    pub(crate) ready: Condvar,
}

/// Everything the workers of one crawl share.
pub(crate) struct Shared<'a> {
    pub(crate) core: &'a CrawlerCore,
    pub(crate) downloader: &'a dyn Downloader,
    pub(crate) processors: &'a [Box<dyn PageProcessor>],
    pub(crate) pipelines: &'a [Box<dyn Pipeline>],
    pub(crate) handoff: Handoff,
    pub(crate) parked: AtomicUsize,
    pub(crate) cancelled: AtomicBool,
    total_workers: usize,
}

impl<'a> Shared<'a> {
    fn new(
        core: &'a CrawlerCore,
        downloader: &'a dyn Downloader,
        components: &'a Components,
        total_workers: usize,
    ) -> Self {
        Self {
            core,
            downloader,
            processors: &components.processors,
            pipelines: &components.pipelines,
            handoff: Handoff {
                queue: Mutex::new(VecDeque::new()),
                ready: Condvar::new(),
            },
            parked: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            total_workers,
        }
    }

    /// Every worker parked and nothing pending in either queue.
    fn is_quiescent(&self) -> bool {
        let scheduler = self.core.tasks.scheduler.lock();
        let handoff = self.handoff.queue.lock();
        let parked = self.parked.load(Ordering::SeqCst);
        trace!(
            "Quiescence sample: {}/{} parked, {} queued, {} handed off",
            parked,
            self.total_workers,
            scheduler.len(),
            handoff.len()
        );
        parked == self.total_workers && scheduler.is_empty() && handoff.is_empty()
    }

    /// Raises the cancellation flag and wakes every parked worker.
    fn cancel_all(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        {
            let _scheduler = self.core.tasks.scheduler.lock();
            self.core.tasks.ready.notify_all();
        }
        let _handoff = self.handoff.queue.lock();
        self.handoff.ready.notify_all();
    }
}

/// Counts a worker as parked for good if its thread unwinds, so that the
/// remaining workers can still reach quiescence.
pub(crate) struct MarkIdleOnPanic<'a, T: ?Sized> {
    role: &'static str,
    lock: &'a Mutex<T>,
    parked: &'a AtomicUsize,
}

impl<'a, T: ?Sized> MarkIdleOnPanic<'a, T> {
    pub(crate) fn new(role: &'static str, lock: &'a Mutex<T>, parked: &'a AtomicUsize) -> Self {
        Self { role, lock, parked }
    }
}

impl<T: ?Sized> Drop for MarkIdleOnPanic<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            let _held = self.lock.lock();
            self.parked.fetch_add(1, Ordering::SeqCst);
            error!(
                "A {} worker ({}) panicked; its in-flight work is lost",
                self.role,
                thread::current().name().unwrap_or("unnamed")
            );
        }
    }
}

/// Interrupts the control loop of a [`ConcurrentCrawler`] from any thread.
///
/// A stop sent before [`ConcurrentCrawler::start`] ends the crawl at the
/// first control-loop iteration.
#[derive(Clone)]
pub struct StopHandle {
    tx: Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        if self.tx.send(()).is_err() {
            debug!("Stop channel closed; crawler already gone");
        }
    }
}

/// Multi-threaded crawler with a fetch pool and a process pool.
///
/// All fetch workers share one [`Downloader`]. Processors and pipelines are
/// called concurrently when there is more than one process worker.
pub struct ConcurrentCrawler {
    core: CrawlerCore,
    fetch_workers: usize,
    process_workers: usize,
    wait: Duration,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl ConcurrentCrawler {
    /// Creates a crawler with `fetch_workers` fetch threads, `process_workers`
    /// process threads and a quiescence check every `wait`.
    pub fn new(
        scheduler: impl Scheduler + 'static,
        downloader: impl Downloader + 'static,
        fetch_workers: usize,
        process_workers: usize,
        wait: Duration,
    ) -> Result<Self> {
        if fetch_workers == 0 {
            return Err(CrawlError::config("fetch_workers must be at least 1"));
        }
        if process_workers == 0 {
            return Err(CrawlError::config("process_workers must be at least 1"));
        }
        if wait.is_zero() {
            return Err(CrawlError::config("wait interval must be greater than zero"));
        }
        let crawler = Self::unconfigured(scheduler, fetch_workers, process_workers, wait);
        crawler.add_downloader(downloader)?;
        Ok(crawler)
    }

    /// Creates a crawler with the default pool sizes and wait interval.
    pub fn with_defaults(
        scheduler: impl Scheduler + 'static,
        downloader: impl Downloader + 'static,
    ) -> Result<Self> {
        Self::new(
            scheduler,
            downloader,
            DEFAULT_FETCH_WORKERS,
            DEFAULT_PROCESS_WORKERS,
            DEFAULT_WAIT_INTERVAL,
        )
    }

    /// A crawler with no downloader yet. Pool sizes must already be validated.
    pub(crate) fn unconfigured(
        scheduler: impl Scheduler + 'static,
        fetch_workers: usize,
        process_workers: usize,
        wait: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = kanal::unbounded();
        Self {
            core: CrawlerCore::new(Box::new(scheduler)),
            fetch_workers,
            process_workers,
            wait,
            stop_tx,
            stop_rx,
        }
    }

    /// Registers the shared downloader. Only one may be registered.
    pub fn add_downloader(&self, downloader: impl Downloader + 'static) -> Result<()> {
        self.core.configure("add a downloader", |config| {
            if let Some(existing) = config.downloaders.first() {
                return Err(CrawlError::config(format!(
                    "concurrent crawler already uses downloader '{}'",
                    existing.name()
                )));
            }
            config.downloaders.push(Box::new(downloader));
            Ok(())
        })
    }

    pub fn add_processor(&self, processor: impl PageProcessor + 'static) -> Result<()> {
        self.core.configure("add a processor", |config| {
            config.processors.push(Box::new(processor));
            Ok(())
        })
    }

    pub fn add_pipeline(&self, pipeline: impl Pipeline + 'static) -> Result<()> {
        self.core.configure("add a pipeline", |config| {
            config.pipelines.push(Box::new(pipeline));
            Ok(())
        })
    }

    /// Pushes a seed request. Returns whether the scheduler accepted it.
    pub fn add_start_request(&self, request: Request) -> Result<bool> {
        self.core.add_start_request(request)
    }

    pub fn set_scheduler(&self, scheduler: impl Scheduler + 'static) -> Result<()> {
        self.core.set_scheduler(Box::new(scheduler))
    }

    pub fn state(&self) -> LifecycleState {
        self.core.lifecycle.current()
    }

    pub fn has_started(&self) -> bool {
        self.core.lifecycle.has_started()
    }

    pub fn stats(&self) -> Arc<StatCollector> {
        Arc::clone(&self.core.stats)
    }

    pub fn fetch_workers(&self) -> usize {
        self.fetch_workers
    }

    pub fn process_workers(&self) -> usize {
        self.process_workers
    }

    pub fn wait_interval(&self) -> Duration {
        self.wait
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    /// Runs the crawl and blocks until it completes or is stopped.
    ///
    /// Fails with `IllegalState` if the crawler was already started, with
    /// `Configuration` if no downloader is registered, and with `WorkerSpawn`
    /// if a worker thread could not be created. In the last case the crawler
    /// still ends and releases its resources.
    pub fn start(&self) -> Result<()> {
        let components = self.core.begin(|config| {
            if config.downloaders.is_empty() {
                Err(CrawlError::config("concurrent crawler has no downloader"))
            } else {
                Ok(())
            }
        })?;
        let outcome = match components.downloaders.first() {
            Some(downloader) => self.run(&components, downloader.as_ref()),
            None => Err(CrawlError::config("concurrent crawler has no downloader")),
        };
        self.core.end(components);
        outcome
    }

    fn run(&self, components: &Components, downloader: &dyn Downloader) -> Result<()> {
        let total = self.fetch_workers + self.process_workers;
        let shared = Shared::new(&self.core, downloader, components, total);
        info!(
            "Crawler starting with {} fetch workers, {} process workers, {} processors, {} pipelines",
            self.fetch_workers,
            self.process_workers,
            components.processors.len(),
            components.pipelines.len()
        );

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(total);
            let mut spawn_error = None;

            let workers = (0..self.fetch_workers)
                .map(|n| (format!("fetch-{n}"), fetch_worker::run as fn(&Shared<'_>)))
                .chain(
                    (0..self.process_workers)
                        .map(|n| (format!("process-{n}"), process_worker::run as fn(&Shared<'_>))),
                );
            for (name, body) in workers {
                let shared = &shared;
                match thread::Builder::new()
                    .name(name.clone())
                    .spawn_scoped(scope, move || body(shared))
                {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        error!("Failed to spawn worker '{}': {}", name, e);
                        spawn_error = Some(CrawlError::WorkerSpawn(e));
                        break;
                    }
                }
            }

            if spawn_error.is_none() {
                self.await_completion(&shared);
            }

            trace!("Cancelling {} workers", handles.len());
            shared.cancel_all();
            for handle in handles {
                let name = handle.thread().name().unwrap_or("worker").to_string();
                match handle.join() {
                    Ok(()) => trace!("Worker '{}' joined", name),
                    Err(_) => error!("Worker '{}' terminated by a panic", name),
                }
            }

            match spawn_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }

    /// The control loop: returns on quiescence or on an external stop.
    fn await_completion(&self, shared: &Shared<'_>) {
        loop {
            match self.stop_rx.recv_timeout(self.wait) {
                Ok(()) => {
                    info!("Stop requested, cancelling workers");
                    return;
                }
                Err(ReceiveErrorTimeout::Timeout) => {
                    if shared.is_quiescent() {
                        info!("All workers idle and no work pending, crawl complete");
                        return;
                    }
                }
                Err(e) => {
                    warn!("Stop channel failed ({:?}), cancelling workers", e);
                    return;
                }
            }
        }
    }
}
