//! The sequential crawler and the state shared by every orchestrator.
//!
//! This module defines [`CrawlerCore`], which holds what both orchestrators
//! have in common: the lifecycle cell, the scheduler behind its lock, the
//! registered capabilities and the statistics. It also defines [`Crawler`],
//! the single-threaded reference engine that drives one request at a time
//! through fetch, process and the pipeline chain.
//!
//! Configuration methods take `&self` so a crawler can be shared across
//! threads. They only succeed while the crawler is initializing; the
//! configuration lock is held across the state check, so a change can never
//! race past a concurrent `start`.

use crate::crawler::process_worker::{run_pipelines, select_processor};
use crate::downloader::Downloader;
use crate::error::{CrawlError, Result};
use crate::pipeline::Pipeline;
use crate::processor::PageProcessor;
use crate::request::Request;
use crate::scheduler::Scheduler;
use crate::state::{Lifecycle, LifecycleState};
use crate::stats::StatCollector;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// The registered capabilities, frozen when the crawl starts.
#[derive(Default)]
pub(crate) struct Components {
    pub(crate) downloaders: Vec<Box<dyn Downloader>>,
    pub(crate) processors: Vec<Box<dyn PageProcessor>>,
    pub(crate) pipelines: Vec<Box<dyn Pipeline>>,
}

impl Components {
    /// Closes every downloader and pipeline. A failing `close` is logged and
    /// the remaining resources are still closed.
    pub(crate) fn release(&self) {
        for downloader in &self.downloaders {
            match downloader.close() {
                Ok(()) => debug!("Downloader '{}' closed", downloader.name()),
                Err(e) => error!("Failed to close downloader '{}': {:#}", downloader.name(), e),
            }
        }
        for pipeline in &self.pipelines {
            match pipeline.close() {
                Ok(()) => debug!("Pipeline '{}' closed", pipeline.name()),
                Err(e) => error!("Failed to close pipeline '{}': {:#}", pipeline.name(), e),
            }
        }
    }
}

/// The scheduler together with the condition fetch workers park on.
pub(crate) struct TaskQueue {
    pub(crate) scheduler: Mutex<Box<dyn Scheduler>>,
    pub(crate) ready: Condvar,
}

impl TaskQueue {
    fn new(scheduler: Box<dyn Scheduler>) -> Self {
        Self {
            scheduler: Mutex::new(scheduler),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn poll(&self) -> Option<Request> {
        self.scheduler.lock().poll()
    }

    /// Pushes discovered requests and wakes every parked fetch worker if at
    /// least one was accepted. Returns the number accepted.
    pub(crate) fn push_discovered(&self, requests: Vec<Request>, stats: &StatCollector) -> usize {
        if requests.is_empty() {
            return 0;
        }
        let mut scheduler = self.scheduler.lock();
        let mut accepted = 0;
        for request in requests {
            let ok = scheduler.push(request);
            stats.record_push(ok);
            if ok {
                accepted += 1;
            }
        }
        if accepted > 0 {
            trace!("Pushed {} discovered requests, notifying fetch workers", accepted);
            self.ready.notify_all();
        }
        accepted
    }

    /// Puts a failed request back for another attempt.
    pub(crate) fn requeue(&self, request: Request) {
        let mut scheduler = self.scheduler.lock();
        if !scheduler.requeue(request) {
            warn!("Scheduler refused a requeued request; it is lost");
        }
        self.ready.notify_one();
    }
}

/// State shared by [`Crawler`] and [`ConcurrentCrawler`](crate::ConcurrentCrawler).
pub(crate) struct CrawlerCore {
    pub(crate) lifecycle: Lifecycle,
    pub(crate) tasks: TaskQueue,
    config: Mutex<Components>,
    pub(crate) stats: Arc<StatCollector>,
}

impl CrawlerCore {
    pub(crate) fn new(scheduler: Box<dyn Scheduler>) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            tasks: TaskQueue::new(scheduler),
            config: Mutex::new(Components::default()),
            stats: Arc::new(StatCollector::new()),
        }
    }

    /// Runs `change` on the configuration if, and only if, the crawler is
    /// still initializing.
    pub(crate) fn configure<T>(
        &self,
        action: &'static str,
        change: impl FnOnce(&mut Components) -> Result<T>,
    ) -> Result<T> {
        let mut config = self.config.lock();
        self.lifecycle.ensure_initializing(action)?;
        change(&mut config)
    }

    pub(crate) fn add_start_request(&self, request: Request) -> Result<bool> {
        self.configure("add a start request", |_| {
            let accepted = self.tasks.scheduler.lock().push(request);
            self.stats.record_push(accepted);
            Ok(accepted)
        })
    }

    pub(crate) fn set_scheduler(&self, scheduler: Box<dyn Scheduler>) -> Result<()> {
        self.configure("replace the scheduler", |_| {
            *self.tasks.scheduler.lock() = scheduler;
            Ok(())
        })
    }

    /// Validates the configuration with `check`, enters `Running` and hands
    /// out the frozen capabilities.
    pub(crate) fn begin(
        &self,
        check: impl FnOnce(&Components) -> Result<()>,
    ) -> Result<Components> {
        let mut config = self.config.lock();
        self.lifecycle.ensure_initializing("start the crawler")?;
        check(&config)?;
        self.lifecycle.begin()?;
        Ok(std::mem::take(&mut *config))
    }

    /// Enters `Ended` and releases the capabilities.
    pub(crate) fn end(&self, components: Components) {
        if let Err(e) = self.lifecycle.finish() {
            error!("Unexpected lifecycle state at the end of the crawl: {}", e);
        }
        info!("Releasing downloaders and pipelines...");
        components.release();
        info!("Crawl finished. {}", self.stats);
    }
}

/// The single-threaded reference crawler.
///
/// Each request is polled, fetched with the first downloader that supports
/// it, processed by the first processor that supports the response, passed
/// through the pipeline chain, and its discovered requests are pushed back
/// into the scheduler. The crawl ends when the scheduler runs dry.
pub struct Crawler {
    core: CrawlerCore,
}

impl Crawler {
    /// Creates a crawler around `scheduler`, with no capabilities registered.
    pub fn new(scheduler: impl Scheduler + 'static) -> Self {
        Self {
            core: CrawlerCore::new(Box::new(scheduler)),
        }
    }

    /// Creates a crawler around `scheduler` with one downloader registered.
    pub fn with_downloader(
        scheduler: impl Scheduler + 'static,
        downloader: impl Downloader + 'static,
    ) -> Self {
        let crawler = Self::new(scheduler);
        crawler
            .core
            .config
            .lock()
            .downloaders
            .push(Box::new(downloader));
        crawler
    }

    pub fn add_downloader(&self, downloader: impl Downloader + 'static) -> Result<()> {
        self.core.configure("add a downloader", |config| {
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

    /// Returns the statistics of this crawler. Readable during the crawl.
    pub fn stats(&self) -> Arc<StatCollector> {
        Arc::clone(&self.core.stats)
    }

    /// Runs the crawl to completion on the calling thread.
    ///
    /// Fails only if the crawler has already been started.
    pub fn start(&self) -> Result<()> {
        let components = self.core.begin(|_| Ok(()))?;
        info!(
            "Crawler starting with {} downloaders, {} processors, {} pipelines",
            components.downloaders.len(),
            components.processors.len(),
            components.pipelines.len()
        );
        self.run(&components);
        self.core.end(components);
        Ok(())
    }

    fn run(&self, components: &Components) {
        let stats = &self.core.stats;
        while let Some(request) = self.core.tasks.poll() {
            let Some(downloader) = components
                .downloaders
                .iter()
                .find(|d| d.supports(&request))
            else {
                warn!("No downloader supports request {}; dropping it", request);
                stats.increment_requests_unsupported();
                continue;
            };

            debug!("Executing request: {}", request);
            stats.increment_fetches_started();
            let response = match downloader.download(&request) {
                Ok(response) => response,
                Err(e) => {
                    warn!("Fetch of {} failed, requeueing: {}", request, e);
                    stats.increment_fetches_failed();
                    self.core.tasks.requeue(request);
                    continue;
                }
            };
            stats.increment_fetches_succeeded();
            stats.record_response_status(response.status);

            let Some(processor) = select_processor(&components.processors, &response) else {
                warn!("No processor supports response from {}; dropping it", response.url());
                stats.increment_responses_unprocessed();
                continue;
            };
            let mut items = processor.process(&response);

            run_pipelines(&components.pipelines, &items, stats);
            stats.increment_items_processed();
            self.core.tasks.push_discovered(items.take_requests(), stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DownloadError;
    use crate::item::ResultItems;
    use crate::response::Response;
    use crate::scheduler::{DistinctScheduler, QueueScheduler};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves pages from a link graph; each URL in `flaky` fails its first fetch.
    struct GraphDownloader {
        links: HashMap<&'static str, Vec<&'static str>>,
        flaky: Mutex<Vec<&'static str>>,
        closed: Arc<AtomicUsize>,
    }

    impl Downloader for GraphDownloader {
        fn download(&self, request: &Request) -> std::result::Result<Response, DownloadError> {
            let path = request.url.path().trim_start_matches('/').to_string();
            let mut flaky = self.flaky.lock();
            if let Some(pos) = flaky.iter().position(|p| *p == path) {
                flaky.remove(pos);
                return Err(DownloadError::other("connection reset"));
            }
            let body = self.links.get(path.as_str()).cloned().unwrap_or_default().join(" ");
            Ok(Response::new(request.clone(), 200, body))
        }

        fn close(&self) -> anyhow::Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct LinkProcessor;

    impl PageProcessor for LinkProcessor {
        fn supports(&self, _response: &Response) -> bool {
            true
        }

        fn process(&self, response: &Response) -> ResultItems {
            let mut items = ResultItems::new(response.request().clone());
            items.put("page", response.url().path());
            for link in response.text().split_whitespace() {
                let url = format!("https://site.test/{link}");
                items.add_request(Request::parse(&url).unwrap());
            }
            items
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        pages: Arc<Mutex<Vec<String>>>,
        fail_close: bool,
        closed: Arc<AtomicUsize>,
    }

    impl Pipeline for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn process(&self, items: &ResultItems) -> bool {
            let page = items.get("page").and_then(|v| v.as_str()).unwrap_or_default();
            self.pages.lock().push(page.to_string());
            true
        }

        fn close(&self) -> anyhow::Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                anyhow::bail!("sink already gone");
            }
            Ok(())
        }
    }

    fn request(path: &str) -> Request {
        Request::parse(&format!("https://site.test/{path}")).unwrap()
    }

    fn graph(flaky: Vec<&'static str>) -> (GraphDownloader, Arc<AtomicUsize>) {
        let closed = Arc::new(AtomicUsize::new(0));
        let downloader = GraphDownloader {
            links: HashMap::from([("a", vec!["c"]), ("b", vec!["a"]), ("c", vec!["a", "b"])]),
            flaky: Mutex::new(flaky),
            closed: Arc::clone(&closed),
        };
        (downloader, closed)
    }

    #[test]
    fn crawls_until_the_scheduler_is_empty() {
        let (downloader, downloader_closed) = graph(vec!["a"]);
        let crawler =
            Crawler::with_downloader(DistinctScheduler::distinct(QueueScheduler::new()), downloader);
        let recorder = Recorder::default();
        crawler.add_processor(LinkProcessor).unwrap();
        crawler.add_pipeline(recorder.clone()).unwrap();
        crawler.add_start_request(request("a")).unwrap();
        crawler.add_start_request(request("b")).unwrap();

        crawler.start().unwrap();

        let mut pages = recorder.pages.lock().clone();
        pages.sort();
        assert_eq!(pages, ["/a", "/b", "/c"]);
        assert_eq!(crawler.state(), LifecycleState::Ended);
        assert_eq!(downloader_closed.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.closed.load(Ordering::SeqCst), 1);

        let stats = crawler.stats();
        assert_eq!(stats.fetches_failed.load(Ordering::SeqCst), 1);
        assert_eq!(stats.fetches_succeeded.load(Ordering::SeqCst), 3);
        assert_eq!(stats.items_processed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn rejects_configuration_after_start() {
        let (downloader, _) = graph(vec![]);
        let crawler = Crawler::with_downloader(QueueScheduler::new(), downloader);
        crawler.start().unwrap();

        assert!(crawler.add_processor(LinkProcessor).unwrap_err().is_illegal_state());
        assert!(crawler.add_pipeline(Recorder::default()).unwrap_err().is_illegal_state());
        assert!(crawler.add_start_request(request("a")).unwrap_err().is_illegal_state());
        assert!(crawler.set_scheduler(QueueScheduler::new()).unwrap_err().is_illegal_state());
        assert!(crawler.start().unwrap_err().is_illegal_state());
        assert_eq!(crawler.state(), LifecycleState::Ended);
    }

    #[test]
    fn drops_responses_without_a_processor() {
        let (downloader, _) = graph(vec![]);
        let crawler = Crawler::with_downloader(QueueScheduler::new(), downloader);
        let recorder = Recorder::default();
        crawler.add_pipeline(recorder.clone()).unwrap();
        crawler.add_start_request(request("a")).unwrap();

        crawler.start().unwrap();

        assert!(recorder.pages.lock().is_empty());
        assert_eq!(crawler.stats().responses_unprocessed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drops_requests_no_downloader_supports() {
        struct HttpsOnly;
        impl Downloader for HttpsOnly {
            fn supports(&self, request: &Request) -> bool {
                request.url.scheme() == "https"
            }
            fn download(&self, request: &Request) -> std::result::Result<Response, DownloadError> {
                Ok(Response::new(request.clone(), 200, ""))
            }
        }

        let crawler = Crawler::with_downloader(QueueScheduler::new(), HttpsOnly);
        crawler.add_processor(LinkProcessor).unwrap();
        crawler
            .add_start_request(Request::parse("ftp://files.test/pub").unwrap())
            .unwrap();
        crawler.add_start_request(request("x")).unwrap();

        crawler.start().unwrap();

        let stats = crawler.stats();
        assert_eq!(stats.requests_unsupported.load(Ordering::SeqCst), 1);
        assert_eq!(stats.items_processed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_continues_past_a_failing_pipeline() {
        let (downloader, downloader_closed) = graph(vec![]);
        let crawler = Crawler::with_downloader(QueueScheduler::new(), downloader);
        let failing = Recorder {
            fail_close: true,
            ..Recorder::default()
        };
        let healthy = Recorder::default();
        crawler.add_pipeline(failing.clone()).unwrap();
        crawler.add_pipeline(healthy.clone()).unwrap();

        crawler.start().unwrap();

        assert_eq!(downloader_closed.load(Ordering::SeqCst), 1);
        assert_eq!(failing.closed.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.closed.load(Ordering::SeqCst), 1);
    }
}
