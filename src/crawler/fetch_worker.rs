//! Fetch stage of the crawl.
//!
//! A fetch worker polls the scheduler, downloads the request outside any
//! lock and appends the response to the handoff queue. A failed download is
//! requeued right away; there is no backoff and no retry limit.

use crate::crawler::concurrent::{MarkIdleOnPanic, Shared};
use crate::request::Request;
use std::sync::atomic::Ordering;
use tracing::{debug, trace, warn};

/// Body of a `fetch-<n>` thread.
pub(crate) fn run(shared: &Shared<'_>) {
    let _guard = MarkIdleOnPanic::new("fetch", &shared.core.tasks.scheduler, &shared.parked);
    let stats = &shared.core.stats;

    while let Some(request) = next_request(shared) {
        debug!("Executing request: {}", request);
        stats.increment_fetches_started();
        match shared.downloader.download(&request) {
            Ok(response) => {
                stats.increment_fetches_succeeded();
                stats.record_response_status(response.status);
                trace!("Handing off response for {}", response.url());
                shared.handoff.queue.lock().push_back(response);
                shared.handoff.ready.notify_all();
            }
            Err(e) => {
                warn!("Fetch of {} failed, requeueing: {}", request, e);
                stats.increment_fetches_failed();
                shared.core.tasks.requeue(request);
            }
        }
    }
    trace!("Fetch worker exiting");
}

/// Blocks until a request is available or the crawl is cancelled.
fn next_request(shared: &Shared<'_>) -> Option<Request> {
    let tasks = &shared.core.tasks;
    let mut scheduler = tasks.scheduler.lock();
    loop {
        if shared.cancelled.load(Ordering::SeqCst) {
            return None;
        }
        if let Some(request) = scheduler.poll() {
            return Some(request);
        }
        shared.parked.fetch_add(1, Ordering::SeqCst);
        debug!("Fetch worker parked");
        tasks.ready.wait(&mut scheduler);
        shared.parked.fetch_sub(1, Ordering::SeqCst);
        debug!("Fetch worker woke up");
    }
}
