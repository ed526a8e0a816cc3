//! Process stage of the crawl.
//!
//! A process worker takes fetched responses off the handoff queue, hands
//! each one to the first processor that supports it, feeds the discovered
//! requests back into the scheduler and then runs the pipeline chain over
//! the result. The selection and pipeline helpers are shared with the
//! sequential [`Crawler`](crate::Crawler).

use crate::crawler::concurrent::{MarkIdleOnPanic, Shared};
use crate::item::ResultItems;
use crate::pipeline::Pipeline;
use crate::processor::PageProcessor;
use crate::response::Response;
use crate::stats::StatCollector;
use std::sync::atomic::Ordering;
use tracing::{debug, trace, warn};

/// Returns the first processor that supports `response`.
pub(crate) fn select_processor<'a>(
    processors: &'a [Box<dyn PageProcessor>],
    response: &Response,
) -> Option<&'a dyn PageProcessor> {
    processors
        .iter()
        .find(|p| p.supports(response))
        .map(|p| p.as_ref())
}

/// Runs `items` through `pipelines` in order, stopping at the first pipeline
/// that returns `false`.
pub(crate) fn run_pipelines(
    pipelines: &[Box<dyn Pipeline>],
    items: &ResultItems,
    stats: &StatCollector,
) {
    for (idx, pipeline) in pipelines.iter().enumerate() {
        trace!(
            "Processing {} through pipeline '{}' ({} of {})",
            items.request(),
            pipeline.name(),
            idx + 1,
            pipelines.len()
        );
        if !pipeline.process(items) {
            debug!(
                "Pipeline '{}' stopped the chain for {}",
                pipeline.name(),
                items.request()
            );
            stats.increment_pipeline_short_circuits();
            return;
        }
    }
}

/// Body of a `process-<n>` thread.
pub(crate) fn run(shared: &Shared<'_>) {
    let _guard = MarkIdleOnPanic::new("process", &shared.handoff.queue, &shared.parked);
    let stats = &shared.core.stats;

    while let Some(response) = next_response(shared) {
        debug!("Processing response from {}", response.url());
        let Some(processor) = select_processor(shared.processors, &response) else {
            warn!("No processor supports response from {}; dropping it", response.url());
            stats.increment_responses_unprocessed();
            continue;
        };
        let mut items = processor.process(&response);

        let discovered = items.take_requests();
        let found = discovered.len();
        let accepted = shared.core.tasks.push_discovered(discovered, stats);
        trace!(
            "{} discovered {} requests, {} accepted",
            response.url(),
            found,
            accepted
        );

        run_pipelines(shared.pipelines, &items, stats);
        stats.increment_items_processed();
    }
    trace!("Process worker exiting");
}

/// Blocks until a response is available or the crawl is cancelled.
fn next_response(shared: &Shared<'_>) -> Option<Response> {
    let mut handoff = shared.handoff.queue.lock();
    loop {
        if shared.cancelled.load(Ordering::SeqCst) {
            return None;
        }
        if let Some(response) = handoff.pop_front() {
            return Some(response);
        }
        shared.parked.fetch_add(1, Ordering::SeqCst);
        debug!("Process worker parked");
        shared.handoff.ready.wait(&mut handoff);
        shared.parked.fetch_sub(1, Ordering::SeqCst);
        debug!("Process worker woke up");
    }
}
