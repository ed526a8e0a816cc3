//! # Pipeline Module
//!
//! Output sinks for processed [`ResultItems`].
//!
//! ## Overview
//!
//! Pipelines are registered as an ordered chain. Every `ResultItems` produced
//! by a processor is handed to each pipeline in registration order. A pipeline
//! returns `true` to pass the carrier on and `false` to stop the chain for that
//! carrier only; later carriers still go through the whole chain.
//!
//! Pipelines are shared across process workers and must accept concurrent
//! calls to [`Pipeline::process`]. Each one is closed exactly once at the end
//! of the crawl; a failing `close` is logged and does not keep the remaining
//! pipelines from closing.
//!
//! ## Provided pipelines
//!
//! - [`WriterPipeline`]: writes a plain-text block per carrier to any `Write`.
//! - [`ConsolePipeline`]: a `WriterPipeline` over standard output.
//! - [`FilePipeline`]: a `WriterPipeline` over a buffered file.

mod console;
mod writer;

pub use console::ConsolePipeline;
pub use writer::{FilePipeline, WriterPipeline};

use crate::item::ResultItems;

/// Output-sink capability.
pub trait Pipeline: Send + Sync {
    /// A short name used in log messages.
    fn name(&self) -> &str;

    /// Consumes one carrier. Returns `false` to skip the remaining pipelines for it.
    fn process(&self, items: &ResultItems) -> bool;

    /// Releases held resources. Called once when the crawl ends.
    fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<P: Pipeline + ?Sized> Pipeline for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn process(&self, items: &ResultItems) -> bool {
        (**self).process(items)
    }

    fn close(&self) -> anyhow::Result<()> {
        (**self).close()
    }
}
