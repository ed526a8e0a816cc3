use super::{Pipeline, WriterPipeline};
use crate::item::ResultItems;
use std::io::{self, Stdout};

/// Prints every carrier to standard output. Installed by
/// [`CrawlerBuilder`](crate::CrawlerBuilder) when no pipeline is registered.
pub struct ConsolePipeline {
    inner: WriterPipeline<Stdout>,
}

impl ConsolePipeline {
    pub fn new() -> Self {
        Self {
            inner: WriterPipeline::named("console", io::stdout()),
        }
    }
}

impl Default for ConsolePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline for ConsolePipeline {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn process(&self, items: &ResultItems) -> bool {
        self.inner.process(items)
    }

    fn close(&self) -> anyhow::Result<()> {
        self.inner.close()
    }
}
