use super::Pipeline;
use crate::error::Result;
use crate::item::ResultItems;
use parking_lot::Mutex;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::error;

const HEADER_RULE: &str = "-----------------------------------";
const FOOTER_RULE: &str = "===================================";

/// Writes every carrier as a plain-text block:
///
/// ```text
/// GET https://example.com/:
/// -----------------------------------
/// title: Example Domain
/// ===================================
/// ```
///
/// Fields are written in key order. Write errors are logged and the chain
/// continues.
pub struct WriterPipeline<W: Write + Send> {
    name: String,
    out: Mutex<W>,
}

impl<W: Write + Send> WriterPipeline<W> {
    pub fn new(out: W) -> Self {
        Self::named("writer", out)
    }

    pub fn named(name: impl Into<String>, out: W) -> Self {
        Self {
            name: name.into(),
            out: Mutex::new(out),
        }
    }

    /// Consumes the pipeline and returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn write_block(&self, items: &ResultItems) -> io::Result<()> {
        let mut fields: Vec<_> = items.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));

        // One lock per block so blocks from concurrent workers never interleave.
        let mut out = self.out.lock();
        writeln!(out, "{}:", items.request())?;
        writeln!(out, "{HEADER_RULE}")?;
        for (key, value) in fields {
            match value {
                Value::String(s) => writeln!(out, "{key}: {s}")?,
                other => writeln!(out, "{key}: {other}")?,
            }
        }
        writeln!(out, "{FOOTER_RULE}")?;
        Ok(())
    }
}

impl<W: Write + Send> Pipeline for WriterPipeline<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, items: &ResultItems) -> bool {
        if let Err(e) = self.write_block(items) {
            error!(
                "Pipeline '{}' failed to write result for {}: {}",
                self.name,
                items.request().url,
                e
            );
        }
        true
    }

    fn close(&self) -> anyhow::Result<()> {
        self.out.lock().flush()?;
        Ok(())
    }
}

/// Writes carriers to a file.
pub type FilePipeline = WriterPipeline<BufWriter<File>>;

impl WriterPipeline<BufWriter<File>> {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Ok(Self::named(
            format!("file:{}", path.as_ref().display()),
            BufWriter::new(file),
        ))
    }
}
