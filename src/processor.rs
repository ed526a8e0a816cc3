//! Defines the processing capability that extracts data from responses.

use crate::item::ResultItems;
use crate::response::Response;

/// Extracts structured data and follow-up requests from a [`Response`].
///
/// Processors are registered as an ordered list; each response goes to the
/// first processor whose [`supports`](PageProcessor::supports) returns `true`.
/// A response no processor supports is dropped with a warning.
///
/// With more than one process worker, `process` is called concurrently on
/// distinct responses.
pub trait PageProcessor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether this processor handles `response`. Called for every response,
    /// so it should be cheap.
    fn supports(&self, response: &Response) -> bool;

    fn process(&self, response: &Response) -> ResultItems;
}

impl<P: PageProcessor + ?Sized> PageProcessor for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn supports(&self, response: &Response) -> bool {
        (**self).supports(response)
    }

    fn process(&self, response: &Response) -> ResultItems {
        (**self).process(response)
    }
}
