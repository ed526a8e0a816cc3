//! # Item Module
//!
//! Defines [`ResultItems`], the carrier produced by a
//! [`PageProcessor`](crate::PageProcessor) for every processed response.
//!
//! A `ResultItems` pairs the extracted key/value data with the requests the
//! processor discovered on the page. The data is handed to the output
//! pipelines; the discovered requests are drained back into the scheduler by
//! the orchestrator.

use crate::request::Request;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::collections::hash_map;

/// Extracted data and newly discovered requests for one fetched page.
#[derive(Debug, Clone)]
pub struct ResultItems {
    request: Request,
    fields: HashMap<String, Value>,
    added_requests: Vec<Request>,
}

impl ResultItems {
    /// Creates an empty carrier for the page fetched by `request`.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            fields: HashMap::new(),
            added_requests: Vec::new(),
        }
    }

    /// The request whose response produced this carrier.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Stores a field. Keys are unique; the last write wins.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Number of stored fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over the stored fields in no particular order.
    pub fn iter(&self) -> hash_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    /// Queues a newly discovered request for the scheduler.
    pub fn add_request(&mut self, request: Request) {
        self.added_requests.push(request);
    }

    /// Discovered requests, in discovery order.
    pub fn requests(&self) -> &[Request] {
        &self.added_requests
    }

    /// Removes and returns the discovered requests.
    pub fn take_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.added_requests)
    }

    /// The stored fields as a JSON object.
    pub fn fields_to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(map)
    }
}

impl<'a> IntoIterator for &'a ResultItems {
    type Item = (&'a String, &'a Value);
    type IntoIter = hash_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
