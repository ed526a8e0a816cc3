//! # Request Module
//!
//! Defines [`Request`], the descriptor of one unit of crawl work.
//!
//! A request names a target URL plus the protocol parameters needed to fetch
//! it: a method, a header map, an optional body and a free-form `meta` map for
//! anything protocol specific. Requests are built once and then handed to the
//! scheduler; a request dispatched to a downloader is owned by exactly one
//! fetch attempt and is only ever re-pushed, never shared.

use crate::error::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// The method (or protocol verb) of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Patch,
    /// A verb outside HTTP, e.g. an FTP `RETR` or `LIST`.
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Other(verb) => verb,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of crawl work.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub meta: HashMap<String, Value>,
}

impl Request {
    /// Creates a `GET` request for `url`. Any fragment is stripped, as it
    /// never reaches the remote side.
    pub fn new(mut url: Url) -> Self {
        url.set_fragment(None);
        Self {
            url,
            method: Method::Get,
            headers: HashMap::new(),
            body: None,
            meta: HashMap::new(),
        }
    }

    /// Parses `url` and creates a `GET` request for it.
    pub fn parse(url: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(url)?))
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets a header; a later value for the same name replaces the earlier one.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// The canonical identity of the target, used by duplicate filters.
    pub fn fingerprint(&self) -> String {
        self.url.as_str().to_string()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
