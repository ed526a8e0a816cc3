//! Defines [`Response`], the outcome of one successful fetch.

use crate::request::Request;
use std::borrow::Cow;
use std::collections::HashMap;
use url::Url;

/// A fetched resource together with the request that produced it.
#[derive(Debug, Clone)]
pub struct Response {
    request: Request,
    /// Protocol status code; `0` for protocols that have none.
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(request: Request, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            request,
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The request this response answers.
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn url(&self) -> &Url {
        &self.request.url
    }

    /// `true` for 2xx statuses and for protocols without a status.
    pub fn is_success(&self) -> bool {
        self.status == 0 || (200..300).contains(&self.status)
    }

    /// The body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}
