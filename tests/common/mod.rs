//! Fixtures shared by the integration tests: an in-memory site, a link
//! extracting processor and a recording pipeline.

#![allow(dead_code)]

use parking_lot::Mutex;
use spider_engine::{DownloadError, Downloader, PageProcessor, Pipeline, Request, Response, ResultItems};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const HOST: &str = "https://site.test";

/// Installs a test-writer subscriber; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn request(page: &str) -> Request {
    Request::parse(&format!("{HOST}/{page}")).unwrap()
}

pub fn page_of(request: &Request) -> String {
    request.url.path().trim_start_matches('/').to_string()
}

/// A site whose pages link to each other by name. The body of a page is the
/// space-separated list of pages it links to.
#[derive(Default)]
pub struct Site {
    links: HashMap<String, Vec<String>>,
    failures: Mutex<HashMap<String, usize>>,
    delay: Duration,
    pub fetches: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl Site {
    /// `links` pairs a page with the space-separated pages it links to.
    pub fn new(links: &[(&str, &str)]) -> Self {
        Self {
            links: links
                .iter()
                .map(|(page, to)| {
                    let to = to.split_whitespace().map(str::to_string).collect::<Vec<_>>();
                    (page.to_string(), to)
                })
                .collect(),
            ..Self::default()
        }
    }

    /// A binary tree of `size` pages named `0..size`.
    pub fn tree(size: usize) -> Self {
        let links = (0..size)
            .map(|n| {
                let children = [2 * n + 1, 2 * n + 2]
                    .into_iter()
                    .filter(|child| *child < size)
                    .map(|child| child.to_string())
                    .collect::<Vec<_>>();
                (n.to_string(), children)
            })
            .collect();
        Self {
            links,
            ..Self::default()
        }
    }

    /// Makes the first `times` fetches of `page` fail.
    pub fn failing(self, page: &str, times: usize) -> Self {
        self.failures.lock().insert(page.to_string(), times);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Downloader for Site {
    fn name(&self) -> &str {
        "site"
    }

    fn download(&self, request: &Request) -> Result<Response, DownloadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let page = page_of(request);
        if let Some(left) = self.failures.lock().get_mut(&page) {
            if *left > 0 {
                *left -= 1;
                return Err(DownloadError::other(format!("{page} is flaky")));
            }
        }
        match self.links.get(&page) {
            Some(links) => Ok(Response::new(request.clone(), 200, links.join(" "))),
            None => Ok(Response::new(request.clone(), 404, "")),
        }
    }

    fn close(&self) -> anyhow::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records the page name and follows every link in the body.
pub struct Links;

impl PageProcessor for Links {
    fn name(&self) -> &str {
        "links"
    }

    fn supports(&self, _response: &Response) -> bool {
        true
    }

    fn process(&self, response: &Response) -> ResultItems {
        let mut items = ResultItems::new(response.request().clone());
        items.put("page", page_of(response.request()));
        for link in response.text().split_whitespace() {
            items.add_request(request(link));
        }
        items
    }
}

/// Remembers the `page` field of every carrier it sees.
#[derive(Clone)]
pub struct Recorder {
    name: &'static str,
    pub pages: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<AtomicUsize>,
    stop_on: Option<&'static str>,
    fail_close: bool,
}

impl Recorder {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            pages: Arc::default(),
            closed: Arc::default(),
            stop_on: None,
            fail_close: false,
        }
    }

    /// Stops the chain for carriers of `page`.
    pub fn stopping_on(mut self, page: &'static str) -> Self {
        self.stop_on = Some(page);
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn sorted(&self) -> Vec<String> {
        let mut pages = self.pages.lock().clone();
        pages.sort();
        pages
    }
}

impl Pipeline for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn process(&self, items: &ResultItems) -> bool {
        let page = items
            .get("page")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let stop = self.stop_on == Some(page.as_str());
        self.pages.lock().push(page);
        !stop
    }

    fn close(&self) -> anyhow::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            anyhow::bail!("{} cannot close", self.name);
        }
        Ok(())
    }
}
