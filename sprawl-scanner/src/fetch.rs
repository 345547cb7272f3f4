use crate::error::{Result, ScanError};
use reqwest::Client;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Retrieves the document behind an address.
///
/// Any failure (network error, timeout, malformed response) is reported as an
/// error; the crawler abandons the branch. Non-2xx responses are not errors,
/// their bodies are returned like any other.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Fetches documents over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(
                "Sprawl/",
                env!("CARGO_PKG_VERSION"),
                " (https://github.com/trapdoorsec/sprawl)"
            ))
            .timeout(timeout)
            .connect_timeout(timeout / 2)
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        debug!("Fetching {}", url);

        let response = self.client.get(url).send().await?;
        let body = response.text().await?;

        Ok(body)
    }
}

#[derive(Debug, Clone)]
struct StaticPage {
    body: String,
    delay: Option<Duration>,
}

/// Serves documents from memory.
///
/// Useful for driving the crawler over a fixed link graph: any address
/// without a registered page fails like an unreachable host.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    pages: HashMap<String, StaticPage>,
    requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            StaticPage {
                body: body.to_string(),
                delay: None,
            },
        );
        self
    }

    /// Registers a page that takes `delay` to respond.
    pub fn with_delayed_page(mut self, url: &str, body: &str, delay: Duration) -> Self {
        self.pages.insert(
            url.to_string(),
            StaticPage {
                body: body.to_string(),
                delay: Some(delay),
            },
        );
        self
    }

    /// Every address requested so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Highest number of fetches that were in progress at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Acquire)
    }
}

impl Fetch for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }

        let in_flight = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(in_flight, Ordering::AcqRel);

        let page = self.pages.get(url).cloned();
        if let Some(delay) = page.as_ref().and_then(|page| page.delay) {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::AcqRel);

        page.map(|page| page.body)
            .ok_or_else(|| ScanError::Other(format!("No route to {}", url)))
    }
}
