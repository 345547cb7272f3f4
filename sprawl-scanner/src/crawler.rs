use crate::domain::{SuffixLookup, canonical_domain};
use crate::error::{Result, ScanError};
use crate::fetch::{Fetch, HttpFetcher};
use crate::links::anchor_hrefs;
use crate::registry::{DiscoveryRecord, Registration, VisitedRegistry};
use crate::result::CrawlResult;
use crate::shutdown::{ShutdownCoordinator, TaskGuard};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, oneshot};
use tracing::{debug, info, trace, warn};

pub const DEFAULT_MAX_DEPTH: u16 = 1;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Something observable happened during a crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    PageFetched { url: String, depth: u16 },
    FetchFailed { url: String, error: String },
    DomainDiscovered { domain: String, parent: String, depth: u16 },
    PathShortened { domain: String, parent: String },
}

pub type ProgressCallback = Arc<dyn Fn(CrawlEvent) + Send + Sync>;

/// Crawls outward from a seed, one task per newly discovered domain, and
/// records the shortest known path from the seed to every domain reached.
pub struct Crawler<F: Fetch = HttpFetcher> {
    fetcher: Arc<F>,
    suffixes: Arc<dyn SuffixLookup>,
    max_depth: u16,
    max_concurrent_fetches: Option<usize>,
    progress_callback: Option<ProgressCallback>,
}

impl Crawler<HttpFetcher> {
    pub fn with_timeout(timeout: Duration, suffixes: Arc<dyn SuffixLookup>) -> Result<Self> {
        Ok(Self::new(HttpFetcher::new(timeout)?, suffixes))
    }
}

impl<F: Fetch> Crawler<F> {
    pub fn new(fetcher: F, suffixes: Arc<dyn SuffixLookup>) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            suffixes,
            max_depth: DEFAULT_MAX_DEPTH,
            max_concurrent_fetches: None,
            progress_callback: None,
        }
    }

    /// Pages discovered at this many hops from the seed are recorded but
    /// never fetched.
    pub fn with_max_depth(mut self, depth: u16) -> Self {
        self.max_depth = depth;
        self
    }

    /// Caps the number of fetches in flight at once. Unlimited by default.
    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = Some(limit.max(1));
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Crawls from `seed_url` until no task remains, then returns the
    /// quiesced tree.
    pub async fn crawl(&self, seed_url: &str) -> Result<CrawlResult> {
        info!("Starting crawl of {} to depth {}", seed_url, self.max_depth);
        let start = Instant::now();

        let seed = canonical_domain(seed_url, self.suffixes.as_ref())
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", seed_url, e)))?;

        let (registry, aggregator) = VisitedRegistry::new(DiscoveryRecord::seed(&seed));
        let (stop_tx, stop_rx) = oneshot::channel();
        let aggregator_handle = tokio::spawn(aggregator.run(stop_rx));

        let session = Arc::new(CrawlSession {
            fetcher: self.fetcher.clone(),
            suffixes: self.suffixes.clone(),
            registry: registry.clone(),
            coordinator: ShutdownCoordinator::new(),
            admission: self.max_concurrent_fetches.map(Semaphore::new),
            max_depth: self.max_depth,
            progress_callback: self.progress_callback.clone(),
            pages_fetched: AtomicUsize::new(0),
            fetch_failures: AtomicUsize::new(0),
        });

        let guard = session.coordinator.register();
        tokio::spawn(
            session
                .clone()
                .crawl_page(seed_url.to_string(), 0, seed.clone(), guard),
        );

        session.coordinator.quiesce(stop_tx).await;
        let aggregator_stats = aggregator_handle.await?;

        let mut result = CrawlResult::new(seed, registry.freeze().await);
        result.pages_fetched = session.pages_fetched.load(Ordering::Acquire);
        result.fetch_failures = session.fetch_failures.load(Ordering::Acquire);
        result.duplicate_fetches = aggregator_stats.duplicates;
        result.elapsed = start.elapsed();

        info!(
            "Crawl complete. Discovered {} domains from {} pages in {:?}",
            result.domains_found(),
            result.pages_fetched,
            result.elapsed
        );
        Ok(result)
    }
}

/// State shared by every task of one crawl.
struct CrawlSession<F> {
    fetcher: Arc<F>,
    suffixes: Arc<dyn SuffixLookup>,
    registry: VisitedRegistry,
    coordinator: Arc<ShutdownCoordinator>,
    admission: Option<Semaphore>,
    max_depth: u16,
    progress_callback: Option<ProgressCallback>,
    pages_fetched: AtomicUsize,
    fetch_failures: AtomicUsize,
}

impl<F: Fetch> CrawlSession<F> {
    /// Fetches `url`, found at `depth` hops and canonicalized to `domain`,
    /// and spawns a task for every new domain it links to.
    fn crawl_page(
        self: Arc<Self>,
        url: String,
        depth: u16,
        domain: String,
        guard: TaskGuard,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let _guard = guard;

            if depth >= self.max_depth {
                trace!("Depth limit reached at {}", url);
                return;
            }

            let body = match self.fetch(&url).await {
                Ok(body) => body,
                Err(e) => {
                    debug!("Fetch failed for {}: {}", url, e);
                    self.fetch_failures.fetch_add(1, Ordering::AcqRel);
                    self.emit(CrawlEvent::FetchFailed {
                        url,
                        error: e.to_string(),
                    });
                    return;
                }
            };

            self.pages_fetched.fetch_add(1, Ordering::AcqRel);
            self.emit(CrawlEvent::PageFetched {
                url: url.clone(),
                depth,
            });

            let hrefs = match anchor_hrefs(&body) {
                Ok(hrefs) => hrefs,
                Err(e) => {
                    warn!("Could not parse {}: {}", url, e);
                    return;
                }
            };
            drop(body);

            let child_depth = depth + 1;
            for href in hrefs {
                let child = match canonical_domain(&href, self.suffixes.as_ref()) {
                    Ok(child) => child,
                    Err(e) => {
                        trace!("Skipping link {}: {}", href, e);
                        continue;
                    }
                };

                let candidate = DiscoveryRecord::child(&child, &domain, child_depth);
                match self.registry.try_register_new(candidate).await {
                    Ok(Registration::Inserted) => {
                        debug!("Discovered {} via {} at depth {}", child, domain, child_depth);
                        self.emit(CrawlEvent::DomainDiscovered {
                            domain: child.clone(),
                            parent: domain.clone(),
                            depth: child_depth,
                        });

                        let child_guard = self.coordinator.register();
                        tokio::spawn(self.clone().crawl_page(href, child_depth, child, child_guard));
                    }
                    Ok(Registration::Existing(existing)) => {
                        if child_depth < existing.depth
                            && self
                                .registry
                                .try_shorten_path(&child, &domain, child_depth)
                                .await
                        {
                            debug!("Shorter path to {} via {}", child, domain);
                            self.emit(CrawlEvent::PathShortened {
                                domain: child,
                                parent: domain.clone(),
                            });
                        }
                    }
                    Err(e) => warn!("Could not register {}: {}", child, e),
                }
            }
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let _permit = match &self.admission {
            Some(admission) => Some(
                admission
                    .acquire()
                    .await
                    .map_err(|e| ScanError::Other(format!("Admission closed: {}", e)))?,
            ),
            None => None,
        };

        self.fetcher.fetch(url).await
    }

    fn emit(&self, event: CrawlEvent) {
        if let Some(ref callback) = self.progress_callback {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PublicSuffixList;
    use crate::fetch::StaticFetcher;
    use std::sync::Mutex;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn suffixes() -> Arc<dyn SuffixLookup> {
        Arc::new(PublicSuffixList::bundled().unwrap())
    }

    fn page(links: &[&str]) -> String {
        let mut html = String::from("<html><body>");
        for link in links {
            html.push_str(&format!(r#"<a href="{}">{}</a>"#, link, link));
        }
        html.push_str("</body></html>");
        html
    }

    /// Serves a page for each `(url, links)` pair.
    fn site(pages: &[(&str, &[&str])]) -> StaticFetcher {
        pages
            .iter()
            .fold(StaticFetcher::new(), |fetcher, (url, links)| {
                fetcher.with_page(url, &page(links))
            })
    }

    fn assert_consistent(result: &CrawlResult) {
        let bad = result.tree.inconsistent_records();
        assert!(bad.is_empty(), "Inconsistent records: {:?}", bad);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_domain_links_collapse_to_one_record() {
        for _ in 0..25 {
            let fetcher = site(&[("http://a.test", &["http://b.test/x", "http://b.test/y"])]);
            let crawler = Crawler::new(fetcher, suffixes()).with_max_depth(1);

            let result = crawler.crawl("http://a.test").await.unwrap();

            assert_eq!(result.seed, "a.test");
            assert_eq!(result.tree.len(), 2);
            let seed = result.tree.get("a.test").unwrap();
            assert_eq!((seed.depth, seed.parent.as_deref()), (0, None));
            let b = result.tree.get("b.test").unwrap();
            assert_eq!((b.depth, b.parent.as_deref()), (1, Some("a.test")));
            assert_eq!(crawler.fetcher().requests(), vec!["http://a.test"]);
            assert_consistent(&result);
        }
    }

    #[tokio::test]
    async fn test_max_depth_zero_fetches_nothing() {
        let fetcher = site(&[("http://a.test", &["http://b.test/"])]);
        let crawler = Crawler::new(fetcher, suffixes()).with_max_depth(0);

        let result = crawler.crawl("http://a.test").await.unwrap();

        assert_eq!(result.tree.len(), 1);
        assert_eq!(result.pages_fetched, 0);
        assert!(crawler.fetcher().requests().is_empty());
    }

    #[tokio::test]
    async fn test_seed_fetch_failure_leaves_only_seed() {
        let crawler = Crawler::new(StaticFetcher::new(), suffixes()).with_max_depth(3);

        let result = crawler.crawl("http://unreachable.test/").await.unwrap();

        assert_eq!(result.tree.len(), 1);
        assert!(result.tree.contains("unreachable.test"));
        assert_eq!(result.fetch_failures, 1);
        assert_eq!(result.pages_fetched, 0);
    }

    #[tokio::test]
    async fn test_invalid_seed_is_rejected() {
        let crawler = Crawler::new(StaticFetcher::new(), suffixes());

        let result = crawler.crawl("mailto:someone@a.test").await;

        assert!(matches!(result, Err(ScanError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_unsupported_links_are_skipped() {
        let fetcher = site(&[(
            "http://a.test",
            &[
                "mailto:someone@a.test",
                "ftp://files.b.test/",
                "javascript:void(0)",
                "/relative/path",
                "#fragment",
                "http://co.uk/",
                "https://www.c.test/page",
            ],
        )]);
        let crawler = Crawler::new(fetcher, suffixes()).with_max_depth(1);

        let result = crawler.crawl("http://a.test").await.unwrap();

        let mut domains: Vec<&str> = result.tree.records().map(|r| r.domain.as_str()).collect();
        domains.sort();
        assert_eq!(domains, vec!["a.test", "c.test"]);
    }

    #[tokio::test]
    async fn test_self_links_are_not_refetched() {
        let fetcher = site(&[(
            "http://a.test",
            &["http://a.test", "http://www.a.test/about", "https://a.test/#top"],
        )]);
        let crawler = Crawler::new(fetcher, suffixes()).with_max_depth(3);

        let result = crawler.crawl("http://a.test").await.unwrap();

        assert_eq!(result.tree.len(), 1);
        assert_eq!(crawler.fetcher().requests(), vec!["http://a.test"]);
    }

    #[tokio::test]
    async fn test_direct_link_wins_over_deep_path() {
        let fetcher = site(&[
            ("http://s.test/", &["http://a.test/", "http://d.test/"]),
            ("http://a.test/", &["http://b.test/"]),
            ("http://b.test/", &["http://d.test/"]),
            ("http://d.test/", &[]),
        ]);
        let crawler = Crawler::new(fetcher, suffixes()).with_max_depth(4);

        let result = crawler.crawl("http://s.test/").await.unwrap();

        let d = result.tree.get("d.test").unwrap();
        assert_eq!((d.depth, d.parent.as_deref()), (1, Some("s.test")));
        assert_eq!(result.shortest_path("d.test").unwrap(), vec!["d.test", "s.test"]);
        assert_consistent(&result);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorter_path_found_later_replaces_deeper_one() {
        let fetcher = site(&[
            ("http://s.test/", &["http://a.test/", "http://m.test/"]),
            ("http://a.test/", &["http://b.test/"]),
            ("http://b.test/", &["http://c.test/"]),
            ("http://c.test/", &["http://d.test/"]),
            ("http://d.test/", &["http://e.test/"]),
        ])
        .with_delayed_page(
            "http://m.test/",
            &page(&["http://d.test/"]),
            Duration::from_secs(1),
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        let crawler = Crawler::new(fetcher, suffixes())
            .with_max_depth(5)
            .with_progress_callback(Arc::new(move |event| {
                events_clone.lock().unwrap().push(event);
            }));

        let result = crawler.crawl("http://s.test/").await.unwrap();

        let d = result.tree.get("d.test").unwrap();
        assert_eq!((d.depth, d.parent.as_deref()), (2, Some("m.test")));
        let e = result.tree.get("e.test").unwrap();
        assert_eq!((e.depth, e.parent.as_deref()), (3, Some("d.test")));
        assert_eq!(
            result.shortest_path("e.test").unwrap(),
            vec!["e.test", "d.test", "m.test", "s.test"]
        );
        assert_consistent(&result);

        // d.test was fetched once, through its original parent.
        let d_fetches = crawler
            .fetcher()
            .requests()
            .iter()
            .filter(|url| url.as_str() == "http://d.test/")
            .count();
        assert_eq!(d_fetches, 1);

        assert!(events.lock().unwrap().contains(&CrawlEvent::PathShortened {
            domain: "d.test".to_string(),
            parent: "m.test".to_string(),
        }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_shorter_path_through_freshly_registered_parent() {
        for _ in 0..20 {
            let fetcher = site(&[
                ("http://s.test/", &["http://a.test/", "http://m.test/"]),
                ("http://a.test/", &["http://b.test/"]),
                ("http://b.test/", &["http://c.test/"]),
                ("http://c.test/", &["http://y.test/"]),
                ("http://x.test/", &["http://y.test/"]),
                ("http://y.test/", &[]),
            ])
            .with_delayed_page(
                "http://m.test/",
                &page(&["http://x.test/"]),
                Duration::from_millis(50),
            );
            let crawler = Crawler::new(fetcher, suffixes()).with_max_depth(6);

            let result = crawler.crawl("http://s.test/").await.unwrap();

            let y = result.tree.get("y.test").unwrap();
            assert_eq!((y.depth, y.parent.as_deref()), (3, Some("x.test")));
            assert_eq!(
                result.shortest_path("y.test").unwrap(),
                vec!["y.test", "x.test", "m.test", "s.test"]
            );
            assert_consistent(&result);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_discovery_keeps_single_record() {
        for _ in 0..20 {
            let fetcher = site(&[
                ("http://s.test/", &["http://p.test/", "http://q.test/"]),
                ("http://p.test/", &["http://z.test/"]),
                ("http://q.test/", &["http://z.test/"]),
                ("http://z.test/", &[]),
            ]);
            let crawler = Crawler::new(fetcher, suffixes()).with_max_depth(3);

            let result = crawler.crawl("http://s.test/").await.unwrap();

            assert_eq!(result.tree.len(), 4);
            assert_eq!(result.tree.get("z.test").unwrap().depth, 2);
            assert_consistent(&result);

            let z_fetches = crawler
                .fetcher()
                .requests()
                .iter()
                .filter(|url| url.as_str() == "http://z.test/")
                .count();
            assert_eq!(z_fetches, 1 + result.duplicate_fetches);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_limit_bounds_in_flight_fetches() {
        let children: Vec<String> = (0..8).map(|i| format!("http://c{}.test/", i)).collect();
        let child_refs: Vec<&str> = children.iter().map(String::as_str).collect();

        let build = || {
            children.iter().fold(
                StaticFetcher::new().with_page("http://s.test/", &page(&child_refs)),
                |fetcher, url| fetcher.with_delayed_page(url, "", Duration::from_secs(1)),
            )
        };

        let unbounded = Crawler::new(build(), suffixes()).with_max_depth(2);
        let result = unbounded.crawl("http://s.test/").await.unwrap();
        assert_eq!(result.pages_fetched, 9);
        assert_eq!(unbounded.fetcher().peak_in_flight(), 8);

        let bounded = Crawler::new(build(), suffixes())
            .with_max_depth(2)
            .with_max_concurrent_fetches(2);
        let result = bounded.crawl("http://s.test/").await.unwrap();
        assert_eq!(result.pages_fetched, 9);
        assert!(bounded.fetcher().peak_in_flight() <= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tree_stays_consistent_on_dense_graph() {
        let urls: Vec<String> = (0..30).map(|i| format!("http://n{}.test/", i)).collect();

        for _ in 0..10 {
            let fetcher = (0..30).fold(StaticFetcher::new(), |fetcher, i| {
                let links = [
                    urls[(i * 7 + 3) % 30].as_str(),
                    urls[(i * 11 + 5) % 30].as_str(),
                    urls[(i + 1) % 30].as_str(),
                ];
                fetcher.with_page(&urls[i], &page(&links))
            });
            let crawler = Crawler::new(fetcher, suffixes()).with_max_depth(4);

            let result = crawler.crawl(&urls[0]).await.unwrap();

            assert_consistent(&result);
            assert!(result.tree.max_depth() <= 4);
            for record in result.tree.records() {
                let path = result.shortest_path(&record.domain).unwrap();
                assert_eq!(path.len(), record.depth as usize + 1);
                assert_eq!(path.last().map(String::as_str), Some("n0.test"));
            }
        }
    }

    #[tokio::test]
    async fn test_progress_callback_reports_discoveries() {
        let fetcher = site(&[("http://a.test", &["http://b.test/"])]);
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();

        let crawler = Crawler::new(fetcher, suffixes())
            .with_max_depth(2)
            .with_progress_callback(Arc::new(move |event| {
                events_clone.lock().unwrap().push(event);
            }));

        crawler.crawl("http://a.test").await.unwrap();

        let events = events.lock().unwrap();
        assert!(events.contains(&CrawlEvent::PageFetched {
            url: "http://a.test".to_string(),
            depth: 0,
        }));
        assert!(events.contains(&CrawlEvent::DomainDiscovered {
            domain: "b.test".to_string(),
            parent: "a.test".to_string(),
            depth: 1,
        }));
        assert!(events.iter().any(|event| matches!(
            event,
            CrawlEvent::FetchFailed { url, .. } if url == "http://b.test/"
        )));
    }

    #[tokio::test]
    async fn test_http_crawl_against_mock_server() {
        let mock_server = MockServer::start().await;

        let root_html = format!(
            r#"<html><body>
                <a href="{}/page1">Page 1</a>
                <a href="http://b.test/x">B</a>
                <a href="http://b.test/y">B again</a>
                <a href="mailto:admin@b.test">Mail</a>
            </body></html>"#,
            mock_server.uri()
        );

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_bytes(root_html.as_bytes()),
            )
            .mount(&mock_server)
            .await;

        let crawler = Crawler::with_timeout(DEFAULT_TIMEOUT, suffixes())
            .unwrap()
            .with_max_depth(1);

        let result = crawler.crawl(&mock_server.uri()).await.unwrap();

        assert_eq!(result.seed, "127.0.0.1");
        assert_eq!(result.pages_fetched, 1);
        assert_eq!(result.tree.len(), 2);
        assert_eq!(
            result.tree.get("b.test").unwrap().parent.as_deref(),
            Some("127.0.0.1")
        );
    }
}
