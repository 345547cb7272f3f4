use crate::error::Result;
use crate::registry::DomainTree;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one crawl: the quiesced domain tree and what it took to build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    /// Canonical domain of the seed address.
    pub seed: String,
    pub tree: DomainTree,
    pub pages_fetched: usize,
    pub fetch_failures: usize,
    /// Fetches spent on a domain another task had already claimed.
    pub duplicate_fetches: usize,
    pub elapsed: Duration,
}

impl CrawlResult {
    pub fn new(seed: String, tree: DomainTree) -> Self {
        Self {
            seed,
            tree,
            pages_fetched: 0,
            fetch_failures: 0,
            duplicate_fetches: 0,
            elapsed: Duration::from_secs(0),
        }
    }

    pub fn domains_found(&self) -> usize {
        self.tree.len()
    }

    pub fn shortest_path(&self, domain: &str) -> Result<Vec<String>> {
        self.tree.shortest_path(domain)
    }
}
