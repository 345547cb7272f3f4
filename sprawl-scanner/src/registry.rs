//! The visited-domain registry and the aggregator that grows it.
//!
//! Every domain the crawl has reached maps to a [`DiscoveryRecord`] naming
//! the domain it was reached from and how many hops separate it from the
//! seed. Parents are referenced by key, so a record can be re-parented in
//! place when a shorter path turns up.
//!
//! Writes are split by kind:
//!
//! * first-time insertions go through an unbounded channel to a single
//!   [`RegistryAggregator`], the only task that grows the map;
//! * shorter-path updates of an existing key take the write lock directly;
//! * existence checks take the read lock.
//!
//! There is no atomic check-then-insert across the read lock and the
//! channel send. Two pages discovering the same new domain at nearly the same
//! moment can both see it as unseen and both fetch it. The aggregator still
//! stores a single record for the key and counts the wasted fetch.

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, trace};

/// One domain's position in the crawl tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub domain: String,
    /// Key of the domain this one was reached from; `None` only for the seed.
    pub parent: Option<String>,
    /// Hops from the seed along the parent chain.
    pub depth: u16,
}

impl DiscoveryRecord {
    pub fn seed(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            parent: None,
            depth: 0,
        }
    }

    pub fn child(domain: &str, parent: &str, depth: u16) -> Self {
        Self {
            domain: domain.to_string(),
            parent: Some(parent.to_string()),
            depth,
        }
    }

    pub fn is_seed(&self) -> bool {
        self.parent.is_none()
    }
}

/// Outcome of [`VisitedRegistry::try_register_new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The domain was unseen; its candidate record is on its way to the
    /// aggregator.
    Inserted,
    /// The domain is already registered with this record.
    Existing(DiscoveryRecord),
}

type Records = HashMap<String, DiscoveryRecord>;

/// Shared, concurrently readable map from domain to discovery record.
#[derive(Debug, Clone)]
pub struct VisitedRegistry {
    records: Arc<RwLock<Records>>,
    transport: mpsc::UnboundedSender<DiscoveryRecord>,
}

impl VisitedRegistry {
    /// Creates a registry holding only `seed`, and the aggregator that owns
    /// its first-time insertions. The aggregator must be run for
    /// registrations to land.
    pub fn new(seed: DiscoveryRecord) -> (Self, RegistryAggregator) {
        let mut records = Records::new();
        records.insert(seed.domain.clone(), seed);

        let records = Arc::new(RwLock::new(records));
        let (transport, receiver) = mpsc::unbounded_channel();

        let registry = Self {
            records: records.clone(),
            transport,
        };
        let aggregator = RegistryAggregator {
            records,
            transport: receiver,
        };

        (registry, aggregator)
    }

    pub async fn get(&self, domain: &str) -> Option<DiscoveryRecord> {
        self.records.read().await.get(domain).cloned()
    }

    pub async fn contains(&self, domain: &str) -> bool {
        self.records.read().await.contains_key(domain)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Checks whether `candidate.domain` has been seen and, if not, hands the
    /// candidate to the aggregator.
    ///
    /// The send completes before this returns, so anything the caller does
    /// afterwards (spawning the child fetch, finishing its own task) is
    /// ordered after the insertion is queued.
    pub async fn try_register_new(&self, candidate: DiscoveryRecord) -> Result<Registration> {
        if let Some(existing) = self.records.read().await.get(&candidate.domain) {
            return Ok(Registration::Existing(existing.clone()));
        }

        self.transport
            .send(candidate)
            .map_err(|_| ScanError::Other("Registry aggregator has stopped".to_string()))?;

        Ok(Registration::Inserted)
    }

    /// Re-parents `domain` under `parent` if that yields a strictly smaller
    /// depth. Descendants of `domain` have their depths re-derived under the
    /// same lock. Returns whether anything changed.
    ///
    /// The new depth comes from `parent`'s current record. When that record
    /// is still queued for the aggregator, `candidate_depth` is used instead
    /// and the aggregator re-derives it once the parent lands.
    pub async fn try_shorten_path(
        &self,
        domain: &str,
        parent: &str,
        candidate_depth: u16,
    ) -> bool {
        let mut records = self.records.write().await;
        shorten_path(&mut records, domain, parent, candidate_depth)
    }

    /// Parent chain from `domain` back to the seed. A path read mid-crawl may
    /// still be shortened later.
    pub async fn shortest_path(&self, domain: &str) -> Result<Vec<String>> {
        walk_path(&*self.records.read().await, domain)
    }

    /// Copies the current contents into an immutable tree.
    pub async fn freeze(&self) -> DomainTree {
        DomainTree {
            records: self.records.read().await.clone(),
        }
    }
}

/// Counters reported by the aggregator when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorStats {
    /// First-time insertions applied.
    pub inserted: usize,
    /// Candidates that arrived for an already registered domain, i.e. fetches
    /// wasted by the registration race.
    pub duplicates: usize,
}

/// Single consumer applying first-time insertions to the registry.
#[derive(Debug)]
pub struct RegistryAggregator {
    records: Arc<RwLock<Records>>,
    transport: mpsc::UnboundedReceiver<DiscoveryRecord>,
}

impl RegistryAggregator {
    /// Applies candidates until `stop` fires (or its sender is dropped), then
    /// drains whatever was already queued.
    pub async fn run(mut self, mut stop: oneshot::Receiver<()>) -> AggregatorStats {
        let mut stats = AggregatorStats::default();

        loop {
            let candidate = tokio::select! {
                biased;
                Some(candidate) = self.transport.recv() => candidate,
                _ = &mut stop => break,
            };
            self.apply(candidate, &mut stats).await;
        }

        while let Ok(candidate) = self.transport.try_recv() {
            self.apply(candidate, &mut stats).await;
        }

        debug!(
            "Aggregator stopped: {} inserted, {} duplicates",
            stats.inserted, stats.duplicates
        );
        stats
    }

    async fn apply(&self, candidate: DiscoveryRecord, stats: &mut AggregatorStats) {
        let mut records = self.records.write().await;

        if records.contains_key(&candidate.domain) {
            stats.duplicates += 1;
            trace!("Duplicate registration for {}", candidate.domain);
            if let Some(parent) = candidate.parent.as_deref() {
                shorten_path(&mut records, &candidate.domain, parent, candidate.depth);
            }
            return;
        }

        // The parent may have been shortened since this candidate was built.
        let depth = candidate
            .parent
            .as_deref()
            .and_then(|parent| records.get(parent))
            .map(|parent| parent.depth.saturating_add(1))
            .unwrap_or(candidate.depth);

        stats.inserted += 1;
        let domain = candidate.domain.clone();
        records.insert(domain.clone(), DiscoveryRecord { depth, ..candidate });

        // Records shortened under this domain while it was queued.
        rederive_descendant_depths(&mut records, &domain);
    }
}

fn shorten_path(
    records: &mut Records,
    domain: &str,
    parent: &str,
    candidate_depth: u16,
) -> bool {
    if domain == parent {
        return false;
    }

    let depth = records
        .get(parent)
        .map(|parent| parent.depth.saturating_add(1))
        .unwrap_or(candidate_depth);

    match records.get_mut(domain) {
        Some(record) if depth < record.depth => {
            record.parent = Some(parent.to_string());
            record.depth = depth;
        }
        _ => return false,
    }

    rederive_descendant_depths(records, domain);
    true
}

/// Restores `depth == parent.depth + 1` below `root` after its depth dropped.
fn rederive_descendant_depths(records: &mut Records, root: &str) {
    let mut pending = vec![root.to_string()];

    while let Some(parent) = pending.pop() {
        let Some(depth) = records
            .get(&parent)
            .map(|record| record.depth.saturating_add(1))
        else {
            continue;
        };

        for record in records.values_mut() {
            if record.parent.as_deref() == Some(parent.as_str()) && record.depth != depth {
                record.depth = depth;
                pending.push(record.domain.clone());
            }
        }
    }
}

fn walk_path(records: &Records, domain: &str) -> Result<Vec<String>> {
    let mut record = records
        .get(domain)
        .ok_or_else(|| ScanError::DomainNotPresent(domain.to_string()))?;
    let mut path = vec![record.domain.clone()];

    while let Some(parent) = record.parent.as_deref() {
        record = records
            .get(parent)
            .ok_or_else(|| ScanError::DomainNotPresent(parent.to_string()))?;
        path.push(record.domain.clone());

        if path.len() > records.len() {
            return Err(ScanError::Other(format!(
                "Parent chain of {} does not reach a seed",
                domain
            )));
        }
    }

    Ok(path)
}

/// Renders a parent chain as `domain <- parent <- ... <- seed`.
pub fn format_path(path: &[String]) -> String {
    path.join(" <- ")
}

/// The registry after quiescence: read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainTree {
    records: HashMap<String, DiscoveryRecord>,
}

impl DomainTree {
    /// Builds a tree from records; a later record for the same domain
    /// replaces an earlier one.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = DiscoveryRecord>,
    {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.domain.clone(), record))
                .collect(),
        }
    }

    pub fn get(&self, domain: &str) -> Option<&DiscoveryRecord> {
        self.records.get(domain)
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.records.contains_key(domain)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record without a parent, if exactly one exists.
    pub fn seed(&self) -> Option<&DiscoveryRecord> {
        let mut seeds = self.records.values().filter(|record| record.is_seed());
        match (seeds.next(), seeds.next()) {
            (Some(seed), None) => Some(seed),
            _ => None,
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &DiscoveryRecord> {
        self.records.values()
    }

    /// Records ordered by depth, then domain.
    pub fn sorted_records(&self) -> Vec<&DiscoveryRecord> {
        let mut records: Vec<&DiscoveryRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.domain.cmp(&b.domain)));
        records
    }

    /// Domains whose recorded parent is `domain`, sorted.
    pub fn children(&self, domain: &str) -> Vec<&DiscoveryRecord> {
        let mut children: Vec<&DiscoveryRecord> = self
            .records
            .values()
            .filter(|record| record.parent.as_deref() == Some(domain))
            .collect();
        children.sort_by(|a, b| a.domain.cmp(&b.domain));
        children
    }

    pub fn max_depth(&self) -> u16 {
        self.records
            .values()
            .map(|record| record.depth)
            .max()
            .unwrap_or(0)
    }

    /// Domains breaking `depth == parent.depth + 1` or pointing at a missing
    /// parent.
    pub fn inconsistent_records(&self) -> Vec<&DiscoveryRecord> {
        self.records
            .values()
            .filter(|record| match record.parent.as_deref() {
                None => record.depth != 0,
                Some(parent) => self
                    .records
                    .get(parent)
                    .is_none_or(|parent| record.depth != parent.depth.saturating_add(1)),
            })
            .collect()
    }

    /// Parent chain from `domain` back to the seed, in discovery-to-seed
    /// order.
    pub fn shortest_path(&self, domain: &str) -> Result<Vec<String>> {
        walk_path(&self.records, domain)
    }
}
