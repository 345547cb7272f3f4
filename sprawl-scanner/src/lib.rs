pub mod crawler;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod links;
pub mod registry;
pub mod result;
pub mod shutdown;

pub use crawler::{CrawlEvent, Crawler, ProgressCallback};
pub use domain::{PublicSuffixList, SuffixLookup, canonical_domain};
pub use error::{DomainError, ScanError};
pub use fetch::{Fetch, HttpFetcher, StaticFetcher};
pub use registry::{DiscoveryRecord, DomainTree, VisitedRegistry, format_path};
pub use result::CrawlResult;
