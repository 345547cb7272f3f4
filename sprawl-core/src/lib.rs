pub mod crawl;
pub mod report;
pub mod snapshot;
