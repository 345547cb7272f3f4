use crate::report::generate_domain_tree;
use crate::snapshot::SnapshotWriter;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use sprawl_scanner::crawler::{DEFAULT_MAX_DEPTH, DEFAULT_TIMEOUT};
use sprawl_scanner::{CrawlEvent, CrawlResult, Crawler, ProgressCallback, PublicSuffixList};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const DEFAULT_OUTPUT: &str = "urls.txt";

/// Options for configuring a crawl operation
pub struct CrawlOptions {
    pub seed: String,
    pub max_depth: u16,
    pub timeout: Duration,
    pub max_concurrent_fetches: Option<usize>,
    /// Full public suffix list to use instead of the bundled one
    pub suffix_list: Option<PathBuf>,
    /// Snapshot file the finished tree is appended to
    pub output: Option<PathBuf>,
    pub show_progress_bars: bool,
}

impl CrawlOptions {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            max_depth: DEFAULT_MAX_DEPTH,
            timeout: DEFAULT_TIMEOUT,
            max_concurrent_fetches: None,
            suffix_list: None,
            output: Some(PathBuf::from(DEFAULT_OUTPUT)),
            show_progress_bars: false,
        }
    }
}

/// Callback for reporting crawl progress
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

pub fn load_suffix_list(path: Option<&Path>) -> Result<PublicSuffixList> {
    match path {
        Some(path) => PublicSuffixList::from_file(path).with_context(|| {
            format!("Failed to load public suffix list from {}", path.display())
        }),
        None => PublicSuffixList::bundled().context("Failed to load bundled public suffix list"),
    }
}

/// Execute a crawl with the given options, then append the finished tree
/// to the snapshot file if one is configured.
pub async fn execute_crawl(
    options: CrawlOptions,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<CrawlResult> {
    let CrawlOptions {
        seed,
        max_depth,
        timeout,
        max_concurrent_fetches,
        suffix_list,
        output,
        show_progress_bars,
    } = options;

    let suffixes = Arc::new(load_suffix_list(suffix_list.as_deref())?);

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .context("Invalid progress template")?,
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Starting crawl...");
        Some(pb)
    } else {
        None
    };

    let pages_count = Arc::new(AtomicUsize::new(0));
    let domains_count = Arc::new(AtomicUsize::new(1));

    let internal_progress_callback: ProgressCallback = {
        let pb = progress_bar.clone();
        let pages_count = pages_count.clone();
        let domains_count = domains_count.clone();
        let progress_callback = progress_callback.clone();

        Arc::new(move |event: CrawlEvent| {
            match event {
                CrawlEvent::PageFetched { .. } => {
                    pages_count.fetch_add(1, Ordering::Relaxed);
                }
                CrawlEvent::DomainDiscovered {
                    domain,
                    parent,
                    depth,
                } => {
                    domains_count.fetch_add(1, Ordering::Relaxed);
                    if let Some(ref callback) = progress_callback {
                        callback(format!("Discovered {} via {} (depth {})", domain, parent, depth));
                    }
                }
                CrawlEvent::PathShortened { domain, parent } => {
                    if let Some(ref callback) = progress_callback {
                        callback(format!("Shorter path to {} via {}", domain, parent));
                    }
                }
                CrawlEvent::FetchFailed { .. } => {}
            }

            if let Some(ref pb) = pb {
                pb.set_message(format!(
                    "Crawling... {} pages fetched, {} domains found",
                    pages_count.load(Ordering::Relaxed),
                    domains_count.load(Ordering::Relaxed)
                ));
            }
        })
    };

    let mut crawler = Crawler::with_timeout(timeout, suffixes)
        .context("Failed to build HTTP client")?
        .with_max_depth(max_depth)
        .with_progress_callback(internal_progress_callback);
    if let Some(limit) = max_concurrent_fetches {
        crawler = crawler.with_max_concurrent_fetches(limit);
    }

    let result = crawler
        .crawl(&seed)
        .await
        .with_context(|| format!("Failed to crawl {}", seed))?;

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!(
            "Crawl complete! {} domains from {} pages",
            result.domains_found(),
            result.pages_fetched
        ));
    }

    if let Some(output) = output {
        let written = SnapshotWriter::open(&output)?.write_tree(&result.tree)?;
        if let Some(ref callback) = progress_callback {
            callback(format!("Wrote {} records to {}", written, output.display()));
        }
    }

    Ok(result)
}

/// Generate a crawl report from a result
pub fn generate_crawl_report(result: &CrawlResult) -> String {
    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str("# Summary:\n");
    report.push_str(&format!("  Seed: {}\n", result.seed));
    report.push_str(&format!("  Domains found: {}\n", result.domains_found()));
    report.push_str(&format!("  Pages fetched: {}\n", result.pages_fetched));
    report.push_str(&format!("  Failed fetches: {}\n", result.fetch_failures));
    if result.duplicate_fetches > 0 {
        report.push_str(&format!("  Duplicate fetches: {}\n", result.duplicate_fetches));
    }
    report.push_str(&format!("  Deepest domain: {}\n", result.tree.max_depth()));
    report.push_str(&format!("  Elapsed: {:.2}s\n", result.elapsed.as_secs_f64()));

    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    report.push_str("## Domain tree\n");
    report.push_str(&generate_domain_tree(&result.tree));

    report
}
