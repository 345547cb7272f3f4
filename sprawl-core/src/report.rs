// Report generation from a finished crawl

use serde::{Deserialize, Serialize};
use sprawl_scanner::{CrawlResult, DiscoveryRecord, DomainTree, format_path};
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub seed: String,
    pub summary: CrawlSummary,
    pub domains: Vec<DiscoveryRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<PathEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub domains_found: usize,
    pub pages_fetched: usize,
    pub fetch_failures: usize,
    pub duplicate_fetches: usize,
    pub max_depth: u16,
    pub elapsed_ms: u64,
}

/// The answer to one path query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PathEntry {
    pub fn query(tree: &DomainTree, domain: &str) -> Self {
        match tree.shortest_path(domain) {
            Ok(path) => PathEntry {
                domain: domain.to_string(),
                path: Some(path),
                error: None,
            },
            Err(e) => PathEntry {
                domain: domain.to_string(),
                path: None,
                error: Some(e.to_string()),
            },
        }
    }
}

impl CrawlSummary {
    pub fn from_result(result: &CrawlResult) -> Self {
        CrawlSummary {
            domains_found: result.domains_found(),
            pages_fetched: result.pages_fetched,
            fetch_failures: result.fetch_failures,
            duplicate_fetches: result.duplicate_fetches,
            max_depth: result.tree.max_depth(),
            elapsed_ms: result.elapsed.as_millis() as u64,
        }
    }
}

pub fn gather_path_entries(tree: &DomainTree, domains: &[String]) -> Vec<PathEntry> {
    domains
        .iter()
        .map(|domain| PathEntry::query(tree, domain))
        .collect()
}

pub fn gather_report_data(result: &CrawlResult, path_queries: &[String]) -> ReportData {
    ReportData {
        seed: result.seed.clone(),
        summary: CrawlSummary::from_result(result),
        domains: result.tree.sorted_records().into_iter().cloned().collect(),
        paths: gather_path_entries(&result.tree, path_queries),
    }
}

/// Draws the tree from the seed down, children sorted by domain.
pub fn generate_domain_tree(tree: &DomainTree) -> String {
    let Some(seed) = tree.seed() else {
        return "  (empty)\n".to_string();
    };

    let mut result = format!("{}\n", seed.domain);
    draw_children(tree, &seed.domain, "", &mut result);
    result
}

fn draw_children(tree: &DomainTree, domain: &str, indent: &str, out: &mut String) {
    let children = tree.children(domain);

    for (i, child) in children.iter().enumerate() {
        let is_last = i == children.len() - 1;
        let prefix = if is_last { "└── " } else { "├── " };
        out.push_str(&format!("{}{}{}  [{}]\n", indent, prefix, child.domain, child.depth));

        let next_indent = format!("{}{}", indent, if is_last { "    " } else { "│   " });
        draw_children(tree, &child.domain, &next_indent, out);
    }
}

pub fn generate_path_report(entries: &[PathEntry]) -> String {
    let mut report = String::new();

    for entry in entries {
        match (&entry.path, &entry.error) {
            (Some(path), _) => {
                report.push_str(&format!("  {}\n", format_path(path)));
            }
            (None, Some(error)) => {
                report.push_str(&format!("  {}: {}\n", entry.domain, error));
            }
            (None, None) => {
                report.push_str(&format!("  {}: no path\n", entry.domain));
            }
        }
    }

    report
}

pub fn generate_json_report(data: &ReportData) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Sprawl",
                "version": env!("CARGO_PKG_VERSION"),
                "format": "json"
            },
            "seed": data.seed,
            "summary": data.summary,
            "domains": data.domains,
            "paths": data.paths
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
