// Plain-text snapshots of a finished crawl tree

use anyhow::{Context, Result};
use sprawl_scanner::error::ScanError;
use sprawl_scanner::{DiscoveryRecord, DomainTree};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Written in the parent column for the seed.
pub const ROOT_SENTINEL: &str = "-";

/// Appends `domain parent depth` lines to a snapshot file.
///
/// Existing content is never truncated, so one file can accumulate several
/// runs. The file is flushed after every tree and closed on drop.
pub struct SnapshotWriter {
    file: BufWriter<File>,
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open snapshot file {}", path.display()))?;

        Ok(Self {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes every record of `tree`, seed first, then by depth and domain.
    /// Returns the number of lines written.
    pub fn write_tree(&mut self, tree: &DomainTree) -> Result<usize> {
        let records = tree.sorted_records();

        for record in &records {
            writeln!(self.file, "{}", format_record(record))
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        }

        self.file
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;

        Ok(records.len())
    }
}

pub fn format_record(record: &DiscoveryRecord) -> String {
    format!(
        "{} {} {}",
        record.domain,
        record.parent.as_deref().unwrap_or(ROOT_SENTINEL),
        record.depth
    )
}

/// Reads snapshot files back into trees.
pub struct SnapshotReader;

impl SnapshotReader {
    /// The most recent run in the file at `path`.
    pub fn load(path: &Path) -> std::result::Result<DomainTree, ScanError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Every run in the file at `path`, oldest first.
    pub fn load_runs(path: &Path) -> std::result::Result<Vec<DomainTree>, ScanError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_runs(&content)
    }

    pub fn parse(content: &str) -> std::result::Result<DomainTree, ScanError> {
        Ok(Self::parse_runs(content)?.pop().unwrap_or_default())
    }

    pub fn parse_runs(content: &str) -> std::result::Result<Vec<DomainTree>, ScanError> {
        let mut runs: Vec<Vec<DiscoveryRecord>> = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let record = parse_line(line).map_err(|reason| {
                ScanError::ParseError(format!("line {}: {}: {:?}", idx + 1, reason, line))
            })?;

            match runs.last_mut() {
                Some(run) if !record.is_seed() => run.push(record),
                None if !record.is_seed() => {
                    return Err(ScanError::ParseError(format!(
                        "line {}: record before any seed: {:?}",
                        idx + 1,
                        line
                    )));
                }
                _ => runs.push(vec![record]),
            }
        }

        Ok(runs.into_iter().map(DomainTree::from_records).collect())
    }
}

fn parse_line(line: &str) -> std::result::Result<DiscoveryRecord, &'static str> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [domain, parent, depth] = fields.as_slice() else {
        return Err("expected `domain parent depth`");
    };

    let depth: u16 = depth.parse().map_err(|_| "depth is not a number")?;

    if *parent == ROOT_SENTINEL {
        if depth != 0 {
            return Err("seed must have depth 0");
        }
        Ok(DiscoveryRecord::seed(domain))
    } else {
        Ok(DiscoveryRecord::child(domain, parent, depth))
    }
}
