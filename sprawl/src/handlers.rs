use clap::ArgMatches;
use colored::Colorize;
use sprawl_core::report::{
    PathEntry, ReportFormat, gather_path_entries, gather_report_data, generate_json_report,
    generate_path_report, save_report,
};
use sprawl_core::snapshot::SnapshotReader;
use sprawl_scanner::CrawlResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

// Re-export crawl types and functions from sprawl-core
pub use sprawl_core::crawl::{
    CrawlOptions, CrawlProgressCallback, execute_crawl, generate_crawl_report,
};

// Helper functions for crawl handler

/// Parse a seed argument as an http(s) URL, adding http:// if needed
pub fn parse_seed_url(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    // Try to parse as-is
    if let Ok(url) = Url::parse(line)
        && matches!(url.scheme(), "http" | "https")
        && url.host_str().is_some()
    {
        return Some(line.to_string());
    }

    // Try adding http://
    let with_scheme = format!("http://{}", line);
    match Url::parse(&with_scheme) {
        Ok(url) if url.host_str().is_some() && !line.contains("://") => Some(with_scheme),
        _ => None,
    }
}

/// Expand a leading `~` in a user-supplied path
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Build crawl options from the `crawl` subcommand's arguments
pub fn build_crawl_options(sub_matches: &ArgMatches) -> Result<CrawlOptions, String> {
    let raw_url = sub_matches
        .get_one::<String>("url")
        .ok_or_else(|| "A seed URL must be provided with --url".to_string())?;
    let seed = parse_seed_url(raw_url).ok_or_else(|| format!("Invalid seed URL '{}'", raw_url))?;

    let mut options = CrawlOptions::new(seed);
    options.max_depth = *sub_matches.get_one::<u16>("max-depth").unwrap_or(&1);
    options.timeout =
        Duration::from_millis(*sub_matches.get_one::<u64>("timeout-ms").unwrap_or(&1000));
    options.max_concurrent_fetches = sub_matches.get_one::<usize>("max-concurrent").copied();
    options.suffix_list = sub_matches
        .get_one::<String>("suffix-list")
        .map(|path| expand_path(path));
    options.output = if sub_matches.get_flag("no-snapshot") {
        None
    } else {
        sub_matches
            .get_one::<String>("output")
            .map(|path| expand_path(path))
    };
    options.show_progress_bars = true;

    Ok(options)
}

fn report_format(sub_matches: &ArgMatches) -> ReportFormat {
    sub_matches
        .get_one::<String>("format")
        .and_then(|format| ReportFormat::from_str(format))
        .unwrap_or(ReportFormat::Text)
}

fn path_queries(sub_matches: &ArgMatches, id: &str) -> Vec<String> {
    sub_matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

/// Render a finished crawl, with any requested path queries
pub fn render_crawl_output(
    result: &CrawlResult,
    format: ReportFormat,
    path_queries: &[String],
) -> Result<String, String> {
    match format {
        ReportFormat::Text => {
            let mut report = generate_crawl_report(result);
            if !path_queries.is_empty() {
                report.push_str("\n## Shortest paths\n");
                report.push_str(&generate_path_report(&gather_path_entries(
                    &result.tree,
                    path_queries,
                )));
            }
            Ok(report)
        }
        ReportFormat::Json => {
            let data = gather_report_data(result, path_queries);
            generate_json_report(&data).map_err(|e| format!("Failed to render JSON report: {}", e))
        }
    }
}

/// Answer path queries against a saved snapshot
pub fn run_path_query(
    snapshot: &Path,
    domains: &[String],
    format: ReportFormat,
) -> Result<(String, Vec<PathEntry>), String> {
    let tree = SnapshotReader::load(snapshot)
        .map_err(|e| format!("Failed to load snapshot {}: {}", snapshot.display(), e))?;

    if tree.is_empty() {
        return Err(format!("Snapshot {} holds no crawl", snapshot.display()));
    }

    let entries = gather_path_entries(&tree, domains);
    let output = match format {
        ReportFormat::Text => generate_path_report(&entries),
        ReportFormat::Json => serde_json::to_string_pretty(&entries)
            .map_err(|e| format!("Failed to render JSON: {}", e))?,
    };

    Ok((output, entries))
}

/// The banner is skipped under `--quiet` and whenever stdout carries JSON.
pub fn wants_banner(matches: &ArgMatches) -> bool {
    if matches.get_flag("quiet") {
        return false;
    }

    match matches.subcommand() {
        Some((_, sub_matches)) => report_format(sub_matches) != ReportFormat::Json,
        None => true,
    }
}

pub fn print_banner() {
    println!(
        "{} {}",
        "sprawl".bright_cyan().bold(),
        env!("CARGO_PKG_VERSION").bright_black()
    );
    println!("{}", "maps the web outward, one registrable domain at a time".bright_black());
    println!();
}

pub async fn handle_crawl(sub_matches: &ArgMatches) {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let options = match build_crawl_options(sub_matches) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };
    let format = report_format(sub_matches);
    let queries = path_queries(sub_matches, "path");
    let report_path = sub_matches.get_one::<PathBuf>("report");

    if format == ReportFormat::Text {
        println!("\n{} Crawling {}", "→".blue(), options.seed.bright_white());
        println!("Max depth: {}", options.max_depth);
        println!("Timeout: {}ms", options.timeout.as_millis());
        match options.max_concurrent_fetches {
            Some(limit) => println!("Concurrent fetches: {}", limit),
            None => println!("Concurrent fetches: unlimited"),
        }
        if let Some(ref output) = options.output {
            println!("Snapshot: {}\n", output.display());
        } else {
            println!("Snapshot: disabled\n");
        }
    }

    let progress_callback: Option<CrawlProgressCallback> = if sub_matches.get_flag("verbose") {
        Some(Arc::new(|msg: String| {
            eprintln!("{}", msg);
        }))
    } else {
        None
    };

    let result = match execute_crawl(options, progress_callback).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{} Crawl failed: {:#}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    let report = match render_crawl_output(&result, format, &queries) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    match report_path {
        Some(path) => {
            if let Err(e) = save_report(&report, path) {
                eprintln!(
                    "{} Failed to save report to {}: {}",
                    "✗".red().bold(),
                    path.display(),
                    e
                );
                std::process::exit(1);
            }
            println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => {
            if format == ReportFormat::Text {
                println!("\n{} Crawl complete!\n", "✓".green().bold());
            }
            print!("{}", report);
        }
    }
}

pub fn handle_path(sub_matches: &ArgMatches) {
    let domains = path_queries(sub_matches, "DOMAIN");
    let snapshot = sub_matches
        .get_one::<String>("snapshot")
        .map(|path| expand_path(path))
        .unwrap_or_else(|| PathBuf::from(sprawl_core::crawl::DEFAULT_OUTPUT));
    let format = report_format(sub_matches);

    let (output, entries) = match run_path_query(&snapshot, &domains, format) {
        Ok(answer) => answer,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    print!("{}", output);

    if entries.iter().any(|entry| entry.path.is_none()) {
        std::process::exit(1);
    }
}
