pub mod commands;
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    build_crawl_options, expand_path, parse_seed_url, render_crawl_output, run_path_query,
};

// Re-export crawl functionality from sprawl-core
pub use sprawl_core::crawl::{
    CrawlOptions, CrawlProgressCallback, execute_crawl, generate_crawl_report,
};
