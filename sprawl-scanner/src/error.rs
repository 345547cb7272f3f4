use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Domain is not present in tree: {0}")]
    DomainNotPresent(String),

    #[error("Other error: {0}")]
    Other(String),
}

/// Why a link could not be reduced to a registrable domain.
///
/// These are expected noise in real-world markup; the crawler skips the link
/// and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("could not parse link as an absolute URL")]
    Unparseable,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("incorrect hostname format: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
