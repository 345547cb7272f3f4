//! Reduction of raw link text to a canonical registrable domain.
//!
//! A registrable domain is the public suffix of a hostname plus the one label
//! in front of it: `www.shop.example.co.uk` becomes `example.co.uk`. IP
//! literals have no suffix and are kept as they are.

use crate::error::{DomainError, Result, ScanError};
use publicsuffix::{List, Psl};
use std::fs;
use std::path::Path;
use url::{Host, Url};

const BUNDLED_SUFFIX_LIST: &str = include_str!("../data/public_suffix_list.dat");

/// Maps a hostname to its public suffix. Never fails; an empty string means
/// no suffix could be determined.
pub trait SuffixLookup: Send + Sync {
    fn public_suffix(&self, host: &str) -> String;
}

impl<F> SuffixLookup for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn public_suffix(&self, host: &str) -> String {
        self(host)
    }
}

/// A parsed public suffix list.
#[derive(Debug, Clone)]
pub struct PublicSuffixList {
    list: List,
}

impl PublicSuffixList {
    /// The abridged list compiled into the binary.
    pub fn bundled() -> Result<Self> {
        Self::parse(BUNDLED_SUFFIX_LIST)
    }

    /// Loads a list in the `public_suffix_list.dat` format from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let list = content
            .parse::<List>()
            .map_err(|e| ScanError::ParseError(format!("Invalid public suffix list: {}", e)))?;
        Ok(Self { list })
    }
}

impl SuffixLookup for PublicSuffixList {
    fn public_suffix(&self, host: &str) -> String {
        self.list
            .suffix(host.as_bytes())
            .map(|suffix| String::from_utf8_lossy(suffix.as_bytes()).into_owned())
            .unwrap_or_default()
    }
}

/// Canonicalizes a link to the registrable domain of its host.
///
/// Only absolute `http` and `https` links are accepted. Relative links fail
/// to parse and are rejected along with everything else that is not a web
/// address.
pub fn canonical_domain<S>(link: &str, suffixes: &S) -> std::result::Result<String, DomainError>
where
    S: SuffixLookup + ?Sized,
{
    let url = Url::parse(link).map_err(|_| DomainError::Unparseable)?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(DomainError::UnsupportedScheme(other.to_string())),
    }

    let host = url.host_str().ok_or(DomainError::MissingHost)?;
    if let Some(Host::Ipv6(_)) = url.host() {
        return Ok(host.to_string());
    }

    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() {
        return Err(DomainError::MissingHost);
    }

    if is_numeric_host(host) {
        return Ok(host.to_string());
    }

    let suffix = suffixes.public_suffix(host);
    registrable_domain(host, &suffix).ok_or_else(|| DomainError::Malformed(host.to_string()))
}

/// True when the labels of `host`, concatenated, are all digits.
fn is_numeric_host(host: &str) -> bool {
    let mut digits = host.split('.').flat_map(str::chars).peekable();
    digits.peek().is_some() && digits.all(|c| c.is_ascii_digit())
}

fn registrable_domain(host: &str, suffix: &str) -> Option<String> {
    if suffix.is_empty() {
        return None;
    }

    let rest = host.strip_suffix(suffix)?.strip_suffix('.')?;
    let label = rest.rsplit('.').next().filter(|label| !label.is_empty())?;

    Some(format!("{}.{}", label, suffix))
}
