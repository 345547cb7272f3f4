use crate::error::{Result, ScanError};
use scraper::{Html, Selector};

/// Extracts the `href` of every anchor start tag, in document order.
///
/// Values are returned exactly as written in the markup (after entity
/// decoding). Relative links are not resolved; the caller decides what to do
/// with them.
pub fn anchor_hrefs(html: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);

    let anchor_selector = Selector::parse("a[href]")
        .map_err(|e| ScanError::ParseError(format!("Invalid anchor selector: {}", e)))?;

    let hrefs = document
        .select(&anchor_selector)
        .filter_map(|element| element.value().attr("href"))
        .map(|href| href.to_string())
        .collect();

    Ok(hrefs)
}
