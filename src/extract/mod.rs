//! HTML to record extraction.
//!
//! Every extractor here is pure: the same document always yields the same
//! records, in document order.

mod listing;
mod profile;
mod userlist;

pub use listing::*;
pub use profile::*;
pub use userlist::*;

use scraper::{ElementRef, Selector};
use thiserror::Error;

/// Why a single container could not be turned into a record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("missing field '{0}'")]
    Missing(&'static str),
    #[error("field '{field}' is not a count: {source}")]
    Count {
        field: &'static str,
        #[source]
        source: CountError,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("'{raw}' is not an integer")]
pub struct CountError {
    pub raw: String,
}

/// Parse a displayed count, dropping thousands separators first.
///
/// # Errors
///
/// Returns an error if what remains is not an integer.
pub fn parse_count(raw: &str) -> Result<i64, CountError> {
    let digits: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '.' | '\'' | '\u{a0}' | '\u{202f}' | ' '))
        .collect();
    digits.parse().map_err(|_| CountError {
        raw: raw.to_string(),
    })
}

fn parse_count_field(field: &'static str, raw: &str) -> Result<i64, FieldError> {
    parse_count(raw).map_err(|source| FieldError::Count { field, source })
}

/// Concatenated, trimmed text of an element.
fn text_of(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(element: &ElementRef, selector: &Selector) -> Option<String> {
    element.select(selector).next().map(|e| text_of(&e))
}

fn required_text(
    element: &ElementRef,
    selector: &Selector,
    field: &'static str,
) -> Result<String, FieldError> {
    first_text(element, selector).ok_or(FieldError::Missing(field))
}

fn required_attr(
    element: &ElementRef,
    selector: &Selector,
    attr: &str,
    field: &'static str,
) -> Result<String, FieldError> {
    element
        .select(selector)
        .find_map(|e| e.value().attr(attr))
        .map(str::to_string)
        .ok_or(FieldError::Missing(field))
}

/// Build a selector from a constant pattern.
fn selector(pattern: &str) -> Selector {
    Selector::parse(pattern).expect("Invalid selector")
}
