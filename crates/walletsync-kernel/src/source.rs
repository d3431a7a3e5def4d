//! Paged remote source contract.
//!
//! A [`PagedSource`] is the collaborator that knows how to fetch one page of a
//! remote collection (validators, delegates, ...).  The synchronizers in
//! [`crate::sync`] only depend on this trait, never on a transport.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Marker identifying a page.
///
/// Remote APIs report page markers either as numbers or as strings, so both
/// shapes deserialize: `2` becomes `Number(2)` and `"2"` becomes `Token("2")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cursor {
    Number(u64),
    Token(String),
}

impl Cursor {
    /// Interpret the cursor as a page number.
    ///
    /// Tokens are parsed as base-10 integers after trimming whitespace.
    /// Returns `None` for anything that is not a page number.
    pub fn page_number(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Token(token) => token.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Token(token) => f.write_str(token),
        }
    }
}

impl From<u64> for Cursor {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Cursor {
    fn from(token: &str) -> Self {
        Self::Token(token.to_string())
    }
}

impl From<String> for Cursor {
    fn from(token: String) -> Self {
        Self::Token(token)
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// One batch of remote items plus pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: Cursor,
    pub last_page: Cursor,
    #[serde(default)]
    pub next_page: Option<Cursor>,
    #[serde(default)]
    pub has_more_pages: bool,
}

impl<T> Page<T> {
    /// Build page `current` of `last` with consistent `next_page` /
    /// `has_more_pages` metadata.
    pub fn numbered(items: Vec<T>, current: u64, last: u64) -> Self {
        let has_more_pages = current < last;
        Self {
            items,
            current_page: Cursor::Number(current),
            last_page: Cursor::Number(last),
            next_page: has_more_pages.then(|| Cursor::Number(current + 1)),
            has_more_pages,
        }
    }

    /// A response that is the whole collection.
    pub fn single(items: Vec<T>) -> Self {
        Self::numbered(items, 1, 1)
    }

    /// `(current, last)` parsed as page numbers, if both parse.
    pub fn page_numbers(&self) -> Option<(u64, u64)> {
        Some((self.current_page.page_number()?, self.last_page.page_number()?))
    }

    /// The cursor of the page after this one.
    ///
    /// Uses `next_page` when the source provides it, otherwise
    /// `current_page + 1` when the current page is numeric.
    pub fn next_cursor(&self) -> Option<Cursor> {
        if let Some(next) = &self.next_page {
            return Some(next.clone());
        }
        self.current_page
            .page_number()
            .and_then(|n| n.checked_add(1))
            .map(Cursor::Number)
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Filters forwarded verbatim to the source on every page fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncQuery {
    filters: BTreeMap<String, serde_json::Value>,
}

impl SyncQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a filter.
    #[must_use]
    pub fn filter(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.filters.get(name)
    }

    pub fn filters(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// A remote collection that can be read one page at a time.
///
/// `cursor` is `None` for the first page.  Implementations report failures
/// as [`KernelError::Fetch`](crate::KernelError::Fetch).  Timeouts and
/// cancellation belong to the implementation; dropping the returned future
/// must abandon the request.
#[async_trait]
pub trait PagedSource<T>: Send + Sync {
    async fn fetch_page(&self, query: &SyncQuery, cursor: Option<&Cursor>) -> Result<Page<T>>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_parses_numeric_tokens() {
        assert_eq!(Cursor::Number(3).page_number(), Some(3));
        assert_eq!(Cursor::from(" 12 ").page_number(), Some(12));
        assert_eq!(Cursor::from("abc").page_number(), None);
        assert_eq!(Cursor::from("-1").page_number(), None);
    }

    #[test]
    fn cursor_deserializes_numbers_and_strings() {
        let n: Cursor = serde_json::from_str("4").unwrap();
        assert_eq!(n, Cursor::Number(4));
        let s: Cursor = serde_json::from_str("\"4\"").unwrap();
        assert_eq!(s, Cursor::Token("4".into()));
        assert_eq!(s.page_number(), Some(4));
    }

    #[test]
    fn numbered_page_metadata_is_consistent() {
        let first = Page::numbered(vec![1, 2], 1, 3);
        assert!(first.has_more_pages);
        assert_eq!(first.next_page, Some(Cursor::Number(2)));

        let last = Page::numbered(vec![5], 3, 3);
        assert!(!last.has_more_pages);
        assert_eq!(last.next_page, None);
    }

    #[test]
    fn next_cursor_falls_back_to_current_plus_one() {
        let mut page = Page::numbered(vec![0u8], 2, 5);
        page.next_page = None;
        assert_eq!(page.next_cursor(), Some(Cursor::Number(3)));

        page.current_page = Cursor::from("opaque");
        assert_eq!(page.next_cursor(), None);
    }

    #[test]
    fn page_deserializes_camel_case_metadata() {
        let json = r#"{
            "items": ["a", "b"],
            "currentPage": "1",
            "lastPage": 2,
            "nextPage": 2,
            "hasMorePages": true
        }"#;
        let page: Page<String> = serde_json::from_str(json).unwrap();
        assert_eq!(page.page_numbers(), Some((1, 2)));
        assert_eq!(page.items.len(), 2);
    }

    #[test]
    fn query_builder() {
        let query = SyncQuery::new().filter("isResigned", false).filter("limit", 100);
        assert_eq!(query.get("limit"), Some(&serde_json::json!(100)));
        assert!(!query.is_empty());
    }
}
