//! Cursor pagination over `{data: [...], paging: {next}}` envelopes.
//!
//! The `paging.next` URL is opaque but occasionally drops the `filtering`
//! parameter of the original request. Following it as-is would silently widen
//! the result set, so the filter is re-attached when missing.

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

/// Maximum number of pages to follow before returning an error.
/// Guards against cursors that cycle.
pub const MAX_PAGES: usize = 200;

#[derive(Debug, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub next: Option<String>,
}

impl Page {
    #[must_use]
    pub fn next_url(&self) -> Option<&str> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.as_deref())
            .filter(|n| !n.is_empty())
    }
}

/// Resolves the next page URL, restoring `filtering` when the cursor dropped it.
///
/// Returns `None` when the cursor is absent or unparseable.
#[must_use]
pub fn next_page_url(page: &Page, filtering: Option<&str>) -> Option<Url> {
    let mut url = Url::parse(page.next_url()?).ok()?;

    if let Some(filtering) = filtering {
        let has_filter = url.query_pairs().any(|(k, _)| k == "filtering");
        if !has_filter {
            url.query_pairs_mut().append_pair("filtering", filtering);
        }
    }

    // The client authenticates with a header; never echo a token back in a URL.
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "access_token")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut().clear().extend_pairs(retained);

    Some(url)
}
