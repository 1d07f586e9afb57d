//! Query-string helpers for paging links
//!
//! Links keep every active filter and replace or drop one parameter.

use std::collections::BTreeMap;

/// Query parameters in request order.
pub type QueryPairs = Vec<(String, String)>;

/// Parameters that control paging rather than filtering.
const PAGING_KEYS: [&str; 3] = ["page", "per_page", "after"];

fn encode(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// `pairs` with every `key` replaced by a single `key=value`.
pub fn with_param(pairs: &[(String, String)], key: &str, value: &str) -> String {
    let mut out: QueryPairs = pairs.iter().filter(|(k, _)| k != key).cloned().collect();
    out.push((key.to_owned(), value.to_owned()));
    encode(&out)
}

/// `pairs` without `key`.
pub fn without_param(pairs: &[(String, String)], key: &str) -> String {
    let out: QueryPairs = pairs.iter().filter(|(k, _)| k != key).cloned().collect();
    encode(&out)
}

/// `path?query`, or just `path` when the query is empty.
pub fn link(path: &str, query: String) -> String {
    if query.is_empty() {
        path.to_owned()
    } else {
        format!("{path}?{query}")
    }
}

/// Link to `page` of an offset-paged view. Page 1 carries no `page` parameter.
pub fn page_link(path: &str, pairs: &[(String, String)], page: u32) -> String {
    let query = if page <= 1 {
        without_param(pairs, "page")
    } else {
        with_param(pairs, "page", &page.to_string())
    };
    link(path, query)
}

/// Filter values: non-paging parameters, last occurrence wins, blanks dropped.
pub fn filter_params(pairs: &[(String, String)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .filter(|(k, v)| !PAGING_KEYS.contains(&k.as_str()) && !v.trim().is_empty())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Last value of `key`.
pub fn param<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
