//! Utility functions for the proxy pool.

use std::collections::HashSet;
use std::hash::Hash;
use url::Url;

/// Remove duplicates while keeping the first occurrence of each item.
pub fn dedup_preserving_order<T>(items: impl IntoIterator<Item = T>) -> Vec<T>
where
    T: Eq + Hash + Clone,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Build the URL of `page` for a paginated listing, replacing an existing
/// `page` query parameter or appending one.
pub(crate) fn page_url(base: &str, page: usize) -> String {
    let Ok(mut url) = Url::parse(base) else {
        let separator = if base.contains('?') { '&' } else { '?' };
        return format!("{base}{separator}page={page}");
    };

    let page = page.to_string();
    let mut replaced = false;
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            if key == "page" {
                replaced = true;
                (key.into_owned(), page.clone())
            } else {
                (key.into_owned(), value.into_owned())
            }
        })
        .collect();
    if !replaced {
        pairs.push(("page".to_string(), page));
    }

    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let items = vec!["b", "a", "b", "c", "a"];
        assert_eq!(dedup_preserving_order(items), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_page_url_replaces_existing_page() {
        let url = page_url("https://www.freeproxy.world/?type=https&speed=1800&page=1", 3);
        assert_eq!(url, "https://www.freeproxy.world/?type=https&speed=1800&page=3");
    }

    #[test]
    fn test_page_url_appends_page() {
        assert_eq!(
            page_url("https://example.com/list?type=http", 2),
            "https://example.com/list?type=http&page=2"
        );
        assert_eq!(page_url("https://example.com/list", 2), "https://example.com/list?page=2");
    }
}
