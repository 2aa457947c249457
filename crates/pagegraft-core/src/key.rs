//! Page key normalization.
//!
//! A page key is the URL of a page with every control query parameter
//! removed, so that `/products?__=3` and `/products?bzq=header` land in the
//! same cache entry.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::config::ControlParams;
use crate::path::KeyPath;

/// A normalized URL identifying one cached page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageKey(String);

impl PageKey {
    /// Wrap an already-normalized key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key is empty (no page to address).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for PageKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PageKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PageKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Strips control parameters from URLs.
#[derive(Debug, Clone, Default)]
pub struct KeyNormalizer {
    params: ControlParams,
}

impl KeyNormalizer {
    /// Create a normalizer for the given parameter names.
    pub fn new(params: ControlParams) -> Self {
        Self { params }
    }

    /// Get the parameter names.
    pub fn params(&self) -> &ControlParams {
        &self.params
    }

    /// Normalize a URL into a page key (all control parameters removed).
    pub fn page_key(&self, url: &str) -> PageKey {
        PageKey(self.strip(
            url,
            &[
                &self.params.cache_buster,
                &self.params.anti_cache,
                &self.params.fragment_query,
            ],
        ))
    }

    /// Remove the cache-busters but keep the fragment-request parameter.
    pub fn without_busters(&self, url: &str) -> String {
        self.strip(url, &[&self.params.cache_buster, &self.params.anti_cache])
    }

    /// Extract the key path requested through the fragment-request parameter.
    pub fn key_path(&self, url: &str) -> Option<KeyPath> {
        let query = UrlParts::split(url).query?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(name, _)| *name == self.params.fragment_query.as_str())
            .map(|(_, value)| KeyPath::new(value.into_owned()))
    }

    fn strip(&self, url: &str, names: &[&str]) -> String {
        let parts = UrlParts::split(url);
        let Some(query) = parts.query else {
            return url.to_string();
        };

        let kept: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .filter(|(name, _)| !names.iter().any(|skip| *skip == *name))
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();

        let mut out = parts.base.to_string();
        if !kept.is_empty() {
            out.push('?');
            out.push_str(
                &form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(&kept)
                    .finish(),
            );
        }
        if let Some(hash) = parts.hash {
            out.push('#');
            out.push_str(hash);
        }
        out
    }
}

struct UrlParts<'a> {
    base: &'a str,
    query: Option<&'a str>,
    hash: Option<&'a str>,
}

impl<'a> UrlParts<'a> {
    fn split(url: &'a str) -> Self {
        let (rest, hash) = match url.split_once('#') {
            Some((rest, hash)) => (rest, Some(hash)),
            None => (url, None),
        };
        let (base, query) = match rest.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (rest, None),
        };
        Self { base, query, hash }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> KeyNormalizer {
        KeyNormalizer::default()
    }

    // === page_key Tests ===

    #[test]
    fn test_page_key_strips_all_control_params() {
        let key = normalizer().page_key("/first?bzq=foo&__=bar&_=baz");
        assert_eq!(key.as_str(), "/first");
    }

    #[test]
    fn test_page_key_keeps_other_params() {
        let key = normalizer().page_key("/search?q=shoes&__=0&page=2");
        assert_eq!(key.as_str(), "/search?q=shoes&page=2");
    }

    #[test]
    fn test_page_key_without_query() {
        assert_eq!(normalizer().page_key("/foo").as_str(), "/foo");
        assert_eq!(normalizer().page_key("").as_str(), "");
    }

    #[test]
    fn test_page_key_keeps_hash() {
        let key = normalizer().page_key("https://shop.test/foo?__=1#reviews");
        assert_eq!(key.as_str(), "https://shop.test/foo#reviews");
    }

    #[test]
    fn test_page_key_custom_params() {
        let normalizer = KeyNormalizer::new(ControlParams {
            cache_buster: "cb".to_string(),
            anti_cache: "t".to_string(),
            fragment_query: "props_at".to_string(),
        });
        let key = normalizer.page_key("/foo?cb=1&t=2&props_at=a.b&__=keep");
        assert_eq!(key.as_str(), "/foo?__=keep");
    }

    // === without_busters Tests ===

    #[test]
    fn test_without_busters_keeps_fragment_query() {
        let url = normalizer().without_busters("/first?bzq=foo&__=bar&_=baz");
        assert_eq!(url, "/first?bzq=foo");
    }

    // === key_path Tests ===

    #[test]
    fn test_key_path_extraction() {
        let path = normalizer().key_path("/foo?bzq=data.header.cart&__=0");
        assert_eq!(path, Some(KeyPath::new("data.header.cart")));
    }

    #[test]
    fn test_key_path_missing() {
        assert_eq!(normalizer().key_path("/foo?q=1"), None);
        assert_eq!(normalizer().key_path("/foo"), None);
    }

    #[test]
    fn test_page_key_borrow_str() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(PageKey::new("/foo"), 1);
        assert_eq!(map.get("/foo"), Some(&1));
    }
}
