//! Fragment extraction and the fragment-name index.

use std::collections::BTreeMap;

use pagegraft_core::{path, FragmentMap, FragmentName, KeyPath, PageKey, PageResponse, PageState};
use serde_json::Value;

/// Fragment name to the freshly received node for that fragment.
pub type FragmentTable = BTreeMap<FragmentName, Value>;

/// Index from fragment name to every cached `(page, path)` holding it.
///
/// This is the reverse of each page's own fragment map. The cache keeps it in
/// step whenever a page's fragment declarations change.
#[derive(Debug, Clone, Default)]
pub struct FragmentIndex {
    locations: BTreeMap<FragmentName, BTreeMap<PageKey, Vec<KeyPath>>>,
}

impl FragmentIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the fragment table carried by a received page.
    ///
    /// Only the first declared path of each fragment is read. For a graft the
    /// path is rebased onto the grafted node by dropping as many leading
    /// segments as the graft path has; for a full page it resolves against
    /// `data` directly. Paths that resolve to nothing or to `null` are
    /// skipped.
    pub fn extract(page: &PageResponse) -> FragmentTable {
        let base = page
            .is_graft()
            .then(|| page.path.clone().unwrap_or_default());

        resolve_table(&page.data, &page.fragments, |first| match &base {
            Some(base) => first.relative_to(base),
            None => first.clone(),
        })
    }

    /// Build the fragment table of a page as stored in the cache.
    ///
    /// Reads the saved data, so content carried over from an earlier copy of
    /// the page is what gets propagated rather than the fresh placeholder.
    pub fn extract_state(state: &PageState) -> FragmentTable {
        resolve_table(&state.data, &state.fragments, KeyPath::clone)
    }

    /// Every cached page and its paths for a fragment name.
    pub fn locations(&self, name: &str) -> impl Iterator<Item = (&PageKey, &[KeyPath])> {
        self.locations
            .get(name)
            .into_iter()
            .flat_map(|pages| pages.iter().map(|(key, paths)| (key, paths.as_slice())))
    }

    /// Pages declaring a fragment name.
    pub fn pages_declaring(&self, name: &str) -> impl Iterator<Item = &PageKey> {
        self.locations(name).map(|(key, _)| key)
    }

    /// Whether any cached page declares the fragment.
    pub fn contains(&self, name: &str) -> bool {
        self.locations.contains_key(name)
    }

    /// Number of distinct fragment names.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Replace a page's entries with its current fragment map.
    pub(crate) fn reindex(&mut self, page: &PageState) {
        self.remove_page(&page.page_key);

        for (name, paths) in &page.fragments {
            if paths.is_empty() {
                continue;
            }
            self.locations
                .entry(name.clone())
                .or_default()
                .insert(page.page_key.clone(), paths.clone());
        }
    }

    fn remove_page(&mut self, page_key: &PageKey) {
        self.locations.retain(|_, pages| {
            pages.remove(page_key);
            !pages.is_empty()
        });
    }
}

fn resolve_table(
    data: &Value,
    fragments: &FragmentMap,
    rebase: impl Fn(&KeyPath) -> KeyPath,
) -> FragmentTable {
    fragments
        .iter()
        .filter_map(|(name, paths)| {
            let resolved = rebase(paths.first()?);
            let node = path::read(data, &resolved).filter(|node| !node.is_null())?;
            Some((name.clone(), node.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // === extract Tests ===

    #[test]
    fn test_extract_full_page_resolves_absolutely() {
        let page = PageResponse::new(json!({"header": {"cart": {"total": 3}}}))
            .with_fragment("cart", ["header.cart"]);

        let table = FragmentIndex::extract(&page);
        assert_eq!(table["cart"], json!({"total": 3}));
    }

    #[test]
    fn test_extract_graft_resolves_relative_to_graft_path() {
        let page = PageResponse::graft("header", json!({"cart": {"total": 5}}))
            .with_fragment("cart", ["header.cart"]);

        let table = FragmentIndex::extract(&page);
        assert_eq!(table["cart"], json!({"total": 5}));
    }

    #[test]
    fn test_extract_graft_fragment_at_graft_root() {
        let page = PageResponse::graft("a.b.c", json!({"foo": 1}))
            .with_fragment("header", ["a.b.c"]);

        let table = FragmentIndex::extract(&page);
        assert_eq!(table["header"], json!({"foo": 1}));
    }

    #[test]
    fn test_extract_uses_first_declared_path() {
        let page = PageResponse::new(json!({"a": 1, "b": 2})).with_fragment("dup", ["a", "b"]);

        let table = FragmentIndex::extract(&page);
        assert_eq!(table["dup"], json!(1));
    }

    #[test]
    fn test_extract_skips_unresolvable() {
        let page = PageResponse::new(json!({})).with_fragment("missing", ["x.y"]);
        assert!(FragmentIndex::extract(&page).is_empty());
    }

    #[test]
    fn test_extract_skips_null_nodes() {
        let page = PageResponse::graft("a.b.c", Value::Null).with_fragment("header", ["a.b.c"]);
        assert!(FragmentIndex::extract(&page).is_empty());
    }

    #[test]
    fn test_extract_state_reads_saved_data() {
        let state = PageState::from_response(
            PageKey::new("/foo"),
            PageResponse::new(json!({"foo": {"bar": {"greetings": "hello"}}}))
                .with_fragment("info", ["foo.bar"]),
        );

        let table = FragmentIndex::extract_state(&state);
        assert_eq!(table["info"], json!({"greetings": "hello"}));
    }

    // === Index Tests ===

    #[test]
    fn test_reindex_tracks_pages() {
        let mut index = FragmentIndex::new();
        let foo = PageState::from_response(
            PageKey::new("/foo"),
            PageResponse::new(json!({})).with_fragment("header", ["header"]),
        );
        let bar = PageState::from_response(
            PageKey::new("/bar"),
            PageResponse::new(json!({})).with_fragment("header", ["nav.header", "footer.header"]),
        );

        index.reindex(&foo);
        index.reindex(&bar);

        let pages: Vec<_> = index.pages_declaring("header").map(PageKey::as_str).collect();
        assert_eq!(pages, vec!["/bar", "/foo"]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_reindex_drops_stale_names() {
        let mut index = FragmentIndex::new();
        let with_fragment = PageState::from_response(
            PageKey::new("/foo"),
            PageResponse::new(json!({})).with_fragment("header", ["header"]),
        );
        let without = PageState::from_response(PageKey::new("/foo"), PageResponse::new(json!({})));

        index.reindex(&with_fragment);
        assert!(index.contains("header"));

        index.reindex(&without);
        assert!(!index.contains("header"));
        assert!(index.is_empty());
    }
}
