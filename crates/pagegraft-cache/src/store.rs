//! The page cache.

use std::collections::{BTreeMap, BTreeSet};

use pagegraft_core::{path, KeyPath, PageKey, PageResponse, PageState};
use serde_json::Value;

use crate::error::CacheError;
use crate::fragment::{FragmentIndex, FragmentTable};

/// Result of applying a graft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraftOutcome {
    /// The node at `path` was replaced.
    Applied { path: KeyPath },
    /// The graft carried no path; nothing to do.
    NoPath,
    /// The cached page has no node at `path` (or the graft carried no data).
    EmptyTarget { path: KeyPath },
}

/// Map from normalized page key to cached page state.
///
/// Entries live for the whole session and are never evicted. Every mutation
/// is synchronous and completes before the next one starts.
#[derive(Debug, Clone, Default)]
pub struct PageCache {
    pages: BTreeMap<PageKey, PageState>,
    index: FragmentIndex,
}

impl PageCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached page.
    pub fn get(&self, page_key: &str) -> Option<&PageState> {
        self.pages.get(page_key)
    }

    /// Whether a page is cached.
    pub fn contains(&self, page_key: &str) -> bool {
        self.pages.contains_key(page_key)
    }

    /// Number of cached pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Cached page keys.
    pub fn keys(&self) -> impl Iterator<Item = &PageKey> {
        self.pages.keys()
    }

    /// Iterate over cached pages.
    pub fn iter(&self) -> impl Iterator<Item = (&PageKey, &PageState)> {
        self.pages.iter()
    }

    /// The fragment name index.
    pub fn fragment_index(&self) -> &FragmentIndex {
        &self.index
    }

    /// Store a full page response.
    ///
    /// A new key stores the page as received. An existing key keeps content
    /// the client already filled in: for every defer path declared by both
    /// the old and the new page, and for every fragment path declared under
    /// the same name by both, the old node replaces the new placeholder.
    /// Deferred paths that the new page declares as a fragment but that were
    /// not carried over are filled from any other page holding that fragment.
    pub fn save(&mut self, page_key: PageKey, page: PageResponse) -> &PageState {
        let mut next = PageState::from_response(page_key.clone(), page);
        let mut carried = BTreeSet::new();

        if let Some(prev) = self.pages.get(&page_key) {
            for defer in &next.defers {
                if !prev.defers.iter().any(|d| d.path == defer.path) {
                    continue;
                }
                if let Some(node) = prev.node(&defer.path) {
                    if path::write(&mut next.data, &defer.path, node.clone()) {
                        carried.insert(defer.path.clone());
                    }
                }
            }

            for (name, paths) in &next.fragments {
                let prev_paths = prev.fragment_paths(name);
                for fragment_path in paths.iter().filter(|p| prev_paths.contains(p)) {
                    if let Some(node) = prev.node(fragment_path) {
                        if path::write(&mut next.data, fragment_path, node.clone()) {
                            carried.insert(fragment_path.clone());
                        }
                    }
                }
            }
        }

        for defer in &next.defers {
            if carried.contains(&defer.path) {
                continue;
            }
            let Some(name) = next
                .fragments
                .iter()
                .find(|(_, paths)| paths.contains(&defer.path))
                .map(|(name, _)| name)
            else {
                continue;
            };
            if let Some(node) = self.fragment_node(name) {
                tracing::debug!(
                    page_key = %page_key,
                    path = %defer.path,
                    fragment = %name,
                    "filling deferred fragment from cached copy"
                );
                path::write(&mut next.data, &defer.path, node.clone());
            }
        }

        tracing::debug!(page_key = %page_key, "saved page");
        self.index.reindex(&next);
        self.pages.insert(page_key.clone(), next);
        &self.pages[&page_key]
    }

    /// Apply a graft to a cached page.
    ///
    /// Fails with [`CacheError::PageNotFound`] when the page is not cached.
    /// A graft without a path, or whose target does not exist in the cached
    /// page, leaves the cache untouched.
    pub fn graft(
        &mut self,
        page_key: &PageKey,
        page: &PageResponse,
    ) -> Result<GraftOutcome, CacheError> {
        let Some(state) = self.pages.get_mut(page_key) else {
            return Err(CacheError::PageNotFound {
                page_key: page_key.clone(),
            });
        };

        let Some(graft_path) = page.graft_path() else {
            return Ok(GraftOutcome::NoPath);
        };

        if page.data.is_null() || state.node(graft_path).is_none() {
            return Ok(GraftOutcome::EmptyTarget {
                path: graft_path.clone(),
            });
        }

        path::write(&mut state.data, graft_path, page.data.clone());

        for (name, paths) in &page.fragments {
            let existing = state.fragments.entry(name.clone()).or_default();
            for fragment_path in paths {
                if !existing.contains(fragment_path) {
                    existing.push(fragment_path.clone());
                }
            }
        }

        if let Some(defers) = &page.defers {
            state.defers = defers.clone();
        }

        tracing::debug!(page_key = %page_key, path = %graft_path, "grafted node");
        self.index.reindex(state);

        Ok(GraftOutcome::Applied {
            path: graft_path.clone(),
        })
    }

    /// Write each fragment's node into every cached page declaring it.
    ///
    /// Pages that declare none of the fragments are not touched. Declared
    /// paths that no longer resolve are skipped. Returns the keys of the
    /// pages that changed.
    pub fn broadcast(&mut self, table: &FragmentTable) -> BTreeSet<PageKey> {
        let mut touched = BTreeSet::new();

        for (name, node) in table {
            for (page_key, paths) in self.index.locations(name) {
                let Some(state) = self.pages.get_mut(page_key) else {
                    continue;
                };
                for fragment_path in paths {
                    if state.node(fragment_path).is_none() {
                        continue;
                    }
                    if path::write(&mut state.data, fragment_path, node.clone()) {
                        touched.insert(page_key.clone());
                    }
                }
            }
        }

        touched
    }

    fn fragment_node(&self, name: &str) -> Option<&Value> {
        self.index.locations(name).find_map(|(page_key, paths)| {
            let state = self.pages.get(page_key)?;
            paths.iter().find_map(|p| state.node(p))
        })
    }
}
