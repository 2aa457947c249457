//! Page payloads and cached page state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::key::PageKey;
use crate::path::{self, KeyPath};

/// Name of a fragment shared across pages.
pub type FragmentName = String;

/// Fragment name to every page-relative path where that fragment lives.
pub type FragmentMap = BTreeMap<FragmentName, Vec<KeyPath>>;

/// Response `action` marking a partial patch.
pub const GRAFT_ACTION: &str = "graft";

/// How a deferred placeholder gets filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeferKind {
    /// Fetched by the engine as soon as the declaring page is ingested.
    Auto,
    /// Left for the caller to fetch.
    #[default]
    Manual,
}

/// A placeholder subtree to be filled by a follow-up fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeferDescriptor {
    /// URL that renders the subtree.
    pub url: String,
    /// Where the subtree lives inside the page's `data`.
    pub path: KeyPath,
    /// Fetch mode.
    #[serde(rename = "type", default)]
    pub kind: DeferKind,
}

impl DeferDescriptor {
    /// An automatically resolved deferment.
    pub fn auto(url: impl Into<String>, path: impl Into<KeyPath>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            kind: DeferKind::Auto,
        }
    }

    /// A caller-resolved deferment.
    pub fn manual(url: impl Into<String>, path: impl Into<KeyPath>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            kind: DeferKind::Manual,
        }
    }

    /// Whether the engine resolves this deferment itself.
    pub fn is_auto(&self) -> bool {
        self.kind == DeferKind::Auto
    }
}

/// An inbound page payload: either a full page or a graft.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    /// Page data, or the grafted node for a graft.
    #[serde(default)]
    pub data: Value,

    /// CSRF token rendered with the page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,

    /// Asset fingerprints the page was rendered against.
    #[serde(default)]
    pub assets: Vec<String>,

    /// Declared deferments. `None` when the response declares none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defers: Option<Vec<DeferDescriptor>>,

    /// Declared fragments.
    #[serde(default)]
    pub fragments: FragmentMap,

    /// `"graft"` for partial responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Graft target, relative to the page's `data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<KeyPath>,

    /// View component that renders this page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_identifier: Option<String>,

    /// Any other top-level fields, carried through verbatim.
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

impl PageResponse {
    /// A full page response.
    pub fn new(data: Value) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// A graft of `data` at `path`.
    pub fn graft(path: impl Into<KeyPath>, data: Value) -> Self {
        Self {
            data,
            action: Some(GRAFT_ACTION.to_string()),
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Declare a fragment.
    pub fn with_fragment<I, P>(mut self, name: impl Into<FragmentName>, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPath>,
    {
        self.fragments
            .insert(name.into(), paths.into_iter().map(Into::into).collect());
        self
    }

    /// Declare a deferment.
    pub fn with_defer(mut self, defer: DeferDescriptor) -> Self {
        self.defers.get_or_insert_with(Vec::new).push(defer);
        self
    }

    /// Set the asset list.
    pub fn with_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assets = assets.into_iter().map(Into::into).collect();
        self
    }

    /// Set the CSRF token.
    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    /// Set the component identifier.
    pub fn with_component(mut self, identifier: impl Into<String>) -> Self {
        self.component_identifier = Some(identifier.into());
        self
    }

    /// Whether this response patches an existing page.
    pub fn is_graft(&self) -> bool {
        self.action.as_deref() == Some(GRAFT_ACTION)
    }

    /// The graft target, if any and non-empty.
    pub fn graft_path(&self) -> Option<&KeyPath> {
        self.path.as_ref().filter(|p| !p.is_empty())
    }

    /// Declared deferments (empty when none).
    pub fn defers(&self) -> &[DeferDescriptor] {
        self.defers.as_deref().unwrap_or(&[])
    }
}

/// The cached state of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    /// Normalized key of this page.
    pub page_key: PageKey,
    /// Page data tree.
    pub data: Value,
    /// Fragments living in this page.
    #[serde(default)]
    pub fragments: FragmentMap,
    /// Deferments declared by the page.
    #[serde(default)]
    pub defers: Vec<DeferDescriptor>,
    /// Asset fingerprints.
    #[serde(default)]
    pub assets: Vec<String>,
    /// CSRF token rendered with the page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
    /// View component that renders this page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_identifier: Option<String>,
    /// Extra response fields.
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

impl PageState {
    /// Build the state for a full page response.
    pub fn from_response(page_key: PageKey, page: PageResponse) -> Self {
        Self {
            page_key,
            data: page.data,
            fragments: page.fragments,
            defers: page.defers.unwrap_or_default(),
            assets: page.assets,
            csrf_token: page.csrf_token,
            component_identifier: page.component_identifier,
            extras: page.extras,
        }
    }

    /// The node at `path` inside this page's data.
    pub fn node(&self, path: &KeyPath) -> Option<&Value> {
        path::read(&self.data, path)
    }

    /// Paths declared for a fragment name.
    pub fn fragment_paths(&self, name: &str) -> &[KeyPath] {
        self.fragments.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Deferments left for the caller.
    pub fn manual_defers(&self) -> impl Iterator<Item = &DeferDescriptor> {
        self.defers.iter().filter(|d| !d.is_auto())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // === PageResponse Tests ===

    #[test]
    fn test_response_deserialize_full_page() {
        let page: PageResponse = serde_json::from_value(json!({
            "data": {"a": 1},
            "csrfToken": "token",
            "assets": ["application-123.js"],
            "componentIdentifier": "products/index",
            "flash": {"notice": "saved"}
        }))
        .unwrap();

        assert!(!page.is_graft());
        assert_eq!(page.data, json!({"a": 1}));
        assert_eq!(page.csrf_token.as_deref(), Some("token"));
        assert_eq!(page.component_identifier.as_deref(), Some("products/index"));
        assert!(page.defers.is_none());
        assert!(page.fragments.is_empty());
        assert_eq!(page.extras.get("flash"), Some(&json!({"notice": "saved"})));
    }

    #[test]
    fn test_response_deserialize_graft() {
        let page: PageResponse = serde_json::from_value(json!({
            "data": {"total": 3},
            "action": "graft",
            "path": "header.cart",
            "fragments": {"cart": ["header.cart"]},
            "defers": [{"url": "/foo?bzq=body", "path": "body", "type": "auto"}]
        }))
        .unwrap();

        assert!(page.is_graft());
        assert_eq!(page.graft_path(), Some(&KeyPath::new("header.cart")));
        assert_eq!(page.fragments["cart"], vec![KeyPath::new("header.cart")]);
        assert!(page.defers()[0].is_auto());
    }

    #[test]
    fn test_response_other_action_is_full_page() {
        let page: PageResponse =
            serde_json::from_value(json!({"data": {}, "action": "replace"})).unwrap();
        assert!(!page.is_graft());
    }

    #[test]
    fn test_defer_type_defaults_to_manual() {
        let defer: DeferDescriptor =
            serde_json::from_value(json!({"url": "/foo?bzq=a", "path": "a"})).unwrap();
        assert_eq!(defer.kind, DeferKind::Manual);
    }

    #[test]
    fn test_graft_path_empty_is_none() {
        let page = PageResponse::graft("", json!({}));
        assert!(page.graft_path().is_none());
    }

    // === PageState Tests ===

    #[test]
    fn test_state_from_response() {
        let page = PageResponse::new(json!({"header": {"cart": {}}}))
            .with_fragment("cart", ["header.cart"])
            .with_defer(DeferDescriptor::manual("/foo?bzq=body", "body"))
            .with_csrf_token("token");
        let state = PageState::from_response(PageKey::new("/foo"), page);

        assert_eq!(state.page_key.as_str(), "/foo");
        assert_eq!(state.fragment_paths("cart"), &[KeyPath::new("header.cart")]);
        assert!(state.fragment_paths("missing").is_empty());
        assert_eq!(state.manual_defers().count(), 1);
        assert_eq!(state.node(&"header.cart".into()), Some(&json!({})));
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let state = PageState::from_response(
            PageKey::new("/foo"),
            PageResponse::new(json!({})).with_component("foo/show"),
        );
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["pageKey"], json!("/foo"));
        assert_eq!(value["componentIdentifier"], json!("foo/show"));
    }
}
