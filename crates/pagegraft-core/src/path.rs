//! Dot-path access into JSON trees.
//!
//! A [`KeyPath`] such as `"header.cart.total"` addresses a node inside a
//! page's `data` tree. Object nodes are addressed by key. Array nodes accept
//! either a numeric index (`"items.0"`) or an `attr=value` selector
//! (`"posts.id=42.title"`) that picks the first element whose `attr` field
//! renders as `value`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A dot-delimited path into a JSON tree. The empty path addresses the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyPath(String);

impl KeyPath {
    /// Create a key path from its dotted form.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The empty path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Get the dotted path string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this path addresses the root.
    pub fn is_empty(&self) -> bool {
        self.segments().next().is_none()
    }

    /// Iterate over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|s| !s.is_empty())
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Drop as many leading segments as `base` has.
    ///
    /// Segments are not compared: a fragment path declared by a graft is
    /// rebased onto the grafted node purely by depth.
    pub fn relative_to(&self, base: &KeyPath) -> KeyPath {
        let rest: Vec<&str> = self.segments().skip(base.depth()).collect();
        KeyPath(rest.join("."))
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for KeyPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for KeyPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Read the node at `path`. Missing intermediate keys yield `None`.
pub fn read<'a>(tree: &'a Value, path: &KeyPath) -> Option<&'a Value> {
    path.segments().try_fold(tree, child)
}

/// Replace the node at `path` with `value`, in place.
///
/// Only the ancestors along `path` are visited; every other subtree is left
/// untouched. Returns `false` without modifying anything when the path is
/// empty, when an intermediate node is missing, or when the final segment
/// does not address an existing array slot. A missing final key on an object
/// parent is inserted.
pub fn write(tree: &mut Value, path: &KeyPath, value: Value) -> bool {
    let segments: Vec<&str> = path.segments().collect();
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };

    let mut node = tree;
    for segment in parents {
        match child_mut(node, segment) {
            Some(next) => node = next,
            None => return false,
        }
    }

    match node {
        Value::Object(map) => {
            map.insert((*last).to_string(), value);
            true
        }
        Value::Array(items) => match array_position(items, last) {
            Some(index) if index < items.len() => {
                items[index] = value;
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// By-value form of [`write`]: returns the tree with `value` placed at `path`.
pub fn written(mut tree: Value, path: &KeyPath, value: Value) -> Value {
    write(&mut tree, path, value);
    tree
}

fn child<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => items.get(array_position(items, segment)?),
        _ => None,
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match node {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => {
            let index = array_position(items, segment)?;
            items.get_mut(index)
        }
        _ => None,
    }
}

fn array_position(items: &[Value], segment: &str) -> Option<usize> {
    if let Ok(index) = segment.parse::<usize>() {
        return Some(index);
    }

    let (attr, wanted) = segment.split_once('=')?;
    items
        .iter()
        .position(|item| item.get(attr).is_some_and(|id| id_matches(id, wanted)))
}

fn id_matches(id: &Value, wanted: &str) -> bool {
    match id {
        Value::String(s) => s == wanted,
        Value::Number(n) => n.to_string() == wanted,
        Value::Bool(b) => b.to_string() == wanted,
        _ => false,
    }
}
