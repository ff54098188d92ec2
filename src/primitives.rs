//! Path primitives shared by the processors, the record implementation and
//! definition verification.
//!
//! Two kinds of paths appear throughout the crate:
//!
//! - **structural paths** address a level of the record schema: `order.lines.items`
//! - **instance paths** address one concrete node: `order.lines[3].items[0]`

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static STRUCTURAL_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").unwrap()
});

static INDEX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[0-9]+\]").unwrap());

// ─── resolve_simple_path ────────────────────────────────────────────────────

/// Resolves a simple dot-path against a value tree.
///
/// Returns the single value at the path, or `None` if any segment fails to
/// resolve. Empty path returns the root value.
pub fn resolve_simple_path<'a>(path: &str, value: &'a Value) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }

    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

// ─── structural paths ───────────────────────────────────────────────────────

/// Returns `true` if `path` is a well-formed structural path.
pub fn is_valid_structural_path(path: &str) -> bool {
    STRUCTURAL_PATH_RE.is_match(path)
}

/// Strips element indices from an instance path.
///
/// `order.lines[3].items[0]` → `order.lines.items`
pub fn structural_path(instance_path: &str) -> String {
    INDEX_RE.replace_all(instance_path, "").into_owned()
}

/// Returns the level names of a structural path, root first.
///
/// Used as the parameter signature of native rules bound to that path.
pub fn path_signature(path: &str) -> Vec<String> {
    if path.is_empty() {
        return vec![];
    }
    path.split('.').map(str::to_string).collect()
}

/// Returns `true` if `ancestor` equals `path` or is a proper prefix of it on
/// a segment boundary. Both are structural paths.
pub fn is_ancestor_or_self(ancestor: &str, path: &str) -> bool {
    match path.strip_prefix(ancestor) {
        Some("") => true,
        Some(rest) => rest.starts_with('.'),
        None => false,
    }
}

// ─── instance paths ─────────────────────────────────────────────────────────

/// Builds the ancestor-or-self list of an instance path, root first.
///
/// `order.lines[3].items[0]` →
/// `["order", "order.lines[3]", "order.lines[3].items[0]"]`
pub fn ancestor_paths(instance_path: &str) -> Vec<String> {
    if instance_path.is_empty() {
        return vec![];
    }
    let mut paths = Vec::new();
    let mut current = String::with_capacity(instance_path.len());
    for segment in instance_path.split('.') {
        if !current.is_empty() {
            current.push('.');
        }
        current.push_str(segment);
        paths.push(current.clone());
    }
    paths
}

/// Appends a child segment to a path.
pub fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}.{}", parent, child)
    }
}

/// Renders a scalar value for display inside messages.
pub fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Objects and arrays serialize to compact JSON
        _ => serde_json::to_string(v).unwrap_or_default(),
    }
}
