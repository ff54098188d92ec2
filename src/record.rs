//! The record-node capability set consumed by the processors, and
//! [`JsonRecord`], its implementation over `serde_json` values.

use crate::error::AccessError;
use crate::primitives::{join_path, structural_path, value_to_string};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// An entity other than the current node that a rule flags as failing,
/// together with the properties to flag on it.
///
/// Used by cross-element rules, e.g. duplicate detection marking several
/// sibling elements at once. An empty property set falls back to the
/// rule's own properties.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedEntity {
    /// Instance path of the entity, e.g. `order.lines[2]`.
    pub path: String,
    #[serde(default)]
    pub properties: BTreeSet<String>,
}

/// One addressable node of the record being validated.
///
/// The engine never constructs nodes itself; it receives the root from the
/// caller and obtains children through [`RecordNode::expand_collection`].
pub trait RecordNode {
    /// Instance path of this node, e.g. `order.lines[3].items[0]`.
    fn current_path(&self) -> &str;

    /// Structural path of this node, e.g. `order.lines.items`.
    fn structural_path(&self) -> String {
        structural_path(self.current_path())
    }

    /// Named values visible to expressions evaluated at this node.
    fn scope(&self) -> Map<String, Value>;

    /// The value bound at each level of this node's path, root first.
    fn bindings(&self) -> Vec<Value>;

    /// Expands a named child collection into one node per element.
    ///
    /// An absent or null collection yields no nodes. A property that is not
    /// a collection is an [`AccessError`].
    fn expand_collection(&self, name: &str) -> Result<Vec<Box<dyn RecordNode>>, AccessError>;

    /// Flags a property (relative to this node) as failing.
    fn report_failure(&mut self, property: &str);

    /// Flags properties on other entities. `fallback` is used for entities
    /// that name no properties.
    fn force_failure(&mut self, entities: &[ForcedEntity], fallback: &BTreeSet<String>);

    /// Forgets every failure flagged since the last clear.
    fn clear_reported_failures(&mut self);

    /// Fully-qualified property paths flagged since the last clear.
    fn reported_failures(&self) -> BTreeSet<String>;

    /// Human-readable identifier of this node, if any.
    fn display_id(&self) -> Option<String>;
}

// ─── JsonRecord ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
struct Level {
    name: String,
    path: String,
    pointer: String,
}

/// A [`RecordNode`] over a shared `serde_json::Value` tree.
///
/// Scope: the fields of the current object, plus every level of the path
/// bound by name to its object (`order` → the root object at `order.lines[0]`).
/// Fields win over level names on collision.
///
/// The display identifier is the current object's `id` field.
#[derive(Clone, Debug)]
pub struct JsonRecord {
    root: Arc<Value>,
    levels: Vec<Level>,
    reported: BTreeSet<String>,
}

impl JsonRecord {
    /// Creates the root node of a record named `name`.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        Self {
            root: Arc::new(value),
            levels: vec![Level {
                path: name.clone(),
                name,
                pointer: String::new(),
            }],
            reported: BTreeSet::new(),
        }
    }

    /// The value at this node.
    pub fn value(&self) -> &Value {
        self.root.pointer(&self.leaf().pointer).unwrap_or(&Value::Null)
    }

    fn leaf(&self) -> &Level {
        // Always holds at least the root level.
        &self.levels[self.levels.len() - 1]
    }

    /// Qualifies a property reference against the node's path.
    ///
    /// A dotted reference whose head names an ancestor level is qualified
    /// against that level, so `order.currency` read at `order.lines[1]`
    /// reports `order.currency`.
    fn qualify(&self, property: &str) -> String {
        let head = property.split('.').next().unwrap_or(property);
        let is_field = self
            .value()
            .as_object()
            .is_some_and(|obj| obj.contains_key(head));
        if !is_field
            && let Some(level) = self.levels.iter().rev().find(|l| l.name == head)
        {
            return match property.strip_prefix(head) {
                Some(rest) if !rest.is_empty() => format!("{}{}", level.path, rest),
                _ => level.path.clone(),
            };
        }
        join_path(&self.leaf().path, property)
    }
}

impl RecordNode for JsonRecord {
    fn current_path(&self) -> &str {
        &self.leaf().path
    }

    fn scope(&self) -> Map<String, Value> {
        let mut scope = Map::new();
        for level in &self.levels {
            let bound = self.root.pointer(&level.pointer).cloned().unwrap_or(Value::Null);
            scope.insert(level.name.clone(), bound);
        }
        if let Some(obj) = self.value().as_object() {
            for (k, v) in obj {
                scope.insert(k.clone(), v.clone());
            }
        }
        scope
    }

    fn bindings(&self) -> Vec<Value> {
        self.levels
            .iter()
            .map(|l| self.root.pointer(&l.pointer).cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn expand_collection(&self, name: &str) -> Result<Vec<Box<dyn RecordNode>>, AccessError> {
        let items = match self.value().as_object().and_then(|obj| obj.get(name)) {
            None | Some(Value::Null) => return Ok(vec![]),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(AccessError {
                    path: self.current_path().to_string(),
                    collection: name.to_string(),
                    message: format!("expected an array, found {}", type_name(other)),
                });
            }
        };

        let parent = self.leaf();
        let escaped = name.replace('~', "~0").replace('/', "~1");
        Ok((0..items.len())
            .map(|i| {
                let mut levels = self.levels.clone();
                levels.push(Level {
                    name: name.to_string(),
                    path: format!("{}.{}[{}]", parent.path, name, i),
                    pointer: format!("{}/{}/{}", parent.pointer, escaped, i),
                });
                Box::new(JsonRecord {
                    root: Arc::clone(&self.root),
                    levels,
                    reported: BTreeSet::new(),
                }) as Box<dyn RecordNode>
            })
            .collect())
    }

    fn report_failure(&mut self, property: &str) {
        let qualified = self.qualify(property);
        self.reported.insert(qualified);
    }

    fn force_failure(&mut self, entities: &[ForcedEntity], fallback: &BTreeSet<String>) {
        for entity in entities {
            let properties = if entity.properties.is_empty() {
                fallback
            } else {
                &entity.properties
            };
            if properties.is_empty() {
                self.reported.insert(entity.path.clone());
            }
            for property in properties {
                self.reported.insert(join_path(&entity.path, property));
            }
        }
    }

    fn clear_reported_failures(&mut self) {
        self.reported.clear();
    }

    fn reported_failures(&self) -> BTreeSet<String> {
        self.reported.clone()
    }

    fn display_id(&self) -> Option<String> {
        match self.value().get("id")? {
            Value::Null => None,
            v => Some(value_to_string(v)),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
