use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::enums::*;

// ─── Validator definition ───────────────────────────────────────────────────

/// The top-level container for a parsed validator definition.
///
/// Rules and conditions reference each other only by identifier; the
/// references are resolved when the definition is compiled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatorDef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<EngineOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<CategoryDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<LevelDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<ConditionDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RuleDef>>,
}

impl ValidatorDef {
    /// Creates an empty definition with only an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: None,
            name: None,
            description: None,
            options: None,
            categories: None,
            levels: None,
            conditions: None,
            rules: None,
        }
    }

    pub fn rules(&self) -> &[RuleDef] {
        self.rules.as_deref().unwrap_or_default()
    }

    pub fn conditions(&self) -> &[ConditionDef] {
        self.conditions.as_deref().unwrap_or_default()
    }

    pub fn categories(&self) -> &[CategoryDef] {
        self.categories.as_deref().unwrap_or_default()
    }

    pub fn levels(&self) -> &[LevelDef] {
        self.levels.as_deref().unwrap_or_default()
    }
}

// ─── Category ───────────────────────────────────────────────────────────────

/// A grouping label for rules. Carried into failures for reporting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryDef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ─── Level ──────────────────────────────────────────────────────────────────

/// Declares a structural level explicitly and binds named context values
/// visible to every expression evaluated at that level.
///
/// Levels referenced by rules or conditions exist implicitly; declaring one
/// is only needed to attach contexts or to create an otherwise empty level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelDef {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Map<String, Value>>,
}

// ─── Condition ──────────────────────────────────────────────────────────────

/// A named boolean expression gating the rules that reference it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionDef {
    pub id: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ─── Rule ───────────────────────────────────────────────────────────────────

/// A named boolean check bound to a structural path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleDef {
    pub id: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_logic: Option<ConditionLogic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RuleDef {
    /// Creates a rule with an expression and every optional field unset.
    pub fn new(
        id: impl Into<String>,
        path: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            expression: Some(expression.into()),
            message: None,
            severity: None,
            category: None,
            conditions: None,
            condition_logic: None,
            depends_on: None,
            ignored: None,
            description: None,
        }
    }
}

// ─── Engine options ─────────────────────────────────────────────────────────

/// Tunables for compilation and execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Capacity of each level's forced-rule compilation cache.
    pub forced_cache_capacity: usize,
    /// Worker threads used to compile expressions; `None` uses the available
    /// parallelism of the host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_workers: Option<usize>,
    /// Message for failures produced by evaluation errors. `{rule}` and
    /// `{error}` are substituted.
    pub generic_error_message: String,
    /// Message used when a rule declares none. `{rule}` is substituted.
    pub default_message: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            forced_cache_capacity: 10,
            compile_workers: None,
            generic_error_message: "Rule {rule} could not be evaluated: {error}".to_string(),
            default_message: "Rule {rule} failed".to_string(),
        }
    }
}
