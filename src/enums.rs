//! Closed enumerations used by rule definitions and failures.

use serde::{Deserialize, Serialize};

/// Severity attached to a rule and carried into its failures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    #[default]
    Error,
    Critical,
}

/// How a rule's referenced conditions combine.
///
/// `And` blocks the rule when any referenced condition failed; `Or` blocks it
/// only when every referenced condition failed. Unset defaults to `And`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionLogic {
    #[default]
    And,
    Or,
}
