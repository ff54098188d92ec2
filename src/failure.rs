use crate::enums::Severity;
use crate::error::EvaluationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The reported outcome of one failed rule evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub rule_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub severity: Severity,
    /// Instance path of the node the rule ran against.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_id: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub info_messages: Vec<String>,
    /// What the rule's logic actually returned. `Some(true)` means the rule
    /// passed its logic but was failed through the side channel; `None`
    /// means it never produced a value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_result: Option<bool>,
    /// Fully-qualified property paths implicated in the failure.
    #[serde(default)]
    pub properties: BTreeSet<String>,
    /// Set when the failure stands for an evaluation error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EvaluationError>,
}

impl RecordFailure {
    /// Whether the failure stands for an evaluation error rather than a
    /// rule verdict.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
