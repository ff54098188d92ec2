use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Diagnostic severity level for definition verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// A structured, non-fatal diagnostic produced while verifying a definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

/// Error kind for parse failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    Syntax,
    TypeMismatch,
    UnknownField,
}

/// Produced by `parse` when a definition document cannot be deserialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Produced by `verify` when a definition breaks a structural constraint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code} at {path}: {message}")]
pub struct VerifyError {
    pub code: String,
    pub kind: ConstructionErrorKind,
    pub path: String,
    pub message: String,
}

impl From<VerifyError> for ConstructionError {
    fn from(e: VerifyError) -> Self {
        ConstructionError {
            kind: e.kind,
            message: format!("{}: {}", e.code, e.message),
            path: Some(e.path),
        }
    }
}

/// Result of definition verification: errors and warnings.
#[derive(Clone, Debug, Default)]
pub struct VerifyResult {
    pub errors: Vec<VerifyError>,
    pub warnings: Vec<Diagnostic>,
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Error kind for construction failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructionErrorKind {
    Compile,
    UnknownCondition,
    UnknownDependency,
    UnknownCategory,
    UnknownLevel,
    UnknownRule,
    MissingField,
    InvalidPath,
    DuplicateId,
    InvalidDependency,
}

/// Fatal error raised while compiling expressions or assembling a processor tree.
///
/// Aborts the whole validator load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ConstructionError {
    pub kind: ConstructionErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ConstructionError {
    pub fn new(kind: ConstructionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
        }
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Error kind for evaluation failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationErrorKind {
    Expression,
    TypeError,
    Unavailable,
    UnknownRule,
    /// Raised by a native rule implementation.
    Native,
}

/// Produced when a rule or condition expression cannot be evaluated.
///
/// Recoverable for rules (the processor turns it into a record failure),
/// fatal for conditions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct EvaluationError {
    pub kind: EvaluationErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_id: Option<String>,
}

impl EvaluationError {
    pub fn new(kind: EvaluationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            rule_id: None,
            display_id: None,
        }
    }

    /// Attaches rule identity and the record's display identifier, prefixing
    /// them to the message so the error stays readable once flattened.
    pub(crate) fn attribute(mut self, rule_id: &str, display_id: Option<String>) -> Self {
        self.message = match &display_id {
            Some(display) => format!("{} [{}]: {}", rule_id, display, self.message),
            None => format!("{}: {}", rule_id, self.message),
        };
        self.rule_id = Some(rule_id.to_string());
        self.display_id = display_id;
        self
    }
}

/// A named child collection did not resolve to a collection on the record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("cannot expand '{collection}' at {path}: {message}")]
pub struct AccessError {
    pub path: String,
    pub collection: String,
    pub message: String,
}

/// Errors that abort a validation call.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("record access error: {0}")]
    Access(#[from] AccessError),
    #[error("condition evaluation error: {0}")]
    Condition(#[from] EvaluationError),
}

/// Serialization error.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SerializeError {
    pub message: String,
}

/// Combined error type for the `load` entry point.
#[derive(Clone, Debug, Error)]
pub enum LoadError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Verification failed with {} error(s)", .0.len())]
    Verify(Vec<VerifyError>),
    #[error("Construction error: {0}")]
    Construction(#[from] ConstructionError),
}
