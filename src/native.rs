//! Pre-built native rule implementations.
//!
//! A native rule is selected in preference to the rule's expression when one
//! is registered for the validator, the rule identifier and the parameter
//! signature of the rule's structural path. An unregistered rule simply
//! runs its expression.

use crate::error::EvaluationError;
use crate::expression::Scope;
use crate::primitives::path_signature;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A directly callable rule implementation.
///
/// Receives the scope first, then the value bound at each level of the
/// path, root to leaf. May write to the scope's side channel.
pub trait NativeRule: Send + Sync {
    fn call(&self, scope: &mut Scope, bindings: &[Value]) -> Result<bool, EvaluationError>;
}

impl<F> NativeRule for F
where
    F: Fn(&mut Scope, &[Value]) -> Result<bool, EvaluationError> + Send + Sync,
{
    fn call(&self, scope: &mut Scope, bindings: &[Value]) -> Result<bool, EvaluationError> {
        self(scope, bindings)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct NativeKey {
    validator: String,
    rule: String,
    signature: Vec<String>,
}

/// Lookup table of native rules.
#[derive(Default, Clone)]
pub struct NativeRegistry {
    rules: HashMap<NativeKey, Arc<dyn NativeRule>>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a closure for a rule at structural path `path`.
    pub fn register<F>(
        &mut self,
        validator: impl Into<String>,
        rule: impl Into<String>,
        path: &str,
        native: F,
    ) -> &mut Self
    where
        F: Fn(&mut Scope, &[Value]) -> Result<bool, EvaluationError> + Send + Sync + 'static,
    {
        self.register_rule(validator, rule, path, Arc::new(native))
    }

    /// Registers a [`NativeRule`] implementation for a rule at structural
    /// path `path`.
    pub fn register_rule(
        &mut self,
        validator: impl Into<String>,
        rule: impl Into<String>,
        path: &str,
        native: Arc<dyn NativeRule>,
    ) -> &mut Self {
        self.rules.insert(
            NativeKey {
                validator: validator.into(),
                rule: rule.into(),
                signature: path_signature(path),
            },
            native,
        );
        self
    }

    /// Resolves a native rule; `None` disables the fast path.
    pub fn resolve(
        &self,
        validator: &str,
        rule: &str,
        signature: &[String],
    ) -> Option<Arc<dyn NativeRule>> {
        self.rules
            .get(&NativeKey {
                validator: validator.to_string(),
                rule: rule.to_string(),
                signature: signature.to_vec(),
            })
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
