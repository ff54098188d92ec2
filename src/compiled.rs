//! Compiled conditions and rules.
//!
//! Both wrap a [`CompiledUnit`] produced once at construction. Evaluation
//! takes an instance-scoped lock only when the unit reports itself as not
//! reentrant, so distinct rules never block each other.

use crate::analysis::{self, ExpressionAnalysis};
use crate::enums::{ConditionLogic, Severity};
use crate::error::*;
use crate::expression::{CompiledUnit, ExpressionEngine, Scope, expect_bool};
use crate::native::NativeRule;
use crate::record::{ForcedEntity, RecordNode};
use crate::types::{ConditionDef, RuleDef};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

fn compile_source(
    source: Option<&str>,
    engine: &dyn ExpressionEngine,
    path: &str,
) -> Result<(Option<String>, Option<Arc<dyn CompiledUnit>>), ConstructionError> {
    match source.map(str::trim) {
        None | Some("") => Ok((None, None)),
        Some(src) => {
            let unit = engine.compile(src).map_err(|e| e.at(path.to_string()))?;
            Ok((Some(src.to_string()), Some(unit)))
        }
    }
}

fn guard_for(unit: Option<&Arc<dyn CompiledUnit>>) -> Option<Mutex<()>> {
    match unit {
        Some(u) if !u.is_reentrant() => Some(Mutex::new(())),
        _ => None,
    }
}

// ─── CompiledCondition ──────────────────────────────────────────────────────

/// A condition with its expression compiled.
pub struct CompiledCondition {
    id: String,
    path: String,
    source: Option<String>,
    unit: Option<Arc<dyn CompiledUnit>>,
    guard: Option<Mutex<()>>,
}

impl CompiledCondition {
    pub fn compile(
        def: &ConditionDef,
        engine: &dyn ExpressionEngine,
    ) -> Result<Self, ConstructionError> {
        let (source, unit) = compile_source(
            def.expression.as_deref(),
            engine,
            &format!("conditions.{}", def.id),
        )?;
        Ok(Self {
            guard: guard_for(unit.as_ref()),
            id: def.id.clone(),
            path: def.path.clone(),
            source,
            unit,
        })
    }

    /// Returns a copy bound to a new expression. `self` is left untouched;
    /// install the copy with a bulk replacement.
    pub fn rebind(
        &self,
        engine: &dyn ExpressionEngine,
        source: &str,
    ) -> Result<Self, ConstructionError> {
        let (source, unit) = compile_source(Some(source), engine, &format!("conditions.{}", self.id))?;
        Ok(Self {
            guard: guard_for(unit.as_ref()),
            id: self.id.clone(),
            path: self.path.clone(),
            source,
            unit,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Evaluates the condition. A condition without an expression passes.
    pub fn check(&self, node: &dyn RecordNode, scope: &mut Scope) -> Result<bool, EvaluationError> {
        let Some(unit) = &self.unit else {
            return Ok(true);
        };
        scope.reset_side_channel();
        let _guard = self.guard.as_ref().map(|m| m.lock());
        unit.run(scope)
            .and_then(|v| expect_bool(&v))
            .map_err(|e| e.attribute(&self.id, node.display_id()))
    }
}

impl fmt::Debug for CompiledCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledCondition")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

// ─── CompiledRule ───────────────────────────────────────────────────────────

/// Attribution data read back from the side channel after a failure.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleExtras {
    pub forced_entities: Vec<ForcedEntity>,
    pub forced_properties: BTreeSet<String>,
    pub ignored_properties: BTreeSet<String>,
}

/// A rule with its expression compiled, or its native implementation
/// resolved.
pub struct CompiledRule {
    id: String,
    path: String,
    message: Option<String>,
    severity: Severity,
    category: Option<String>,
    conditions: Vec<String>,
    logic: ConditionLogic,
    dependencies: Vec<String>,
    ignored: bool,
    source: Option<String>,
    unit: Option<Arc<dyn CompiledUnit>>,
    native: Option<Arc<dyn NativeRule>>,
    analysis: ExpressionAnalysis,
    guard: Option<Mutex<()>>,
}

impl CompiledRule {
    /// Compiles a rule definition.
    ///
    /// A rule needs an expression unless `native` is given; the expression
    /// is still compiled and analyzed when both are present.
    pub fn compile(
        def: &RuleDef,
        engine: &dyn ExpressionEngine,
        native: Option<Arc<dyn NativeRule>>,
    ) -> Result<Self, ConstructionError> {
        let location = format!("rules.{}", def.id);
        let (source, unit) = compile_source(def.expression.as_deref(), engine, &location)?;
        if unit.is_none() && native.is_none() {
            return Err(ConstructionError::new(
                ConstructionErrorKind::MissingField,
                format!("rule '{}' has no expression and no native implementation", def.id),
            )
            .at(location));
        }

        Ok(Self {
            id: def.id.clone(),
            path: def.path.clone(),
            message: def.message.clone(),
            severity: def.severity.unwrap_or_default(),
            category: def.category.clone(),
            conditions: def.conditions.clone().unwrap_or_default(),
            logic: def.condition_logic.unwrap_or_default(),
            dependencies: def.depends_on.clone().unwrap_or_default(),
            ignored: def.ignored.unwrap_or(false),
            analysis: analysis::analyze(source.as_deref().unwrap_or_default()),
            guard: guard_for(unit.as_ref()),
            source,
            unit,
            native,
        })
    }

    /// Returns a copy bound to a new expression, with properties and side
    /// channel use re-analyzed. The copy never uses a native implementation.
    pub fn rebind(
        &self,
        engine: &dyn ExpressionEngine,
        source: &str,
    ) -> Result<Self, ConstructionError> {
        let (source, unit) = compile_source(Some(source), engine, &format!("rules.{}", self.id))?;
        if unit.is_none() {
            return Err(ConstructionError::new(
                ConstructionErrorKind::MissingField,
                format!("rule '{}' cannot be bound to an empty expression", self.id),
            ));
        }
        Ok(Self {
            id: self.id.clone(),
            path: self.path.clone(),
            message: self.message.clone(),
            severity: self.severity,
            category: self.category.clone(),
            conditions: self.conditions.clone(),
            logic: self.logic,
            dependencies: self.dependencies.clone(),
            ignored: self.ignored,
            analysis: analysis::analyze(source.as_deref().unwrap_or_default()),
            guard: guard_for(unit.as_ref()),
            source,
            unit,
            native: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    pub fn logic(&self) -> ConditionLogic {
        self.logic
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Properties the expression references, computed when it was bound.
    pub fn raw_properties(&self) -> &BTreeSet<String> {
        &self.analysis.properties
    }

    pub fn uses_side_channel(&self) -> bool {
        self.analysis.uses_side_channel
    }

    pub fn has_native(&self) -> bool {
        self.native.is_some()
    }

    /// Evaluates the rule against `node`.
    ///
    /// Returns the final verdict: the value the logic returned, forced to
    /// `false` when the side channel's failing flag was raised. The returned
    /// value itself is kept in the scope as the original result. On failure
    /// the forcing and ignoring side-channel sets are copied into `extra`.
    pub fn validate(
        &self,
        node: &dyn RecordNode,
        scope: &mut Scope,
        extra: &mut RuleExtras,
    ) -> Result<bool, EvaluationError> {
        scope.reset_side_channel();
        *extra = RuleExtras::default();

        let returned = {
            let _guard = self.guard.as_ref().map(|m| m.lock());
            if let Some(native) = &self.native {
                native.call(scope, &node.bindings()).map_err(|mut e| {
                    e.kind = EvaluationErrorKind::Native;
                    e
                })
            } else if let Some(unit) = &self.unit {
                unit.run(scope).and_then(|v| expect_bool(&v))
            } else {
                Err(EvaluationError::new(
                    EvaluationErrorKind::Unavailable,
                    "no evaluator is bound to this rule",
                ))
            }
        }
        .map_err(|e| e.attribute(&self.id, node.display_id()))?;

        let side = scope.side_mut();
        let success = returned && !side.failing;
        side.original_result = Some(returned);

        if !success && (self.analysis.uses_side_channel || self.native.is_some()) {
            extra.forced_entities = side.forced_entities.take().unwrap_or_default();
            extra.forced_properties = side.forced_properties.take().unwrap_or_default();
            extra.ignored_properties = side.ignored_properties.take().unwrap_or_default();
        }

        Ok(success)
    }
}

impl fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRule")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("source", &self.source)
            .field("native", &self.native.is_some())
            .finish_non_exhaustive()
    }
}
