//! Expression engine seam, evaluation scope and the default CEL engine.
//!
//! The engine compiles source text once into a [`CompiledUnit`]; the unit is
//! then executed many times against a caller-owned [`Scope`]. Units never hold
//! per-evaluation state themselves, so evaluation state cannot leak between
//! concurrent validations.

use crate::analysis;
use crate::error::*;
use crate::record::ForcedEntity;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

// ─── ExpressionEngine ───────────────────────────────────────────────────────

/// Extension point for expression compilation.
///
/// The crate ships [`CelEngine`] (requires the `cel-eval` feature).
pub trait ExpressionEngine: Send + Sync {
    /// Compiles `source` into an executable unit.
    ///
    /// Compile failures are construction errors: they surface when the
    /// validator is built, never during validation.
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledUnit>, ConstructionError>;
}

/// A compiled expression.
pub trait CompiledUnit: Send + Sync {
    /// Executes the unit against `scope`.
    ///
    /// A unit may write to the scope's side channel. It returns the raw
    /// expression value; interpreting it as a boolean is the caller's job.
    fn run(&self, scope: &mut Scope) -> Result<Value, EvaluationError>;

    /// Whether concurrent `run` calls on the same unit are safe.
    ///
    /// Callers serialize evaluation of non-reentrant units per instance.
    fn is_reentrant(&self) -> bool {
        false
    }
}

// ─── Scope ──────────────────────────────────────────────────────────────────

/// Values a rule's logic can report besides its boolean result.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SideChannel {
    /// Marks the rule failed regardless of the value it returned.
    pub failing: bool,
    /// The unmodified value the rule returned, set after evaluation.
    pub original_result: Option<bool>,
    /// Replaces the rule's default message.
    pub message: Option<String>,
    pub extra_messages: VecDeque<String>,
    pub info_messages: Vec<String>,
    pub forced_entities: Option<Vec<ForcedEntity>>,
    pub forced_properties: Option<BTreeSet<String>>,
    pub ignored_properties: Option<BTreeSet<String>>,
}

/// Named values visible to an expression, plus its side channel.
///
/// One scope belongs to one validation call; it is reused across the rules
/// of a level and reset before each rule.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    vars: Map<String, Value>,
    side: SideChannel,
}

impl Scope {
    pub fn new(vars: Map<String, Value>) -> Self {
        Self {
            vars,
            side: SideChannel::default(),
        }
    }

    pub fn vars(&self) -> &Map<String, Value> {
        &self.vars
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Adds every entry of `values`, overriding existing names.
    pub fn extend(&mut self, values: &Map<String, Value>) {
        for (k, v) in values {
            self.vars.insert(k.clone(), v.clone());
        }
    }

    pub fn side(&self) -> &SideChannel {
        &self.side
    }

    pub fn side_mut(&mut self) -> &mut SideChannel {
        &mut self.side
    }

    /// Clears every side-channel value.
    pub fn reset_side_channel(&mut self) {
        self.side = SideChannel::default();
    }
}

// ─── Side-channel result maps ───────────────────────────────────────────────

/// Interprets a map-shaped expression result as a verdict plus side channel.
///
/// Expression languages without mutable bindings report side effects by
/// returning a map: `valid` holds the boolean verdict and the remaining keys
/// (`failing`, `message`, `extraMessages`, `infoMessages`, `forcedProperties`,
/// `ignoredProperties`, `forcedEntities`) are copied into the scope. Any other
/// value is returned unchanged.
pub fn apply_side_channel(result: Value, scope: &mut Scope) -> Result<Value, EvaluationError> {
    let Value::Object(map) = result else {
        return Ok(result);
    };
    let Some(valid) = map.get(analysis::VALID) else {
        return Ok(Value::Object(map));
    };
    if !valid.is_boolean() {
        return Err(type_error(analysis::VALID, "a boolean", valid));
    }

    let side = scope.side_mut();
    if let Some(v) = map.get(analysis::FAILING) {
        side.failing = v
            .as_bool()
            .ok_or_else(|| type_error(analysis::FAILING, "a boolean", v))?;
    }
    if let Some(v) = map.get(analysis::MESSAGE) {
        match v {
            Value::Null => {}
            Value::String(s) => side.message = Some(s.clone()),
            other => return Err(type_error(analysis::MESSAGE, "a string", other)),
        }
    }
    if let Some(v) = map.get(analysis::EXTRA_MESSAGES) {
        side.extra_messages = string_list(analysis::EXTRA_MESSAGES, v)?.into();
    }
    if let Some(v) = map.get(analysis::INFO_MESSAGES) {
        side.info_messages = string_list(analysis::INFO_MESSAGES, v)?;
    }
    if let Some(v) = map.get(analysis::FORCED_PROPERTIES) {
        side.forced_properties = Some(string_list(analysis::FORCED_PROPERTIES, v)?.into_iter().collect());
    }
    if let Some(v) = map.get(analysis::IGNORED_PROPERTIES) {
        side.ignored_properties = Some(string_list(analysis::IGNORED_PROPERTIES, v)?.into_iter().collect());
    }
    if let Some(v) = map.get(analysis::FORCED_ENTITIES) {
        let entities: Vec<ForcedEntity> = serde_json::from_value(v.clone()).map_err(|e| {
            EvaluationError::new(
                EvaluationErrorKind::TypeError,
                format!("'{}' must be a list of {{path, properties}} maps: {}", analysis::FORCED_ENTITIES, e),
            )
        })?;
        side.forced_entities = Some(entities);
    }

    Ok(valid.clone())
}

fn string_list(key: &str, value: &Value) -> Result<Vec<String>, EvaluationError> {
    match value {
        Value::Null => Ok(vec![]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(type_error(key, "a list of strings", other)),
            })
            .collect(),
        other => Err(type_error(key, "a list of strings", other)),
    }
}

fn type_error(key: &str, expected: &str, got: &Value) -> EvaluationError {
    EvaluationError::new(
        EvaluationErrorKind::TypeError,
        format!(
            "side-channel key '{}' must be {}, got {}",
            key,
            expected,
            serde_json::to_string(got).unwrap_or_default()
        ),
    )
}

/// Interprets an expression value as a boolean verdict.
pub fn expect_bool(value: &Value) -> Result<bool, EvaluationError> {
    value.as_bool().ok_or_else(|| {
        EvaluationError::new(
            EvaluationErrorKind::TypeError,
            format!(
                "expression returned non-boolean result: {}",
                serde_json::to_string(value).unwrap_or_default()
            ),
        )
    })
}

// ─── Default CEL engine (behind `cel-eval` feature) ─────────────────────────

/// Default expression engine backed by the `cel` crate.
///
/// Scope values are bound as top-level CEL variables. A rule may return a
/// map to use the side channel, see [`apply_side_channel`]. Programs are
/// immutable once compiled, so units are reentrant.
#[cfg(feature = "cel-eval")]
#[derive(Clone, Copy, Debug, Default)]
pub struct CelEngine;

#[cfg(feature = "cel-eval")]
impl ExpressionEngine for CelEngine {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledUnit>, ConstructionError> {
        let program = cel::Program::compile(source).map_err(|e| {
            ConstructionError::new(
                ConstructionErrorKind::Compile,
                format!("CEL compile error: {}", e),
            )
        })?;
        Ok(Arc::new(CelUnit { program }))
    }
}

#[cfg(feature = "cel-eval")]
struct CelUnit {
    program: cel::Program,
}

#[cfg(feature = "cel-eval")]
impl CompiledUnit for CelUnit {
    fn run(&self, scope: &mut Scope) -> Result<Value, EvaluationError> {
        let mut cel_ctx = cel::Context::default();
        for (key, value) in scope.vars() {
            cel_ctx.add_variable_from_value(key.as_str(), json_to_cel(value));
        }

        let result = self.program.execute(&cel_ctx).map_err(|e| {
            EvaluationError::new(
                EvaluationErrorKind::Expression,
                format!("CEL execution error: {}", e),
            )
        })?;

        apply_side_channel(cel_to_json(&result), scope)
    }

    fn is_reentrant(&self) -> bool {
        true
    }
}

/// Convert serde_json::Value → cel::Value.
#[cfg(feature = "cel-eval")]
fn json_to_cel(value: &Value) -> cel::Value {
    use std::collections::HashMap;

    match value {
        Value::Null => cel::Value::Null,
        Value::Bool(b) => cel::Value::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                cel::Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                cel::Value::UInt(u)
            } else if let Some(f) = n.as_f64() {
                cel::Value::Float(f)
            } else {
                cel::Value::Null
            }
        }
        Value::String(s) => cel::Value::String(Arc::new(s.clone())),
        Value::Array(arr) => {
            let items: Vec<cel::Value> = arr.iter().map(json_to_cel).collect();
            cel::Value::List(Arc::new(items))
        }
        Value::Object(map) => {
            let entries: HashMap<String, cel::Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_cel(v)))
                .collect();
            entries.into()
        }
    }
}

/// Convert cel::Value → serde_json::Value.
#[cfg(feature = "cel-eval")]
fn cel_to_json(value: &cel::Value) -> Value {
    match value {
        cel::Value::Null => Value::Null,
        cel::Value::Bool(b) => Value::Bool(*b),
        cel::Value::Int(i) => Value::Number((*i).into()),
        cel::Value::UInt(u) => Value::Number((*u).into()),
        cel::Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        cel::Value::String(s) => Value::String(s.to_string()),
        cel::Value::List(l) => Value::Array(l.iter().map(cel_to_json).collect()),
        cel::Value::Map(m) => {
            let mut obj = serde_json::Map::new();
            for (key, val) in m.map.iter() {
                let k = match key {
                    cel::objects::Key::String(s) => s.to_string(),
                    cel::objects::Key::Int(i) => i.to_string(),
                    cel::objects::Key::Uint(u) => u.to_string(),
                    cel::objects::Key::Bool(b) => b.to_string(),
                };
                obj.insert(k, cel_to_json(val));
            }
            Value::Object(obj)
        }
        // Bytes, Duration, Timestamp, Function, Opaque → null
        _ => Value::Null,
    }
}
