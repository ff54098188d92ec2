//! The processor tree: one [`LevelProcessor`] per structural level, joined by
//! [`IteratingProcessor`]s that fan out over the record's child collections.
//!
//! A tree is built once and then shared by concurrent validation calls. The
//! rule, condition and context collections of a level sit behind `ArcSwap`
//! so an administrative update replaces a whole collection atomically;
//! readers keep the snapshot they loaded.

use crate::cache::BoundedCache;
use crate::compiled::{CompiledCondition, CompiledRule, RuleExtras};
use crate::context::{ForcedRule, RunContext};
use crate::enums::{ConditionLogic, Severity};
use crate::error::*;
use crate::expression::{ExpressionEngine, Scope};
use crate::failure::RecordFailure;
use crate::primitives::ancestor_paths;
use crate::record::RecordNode;
use crate::template::MessageTemplater;
use crate::types::{EngineOptions, RuleDef};
use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

/// A scheduling node of the processor tree.
pub trait Processor: Send + Sync {
    /// Runs this processor against `node`, returning the failures found at
    /// and below it.
    fn process(
        &self,
        node: &mut dyn RecordNode,
        ctx: &mut RunContext,
    ) -> Result<Vec<RecordFailure>, ProcessError>;

    /// The level processor behind this node, if it is one.
    fn as_level(&self) -> Option<&LevelProcessor> {
        None
    }
}

/// Collaborators shared by every level of one tree.
pub struct Environment {
    pub validator_id: String,
    pub engine: Arc<dyn ExpressionEngine>,
    pub templater: Arc<dyn MessageTemplater>,
    pub options: EngineOptions,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("validator_id", &self.validator_id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ─── IteratingProcessor ─────────────────────────────────────────────────────

/// Re-invokes a wrapped processor once per element of a named collection.
pub struct IteratingProcessor {
    collection: String,
    processor: Box<dyn Processor>,
}

impl IteratingProcessor {
    pub fn new(
        collection: impl Into<String>,
        processor: Box<dyn Processor>,
    ) -> Result<Self, ConstructionError> {
        let collection = collection.into();
        if collection.trim().is_empty() {
            return Err(ConstructionError::new(
                ConstructionErrorKind::MissingField,
                "iterating processor requires a collection name",
            ));
        }
        Ok(Self {
            collection,
            processor,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn processor(&self) -> &dyn Processor {
        self.processor.as_ref()
    }
}

impl Processor for IteratingProcessor {
    fn process(
        &self,
        node: &mut dyn RecordNode,
        ctx: &mut RunContext,
    ) -> Result<Vec<RecordFailure>, ProcessError> {
        let mut failures = Vec::new();
        for mut child in node.expand_collection(&self.collection)? {
            failures.extend(self.processor.process(child.as_mut(), ctx)?);
        }
        Ok(failures)
    }
}

// ─── LevelProcessor ─────────────────────────────────────────────────────────

#[derive(Debug)]
enum SkipReason {
    NotSelected,
    Ignored,
    ConditionsBlocked,
    DependencyFailed(String),
}

/// Evaluates the conditions and rules registered at one structural level,
/// then recurses into the level's child collections.
pub struct LevelProcessor {
    path: String,
    env: Arc<Environment>,
    conditions: ArcSwap<Vec<Arc<CompiledCondition>>>,
    rules: ArcSwap<Vec<Arc<CompiledRule>>>,
    contexts: ArcSwap<Map<String, Value>>,
    children: Vec<IteratingProcessor>,
    forced_cache: BoundedCache<String, Arc<CompiledRule>>,
    /// Bumped on every rule replacement; part of each forced-cache key.
    generation: AtomicU64,
}

impl LevelProcessor {
    pub fn new(path: impl Into<String>, env: Arc<Environment>) -> Self {
        let capacity = env.options.forced_cache_capacity;
        Self {
            path: path.into(),
            env,
            conditions: ArcSwap::from_pointee(Vec::new()),
            rules: ArcSwap::from_pointee(Vec::new()),
            contexts: ArcSwap::from_pointee(Map::new()),
            children: Vec::new(),
            forced_cache: BoundedCache::new(capacity),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_rules(self, rules: Vec<Arc<CompiledRule>>) -> Self {
        self.rules.store(Arc::new(rules));
        self
    }

    pub fn with_conditions(self, conditions: Vec<Arc<CompiledCondition>>) -> Self {
        self.conditions.store(Arc::new(conditions));
        self
    }

    pub fn with_contexts(self, contexts: Map<String, Value>) -> Self {
        self.contexts.store(Arc::new(contexts));
        self
    }

    pub fn with_child(mut self, child: IteratingProcessor) -> Self {
        self.children.push(child);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Snapshot of the current rules, in execution order.
    pub fn rules(&self) -> Arc<Vec<Arc<CompiledRule>>> {
        self.rules.load_full()
    }

    pub fn conditions(&self) -> Arc<Vec<Arc<CompiledCondition>>> {
        self.conditions.load_full()
    }

    pub fn contexts(&self) -> Arc<Map<String, Value>> {
        self.contexts.load_full()
    }

    pub fn children(&self) -> &[IteratingProcessor] {
        &self.children
    }

    pub fn forced_cache(&self) -> &BoundedCache<String, Arc<CompiledRule>> {
        &self.forced_cache
    }

    /// Atomically replaces the rules of this level.
    ///
    /// Starts a new rule generation and clears the forced-rule cache, whose
    /// entries were derived from the previous rules. A forced compile still
    /// running against the old rules inserts under the old generation's key,
    /// which no later lookup uses.
    pub fn replace_rules(&self, rules: Vec<Arc<CompiledRule>>) {
        self.rules.store(Arc::new(rules));
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.forced_cache.clear();
    }

    /// Number of rule replacements applied to this level.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Atomically replaces the conditions of this level.
    pub fn replace_conditions(&self, conditions: Vec<Arc<CompiledCondition>>) {
        self.conditions.store(Arc::new(conditions));
    }

    /// Atomically replaces the context values of this level.
    pub fn replace_contexts(&self, contexts: Map<String, Value>) {
        self.contexts.store(Arc::new(contexts));
    }

    /// Finds the level processor for a structural path in this subtree.
    pub fn find_level(&self, path: &str) -> Option<&LevelProcessor> {
        if self.path == path {
            return Some(self);
        }
        self.children
            .iter()
            .filter_map(|c| c.processor().as_level())
            .find_map(|level| level.find_level(path))
    }

    fn evaluate_conditions(
        &self,
        node: &dyn RecordNode,
        scope: &mut Scope,
        ctx: &mut RunContext,
    ) -> Result<(), ProcessError> {
        let conditions = self.conditions.load();
        for condition in conditions.iter() {
            ctx.stats_mut().conditions_evaluated += 1;
            if !condition.check(node, scope)? {
                debug!(condition = condition.id(), path = node.current_path(), "condition failed");
                ctx.mark_condition_failed(node.current_path(), condition.id());
                ctx.stats_mut().conditions_failed += 1;
            }
        }
        Ok(())
    }

    fn skip_reason(
        &self,
        rule: &CompiledRule,
        ctx: &RunContext,
        ancestors: &[String],
    ) -> Option<SkipReason> {
        if !ctx.is_selected(rule.id()) {
            return Some(SkipReason::NotSelected);
        }
        if rule.is_ignored() {
            return Some(SkipReason::Ignored);
        }
        if conditions_block(rule, ctx, ancestors) {
            return Some(SkipReason::ConditionsBlocked);
        }
        rule.dependencies()
            .iter()
            .find(|dep| ctx.rule_failed_in(ancestors, dep))
            .map(|dep| SkipReason::DependencyFailed(dep.clone()))
    }

    /// Resolves the forced rule for this level: the registered rule, or a
    /// compiled (and cached) rebinding of it to the forced expression.
    fn resolve_forced(&self, forced: &ForcedRule) -> Result<Arc<CompiledRule>, EvaluationError> {
        // read before the rules: a generation seen here never pairs with
        // rules older than it
        let generation = self.generation();
        let registered = self
            .rules
            .load()
            .iter()
            .find(|r| r.id() == forced.rule_id)
            .cloned();

        let Some(source) = &forced.expression else {
            return registered.ok_or_else(|| {
                EvaluationError::new(
                    EvaluationErrorKind::UnknownRule,
                    format!("no rule '{}' is registered at {}", forced.rule_id, self.path),
                )
            });
        };

        let key = forced_cache_key(&forced.rule_id, generation, source);
        if self.forced_cache.contains_key(&key) {
            debug!(rule = %forced.rule_id, "forced rule served from cache");
        }
        self.forced_cache.get_or_try_insert_with(key, || {
            let engine = self.env.engine.as_ref();
            let compiled = match &registered {
                Some(rule) => rule.rebind(engine, source),
                None => CompiledRule::compile(
                    &RuleDef::new(forced.rule_id.clone(), self.path.clone(), source.clone()),
                    engine,
                    None,
                ),
            };
            compiled.map(Arc::new).map_err(|e| {
                EvaluationError::new(
                    EvaluationErrorKind::Expression,
                    format!("cannot compile forced rule: {}", e.message),
                )
            })
        })
    }

    fn default_message(&self, rule: &CompiledRule) -> String {
        match rule.message() {
            Some(message) => message.to_string(),
            None => self.env.options.default_message.replace("{rule}", rule.id()),
        }
    }

    /// Builds the failure for a rule whose verdict was `false`.
    fn rule_failure(
        &self,
        rule: &CompiledRule,
        node: &mut dyn RecordNode,
        scope: &mut Scope,
        extra: &RuleExtras,
        contexts: &Map<String, Value>,
    ) -> RecordFailure {
        let effective: BTreeSet<String> = rule
            .raw_properties()
            .iter()
            .filter(|p| !extra.ignored_properties.contains(p.as_str()))
            .filter(|p| !contexts.contains_key(p.split('.').next().unwrap_or(p.as_str())))
            .cloned()
            .collect();
        for property in &effective {
            node.report_failure(property);
        }
        for property in &extra.forced_properties {
            node.report_failure(property);
        }
        if !extra.forced_entities.is_empty() {
            node.force_failure(&extra.forced_entities, &effective);
        }

        let side = scope.side_mut();
        let original_result = side.original_result;
        let template = if original_result == Some(true) {
            side.extra_messages
                .pop_front()
                .or_else(|| side.message.clone())
        } else {
            side.message.clone()
        }
        .unwrap_or_else(|| self.default_message(rule));

        let templater = self.env.templater.as_ref();
        let remaining: Vec<String> = side.extra_messages.iter().cloned().collect();

        RecordFailure {
            rule_id: rule.id().to_string(),
            category: rule.category().map(str::to_string),
            severity: rule.severity(),
            path: node.current_path().to_string(),
            display_id: node.display_id(),
            message: templater.fill_template(&template, &*node),
            extra_messages: templater.fill_templates(&remaining, &*node),
            info_messages: templater.fill_templates(&side.info_messages, &*node),
            original_result,
            properties: node.reported_failures(),
            error: None,
        }
    }

    /// Builds the failure standing for an evaluation error.
    fn error_failure(
        &self,
        rule_id: &str,
        category: Option<&str>,
        severity: Severity,
        node: &dyn RecordNode,
        error: EvaluationError,
    ) -> RecordFailure {
        let message = self
            .env
            .options
            .generic_error_message
            .replace("{rule}", rule_id)
            .replace("{error}", &error.message);
        RecordFailure {
            rule_id: rule_id.to_string(),
            category: category.map(str::to_string),
            severity,
            path: node.current_path().to_string(),
            display_id: node.display_id(),
            message,
            extra_messages: vec![],
            info_messages: vec![],
            original_result: None,
            properties: BTreeSet::new(),
            error: Some(error),
        }
    }
}

impl Processor for LevelProcessor {
    fn process(
        &self,
        node: &mut dyn RecordNode,
        ctx: &mut RunContext,
    ) -> Result<Vec<RecordFailure>, ProcessError> {
        ctx.stats_mut().nodes_visited += 1;
        let node_path = node.current_path().to_string();
        let mut failures = Vec::new();

        let contexts = self.contexts.load_full();
        let mut scope = Scope::new(node.scope());
        scope.extend(&contexts);

        let forced = ctx.forced().cloned();
        let mut candidates: Vec<Arc<CompiledRule>> = Vec::new();
        match &forced {
            Some(f) if f.path == self.path => match self.resolve_forced(f) {
                Ok(rule) => candidates.push(rule),
                Err(e) => {
                    warn!(rule = %f.rule_id, path = %node_path, error = %e, "forced rule unavailable");
                    ctx.mark_rule_failed(&node_path, &f.rule_id);
                    ctx.stats_mut().rules_errored += 1;
                    failures.push(self.error_failure(&f.rule_id, None, Severity::default(), &*node, e));
                }
            },
            Some(_) => {}
            None => {
                self.evaluate_conditions(&*node, &mut scope, ctx)?;
                candidates.extend(self.rules.load().iter().cloned());
            }
        }

        if !candidates.is_empty() {
            let ancestors = ancestor_paths(&node_path);
            let mut extra = RuleExtras::default();

            for rule in &candidates {
                if forced.is_none()
                    && let Some(reason) = self.skip_reason(rule, ctx, &ancestors)
                {
                    debug!(rule = rule.id(), path = %node_path, ?reason, "rule skipped");
                    ctx.mark_rule_failed(&node_path, rule.id());
                    ctx.stats_mut().rules_skipped += 1;
                    continue;
                }

                ctx.stats_mut().rules_executed += 1;
                match rule.validate(&*node, &mut scope, &mut extra) {
                    Ok(true) => trace!(rule = rule.id(), path = %node_path, "rule passed"),
                    Ok(false) => {
                        trace!(rule = rule.id(), path = %node_path, "rule failed");
                        failures.push(self.rule_failure(rule, node, &mut scope, &extra, &contexts));
                        ctx.mark_rule_failed(&node_path, rule.id());
                        ctx.stats_mut().rules_failed += 1;
                    }
                    Err(e) => {
                        warn!(rule = rule.id(), path = %node_path, error = %e, "rule evaluation error");
                        failures.push(self.error_failure(
                            rule.id(),
                            rule.category(),
                            rule.severity(),
                            &*node,
                            e,
                        ));
                        ctx.mark_rule_failed(&node_path, rule.id());
                        ctx.stats_mut().rules_errored += 1;
                    }
                }
                node.clear_reported_failures();
            }
        }

        for child in &self.children {
            failures.extend(child.process(node, ctx)?);
        }

        Ok(failures)
    }

    fn as_level(&self) -> Option<&LevelProcessor> {
        Some(self)
    }
}

impl fmt::Debug for LevelProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelProcessor")
            .field("path", &self.path)
            .field("rules", &self.rules.load().len())
            .field("conditions", &self.conditions.load().len())
            .field(
                "children",
                &self.children.iter().map(|c| c.collection()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// AND: blocked when any referenced condition failed along the chain.
/// OR: blocked only when every referenced condition failed along it.
fn conditions_block(rule: &CompiledRule, ctx: &RunContext, ancestors: &[String]) -> bool {
    let conditions = rule.conditions();
    if conditions.is_empty() {
        return false;
    }
    match rule.logic() {
        ConditionLogic::And => conditions
            .iter()
            .any(|c| ctx.condition_failed_in(ancestors, c)),
        ConditionLogic::Or => conditions
            .iter()
            .all(|c| ctx.condition_failed_in(ancestors, c)),
    }
}

fn forced_cache_key(rule_id: &str, generation: u64, source: &str) -> String {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    format!("{}#{}#{:016x}", rule_id, generation, hasher.finish())
}
