//! Validator compilation, processor-tree assembly and the validation entry
//! point.

use crate::compiled::{CompiledCondition, CompiledRule};
use crate::context::RunContext;
use crate::error::*;
use crate::expression::ExpressionEngine;
use crate::failure::RecordFailure;
use crate::native::NativeRegistry;
use crate::primitives::{is_ancestor_or_self, path_signature, structural_path};
use crate::processor::{Environment, IteratingProcessor, LevelProcessor, Processor};
use crate::record::RecordNode;
use crate::template::{MessageTemplater, PropertyTemplater};
use crate::types::*;
use crate::verify::verify;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

// ─── Validator ──────────────────────────────────────────────────────────────

/// A compiled validator definition.
///
/// Rules and conditions are owned here and looked up by identifier; no
/// compiled value holds a reference to another.
pub struct Validator {
    id: String,
    version: Option<i64>,
    name: Option<String>,
    options: EngineOptions,
    categories: HashMap<String, CategoryDef>,
    conditions: HashMap<String, Arc<CompiledCondition>>,
    rules: HashMap<String, Arc<CompiledRule>>,
    condition_order: Vec<String>,
    rule_order: Vec<String>,
    contexts: HashMap<String, Map<String, Value>>,
}

impl Validator {
    /// Verifies and compiles a definition.
    ///
    /// Expressions are compiled on a scoped pool of worker threads, each
    /// compiling a disjoint slice of the definition. The first structural
    /// or compile error aborts the load.
    pub fn compile(
        def: &ValidatorDef,
        engine: &dyn ExpressionEngine,
        natives: Option<&NativeRegistry>,
    ) -> Result<Self, ConstructionError> {
        let verified = verify(def);
        if let Some(first) = verified.errors.into_iter().next() {
            return Err(first.into());
        }

        let options = def.options.clone().unwrap_or_default();
        let workers = options.compile_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

        let conditions = compile_parallel(def.conditions(), workers, |c| {
            CompiledCondition::compile(c, engine)
        })?;
        let rules = compile_parallel(def.rules(), workers, |r| {
            let native = natives.and_then(|n| n.resolve(&def.id, &r.id, &path_signature(&r.path)));
            CompiledRule::compile(r, engine, native)
        })?;

        info!(
            validator = %def.id,
            rules = rules.len(),
            conditions = conditions.len(),
            workers,
            "validator compiled"
        );

        Ok(Self {
            id: def.id.clone(),
            version: def.version,
            name: def.name.clone(),
            options,
            categories: def
                .categories()
                .iter()
                .map(|c| (c.id.clone(), c.clone()))
                .collect(),
            condition_order: conditions.iter().map(|c| c.id().to_string()).collect(),
            rule_order: rules.iter().map(|r| r.id().to_string()).collect(),
            conditions: conditions
                .into_iter()
                .map(|c| (c.id().to_string(), Arc::new(c)))
                .collect(),
            rules: rules
                .into_iter()
                .map(|r| (r.id().to_string(), Arc::new(r)))
                .collect(),
            contexts: def
                .levels()
                .iter()
                .map(|l| (l.path.clone(), l.contexts.clone().unwrap_or_default()))
                .collect(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> Option<i64> {
        self.version
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn category(&self, id: &str) -> Option<&CategoryDef> {
        self.categories.get(id)
    }

    pub fn rule(&self, id: &str) -> Option<&Arc<CompiledRule>> {
        self.rules.get(id)
    }

    pub fn condition(&self, id: &str) -> Option<&Arc<CompiledCondition>> {
        self.conditions.get(id)
    }

    /// Rules in definition order.
    pub fn rules(&self) -> impl Iterator<Item = &Arc<CompiledRule>> {
        self.rule_order.iter().filter_map(|id| self.rules.get(id))
    }

    /// Conditions in definition order.
    pub fn conditions(&self) -> impl Iterator<Item = &Arc<CompiledCondition>> {
        self.condition_order
            .iter()
            .filter_map(|id| self.conditions.get(id))
    }

    /// Every structural path with rules, conditions or contexts, plus all
    /// of their prefixes.
    fn level_paths(&self) -> BTreeSet<String> {
        let declared = self
            .rules
            .values()
            .map(|r| r.path())
            .chain(self.conditions.values().map(|c| c.path()))
            .chain(self.contexts.keys().map(String::as_str));

        let mut paths = BTreeSet::new();
        for path in declared {
            let mut prefix = String::new();
            for segment in path.split('.') {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(segment);
                paths.insert(prefix.clone());
            }
        }
        paths
    }
}

fn compile_parallel<T, R, F>(items: &[T], workers: usize, compile: F) -> Result<Vec<R>, ConstructionError>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R, ConstructionError> + Sync,
{
    let workers = workers.clamp(1, items.len().max(1));
    if workers == 1 {
        return items.iter().map(&compile).collect();
    }

    let chunk = items.len().div_ceil(workers);
    let compile = &compile;
    std::thread::scope(|s| {
        let handles: Vec<_> = items
            .chunks(chunk)
            .map(|slice| s.spawn(move || slice.iter().map(compile).collect::<Result<Vec<R>, _>>()))
            .collect();

        let mut compiled = Vec::with_capacity(items.len());
        for handle in handles {
            match handle.join() {
                Ok(result) => compiled.extend(result?),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        Ok(compiled)
    })
}

// ─── ProcessorTree ──────────────────────────────────────────────────────────

/// The processor tree of one validator, shareable across threads.
///
/// Validation only reads the tree. Administrative updates swap whole
/// collections and are serialized among themselves.
pub struct ProcessorTree {
    env: Arc<Environment>,
    version: Option<i64>,
    root: LevelProcessor,
    admin: Mutex<()>,
}

impl ProcessorTree {
    /// Builds the tree of a compiled validator.
    ///
    /// `engine` compiles forced ad-hoc rules and hot-swapped expressions;
    /// it should be the engine the validator was compiled with.
    pub fn build(
        validator: &Validator,
        engine: Arc<dyn ExpressionEngine>,
        templater: Arc<dyn MessageTemplater>,
    ) -> Result<Self, ConstructionError> {
        let paths = validator.level_paths();
        let root_path = paths
            .iter()
            .find(|p| !p.contains('.'))
            .cloned()
            .ok_or_else(|| {
                ConstructionError::new(
                    ConstructionErrorKind::MissingField,
                    format!("validator '{}' declares no rules, conditions or levels", validator.id),
                )
            })?;

        let env = Arc::new(Environment {
            validator_id: validator.id.clone(),
            engine,
            templater,
            options: validator.options.clone(),
        });
        let root = build_level(&root_path, &paths, validator, &env)?;
        info!(validator = %validator.id, levels = paths.len(), root = %root_path, "processor tree built");

        Ok(Self {
            env,
            version: validator.version,
            root,
            admin: Mutex::new(()),
        })
    }

    pub fn validator_id(&self) -> &str {
        &self.env.validator_id
    }

    pub fn version(&self) -> Option<i64> {
        self.version
    }

    pub fn root(&self) -> &LevelProcessor {
        &self.root
    }

    pub fn engine(&self) -> &dyn ExpressionEngine {
        self.env.engine.as_ref()
    }

    /// Finds the level processor for a structural path.
    pub fn level(&self, path: &str) -> Option<&LevelProcessor> {
        self.root.find_level(path)
    }

    fn level_or_err(&self, path: &str) -> Result<&LevelProcessor, ConstructionError> {
        self.level(path).ok_or_else(|| {
            ConstructionError::new(
                ConstructionErrorKind::UnknownLevel,
                format!("no level '{}' in validator '{}'", path, self.env.validator_id),
            )
            .at(path)
        })
    }

    /// Atomically replaces every rule of a level.
    ///
    /// The replacement is refused, leaving the current rules in place, when
    /// any rule of the tree would reference an unknown condition or rule, or
    /// a rule outside its own level and ancestors.
    pub fn replace_rules(
        &self,
        path: &str,
        rules: Vec<Arc<CompiledRule>>,
    ) -> Result<(), ConstructionError> {
        if let Some(misplaced) = rules.iter().find(|r| r.path() != path) {
            return Err(ConstructionError::new(
                ConstructionErrorKind::InvalidPath,
                format!("rule '{}' belongs to '{}', not '{}'", misplaced.id(), misplaced.path(), path),
            ));
        }
        let _admin = self.admin.lock();
        let level = self.level_or_err(path)?;
        self.check_references(path, Some(rules.as_slice()), None)?;
        level.replace_rules(rules);
        debug!(level = path, "rules replaced");
        Ok(())
    }

    /// Atomically replaces every condition of a level.
    ///
    /// Refused when a rule still references a condition the replacement
    /// drops.
    pub fn replace_conditions(
        &self,
        path: &str,
        conditions: Vec<Arc<CompiledCondition>>,
    ) -> Result<(), ConstructionError> {
        if let Some(misplaced) = conditions.iter().find(|c| c.path() != path) {
            return Err(ConstructionError::new(
                ConstructionErrorKind::InvalidPath,
                format!("condition '{}' belongs to '{}', not '{}'", misplaced.id(), misplaced.path(), path),
            ));
        }
        let _admin = self.admin.lock();
        let level = self.level_or_err(path)?;
        self.check_references(path, None, Some(conditions.as_slice()))?;
        level.replace_conditions(conditions);
        debug!(level = path, "conditions replaced");
        Ok(())
    }

    /// Atomically replaces the context values of a level.
    pub fn replace_contexts(
        &self,
        path: &str,
        contexts: Map<String, Value>,
    ) -> Result<(), ConstructionError> {
        let _admin = self.admin.lock();
        self.level_or_err(path)?.replace_contexts(contexts);
        debug!(level = path, "contexts replaced");
        Ok(())
    }

    /// Rebinds one rule to a new expression and installs the level's rule
    /// list with the rebound rule in place.
    pub fn rebind_rule(&self, path: &str, rule_id: &str, source: &str) -> Result<(), ConstructionError> {
        let _admin = self.admin.lock();
        let level = self.level_or_err(path)?;
        let current = level.rules();
        let mut found = false;
        let mut updated = Vec::with_capacity(current.len());
        for rule in current.iter() {
            if rule.id() == rule_id {
                updated.push(Arc::new(rule.rebind(self.engine(), source)?));
                found = true;
            } else {
                updated.push(Arc::clone(rule));
            }
        }
        if !found {
            return Err(ConstructionError::new(
                ConstructionErrorKind::UnknownRule,
                format!("no rule '{}' at level '{}'", rule_id, path),
            ));
        }
        level.replace_rules(updated);
        debug!(level = path, rule = rule_id, "rule rebound");
        Ok(())
    }

    /// Rebinds one condition to a new expression.
    pub fn rebind_condition(
        &self,
        path: &str,
        condition_id: &str,
        source: &str,
    ) -> Result<(), ConstructionError> {
        let _admin = self.admin.lock();
        let level = self.level_or_err(path)?;
        let current = level.conditions();
        let mut found = false;
        let mut updated = Vec::with_capacity(current.len());
        for condition in current.iter() {
            if condition.id() == condition_id {
                updated.push(Arc::new(condition.rebind(self.engine(), source)?));
                found = true;
            } else {
                updated.push(Arc::clone(condition));
            }
        }
        if !found {
            return Err(ConstructionError::new(
                ConstructionErrorKind::UnknownCondition,
                format!("no condition '{}' at level '{}'", condition_id, path),
            ));
        }
        level.replace_conditions(updated);
        debug!(level = path, condition = condition_id, "condition rebound");
        Ok(())
    }
}

// ─── Reference checks ───────────────────────────────────────────────────────

impl ProcessorTree {
    /// Every level of the tree, depth first.
    fn levels(&self) -> Vec<&LevelProcessor> {
        let mut levels = Vec::new();
        collect_levels(&self.root, &mut levels);
        levels
    }

    /// Resolves the condition and dependency references of every rule in
    /// the tree, with `path`'s rules or conditions substituted.
    fn check_references(
        &self,
        path: &str,
        rules: Option<&[Arc<CompiledRule>]>,
        conditions: Option<&[Arc<CompiledCondition>]>,
    ) -> Result<(), ConstructionError> {
        let mut all_rules: Vec<Arc<CompiledRule>> = Vec::new();
        let mut condition_ids: HashSet<String> = HashSet::new();
        for level in self.levels() {
            let own = level.path() == path;
            match rules {
                Some(new) if own => all_rules.extend(new.iter().cloned()),
                _ => all_rules.extend(level.rules().iter().cloned()),
            }
            let level_conditions = match conditions {
                Some(new) if own => new.to_vec(),
                _ => level.conditions().to_vec(),
            };
            for condition in &level_conditions {
                if !condition_ids.insert(condition.id().to_string()) {
                    return Err(ConstructionError::new(
                        ConstructionErrorKind::DuplicateId,
                        format!("condition '{}' is declared more than once", condition.id()),
                    )
                    .at(condition.path()));
                }
            }
        }

        let mut rule_paths: HashMap<&str, &str> = HashMap::new();
        for rule in &all_rules {
            if rule_paths.insert(rule.id(), rule.path()).is_some() {
                return Err(ConstructionError::new(
                    ConstructionErrorKind::DuplicateId,
                    format!("rule '{}' is declared more than once", rule.id()),
                )
                .at(rule.path()));
            }
        }

        for rule in &all_rules {
            if let Some(missing) = rule
                .conditions()
                .iter()
                .find(|c| !condition_ids.contains(c.as_str()))
            {
                return Err(ConstructionError::new(
                    ConstructionErrorKind::UnknownCondition,
                    format!("rule '{}' references unknown condition '{}'", rule.id(), missing),
                )
                .at(format!("rules.{}", rule.id())));
            }
            for dep in rule.dependencies() {
                let reach = match rule_paths.get(dep.as_str()) {
                    None => Some(ConstructionErrorKind::UnknownDependency),
                    Some(_) if dep == rule.id() => Some(ConstructionErrorKind::InvalidDependency),
                    Some(target) if !is_ancestor_or_self(target, rule.path()) => {
                        Some(ConstructionErrorKind::InvalidDependency)
                    }
                    Some(_) => None,
                };
                if let Some(kind) = reach {
                    return Err(ConstructionError::new(
                        kind,
                        format!("rule '{}' cannot depend on '{}'", rule.id(), dep),
                    )
                    .at(format!("rules.{}", rule.id())));
                }
            }
        }
        Ok(())
    }
}

fn collect_levels<'a>(level: &'a LevelProcessor, out: &mut Vec<&'a LevelProcessor>) {
    out.push(level);
    for child in level.children() {
        if let Some(inner) = child.processor().as_level() {
            collect_levels(inner, out);
        }
    }
}

impl fmt::Debug for ProcessorTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorTree")
            .field("env", &self.env)
            .field("version", &self.version)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn build_level(
    path: &str,
    paths: &BTreeSet<String>,
    validator: &Validator,
    env: &Arc<Environment>,
) -> Result<LevelProcessor, ConstructionError> {
    let rules = validator
        .rules()
        .filter(|r| r.path() == path)
        .cloned()
        .collect();
    let conditions = validator
        .conditions()
        .filter(|c| c.path() == path)
        .cloned()
        .collect();
    let contexts = validator.contexts.get(path).cloned().unwrap_or_default();

    let mut level = LevelProcessor::new(path, Arc::clone(env))
        .with_rules(rules)
        .with_conditions(conditions)
        .with_contexts(contexts);

    let prefix = format!("{}.", path);
    for child in paths {
        let Some(name) = child.strip_prefix(&prefix) else {
            continue;
        };
        if name.contains('.') {
            continue;
        }
        let sub = build_level(child, paths, validator, env)?;
        level = level.with_child(IteratingProcessor::new(name, Box::new(sub))?);
    }
    Ok(level)
}

// ─── Entry points ───────────────────────────────────────────────────────────

/// Compiles a definition and builds its processor tree with the default
/// [`PropertyTemplater`].
pub fn build_processor_tree(
    def: &ValidatorDef,
    engine: Arc<dyn ExpressionEngine>,
    natives: Option<&NativeRegistry>,
) -> Result<ProcessorTree, ConstructionError> {
    let validator = Validator::compile(def, engine.as_ref(), natives)?;
    ProcessorTree::build(&validator, engine, Arc::new(PropertyTemplater))
}

/// Validates a record against a processor tree.
///
/// Rule failures, including rules whose evaluation raised, are returned as
/// data. Only a record shape that does not fit the tree (an unexpandable
/// collection, a root at the wrong level) or a condition that cannot be
/// evaluated aborts the call.
pub fn validate(
    root: &mut dyn RecordNode,
    tree: &ProcessorTree,
    ctx: &mut RunContext,
) -> Result<Vec<RecordFailure>, ProcessError> {
    let root_path = structural_path(root.current_path());
    if root_path != tree.root().path() {
        return Err(AccessError {
            path: root.current_path().to_string(),
            collection: tree.root().path().to_string(),
            message: format!(
                "record root '{}' does not match validator root '{}'",
                root_path,
                tree.root().path()
            ),
        }
        .into());
    }

    let failures = tree.root().process(root, ctx)?;
    let stats = ctx.stats();
    debug!(
        validator = tree.validator_id(),
        failures = failures.len(),
        nodes = stats.nodes_visited,
        executed = stats.rules_executed,
        skipped = stats.rules_skipped,
        "validation finished"
    );
    Ok(failures)
}
