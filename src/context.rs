//! Per-validation-call state.

use std::collections::{HashMap, HashSet};

/// A single rule executed unconditionally at its structural path.
///
/// With `expression` unset the registered rule runs as is; with it set the
/// expression is compiled (and cached) in place of the registered one, or
/// as an ad-hoc rule when no rule with that identifier exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForcedRule {
    pub rule_id: String,
    /// Structural path the rule runs at.
    pub path: String,
    pub expression: Option<String>,
}

impl ForcedRule {
    pub fn new(rule_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            path: path.into(),
            expression: None,
        }
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }
}

/// Counters accumulated over one validation call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub nodes_visited: usize,
    pub rules_executed: usize,
    pub rules_skipped: usize,
    pub rules_failed: usize,
    pub rules_errored: usize,
    pub conditions_evaluated: usize,
    pub conditions_failed: usize,
}

/// Mutable state of one validation call.
///
/// Holds the explicit rule selection and the failed rule and condition
/// identifiers recorded so far, keyed by instance path. Failure sets only
/// grow during a call. Never share one context between calls.
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    execute: Option<HashSet<String>>,
    ignore: Option<HashSet<String>>,
    forced: Option<ForcedRule>,
    failed_rules: HashMap<String, HashSet<String>>,
    failed_conditions: HashMap<String, HashSet<String>>,
    stats: RunStats,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs only the listed rules. Takes precedence over [`Self::ignoring`].
    pub fn executing<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.execute = Some(rules.into_iter().map(Into::into).collect());
        self
    }

    /// Skips the listed rules.
    pub fn ignoring<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore = Some(rules.into_iter().map(Into::into).collect());
        self
    }

    /// Runs `rule` alone, bypassing selection, ignore flags, conditions and
    /// dependencies.
    pub fn forcing(mut self, rule: ForcedRule) -> Self {
        self.forced = Some(rule);
        self
    }

    pub fn forced(&self) -> Option<&ForcedRule> {
        self.forced.as_ref()
    }

    /// Whether the explicit selection lets `rule_id` run.
    pub fn is_selected(&self, rule_id: &str) -> bool {
        if let Some(execute) = &self.execute {
            return execute.contains(rule_id);
        }
        match &self.ignore {
            Some(ignore) => !ignore.contains(rule_id),
            None => true,
        }
    }

    pub fn mark_rule_failed(&mut self, path: &str, rule_id: &str) {
        self.failed_rules
            .entry(path.to_string())
            .or_default()
            .insert(rule_id.to_string());
    }

    pub fn mark_condition_failed(&mut self, path: &str, condition_id: &str) {
        self.failed_conditions
            .entry(path.to_string())
            .or_default()
            .insert(condition_id.to_string());
    }

    pub fn is_rule_failed(&self, path: &str, rule_id: &str) -> bool {
        self.failed_rules
            .get(path)
            .is_some_and(|ids| ids.contains(rule_id))
    }

    pub fn is_condition_failed(&self, path: &str, condition_id: &str) -> bool {
        self.failed_conditions
            .get(path)
            .is_some_and(|ids| ids.contains(condition_id))
    }

    /// Whether `rule_id` failed at any of `paths`.
    pub fn rule_failed_in(&self, paths: &[String], rule_id: &str) -> bool {
        paths.iter().any(|p| self.is_rule_failed(p, rule_id))
    }

    /// Whether `condition_id` failed at any of `paths`.
    pub fn condition_failed_in(&self, paths: &[String], condition_id: &str) -> bool {
        paths.iter().any(|p| self.is_condition_failed(p, condition_id))
    }

    pub fn failed_rules(&self) -> &HashMap<String, HashSet<String>> {
        &self.failed_rules
    }

    pub fn failed_conditions(&self) -> &HashMap<String, HashSet<String>> {
        &self.failed_conditions
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut RunStats {
        &mut self.stats
    }
}
