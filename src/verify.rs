//! Structural verification of validator definitions.
//!
//! Returns **all** errors and warnings, not just the first. Verification
//! does not modify the definition and does not compile expressions; compile
//! errors surface when the validator is built.

use crate::error::*;
use crate::primitives::{is_ancestor_or_self, is_valid_structural_path};
use crate::types::*;
use std::collections::{HashMap, HashSet};

/// Verify a definition against every structural constraint.
pub fn verify(def: &ValidatorDef) -> VerifyResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    d001_validator_id(def, &mut errors);
    d002_unique_ids(def, &mut errors);
    d003_path_syntax(def, &mut errors);
    d004_single_root(def, &mut errors);
    d005_category_refs(def, &mut errors);
    d006_condition_refs(def, &mut errors);
    d007_dependency_refs(def, &mut errors);
    d008_dependency_reach(def, &mut errors);

    w001_rules_without_expression(def, &mut warnings);
    w002_forward_dependencies(def, &mut warnings);
    w003_unreachable_conditions(def, &mut warnings);

    VerifyResult { errors, warnings }
}

fn error(
    code: &str,
    kind: ConstructionErrorKind,
    path: impl Into<String>,
    message: impl Into<String>,
) -> VerifyError {
    VerifyError {
        code: code.to_string(),
        kind,
        path: path.into(),
        message: message.into(),
    }
}

fn warning(code: &str, path: impl Into<String>, message: impl Into<String>) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Warning,
        code: code.to_string(),
        path: Some(path.into()),
        message: message.into(),
    }
}

fn rule_index(def: &ValidatorDef) -> HashMap<&str, (usize, &RuleDef)> {
    def.rules()
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id.as_str(), (i, r)))
        .collect()
}

// ─── D-001 ──────────────────────────────────────────────────────────────────

fn d001_validator_id(def: &ValidatorDef, errors: &mut Vec<VerifyError>) {
    if def.id.trim().is_empty() {
        errors.push(error(
            "D-001",
            ConstructionErrorKind::MissingField,
            "id",
            "validator id must not be empty",
        ));
    }
}

// ─── D-002 ──────────────────────────────────────────────────────────────────

fn d002_unique_ids(def: &ValidatorDef, errors: &mut Vec<VerifyError>) {
    let mut check = |section: &str, ids: Vec<&str>| {
        let mut seen = HashSet::new();
        for (i, id) in ids.into_iter().enumerate() {
            if id.trim().is_empty() {
                errors.push(error(
                    "D-002",
                    ConstructionErrorKind::MissingField,
                    format!("{}[{}].id", section, i),
                    "id must not be empty",
                ));
            } else if !seen.insert(id) {
                errors.push(error(
                    "D-002",
                    ConstructionErrorKind::DuplicateId,
                    format!("{}[{}].id", section, i),
                    format!("duplicate {} id: {}", section, id),
                ));
            }
        }
    };

    check("rules", def.rules().iter().map(|r| r.id.as_str()).collect());
    check("conditions", def.conditions().iter().map(|c| c.id.as_str()).collect());
    check("categories", def.categories().iter().map(|c| c.id.as_str()).collect());
    check("levels", def.levels().iter().map(|l| l.path.as_str()).collect());
}

// ─── D-003 ──────────────────────────────────────────────────────────────────

fn d003_path_syntax(def: &ValidatorDef, errors: &mut Vec<VerifyError>) {
    for (section, paths) in declared_paths(def) {
        for (i, path) in paths.into_iter().enumerate() {
            if !is_valid_structural_path(path) {
                errors.push(error(
                    "D-003",
                    ConstructionErrorKind::InvalidPath,
                    format!("{}[{}].path", section, i),
                    format!("invalid structural path: '{}'", path),
                ));
            }
        }
    }
}

fn declared_paths(def: &ValidatorDef) -> [(&'static str, Vec<&str>); 3] {
    [
        ("rules", def.rules().iter().map(|r| r.path.as_str()).collect()),
        ("conditions", def.conditions().iter().map(|c| c.path.as_str()).collect()),
        ("levels", def.levels().iter().map(|l| l.path.as_str()).collect()),
    ]
}

// ─── D-004 ──────────────────────────────────────────────────────────────────

fn d004_single_root(def: &ValidatorDef, errors: &mut Vec<VerifyError>) {
    let mut root: Option<&str> = None;
    for (section, paths) in declared_paths(def) {
        for (i, path) in paths.into_iter().enumerate() {
            let head = path.split('.').next().unwrap_or(path);
            match root {
                None => root = Some(head),
                Some(r) if r != head => errors.push(error(
                    "D-004",
                    ConstructionErrorKind::InvalidPath,
                    format!("{}[{}].path", section, i),
                    format!("path '{}' does not start at root level '{}'", path, r),
                )),
                Some(_) => {}
            }
        }
    }
}

// ─── D-005 ──────────────────────────────────────────────────────────────────

fn d005_category_refs(def: &ValidatorDef, errors: &mut Vec<VerifyError>) {
    let categories: HashSet<&str> = def.categories().iter().map(|c| c.id.as_str()).collect();
    for (i, rule) in def.rules().iter().enumerate() {
        if let Some(category) = &rule.category
            && !categories.contains(category.as_str())
        {
            errors.push(error(
                "D-005",
                ConstructionErrorKind::UnknownCategory,
                format!("rules[{}].category", i),
                format!("rule '{}' references unknown category '{}'", rule.id, category),
            ));
        }
    }
}

// ─── D-006 ──────────────────────────────────────────────────────────────────

fn d006_condition_refs(def: &ValidatorDef, errors: &mut Vec<VerifyError>) {
    let conditions: HashSet<&str> = def.conditions().iter().map(|c| c.id.as_str()).collect();
    for (i, rule) in def.rules().iter().enumerate() {
        for (j, cond) in rule.conditions.iter().flatten().enumerate() {
            if !conditions.contains(cond.as_str()) {
                errors.push(error(
                    "D-006",
                    ConstructionErrorKind::UnknownCondition,
                    format!("rules[{}].conditions[{}]", i, j),
                    format!("rule '{}' references unknown condition '{}'", rule.id, cond),
                ));
            }
        }
    }
}

// ─── D-007 ──────────────────────────────────────────────────────────────────

fn d007_dependency_refs(def: &ValidatorDef, errors: &mut Vec<VerifyError>) {
    let rules = rule_index(def);
    for (i, rule) in def.rules().iter().enumerate() {
        for (j, dep) in rule.depends_on.iter().flatten().enumerate() {
            if !rules.contains_key(dep.as_str()) {
                errors.push(error(
                    "D-007",
                    ConstructionErrorKind::UnknownDependency,
                    format!("rules[{}].depends_on[{}]", i, j),
                    format!("rule '{}' depends on unknown rule '{}'", rule.id, dep),
                ));
            }
        }
    }
}

// ─── D-008 ──────────────────────────────────────────────────────────────────

/// A dependency is only observable when the depended-on rule runs at the
/// same node or at an ancestor of it.
fn d008_dependency_reach(def: &ValidatorDef, errors: &mut Vec<VerifyError>) {
    let rules = rule_index(def);
    for (i, rule) in def.rules().iter().enumerate() {
        for (j, dep) in rule.depends_on.iter().flatten().enumerate() {
            let location = format!("rules[{}].depends_on[{}]", i, j);
            if dep == &rule.id {
                errors.push(error(
                    "D-008",
                    ConstructionErrorKind::InvalidDependency,
                    location,
                    format!("rule '{}' depends on itself", rule.id),
                ));
                continue;
            }
            if let Some((_, target)) = rules.get(dep.as_str())
                && !is_ancestor_or_self(&target.path, &rule.path)
            {
                errors.push(error(
                    "D-008",
                    ConstructionErrorKind::InvalidDependency,
                    location,
                    format!(
                        "rule '{}' at '{}' depends on '{}' at '{}', which is neither the same level nor an ancestor",
                        rule.id, rule.path, dep, target.path
                    ),
                ));
            }
        }
    }
}

// ─── W-001 ──────────────────────────────────────────────────────────────────

fn w001_rules_without_expression(def: &ValidatorDef, warnings: &mut Vec<Diagnostic>) {
    for (i, rule) in def.rules().iter().enumerate() {
        if rule.expression.as_deref().is_none_or(|e| e.trim().is_empty()) {
            warnings.push(warning(
                "W-001",
                format!("rules[{}].expression", i),
                format!("rule '{}' has no expression and needs a native implementation", rule.id),
            ));
        }
    }
}

// ─── W-002 ──────────────────────────────────────────────────────────────────

/// Rules at one level run in configured order, so a dependency on a later
/// rule at the same level is never failed yet when the dependent runs.
fn w002_forward_dependencies(def: &ValidatorDef, warnings: &mut Vec<Diagnostic>) {
    let rules = rule_index(def);
    for (i, rule) in def.rules().iter().enumerate() {
        for (j, dep) in rule.depends_on.iter().flatten().enumerate() {
            if let Some((k, target)) = rules.get(dep.as_str())
                && *k > i
                && target.path == rule.path
            {
                warnings.push(warning(
                    "W-002",
                    format!("rules[{}].depends_on[{}]", i, j),
                    format!(
                        "rule '{}' depends on '{}', which runs after it at the same level",
                        rule.id, dep
                    ),
                ));
            }
        }
    }
}

// ─── W-003 ──────────────────────────────────────────────────────────────────

fn w003_unreachable_conditions(def: &ValidatorDef, warnings: &mut Vec<Diagnostic>) {
    let conditions: HashMap<&str, &ConditionDef> =
        def.conditions().iter().map(|c| (c.id.as_str(), c)).collect();
    for (i, rule) in def.rules().iter().enumerate() {
        for (j, cond) in rule.conditions.iter().flatten().enumerate() {
            if let Some(c) = conditions.get(cond.as_str())
                && !is_ancestor_or_self(&c.path, &rule.path)
            {
                warnings.push(warning(
                    "W-003",
                    format!("rules[{}].conditions[{}]", i, j),
                    format!(
                        "condition '{}' at '{}' is never evaluated on the path of rule '{}' at '{}'",
                        cond, c.path, rule.id, rule.path
                    ),
                ));
            }
        }
    }
}
