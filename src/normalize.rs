use crate::enums::*;
use crate::types::*;

/// Normalize a definition into its canonical fully-expanded form.
/// All defaults are materialized.
///
/// This is idempotent: `normalize(normalize(def)) == normalize(def)`.
pub fn normalize(mut def: ValidatorDef) -> ValidatorDef {
    n001_options(&mut def);
    n002_rule_defaults(&mut def);
    n003_category_names(&mut def);
    n004_level_contexts(&mut def);
    def
}

// ─── N-001: Engine options ──────────────────────────────────────────────────

fn n001_options(def: &mut ValidatorDef) {
    if def.options.is_none() {
        def.options = Some(EngineOptions::default());
    }
    if def.version.is_none() {
        def.version = Some(1);
    }
}

// ─── N-002: Rule defaults ───────────────────────────────────────────────────

fn n002_rule_defaults(def: &mut ValidatorDef) {
    let default_message = def
        .options
        .as_ref()
        .map(|o| o.default_message.clone())
        .unwrap_or_else(|| EngineOptions::default().default_message);

    for rule in def.rules.iter_mut().flatten() {
        if rule.severity.is_none() {
            rule.severity = Some(Severity::Error);
        }
        if rule.condition_logic.is_none() {
            rule.condition_logic = Some(ConditionLogic::And);
        }
        if rule.ignored.is_none() {
            rule.ignored = Some(false);
        }
        if rule.message.is_none() {
            rule.message = Some(default_message.replace("{rule}", &rule.id));
        }
    }
}

// ─── N-003: Category names ──────────────────────────────────────────────────

fn n003_category_names(def: &mut ValidatorDef) {
    for category in def.categories.iter_mut().flatten() {
        if category.name.is_none() {
            category.name = Some(category.id.clone());
        }
    }
}

// ─── N-004: Level contexts ──────────────────────────────────────────────────

fn n004_level_contexts(def: &mut ValidatorDef) {
    for level in def.levels.iter_mut().flatten() {
        if level.contexts.is_none() {
            level.contexts = Some(Default::default());
        }
    }
}
