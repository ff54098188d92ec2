use super::common::*;
use rulecheck::compiled::{CompiledCondition, CompiledRule};
use rulecheck::*;
use serde_json::{Map, json};
use std::sync::Arc;

const DEF: &str = r#"
id: orders
levels:
  - path: order
    contexts:
      limit: 10
conditions:
  - id: open
    path: order
    expression: status == "open"
rules:
  - id: R1
    path: order
    expression: amount <= limit
    conditions: [open]
  - id: R2
    path: order.lines
    expression: qty > 0
"#;

fn compile_rule(tree: &ProcessorTree, id: &str, path: &str, expr: &str) -> Arc<CompiledRule> {
    Arc::new(CompiledRule::compile(&RuleDef::new(id, path, expr), tree.engine(), None).unwrap())
}

#[test]
fn replaced_rules_apply_to_later_validations() {
    let tree = tree(DEF);
    let record = json!({"status": "open", "amount": 50, "lines": []});
    assert_eq!(rule_ids(&run(&tree, record.clone())), vec!["R1"]);

    let replacement = vec![
        compile_rule(&tree, "R1b", "order", "amount < 0"),
        compile_rule(&tree, "R1c", "order", "amount > 0"),
    ];
    tree.replace_rules("order", replacement).unwrap();
    assert_eq!(rule_ids(&run(&tree, record)), vec!["R1b"]);
}

#[test]
fn snapshot_taken_before_replacement_is_unchanged() {
    let tree = tree(DEF);
    let before = tree.root().rules();
    tree.replace_rules("order", vec![]).unwrap();
    assert_eq!(before.len(), 1);
    assert!(tree.root().rules().is_empty());
}

#[test]
fn unknown_level_is_a_construction_error() {
    let tree = tree(DEF);
    let err = tree.replace_rules("order.fees", vec![]).unwrap_err();
    assert_eq!(err.kind, ConstructionErrorKind::UnknownLevel);
    let err = tree.replace_contexts("invoice", Map::new()).unwrap_err();
    assert_eq!(err.kind, ConstructionErrorKind::UnknownLevel);
}

#[test]
fn rules_for_another_level_are_rejected() {
    let tree = tree(DEF);
    let misplaced = vec![compile_rule(&tree, "R9", "order.lines", "qty > 1")];
    let err = tree.replace_rules("order", misplaced).unwrap_err();
    assert_eq!(err.kind, ConstructionErrorKind::InvalidPath);
    assert_eq!(tree.root().rules().len(), 1);
}

#[test]
fn replaced_contexts_are_visible_to_expressions() {
    let tree = tree(DEF);
    let record = json!({"status": "open", "amount": 50});
    assert_eq!(run(&tree, record.clone()).len(), 1);

    let mut contexts = Map::new();
    contexts.insert("limit".into(), json!(100));
    tree.replace_contexts("order", contexts).unwrap();
    assert!(run(&tree, record).is_empty());
}

#[test]
fn replaced_conditions_gate_rules() {
    let tree = tree(DEF);
    let record = json!({"status": "closed", "amount": 50});
    assert!(run(&tree, record.clone()).is_empty());

    let def = ConditionDef {
        id: "open".into(),
        path: "order".into(),
        expression: Some("status != \"\"".into()),
        description: None,
    };
    let condition = CompiledCondition::compile(&def, tree.engine()).unwrap();
    tree.replace_conditions("order", vec![Arc::new(condition)]).unwrap();
    assert_eq!(rule_ids(&run(&tree, record)), vec!["R1"]);
}

#[test]
fn rebinding_swaps_one_expression() {
    let tree = tree(DEF);
    tree.rebind_rule("order.lines", "R2", "qty > 5").unwrap();
    let failures = run(&tree, json!({"status": "closed", "lines": [{"qty": 3}]}));
    assert_eq!(rule_ids(&failures), vec!["R2"]);

    tree.rebind_condition("order", "open", "true").unwrap();
    let failures = run(&tree, json!({"status": "closed", "amount": 50, "lines": []}));
    assert_eq!(rule_ids(&failures), vec!["R1"]);
}

#[test]
fn rebinding_to_invalid_expression_keeps_the_old_one() {
    let tree = tree(DEF);
    let err = tree.rebind_rule("order.lines", "R2", "qty >").unwrap_err();
    assert_eq!(err.kind, ConstructionErrorKind::Compile);
    assert_eq!(tree.level("order.lines").unwrap().rules()[0].source(), Some("qty > 0"));

    let err = tree.rebind_rule("order.lines", "R7", "true").unwrap_err();
    assert_eq!(err.kind, ConstructionErrorKind::UnknownRule);
}

#[test]
fn dropping_a_referenced_condition_is_refused() {
    let tree = tree(DEF);
    let record = json!({"status": "closed", "amount": 50});
    assert!(run(&tree, record.clone()).is_empty());

    let err = tree.replace_conditions("order", vec![]).unwrap_err();
    assert_eq!(err.kind, ConstructionErrorKind::UnknownCondition);
    assert_eq!(tree.root().conditions().len(), 1);
    assert!(run(&tree, record).is_empty());
}

#[test]
fn replacement_rules_must_resolve_their_references() {
    let tree = tree(DEF);

    let mut gated = RuleDef::new("R1", "order", "amount > 0");
    gated.conditions = Some(vec!["nope".into()]);
    let rule = CompiledRule::compile(&gated, tree.engine(), None).unwrap();
    let err = tree.replace_rules("order", vec![Arc::new(rule)]).unwrap_err();
    assert_eq!(err.kind, ConstructionErrorKind::UnknownCondition);

    let mut dependent = RuleDef::new("R1", "order", "amount > 0");
    dependent.depends_on = Some(vec!["ghost".into()]);
    let rule = CompiledRule::compile(&dependent, tree.engine(), None).unwrap();
    let err = tree.replace_rules("order", vec![Arc::new(rule)]).unwrap_err();
    assert_eq!(err.kind, ConstructionErrorKind::UnknownDependency);

    let mut downward = RuleDef::new("R1", "order", "amount > 0");
    downward.depends_on = Some(vec!["R2".into()]);
    let rule = CompiledRule::compile(&downward, tree.engine(), None).unwrap();
    let err = tree.replace_rules("order", vec![Arc::new(rule)]).unwrap_err();
    assert_eq!(err.kind, ConstructionErrorKind::InvalidDependency);

    let duplicate = vec![compile_rule(&tree, "R2", "order", "amount > 0")];
    let err = tree.replace_rules("order", duplicate).unwrap_err();
    assert_eq!(err.kind, ConstructionErrorKind::DuplicateId);

    assert_eq!(tree.root().rules()[0].source(), Some("amount <= limit"));
}

#[test]
fn removing_a_rule_that_others_depend_on_is_refused() {
    let tree = tree(
        r#"
id: orders
rules:
  - id: R1
    path: order
    expression: amount > 0
  - id: R2
    path: order.lines
    expression: qty > 0
    depends_on: [R1]
"#,
    );
    let err = tree.replace_rules("order", vec![]).unwrap_err();
    assert_eq!(err.kind, ConstructionErrorKind::UnknownDependency);
    assert_eq!(tree.root().rules().len(), 1);

    let kept = vec![compile_rule(&tree, "R1", "order", "amount > 1")];
    tree.replace_rules("order", kept).unwrap();
}
