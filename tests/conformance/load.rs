use super::common::*;
use rulecheck::*;
use serde_json::{Value, json};

#[test]
fn end_to_end_root_failure_skips_child_rule() {
    let loaded = rulecheck::load(
        r#"
id: orders
version: 3
rules:
  - id: R1
    path: order
    expression: amount > 0
  - id: R2
    path: order.lines
    expression: qty > 0
    depends_on: [R1]
"#,
        engine(),
    )
    .unwrap();
    assert_eq!(loaded.tree.validator_id(), "orders");
    assert_eq!(loaded.tree.version(), Some(3));
    assert!(loaded.warnings.is_empty());

    let failures = run(
        &loaded.tree,
        json!({"amount": 0, "lines": [{"qty": 0}, {"qty": 0}, {"qty": 0}]}),
    );
    assert_eq!(outcomes(&failures), vec![("R1".to_string(), "order".to_string())]);
}

#[test]
fn parse_errors_surface_as_load_errors() {
    let err = rulecheck::load("", engine()).err().unwrap();
    assert!(matches!(err, LoadError::Parse(_)));
}

#[test]
fn every_verification_error_is_reported() {
    let err = rulecheck::load(
        r#"
id: orders
rules:
  - id: R1
    path: order
    expression: amount > 0
    conditions: [ghost]
    category: nowhere
  - id: R1
    path: order
    expression: amount > 1
    depends_on: [phantom]
"#,
        engine(),
    )
    .err()
    .unwrap();
    let LoadError::Verify(errors) = err else {
        panic!("expected verification errors, got {}", err);
    };
    let mut codes: Vec<_> = errors.iter().map(|e| e.code.as_str()).collect();
    codes.sort();
    assert_eq!(codes, vec!["D-002", "D-005", "D-006", "D-007"]);
}

#[test]
fn compile_errors_abort_the_load() {
    let err = rulecheck::load(
        r#"
id: orders
rules:
  - id: R1
    path: order
    expression: "amount >"
"#,
        engine(),
    )
    .err()
    .unwrap();
    match err {
        LoadError::Construction(e) => {
            assert_eq!(e.kind, ConstructionErrorKind::Compile);
            assert_eq!(e.path.as_deref(), Some("rules.R1"));
        }
        other => panic!("expected construction error, got {}", other),
    }
}

#[test]
fn warnings_are_returned_with_the_tree() {
    let loaded = rulecheck::load(
        r#"
id: orders
rules:
  - id: R1
    path: order
    expression: amount > 0
    depends_on: [R2]
  - id: R2
    path: order
    expression: amount > 1
"#,
        engine(),
    )
    .unwrap();
    assert_eq!(loaded.warnings.len(), 1);
    assert_eq!(loaded.warnings[0].code, "W-002");
}

#[test]
fn native_rule_replaces_missing_expression() {
    let mut def = ValidatorDef::new("orders");
    let mut rule = RuleDef::new("line-total", "order.lines", "");
    rule.expression = None;
    def.rules = Some(vec![rule]);

    let err = build_processor_tree(&def, engine(), None).unwrap_err();
    assert_eq!(err.kind, ConstructionErrorKind::MissingField);

    let mut natives = NativeRegistry::new();
    natives.register(
        "orders",
        "line-total",
        "order.lines",
        |_: &mut Scope, bindings: &[Value]| {
            let [order, line] = bindings else {
                return Err(EvaluationError::new(EvaluationErrorKind::Native, "expected two bindings"));
            };
            Ok(line["total"].as_i64() <= order["limit"].as_i64())
        },
    );
    let tree = build_processor_tree(&def, engine(), Some(&natives)).unwrap();
    let failures = run(&tree, json!({"limit": 10, "lines": [{"total": 4}, {"total": 40}]}));
    assert_eq!(outcomes(&failures), vec![("line-total".to_string(), "order.lines[1]".to_string())]);
}

#[test]
fn compilation_is_parallel_and_order_preserving() {
    let mut def = ValidatorDef::new("bulk");
    def.options = Some(EngineOptions {
        compile_workers: Some(4),
        ..EngineOptions::default()
    });
    def.rules = Some(
        (0..40)
            .map(|i| RuleDef::new(format!("R{:02}", i), "order", format!("amount > {}", i)))
            .collect(),
    );
    let validator = Validator::compile(&def, engine().as_ref(), None).unwrap();
    let ids: Vec<_> = validator.rules().map(|r| r.id().to_string()).collect();
    let expected: Vec<_> = (0..40).map(|i| format!("R{:02}", i)).collect();
    assert_eq!(ids, expected);

    let tree = build_processor_tree(&def, engine(), None).unwrap();
    assert_eq!(run(&tree, json!({"amount": 38})).len(), 2);
}
