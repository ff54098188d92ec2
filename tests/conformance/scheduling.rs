use super::common::*;
use rulecheck::*;
use serde_json::json;

const GATED: &str = r#"
id: customs
conditions:
  - id: is-export
    path: order
    expression: country != "DE"
  - id: is-large
    path: order
    expression: amount > 1000
rules:
  - id: customs-and
    path: order
    expression: customs_id != ""
    conditions: [is-export, is-large]
  - id: customs-or
    path: order
    expression: customs_id != ""
    conditions: [is-export, is-large]
    condition_logic: or
"#;

#[test]
fn and_blocks_when_any_condition_fails() {
    let tree = tree(GATED);
    let failures = run(&tree, json!({"country": "FR", "amount": 10, "customs_id": ""}));
    assert_eq!(rule_ids(&failures), vec!["customs-or"]);
}

#[test]
fn or_blocks_only_when_every_condition_fails() {
    let tree = tree(GATED);
    let failures = run(&tree, json!({"country": "DE", "amount": 10, "customs_id": ""}));
    assert!(failures.is_empty(), "{:?}", failures);

    let failures = run(&tree, json!({"country": "FR", "amount": 5000, "customs_id": ""}));
    assert_eq!(rule_ids(&failures), vec!["customs-and", "customs-or"]);
}

#[test]
fn blocked_rules_are_recorded_as_failed() {
    let tree = tree(GATED);
    let mut ctx = RunContext::new();
    run_with(&tree, json!({"country": "DE", "amount": 10, "customs_id": ""}), &mut ctx);
    assert!(ctx.is_condition_failed("order", "is-export"));
    assert!(ctx.is_condition_failed("order", "is-large"));
    assert!(ctx.is_rule_failed("order", "customs-and"));
    assert!(ctx.is_rule_failed("order", "customs-or"));
    assert_eq!(ctx.stats().rules_skipped, 2);
    assert_eq!(ctx.stats().rules_executed, 0);
}

const CHAIN: &str = r#"
id: orders
rules:
  - id: R1
    path: order
    expression: amount > 0
  - id: R2
    path: order.lines
    expression: qty > 0
    depends_on: [R1]
  - id: R3
    path: order.lines.items
    expression: size(sku) > 0
    depends_on: [R2]
"#;

fn chain_record(amount: i64, qty: i64) -> serde_json::Value {
    json!({
        "amount": amount,
        "lines": [
            {"qty": qty, "items": [{"sku": ""}]},
            {"qty": qty, "items": [{"sku": ""}, {"sku": "x"}]}
        ]
    })
}

#[test]
fn failed_root_rule_skips_dependents_at_every_child() {
    let tree = tree(CHAIN);
    let mut ctx = RunContext::new();
    let failures = run_with(&tree, chain_record(0, 1), &mut ctx);
    assert_eq!(outcomes(&failures), vec![("R1".to_string(), "order".to_string())]);
    assert_eq!(ctx.stats().rules_executed, 1);
    assert!(ctx.is_rule_failed("order.lines[0]", "R2"));
    assert!(ctx.is_rule_failed("order.lines[1]", "R2"));
}

#[test]
fn skips_cascade_transitively() {
    let tree = tree(CHAIN);
    let mut ctx = RunContext::new();
    let failures = run_with(&tree, chain_record(5, 0), &mut ctx);
    assert_eq!(
        outcomes(&failures),
        vec![
            ("R2".to_string(), "order.lines[0]".to_string()),
            ("R2".to_string(), "order.lines[1]".to_string()),
        ]
    );
    assert!(ctx.is_rule_failed("order.lines[1].items[1]", "R3"));
}

#[test]
fn dependency_failure_is_scoped_to_the_failing_branch() {
    let tree = tree(CHAIN);
    let record = json!({
        "amount": 5,
        "lines": [
            {"qty": 0, "items": [{"sku": ""}]},
            {"qty": 2, "items": [{"sku": ""}]}
        ]
    });
    let failures = run(&tree, record);
    assert_eq!(
        outcomes(&failures),
        vec![
            ("R2".to_string(), "order.lines[0]".to_string()),
            ("R3".to_string(), "order.lines[1].items[0]".to_string()),
        ]
    );
}

#[test]
fn execute_list_wins_over_ignore_list() {
    let tree = tree(CHAIN);
    let mut ctx = RunContext::new().executing(["R1"]).ignoring(["R1"]);
    let failures = run_with(&tree, chain_record(0, 0), &mut ctx);
    assert_eq!(rule_ids(&failures), vec!["R1"]);
}

#[test]
fn unselected_rules_cascade_like_failures() {
    let tree = tree(CHAIN);
    let mut ctx = RunContext::new().ignoring(["R1"]);
    let failures = run_with(&tree, chain_record(0, 0), &mut ctx);
    assert!(failures.is_empty(), "{:?}", failures);
    assert!(ctx.is_rule_failed("order.lines[0]", "R2"));
}

#[test]
fn ignored_flag_skips_rule() {
    let tree = tree(
        r#"
id: orders
rules:
  - id: R1
    path: order
    expression: amount > 0
    ignored: true
  - id: R2
    path: order
    expression: amount > 10
"#,
    );
    assert_eq!(rule_ids(&run(&tree, json!({"amount": 0}))), vec!["R2"]);
}

#[test]
fn rules_run_in_declaration_order() {
    let tree = tree(
        r#"
id: orders
rules:
  - id: zeta
    path: order
    expression: "false"
  - id: alpha
    path: order
    expression: "false"
  - id: mid
    path: order
    expression: "false"
"#,
    );
    assert_eq!(rule_ids(&run(&tree, json!({}))), vec!["zeta", "alpha", "mid"]);
}

#[test]
fn erroring_rule_becomes_failure_and_siblings_continue() {
    let tree = tree(
        r#"
id: orders
rules:
  - id: broken
    path: order
    expression: amount + "x"
  - id: R2
    path: order
    expression: amount > 10
  - id: R3
    path: order
    expression: amount > 0
    depends_on: [broken]
"#,
    );
    let mut ctx = RunContext::new();
    let failures = run_with(&tree, json!({"id": "A-7", "amount": 1}), &mut ctx);
    assert_eq!(rule_ids(&failures), vec!["broken", "R2"]);
    let error = failures[0].error.as_ref().expect("evaluation error attached");
    assert_eq!(error.rule_id.as_deref(), Some("broken"));
    assert_eq!(error.display_id.as_deref(), Some("A-7"));
    assert!(failures[0].message.starts_with("Rule broken could not be evaluated"));
    assert_eq!(ctx.stats().rules_errored, 1);
}

#[test]
fn broken_condition_aborts_the_call() {
    let tree = tree(
        r#"
id: orders
conditions:
  - id: C1
    path: order
    expression: amount
rules:
  - id: R1
    path: order
    expression: amount > 0
    conditions: [C1]
"#,
    );
    let mut root = JsonRecord::new("order", json!({"amount": 3}));
    let err = rulecheck::validate(&mut root, &tree, &mut RunContext::new()).unwrap_err();
    match err {
        ProcessError::Condition(e) => assert_eq!(e.kind, EvaluationErrorKind::TypeError),
        other => panic!("expected condition error, got {:?}", other),
    }
}

#[test]
fn ancestor_condition_gates_child_rules() {
    let tree = tree(
        r#"
id: orders
conditions:
  - id: is-open
    path: order
    expression: status == "open"
rules:
  - id: line-qty
    path: order.lines
    expression: qty > 0
    conditions: [is-open]
"#,
    );
    let record = |status: &str| json!({"status": status, "lines": [{"qty": 0}]});
    assert!(run(&tree, record("closed")).is_empty());
    assert_eq!(rule_ids(&run(&tree, record("open"))), vec!["line-qty"]);
}
