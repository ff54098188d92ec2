use super::common::*;
use rulecheck::*;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};

fn props(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn referenced_properties_are_qualified_against_the_node() {
    let tree = tree(
        r#"
id: orders
rules:
  - id: line-qty
    path: order.lines
    expression: qty > 0 && qty <= order.max_qty
"#,
    );
    let failures = run(&tree, json!({"max_qty": 3, "lines": [{"qty": 1}, {"qty": 9}]}));
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].path, "order.lines[1]");
    assert_eq!(failures[0].properties, props(&["order.lines[1].qty", "order.max_qty"]));
}

#[test]
fn context_values_are_not_attributed() {
    let tree = tree(
        r#"
id: orders
levels:
  - path: order
    contexts:
      limits:
        max: 5
rules:
  - id: R1
    path: order
    expression: amount <= limits.max
"#,
    );
    let failures = run(&tree, json!({"amount": 8}));
    assert_eq!(failures[0].properties, props(&["order.amount"]));
}

#[test]
fn ignored_and_forced_properties_adjust_attribution() {
    let tree = tree(
        r#"
id: orders
rules:
  - id: R1
    path: order
    expression: '{"valid": net == gross, "ignoredProperties": ["gross"], "forcedProperties": ["tax"]}'
"#,
    );
    let failures = run(&tree, json!({"net": 1, "gross": 2, "tax": 0}));
    assert_eq!(failures[0].properties, props(&["order.net", "order.tax"]));
}

#[test]
fn forced_entities_are_tagged_on_other_elements() {
    let tree = tree(
        r#"
id: orders
rules:
  - id: unique-sku
    path: order
    expression: >-
      {"valid": size(lines) < 2,
       "ignoredProperties": ["lines"],
       "forcedEntities": [{"path": "order.lines[0]", "properties": ["sku"]}, {"path": "order.lines[1]"}]}
"#,
    );
    let failures = run(&tree, json!({"lines": [{"sku": "A"}, {"sku": "A"}]}));
    assert_eq!(failures[0].properties, props(&["order.lines[0].sku", "order.lines[1]"]));
}

#[test]
fn reported_properties_do_not_leak_between_rules() {
    let tree = tree(
        r#"
id: orders
rules:
  - id: R1
    path: order
    expression: amount > 0
  - id: R2
    path: order
    expression: size(currency) == 3
"#,
    );
    let failures = run(&tree, json!({"amount": 0, "currency": "EURO"}));
    assert_eq!(failures[0].properties, props(&["order.amount"]));
    assert_eq!(failures[1].properties, props(&["order.currency"]));
}

#[test]
fn attribution_filters_with_the_contexts_the_rule_ran_with() {
    let def = parse(
        r#"
id: orders
levels:
  - path: order
    contexts:
      limit: 10
rules:
  - id: R1
    path: order
    expression: amount < limit
"#,
    )
    .unwrap();
    let gate = Arc::new(Barrier::new(2));
    let held = Arc::clone(&gate);
    let mut natives = NativeRegistry::new();
    natives.register("orders", "R1", "order", move |_: &mut Scope, _: &[Value]| {
        held.wait();
        held.wait();
        Ok(false)
    });
    let tree = build_processor_tree(&def, engine(), Some(&natives)).unwrap();

    let failures = std::thread::scope(|s| {
        let handle = s.spawn(|| run(&tree, json!({"amount": 50})));
        gate.wait();
        tree.replace_contexts("order", Map::new()).unwrap();
        gate.wait();
        handle.join().unwrap()
    });
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].properties, props(&["order.amount"]));
}
