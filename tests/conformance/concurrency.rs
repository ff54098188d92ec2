use super::common::*;
use rulecheck::compiled::CompiledRule;
use rulecheck::*;
use serde_json::json;
use std::sync::Arc;

const DEF: &str = r#"
id: orders
conditions:
  - id: has-lines
    path: order
    expression: size(lines) > 0
rules:
  - id: R1
    path: order
    expression: amount > 0
  - id: R2
    path: order.lines
    expression: qty > 0
    depends_on: [R1]
    conditions: [has-lines]
  - id: R3
    path: order.lines.items
    expression: price < order.cap
"#;

fn record(seed: i64) -> serde_json::Value {
    json!({
        "amount": seed % 3,
        "cap": 10,
        "lines": (0..4).map(|i| json!({
            "qty": (seed + i) % 2,
            "items": [{"price": seed + i}, {"price": 5}]
        })).collect::<Vec<_>>()
    })
}

#[test]
fn concurrent_validations_match_sequential_results() {
    let tree = tree(DEF);
    let expected: Vec<_> = (0..16).map(|seed| run(&tree, record(seed))).collect();

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..5 {
                    for (seed, want) in expected.iter().enumerate() {
                        let got = run(&tree, record(seed as i64));
                        assert_eq!(&got, want);
                    }
                }
            });
        }
    });
}

#[test]
fn readers_observe_whole_rule_sets_during_replacement() {
    let tree = tree(DEF);
    let r1 = Arc::new(CompiledRule::compile(&RuleDef::new("R1", "order", "amount > 0"), tree.engine(), None).unwrap());
    let set_a = vec![
        Arc::clone(&r1),
        Arc::new(CompiledRule::compile(&RuleDef::new("A1", "order", "false"), tree.engine(), None).unwrap()),
        Arc::new(CompiledRule::compile(&RuleDef::new("A2", "order", "false"), tree.engine(), None).unwrap()),
    ];
    let set_b = vec![
        Arc::clone(&r1),
        Arc::new(CompiledRule::compile(&RuleDef::new("B1", "order", "false"), tree.engine(), None).unwrap()),
        Arc::new(CompiledRule::compile(&RuleDef::new("B2", "order", "false"), tree.engine(), None).unwrap()),
    ];

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..200 {
                let set = if i % 2 == 0 { &set_a } else { &set_b };
                tree.replace_rules("order", set.clone()).unwrap();
            }
        });
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..200 {
                    let failures = run(&tree, json!({"amount": 1, "lines": []}));
                    let ids = rule_ids(&failures);
                    assert!(
                        ids.is_empty() || ids == ["A1", "A2"] || ids == ["B1", "B2"],
                        "mixed rule sets observed: {:?}",
                        ids
                    );
                }
            });
        }
    });
}
