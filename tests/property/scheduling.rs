use proptest::prelude::*;
use rulecheck::*;
use serde_json::json;
use std::sync::{Arc, LazyLock};

static TREE: LazyLock<ProcessorTree> = LazyLock::new(|| {
    let yaml = r#"
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
    path: order.lines
    expression: qty < 10
"#;
    rulecheck::load(yaml, Arc::new(CelEngine)).unwrap().tree
});

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    // A dependent never reports a failure while its dependency failed, and
    // independent rules are unaffected.
    #[test]
    fn dependents_are_skipped_after_failure(
        amount in -5i64..5,
        quantities in prop::collection::vec(-3i64..15, 0..6),
    ) {
        let lines: Vec<_> = quantities.iter().map(|q| json!({"qty": q})).collect();
        let mut root = JsonRecord::new("order", json!({"amount": amount, "lines": lines}));
        let mut ctx = RunContext::new();
        let failures = rulecheck::validate(&mut root, &TREE, &mut ctx).unwrap();

        let count = |id: &str| failures.iter().filter(|f| f.rule_id == id).count();
        prop_assert_eq!(count("R1"), usize::from(amount <= 0));
        if amount <= 0 {
            prop_assert_eq!(count("R2"), 0);
        } else {
            prop_assert_eq!(count("R2"), quantities.iter().filter(|q| **q <= 0).count());
        }
        prop_assert_eq!(count("R3"), quantities.iter().filter(|q| **q >= 10).count());
        prop_assert_eq!(ctx.stats().nodes_visited, 1 + quantities.len());
    }
}
