#![no_main]

use libfuzzer_sys::fuzz_target;
use rulecheck::{CelEngine, JsonRecord, ProcessorTree, RunContext};
use std::sync::{Arc, LazyLock};

static TREE: LazyLock<ProcessorTree> = LazyLock::new(|| {
    let yaml = r#"
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
    expression: qty > 0 && qty <= order.max_qty
    depends_on: [R1]
    conditions: [has-lines]
  - id: R3
    path: order.lines.items
    expression: '{"valid": price >= 0, "ignoredProperties": ["price"], "forcedProperties": ["sku"]}'
"#;
    rulecheck::load(yaml, Arc::new(CelEngine))
        .expect("fuzz definition loads")
        .tree
});

// Arbitrary records may make validation fail, never panic.
fuzz_target!(|data: &[u8]| {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let mut root = JsonRecord::new("order", value);
        let _ = rulecheck::validate(&mut root, &TREE, &mut RunContext::new());
    }
});
