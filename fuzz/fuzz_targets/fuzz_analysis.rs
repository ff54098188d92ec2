#![no_main]

use libfuzzer_sys::fuzz_target;
use rulecheck::analysis::analyze;

fuzz_target!(|data: &[u8]| {
    let source = String::from_utf8_lossy(data);
    let analysis = analyze(&source);
    for property in &analysis.properties {
        assert!(!property.is_empty(), "empty property from {:?}", source);
    }
});
