#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let s = String::from_utf8_lossy(data);
    if let Ok(def) = rulecheck::parse(&s) {
        let once = rulecheck::normalize(def);
        let twice = rulecheck::normalize(once.clone());
        assert_eq!(once, twice, "normalize is not idempotent");
    }
});
