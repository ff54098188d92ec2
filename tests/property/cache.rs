use proptest::prelude::*;
use rulecheck::cache::BoundedCache;
use std::collections::VecDeque;

#[derive(Clone, Debug)]
enum Op {
    Get(u8),
    Put(u8, u32),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..12).prop_map(Op::Get),
        (0u8..12, any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
    ]
}

/// Reference model: most recently used key at the back.
#[derive(Default)]
struct Model {
    order: VecDeque<(u8, u32)>,
}

impl Model {
    fn touch(&mut self, key: u8) -> Option<u32> {
        let pos = self.order.iter().position(|(k, _)| *k == key)?;
        let entry = self.order.remove(pos)?;
        self.order.push_back(entry);
        Some(entry.1)
    }

    fn put(&mut self, key: u8, value: u32, capacity: usize) {
        if capacity == 0 {
            return;
        }
        if self.touch(key).is_some() {
            if let Some(last) = self.order.back_mut() {
                last.1 = value;
            }
            return;
        }
        if self.order.len() >= capacity {
            self.order.pop_front();
        }
        self.order.push_back((key, value));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    // The cache agrees with an LRU model on every read and never exceeds capacity.
    #[test]
    fn behaves_like_lru_model(
        capacity in 0usize..6,
        ops in prop::collection::vec(arb_op(), 0..80),
    ) {
        let cache = BoundedCache::new(capacity);
        let mut model = Model::default();
        for op in ops {
            match op {
                Op::Get(k) => prop_assert_eq!(cache.get(&k), model.touch(k)),
                Op::Put(k, v) => {
                    cache.put(k, v);
                    model.put(k, v, capacity);
                }
            }
            prop_assert!(cache.len() <= capacity);
            prop_assert_eq!(cache.len(), model.order.len());
        }
    }

    // A failing builder never populates the cache.
    #[test]
    fn failed_builds_are_not_cached(key in 0u8..50) {
        let cache: BoundedCache<u8, u32> = BoundedCache::new(4);
        let result: Result<u32, &str> = cache.get_or_try_insert_with(key, || Err("no"));
        prop_assert!(result.is_err());
        prop_assert!(cache.is_empty());
    }
}
