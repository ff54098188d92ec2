use proptest::prelude::*;
use rulecheck::primitives::{
    ancestor_paths, is_ancestor_or_self, is_valid_structural_path, structural_path,
};

fn arb_segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,6}"
}

/// Instance paths such as `order.lines[3].items[0]`.
fn arb_instance_path() -> impl Strategy<Value = (Vec<String>, String)> {
    (arb_segment(), prop::collection::vec((arb_segment(), 0usize..20), 0..4)).prop_map(
        |(root, children)| {
            let mut names = vec![root.clone()];
            let mut path = root;
            for (name, index) in children {
                path.push_str(&format!(".{}[{}]", name, index));
                names.push(name);
            }
            (names, path)
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    // Stripping indices yields a valid structural path of the same level names.
    #[test]
    fn structural_path_strips_indices((names, path) in arb_instance_path()) {
        let structural = structural_path(&path);
        prop_assert!(is_valid_structural_path(&structural), "{}", structural);
        prop_assert_eq!(structural, names.join("."));
    }

    // Ancestors run root first, end at the path itself and are all on its chain.
    #[test]
    fn ancestor_chain_is_ordered((names, path) in arb_instance_path()) {
        let ancestors = ancestor_paths(&path);
        prop_assert_eq!(ancestors.len(), names.len());
        prop_assert_eq!(ancestors.last(), Some(&path));
        prop_assert_eq!(&ancestors[0], &names[0]);
        let leaf = structural_path(&path);
        for ancestor in &ancestors {
            prop_assert!(path.starts_with(ancestor.as_str()));
            prop_assert!(is_ancestor_or_self(&structural_path(ancestor), &leaf));
        }
    }

    // A prefix that does not end on a segment boundary is not an ancestor.
    #[test]
    fn partial_segments_are_not_ancestors(a in arb_segment(), b in "[a-z]{1,4}") {
        let longer = format!("{}{}", a, b);
        prop_assert!(!is_ancestor_or_self(&a, &longer));
        let child = format!("{}.{}", a, b);
        prop_assert!(is_ancestor_or_self(&a, &child));
        prop_assert!(!is_ancestor_or_self(&child, &a));
    }
}
