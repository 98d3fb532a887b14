use std::cmp::Ordering;

use proptest::prelude::*;

use element_index::core::{compare_versions, is_newer};

fn arb_version() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u64..20, 0u64..20, 0u64..20).prop_map(|(a, b, c)| format!("{a}.{b}.{c}")),
        (0u64..20, 0u64..20).prop_map(|(a, b)| format!("{a}.{b}")),
        (0u64..5, 0u64..5, 0u64..5, "[a-z]{1,5}")
            .prop_map(|(a, b, c, pre)| format!("{a}.{b}.{c}-{pre}")),
        "[a-z]{1,8}",
    ]
}

proptest! {
    #[test]
    fn comparison_is_antisymmetric(a in arb_version(), b in arb_version()) {
        prop_assert_eq!(compare_versions(&a, &b), compare_versions(&b, &a).reverse());
    }

    #[test]
    fn comparison_is_reflexive(a in arb_version()) {
        prop_assert_eq!(compare_versions(&a, &a), Ordering::Equal);
        prop_assert!(!is_newer(&a, &a));
    }

    #[test]
    fn comparison_is_transitive(a in arb_version(), b in arb_version(), c in arb_version()) {
        let mut sorted = vec![a, b, c];
        sorted.sort_by(|x, y| compare_versions(x, y));
        prop_assert_ne!(compare_versions(&sorted[0], &sorted[1]), Ordering::Greater);
        prop_assert_ne!(compare_versions(&sorted[1], &sorted[2]), Ordering::Greater);
        prop_assert_ne!(compare_versions(&sorted[0], &sorted[2]), Ordering::Greater);
    }

    #[test]
    fn bumping_patch_is_newer(major in 0u64..50, minor in 0u64..50, patch in 0u64..50) {
        let current = format!("{major}.{minor}.{patch}");
        let next = format!("{major}.{minor}.{}", patch + 1);
        prop_assert!(is_newer(&next, &current));
        prop_assert!(!is_newer(&current, &next));
    }
}
