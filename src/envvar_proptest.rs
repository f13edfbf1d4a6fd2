//! Property-based tests for environment merging.

#[cfg(test)]
mod proptest_tests {
    use std::collections::BTreeMap;

    use crate::envvar::{merge, MergePolicies, PATH_LIST_SEPARATOR};
    use proptest::prelude::*;

    fn key() -> impl Strategy<Value = String> {
        "[A-Z][A-Z0-9_]{0,8}"
    }

    fn value() -> impl Strategy<Value = String> {
        "[a-z0-9/._-]{1,12}"
    }

    proptest! {
        /// Property: `+KEY` yields the old value, a space, then the new one
        #[test]
        fn append_flag_concatenates(k in key(), a in value(), b in value()) {
            let policies: MergePolicies = format!("+{}", k).parse().unwrap();
            let base = BTreeMap::from([(k.clone(), a.clone())]);
            let out = merge(&base, &[(k.clone(), b.clone())], &policies);
            prop_assert_eq!(&out[&k], &format!("{} {}", a, b));
        }

        /// Property: a clear pattern matching the key drops the base value
        /// before the override applies
        #[test]
        fn clear_runs_before_append(k in key(), a in value(), b in value()) {
            let policies: MergePolicies = format!("^{}*,+{}", &k[..1], k).parse().unwrap();
            let base = BTreeMap::from([(k.clone(), a)]);
            let out = merge(&base, &[(k.clone(), b.clone())], &policies);
            prop_assert_eq!(&out[&k], &b);
        }

        /// Property: path policies keep every element of both lists
        #[test]
        fn path_policies_preserve_elements(k in key(), a in value(), b in value()) {
            for spec in [format!("{}:", k), format!(":{}", k)] {
                let policies: MergePolicies = spec.parse().unwrap();
                let base = BTreeMap::from([(k.clone(), a.clone())]);
                let out = merge(&base, &[(k.clone(), b.clone())], &policies);
                let parts: Vec<&str> = out[&k].split(PATH_LIST_SEPARATOR).collect();
                prop_assert_eq!(parts.len(), 2);
                prop_assert!(parts.contains(&a.as_str()));
                prop_assert!(parts.contains(&b.as_str()));
            }
        }

        /// Property: variables without overrides or clear patterns pass through
        #[test]
        fn untouched_variables_pass_through(
            base in prop::collection::btree_map(key(), value(), 0..8)
        ) {
            let out = merge(&base, &[], &MergePolicies::default());
            prop_assert_eq!(out, base);
        }
    }
}
