//! Property-based tests for identifier sanitizing and name assignment.
//!
//! These tests verify that:
//! 1. Any text sanitizes to a valid lavaan identifier, deterministically
//! 2. Sanitizing is idempotent
//! 3. Arbitrary facet labels never produce clashing variable names

use proptest::prelude::*;
use regex::Regex;
use std::collections::HashSet;

use crate::renamer::{derive_short_code, sanitize, VariableNames};
use crate::test_fixtures::{facet, item, multidim_model};

fn ident() -> Regex {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap()
}

fn label_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z][A-Za-z ]{0,12}",
        "[0-9][A-Za-z0-9!?.-]{0,8}",
        "[ ]{0,3}",
        "i[0-9]{1,2}",
        "g_[a-z0-9_]{1,6}",
        Just("OVERALL".to_string()),
        ".{0,10}",
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn sanitize_yields_identifier(raw in ".{0,40}") {
        let name = sanitize(&raw, "X");
        prop_assert!(ident().is_match(&name), "{:?} -> {:?}", raw, name);
        prop_assert_eq!(&name, &sanitize(&raw, "X"));
    }

    #[test]
    fn sanitize_is_idempotent(raw in ".{0,40}") {
        let once = sanitize(&raw, "X");
        prop_assert_eq!(sanitize(&once, "X"), once);
    }

    #[test]
    fn short_codes_are_upper_alphanumeric(name in ".{0,30}") {
        let code = derive_short_code(&name);
        prop_assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn facet_labels_never_clash(labels in prop::collection::vec(label_strategy(), 1..8)) {
        let facets = labels
            .iter()
            .enumerate()
            .map(|(n, label)| facet(&format!("f{}", n), label))
            .collect();
        let items = (0..labels.len())
            .map(|n| item(n as i64 + 1, "text", Some(&format!("f{}", n))))
            .collect();
        let model = multidim_model(facets, items);
        let names = VariableNames::assign(&model).unwrap();

        let re = ident();
        let mut seen = HashSet::new();
        prop_assert!(seen.insert(names.overall.clone()));
        for it in &model.inputs.items {
            prop_assert!(seen.insert(names.item(it.id).unwrap().to_string()));
        }
        for f in &model.inputs.facets {
            let name = names.facet(&f.id).unwrap();
            prop_assert!(re.is_match(name), "{:?} -> {:?}", f.name, name);
            prop_assert!(seen.insert(name.to_string()), "clash on {:?}", name);
        }
    }
}
