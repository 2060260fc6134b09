// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use proptest::prelude::*;
use tokenadmin_app::{FilterValue, KeywordDescriptor, Vocabulary, normalize_whitespace};

const KEYS: [&str; 5] = ["serial", "type", "user", "description", "active"];

fn keywords() -> Vec<KeywordDescriptor> {
    vec![
        KeywordDescriptor::free_text("serial"),
        KeywordDescriptor::free_text("type"),
        KeywordDescriptor::free_text("user"),
        KeywordDescriptor::free_text("description"),
        KeywordDescriptor::boolean("active"),
    ]
}

fn filter_value() -> impl Strategy<Value = FilterValue> {
    (
        proptest::sample::subsequence(KEYS.to_vec(), 0..=KEYS.len()),
        proptest::collection::vec("[a-z0-9]{1,8}", KEYS.len()),
    )
        .prop_map(|(keys, values)| {
            keys.into_iter()
                .zip(values)
                .fold(FilterValue::new(), |filter, (key, value)| {
                    filter.with(key, &value)
                })
        })
}

fn free_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            "[a-z0-9]{1,6}",
            Just("serial:".to_owned()),
            Just("user:".to_owned()),
            Just(" ".to_owned()),
        ],
        0..8,
    )
    .prop_map(|words| words.join(" "))
}

fn transaction_keywords() -> Vec<KeywordDescriptor> {
    vec![
        KeywordDescriptor::free_text("id"),
        KeywordDescriptor::labeled("transaction_id", "transaction id"),
        KeywordDescriptor::free_text("serial"),
    ]
}

fn transaction_word() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("lost".to_owned()),
        Just("transaction".to_owned()),
        Just("id".to_owned()),
        "[a-z]{1,4}",
    ]
}

// Leading words hold at least one word that cannot start a label.
fn transaction_text() -> impl Strategy<Value = String> {
    (
        proptest::collection::vec(transaction_word(), 0..4),
        "[a-z]{1,4}",
        any::<proptest::sample::Index>(),
        proptest::option::of(proptest::collection::vec(transaction_word(), 0..3)),
    )
        .prop_map(|(mut leading, plain, at, serial)| {
            leading.insert(at.index(leading.len() + 1), plain);
            let mut text = leading.join(" ");
            if let Some(value) = serial {
                text.push_str(" serial: ");
                text.push_str(&value.join(" "));
            }
            text
        })
}

fn sorted_words(text: &str) -> Vec<&str> {
    let mut words: Vec<&str> = text.split_whitespace().collect();
    words.sort_unstable();
    words
}

proptest! {
    #[test]
    fn parse_inverts_compose(filter in filter_value()) {
        let vocabulary = Vocabulary::new(&keywords());
        prop_assert_eq!(vocabulary.parse(&filter.compose()), filter);
    }

    #[test]
    fn toggle_keyword_twice_restores_text_without_key(text in free_text()) {
        let vocabulary = Vocabulary::new(&keywords());
        let once = vocabulary.toggle_keyword(&text, "type");
        prop_assert!(vocabulary.parse(&once).get("type").is_some());
        let twice = vocabulary.toggle_keyword(&once, "type");
        prop_assert_eq!(twice, normalize_whitespace(&text));
    }

    #[test]
    fn toggle_boolean_thrice_from_absent_is_absent(text in free_text()) {
        let vocabulary = Vocabulary::new(&keywords());
        let twice = vocabulary.toggle_boolean(&vocabulary.toggle_boolean(&text, "active"), "active");
        let twice_parsed = vocabulary.parse(&twice);
        prop_assert_eq!(twice_parsed.get("active"), Some("false"));
        let thrice = vocabulary.toggle_boolean(&twice, "active");
        let thrice_parsed = vocabulary.parse(&thrice);
        prop_assert_eq!(thrice_parsed.get("active"), None);
        prop_assert_eq!(thrice, normalize_whitespace(&text));
    }

    #[test]
    fn parse_never_loses_unlabeled_leading_words(words in proptest::collection::vec("[a-z]{1,6}", 0..6)) {
        let vocabulary = Vocabulary::new(&keywords());
        let text = words.join(" ");
        let filter = vocabulary.parse(&text);
        prop_assert!(filter.terms().is_empty());
        prop_assert_eq!(filter.remainder(), text.as_str());
    }

    #[test]
    fn toggled_key_never_joins_a_longer_label(text in transaction_text()) {
        let vocabulary = Vocabulary::new(&transaction_keywords());
        let original = vocabulary.parse(&text);

        let once = vocabulary.toggle_keyword(&text, "id");
        let added = vocabulary.parse(&once);
        prop_assert_eq!(added.get("id"), Some(""));
        prop_assert_eq!(added.get("transaction_id"), original.get("transaction_id"));
        prop_assert_eq!(added.get("serial"), original.get("serial"));

        let twice = vocabulary.toggle_keyword(&once, "id");
        let restored = vocabulary.parse(&twice);
        prop_assert_eq!(restored.terms(), original.terms());
        prop_assert_eq!(sorted_words(restored.remainder()), sorted_words(original.remainder()));
    }
}
