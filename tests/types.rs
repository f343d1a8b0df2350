// ABOUTME: Property tests for tag filter parsing and identifier behaviour.
// ABOUTME: Uses proptest to check filters survive formatting and reject empty keys.

use hal_agent::types::{InstanceId, TagFilterError, TagFilters};
use proptest::prelude::*;

fn key() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9:_.-]{0,15}"
}

fn value() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[A-Za-z0-9_.-]{0,12}")
}

proptest! {
    #[test]
    fn formatted_filters_parse_to_the_same_conditions(
        entries in proptest::collection::vec((key(), value()), 1..6)
    ) {
        let input: Vec<String> = entries
            .iter()
            .map(|(k, v)| match v {
                Some(v) => format!("{k}={v}"),
                None => k.clone(),
            })
            .collect();
        let filters = TagFilters::parse(&input.join(",")).unwrap();

        prop_assert_eq!(filters.len(), entries.len());
        for (filter, (k, v)) in filters.iter().zip(&entries) {
            prop_assert_eq!(filter.key(), k.as_str());
            prop_assert_eq!(filter.value(), v.as_deref());
        }
        prop_assert_eq!(TagFilters::parse(&filters.to_string()).unwrap(), filters);
    }

    #[test]
    fn entry_with_empty_key_is_rejected(prefix in "[a-z]{1,8}", value in "[a-z0-9]{0,8}") {
        let input = format!("{prefix},={value}");
        prop_assert!(matches!(
            TagFilters::parse(&input),
            Err(TagFilterError::EmptyKey(_))
        ));
    }
}

#[test]
fn blank_filter_is_rejected() {
    assert_eq!(TagFilters::parse(""), Err(TagFilterError::Empty));
    assert_eq!(TagFilters::parse(" \t "), Err(TagFilterError::Empty));
}

#[test]
fn control_characters_are_rejected() {
    assert!(matches!(
        TagFilters::parse("app=web\u{7}"),
        Err(TagFilterError::InvalidChar('\u{7}'))
    ));
}

#[test]
fn instance_ids_compare_by_value() {
    let a = InstanceId::new("i-0abc");
    let b: InstanceId = "i-0abc".into();
    assert_eq!(a, b);
    assert_eq!(a.to_string(), "i-0abc");
}
