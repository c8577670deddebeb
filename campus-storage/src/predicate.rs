//! Row-level filter predicate evaluation
//!
//! Shared by the in-memory backend (query execution) and the subscription
//! manager (change-event matching), so a subscription's predicate agrees
//! exactly with the query builder's.

use campus_core::{Filter, FilterOp, FilterSet, Row};
use serde_json::Value;
use std::cmp::Ordering;

/// Whether a row satisfies every filter in the set (logical AND).
pub fn row_matches(row: &Row, filters: &FilterSet) -> bool {
    filters.iter().all(|filter| filter_matches(row, filter))
}

fn filter_matches(row: &Row, filter: &Filter) -> bool {
    let actual = row.get(&filter.column).unwrap_or(&Value::Null);
    match filter.op {
        FilterOp::Eq => actual == &filter.value,
        FilterOp::Neq => actual != &filter.value,
        FilterOp::Gt => compare(actual, &filter.value) == Some(Ordering::Greater),
        FilterOp::Lt => compare(actual, &filter.value) == Some(Ordering::Less),
        FilterOp::Gte => matches!(
            compare(actual, &filter.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::Lte => matches!(
            compare(actual, &filter.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::In => match &filter.value {
            Value::Array(candidates) => candidates.contains(actual),
            _ => false,
        },
        FilterOp::Like => pattern_matches(actual, &filter.value, false),
        FilterOp::Ilike => pattern_matches(actual, &filter.value, true),
    }
}

/// Order two JSON values when they are comparable: numbers with numbers,
/// strings with strings. Mixed or non-scalar operands are incomparable and
/// fail every range operator.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64()?;
            let y = y.as_f64()?;
            x.partial_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn pattern_matches(actual: &Value, pattern: &Value, case_insensitive: bool) -> bool {
    let (Value::String(text), Value::String(pattern)) = (actual, pattern) else {
        return false;
    };
    if case_insensitive {
        like_match(&text.to_lowercase(), &pattern.to_lowercase())
    } else {
        like_match(text, pattern)
    }
}

/// SQL LIKE semantics: `%` matches any run of characters, `_` matches
/// exactly one character.
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    like_match_inner(&text, &pattern)
}

fn like_match_inner(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((&'%', rest)) => {
            // Try every possible length for the wildcard run, including zero.
            (0..=text.len()).any(|skip| like_match_inner(&text[skip..], rest))
        }
        Some((&'_', rest)) => match text.split_first() {
            Some((_, text_rest)) => like_match_inner(text_rest, rest),
            None => false,
        },
        Some((ch, rest)) => match text.split_first() {
            Some((t, text_rest)) if t == ch => like_match_inner(text_rest, rest),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::Filter;
    use proptest::prelude::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_eq_and_neq() {
        let r = row(&[("status", json!("active"))]);
        assert!(row_matches(&r, &FilterSet::new().with(Filter::eq("status", json!("active")))));
        assert!(!row_matches(&r, &FilterSet::new().with(Filter::eq("status", json!("paused")))));
        assert!(row_matches(&r, &FilterSet::new().with(Filter::neq("status", json!("paused")))));
    }

    #[test]
    fn test_missing_column_is_null() {
        let r = row(&[("name", json!("Ira"))]);
        // A row without the column satisfies `neq true` (missing != true).
        assert!(row_matches(
            &r,
            &FilterSet::new().with(Filter::neq("is_deleted", json!(true)))
        ));
        assert!(!row_matches(
            &r,
            &FilterSet::new().with(Filter::eq("is_deleted", json!(true)))
        ));
    }

    #[test]
    fn test_numeric_ranges() {
        let r = row(&[("amount", json!(250))]);
        assert!(row_matches(&r, &FilterSet::new().with(Filter::gte("amount", json!(250)))));
        assert!(row_matches(&r, &FilterSet::new().with(Filter::gt("amount", json!(100)))));
        assert!(!row_matches(&r, &FilterSet::new().with(Filter::lt("amount", json!(100)))));
        // Mixed types are incomparable, never a silent coercion.
        assert!(!row_matches(&r, &FilterSet::new().with(Filter::gt("amount", json!("100")))));
    }

    #[test]
    fn test_in_list() {
        let r = row(&[("class_id", json!("c-2"))]);
        let filter = Filter::in_list("class_id", vec![json!("c-1"), json!("c-2")]);
        assert!(row_matches(&r, &FilterSet::new().with(filter)));

        let miss = Filter::in_list("class_id", vec![json!("c-3")]);
        assert!(!row_matches(&r, &FilterSet::new().with(miss)));
    }

    #[test]
    fn test_like_patterns() {
        let r = row(&[("name", json!("Aarav Mehta"))]);
        assert!(row_matches(&r, &FilterSet::new().with(Filter::like("name", "Aarav%"))));
        assert!(row_matches(&r, &FilterSet::new().with(Filter::like("name", "%Mehta"))));
        assert!(row_matches(&r, &FilterSet::new().with(Filter::like("name", "%rav%"))));
        assert!(row_matches(&r, &FilterSet::new().with(Filter::like("name", "Aarav _ehta"))));
        assert!(!row_matches(&r, &FilterSet::new().with(Filter::like("name", "aarav%"))));
        assert!(row_matches(&r, &FilterSet::new().with(Filter::ilike("name", "aarav%"))));
    }

    #[test]
    fn test_and_composition() {
        let r = row(&[("status", json!("active")), ("amount", json!(10))]);
        let both = FilterSet::new()
            .with(Filter::eq("status", json!("active")))
            .with(Filter::gte("amount", json!(10)));
        assert!(row_matches(&r, &both));

        let one_fails = FilterSet::new()
            .with(Filter::eq("status", json!("active")))
            .with(Filter::gt("amount", json!(10)));
        assert!(!row_matches(&r, &one_fails));
    }

    proptest! {
        #[test]
        fn prop_eq_matches_iff_equal(a in 0i64..100, b in 0i64..100) {
            let r = row(&[("n", json!(a))]);
            let matched = row_matches(&r, &FilterSet::new().with(Filter::eq("n", json!(b))));
            prop_assert_eq!(matched, a == b);
        }

        #[test]
        fn prop_gt_lt_partition(a in 0i64..100, b in 0i64..100) {
            let r = row(&[("n", json!(a))]);
            let gt = row_matches(&r, &FilterSet::new().with(Filter::gt("n", json!(b))));
            let lt = row_matches(&r, &FilterSet::new().with(Filter::lt("n", json!(b))));
            let eq = row_matches(&r, &FilterSet::new().with(Filter::eq("n", json!(b))));
            // Exactly one of gt/lt/eq holds for comparable numbers.
            prop_assert_eq!([gt, lt, eq].iter().filter(|m| **m).count(), 1);
        }

        #[test]
        fn prop_like_percent_prefix(s in "[a-z]{0,12}") {
            let r = row(&[("s", json!(s))]);
            prop_assert!(row_matches(&r, &FilterSet::new().with(Filter::like("s", "%"))));
        }
    }
}
