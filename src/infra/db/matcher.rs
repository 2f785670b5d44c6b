//! In-memory evaluation of filters and sort specifications.
//!
//! Query literals arrive as strings and are cast to the type of the stored
//! value before comparison. Array fields match when any element matches.

use std::cmp::Ordering;

use serde_json::Value;

use crate::application::filter::{Condition, FieldClause, Filter, RangeOperator};
use crate::application::repos::{SortDirection, SortSpec};
use crate::domain::document::{Document, lookup_path};

pub(crate) fn matches(filter: &Filter, document: &Document) -> bool {
    filter
        .clauses()
        .iter()
        .all(|clause| clause_matches(clause, document))
}

fn clause_matches(clause: &FieldClause, document: &Document) -> bool {
    let Some(stored) = lookup_path(document, &clause.path) else {
        return false;
    };
    match &clause.condition {
        Condition::Equals(literal) => any_element(stored, |value| equals(value, literal)),
        Condition::AnyOf(literals) => literals
            .iter()
            .any(|literal| any_element(stored, |value| equals(value, literal))),
        Condition::Compare { operator, value } => {
            any_element(stored, |stored| compare(stored, *operator, value))
        }
    }
}

fn any_element(stored: &Value, predicate: impl Fn(&Value) -> bool) -> bool {
    match stored {
        Value::Array(items) => items.iter().any(&predicate),
        other => predicate(other),
    }
}

fn equals(stored: &Value, literal: &str) -> bool {
    match stored {
        Value::String(text) => text == literal,
        Value::Number(number) => match (number.as_f64(), literal.trim().parse::<f64>()) {
            (Some(stored), Ok(literal)) => stored == literal,
            _ => false,
        },
        Value::Bool(flag) => parse_bool(literal) == Some(*flag),
        Value::Null => literal == "null",
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn compare(stored: &Value, operator: RangeOperator, literal: &str) -> bool {
    let ordering = match stored {
        Value::String(text) => Some(text.as_str().cmp(literal)),
        Value::Number(number) => match (number.as_f64(), literal.trim().parse::<f64>()) {
            (Some(stored), Ok(literal)) => stored.partial_cmp(&literal),
            _ => None,
        },
        _ => None,
    };
    ordering.is_some_and(|ordering| operator.accepts(ordering))
}

fn parse_bool(literal: &str) -> Option<bool> {
    match literal {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Order two documents by the sort keys. Ties keep insertion order when used
/// with a stable sort.
pub(crate) fn compare_documents(sort: &SortSpec, left: &Document, right: &Document) -> Ordering {
    for key in sort.keys() {
        let ordering = compare_values(
            lookup_path(left, &key.path),
            lookup_path(right, &key.path),
        );
        let ordering = match key.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Cross-type order: missing/null < numbers < strings < objects < arrays < booleans.
fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.unwrap_or(&Value::Null);
    let right = right.unwrap_or(&Value::Null);
    match type_rank(left).cmp(&type_rank(right)) {
        Ordering::Equal => {}
        unequal => return unequal,
    }
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.total_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Null, Value::Null) => Ordering::Equal,
        (a, b) => a.to_string().cmp(&b.to_string()),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Object(_) => 4,
        Value::Array(_) => 5,
        Value::Bool(_) => 8,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::query::QueryParameters;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn filter(query: &str) -> Filter {
        Filter::from_parameters(&QueryParameters::parse(query))
    }

    #[test]
    fn numeric_literals_are_cast_to_stored_numbers() {
        let cheap = document(json!({"price": 10}));
        let pricey = document(json!({"price": 10.5}));

        assert!(!matches(&filter("price[gt]=10"), &cheap));
        assert!(matches(&filter("price[gt]=10"), &pricey));
        assert!(matches(&filter("price[gte]=10&price[lt]=11"), &cheap));
        assert!(matches(&filter("price=10"), &cheap));
        assert!(!matches(&filter("price[gt]=abc"), &pricey));
    }

    #[test]
    fn array_fields_match_any_element() {
        let post = document(json!({"tags": ["rust", "cache"]}));
        assert!(matches(&filter("tags=cache"), &post));
        assert!(matches(&filter("tags[in]=go&tags[in]=rust"), &post));
        assert!(!matches(&filter("tags=go"), &post));
    }

    #[test]
    fn missing_fields_never_match() {
        let post = document(json!({"title": "x"}));
        assert!(!matches(&filter("category=abc"), &post));
        assert!(!matches(&filter("category=null"), &post));
        assert!(matches(&Filter::default(), &post));

        let unassigned = document(json!({"category": null}));
        assert!(matches(&filter("category=null"), &unassigned));
    }

    #[test]
    fn booleans_and_nested_paths() {
        let user = document(json!({"active": true, "profile": {"city": "Oslo"}}));
        assert!(matches(&filter("active=true"), &user));
        assert!(!matches(&filter("active=false"), &user));
        assert!(matches(&filter("profile[city]=Oslo"), &user));
    }

    #[test]
    fn string_ranges_compare_lexicographically() {
        let post = document(json!({"createdAt": "2024-05-01T00:00:00.000Z"}));
        assert!(matches(&filter("createdAt[gte]=2024-01-01"), &post));
        assert!(!matches(&filter("createdAt[lt]=2024-01-01"), &post));
    }

    #[test]
    fn sort_orders_across_types_and_directions() {
        let docs = [
            document(json!({"v": "b"})),
            document(json!({"v": 2})),
            document(json!({})),
            document(json!({"v": true})),
            document(json!({"v": "a"})),
        ];
        let mut sorted: Vec<&Document> = docs.iter().collect();
        let spec = SortSpec::parse("v");
        sorted.sort_by(|a, b| compare_documents(&spec, a, b));
        let values: Vec<Option<&Value>> = sorted.iter().map(|doc| doc.get("v")).collect();
        assert_eq!(
            values,
            vec![
                None,
                Some(&json!(2)),
                Some(&json!("a")),
                Some(&json!("b")),
                Some(&json!(true)),
            ]
        );

        let spec = SortSpec::parse("-v");
        sorted.sort_by(|a, b| compare_documents(&spec, a, b));
        assert_eq!(sorted[0].get("v"), Some(&json!(true)));
    }
}
