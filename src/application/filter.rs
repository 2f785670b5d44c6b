//! Filter construction from query parameters.
//!
//! Operator keys are recognised by position in the parameter tree: a nested
//! key `gt|gte|lt|lte|in` directly under a field becomes a comparison, any
//! other nested key extends the field path (`author[name]` → `author.name`).
//! Top-level keys are always field names, so a field called `in` stays a field.

use serde_json::{Map, Value};

use super::query::{ParamValue, QueryParameters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl ComparisonOperator {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "in" => Some(Self::In),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
        }
    }

    /// Operator spelling understood by document stores (`$gt`, ...).
    pub fn native(self) -> &'static str {
        match self {
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::In => "$in",
        }
    }
}

/// Ordering comparisons; membership is expressed by [`Condition::AnyOf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOperator {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl RangeOperator {
    pub fn operator(self) -> ComparisonOperator {
        match self {
            Self::Gt => ComparisonOperator::Gt,
            Self::Gte => ComparisonOperator::Gte,
            Self::Lt => ComparisonOperator::Lt,
            Self::Lte => ComparisonOperator::Lte,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    /// Whether an ordering outcome satisfies the operator.
    pub fn accepts(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            Self::Gt => ordering == Greater,
            Self::Gte => matches!(ordering, Greater | Equal),
            Self::Lt => ordering == Less,
            Self::Lte => matches!(ordering, Less | Equal),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Equals(String),
    AnyOf(Vec<String>),
    Compare { operator: RangeOperator, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldClause {
    /// Dotted field path.
    pub path: String,
    pub condition: Condition,
}

/// Conjunction of field clauses. An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<FieldClause>,
}

impl Filter {
    pub fn new(clauses: Vec<FieldClause>) -> Self {
        Self { clauses }
    }

    /// Build a filter from every non-reserved parameter.
    pub fn from_parameters(params: &QueryParameters) -> Self {
        let mut clauses = Vec::new();
        for (field, value) in params.filter_entries() {
            collect_field(field.to_string(), value, &mut clauses);
        }
        Self { clauses }
    }

    pub fn clauses(&self) -> &[FieldClause] {
        &self.clauses
    }

    /// Store-native JSON form, e.g. `{"price": {"$gt": "10"}}`. Used for logging.
    pub fn to_native(&self) -> Value {
        let mut root = Map::new();
        for clause in &self.clauses {
            match &clause.condition {
                Condition::Equals(value) => {
                    root.insert(clause.path.clone(), Value::String(value.clone()));
                }
                Condition::AnyOf(values) => {
                    merge_operator(
                        &mut root,
                        &clause.path,
                        ComparisonOperator::In,
                        strings(values),
                    );
                }
                Condition::Compare { operator, value } => {
                    merge_operator(
                        &mut root,
                        &clause.path,
                        operator.operator(),
                        Value::String(value.clone()),
                    );
                }
            }
        }
        Value::Object(root)
    }
}

fn collect_field(path: String, value: &ParamValue, clauses: &mut Vec<FieldClause>) {
    match value {
        ParamValue::Scalar(value) => clauses.push(FieldClause {
            path,
            condition: Condition::Equals(value.clone()),
        }),
        ParamValue::List(values) => clauses.push(FieldClause {
            path,
            condition: Condition::AnyOf(values.clone()),
        }),
        ParamValue::Nested(children) => {
            for (key, child) in children {
                match (ComparisonOperator::parse(key), child) {
                    (Some(operator), ParamValue::Scalar(_) | ParamValue::List(_)) => {
                        clauses.push(FieldClause {
                            path: path.clone(),
                            condition: operator_condition(operator, child),
                        });
                    }
                    _ => collect_field(format!("{path}.{key}"), child, clauses),
                }
            }
        }
    }
}

fn operator_condition(operator: ComparisonOperator, value: &ParamValue) -> Condition {
    let range = match operator {
        ComparisonOperator::In => return Condition::AnyOf(membership_values(value)),
        ComparisonOperator::Gt => RangeOperator::Gt,
        ComparisonOperator::Gte => RangeOperator::Gte,
        ComparisonOperator::Lt => RangeOperator::Lt,
        ComparisonOperator::Lte => RangeOperator::Lte,
    };
    Condition::Compare {
        operator: range,
        value: value.as_scalar().unwrap_or_default().to_string(),
    }
}

/// `in` takes repeated keys as the member list; a single value is one member,
/// commas included.
fn membership_values(value: &ParamValue) -> Vec<String> {
    match value {
        ParamValue::Scalar(value) => vec![value.clone()],
        ParamValue::List(values) => values.clone(),
        ParamValue::Nested(_) => Vec::new(),
    }
}

fn strings(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

fn merge_operator(
    root: &mut Map<String, Value>,
    path: &str,
    operator: ComparisonOperator,
    value: Value,
) {
    let entry = root
        .entry(path.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(operators) = entry {
        operators.insert(operator.native().to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn filter(query: &str) -> Filter {
        Filter::from_parameters(&QueryParameters::parse(query))
    }

    #[test]
    fn comparison_operators_are_rewritten_structurally() {
        let filter = filter("price[gt]=10&price[lte]=20");
        assert_eq!(
            filter.to_native(),
            json!({"price": {"$gt": "10", "$lte": "20"}})
        );
    }

    #[test]
    fn reserved_keys_never_become_clauses() {
        let filter = filter("select=title&sort=-title&page=1&limit=5&category=abc");
        assert_eq!(
            filter.clauses(),
            &[FieldClause {
                path: "category".to_string(),
                condition: Condition::Equals("abc".to_string()),
            }]
        );
    }

    #[test]
    fn operator_words_in_values_and_field_names_are_left_alone() {
        let filter = filter("in=gt&title=lte");
        assert_eq!(filter.to_native(), json!({"in": "gt", "title": "lte"}));
    }

    #[test]
    fn in_takes_repeated_keys_as_members() {
        let repeated = filter("tags[in]=a&tags[in]=b");
        assert_eq!(
            repeated.clauses(),
            &[FieldClause {
                path: "tags".to_string(),
                condition: Condition::AnyOf(vec!["a".to_string(), "b".to_string()]),
            }]
        );
    }

    #[test]
    fn single_in_value_keeps_its_commas() {
        let single = filter("title[in]=Hello,%20world");
        assert_eq!(
            single.clauses(),
            &[FieldClause {
                path: "title".to_string(),
                condition: Condition::AnyOf(vec!["Hello, world".to_string()]),
            }]
        );
    }

    #[test]
    fn nested_plain_keys_extend_the_path() {
        let filter = filter("author[name]=ada&author[age][gte]=30");
        assert_eq!(
            filter.to_native(),
            json!({"author.age": {"$gte": "30"}, "author.name": "ada"})
        );
    }

    #[test]
    fn range_accepts_ordering() {
        use std::cmp::Ordering;
        assert!(RangeOperator::Gt.accepts(Ordering::Greater));
        assert!(!RangeOperator::Gt.accepts(Ordering::Equal));
        assert!(RangeOperator::Lte.accepts(Ordering::Equal));
        assert!(!RangeOperator::Lt.accepts(Ordering::Greater));
    }
}
