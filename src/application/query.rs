//! Request query-string parameters as a tree of scalars, lists and nested maps.
//!
//! Bracket notation nests (`price[gt]=10`), repeated keys and `key[]` build
//! lists, everything else is a scalar.

use std::collections::BTreeMap;

/// Keys that steer the listing rather than filter it.
pub const RESERVED_KEYS: [&str; 4] = ["select", "sort", "page", "limit"];

const MAX_DEPTH: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Scalar(String),
    List(Vec<String>),
    Nested(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Scalar view of the value. Lists yield their first element.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            ParamValue::Scalar(value) => Some(value),
            ParamValue::List(values) => values.first().map(String::as_str),
            ParamValue::Nested(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParameters {
    entries: BTreeMap<String, ParamValue>,
}

impl QueryParameters {
    /// Parse a raw (still percent-encoded) query string.
    pub fn parse(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.insert(&key, value.into_owned());
        }
        params
    }

    pub fn from_uri(uri: &axum::http::Uri) -> Self {
        uri.query().map(Self::parse).unwrap_or_default()
    }

    pub fn insert(&mut self, raw_key: &str, value: String) {
        let (base, segments) = split_key(raw_key);
        if base.is_empty() {
            return;
        }
        insert_at(&mut self.entries, base, &segments, value);
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.get(key)
    }

    pub fn scalar(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ParamValue::as_scalar)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Entries that take part in filtering.
    pub fn filter_entries(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.iter().filter(|(key, _)| !RESERVED_KEYS.contains(key))
    }
}

/// Split `a[b][c]` into `("a", ["b", "c"])`. Malformed brackets keep the raw key.
fn split_key(raw: &str) -> (&str, Vec<&str>) {
    let Some(open) = raw.find('[') else {
        return (raw, Vec::new());
    };
    if open == 0 {
        return (raw, Vec::new());
    }

    let base = &raw[..open];
    let mut segments = Vec::new();
    let mut rest = &raw[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            return (raw, Vec::new());
        };
        segments.push(&stripped[..close]);
        rest = &stripped[close + 1..];
        if segments.len() == MAX_DEPTH {
            break;
        }
    }
    if !rest.is_empty() && segments.len() < MAX_DEPTH {
        return (raw, Vec::new());
    }
    (base, segments)
}

fn insert_at(
    map: &mut BTreeMap<String, ParamValue>,
    key: &str,
    segments: &[&str],
    value: String,
) {
    match segments.split_first() {
        None => append(map, key, value, false),
        Some((&"", _)) => append(map, key, value, true),
        Some((next, rest)) => {
            let slot = map
                .entry(key.to_string())
                .or_insert_with(|| ParamValue::Nested(BTreeMap::new()));
            if !matches!(slot, ParamValue::Nested(_)) {
                *slot = ParamValue::Nested(BTreeMap::new());
            }
            if let ParamValue::Nested(children) = slot {
                insert_at(children, next, rest, value);
            }
        }
    }
}

fn append(map: &mut BTreeMap<String, ParamValue>, key: &str, value: String, force_list: bool) {
    match map.get_mut(key) {
        None => {
            let fresh = if force_list {
                ParamValue::List(vec![value])
            } else {
                ParamValue::Scalar(value)
            };
            map.insert(key.to_string(), fresh);
        }
        Some(ParamValue::Scalar(existing)) => {
            let first = std::mem::take(existing);
            map.insert(key.to_string(), ParamValue::List(vec![first, value]));
        }
        Some(ParamValue::List(values)) => values.push(value),
        // Bracketed and plain forms of one key: the bracketed form wins in either order.
        Some(ParamValue::Nested(_)) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(value: &str) -> ParamValue {
        ParamValue::Scalar(value.to_string())
    }

    #[test]
    fn plain_pairs_are_scalars_and_decoded() {
        let params = QueryParameters::parse("title=Hello%20World&page=2");
        assert_eq!(params.get("title"), Some(&scalar("Hello World")));
        assert_eq!(params.scalar("page"), Some("2"));
    }

    #[test]
    fn brackets_build_nested_maps() {
        let params = QueryParameters::parse("price%5Bgt%5D=10&price[lte]=20");
        let Some(ParamValue::Nested(children)) = params.get("price") else {
            panic!("expected nested price");
        };
        assert_eq!(children.get("gt"), Some(&scalar("10")));
        assert_eq!(children.get("lte"), Some(&scalar("20")));
    }

    #[test]
    fn repeated_keys_and_empty_brackets_build_lists() {
        let params = QueryParameters::parse("tag=a&tag=b&ids[]=x");
        assert_eq!(
            params.get("tag"),
            Some(&ParamValue::List(vec!["a".into(), "b".into()]))
        );
        assert_eq!(params.get("ids"), Some(&ParamValue::List(vec!["x".into()])));
        assert_eq!(params.scalar("tag"), Some("a"));
    }

    #[test]
    fn malformed_brackets_keep_the_raw_key() {
        let params = QueryParameters::parse("a[b=1&[x]=2&c[d]e=3");
        assert_eq!(params.get("a[b"), Some(&scalar("1")));
        assert_eq!(params.get("[x]"), Some(&scalar("2")));
        assert_eq!(params.get("c[d]e"), Some(&scalar("3")));
    }

    #[test]
    fn bracketed_form_wins_over_plain_key_in_either_order() {
        let expected = ParamValue::Nested(BTreeMap::from([("gt".to_string(), scalar("2"))]));
        for query in ["price=1&price[gt]=2", "price[gt]=2&price=1"] {
            let params = QueryParameters::parse(query);
            assert_eq!(params.get("price"), Some(&expected), "{query}");
        }
    }

    #[test]
    fn reserved_keys_are_excluded_from_filter_entries() {
        let params =
            QueryParameters::parse("select=title&sort=-title&page=1&limit=5&category=abc");
        let keys: Vec<&str> = params.filter_entries().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["category"]);
    }

    #[test]
    fn empty_query_yields_no_parameters() {
        assert!(QueryParameters::parse("").is_empty());
        let uri: axum::http::Uri = "/api/v1/posts".parse().expect("uri");
        assert!(QueryParameters::from_uri(&uri).is_empty());
    }
}
