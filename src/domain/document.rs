//! Schemaless document representation shared by the persistence backends.

use serde_json::{Map, Value};
use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};

use super::error::DomainError;

/// A stored record: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "_id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

pub const USERS: &str = "users";
pub const CATEGORIES: &str = "categories";
pub const TAGS: &str = "tags";
pub const POSTS: &str = "posts";
pub const COMMENTS: &str = "comments";

/// Fixed-width UTC timestamp. Lexicographic order equals chronological order.
const TIMESTAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
);

pub fn format_timestamp(value: OffsetDateTime) -> Result<String, DomainError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(TIMESTAMP_FORMAT)
        .map_err(|err| DomainError::timestamp(err.to_string()))
}

pub fn now_timestamp() -> Result<String, DomainError> {
    format_timestamp(OffsetDateTime::now_utc())
}

pub fn document_id(document: &Document) -> Option<&str> {
    document.get(ID_FIELD).and_then(Value::as_str)
}

/// Resolve a dotted path (`author.name`) against a document.
pub fn lookup_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = document.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
