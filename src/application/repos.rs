//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::application::filter::Filter;
use crate::domain::document::{CREATED_AT_FIELD, Document, ID_FIELD};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub path: String,
    pub direction: SortDirection,
}

/// Ordered sort keys; earlier keys take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    /// Parse `-createdAt,title` (commas or spaces; `-` descends, `+` ascends).
    pub fn parse(raw: &str) -> Self {
        let keys = tokens(raw)
            .filter_map(|token| {
                let (direction, path) = if let Some(path) = token.strip_prefix('-') {
                    (SortDirection::Descending, path)
                } else {
                    (
                        SortDirection::Ascending,
                        token.strip_prefix('+').unwrap_or(token),
                    )
                };
                (!path.is_empty()).then(|| SortKey {
                    path: path.to_string(),
                    direction,
                })
            })
            .collect();
        Self { keys }
    }

    pub fn newest_first() -> Self {
        Self {
            keys: vec![SortKey {
                path: CREATED_AT_FIELD.to_string(),
                direction: SortDirection::Descending,
            }],
        }
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Field selection applied to each returned document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Keep only the listed paths, plus `_id` unless it was excluded.
    Include { fields: Vec<String>, keep_id: bool },
    /// Drop the listed paths.
    Exclude { fields: Vec<String> },
}

impl Projection {
    /// Parse `title,-password`. Any plain field switches to inclusion mode, in
    /// which only `-_id` is honoured among the exclusions.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for token in tokens(raw) {
            match token.strip_prefix('-') {
                Some("") => {}
                Some(field) => exclude.push(field.to_string()),
                None => include.push(token.strip_prefix('+').unwrap_or(token).to_string()),
            }
        }
        include.retain(|field| !field.is_empty());

        if !include.is_empty() {
            let keep_id = !exclude.iter().any(|field| field == ID_FIELD);
            Some(Self::Include {
                fields: include,
                keep_id,
            })
        } else if !exclude.is_empty() {
            Some(Self::Exclude { fields: exclude })
        } else {
            None
        }
    }

    pub fn include(fields: &[&str]) -> Self {
        Self::Include {
            fields: fields.iter().map(|field| field.to_string()).collect(),
            keep_id: true,
        }
    }

    pub fn exclude(fields: &[&str]) -> Self {
        Self::Exclude {
            fields: fields.iter().map(|field| field.to_string()).collect(),
        }
    }

    pub fn apply(&self, document: &Document) -> Document {
        match self {
            Projection::Include { fields, keep_id } => {
                let mut projected = Map::new();
                if *keep_id && let Some(id) = document.get(ID_FIELD) {
                    projected.insert(ID_FIELD.to_string(), id.clone());
                }
                for field in fields {
                    copy_path(document, &mut projected, field);
                }
                projected
            }
            Projection::Exclude { fields } => {
                let mut projected = document.clone();
                for field in fields {
                    remove_path(&mut projected, field);
                }
                projected
            }
        }
    }
}

/// Inline referenced documents from `collection` in place of the ids stored at `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationExpansion {
    pub path: String,
    pub collection: String,
    pub select: Option<Projection>,
}

impl RelationExpansion {
    pub fn new(path: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            collection: collection.into(),
            select: None,
        }
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.select = Some(projection);
        self
    }
}

/// A chained find: filter, then projection, sort, skip, limit and population.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindQuery {
    pub filter: Filter,
    pub projection: Option<Projection>,
    pub sort: SortSpec,
    pub skip: u64,
    pub limit: Option<u64>,
    pub populate: Vec<RelationExpansion>,
}

impl FindQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn populate(mut self, expansions: impl IntoIterator<Item = RelationExpansion>) -> Self {
        self.populate.extend(expansions);
        self
    }
}

#[async_trait]
pub trait DocumentCollection: Send + Sync {
    fn name(&self) -> &str;

    async fn find(&self, query: &FindQuery) -> Result<Vec<Document>, RepoError>;

    /// Size of the whole collection, ignoring any filter.
    async fn count_documents(&self) -> Result<u64, RepoError>;
}

fn tokens(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
}

fn copy_path(source: &Document, target: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            if let Some(value) = source.get(path) {
                target.insert(path.to_string(), value.clone());
            }
        }
        Some((head, rest)) => {
            let Some(Value::Object(inner)) = source.get(head) else {
                return;
            };
            let slot = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(slot) = slot {
                copy_path(inner, slot, rest);
            }
        }
    }
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = document.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}
