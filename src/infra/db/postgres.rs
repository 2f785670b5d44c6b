//! Postgres backend: every collection shares the `documents` table and
//! stores its documents as JSONB bodies.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    Postgres, QueryBuilder,
    postgres::{PgPool, PgPoolOptions},
    query, query_scalar,
    types::Json,
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, info};

use crate::application::filter::{Condition, FieldClause, Filter, RangeOperator};
use crate::application::repos::{
    DocumentCollection, FindQuery, RepoError, SortDirection, SortSpec,
};
use crate::domain::document::{CREATED_AT_FIELD, Document};

use super::{
    DocumentStore,
    populate::{ReferenceSource, populate_documents},
    prepare_for_insert,
    util::map_sqlx_error,
};

#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    fn convert_count(value: i64) -> Result<u64, RepoError> {
        value
            .try_into()
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection> {
        Arc::new(PostgresCollection {
            name: name.to_string(),
            store: self.clone(),
        })
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<usize, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        let mut inserted = 0usize;

        for document in documents {
            let (id, document) = prepare_for_insert(document)?;
            let created_at = created_at_of(&document)?;
            query(
                "INSERT INTO documents (collection, id, body, created_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(collection)
            .bind(id)
            .bind(Json(document))
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
            inserted += 1;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(collection, inserted, "Inserted documents");
        Ok(inserted)
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        query("SELECT 1")
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Postgres pool closed");
    }
}

#[async_trait]
impl ReferenceSource for PostgresDocumentStore {
    async fn fetch_by_ids(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<Document>, RepoError> {
        let rows = query_scalar::<_, Json<Document>>(
            "SELECT body FROM documents WHERE collection = $1 AND id = ANY($2)",
        )
        .bind(collection)
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|Json(document)| document).collect())
    }
}

fn created_at_of(document: &Document) -> Result<OffsetDateTime, RepoError> {
    let raw = document
        .get(CREATED_AT_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            RepoError::invalid_input(format!("`{CREATED_AT_FIELD}` must be a string"))
        })?;
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|err| {
        RepoError::invalid_input(format!("`{CREATED_AT_FIELD}` is not RFC 3339: {err}"))
    })
}

struct PostgresCollection {
    name: String,
    store: PostgresDocumentStore,
}

#[async_trait]
impl DocumentCollection for PostgresCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, query: &FindQuery) -> Result<Vec<Document>, RepoError> {
        let mut qb = select_documents(&self.name, query);
        let rows = qb
            .build_query_scalar::<Json<Document>>()
            .fetch_all(self.store.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut page: Vec<Document> = rows
            .into_iter()
            .map(|Json(document)| match &query.projection {
                Some(projection) => projection.apply(&document),
                None => document,
            })
            .collect();

        populate_documents(&self.store, &mut page, &query.populate).await?;
        Ok(page)
    }

    async fn count_documents(&self) -> Result<u64, RepoError> {
        let total: i64 = query_scalar("SELECT COUNT(*) FROM documents WHERE collection = $1")
            .bind(&self.name)
            .fetch_one(self.store.pool())
            .await
            .map_err(map_sqlx_error)?;
        PostgresDocumentStore::convert_count(total)
    }
}

fn select_documents<'q>(collection: &str, find: &FindQuery) -> QueryBuilder<'q, Postgres> {
    let mut qb = QueryBuilder::new("SELECT body FROM documents WHERE collection = ");
    qb.push_bind(collection.to_string());
    apply_filter(&mut qb, &find.filter);
    apply_sort(&mut qb, &find.sort);

    if find.skip > 0 {
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(find.skip).unwrap_or(i64::MAX));
    }
    if let Some(limit) = find.limit {
        qb.push(" LIMIT ");
        qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    qb
}

fn path_segments(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
}

/// Each clause matches the value at its path, or any element when the value is an array.
/// A missing path yields no elements, so it never matches.
fn apply_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &Filter) {
    for clause in filter.clauses() {
        push_clause(qb, clause);
    }
}

fn push_clause<'q>(qb: &mut QueryBuilder<'q, Postgres>, clause: &FieldClause) {
    let segments = path_segments(&clause.path);
    qb.push(" AND EXISTS (SELECT 1 FROM jsonb_array_elements(CASE jsonb_typeof(body #> ");
    qb.push_bind(segments.clone());
    qb.push(") WHEN 'array' THEN body #> ");
    qb.push_bind(segments.clone());
    qb.push(" ELSE to_jsonb(array_remove(ARRAY[body #> ");
    qb.push_bind(segments);
    qb.push("], NULL)) END) AS el(v) WHERE ");

    match &clause.condition {
        Condition::Equals(literal) => push_equals(qb, literal),
        Condition::AnyOf(literals) if literals.is_empty() => {
            qb.push("false");
        }
        Condition::AnyOf(literals) => {
            qb.push("(");
            for (index, literal) in literals.iter().enumerate() {
                if index > 0 {
                    qb.push(" OR ");
                }
                push_equals(qb, literal);
            }
            qb.push(")");
        }
        Condition::Compare { operator, value } => push_range(qb, *operator, value),
    }
    qb.push(")");
}

fn push_equals<'q>(qb: &mut QueryBuilder<'q, Postgres>, literal: &str) {
    qb.push("(CASE jsonb_typeof(el.v) WHEN 'string' THEN (el.v #>> '{}') = ");
    qb.push_bind(literal.to_string());
    qb.push(" WHEN 'number' THEN (el.v #>> '{}')::float8 = ");
    qb.push_bind(literal.trim().parse::<f64>().ok());
    qb.push(" WHEN 'boolean' THEN (el.v #>> '{}')::boolean = ");
    qb.push_bind(parse_bool(literal));
    qb.push(" WHEN 'null' THEN ");
    qb.push_bind(literal == "null");
    qb.push(" ELSE false END)");
}

fn push_range<'q>(qb: &mut QueryBuilder<'q, Postgres>, operator: RangeOperator, literal: &str) {
    qb.push("(CASE jsonb_typeof(el.v) WHEN 'number' THEN (el.v #>> '{}')::float8 ");
    qb.push(operator.sql());
    qb.push(" ");
    qb.push_bind(literal.trim().parse::<f64>().ok());
    qb.push(" WHEN 'string' THEN (el.v #>> '{}') COLLATE \"C\" ");
    qb.push(operator.sql());
    qb.push(" ");
    qb.push_bind(literal.to_string());
    qb.push(" ELSE false END)");
}

fn parse_bool(literal: &str) -> Option<bool> {
    match literal {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Missing values sort first ascending and last descending; ties fall back to insertion order.
fn apply_sort<'q>(qb: &mut QueryBuilder<'q, Postgres>, sort: &SortSpec) {
    qb.push(" ORDER BY ");
    for key in sort.keys() {
        qb.push("body #> ");
        qb.push_bind(path_segments(&key.path));
        match key.direction {
            SortDirection::Ascending => qb.push(" ASC NULLS FIRST, "),
            SortDirection::Descending => qb.push(" DESC NULLS LAST, "),
        };
    }
    qb.push("seq ASC");
}
