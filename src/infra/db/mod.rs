//! Document store backends.
//!
//! Without a configured database URL the service runs on the in-memory
//! store; otherwise documents live in a single Postgres JSONB table.

mod matcher;
mod memory;
mod populate;
mod postgres;
mod util;

pub use memory::MemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use util::map_sqlx_error;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::application::repos::{DocumentCollection, RepoError};
use crate::config::DatabaseSettings;
use crate::domain::document::{
    CREATED_AT_FIELD, Document, ID_FIELD, UPDATED_AT_FIELD, now_timestamp,
};

use super::error::InfraError;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection>;

    /// Insert documents atomically, assigning `_id` and timestamps where absent.
    /// Returns the number of inserted documents.
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<usize, RepoError>;

    async fn health_check(&self) -> Result<(), RepoError>;

    async fn close(&self);
}

/// Open the store selected by the database settings, running migrations for Postgres.
pub async fn connect(settings: &DatabaseSettings) -> Result<Arc<dyn DocumentStore>, InfraError> {
    let Some(url) = settings.url.as_deref() else {
        info!(backend = "memory", "Using in-memory document store");
        return Ok(Arc::new(MemoryDocumentStore::new()));
    };

    let pool = PostgresDocumentStore::connect(url, settings.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
    PostgresDocumentStore::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    info!(
        backend = "postgres",
        max_connections = settings.max_connections.get(),
        "Connected document store"
    );
    Ok(Arc::new(PostgresDocumentStore::new(pool)))
}

/// Fill in `_id`, `createdAt` and `updatedAt` when the caller left them out.
pub(crate) fn prepare_for_insert(mut document: Document) -> Result<(String, Document), RepoError> {
    let id = match document.get(ID_FIELD) {
        None => {
            let id = uuid::Uuid::new_v4().simple().to_string();
            document.insert(ID_FIELD.to_string(), serde_json::Value::String(id.clone()));
            id
        }
        Some(serde_json::Value::String(id)) if !id.trim().is_empty() => id.clone(),
        Some(other) => {
            return Err(RepoError::invalid_input(format!(
                "`{ID_FIELD}` must be a non-empty string, got {other}"
            )));
        }
    };

    let now = now_timestamp().map_err(|err| RepoError::invalid_input(err.to_string()))?;
    let created_at = document
        .entry(CREATED_AT_FIELD.to_string())
        .or_insert_with(|| serde_json::Value::String(now.clone()))
        .clone();
    document
        .entry(UPDATED_AT_FIELD.to_string())
        .or_insert(created_at);

    Ok((id, document))
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn missing_id_and_timestamps_are_assigned() {
        let (id, prepared) =
            prepare_for_insert(document(json!({"title": "x"}))).expect("prepared");
        assert_eq!(id.len(), 32);
        assert_eq!(prepared.get(ID_FIELD), Some(&Value::String(id)));
        assert!(prepared.get(CREATED_AT_FIELD).is_some());
        assert_eq!(prepared.get(CREATED_AT_FIELD), prepared.get(UPDATED_AT_FIELD));
    }

    #[test]
    fn supplied_values_are_kept() {
        let (id, prepared) = prepare_for_insert(document(json!({
            "_id": "p1",
            "createdAt": "2024-01-01T00:00:00.000Z"
        })))
        .expect("prepared");
        assert_eq!(id, "p1");
        assert_eq!(
            prepared.get(UPDATED_AT_FIELD),
            Some(&json!("2024-01-01T00:00:00.000Z"))
        );
    }

    #[test]
    fn non_string_id_is_rejected() {
        let err = prepare_for_insert(document(json!({"_id": 7}))).expect_err("invalid id");
        assert!(matches!(err, RepoError::InvalidInput { .. }));
    }
}
