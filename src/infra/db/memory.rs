use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::application::repos::{DocumentCollection, FindQuery, RepoError};
use crate::domain::document::{Document, document_id};

use super::{
    DocumentStore,
    matcher::{compare_documents, matches},
    populate::{ReferenceSource, populate_documents},
    prepare_for_insert,
};

/// Process-local document store. Collections keep insertion order.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, Vec<Document>>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection> {
        Arc::new(MemoryCollection {
            name: name.to_string(),
            store: self.clone(),
        })
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<usize, RepoError> {
        let mut prepared = Vec::with_capacity(documents.len());
        for document in documents {
            prepared.push(prepare_for_insert(document)?);
        }

        let mut collections = self.collections.write().await;
        let existing = collections.entry(collection.to_string()).or_default();

        let mut seen: HashSet<&str> = existing.iter().filter_map(document_id).collect();
        for (id, _) in &prepared {
            if !seen.insert(id.as_str()) {
                return Err(RepoError::Duplicate {
                    constraint: format!("{collection}._id"),
                });
            }
        }

        let inserted = prepared.len();
        existing.extend(prepared.into_iter().map(|(_, document)| document));
        debug!(collection, inserted, "Inserted documents");
        Ok(inserted)
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }

    async fn close(&self) {
        debug!("Memory document store closed");
    }
}

#[async_trait]
impl ReferenceSource for MemoryDocumentStore {
    async fn fetch_by_ids(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<Document>, RepoError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| {
                        document_id(document).is_some_and(|id| ids.iter().any(|want| want == id))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

struct MemoryCollection {
    name: String,
    store: MemoryDocumentStore,
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, query: &FindQuery) -> Result<Vec<Document>, RepoError> {
        let mut matched: Vec<Document> = {
            let collections = self.store.collections.read().await;
            collections
                .get(&self.name)
                .map(|documents| {
                    documents
                        .iter()
                        .filter(|document| matches(&query.filter, document))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        // Stable sort: ties keep insertion order.
        matched.sort_by(|left, right| compare_documents(&query.sort, left, right));

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let take = query
            .limit
            .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        let mut page: Vec<Document> = matched
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|document| match &query.projection {
                Some(projection) => projection.apply(&document),
                None => document,
            })
            .collect();

        populate_documents(&self.store, &mut page, &query.populate).await?;
        Ok(page)
    }

    async fn count_documents(&self) -> Result<u64, RepoError> {
        let collections = self.store.collections.read().await;
        let count = collections.get(&self.name).map_or(0, Vec::len);
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::application::filter::Filter;
    use crate::application::query::QueryParameters;
    use crate::application::repos::{Projection, RelationExpansion, SortSpec};

    fn document(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    async fn seeded() -> MemoryDocumentStore {
        let store = MemoryDocumentStore::new();
        store
            .insert_many(
                "users",
                vec![document(json!({"_id": "u1", "firstname": "Ada", "password": "secret1"}))],
            )
            .await
            .expect("users");
        store
            .insert_many(
                "posts",
                (1..=12)
                    .map(|n| {
                        document(json!({
                            "_id": format!("p{n}"),
                            "title": format!("Post {n:02}"),
                            "price": n,
                            "user": "u1",
                            "createdAt": format!("2024-01-{n:02}T00:00:00.000Z")
                        }))
                    })
                    .collect(),
            )
            .await
            .expect("posts");
        store
    }

    fn ids(documents: &[Document]) -> Vec<&str> {
        documents.iter().filter_map(document_id).collect()
    }

    #[tokio::test]
    async fn find_filters_sorts_and_pages() {
        let store = seeded().await;
        let posts = store.collection("posts");
        let params = QueryParameters::parse("price[gt]=3");

        let query = FindQuery::new(Filter::from_parameters(&params))
            .sort(SortSpec::newest_first())
            .skip(2)
            .limit(3);
        let found = posts.find(&query).await.expect("find");

        assert_eq!(ids(&found), vec!["p10", "p9", "p8"]);
        assert_eq!(posts.count_documents().await.expect("count"), 12);
    }

    #[tokio::test]
    async fn find_projects_then_populates() {
        let store = seeded().await;
        let posts = store.collection("posts");

        let query = FindQuery::new(Filter::default())
            .select(Projection::include(&["title", "user"]))
            .sort(SortSpec::parse("title"))
            .limit(1)
            .populate([RelationExpansion::new("user", "users")
                .select(Projection::include(&["firstname"]))]);
        let found = posts.find(&query).await.expect("find");

        assert_eq!(
            Value::Object(found[0].clone()),
            json!({
                "_id": "p1",
                "title": "Post 01",
                "user": {"_id": "u1", "firstname": "Ada"}
            })
        );
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected_atomically() {
        let store = seeded().await;
        let err = store
            .insert_many(
                "posts",
                vec![document(json!({"_id": "new"})), document(json!({"_id": "p1"}))],
            )
            .await
            .expect_err("duplicate");

        assert!(matches!(err, RepoError::Duplicate { .. }));
        assert_eq!(
            store.collection("posts").count_documents().await.expect("count"),
            12
        );
    }

    #[tokio::test]
    async fn unknown_collection_is_empty() {
        let store = MemoryDocumentStore::new();
        let missing = store.collection("nothing");
        assert!(missing.find(&FindQuery::default()).await.expect("find").is_empty());
        assert_eq!(missing.count_documents().await.expect("count"), 0);
    }
}
