//! Reference population shared by the document store backends.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use serde_json::Value;

use crate::application::repos::{RelationExpansion, RepoError};
use crate::domain::document::{Document, document_id};

/// Lookup of documents by id, used to resolve references.
#[async_trait]
pub(crate) trait ReferenceSource: Send + Sync {
    async fn fetch_by_ids(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<Document>, RepoError>;
}

/// Replace reference ids stored at each expansion's (top-level) path with the
/// referenced documents. A dangling single reference becomes `null`; dangling
/// entries of a reference array are dropped.
pub(crate) async fn populate_documents(
    source: &dyn ReferenceSource,
    documents: &mut [Document],
    expansions: &[RelationExpansion],
) -> Result<(), RepoError> {
    for expansion in expansions {
        let ids: Vec<String> = documents
            .iter()
            .flat_map(|document| referenced_ids(document.get(&expansion.path)))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            continue;
        }

        let referenced: HashMap<String, Value> = source
            .fetch_by_ids(&expansion.collection, &ids)
            .await?
            .into_iter()
            .filter_map(|document| {
                let id = document_id(&document)?.to_string();
                let projected = match &expansion.select {
                    Some(projection) => projection.apply(&document),
                    None => document,
                };
                Some((id, Value::Object(projected)))
            })
            .collect();

        for document in documents.iter_mut() {
            if let Some(slot) = document.get_mut(&expansion.path) {
                resolve(slot, &referenced);
            }
        }
    }
    Ok(())
}

fn referenced_ids(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(id)) => vec![id.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn resolve(slot: &mut Value, referenced: &HashMap<String, Value>) {
    match slot {
        Value::String(id) => {
            *slot = referenced.get(id.as_str()).cloned().unwrap_or(Value::Null);
        }
        Value::Array(items) => {
            let resolved = std::mem::take(items)
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(id) => referenced.get(&id).cloned(),
                    other => Some(other),
                })
                .collect();
            *items = resolved;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::application::repos::Projection;

    struct Catalog {
        documents: Vec<Document>,
        requests: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl ReferenceSource for Catalog {
        async fn fetch_by_ids(
            &self,
            collection: &str,
            ids: &[String],
        ) -> Result<Vec<Document>, RepoError> {
            self.requests
                .lock()
                .expect("requests lock")
                .push((collection.to_string(), ids.to_vec()));
            Ok(self
                .documents
                .iter()
                .filter(|document| {
                    document_id(document).is_some_and(|id| ids.iter().any(|wanted| wanted == id))
                })
                .cloned()
                .collect())
        }
    }

    fn document(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn references_are_inlined_and_projected() {
        let catalog = Catalog {
            documents: vec![
                document(json!({"_id": "t1", "title": "rust", "user": "u1"})),
                document(json!({"_id": "t2", "title": "cache", "user": "u1"})),
            ],
            requests: Mutex::new(Vec::new()),
        };
        let mut posts = vec![
            document(json!({"_id": "p1", "tags": ["t1", "missing", "t2"]})),
            document(json!({"_id": "p2", "tags": ["t2"]})),
        ];
        let expansion =
            RelationExpansion::new("tags", "tags").select(Projection::include(&["title"]));

        populate_documents(&catalog, &mut posts, &[expansion])
            .await
            .expect("populate");

        assert_eq!(
            posts[0].get("tags"),
            Some(&json!([
                {"_id": "t1", "title": "rust"},
                {"_id": "t2", "title": "cache"}
            ]))
        );
        assert_eq!(
            posts[1].get("tags"),
            Some(&json!([{"_id": "t2", "title": "cache"}]))
        );

        let requests = catalog.requests.lock().expect("requests lock");
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0],
            (
                "tags".to_string(),
                vec!["missing".to_string(), "t1".to_string(), "t2".to_string()]
            )
        );
    }

    #[tokio::test]
    async fn dangling_single_reference_becomes_null() {
        let catalog = Catalog {
            documents: Vec::new(),
            requests: Mutex::new(Vec::new()),
        };
        let mut posts = vec![document(json!({"_id": "p1", "category": "gone"}))];

        populate_documents(
            &catalog,
            &mut posts,
            &[RelationExpansion::new("category", "categories")],
        )
        .await
        .expect("populate");

        assert_eq!(posts[0].get("category"), Some(&Value::Null));
    }
}
