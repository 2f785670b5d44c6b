//! JSON fixture loading for the blog collections.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::domain::{
    document::{CATEGORIES, COMMENTS, Document, POSTS, TAGS, USERS},
    entities::{CategoryRecord, CommentRecord, PostRecord, Record, TagRecord, UserRecord},
    error::DomainError,
};

use super::{db::DocumentStore, error::InfraError};

/// Records grouped by collection. Missing groups are treated as empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeedFixture {
    pub users: Vec<UserRecord>,
    pub categories: Vec<CategoryRecord>,
    pub tags: Vec<TagRecord>,
    pub posts: Vec<PostRecord>,
    pub comments: Vec<CommentRecord>,
}

/// Number of documents inserted per collection, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: Vec<(&'static str, usize)>,
}

impl SeedReport {
    pub fn total(&self) -> usize {
        self.inserted.iter().map(|(_, count)| count).sum()
    }
}

impl SeedFixture {
    pub async fn load(path: &Path) -> Result<Self, InfraError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| InfraError::seed(path.display().to_string(), err.to_string()))?;
        Self::parse(&raw).map_err(|err| InfraError::seed(path.display().to_string(), err))
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|err| err.to_string())
    }

    /// Validate every record and convert it to its stored form, grouped in
    /// the order references require: users first, comments last.
    pub fn into_documents(self) -> Result<Vec<(&'static str, Vec<Document>)>, DomainError> {
        Ok(vec![
            (USERS, documents(&self.users)?),
            (CATEGORIES, documents(&self.categories)?),
            (TAGS, documents(&self.tags)?),
            (POSTS, documents(&self.posts)?),
            (COMMENTS, documents(&self.comments)?),
        ])
    }

    /// Insert the fixture into `store`. Validation happens before any write.
    pub async fn apply(self, store: &dyn DocumentStore) -> Result<SeedReport, InfraError> {
        let groups = self.into_documents()?;
        let mut report = SeedReport::default();

        for (collection, documents) in groups {
            if documents.is_empty() {
                continue;
            }
            let inserted = store.insert_many(collection, documents).await?;
            info!(collection, inserted, "Seeded collection");
            report.inserted.push((collection, inserted));
        }

        Ok(report)
    }
}

fn documents<R: Record>(records: &[R]) -> Result<Vec<Document>, DomainError> {
    records.iter().map(Record::to_document).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::repos::FindQuery;
    use crate::infra::db::MemoryDocumentStore;

    fn fixture() -> SeedFixture {
        SeedFixture::parse(
            &json!({
                "users": [{
                    "_id": "u1",
                    "firstname": "Ada",
                    "lastname": "Lovelace",
                    "email": "ada@example.com",
                    "password": "engine1"
                }],
                "categories": [{"_id": "c1", "user": "u1", "title": "Engines"}],
                "posts": [{
                    "title": "Notes",
                    "description": "On the analytical engine",
                    "category": "c1",
                    "user": "u1",
                    "photo": "notes.png"
                }]
            })
            .to_string(),
        )
        .expect("fixture parses")
    }

    #[tokio::test]
    async fn apply_inserts_groups_in_order() {
        let store = MemoryDocumentStore::new();
        let report = fixture().apply(&store).await.expect("seeded");

        assert_eq!(report.inserted, vec![(USERS, 1), (CATEGORIES, 1), (POSTS, 1)]);
        assert_eq!(report.total(), 3);

        let users = store
            .collection(USERS)
            .find(&FindQuery::default())
            .await
            .expect("users");
        assert_eq!(users[0].get("profilePhoto"), Some(&json!("no-photo.jpg")));
        assert_eq!(users[0].get("role"), Some(&json!("Guest")));
    }

    #[tokio::test]
    async fn invalid_record_aborts_before_any_write() {
        let mut fixture = fixture();
        fixture.posts[0].title = "   ".to_string();
        let store = MemoryDocumentStore::new();

        let err = fixture.apply(&store).await.expect_err("invalid post");
        assert!(matches!(err, InfraError::Seed { .. }));
        assert_eq!(
            store.collection(USERS).count_documents().await.expect("count"),
            0
        );
    }

    #[test]
    fn unknown_groups_are_rejected() {
        let err = SeedFixture::parse(r#"{"widgets": []}"#).expect_err("unknown field");
        assert!(err.contains("widgets"));
    }
}
