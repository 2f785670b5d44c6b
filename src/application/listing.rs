//! Cache-aside listing of a document collection.
//!
//! The first request against a cache key runs the filtered, sorted and paged
//! query and stores the resulting page. Until the entry expires every later
//! request is answered from that stored page regardless of its own filter,
//! sort or selection; only the pagination links are recomputed, against a
//! fresh count of the whole collection.

use std::{sync::Arc, time::Duration};

use metrics::{counter, histogram};
use quill_api_types::ListEnvelope;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::application::{
    filter::Filter,
    pagination::PageWindow,
    query::QueryParameters,
    repos::{DocumentCollection, FindQuery, Projection, RelationExpansion, RepoError, SortSpec},
};
use crate::cache::{CacheError, CacheKey, KeyValueCache};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

pub const METRIC_LIST_CACHE_HIT_TOTAL: &str = "quill_list_cache_hit_total";
pub const METRIC_LIST_CACHE_MISS_TOTAL: &str = "quill_list_cache_miss_total";
pub const METRIC_LIST_QUERY_MS: &str = "quill_list_query_ms";

#[derive(Debug, Error)]
pub enum ListError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("cached entry `{key}` is not a JSON array of records")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("query results could not be encoded for caching")]
    Encode(#[source] serde_json::Error),
}

pub struct CachedListQuery {
    collection: Arc<dyn DocumentCollection>,
    cache: Arc<dyn KeyValueCache>,
    key: CacheKey,
    expansions: Vec<RelationExpansion>,
    ttl: Duration,
}

impl CachedListQuery {
    pub fn new(
        collection: Arc<dyn DocumentCollection>,
        cache: Arc<dyn KeyValueCache>,
        key: CacheKey,
    ) -> Self {
        Self {
            collection,
            cache,
            key,
            expansions: Vec::new(),
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_expansions(mut self, expansions: Vec<RelationExpansion>) -> Self {
        self.expansions = expansions;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Translate request parameters into the query run on a cache miss.
    pub fn build_query(&self, params: &QueryParameters, window: &PageWindow) -> FindQuery {
        let mut query = FindQuery::new(Filter::from_parameters(params));

        if let Some(projection) = params.scalar("select").and_then(Projection::parse) {
            query = query.select(projection);
        }

        let sort = params
            .scalar("sort")
            .map(SortSpec::parse)
            .filter(|sort| !sort.is_empty())
            .unwrap_or_else(SortSpec::newest_first);

        query
            .sort(sort)
            .skip(window.start_index())
            .limit(window.limit())
            .populate(self.expansions.iter().cloned())
    }

    #[instrument(
        name = "cached_list_query",
        skip_all,
        fields(collection = self.collection.name(), key = %self.key)
    )]
    pub async fn execute(
        &self,
        params: &QueryParameters,
    ) -> Result<ListEnvelope<Value>, ListError> {
        let started_at = Instant::now();
        let window = PageWindow::from_parameters(params);

        let (data, outcome) = match self.cache.get(&self.key).await? {
            Some(cached) => {
                counter!(METRIC_LIST_CACHE_HIT_TOTAL).increment(1);
                let data: Vec<Value> =
                    serde_json::from_str(&cached).map_err(|source| ListError::Decode {
                        key: self.key.to_string(),
                        source,
                    })?;
                debug!(records = data.len(), "Serving listing from cache");
                (data, "hit")
            }
            None => {
                counter!(METRIC_LIST_CACHE_MISS_TOTAL).increment(1);
                let query = self.build_query(params, &window);
                debug!(
                    filter = %query.filter.to_native(),
                    skip = query.skip,
                    limit = window.limit(),
                    "Cache miss; querying collection"
                );

                let data: Vec<Value> = self
                    .collection
                    .find(&query)
                    .await?
                    .into_iter()
                    .map(Value::Object)
                    .collect();
                let encoded = serde_json::to_string(&data).map_err(ListError::Encode)?;
                self.cache.set(&self.key, encoded, self.ttl).await?;
                (data, "miss")
            }
        };

        let total = self.collection.count_documents().await?;

        histogram!(METRIC_LIST_QUERY_MS, "outcome" => outcome)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        Ok(ListEnvelope::new(window.links(total), data))
    }
}
