mod error;
mod health;
mod listing;
mod middleware;

pub use error::{list_error_response, route_not_found};
pub use listing::{ListSlot, cached_list_layer};
pub use middleware::{REQUEST_ID_HEADER, RequestContext};

use std::{sync::Arc, time::Duration};

use axum::{Router, middleware as axum_middleware, routing::get};

use crate::application::{
    listing::CachedListQuery,
    repos::{Projection, RelationExpansion},
};
use crate::cache::{CacheKey, KeyValueCache};
use crate::domain::document::{CATEGORIES, POSTS, TAGS, USERS};

use super::db::DocumentStore;
use middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<dyn DocumentStore>,
    pub posts: Arc<CachedListQuery>,
}

impl HttpState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<dyn KeyValueCache>,
        ttl: Duration,
    ) -> Self {
        let posts = posts_listing(store.as_ref(), cache, ttl);
        Self {
            store,
            posts: Arc::new(posts),
        }
    }
}

/// Post listing with its category, tags and author expanded. The author's
/// password never leaves the store.
pub fn posts_listing(
    store: &dyn DocumentStore,
    cache: Arc<dyn KeyValueCache>,
    ttl: Duration,
) -> CachedListQuery {
    CachedListQuery::new(store.collection(POSTS), cache, CacheKey::posts_list())
        .with_expansions(vec![
            RelationExpansion::new("category", CATEGORIES).select(Projection::include(&["title"])),
            RelationExpansion::new("tags", TAGS).select(Projection::include(&["title"])),
            RelationExpansion::new("user", USERS).select(Projection::exclude(&["password"])),
        ])
        .with_ttl(ttl)
}

pub fn build_router(state: HttpState) -> Router {
    let posts_route = get(listing::list_posts).layer(axum_middleware::from_fn_with_state(
        state.posts.clone(),
        cached_list_layer,
    ));

    Router::new()
        .route("/api/v1/posts", posts_route)
        .route("/health", get(health::health))
        .fallback(route_not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
