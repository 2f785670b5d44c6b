//! Cache-aside listing middleware and the handlers that echo its result.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use quill_api_types::{ErrorEnvelope, ListEnvelope};
use serde_json::Value;

use crate::application::{error::ErrorReport, listing::CachedListQuery, query::QueryParameters};

use super::error::list_error_response;

/// Listing result placed in the request extensions for the route handler.
#[derive(Debug, Clone)]
pub struct ListSlot(pub ListEnvelope<Value>);

/// Runs the listing for the request's query string. On success the envelope
/// is attached to the request and the next stage runs; on failure the chain
/// stops with a 400 envelope.
pub async fn cached_list_layer(
    State(listing): State<Arc<CachedListQuery>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let params = QueryParameters::from_uri(request.uri());
    match listing.execute(&params).await {
        Ok(envelope) => {
            request.extensions_mut().insert(ListSlot(envelope));
            next.run(request).await
        }
        Err(err) => list_error_response(err),
    }
}

pub(super) async fn list_posts(mut request: Request<Body>) -> Response {
    match request.extensions_mut().remove::<ListSlot>() {
        Some(ListSlot(envelope)) => Json(envelope).into_response(),
        None => {
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            let mut response =
                (status, Json(ErrorEnvelope::error("listing was not prepared"))).into_response();
            ErrorReport::from_message(
                "infra::http::listing",
                status,
                "route reached without listing middleware",
            )
            .attach(&mut response);
            response
        }
    }
}
