use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::application::error::ErrorReport;

use super::HttpState;

/// 204 when the document store answers, 503 otherwise.
pub(super) async fn health(State(state): State<HttpState>) -> Response {
    match state.store.health_check().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
