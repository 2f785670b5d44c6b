//! JSON error envelopes for the HTTP surface.

use axum::{
    Json,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use quill_api_types::ErrorEnvelope;

use crate::application::{error::ErrorReport, listing::ListError};

/// Any listing failure is reported to the client as a 400 with the error text.
pub fn list_error_response(err: ListError) -> Response {
    let status = StatusCode::BAD_REQUEST;
    let mut response = (status, Json(ErrorEnvelope::error(err.to_string()))).into_response();
    ErrorReport::from_error("infra::http::listing", status, &err).attach(&mut response);
    response
}

pub async fn route_not_found(uri: Uri) -> Response {
    let status = StatusCode::NOT_FOUND;
    let message = format!("{uri} - Route not found.");
    let mut response = (status, Json(ErrorEnvelope::message(message.clone()))).into_response();
    ErrorReport::from_message("infra::http::fallback", status, message).attach(&mut response);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::RepoError;

    #[test]
    fn list_errors_map_to_bad_request_with_report() {
        let response = list_error_response(ListError::Repo(RepoError::Timeout));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("error report attached");
        assert_eq!(report.source, "infra::http::listing");
        assert_eq!(report.status, StatusCode::BAD_REQUEST);
    }
}
