use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{domain::error::DomainError, infra::error::InfraError};

/// Diagnostic chain attached to failing responses and consumed by the
/// response logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Process-level failure reported by the binary before exiting.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("outer")]
    struct Outer(#[source] Inner);

    #[derive(Debug, Error)]
    #[error("inner")]
    struct Inner;

    #[test]
    fn report_collects_the_source_chain() {
        let report = ErrorReport::from_error("tests", StatusCode::BAD_REQUEST, &Outer(Inner));
        assert_eq!(report.messages, vec!["outer".to_string(), "inner".to_string()]);
        assert_eq!(report.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn attached_report_is_readable_from_extensions() {
        let mut response = Response::new(axum::body::Body::empty());
        ErrorReport::from_message("tests", StatusCode::NOT_FOUND, "missing").attach(&mut response);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.messages, vec!["missing".to_string()]);
    }
}
