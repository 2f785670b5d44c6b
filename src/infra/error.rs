use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::error::DomainError;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {message}")]
    Database { message: String },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("seed fixture `{path}` rejected: {message}")]
    Seed { path: String, message: String },
}

impl InfraError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    pub fn seed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Seed {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<RepoError> for InfraError {
    fn from(err: RepoError) -> Self {
        Self::database(err.to_string())
    }
}

impl From<DomainError> for InfraError {
    fn from(err: DomainError) -> Self {
        Self::Seed {
            path: String::from("<records>"),
            message: err.to_string(),
        }
    }
}
