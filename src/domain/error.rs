use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("`{entity}` record is invalid: {message}")]
    Validation {
        entity: &'static str,
        message: String,
    },
    #[error("timestamp could not be represented: {message}")]
    Timestamp { message: String },
}

impl DomainError {
    pub fn validation(entity: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            entity,
            message: message.into(),
        }
    }

    pub fn timestamp(message: impl Into<String>) -> Self {
        Self::Timestamp {
            message: message.into(),
        }
    }
}
