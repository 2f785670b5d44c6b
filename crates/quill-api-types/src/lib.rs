//! Response envelopes shared by the Quill server and its clients.
//!
//! Every list endpoint answers with a [`ListEnvelope`]; failures use
//! [`ErrorEnvelope`].

use serde::{Deserialize, Serialize};

/// Reference to a neighbouring page of a paginated listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub page: u64,
    pub limit: u64,
}

/// Links to the adjacent pages. Absent links are omitted from the JSON body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<PageLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<PageLink>,
}

/// Successful list response: `{success, count, pagination, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEnvelope<T> {
    pub success: bool,
    pub count: usize,
    pub pagination: Pagination,
    pub data: Vec<T>,
}

impl<T> ListEnvelope<T> {
    pub fn new(pagination: Pagination, data: Vec<T>) -> Self {
        Self {
            success: true,
            count: data.len(),
            pagination,
            data,
        }
    }
}

/// Failure body. Handler errors carry `error`; routing failures carry `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorEnvelope {
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: None,
            message: Some(message.into()),
        }
    }
}
