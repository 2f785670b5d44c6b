//! Cache key definitions.

use std::fmt;

use super::CacheError;

/// Key under which the post listing is cached. Constant regardless of the query string.
pub const POSTS_LIST_KEY: &str = "allPosts";

/// A validated, non-empty cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Result<Self, CacheError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(CacheError::InvalidKey);
        }
        Ok(Self(key))
    }

    pub fn posts_list() -> Self {
        Self(POSTS_LIST_KEY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
