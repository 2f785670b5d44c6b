//! Shared domain enumerations.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Admin,
    #[default]
    Guest,
    Editor,
}
