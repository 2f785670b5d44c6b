//! Typed records for the blog collections.
//!
//! Records are the validated shape of fixture input; once accepted they are
//! flattened into schemaless [`Document`]s for storage.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use super::{
    document::{CREATED_AT_FIELD, Document, ID_FIELD, UPDATED_AT_FIELD, format_timestamp},
    error::DomainError,
    types::UserRole,
};

const DEFAULT_PROFILE_PHOTO: &str = "no-photo.jpg";
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub firstname: String,
    pub lastname: String,
    #[serde(default = "default_profile_photo")]
    pub profile_photo: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub posts: Vec<String>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user: String,
    pub title: String,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user: String,
    pub title: String,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub dislikes: Vec<String>,
    #[serde(default)]
    pub comments: Vec<String>,
    pub user: String,
    pub photo: String,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub post: String,
    pub user: String,
    pub description: String,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

/// Optional creation/update instants. Missing values are stamped on insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timestamps {
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing
    )]
    pub created_at: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing
    )]
    pub updated_at: Option<OffsetDateTime>,
}

/// Shared behaviour for records that can be validated and stored.
pub trait Record: Serialize {
    const ENTITY: &'static str;

    fn validate(&self) -> Result<(), DomainError>;

    fn timestamps(&self) -> &Timestamps;

    /// Validate and flatten into a storable document.
    fn to_document(&self) -> Result<Document, DomainError> {
        self.validate()?;
        let value = serde_json::to_value(self)
            .map_err(|err| DomainError::validation(Self::ENTITY, err.to_string()))?;
        let Value::Object(mut document) = value else {
            return Err(DomainError::validation(
                Self::ENTITY,
                "record did not serialize to an object",
            ));
        };

        let timestamps = self.timestamps();
        if let Some(created_at) = timestamps.created_at {
            document.insert(
                CREATED_AT_FIELD.to_string(),
                Value::String(format_timestamp(created_at)?),
            );
        }
        if let Some(updated_at) = timestamps.updated_at {
            document.insert(
                UPDATED_AT_FIELD.to_string(),
                Value::String(format_timestamp(updated_at)?),
            );
        }
        Ok(document)
    }
}

impl Record for UserRecord {
    const ENTITY: &'static str = "user";

    fn validate(&self) -> Result<(), DomainError> {
        validate_id(Self::ENTITY, self.id.as_deref())?;
        require(Self::ENTITY, "firstname", &self.firstname)?;
        require(Self::ENTITY, "lastname", &self.lastname)?;
        require(Self::ENTITY, "email", &self.email)?;
        if !is_valid_email(&self.email) {
            return Err(DomainError::validation(
                Self::ENTITY,
                format!("`{}` is not a valid email", self.email),
            ));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::validation(
                Self::ENTITY,
                format!("password must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }
        Ok(())
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }
}

impl Record for CategoryRecord {
    const ENTITY: &'static str = "category";

    fn validate(&self) -> Result<(), DomainError> {
        validate_id(Self::ENTITY, self.id.as_deref())?;
        require(Self::ENTITY, "user", &self.user)?;
        require(Self::ENTITY, "title", &self.title)
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }
}

impl Record for TagRecord {
    const ENTITY: &'static str = "tag";

    fn validate(&self) -> Result<(), DomainError> {
        validate_id(Self::ENTITY, self.id.as_deref())?;
        require(Self::ENTITY, "user", &self.user)?;
        require(Self::ENTITY, "title", &self.title)
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }
}

impl Record for PostRecord {
    const ENTITY: &'static str = "post";

    fn validate(&self) -> Result<(), DomainError> {
        validate_id(Self::ENTITY, self.id.as_deref())?;
        require(Self::ENTITY, "title", self.title.trim())?;
        require(Self::ENTITY, "description", &self.description)?;
        require(Self::ENTITY, "category", &self.category)?;
        require(Self::ENTITY, "user", &self.user)?;
        require(Self::ENTITY, "photo", &self.photo)?;
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(DomainError::validation(
                Self::ENTITY,
                "tag references must not be empty",
            ));
        }
        Ok(())
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }
}

impl Record for CommentRecord {
    const ENTITY: &'static str = "comment";

    fn validate(&self) -> Result<(), DomainError> {
        validate_id(Self::ENTITY, self.id.as_deref())?;
        require(Self::ENTITY, "post", &self.post)?;
        require(Self::ENTITY, "user", &self.user)?;
        require(Self::ENTITY, "description", &self.description)
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }
}

fn default_profile_photo() -> String {
    DEFAULT_PROFILE_PHOTO.to_string()
}

fn default_active() -> bool {
    true
}

fn require(entity: &'static str, field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(
            entity,
            format!("`{field}` is required"),
        ));
    }
    Ok(())
}

fn validate_id(entity: &'static str, id: Option<&str>) -> Result<(), DomainError> {
    match id {
        Some(id) if id.trim().is_empty() => Err(DomainError::validation(
            entity,
            format!("`{ID_FIELD}` must not be blank when present"),
        )),
        _ => Ok(()),
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() || local.chars().any(|c| c.is_whitespace() || c == '@') {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|label| {
        !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    let tld_ok = labels
        .last()
        .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()));
    labels_ok && tld_ok
}
