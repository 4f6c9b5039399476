//! Records persisted in the agreement store
//!
//! Every value is stored as JSON; keys are UTF-8 strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A published agreement text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agreement {
    /// Human readable title
    pub title: String,
    /// Where the document can be read
    pub url: String,
    /// Organizational (entity) agreement rather than an individual one
    #[serde(default)]
    pub is_entity: bool,
}

impl Agreement {
    pub fn individual(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            is_entity: false,
        }
    }

    pub fn entity(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            is_entity: true,
        }
    }
}

/// Identity of an acting user as supplied by the code-hosting platform
///
/// GitHub omits `name` and `email` for many accounts, so both default to empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    /// Stable numeric account id
    pub id: u64,
    /// Login handle
    pub login: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
}

impl ExternalIdentity {
    pub fn new(id: u64, login: impl Into<String>) -> Self {
        Self {
            id,
            login: login.into(),
            name: String::new(),
            email: String::new(),
        }
    }

    /// Key of this user in the `users` collection
    pub fn key(&self) -> String {
        user_key(self.id)
    }
}

/// User profile stored under `users`
pub type User = ExternalIdentity;

/// Signature of an agreement by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgreement {
    pub signed_at: DateTime<Utc>,
}

/// Marker stored in the `useragreements` root for each per-user sub-collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubCollection {
    /// Name of the backing tree
    pub tree: String,
    pub created_at: DateTime<Utc>,
}

/// An organization that can sign entity agreements
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub address: String,
    /// Registration or tax code
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub representative: String,
    #[serde(default)]
    pub email: String,
}

/// Key used for a user id in every collection
pub fn user_key(user_id: u64) -> String {
    user_id.to_string()
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
