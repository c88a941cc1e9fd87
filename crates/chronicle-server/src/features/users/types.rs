//! User domain types
//!
//! Wire shapes use the camelCase keys the stored documents carry; the
//! password hash lives only inside raw documents and never appears in a
//! [`User`] response value.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::store::{Document, Filter};

/// Collection user documents live in.
pub const USERS_COLLECTION: &str = "users";

const PASSWORD_KEY: &str = "password";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserStatus {
    Active,
    Inactive,
    Banned,
    Deleted,
    #[default]
    Pending,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Banned => "BANNED",
            Self::Deleted => "DELETED",
            Self::Pending => "PENDING",
        }
    }
}

/// API-facing user shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub gender: Gender,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl User {
    /// Build the response shape from a stored document, dropping the
    /// password hash.
    pub fn from_document(mut doc: Document) -> Result<Self, serde_json::Error> {
        doc.remove(PASSWORD_KEY);
        serde_json::from_value(JsonValue::Object(doc))
    }
}

/// Input for creating a user (both the admin mutation and signup).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub gender: Gender,
    #[serde(default)]
    pub status: Option<UserStatus>,
}

/// Partial update for an existing user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub status: Option<UserStatus>,
}

/// Lookup filter for a single user. Text fields match as case-insensitive
/// substrings, the rest by equality.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUserInput {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub status: Option<UserStatus>,
}

impl GetUserInput {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Default::default()
        }
    }

    pub fn to_filter(&self) -> Filter {
        let mut clauses = serde_json::Map::new();
        if let Some(ref id) = self.id {
            clauses.insert("_id".to_string(), JsonValue::String(id.clone()));
        }
        for (key, value) in [
            ("firstName", &self.first_name),
            ("lastName", &self.last_name),
            ("email", &self.email),
            ("username", &self.username),
            ("phone", &self.phone),
        ] {
            if let Some(text) = value {
                clauses.insert(key.to_string(), regex_clause(text));
            }
        }
        if let Some(gender) = self.gender {
            clauses.insert("gender".to_string(), enum_value(&gender));
        }
        if let Some(status) = self.status {
            clauses.insert("status".to_string(), enum_value(&status));
        }
        Filter::new(clauses)
    }
}

/// Pagination input for user listings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginateUserInput {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub status: Option<UserStatus>,
}

impl PaginateUserInput {
    pub fn to_filter(&self) -> Filter {
        let mut clauses = serde_json::Map::new();
        if let Some(ref search) = self.search {
            let alternatives: Vec<JsonValue> = ["firstName", "lastName", "email", "username", "phone"]
                .iter()
                .map(|field| {
                    let mut clause = serde_json::Map::new();
                    clause.insert(field.to_string(), regex_clause(search));
                    JsonValue::Object(clause)
                })
                .collect();
            clauses.insert("$or".to_string(), JsonValue::Array(alternatives));
        }
        if let Some(gender) = self.gender {
            clauses.insert("gender".to_string(), enum_value(&gender));
        }
        if let Some(status) = self.status {
            clauses.insert("status".to_string(), enum_value(&status));
        }
        Filter::new(clauses)
    }
}

/// One page of users plus pagination bookkeeping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedUsers {
    pub docs: Vec<User>,
    pub total_docs: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
    pub has_prev_page: bool,
    pub has_next_page: bool,
}

fn regex_clause(text: &str) -> JsonValue {
    let mut clause = serde_json::Map::new();
    clause.insert(
        "$regex".to_string(),
        JsonValue::String(regex::escape(text)),
    );
    clause.insert("$options".to_string(), JsonValue::String("i".to_string()));
    JsonValue::Object(clause)
}

fn enum_value<T: Serialize>(value: &T) -> JsonValue {
    serde_json::to_value(value).unwrap_or(JsonValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_from_document_drops_password() {
        let doc = json!({
            "_id": "U1",
            "firstName": "Alice",
            "lastName": "Smith",
            "email": "a@b.com",
            "password": "$argon2id$...",
            "gender": "FEMALE",
            "status": "ACTIVE",
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z"
        })
        .as_object()
        .cloned()
        .unwrap();

        let user = User::from_document(doc).unwrap();
        assert_eq!(user.id, "U1");
        assert_eq!(user.status, UserStatus::Active);

        let serialized = serde_json::to_value(&user).unwrap();
        assert!(serialized.get("password").is_none());
        assert_eq!(serialized["_id"], "U1");
    }

    #[test]
    fn get_user_filter_uses_regex_for_text_fields() {
        let input = GetUserInput {
            email: Some("a@b.com".to_string()),
            status: Some(UserStatus::Active),
            ..Default::default()
        };
        let filter = input.to_filter();
        let map = filter.as_map();
        assert_eq!(map["email"]["$options"], "i");
        assert_eq!(map["status"], "ACTIVE");
    }

    #[test]
    fn search_expands_to_or_clauses() {
        let input = PaginateUserInput {
            search: Some("ali".to_string()),
            ..Default::default()
        };
        let filter = input.to_filter();
        let alternatives = filter.as_map()["$or"].as_array().unwrap();
        assert_eq!(alternatives.len(), 5);
    }

    #[test]
    fn regex_clause_escapes_metacharacters() {
        let clause = regex_clause("a.b+c");
        assert_eq!(clause["$regex"], json!("a\\.b\\+c"));
    }
}
