use serde::{Deserialize, Serialize};
use surrealdb::{RecordId, sql::Datetime};

use crate::rating::Rating;
use crate::types::{BookId, Email, UserId};

pub const USER_TABLE: &str = "user";
pub const BOOK_TABLE: &str = "book";

/// Persisted user credentials (table: `user`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Database identifier (`user:⟨key⟩`)
    pub id: RecordId,
    /// Public identifier carried in tokens
    pub key: UserId,
    /// Normalized email, unique across the table
    pub email: Email,
    /// Argon2 PHC string
    pub password_hash: String,
    pub created_at: Option<Datetime>,
}

/// Payload used when inserting a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub key: UserId,
    pub email: Email,
    pub password_hash: String,
}

/// Persisted book document (table: `book`).
///
/// `ratings` are owned by the book and have no identity of their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookRecord {
    /// Database identifier (`book:⟨key⟩`)
    pub id: RecordId,
    /// Public identifier used on the wire
    pub key: BookId,
    pub title: String,
    pub author: String,
    /// Fully-qualified URL of the stored cover image
    pub image_url: String,
    pub year: i64,
    pub genre: String,
    #[serde(default)]
    pub ratings: Vec<Rating>,
    #[serde(default)]
    pub average_rating: f64,
    /// User that created the book
    pub owner_id: UserId,
    /// Bumped on every write; used for compare-and-swap updates
    #[serde(default)]
    pub version: i64,
    pub created_at: Option<Datetime>,
}

/// Payload used when inserting a new book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookCreate {
    pub key: BookId,
    pub title: String,
    pub author: String,
    pub image_url: String,
    pub year: i64,
    pub genre: String,
    pub ratings: Vec<Rating>,
    pub average_rating: f64,
    pub owner_id: UserId,
}

/// Partial update merged into an existing book. Unset fields are left alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BookChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratings: Option<Vec<Rating>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
}

impl BookRecord {
    /// Record id for a public book key.
    pub fn record_id(key: &BookId) -> RecordId {
        RecordId::from_table_key(BOOK_TABLE, key.as_str())
    }
}

impl UserRecord {
    pub fn record_id(key: &UserId) -> RecordId {
        RecordId::from_table_key(USER_TABLE, key.as_str())
    }
}
