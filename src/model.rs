//! Domain records owned by the relational store.
//!
//! These are the authoritative shapes; everything the cache holds is derived
//! from them and can be rebuilt. Ids are assigned by the store on insert and
//! increase monotonically, which is what makes id-descending reads a valid
//! chronological order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A published post.
///
/// `id`, `user_id` and `created_at` are immutable once inserted; `content`
/// may be edited (edits do not re-fan-out).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: i64,
    /// Author.
    pub user_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An account. The core only consumes existence checks; full account CRUD
/// lives with the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A follow relationship: `follower_id` sees `followed_id`'s posts.
///
/// At most one edge per ordered pair; self-edges are rejected before the
/// store is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEdge {
    pub id: i64,
    pub follower_id: i64,
    pub followed_id: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_password_not_serialized() {
        let user = User {
            id: 1,
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "hashed".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["username"], "alice");
    }
}
