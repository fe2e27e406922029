//! The relational system of record.
//!
//! Everything authoritative lives behind these traits: tweets, accounts,
//! follow edges. Absent rows are `Ok(None)`, never a zero-id record, so a
//! caller cannot mistake "missing" for "id 0". The core does not retry store
//! operations; retries belong to the transport (bus redelivery on the write
//! side, client retry on the read side).

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{FollowEdge, Tweet, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store connection error: {0}")]
    Connection(String),
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
}

#[async_trait]
pub trait TweetStore: Send + Sync {
    /// Insert a tweet; the store assigns `id` and timestamps.
    async fn insert(&self, author_id: i64, content: &str) -> Result<Tweet, StoreError>;

    async fn by_id(&self, id: i64) -> Result<Option<Tweet>, StoreError>;

    /// Fetch bodies for a list of ids, preserving the caller's order.
    /// Missing ids are silently omitted; duplicated ids come back duplicated,
    /// because the cache list is the authority on what the page contains.
    async fn by_ids(&self, ids: &[i64]) -> Result<Vec<Tweet>, StoreError>;

    /// The timeline join: tweets authored by accounts `user_id` follows,
    /// newest id first, limit/offset applied. The user's own tweets are not
    /// included.
    async fn timeline_join(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Tweet>, StoreError>;

    /// Content-only edit. Returns `None` if the tweet does not exist.
    async fn update_content(&self, id: i64, content: &str) -> Result<Option<Tweet>, StoreError>;
}

#[async_trait]
pub trait FollowerStore: Send + Sync {
    async fn insert(&self, follower_id: i64, followed_id: i64) -> Result<FollowEdge, StoreError>;

    /// Returns whether an edge was actually removed.
    async fn delete(&self, follower_id: i64, followed_id: i64) -> Result<bool, StoreError>;

    async fn edge(
        &self,
        follower_id: i64,
        followed_id: i64,
    ) -> Result<Option<FollowEdge>, StoreError>;

    /// Everyone following `followed_id`, unordered. This is the fan-out set.
    async fn follower_ids(&self, followed_id: i64) -> Result<Vec<i64>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn insert(&self, username: &str, email: &str, password: &str)
        -> Result<User, StoreError>;
}
