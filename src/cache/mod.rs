//! Per-user timeline lists.
//!
//! Every key is an ordered list of tweet ids, newest first, bounded and
//! expiring. All of it is derived state: a deleted or expired key costs one
//! store fallback, never correctness. Callers treat every error here as a
//! cache miss.
//!
//! An absent key reads as an empty list (not an error), matching the backing
//! store's list semantics. The two composite operations exist so the hot
//! paths pay one round trip per key instead of three.

pub mod memory;
pub mod redis;

pub use self::memory::MemoryTimelineCache;
pub use self::redis::RedisTimelineCache;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache connection error: {0}")]
    Connection(String),
}

#[async_trait]
pub trait TimelineCache: Send + Sync {
    /// Inclusive zero-based range; negative indexes count from the tail.
    /// Empty if the key is absent.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, CacheError>;

    /// Prepend values one by one, so the last value ends up at the head, as
    /// with a multi-value LPUSH. Creates the key if absent.
    async fn lpush(&self, key: &str, values: &[String]) -> Result<(), CacheError>;

    /// Append values in order. Creates the key if absent.
    async fn rpush(&self, key: &str, values: &[String]) -> Result<(), CacheError>;

    /// Retain only `[start, stop]`; trimming to empty may remove the key.
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), CacheError>;

    /// List length; 0 if the key is absent.
    async fn llen(&self, key: &str) -> Result<i64, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Reset the TTL from now. No-op on an absent key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Fan-out composite: LPUSH + LTRIM(0, max_len-1) + EXPIRE as a single
    /// round trip, so a crash cannot land between the prepend and its trim.
    async fn prepend_trim_expire(
        &self,
        key: &str,
        value: &str,
        max_len: i64,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Repopulation composite: DEL + RPUSH(values…) + LTRIM + EXPIRE in one
    /// round trip, preserving the given (newest-first) order.
    async fn replace_list(
        &self,
        key: &str,
        values: &[String],
        max_len: i64,
        ttl: Duration,
    ) -> Result<(), CacheError>;
}
