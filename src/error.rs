//! Crate-level error taxonomy.
//!
//! Adapter errors ([`StoreError`], [`CacheError`], [`BusError`]) stay at
//! their seams; services translate them here. The policy:
//!
//! - store failures surface as [`Error::Internal`] (the caller's transport
//!   decides whether to retry),
//! - cache failures downgrade to store fallback and are logged, never
//!   surfaced on the read path,
//! - bus failures after a committed write are logged and left to redelivery
//!   or read-repair.

use thiserror::Error;

use crate::bus::BusError;
use crate::cache::CacheError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request: empty/oversized content, self-follow, bad page.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Uniqueness violation (e.g. the follow edge already exists).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Cache or bus unavailable. Degraded, not fatal.
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// Store unavailable or query failure. Fatal for the current operation.
    #[error("internal error: {0}")]
    Internal(String),

    /// Configuration could not be assembled from the environment.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl Error {
    /// Whether a bus handler should acknowledge the message despite this
    /// error. Only transient failures warrant redelivery; everything else
    /// would fail identically on the next attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::Internal(_))
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(msg) => Error::Conflict(msg),
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Self {
        Error::Transient(err.to_string())
    }
}

impl From<BusError> for Error {
    fn from(err: BusError) -> Self {
        Error::Transient(err.to_string())
    }
}
