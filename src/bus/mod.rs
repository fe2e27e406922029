//! The event pipeline between the write path and the fan-out worker.
//!
//! Contract with the backing log:
//! - at-least-once delivery: an entry survives until a consumer acknowledges
//!   it, and unacknowledged entries are redelivered after a restart;
//! - messages published with the same key are observed in publish order;
//! - acknowledgement is under handler control: the consumer acks only when
//!   [`EventHandler::handle`] returns `Ok`.
//!
//! That last point carries the whole failure model: a handler that cannot
//! reach the store returns `Err` and the message comes back; a handler that
//! merely failed some cache writes returns `Ok`, because redelivery would
//! duplicate ids in the timelines it already updated.

pub mod memory;
pub mod redis;

pub use self::memory::MemoryBus;
pub use self::redis::RedisStreamBus;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use crate::error::Error;
use crate::event::Event;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus backend error: {0}")]
    Backend(String),
    #[error("bus connection error: {0}")]
    Connection(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Serialize and append `event` to `topic` under `key`.
    async fn publish(&self, topic: &str, key: &str, event: &Event) -> Result<(), BusError>;
}

/// Processes one raw message. `Ok` acknowledges; `Err` leaves the message
/// for redelivery.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, key: &str, payload: &[u8]) -> Result<(), Error>;
}

#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// Consume `topic` as a member of the configured group until `shutdown`
    /// flips to `true`. Messages within the subscription are processed
    /// sequentially; in-flight handlers finish before the loop exits.
    async fn run(
        &self,
        topic: &str,
        handler: Arc<dyn EventHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), BusError>;
}
