//! In-process bus fake for unit tests.
//!
//! An append-only log per topic with per-entry ack flags, mirroring the
//! streams adapter's semantics: entries are attempted once per [`run`] call,
//! acked only when the handler succeeds, and a fresh `run` re-attempts
//! whatever is still unacked (the "restart drain").
//!
//! [`run`]: crate::bus::EventConsumer::run

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};

use super::{BusError, EventConsumer, EventHandler, EventPublisher};
use crate::event::Event;

#[derive(Clone)]
struct StoredMessage {
    key: String,
    payload: Vec<u8>,
    acked: bool,
}

#[derive(Default)]
pub struct MemoryBus {
    topics: Mutex<HashMap<String, Vec<StoredMessage>>>,
    notify: Notify,
}

impl MemoryBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw payload, bypassing serialization. Lets tests feed the
    /// consumer malformed bytes.
    pub fn publish_raw(&self, topic: &str, key: &str, payload: Vec<u8>) {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(StoredMessage {
                key: key.to_string(),
                payload,
                acked: false,
            });
        self.notify.notify_one();
    }

    /// Total entries ever published to a topic.
    #[must_use]
    pub fn message_count(&self, topic: &str) -> usize {
        self.topics.lock().get(topic).map_or(0, |m| m.len())
    }

    /// Entries not yet acknowledged.
    #[must_use]
    pub fn unacked_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map_or(0, |m| m.iter().filter(|msg| !msg.acked).count())
    }

    /// Published `(key, payload)` pairs, in order.
    #[must_use]
    pub fn messages(&self, topic: &str) -> Vec<(String, Vec<u8>)> {
        self.topics.lock().get(topic).map_or_else(Vec::new, |m| {
            m.iter().map(|msg| (msg.key.clone(), msg.payload.clone())).collect()
        })
    }

    /// Next unacked entry at or after `cursor`, as `(index, key, payload)`.
    fn next_pending(&self, topic: &str, cursor: usize) -> Option<(usize, String, Vec<u8>)> {
        let topics = self.topics.lock();
        let messages = topics.get(topic)?;
        messages
            .iter()
            .enumerate()
            .skip(cursor)
            .find(|(_, msg)| !msg.acked)
            .map(|(i, msg)| (i, msg.key.clone(), msg.payload.clone()))
    }

    fn mark_acked(&self, topic: &str, index: usize) {
        if let Some(messages) = self.topics.lock().get_mut(topic) {
            if let Some(message) = messages.get_mut(index) {
                message.acked = true;
            }
        }
    }
}

#[async_trait]
impl EventPublisher for MemoryBus {
    async fn publish(&self, topic: &str, key: &str, event: &Event) -> Result<(), BusError> {
        let payload = serde_json::to_vec(event).map_err(|e| BusError::Backend(e.to_string()))?;
        self.publish_raw(topic, key, payload);
        Ok(())
    }
}

#[async_trait]
impl EventConsumer for MemoryBus {
    async fn run(
        &self,
        topic: &str,
        handler: Arc<dyn EventHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), BusError> {
        // Start from the head so unacked leftovers from a previous run are
        // re-attempted, like the streams pending drain.
        let mut cursor = 0usize;

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            match self.next_pending(topic, cursor) {
                Some((index, key, payload)) => {
                    if handler.handle(&key, &payload).await.is_ok() {
                        self.mark_acked(topic, index);
                    }
                    // Failed entries stay pending but are not re-attempted
                    // until the next run, mirroring XREADGROUP `>` reads.
                    cursor = index + 1;
                }
                None => {
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                return Ok(());
                            }
                        }
                        _ = self.notify.notified() => {}
                    }
                }
            }
        }
    }
}
