// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis Streams adapter for the event pipeline.
//!
//! A topic is one stream, so publish order is observation order and the
//! per-key ordering requirement holds for free. Consumer groups carry the
//! delivery state: `XREADGROUP` hands an entry to exactly one member and
//! records it pending; `XACK` is the offset commit, issued only after the
//! handler succeeds. Entries left pending by a crash are drained (id `0`)
//! before the consumer resumes live reads, which is what makes delivery
//! at-least-once across restarts.
//!
//! ```text
//! XADD tweets MAXLEN ~ 100000 * key tweet-100 payload {...}
//! XGROUP CREATE tweets timeline-fanout 0 MKSTREAM
//! XREADGROUP GROUP timeline-fanout worker-1 COUNT 16 BLOCK 5000 STREAMS tweets >
//! XACK tweets timeline-fanout 1718900000000-0
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamMaxlen, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{BusError, EventConsumer, EventHandler, EventPublisher};
use crate::config::BusConfig;
use crate::event::Event;
use crate::retry::{retry, RetryPolicy};

/// Approximate stream length cap; old entries are evicted once every group
/// has long since consumed them.
const STREAM_MAXLEN: usize = 100_000;

/// Entries fetched per read.
const READ_COUNT: usize = 16;

/// Block time per read; bounds shutdown latency.
const BLOCK_MS: usize = 5_000;

#[derive(Clone)]
pub struct RedisStreamBus {
    connection: ConnectionManager,
    group: String,
    consumer: String,
}

impl RedisStreamBus {
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        Self::connect_url(config.broker(), &config.group_id, &config.consumer_name).await
    }

    /// Connect to an explicit broker URL. Used by tests.
    pub async fn connect_url(url: &str, group: &str, consumer: &str) -> Result<Self, BusError> {
        let client = Client::open(url).map_err(|e| BusError::Connection(e.to_string()))?;

        let connection = retry("bus_connect", &RetryPolicy::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| BusError::Connection(e.to_string()))?;

        info!(group, consumer, "event bus connected");
        Ok(Self {
            connection,
            group: group.to_string(),
            consumer: consumer.to_string(),
        })
    }

    /// Create the consumer group at the stream head, creating the stream if
    /// needed. Racing creators are fine: BUSYGROUP means someone won.
    async fn ensure_group(&self, topic: &str) -> Result<(), BusError> {
        let mut conn = self.connection.clone();
        let created: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(topic)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(()) => {
                info!(topic, group = %self.group, "consumer group created");
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(BusError::Backend(e.to_string())),
        }
    }

    /// Read a batch for this consumer. `live` reads new entries (`>`) with a
    /// bounded block; otherwise reads this consumer's pending entries (`0`),
    /// which is the restart-recovery path.
    async fn read_batch(&self, topic: &str, live: bool) -> Result<StreamReadReply, BusError> {
        let conn = self.connection.clone();
        let group = self.group.clone();
        let consumer = self.consumer.clone();
        let id = if live { ">" } else { "0" };

        retry("bus_read", &RetryPolicy::forever(), || {
            let mut conn = conn.clone();
            let group = group.clone();
            let consumer = consumer.clone();
            async move {
                let mut opts = StreamReadOptions::default()
                    .group(&group, &consumer)
                    .count(READ_COUNT);
                if live {
                    opts = opts.block(BLOCK_MS);
                }
                let reply: StreamReadReply =
                    conn.xread_options(&[topic], &[id], &opts).await?;
                Ok::<_, redis::RedisError>(reply)
            }
        })
        .await
        .map_err(|e| BusError::Backend(e.to_string()))
    }

    async fn ack(&self, topic: &str, entry_id: &str) -> Result<(), BusError> {
        let mut conn = self.connection.clone();
        conn.xack::<_, _, _, i64>(topic, &self.group, &[entry_id])
            .await
            .map(|_| ())
            .map_err(|e| BusError::Backend(e.to_string()))
    }

    /// Hand one entry to the handler; ack on success or on a payload the
    /// handler deemed permanently unprocessable. Returns whether it acked.
    async fn dispatch(
        &self,
        topic: &str,
        entry: &StreamId,
        handler: &Arc<dyn EventHandler>,
    ) -> Result<bool, BusError> {
        let key: String = entry.get("key").unwrap_or_default();
        let payload: Vec<u8> = match entry.get("payload") {
            Some(payload) => payload,
            None => {
                warn!(entry_id = %entry.id, "stream entry without payload, dropping");
                self.ack(topic, &entry.id).await?;
                return Ok(true);
            }
        };

        match handler.handle(&key, &payload).await {
            Ok(()) => {
                self.ack(topic, &entry.id).await?;
                Ok(true)
            }
            Err(e) => {
                warn!(
                    entry_id = %entry.id,
                    key = %key,
                    error = %e,
                    "handler failed, leaving entry pending for redelivery"
                );
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl EventPublisher for RedisStreamBus {
    async fn publish(&self, topic: &str, key: &str, event: &Event) -> Result<(), BusError> {
        let payload = serde_json::to_vec(event).map_err(|e| BusError::Backend(e.to_string()))?;

        let mut conn = self.connection.clone();
        conn.xadd_maxlen::<_, _, _, _, String>(
            topic,
            StreamMaxlen::Approx(STREAM_MAXLEN),
            "*",
            &[("key", key.as_bytes()), ("payload", payload.as_slice())],
        )
        .await
        .map(|entry_id| debug!(topic, key, entry_id = %entry_id, "event published"))
        .map_err(|e| BusError::Backend(e.to_string()))
    }
}

#[async_trait]
impl EventConsumer for RedisStreamBus {
    async fn run(
        &self,
        topic: &str,
        handler: Arc<dyn EventHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), BusError> {
        self.ensure_group(topic).await?;

        // Drain entries a previous incarnation read but never acked.
        loop {
            let reply = self.read_batch(topic, false).await?;
            let entries: Vec<&StreamId> = reply.keys.iter().flat_map(|k| k.ids.iter()).collect();
            if entries.is_empty() {
                break;
            }
            info!(count = entries.len(), "re-processing pending entries");
            for entry in entries {
                self.dispatch(topic, entry, &handler).await?;
            }
        }

        info!(topic, group = %self.group, consumer = %self.consumer, "consumer loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let reply = tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender means the worker is gone; stop too.
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                reply = self.read_batch(topic, true) => reply?,
            };

            // Handlers run to completion even if shutdown flips mid-batch;
            // only the next read observes it.
            for stream_key in &reply.keys {
                for entry in &stream_key.ids {
                    self.dispatch(topic, entry, &handler).await?;
                }
            }
        }

        info!(topic, "consumer loop stopped");
        Ok(())
    }
}
