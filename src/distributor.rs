// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The fan-out worker.
//!
//! [`Distributor`] turns one `tweet.created` event into N timeline prepends,
//! one per follower. The error split is the heart of it:
//!
//! - **store failure** (can't resolve followers) → the handler errors, the
//!   message is not acked, the bus redelivers;
//! - **cache failure** for one follower → logged and skipped; the other
//!   followers still get the tweet, and the message IS acked, because
//!   redelivery would prepend duplicate ids into every timeline that already
//!   succeeded;
//! - **undecodable payload / foreign event type** → acked and dropped, since
//!   it will never parse better on retry.
//!
//! [`FanOutWorker`] owns the consumer loop and the shutdown signal.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bus::{EventConsumer, EventHandler};
use crate::cache::TimelineCache;
use crate::config::{timeline_cache_key, CACHE_EXPIRATION, MAX_CACHED_TWEETS, TOPIC_TWEETS};
use crate::error::Error;
use crate::event::Event;
use crate::metrics;
use crate::store::FollowerStore;

pub struct Distributor {
    followers: Arc<dyn FollowerStore>,
    cache: Arc<dyn TimelineCache>,
}

impl Distributor {
    pub fn new(followers: Arc<dyn FollowerStore>, cache: Arc<dyn TimelineCache>) -> Self {
        Self { followers, cache }
    }

    /// Prepend `tweet_id` onto every follower's timeline list.
    ///
    /// Returns how many followers were actually updated. Idempotency is NOT
    /// guaranteed across calls: re-running for the same tweet duplicates its
    /// id in follower lists, which the read path tolerates.
    #[tracing::instrument(skip(self), fields(followers, delivered))]
    pub async fn fan_out(&self, author_id: i64, tweet_id: i64) -> Result<usize, Error> {
        let _timer = metrics::LatencyTimer::new("distributor", "fan_out");

        let follower_ids = self.followers.follower_ids(author_id).await?;
        tracing::Span::current().record("followers", follower_ids.len());

        if follower_ids.is_empty() {
            debug!(author_id, tweet_id, "author has no followers, nothing to fan out");
            return Ok(0);
        }

        let value = tweet_id.to_string();
        let mut delivered = 0usize;
        for follower_id in &follower_ids {
            let key = timeline_cache_key(*follower_id);
            match self
                .cache
                .prepend_trim_expire(&key, &value, MAX_CACHED_TWEETS, CACHE_EXPIRATION)
                .await
            {
                Ok(()) => delivered += 1,
                Err(e) => {
                    // This follower's list heals on their next cold read.
                    warn!(
                        follower_id,
                        tweet_id,
                        error = %e,
                        "timeline prepend failed, skipping follower"
                    );
                }
            }
        }

        tracing::Span::current().record("delivered", delivered);
        metrics::record_fanout(follower_ids.len(), delivered);
        info!(author_id, tweet_id, delivered, total = follower_ids.len(), "fan-out complete");
        Ok(delivered)
    }
}

#[async_trait]
impl EventHandler for Distributor {
    async fn handle(&self, key: &str, payload: &[u8]) -> Result<(), Error> {
        let event: Event = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                // Will never parse better on redelivery; ack and drop.
                warn!(key, error = %e, "undecodable event payload, dropping");
                metrics::record_event("undecodable", "dropped");
                return Ok(());
            }
        };

        match event {
            Event::TweetCreated { data, .. } => {
                debug!(key, tweet_id = data.tweet_id, author_id = data.user_id, "tweet.created received");
                self.fan_out(data.user_id, data.tweet_id).await?;
                metrics::record_event("tweet.created", "handled");
                Ok(())
            }
            other => {
                debug!(key, event = ?other, "event type not handled by this worker, skipping");
                metrics::record_event("other", "skipped");
                Ok(())
            }
        }
    }
}

/// The worker process: a consumer-group member pumping events into a
/// [`Distributor`], with graceful shutdown.
pub struct FanOutWorker {
    consumer: Arc<dyn EventConsumer>,
    distributor: Arc<Distributor>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl FanOutWorker {
    pub fn new(consumer: Arc<dyn EventConsumer>, distributor: Arc<Distributor>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            consumer,
            distributor,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Consume the tweets topic until [`shutdown`](Self::shutdown) is
    /// called. In-flight handlers complete before this returns, so their
    /// acknowledgements are committed.
    pub async fn run(&self) -> Result<(), Error> {
        info!(topic = TOPIC_TWEETS, "fan-out worker starting");
        self.consumer
            .run(
                TOPIC_TWEETS,
                self.distributor.clone() as Arc<dyn EventHandler>,
                self.shutdown_rx.clone(),
            )
            .await?;
        info!("fan-out worker stopped");
        Ok(())
    }

    /// Signal the run loop to stop after the current batch.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::cache::MemoryTimelineCache;
    use crate::model::Tweet;
    use crate::store::MemoryStore;

    fn distributor() -> (Arc<MemoryStore>, Arc<MemoryTimelineCache>, Distributor) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryTimelineCache::new());
        let distributor = Distributor::new(store.clone(), cache.clone());
        (store, cache, distributor)
    }

    fn created_payload(tweet_id: i64, author_id: i64) -> Vec<u8> {
        let now = Utc::now();
        let event = Event::tweet_created(&Tweet {
            id: tweet_id,
            user_id: author_id,
            content: "hello".into(),
            created_at: now,
            updated_at: now,
        });
        serde_json::to_vec(&event).unwrap()
    }

    #[tokio::test]
    async fn test_fan_out_reaches_every_follower() {
        let (store, cache, distributor) = distributor();
        store.seed_edge(2, 1);
        store.seed_edge(3, 1);

        let delivered = distributor.fan_out(1, 100).await.unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(cache.contents("timeline:user:2"), vec!["100"]);
        assert_eq!(cache.contents("timeline:user:3"), vec!["100"]);
        // Author's own timeline is untouched.
        assert!(cache.contents("timeline:user:1").is_empty());
    }

    #[tokio::test]
    async fn test_fan_out_prepends_newest_first() {
        let (store, cache, distributor) = distributor();
        store.seed_edge(2, 1);

        distributor.fan_out(1, 100).await.unwrap();
        distributor.fan_out(1, 101).await.unwrap();
        assert_eq!(cache.contents("timeline:user:2"), vec!["101", "100"]);
    }

    #[tokio::test]
    async fn test_fan_out_refreshes_ttl() {
        let (store, cache, distributor) = distributor();
        store.seed_edge(2, 1);

        distributor.fan_out(1, 100).await.unwrap();
        assert_eq!(cache.recorded_ttl("timeline:user:2"), Some(CACHE_EXPIRATION));
    }

    #[tokio::test]
    async fn test_fan_out_no_followers_is_noop() {
        let (_, cache, distributor) = distributor();
        let delivered = distributor.fan_out(1, 100).await.unwrap();
        assert_eq!(delivered, 0);
        assert!(cache.contents("timeline:user:1").is_empty());
    }

    #[tokio::test]
    async fn test_cache_outage_does_not_fail_handler() {
        let (store, cache, distributor) = distributor();
        store.seed_edge(2, 1);
        cache.set_failing(true);

        // Handler acks (Ok) even though no follower was reachable.
        let result = distributor.handle("tweet-100", &created_payload(100, 1)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_store_outage_fails_handler_for_redelivery() {
        let (store, _, distributor) = distributor();
        store.seed_edge(2, 1);
        store.set_failing(true);

        let result = distributor.handle("tweet-100", &created_payload(100, 1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_redelivery_duplicates_without_error() {
        let (store, cache, distributor) = distributor();
        store.seed_edge(2, 1);

        let payload = created_payload(100, 1);
        distributor.handle("tweet-100", &payload).await.unwrap();
        distributor.handle("tweet-100", &payload).await.unwrap();

        assert_eq!(cache.contents("timeline:user:2"), vec!["100", "100"]);
    }

    #[tokio::test]
    async fn test_unknown_event_type_is_acked() {
        let (_, cache, distributor) = distributor();
        let raw = br#"{"type":"tweet.boosted","timestamp":"2026-08-02T12:00:00Z","data":{}}"#;
        assert!(distributor.handle("tweet-1", raw).await.is_ok());
        assert!(cache.contents("timeline:user:1").is_empty());
    }

    #[tokio::test]
    async fn test_follow_event_is_skipped() {
        let (_, cache, distributor) = distributor();
        let raw = br#"{"type":"follow.created","timestamp":"2026-08-02T12:00:00Z","data":{"follower_id":2,"followed_id":1}}"#;
        assert!(distributor.handle("follow-2", raw).await.is_ok());
        assert!(cache.contents("timeline:user:2").is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_acked() {
        let (_, _, distributor) = distributor();
        assert!(distributor.handle("tweet-1", b"not json").await.is_ok());
    }

    #[tokio::test]
    async fn test_fan_out_trims_to_cap() {
        let (store, cache, distributor) = distributor();
        store.seed_edge(2, 1);

        for tweet_id in 0..(MAX_CACHED_TWEETS + 5) {
            distributor.fan_out(1, tweet_id).await.unwrap();
        }

        let contents = cache.contents("timeline:user:2");
        assert_eq!(contents.len(), MAX_CACHED_TWEETS as usize);
        // Newest at the head, oldest five evicted past the cap.
        assert_eq!(contents[0], (MAX_CACHED_TWEETS + 4).to_string());
    }

    #[tokio::test]
    async fn test_worker_processes_bus_messages() {
        use crate::bus::{EventPublisher, MemoryBus};

        let (store, cache, distributor) = distributor();
        store.seed_edge(2, 1);

        let bus = Arc::new(MemoryBus::new());
        let now = Utc::now();
        let tweet = Tweet {
            id: 100,
            user_id: 1,
            content: "hello".into(),
            created_at: now,
            updated_at: now,
        };
        bus.publish(TOPIC_TWEETS, "tweet-100", &Event::tweet_created(&tweet))
            .await
            .unwrap();

        let worker = Arc::new(FanOutWorker::new(bus, Arc::new(distributor)));
        let runner = worker.clone();
        let join = tokio::spawn(async move { runner.run().await });

        // Poll until the fan-out lands, then stop the loop.
        for _ in 0..100 {
            if !cache.contents("timeline:user:2").is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        worker.shutdown();
        join.await.unwrap().unwrap();

        assert_eq!(cache.contents("timeline:user:2"), vec!["100"]);
    }
}
