//! The write path.
//!
//! [`TweetService::create_tweet`] owns the durability order that the rest of
//! the system leans on: the row is committed first, the event is published
//! after, never the other way around. The publish runs on a detached task
//! with its own retry budget, so the caller's latency (and the caller's
//! cancellation) never touches it. If the publish ultimately fails the tweet
//! is still durable; followers pick it up through the read path's store
//! fallback instead of fan-out.
//!
//! [`FollowService`] maintains the edges the fan-out resolves. Its
//! validation is what keeps the distributor simple: no self-edges, no
//! duplicate edges, both endpoints exist.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::bus::EventPublisher;
use crate::config::{tweet_event_key, MAX_CONTENT_BYTES, TOPIC_TWEETS};
use crate::error::Error;
use crate::event::Event;
use crate::metrics;
use crate::model::{FollowEdge, Tweet};
use crate::retry::{retry, RetryPolicy};
use crate::store::{FollowerStore, TweetStore, UserStore};

pub struct TweetService {
    tweets: Arc<dyn TweetStore>,
    users: Arc<dyn UserStore>,
    bus: Arc<dyn EventPublisher>,
}

impl TweetService {
    pub fn new(
        tweets: Arc<dyn TweetStore>,
        users: Arc<dyn UserStore>,
        bus: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { tweets, users, bus }
    }

    /// Persist a new tweet and schedule its fan-out event.
    ///
    /// Returns once the row is durable; the `tweet.created` publish happens
    /// on a detached task so bus latency stays off the response path.
    #[tracing::instrument(skip(self, content), fields(tweet_id))]
    pub async fn create_tweet(&self, author_id: i64, content: &str) -> Result<Tweet, Error> {
        let _timer = metrics::LatencyTimer::new("publisher", "create");

        validate_content(content)?;
        if self.users.by_id(author_id).await?.is_none() {
            return Err(Error::NotFound("user"));
        }

        let tweet = self.tweets.insert(author_id, content).await?;
        tracing::Span::current().record("tweet_id", tweet.id);
        debug!(tweet_id = tweet.id, "tweet persisted");

        // Detached on purpose: the row is committed, so the caller is done.
        // The task keeps its own retry budget and outlives the request.
        let bus = self.bus.clone();
        let event = Event::tweet_created(&tweet);
        let key = tweet_event_key(tweet.id);
        tokio::spawn(async move {
            let published = retry("publish_tweet_created", &RetryPolicy::publish(), || {
                bus.publish(TOPIC_TWEETS, &key, &event)
            })
            .await;

            match published {
                Ok(()) => metrics::record_publish("success"),
                Err(e) => {
                    // Tweet stays visible via the store; followers get it on
                    // the first cold read instead of via fan-out.
                    warn!(key = %key, error = %e, "tweet.created publish failed after retries");
                    metrics::record_publish("error");
                }
            }
        });

        metrics::record_operation("publisher", "create", "success");
        Ok(tweet)
    }

    /// Resolve a tweet by id.
    pub async fn get_tweet(&self, id: i64) -> Result<Tweet, Error> {
        self.tweets.by_id(id).await?.ok_or(Error::NotFound("tweet"))
    }

    /// Edit a tweet's content. Edits never re-fan-out: cached timelines hold
    /// ids only, and reads hydrate bodies from the store.
    #[tracing::instrument(skip(self, content))]
    pub async fn update_tweet(&self, id: i64, content: &str) -> Result<Tweet, Error> {
        validate_content(content)?;
        self.tweets
            .update_content(id, content)
            .await?
            .ok_or(Error::NotFound("tweet"))
    }
}

fn validate_content(content: &str) -> Result<(), Error> {
    if content.is_empty() {
        return Err(Error::InvalidInput("content cannot be empty".into()));
    }
    if content.len() > MAX_CONTENT_BYTES {
        return Err(Error::InvalidInput(format!(
            "content cannot exceed {} bytes",
            MAX_CONTENT_BYTES
        )));
    }
    Ok(())
}

pub struct FollowService {
    followers: Arc<dyn FollowerStore>,
    users: Arc<dyn UserStore>,
}

impl FollowService {
    pub fn new(followers: Arc<dyn FollowerStore>, users: Arc<dyn UserStore>) -> Self {
        Self { followers, users }
    }

    /// Create a follow edge `follower -> followed`.
    #[tracing::instrument(skip(self))]
    pub async fn follow(&self, follower_id: i64, followed_id: i64) -> Result<FollowEdge, Error> {
        if follower_id == followed_id {
            return Err(Error::InvalidInput("cannot follow yourself".into()));
        }
        self.require_user(follower_id).await?;
        self.require_user(followed_id).await?;

        if self.followers.edge(follower_id, followed_id).await?.is_some() {
            return Err(Error::Conflict("already following this user".into()));
        }

        // A racing duplicate insert loses on the unique constraint, which
        // maps to the same Conflict as the check above.
        let edge = self.followers.insert(follower_id, followed_id).await?;
        metrics::record_operation("publisher", "follow", "success");
        Ok(edge)
    }

    /// Remove a follow edge. The follower's cached timeline is left alone;
    /// stale entries age out via TTL or the next repopulation.
    #[tracing::instrument(skip(self))]
    pub async fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<(), Error> {
        if follower_id == followed_id {
            return Err(Error::InvalidInput("invalid unfollow".into()));
        }
        self.require_user(follower_id).await?;
        self.require_user(followed_id).await?;

        if !self.followers.delete(follower_id, followed_id).await? {
            return Err(Error::NotFound("follow relationship"));
        }
        metrics::record_operation("publisher", "unfollow", "success");
        Ok(())
    }

    async fn require_user(&self, id: i64) -> Result<(), Error> {
        match self.users.by_id(id).await? {
            Some(_) => Ok(()),
            None => Err(Error::NotFound("user")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::bus::MemoryBus;
    use crate::store::MemoryStore;

    fn services() -> (Arc<MemoryStore>, Arc<MemoryBus>, TweetService, FollowService) {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryBus::new());
        let tweets = TweetService::new(store.clone(), store.clone(), bus.clone());
        let follows = FollowService::new(store.clone(), store.clone());
        (store, bus, tweets, follows)
    }

    /// The publish runs on a detached task; poll briefly instead of sleeping
    /// a fixed (flaky) amount.
    async fn wait_for_messages(bus: &MemoryBus, topic: &str, want: usize) {
        for _ in 0..100 {
            if bus.message_count(topic) >= want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("expected {} messages on {}", want, topic);
    }

    #[tokio::test]
    async fn test_create_tweet_persists_and_publishes() {
        let (store, bus, tweets, _) = services();
        store.seed_user(1, "alice");

        let tweet = tweets.create_tweet(1, "hello").await.unwrap();
        assert_eq!(tweet.user_id, 1);
        assert!(tweet.id > 0);

        wait_for_messages(&bus, TOPIC_TWEETS, 1).await;
        let (key, payload) = bus.messages(TOPIC_TWEETS).remove(0);
        assert_eq!(key, format!("tweet-{}", tweet.id));

        let event: Event = serde_json::from_slice(&payload).unwrap();
        match event {
            Event::TweetCreated { data, .. } => {
                assert_eq!(data.tweet_id, tweet.id);
                assert_eq!(data.user_id, 1);
                assert_eq!(data.content, "hello");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_tweet_rejects_empty_content() {
        let (store, bus, tweets, _) = services();
        store.seed_user(1, "alice");

        let err = tweets.create_tweet(1, "").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(bus.message_count(TOPIC_TWEETS), 0);
    }

    #[tokio::test]
    async fn test_create_tweet_rejects_oversized_content() {
        let (store, _, tweets, _) = services();
        store.seed_user(1, "alice");

        let long = "x".repeat(MAX_CONTENT_BYTES + 1);
        let err = tweets.create_tweet(1, &long).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        // Exactly at the cap is fine.
        let exact = "x".repeat(MAX_CONTENT_BYTES);
        assert!(tweets.create_tweet(1, &exact).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_tweet_unknown_author() {
        let (_, bus, tweets, _) = services();
        let err = tweets.create_tweet(99, "hello").await.unwrap_err();
        assert!(matches!(err, Error::NotFound("user")));
        assert_eq!(bus.message_count(TOPIC_TWEETS), 0);
    }

    #[tokio::test]
    async fn test_update_tweet_does_not_republish() {
        let (store, bus, tweets, _) = services();
        store.seed_user(1, "alice");

        let tweet = tweets.create_tweet(1, "v1").await.unwrap();
        wait_for_messages(&bus, TOPIC_TWEETS, 1).await;

        let updated = tweets.update_tweet(tweet.id, "v2").await.unwrap();
        assert_eq!(updated.content, "v2");

        // Give a would-be stray publish a moment, then assert none arrived.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bus.message_count(TOPIC_TWEETS), 1);
    }

    #[tokio::test]
    async fn test_update_missing_tweet() {
        let (_, _, tweets, _) = services();
        let err = tweets.update_tweet(404, "new").await.unwrap_err();
        assert!(matches!(err, Error::NotFound("tweet")));
    }

    #[tokio::test]
    async fn test_follow_rejects_self() {
        let (store, _, _, follows) = services();
        store.seed_user(1, "alice");
        let err = follows.follow(1, 1).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_follow_requires_both_users() {
        let (store, _, _, follows) = services();
        store.seed_user(1, "alice");
        let err = follows.follow(1, 2).await.unwrap_err();
        assert!(matches!(err, Error::NotFound("user")));
    }

    #[tokio::test]
    async fn test_follow_duplicate_is_conflict() {
        let (store, _, _, follows) = services();
        store.seed_user(1, "alice");
        store.seed_user(2, "bob");

        follows.follow(2, 1).await.unwrap();
        let err = follows.follow(2, 1).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unfollow_missing_edge() {
        let (store, _, _, follows) = services();
        store.seed_user(1, "alice");
        store.seed_user(2, "bob");

        let err = follows.unfollow(2, 1).await.unwrap_err();
        assert!(matches!(err, Error::NotFound("follow relationship")));
    }

    #[tokio::test]
    async fn test_follow_then_unfollow() {
        let (store, _, _, follows) = services();
        store.seed_user(1, "alice");
        store.seed_user(2, "bob");

        let edge = follows.follow(2, 1).await.unwrap();
        assert_eq!(edge.follower_id, 2);
        assert_eq!(edge.followed_id, 1);
        follows.unfollow(2, 1).await.unwrap();
    }
}
