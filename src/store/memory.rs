//! In-memory store fake for unit tests.
//!
//! Mirrors the Postgres adapter's observable behavior: monotonically
//! assigned ids, `None` for absent rows, unique-violation on duplicate
//! edges/usernames, id-descending timeline join. `set_failing(true)` makes
//! every call return a backend error, for exercising outage paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{FollowerStore, StoreError, TweetStore, UserStore};
use crate::model::{FollowEdge, Tweet, User};

#[derive(Default)]
pub struct MemoryStore {
    tweets: Mutex<BTreeMap<i64, Tweet>>,
    users: Mutex<BTreeMap<i64, User>>,
    edges: Mutex<Vec<FollowEdge>>,
    next_id: AtomicI64,
    failing: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    /// Make every subsequent call fail, simulating a store outage.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Seed a user and return it. Panics on duplicates; tests seed first.
    pub fn seed_user(&self, id: i64, username: &str) -> User {
        let now = Utc::now();
        let user = User {
            id,
            username: username.into(),
            email: format!("{}@example.com", username),
            password: "x".into(),
            created_at: now,
            updated_at: now,
        };
        let previous = self.users.lock().insert(id, user.clone());
        assert!(previous.is_none(), "user {} already seeded", id);
        self.bump_next_id(id);
        user
    }

    /// Seed a tweet with an explicit id (ids stay monotonic afterwards).
    pub fn seed_tweet(&self, id: i64, author_id: i64, content: &str) -> Tweet {
        let now = Utc::now();
        let tweet = Tweet {
            id,
            user_id: author_id,
            content: content.into(),
            created_at: now,
            updated_at: now,
        };
        self.tweets.lock().insert(id, tweet.clone());
        self.bump_next_id(id);
        tweet
    }

    /// Seed a follow edge without the service-layer validation.
    pub fn seed_edge(&self, follower_id: i64, followed_id: i64) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.edges.lock().push(FollowEdge {
            id,
            follower_id,
            followed_id,
            created_at: Utc::now(),
        });
    }

    fn bump_next_id(&self, seen: i64) {
        self.next_id.fetch_max(seen + 1, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Backend("simulated store outage".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TweetStore for MemoryStore {
    async fn insert(&self, author_id: i64, content: &str) -> Result<Tweet, StoreError> {
        self.check()?;
        let now = Utc::now();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let tweet = Tweet {
            id,
            user_id: author_id,
            content: content.into(),
            created_at: now,
            updated_at: now,
        };
        self.tweets.lock().insert(id, tweet.clone());
        Ok(tweet)
    }

    async fn by_id(&self, id: i64) -> Result<Option<Tweet>, StoreError> {
        self.check()?;
        Ok(self.tweets.lock().get(&id).cloned())
    }

    async fn by_ids(&self, ids: &[i64]) -> Result<Vec<Tweet>, StoreError> {
        self.check()?;
        let tweets = self.tweets.lock();
        Ok(ids.iter().filter_map(|id| tweets.get(id).cloned()).collect())
    }

    async fn timeline_join(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Tweet>, StoreError> {
        self.check()?;
        let followed: Vec<i64> = self
            .edges
            .lock()
            .iter()
            .filter(|e| e.follower_id == user_id)
            .map(|e| e.followed_id)
            .collect();

        let tweets = self.tweets.lock();
        Ok(tweets
            .values()
            .rev() // BTreeMap ascending by id, reversed = id DESC
            .filter(|t| followed.contains(&t.user_id))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn update_content(&self, id: i64, content: &str) -> Result<Option<Tweet>, StoreError> {
        self.check()?;
        let mut tweets = self.tweets.lock();
        Ok(tweets.get_mut(&id).map(|tweet| {
            tweet.content = content.into();
            tweet.updated_at = Utc::now();
            tweet.clone()
        }))
    }
}

#[async_trait]
impl FollowerStore for MemoryStore {
    async fn insert(&self, follower_id: i64, followed_id: i64) -> Result<FollowEdge, StoreError> {
        self.check()?;
        let mut edges = self.edges.lock();
        if edges
            .iter()
            .any(|e| e.follower_id == follower_id && e.followed_id == followed_id)
        {
            return Err(StoreError::UniqueViolation(format!(
                "edge ({}, {}) exists",
                follower_id, followed_id
            )));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let edge = FollowEdge {
            id,
            follower_id,
            followed_id,
            created_at: Utc::now(),
        };
        edges.push(edge.clone());
        Ok(edge)
    }

    async fn delete(&self, follower_id: i64, followed_id: i64) -> Result<bool, StoreError> {
        self.check()?;
        let mut edges = self.edges.lock();
        let before = edges.len();
        edges.retain(|e| !(e.follower_id == follower_id && e.followed_id == followed_id));
        Ok(edges.len() < before)
    }

    async fn edge(
        &self,
        follower_id: i64,
        followed_id: i64,
    ) -> Result<Option<FollowEdge>, StoreError> {
        self.check()?;
        Ok(self
            .edges
            .lock()
            .iter()
            .find(|e| e.follower_id == follower_id && e.followed_id == followed_id)
            .cloned())
    }

    async fn follower_ids(&self, followed_id: i64) -> Result<Vec<i64>, StoreError> {
        self.check()?;
        Ok(self
            .edges
            .lock()
            .iter()
            .filter(|e| e.followed_id == followed_id)
            .map(|e| e.follower_id)
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.check()?;
        Ok(self.users.lock().get(&id).cloned())
    }

    async fn insert(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, StoreError> {
        self.check()?;
        let mut users = self.users.lock();
        if users.values().any(|u| u.username == username || u.email == email) {
            return Err(StoreError::UniqueViolation(format!(
                "user {} exists",
                username
            )));
        }
        let now = Utc::now();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let user = User {
            id,
            username: username.into(),
            email: email.into(),
            password: password.into(),
            created_at: now,
            updated_at: now,
        };
        users.insert(id, user.clone());
        Ok(user)
    }
}
