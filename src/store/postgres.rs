// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Postgres adapters for the system of record.
//!
//! One pool, shared by the three store traits. Ids come from `BIGSERIAL`
//! (monotonic, which the read path relies on for id-descending order) and
//! timestamps from `now()` at the server, so clock skew between app
//! processes never reorders a timeline.
//!
//! The timeline join is the read path's fallback and is covered by
//! `followers(follower_id)` plus the `tweets` primary key walked backwards:
//!
//! ```sql
//! SELECT t.* FROM tweets t
//! INNER JOIN followers f ON t.user_id = f.followed_id
//! WHERE f.follower_id = $1
//! ORDER BY t.id DESC
//! LIMIT $2 OFFSET $3
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

use super::{FollowerStore, StoreError, TweetStore, UserStore};
use crate::config::StoreConfig;
use crate::model::{FollowEdge, Tweet, User};
use crate::retry::{retry, RetryPolicy};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        username VARCHAR(50) NOT NULL UNIQUE,
        email VARCHAR(255) NOT NULL UNIQUE,
        password VARCHAR(255) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tweets (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id),
        content VARCHAR(280) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS followers (
        id BIGSERIAL PRIMARY KEY,
        follower_id BIGINT NOT NULL REFERENCES users(id),
        followed_id BIGINT NOT NULL REFERENCES users(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (follower_id, followed_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tweets_id_desc ON tweets (id DESC)",
    "CREATE INDEX IF NOT EXISTS idx_followers_follower_id ON followers (follower_id)",
    "CREATE INDEX IF NOT EXISTS idx_followers_followed_id ON followers (followed_id)",
];

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect with startup-mode retry (fails fast on bad config) and ensure
    /// the schema exists.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::connect_url(&config.url()).await
    }

    /// Connect to an explicit URL. Used by tests against throwaway databases.
    pub async fn connect_url(url: &str) -> Result<Self, StoreError> {
        let pool = retry("pg_connect", &RetryPolicy::startup(), || async {
            PgPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(url)
                .await
        })
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        info!("postgres store connected");
        Ok(store)
    }

    /// Get a clone of the pool, e.g. for seeding in integration tests.
    #[must_use]
    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Ok(())
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::UniqueViolation(db.message().to_string());
        }
    }
    StoreError::Backend(err.to_string())
}

fn tweet_from_row(row: &PgRow) -> Result<Tweet, sqlx::Error> {
    Ok(Tweet {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn edge_from_row(row: &PgRow) -> Result<FollowEdge, sqlx::Error> {
    Ok(FollowEdge {
        id: row.try_get("id")?,
        follower_id: row.try_get("follower_id")?,
        followed_id: row.try_get("followed_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password: row.try_get("password")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl TweetStore for PgStore {
    async fn insert(&self, author_id: i64, content: &str) -> Result<Tweet, StoreError> {
        let row = sqlx::query(
            "INSERT INTO tweets (user_id, content) VALUES ($1, $2) \
             RETURNING id, user_id, content, created_at, updated_at",
        )
        .bind(author_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        tweet_from_row(&row).map_err(map_sqlx)
    }

    async fn by_id(&self, id: i64) -> Result<Option<Tweet>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, content, created_at, updated_at FROM tweets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.as_ref().map(tweet_from_row).transpose().map_err(map_sqlx)
    }

    async fn by_ids(&self, ids: &[i64]) -> Result<Vec<Tweet>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, user_id, content, created_at, updated_at FROM tweets WHERE id = ANY($1)",
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut by_id: HashMap<i64, Tweet> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let tweet = tweet_from_row(row).map_err(map_sqlx)?;
            by_id.insert(tweet.id, tweet);
        }

        // Re-expand in the caller's order; the ANY() result order is
        // arbitrary and the cache page order must win. Duplicated input ids
        // yield duplicated tweets, missing ids drop out.
        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }

    async fn timeline_join(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Tweet>, StoreError> {
        let rows = sqlx::query(
            "SELECT t.id, t.user_id, t.content, t.created_at, t.updated_at \
             FROM tweets t \
             INNER JOIN followers f ON t.user_id = f.followed_id \
             WHERE f.follower_id = $1 \
             ORDER BY t.id DESC \
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter().map(tweet_from_row).collect::<Result<_, _>>().map_err(map_sqlx)
    }

    async fn update_content(&self, id: i64, content: &str) -> Result<Option<Tweet>, StoreError> {
        let row = sqlx::query(
            "UPDATE tweets SET content = $1, updated_at = now() WHERE id = $2 \
             RETURNING id, user_id, content, created_at, updated_at",
        )
        .bind(content)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.as_ref().map(tweet_from_row).transpose().map_err(map_sqlx)
    }
}

#[async_trait]
impl FollowerStore for PgStore {
    async fn insert(&self, follower_id: i64, followed_id: i64) -> Result<FollowEdge, StoreError> {
        let row = sqlx::query(
            "INSERT INTO followers (follower_id, followed_id) VALUES ($1, $2) \
             RETURNING id, follower_id, followed_id, created_at",
        )
        .bind(follower_id)
        .bind(followed_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        edge_from_row(&row).map_err(map_sqlx)
    }

    async fn delete(&self, follower_id: i64, followed_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM followers WHERE follower_id = $1 AND followed_id = $2",
        )
        .bind(follower_id)
        .bind(followed_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    async fn edge(
        &self,
        follower_id: i64,
        followed_id: i64,
    ) -> Result<Option<FollowEdge>, StoreError> {
        let row = sqlx::query(
            "SELECT id, follower_id, followed_id, created_at FROM followers \
             WHERE follower_id = $1 AND followed_id = $2",
        )
        .bind(follower_id)
        .bind(followed_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.as_ref().map(edge_from_row).transpose().map_err(map_sqlx)
    }

    async fn follower_ids(&self, followed_id: i64) -> Result<Vec<i64>, StoreError> {
        let rows = sqlx::query("SELECT follower_id FROM followers WHERE followed_id = $1")
            .bind(followed_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        rows.iter()
            .map(|row| row.try_get("follower_id"))
            .collect::<Result<_, _>>()
            .map_err(map_sqlx)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, username, email, password, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.as_ref().map(user_from_row).transpose().map_err(map_sqlx)
    }

    async fn insert(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, StoreError> {
        let row = sqlx::query(
            "INSERT INTO users (username, email, password) VALUES ($1, $2, $3) \
             RETURNING id, username, email, password, created_at, updated_at",
        )
        .bind(username)
        .bind(email)
        .bind(password)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        user_from_row(&row).map_err(map_sqlx)
    }
}
