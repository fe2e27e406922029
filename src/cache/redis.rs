// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis adapter for timeline lists.
//!
//! Uses a multiplexed [`ConnectionManager`], so the adapter is `Clone`-cheap
//! and reconnects on its own. Single operations map 1:1 onto list commands;
//! the composites pipeline their commands so each fan-out target and each
//! repopulation costs one round trip.
//!
//! No per-operation retry here: the callers treat every cache failure as a
//! miss, and a retry loop on the read path would just move the latency
//! budget into the degraded case.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{pipe, AsyncCommands, Client};
use tracing::info;

use super::{CacheError, TimelineCache};
use crate::config::CacheConfig;
use crate::retry::{retry, RetryPolicy};

#[derive(Clone)]
pub struct RedisTimelineCache {
    connection: ConnectionManager,
}

impl RedisTimelineCache {
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::connect_url(&config.url()).await
    }

    /// Connect to an explicit URL. Used by tests against throwaway servers.
    pub async fn connect_url(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(|e| CacheError::Connection(e.to_string()))?;

        let connection = retry("redis_connect", &RetryPolicy::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| CacheError::Connection(e.to_string()))?;

        info!("redis timeline cache connected");
        Ok(Self { connection })
    }
}

fn map_redis(err: redis::RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}

#[async_trait]
impl TimelineCache for RedisTimelineCache {
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection.clone();
        conn.lrange(key, start as isize, stop as isize)
            .await
            .map_err(map_redis)
    }

    async fn lpush(&self, key: &str, values: &[String]) -> Result<(), CacheError> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        conn.lpush::<_, _, ()>(key, values).await.map_err(map_redis)
    }

    async fn rpush(&self, key: &str, values: &[String]) -> Result<(), CacheError> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        conn.rpush::<_, _, ()>(key, values).await.map_err(map_redis)
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        conn.ltrim::<_, ()>(key, start as isize, stop as isize)
            .await
            .map_err(map_redis)
    }

    async fn llen(&self, key: &str) -> Result<i64, CacheError> {
        let mut conn = self.connection.clone();
        conn.llen(key).await.map_err(map_redis)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key).await.map_err(map_redis)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        conn.expire::<_, ()>(key, ttl.as_secs() as i64)
            .await
            .map_err(map_redis)
    }

    async fn prepend_trim_expire(
        &self,
        key: &str,
        value: &str,
        max_len: i64,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        pipe()
            .lpush(key, value)
            .ltrim(key, 0, (max_len - 1) as isize)
            .expire(key, ttl.as_secs() as i64)
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_redis)
    }

    async fn replace_list(
        &self,
        key: &str,
        values: &[String],
        max_len: i64,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if values.is_empty() {
            return self.delete(key).await;
        }
        let mut conn = self.connection.clone();
        // MULTI/EXEC so a concurrent reader never observes the window
        // between the delete and the repush.
        pipe()
            .atomic()
            .del(key)
            .rpush(key, values)
            .ltrim(key, 0, (max_len - 1) as isize)
            .expire(key, ttl.as_secs() as i64)
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_redis)
    }
}
