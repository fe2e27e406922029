//! The read path.
//!
//! A timeline page is served from the user's cached id list when the list
//! can cover the whole page, and from the store join otherwise. The cache is
//! only ever an ordering authority: bodies are always hydrated from the
//! store, so edits show up without any cache invalidation.
//!
//! A partial cache result is treated as a full miss. Distinguishing "the
//! list genuinely ends here" from "the tail was trimmed or expired" isn't
//! possible from the list alone, and the join answers both correctly.
//!
//! Only first pages are written back on a miss. Deep pages are rare and
//! long; caching them would churn the lists without moving the hit rate.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::TimelineCache;
use crate::config::{
    timeline_cache_key, CACHE_EXPIRATION, DEFAULT_LIMIT, MAX_CACHED_TWEETS, MAX_LIMIT,
};
use crate::error::Error;
use crate::metrics;
use crate::model::Tweet;
use crate::store::TweetStore;

pub struct TimelineService {
    tweets: Arc<dyn TweetStore>,
    cache: Arc<dyn TimelineCache>,
}

impl TimelineService {
    pub fn new(tweets: Arc<dyn TweetStore>, cache: Arc<dyn TimelineCache>) -> Self {
        Self { tweets, cache }
    }

    /// Fetch one page of a user's timeline, newest first.
    ///
    /// `limit` and `offset` are clamped, never rejected. Cache trouble of
    /// any kind downgrades to the store join; only a store failure surfaces.
    #[tracing::instrument(skip(self, limit, offset), fields(limit, offset, source))]
    pub async fn get_timeline(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Tweet>, Error> {
        let _timer = metrics::LatencyTimer::new("materializer", "get_timeline");

        let (limit, offset) = clamp_page(limit, offset);
        tracing::Span::current().record("limit", limit);
        tracing::Span::current().record("offset", offset);

        // Full hit: the cache covers the page, hydrate bodies by id. The
        // list's order wins over anything the store would sort.
        let ids = self.cached_ids(user_id, limit, offset).await;
        if ids.len() as i64 == limit {
            match self.tweets.by_ids(&ids).await {
                Ok(tweets) => {
                    tracing::Span::current().record("source", "cache");
                    metrics::record_timeline_read("cache");
                    return Ok(tweets);
                }
                Err(e) => {
                    // Fall through to the join rather than failing a read
                    // the join can still answer.
                    warn!(user_id, error = %e, "hydration by ids failed, falling back to join");
                }
            }
        }

        let tweets = self.tweets.timeline_join(user_id, limit, offset).await?;
        tracing::Span::current().record("source", "store");
        metrics::record_timeline_read("store");

        if offset == 0 && !tweets.is_empty() {
            self.repopulate(user_id, &tweets);
        }

        Ok(tweets)
    }

    /// Ids for the requested window, or empty on any cache problem.
    async fn cached_ids(&self, user_id: i64, limit: i64, offset: i64) -> Vec<i64> {
        let key = timeline_cache_key(user_id);
        let raw = match self.cache.lrange(&key, offset, offset + limit - 1).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(user_id, error = %e, "timeline cache read failed, treating as miss");
                return Vec::new();
            }
        };

        // Unparsable entries are skipped, which turns a corrupt list into a
        // partial result and therefore a miss.
        raw.iter()
            .filter_map(|id| id.parse::<i64>().ok())
            .collect()
    }

    /// Rebuild the user's first page asynchronously. Fire-and-forget: the
    /// response already left, and a lost repopulation just means the next
    /// read falls through again.
    fn repopulate(&self, user_id: i64, tweets: &[Tweet]) {
        let cache = self.cache.clone();
        let key = timeline_cache_key(user_id);
        let ids: Vec<String> = tweets.iter().map(|t| t.id.to_string()).collect();

        tokio::spawn(async move {
            match cache
                .replace_list(&key, &ids, MAX_CACHED_TWEETS, CACHE_EXPIRATION)
                .await
            {
                Ok(()) => debug!(key = %key, count = ids.len(), "timeline cache repopulated"),
                Err(e) => warn!(key = %key, error = %e, "timeline cache repopulation failed"),
            }
        });
    }
}

fn clamp_page(limit: i64, offset: i64) -> (i64, i64) {
    let limit = if limit <= 0 {
        DEFAULT_LIMIT
    } else {
        limit.min(MAX_LIMIT)
    };
    (limit, offset.max(0))
}
