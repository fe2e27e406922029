//! In-memory timeline cache fake for unit tests.
//!
//! Reproduces the list semantics the core depends on: absent key reads as
//! empty, inclusive ranges with negative tail indexes, trim-to-empty removes
//! the key. TTLs are recorded (not enforced) so tests can assert refreshes.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{CacheError, TimelineCache};

#[derive(Default)]
pub struct MemoryTimelineCache {
    lists: DashMap<String, Vec<String>>,
    ttls: DashMap<String, Duration>,
    failing: AtomicBool,
}

impl MemoryTimelineCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail, simulating a cache outage.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Last TTL recorded for a key (tests assert expiry refreshes).
    #[must_use]
    pub fn recorded_ttl(&self, key: &str) -> Option<Duration> {
        self.ttls.get(key).map(|t| *t)
    }

    /// Full list contents, head first. Empty if absent.
    #[must_use]
    pub fn contents(&self, key: &str) -> Vec<String> {
        self.lists.get(key).map(|l| l.clone()).unwrap_or_default()
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::Backend("simulated cache outage".into()))
        } else {
            Ok(())
        }
    }

    /// Normalize an inclusive redis-style range against `len`.
    /// Returns `None` when the range selects nothing.
    fn normalize(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
        let len = len as i64;
        if len == 0 {
            return None;
        }
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len || stop < 0 {
            return None;
        }
        Some((start as usize, stop as usize))
    }
}

#[async_trait]
impl TimelineCache for MemoryTimelineCache {
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, CacheError> {
        self.check()?;
        let list = match self.lists.get(key) {
            Some(list) => list,
            None => return Ok(Vec::new()),
        };
        Ok(match Self::normalize(list.len(), start, stop) {
            Some((start, stop)) => list[start..=stop].to_vec(),
            None => Vec::new(),
        })
    }

    async fn lpush(&self, key: &str, values: &[String]) -> Result<(), CacheError> {
        self.check()?;
        if values.is_empty() {
            return Ok(());
        }
        let mut list = self.lists.entry(key.to_string()).or_default();
        for value in values {
            list.insert(0, value.clone());
        }
        Ok(())
    }

    async fn rpush(&self, key: &str, values: &[String]) -> Result<(), CacheError> {
        self.check()?;
        if values.is_empty() {
            return Ok(());
        }
        self.lists
            .entry(key.to_string())
            .or_default()
            .extend(values.iter().cloned());
        Ok(())
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), CacheError> {
        self.check()?;
        let remove = if let Some(mut list) = self.lists.get_mut(key) {
            match Self::normalize(list.len(), start, stop) {
                Some((start, stop)) => {
                    let kept = list[start..=stop].to_vec();
                    *list = kept;
                    false
                }
                None => true,
            }
        } else {
            return Ok(());
        };
        if remove {
            self.lists.remove(key);
            self.ttls.remove(key);
        }
        Ok(())
    }

    async fn llen(&self, key: &str) -> Result<i64, CacheError> {
        self.check()?;
        Ok(self.lists.get(key).map_or(0, |l| l.len() as i64))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check()?;
        self.lists.remove(key);
        self.ttls.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        if self.lists.contains_key(key) {
            self.ttls.insert(key.to_string(), ttl);
        }
        Ok(())
    }

    async fn prepend_trim_expire(
        &self,
        key: &str,
        value: &str,
        max_len: i64,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let values = [value.to_string()];
        self.lpush(key, &values).await?;
        self.ltrim(key, 0, max_len - 1).await?;
        self.expire(key, ttl).await
    }

    async fn replace_list(
        &self,
        key: &str,
        values: &[String],
        max_len: i64,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.delete(key).await?;
        if values.is_empty() {
            return Ok(());
        }
        self.rpush(key, values).await?;
        self.ltrim(key, 0, max_len - 1).await?;
        self.expire(key, ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_absent_key_reads_empty() {
        let cache = MemoryTimelineCache::new();
        assert!(cache.lrange("missing", 0, 9).await.unwrap().is_empty());
        assert_eq!(cache.llen("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lpush_prepends() {
        let cache = MemoryTimelineCache::new();
        cache.rpush("k", &strings(&["b", "c"])).await.unwrap();
        cache.lpush("k", &strings(&["a"])).await.unwrap();
        assert_eq!(cache.lrange("k", 0, -1).await.unwrap(), strings(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn test_lrange_inclusive_and_clamped() {
        let cache = MemoryTimelineCache::new();
        cache.rpush("k", &strings(&["0", "1", "2", "3"])).await.unwrap();
        assert_eq!(cache.lrange("k", 1, 2).await.unwrap(), strings(&["1", "2"]));
        assert_eq!(cache.lrange("k", 2, 100).await.unwrap(), strings(&["2", "3"]));
        assert!(cache.lrange("k", 10, 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ltrim_bounds_list() {
        let cache = MemoryTimelineCache::new();
        cache.rpush("k", &strings(&["0", "1", "2", "3", "4"])).await.unwrap();
        cache.ltrim("k", 0, 2).await.unwrap();
        assert_eq!(cache.lrange("k", 0, -1).await.unwrap(), strings(&["0", "1", "2"]));
    }

    #[tokio::test]
    async fn test_ltrim_to_empty_removes_key() {
        let cache = MemoryTimelineCache::new();
        cache.rpush("k", &strings(&["0"])).await.unwrap();
        cache.expire("k", Duration::from_secs(60)).await.unwrap();
        cache.ltrim("k", 5, 9).await.unwrap();
        assert_eq!(cache.llen("k").await.unwrap(), 0);
        assert!(cache.recorded_ttl("k").is_none());
    }

    #[tokio::test]
    async fn test_expire_noop_on_absent_key() {
        let cache = MemoryTimelineCache::new();
        cache.expire("ghost", Duration::from_secs(60)).await.unwrap();
        assert!(cache.recorded_ttl("ghost").is_none());
    }

    #[tokio::test]
    async fn test_prepend_trim_expire_caps_length() {
        let cache = MemoryTimelineCache::new();
        for i in 0..5 {
            cache
                .prepend_trim_expire("k", &i.to_string(), 3, Duration::from_secs(10))
                .await
                .unwrap();
        }
        assert_eq!(cache.lrange("k", 0, -1).await.unwrap(), strings(&["4", "3", "2"]));
        assert_eq!(cache.recorded_ttl("k"), Some(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_replace_list_preserves_order() {
        let cache = MemoryTimelineCache::new();
        cache.rpush("k", &strings(&["stale"])).await.unwrap();
        cache
            .replace_list("k", &strings(&["30", "20", "10"]), 1000, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(cache.lrange("k", 0, -1).await.unwrap(), strings(&["30", "20", "10"]));
        assert_eq!(cache.recorded_ttl("k"), Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let cache = MemoryTimelineCache::new();
        cache.set_failing(true);
        assert!(cache.lrange("k", 0, 1).await.is_err());
    }
}
