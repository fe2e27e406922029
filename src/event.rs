// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Event envelope for the bus.
//!
//! Wire format (JSON), discriminated by `type`:
//!
//! ```json
//! {
//!   "type": "tweet.created",
//!   "timestamp": "2026-08-02T12:00:00Z",
//!   "data": {
//!     "tweet_id": 100,
//!     "user_id": 1,
//!     "content": "hello",
//!     "created_at": "2026-08-02T12:00:00Z"
//!   }
//! }
//! ```
//!
//! The envelope is a forward-compatibility seam: consumers must acknowledge
//! and drop any `type` they do not handle, so an old worker never wedges a
//! partition on a new event kind. [`Event::Unknown`] is that catch-all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::tweet_event_key;
use crate::model::Tweet;

/// A bus event, tagged by `type` on the wire.
///
/// Only `tweet.created` drives fan-out today; the other variants exist on
/// the wire and are skipped by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "tweet.created")]
    TweetCreated {
        timestamp: DateTime<Utc>,
        data: TweetCreatedData,
    },
    #[serde(rename = "tweet.updated")]
    TweetUpdated {
        timestamp: DateTime<Utc>,
        data: TweetUpdatedData,
    },
    #[serde(rename = "tweet.deleted")]
    TweetDeleted {
        timestamp: DateTime<Utc>,
        data: TweetDeletedData,
    },
    #[serde(rename = "follow.created")]
    FollowCreated {
        timestamp: DateTime<Utc>,
        data: FollowData,
    },
    #[serde(rename = "follow.deleted")]
    FollowDeleted {
        timestamp: DateTime<Utc>,
        data: FollowData,
    },
    /// Any `type` this build does not know. Acknowledge and drop.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweetCreatedData {
    pub tweet_id: i64,
    /// Author of the tweet (the fan-out source).
    pub user_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweetUpdatedData {
    pub tweet_id: i64,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweetDeletedData {
    pub tweet_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowData {
    pub follower_id: i64,
    pub followed_id: i64,
}

impl Event {
    /// Build a `tweet.created` event from a freshly persisted tweet.
    #[must_use]
    pub fn tweet_created(tweet: &Tweet) -> Self {
        Event::TweetCreated {
            timestamp: Utc::now(),
            data: TweetCreatedData {
                tweet_id: tweet.id,
                user_id: tweet.user_id,
                content: tweet.content.clone(),
                created_at: tweet.created_at,
            },
        }
    }

    /// Bus message key, `tweet-{id}` for tweet events. Follow events key on
    /// the follower so a user's edge changes stay ordered.
    #[must_use]
    pub fn key(&self) -> Option<String> {
        match self {
            Event::TweetCreated { data, .. } => Some(tweet_event_key(data.tweet_id)),
            Event::TweetUpdated { data, .. } => Some(tweet_event_key(data.tweet_id)),
            Event::TweetDeleted { data, .. } => Some(tweet_event_key(data.tweet_id)),
            Event::FollowCreated { data, .. } | Event::FollowDeleted { data, .. } => {
                Some(format!("follow-{}", data.follower_id))
            }
            Event::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_tweet() -> Tweet {
        let at = Utc.with_ymd_and_hms(2026, 8, 2, 12, 0, 0).unwrap();
        Tweet {
            id: 100,
            user_id: 1,
            content: "hello".into(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_wire_format() {
        let event = Event::tweet_created(&sample_tweet());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "tweet.created");
        assert!(json["timestamp"].is_string());
        assert_eq!(json["data"]["tweet_id"], 100);
        assert_eq!(json["data"]["user_id"], 1);
        assert_eq!(json["data"]["content"], "hello");
        assert_eq!(json["data"]["created_at"], "2026-08-02T12:00:00Z");
    }

    #[test]
    fn test_round_trip() {
        let event = Event::tweet_created(&sample_tweet());
        let bytes = serde_json::to_vec(&event).unwrap();
        let back: Event = serde_json::from_slice(&bytes).unwrap();
        match back {
            Event::TweetCreated { data, .. } => {
                assert_eq!(data.tweet_id, 100);
                assert_eq!(data.content, "hello");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_dropped_not_error() {
        let raw = r#"{"type":"tweet.boosted","timestamp":"2026-08-02T12:00:00Z","data":{"tweet_id":7}}"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(event, Event::Unknown);
        assert_eq!(event.key(), None);
    }

    #[test]
    fn test_follow_event_parses() {
        let raw = r#"{"type":"follow.created","timestamp":"2026-08-02T12:00:00Z","data":{"follower_id":2,"followed_id":1}}"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        match &event {
            Event::FollowCreated { data, .. } => assert_eq!(data.follower_id, 2),
            other => panic!("unexpected variant: {:?}", other),
        }
        assert_eq!(event.key().unwrap(), "follow-2");
    }

    #[test]
    fn test_event_key() {
        let event = Event::tweet_created(&sample_tweet());
        assert_eq!(event.key().unwrap(), "tweet-100");
    }
}
