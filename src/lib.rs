//! # Timeline Engine
//!
//! A fan-out-on-write timeline materialization engine for a micro-blogging
//! backend. Reads dwarf writes, so the expensive work happens at publish
//! time: every new post is distributed into the cached timelines of the
//! author's followers, and the read path becomes a cheap list lookup.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Write Path (Publisher)                   │
//! │  • Validates and persists the tweet (Postgres = truth)      │
//! │  • Publishes tweet.created AFTER commit, off the hot path   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   (event bus, at-least-once)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Fan-Out Worker (Distributor)               │
//! │  • Consumer group member, acks only after the handler       │
//! │  • One pipelined LPUSH+LTRIM+EXPIRE per follower timeline   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                    (per-user Redis lists)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Read Path (Materializer)                  │
//! │  • LRANGE + hydrate bodies from Postgres on a full hit      │
//! │  • Indexed join fallback on miss, first page repopulated    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cache is derived state: any entry may vanish at any time and the read
//! path heals by falling through to the store. Nothing cached is ever
//! authoritative for tweet content, only for first-page ordering.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use timeline_engine::{ApiContainer, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), timeline_engine::Error> {
//!     let config = Config::from_env()?;
//!     let app = ApiContainer::connect(&config).await?;
//!
//!     let tweet = app.tweets.create_tweet(1, "hello").await?;
//!     let page = app.timeline.get_timeline(2, 20, 0).await?;
//!     println!("created {} / timeline has {} tweets", tweet.id, page.len());
//!     Ok(())
//! }
//! ```
//!
//! The worker process is the other half:
//!
//! ```rust,no_run
//! use timeline_engine::{Config, WorkerContainer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), timeline_engine::Error> {
//!     let config = Config::from_env()?;
//!     let worker = WorkerContainer::connect(&config).await?;
//!     worker.run_until_signalled().await
//! }
//! ```
//!
//! ## Delivery semantics
//!
//! - **At-least-once**: an event is acknowledged only after the fan-out
//!   handler returns; redelivery may duplicate ids in follower lists, and
//!   reads tolerate the duplicates.
//! - **Ordering**: tweet ids are assigned monotonically by the store and the
//!   read path orders by id, so out-of-order fan-outs self-correct.
//! - **Failure**: cache and bus outages degrade (store fallback, deferred
//!   fan-out); only store outages surface to callers.
//!
//! ## Modules
//!
//! - [`publisher`]: write path services ([`TweetService`], [`FollowService`])
//! - [`distributor`]: the fan-out handler and worker run loop
//! - [`materializer`]: the read path ([`TimelineService`])
//! - [`store`]: Postgres system of record (plus an in-memory fake)
//! - [`cache`]: per-user timeline lists (Redis lists, plus a fake)
//! - [`bus`]: event pipeline (Redis Streams consumer groups, plus a fake)
//! - [`container`]: composition roots for the api and worker processes

pub mod config;
pub mod error;
pub mod model;
pub mod event;
pub mod store;
pub mod cache;
pub mod bus;
pub mod publisher;
pub mod distributor;
pub mod materializer;
pub mod container;
pub mod metrics;
pub mod retry;

pub use config::{BusConfig, CacheConfig, Config, StoreConfig};
pub use error::Error;
pub use model::{FollowEdge, Tweet, User};
pub use event::{Event, TweetCreatedData};
pub use store::{FollowerStore, StoreError, TweetStore, UserStore};
pub use cache::{CacheError, TimelineCache};
pub use bus::{BusError, EventConsumer, EventHandler, EventPublisher};
pub use publisher::{FollowService, TweetService};
pub use distributor::{Distributor, FanOutWorker};
pub use materializer::TimelineService;
pub use container::{ApiContainer, WorkerContainer};
pub use retry::{retry, RetryPolicy};
