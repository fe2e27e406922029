//! Composition roots.
//!
//! Explicit constructor wiring, one function per process shape. Each
//! component receives its collaborators as `Arc<dyn Trait>` parameters, so
//! tests swap any seam for an in-memory fake and production swaps Redis
//! Streams for another bus by changing exactly one line here.

use std::sync::Arc;

use tracing::info;

use crate::bus::RedisStreamBus;
use crate::cache::RedisTimelineCache;
use crate::config::Config;
use crate::distributor::{Distributor, FanOutWorker};
use crate::error::Error;
use crate::materializer::TimelineService;
use crate::metrics;
use crate::publisher::{FollowService, TweetService};
use crate::store::PgStore;

/// Everything the request-serving process needs: write path and read path.
///
/// The transport layer (HTTP framing, auth, DTOs) lives outside this crate
/// and calls straight into these services.
pub struct ApiContainer {
    pub tweets: TweetService,
    pub follows: FollowService,
    pub timeline: TimelineService,
}

impl ApiContainer {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let store = Arc::new(
            PgStore::connect(&config.store)
                .await
                .map_err(|e| Error::Internal(e.to_string()))?,
        );
        metrics::set_backend_connected("postgres", true);

        let cache = Arc::new(
            RedisTimelineCache::connect(&config.cache)
                .await
                .map_err(|e| Error::Transient(e.to_string()))?,
        );
        metrics::set_backend_connected("redis", true);

        let bus = Arc::new(
            RedisStreamBus::connect(&config.bus)
                .await
                .map_err(|e| Error::Transient(e.to_string()))?,
        );
        metrics::set_backend_connected("bus", true);

        info!("api container wired");
        Ok(Self {
            tweets: TweetService::new(store.clone(), store.clone(), bus),
            follows: FollowService::new(store.clone(), store.clone()),
            timeline: TimelineService::new(store, cache),
        })
    }
}

/// Everything the fan-out worker process needs.
pub struct WorkerContainer {
    pub worker: Arc<FanOutWorker>,
}

impl WorkerContainer {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let store = Arc::new(
            PgStore::connect(&config.store)
                .await
                .map_err(|e| Error::Internal(e.to_string()))?,
        );
        let cache = Arc::new(
            RedisTimelineCache::connect(&config.cache)
                .await
                .map_err(|e| Error::Transient(e.to_string()))?,
        );
        let bus = Arc::new(
            RedisStreamBus::connect(&config.bus)
                .await
                .map_err(|e| Error::Transient(e.to_string()))?,
        );

        let distributor = Arc::new(Distributor::new(store, cache));
        let worker = Arc::new(FanOutWorker::new(bus, distributor));

        info!("worker container wired");
        Ok(Self { worker })
    }

    /// Run the worker until SIGINT, then drain in-flight handlers and exit.
    pub async fn run_until_signalled(&self) -> Result<(), Error> {
        let worker = self.worker.clone();
        let signal_task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                worker.shutdown();
            }
        });

        let result = self.worker.run().await;
        signal_task.abort();
        result
    }
}
