//! Metrics instrumentation.
//!
//! Backend-agnostic via the `metrics` crate; the embedding process picks the
//! exporter.
//!
//! # Naming
//! - `timeline_engine_` prefix everywhere
//! - `_total` counters, `_seconds` duration histograms
//!
//! # Labels
//! - `component`: publisher, distributor, materializer
//! - `operation`: create, fan_out, get_timeline, publish, ...
//! - `status`: success, error
//! - `source` (reads): cache, store

use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Record the outcome of a service operation.
pub fn record_operation(component: &'static str, operation: &'static str, status: &'static str) {
    counter!(
        "timeline_engine_operations_total",
        "component" => component,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

/// Record operation latency.
pub fn record_latency(component: &'static str, operation: &'static str, duration: Duration) {
    histogram!(
        "timeline_engine_operation_seconds",
        "component" => component,
        "operation" => operation
    )
    .record(duration.as_secs_f64());
}

/// Record where a timeline read was served from.
pub fn record_timeline_read(source: &'static str) {
    counter!(
        "timeline_engine_timeline_reads_total",
        "source" => source
    )
    .increment(1);
}

/// Record a fan-out: how many followers a single event reached.
pub fn record_fanout(followers: usize, delivered: usize) {
    histogram!("timeline_engine_fanout_followers").record(followers as f64);
    if delivered < followers {
        counter!("timeline_engine_fanout_skipped_total")
            .increment((followers - delivered) as u64);
    }
}

/// Record a consumed bus event and what the handler did with it.
pub fn record_event(kind: &'static str, outcome: &'static str) {
    counter!(
        "timeline_engine_events_total",
        "kind" => kind,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record an event published to the bus.
pub fn record_publish(status: &'static str) {
    counter!(
        "timeline_engine_publish_total",
        "status" => status
    )
    .increment(1);
}

/// Set backend connectivity as seen at composition time.
pub fn set_backend_connected(backend: &'static str, connected: bool) {
    gauge!(
        "timeline_engine_backend_connected",
        "backend" => backend
    )
    .set(if connected { 1.0 } else { 0.0 });
}

/// A timing guard that records latency on drop.
pub struct LatencyTimer {
    component: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(component: &'static str, operation: &'static str) -> Self {
        Self {
            component,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.component, self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These verify the API compiles and doesn't panic; assertions on values
    // belong to the exporter, not here.

    #[test]
    fn test_counters() {
        record_operation("publisher", "create", "success");
        record_operation("materializer", "get_timeline", "error");
        record_timeline_read("cache");
        record_timeline_read("store");
        record_event("tweet.created", "handled");
        record_event("tweet.updated", "skipped");
        record_publish("success");
    }

    #[test]
    fn test_fanout_histogram() {
        record_fanout(250, 250);
        record_fanout(10, 8);
    }

    #[test]
    fn test_gauges() {
        set_backend_connected("redis", true);
        set_backend_connected("postgres", false);
    }

    #[test]
    fn test_latency_timer_records_on_drop() {
        {
            let _timer = LatencyTimer::new("distributor", "fan_out");
            std::thread::sleep(Duration::from_micros(10));
        }
    }
}
