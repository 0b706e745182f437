//! Prometheus metrics.
//!
//! Logical collection calls are counted separately from the physical requests that backends
//! issue for them, so the effect of batching is visible in the run report.

use lazy_static::lazy_static;
use prometheus::{self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

lazy_static! {
    // Registry for holding metric state
    pub static ref REGISTRY: Registry = Registry::new();
    // Coalesced collection manager calls
    pub static ref COLLECTION_CALLS: IntCounterVec = IntCounterVec::new(
        Opts::new("collection_calls", "The number of batched collection operations issued"),
        &["backend", "operation"]
    ).unwrap();
    // Physical backend requests
    pub static ref STORE_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("store_requests", "The number of requests issued by store backends"),
        &["backend", "operation"]
    ).unwrap();
    // Handles per collection call
    pub static ref COLLECTION_BATCH_SIZE: HistogramVec = HistogramVec::new(
        HistogramOpts{
            common_opts: Opts::new("collection_batch_size", "The number of handles addressed by each collection operation"),
            buckets: vec![1.0, 2.0, 4.0, 6.0, 12.0, 24.0, 48.0, 96.0],
        },
        &["operation"],
    ).unwrap();
}

/// Register the metrics with the registry.
///
/// Registering more than once is harmless, which keeps repeated initialisation in tests simple.
pub fn register_metrics() {
    // Errors only report duplicate registration.
    let _ = REGISTRY.register(Box::new(COLLECTION_CALLS.clone()));
    let _ = REGISTRY.register(Box::new(STORE_REQUESTS.clone()));
    let _ = REGISTRY.register(Box::new(COLLECTION_BATCH_SIZE.clone()));
}

/// Returns the registered metrics in the Prometheus text format.
pub fn gather() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    // Encoding into a Vec only fails for malformed metric families, which the registry rejects.
    if encoder.encode(&REGISTRY.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Count a collection manager call addressing `batch_size` handles.
pub fn record_collection_call(backend: &str, operation: &str, batch_size: usize) {
    COLLECTION_CALLS
        .with_label_values(&[backend, operation])
        .inc();
    COLLECTION_BATCH_SIZE
        .with_label_values(&[operation])
        .observe(batch_size as f64);
}

/// Count a physical request issued by a store backend.
pub fn record_store_request(backend: &str, operation: &str) {
    STORE_REQUESTS.with_label_values(&[backend, operation]).inc();
}

fn counter_total(counter: &IntCounterVec) -> u64 {
    use prometheus::core::Collector;
    counter
        .collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .map(|metric| metric.get_counter().get_value() as u64)
        .sum()
}

/// Total number of collection calls across all backends and operations.
pub fn collection_calls_total() -> u64 {
    counter_total(&COLLECTION_CALLS)
}

/// Total number of store requests across all backends and operations.
pub fn store_requests_total() -> u64 {
    counter_total(&STORE_REQUESTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_gather() {
        register_metrics();
        register_metrics();
        let before = collection_calls_total();
        record_collection_call("test", "create_groups", 3);
        record_store_request("test", "get");
        assert!(collection_calls_total() > before);
        assert!(store_requests_total() >= 1);
        let text = gather();
        assert!(text.contains("collection_calls"));
        assert!(text.contains("store_requests"));
        assert!(text.contains("collection_batch_size"));
    }
}
