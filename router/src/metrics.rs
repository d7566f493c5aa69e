// Metrics and observability
// Prometheus collectors for quote outcomes, latency, breaker state, and KV
// cache behavior, registered once at first use.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, IntGaugeVec,
};

pub static QUOTES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "lucendex_quotes_total",
        "Total quote requests",
        &["outcome"]
    )
    .unwrap()
});

pub static QUOTE_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "lucendex_quote_latency_ms",
        "Quote generation latency",
        &["outcome"],
        vec![10.0, 25.0, 50.0, 100.0, 200.0, 500.0, 1000.0]
    )
    .unwrap()
});

pub static CIRCUIT_BREAKER_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "lucendex_circuit_breaker_state",
        "Circuit breaker state (0=closed, 1=open, 2=half-open)",
        &["pair"]
    )
    .unwrap()
});

pub static CACHE_HITS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("lucendex_cache_hits_total", "KV cache hits").unwrap()
});

pub static CACHE_MISSES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("lucendex_cache_misses_total", "KV cache misses").unwrap()
});

pub static KV_MEMORY_BYTES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("lucendex_kv_memory_bytes", "KV store memory usage").unwrap()
});
