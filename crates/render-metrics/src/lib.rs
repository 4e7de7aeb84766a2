#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Minimal metrics for the clburst render engine.
//!
//! Exposes a small set of Prometheus metrics for monitoring dispatch
//! behaviour:
//! - `render_batches_total`: Batches dispatched (all time)
//! - `render_work_items_total`: Work-items dispatched (all time)
//! - `render_bytes_transferred_total`: Device buffer bytes moved (all time)
//! - `render_batch_duration_seconds`: Duration of the last batch
//! - `render_step_size`: Work-items in the most recent batch
//!
//! The engine records one sample per batch through [`record_batch`]; an
//! embedding application scrapes [`gather`] however it likes.

use once_cell::sync::Lazy;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

// ---------------------------------------------------------------------------
// Global Registry
// ---------------------------------------------------------------------------

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// ---------------------------------------------------------------------------
// Counter Metrics
// ---------------------------------------------------------------------------

static BATCHES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("render_batches_total", "Total kernel batches dispatched")
        .expect("create render_batches_total");
    REGISTRY
        .register(Box::new(c.clone()))
        .expect("register render_batches_total");
    c
});

static WORK_ITEMS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("render_work_items_total", "Total work-items dispatched")
        .expect("create render_work_items_total");
    REGISTRY
        .register(Box::new(c.clone()))
        .expect("register render_work_items_total");
    c
});

static BYTES_TRANSFERRED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new(
        "render_bytes_transferred_total",
        "Total device buffer bytes written and read",
    )
    .expect("create render_bytes_transferred_total");
    REGISTRY
        .register(Box::new(c.clone()))
        .expect("register render_bytes_transferred_total");
    c
});

// ---------------------------------------------------------------------------
// Gauge Metrics
// ---------------------------------------------------------------------------

static BATCH_DURATION: Lazy<Gauge> = Lazy::new(|| {
    let g = Gauge::new(
        "render_batch_duration_seconds",
        "Wall-clock duration of the most recent batch",
    )
    .expect("create render_batch_duration_seconds");
    REGISTRY
        .register(Box::new(g.clone()))
        .expect("register render_batch_duration_seconds");
    g
});

static STEP_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("render_step_size", "Work-items in the most recent batch")
        .expect("create render_step_size");
    REGISTRY
        .register(Box::new(g.clone()))
        .expect("register render_step_size");
    g
});

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Record one completed batch: its measured duration, its size, and the
/// buffer bytes it moved.
pub fn record_batch(duration_secs: f64, step_size: u64, bytes_transferred: u64) {
    BATCHES_TOTAL.inc();
    WORK_ITEMS_TOTAL.inc_by(step_size);
    BYTES_TRANSFERRED_TOTAL.inc_by(bytes_transferred);
    BATCH_DURATION.set(duration_secs);
    STEP_SIZE.set(step_size as i64);
}

/// Encode every registered metric in the Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::with_capacity(4096);
    encoder
        .encode(&metric_families, &mut buffer)
        .unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_batches_appear_in_the_gathered_text() {
        record_batch(0.087, 4096, 4096 * 4);
        record_batch(0.102, 8192, 8192 * 4);

        let text = gather();
        assert!(text.contains("render_batches_total"));
        assert!(text.contains("render_work_items_total"));
        assert!(text.contains("render_bytes_transferred_total"));
        assert!(text.contains("render_batch_duration_seconds 0.102"));
        assert!(text.contains("render_step_size 8192"));
    }
}
