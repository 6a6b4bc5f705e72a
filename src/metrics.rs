// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::{Lazy, OnceCell};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Event journal --------
// Label `collection` diasumsikan himpunan kecil & tetap (nama collection dari kode,
// bukan input user), jadi kardinalitasnya terbatas.
pub static EVENT_WRITES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "event_writes_total",
            "primary event writes (labels: collection, outcome=ok|failed)",
        ),
        &["collection", "outcome"],
    )
    .unwrap()
});

pub static EVENT_WRITE_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("event_write_retries_total", "retries after transient write errors").unwrap()
});

pub static EVENT_MIRROR_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("event_mirror_failures_total", "failed realtime mirror pushes").unwrap()
});

// -------- Lifecycle --------
pub static BACKEND_INIT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("backend_init_total", "backend initializations (label: outcome)"),
        &["outcome"],
    )
    .unwrap()
});

pub static CONFIG_VALIDATION_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("config_validation_errors_total", "configuration violations found").unwrap()
});

static REGISTERED: OnceCell<()> = OnceCell::new();

/// Register all metrics to the custom registry. Aman dipanggil berulang kali.
pub fn init() -> Result<(), prometheus::Error> {
    REGISTERED
        .get_or_try_init(|| -> Result<(), prometheus::Error> {
            REGISTRY.register(Box::new(EVENT_WRITES.clone()))?;
            REGISTRY.register(Box::new(EVENT_WRITE_RETRIES.clone()))?;
            REGISTRY.register(Box::new(EVENT_MIRROR_FAILURES.clone()))?;
            REGISTRY.register(Box::new(BACKEND_INIT.clone()))?;
            REGISTRY.register(Box::new(CONFIG_VALIDATION_ERRORS.clone()))?;
            Ok(())
        })
        .map(|_| ())
}

/// Encode all metrics in Prometheus text format (untuk endpoint /metrics milik aplikasi host).
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}
