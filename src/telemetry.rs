// src/telemetry.rs
//! Tracing setup, metric descriptions and log-safe hashing.

use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "foryou_feed=info,warn";

/// Compact tracing for the binary. `RUST_LOG` overrides the default filter.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "feed_refresh_total",
            "Completed refresh cycles, labelled by outcome."
        );
        describe_counter!(
            "feed_candidates_excluded_total",
            "Candidates dropped because they were already viewed."
        );
        describe_histogram!(
            "feed_scoring_latency_ms",
            "Scoring backend round-trip in milliseconds."
        );
        describe_counter!(
            "history_views_recorded_total",
            "View events persisted into history."
        );
        describe_counter!(
            "analytics_events_total",
            "Analytics events handed to sinks."
        );
    });
}

/// Short SHA-256 prefix of user content. Raw text never goes to the logs.
pub fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Truncate to at most `max` chars on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
