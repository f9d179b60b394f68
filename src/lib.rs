// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analytics;
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod metrics;
pub mod model;
pub mod ranking;
pub mod recorder;
pub mod scoring;
pub mod source;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::bootstrap::FeedRuntime;
pub use crate::engine::{EngineSettings, RecommendationEngine, StalePolicy};
pub use crate::error::FeedError;
pub use crate::model::{CandidateItem, FeedPhase, FeedState, ItemId};
pub use crate::recorder::ViewEventRecorder;

use tracing::info;

/// Call this from the entrypoint (after tracing init) to check the scoring
/// backend once. It won't fail on an unhealthy backend; it just logs.
///
/// ```ignore
/// let rt = foryou_feed::FeedRuntime::from_config(cfg)?;
/// foryou_feed::run_scoring_quick_probe(&rt).await;
/// ```
pub async fn run_scoring_quick_probe(rt: &FeedRuntime) {
    let healthy = rt.quick_probe().await;
    info!(healthy, "scoring quick probe finished");
}
