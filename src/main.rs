//! For You feed service, binary entrypoint.
//! Loads config, wires the feed runtime and serves the Axum router.

use foryou_feed::config::FeedConfig;
use foryou_feed::metrics::Metrics;
use foryou_feed::{create_router, run_scoring_quick_probe, telemetry, AppState, FeedRuntime};
use shuttle_axum::ShuttleAxum;
use tracing::{info, warn};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    telemetry::init_tracing();

    let cfg = FeedConfig::load_default()?;
    let metrics = match Metrics::init(&cfg) {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(error = ?e, "metrics exporter disabled");
            None
        }
    };

    let rt = FeedRuntime::from_config(cfg)?;
    run_scoring_quick_probe(&rt).await;

    // Warm the feed so the first GET /feed has something to show.
    let _ = rt.engine.refresh();
    info!("initial refresh started");

    let mut router = create_router(AppState::from_runtime(&rt));
    if let Some(m) = &metrics {
        router = router.merge(m.router());
    }

    Ok(router.into())
}
