use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::FeedConfig;
use crate::telemetry::ensure_metrics_described;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and publish the configured limits as
    /// static gauges. Fails if a global recorder is already installed.
    pub fn init(cfg: &FeedConfig) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        ensure_metrics_described();
        gauge!("feed_config_top_k").set(cfg.top_k as f64);
        gauge!("feed_config_max_history").set(cfg.max_history as f64);
        gauge!("feed_config_max_viewed").set(cfg.max_viewed as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
