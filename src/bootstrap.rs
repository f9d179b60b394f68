// src/bootstrap.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use crate::analytics::{AnalyticsMux, DynAnalytics};
use crate::config::{FeedConfig, GatewayMode, SourceMode};
use crate::engine::{EngineSettings, RecommendationEngine};
use crate::history::{FileBackend, HistoryLimits, HistoryStore};
use crate::recorder::ViewEventRecorder;
use crate::scoring::{DynScoringGateway, HttpScoringGateway, StaticScoringGateway};
use crate::source::{DynCandidateSource, FixtureCandidateSource, LemmyCandidateSource};

/// Every long-lived component of one feed, wired from config.
pub struct FeedRuntime {
    pub history: Arc<HistoryStore>,
    pub gateway: DynScoringGateway,
    pub engine: Arc<RecommendationEngine>,
    pub recorder: ViewEventRecorder,
    /// Same mux the engine and recorder emit into; kept for the collection switch.
    pub analytics: Arc<AnalyticsMux>,
}

impl FeedRuntime {
    pub fn from_config(cfg: FeedConfig) -> anyhow::Result<Self> {
        let backend = FileBackend::new(&cfg.history_dir)
            .with_context(|| format!("opening history dir {}", cfg.history_dir.display()))?;
        let history = Arc::new(HistoryStore::new(
            Box::new(backend),
            HistoryLimits {
                max_history: cfg.max_history,
                max_viewed: cfg.max_viewed,
            },
        ));
        Self::with_history(cfg, history)
    }

    /// Same wiring with a caller-provided store (tests pass an in-memory one).
    pub fn with_history(cfg: FeedConfig, history: Arc<HistoryStore>) -> anyhow::Result<Self> {
        let source: DynCandidateSource = match cfg.source.mode {
            SourceMode::Http => Arc::new(LemmyCandidateSource::new(&cfg.source.base_url)?),
            SourceMode::Fixture => Arc::new(FixtureCandidateSource::from_path(&cfg.source.fixture_path)?),
        };
        let gateway: DynScoringGateway = match cfg.scoring.mode {
            GatewayMode::Http => Arc::new(HttpScoringGateway::new(
                &cfg.scoring.base_url,
                Duration::from_secs(cfg.scoring.timeout_secs),
            )?),
            GatewayMode::Mock => Arc::new(StaticScoringGateway),
        };
        let analytics = Arc::new(AnalyticsMux::with_webhook(cfg.analytics.webhook_url.clone()));
        analytics.set_enabled(cfg.analytics.enabled);
        let sink: DynAnalytics = analytics.clone();

        // Safe diagnostics: modes and sizes only
        info!(
            "feed cfg loaded: source={}, gateway={}, top_k={}, batch={}, stale_policy={:?}, analytics={}",
            source.name(),
            gateway.name(),
            cfg.top_k,
            cfg.candidate_batch_size,
            cfg.stale_policy,
            cfg.analytics.enabled
        );

        let engine = Arc::new(RecommendationEngine::new(
            source,
            Arc::clone(&gateway),
            Arc::clone(&history),
            Arc::clone(&sink),
            EngineSettings::from(&cfg),
        ));
        let recorder = ViewEventRecorder::new(Arc::clone(&history), sink);

        Ok(Self {
            history,
            gateway,
            engine,
            recorder,
            analytics,
        })
    }

    /// Checks scoring backend health. Never fails; only logs.
    pub async fn quick_probe(&self) -> bool {
        match self.gateway.health().await {
            Ok(()) => {
                info!(gateway = self.gateway.name(), "scoring quick_probe ok");
                true
            }
            Err(e) => {
                warn!(gateway = self.gateway.name(), error = %e, "scoring quick_probe failed; feed will fall back to errors on refresh");
                false
            }
        }
    }
}
