//! # Recommendation Engine
//! Drives one refresh cycle per `refresh()` call:
//! fetch → exclude viewed → cold start or score → rank → publish.
//!
//! State lives in a `watch` channel with the engine as its only writer. Each
//! transition replaces the whole `FeedState`. A cycle whose owner has been torn
//! down never publishes.
//!
//! Policy: with `StalePolicy::LastCompleted` (default) overlapping refreshes
//! publish in completion order, so a slower, older cycle can overwrite a newer
//! result. `StalePolicy::LatestStarted` drops results from any cycle that has
//! been superseded by a newer `refresh()`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analytics::{self, AnalyticsEvent, DynAnalytics};
use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::history::HistoryStore;
use crate::model::{CandidateItem, FeedState, ALGORITHM_NONE};
use crate::ranking::{exclude_viewed, rank_by_scores};
use crate::scoring::DynScoringGateway;
use crate::source::{DynCandidateSource, ListingParams};
use crate::telemetry::{anon_hash, ensure_metrics_described};

/// How results of overlapping refreshes are reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Last cycle to complete wins, whenever it started.
    #[default]
    LastCompleted,
    /// Only the most recently started cycle may publish its result.
    LatestStarted,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub candidate_batch_size: u32,
    pub top_k: usize,
    pub history_for_scoring: usize,
    pub listing: ListingParams,
    pub stale_policy: StalePolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings::from(&FeedConfig::default())
    }
}

impl From<&FeedConfig> for EngineSettings {
    fn from(cfg: &FeedConfig) -> Self {
        Self {
            candidate_batch_size: cfg.candidate_batch_size,
            top_k: cfg.top_k,
            history_for_scoring: cfg.history_for_scoring,
            listing: cfg.listing,
            stale_policy: cfg.stale_policy,
        }
    }
}

/// Terminal result of one cycle, before it is turned into a `FeedState`.
#[derive(Debug)]
enum Transition {
    Success {
        items: Vec<CandidateItem>,
        personalized: bool,
        label: Option<String>,
    },
    Empty,
    Failed(FeedError),
}

impl Transition {
    fn outcome(&self) -> &'static str {
        match self {
            Transition::Success {
                personalized: true, ..
            } => "personalized",
            Transition::Success { .. } => "cold_start",
            Transition::Empty => "empty",
            Transition::Failed(_) => "failed",
        }
    }
}

struct Inner {
    source: DynCandidateSource,
    gateway: DynScoringGateway,
    history: Arc<HistoryStore>,
    analytics: DynAnalytics,
    settings: EngineSettings,
    state: watch::Sender<FeedState>,
    generation: AtomicU64,
    shutdown: CancellationToken,
}

/// Owner of the feed state. Dropping it (or calling `shutdown`) cancels every
/// in-flight refresh.
pub struct RecommendationEngine {
    inner: Arc<Inner>,
}

impl RecommendationEngine {
    pub fn new(
        source: DynCandidateSource,
        gateway: DynScoringGateway,
        history: Arc<HistoryStore>,
        analytics: DynAnalytics,
        settings: EngineSettings,
    ) -> Self {
        ensure_metrics_described();
        let (state, _) = watch::channel(FeedState::idle());
        Self {
            inner: Arc::new(Inner {
                source,
                gateway,
                history,
                analytics,
                settings,
                state,
                generation: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> FeedState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.inner.state.subscribe()
    }

    /// Refresh with the configured listing.
    pub fn refresh(&self) -> JoinHandle<()> {
        self.refresh_with(self.inner.settings.listing)
    }

    pub fn refresh_with(&self, params: ListingParams) -> JoinHandle<()> {
        self.spawn_refresh(params).1
    }

    /// Start one refresh cycle on a background task. `Loading` is published
    /// before this returns. The generation stamped on this cycle comes back
    /// with the handle, which resolves once the cycle has finished (or was
    /// cancelled). After shutdown nothing starts and the current generation
    /// is returned.
    pub fn spawn_refresh(&self, params: ListingParams) -> (u64, JoinHandle<()>) {
        if self.inner.shutdown.is_cancelled() {
            debug!(target: "engine", "refresh ignored after shutdown");
            return (self.current_generation(), tokio::spawn(async {}));
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.state.send_modify(|s| {
            let next = FeedState::loading(s, generation);
            *s = next;
        });

        let token = self.inner.shutdown.child_token();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run_cycle(generation, params, token).await });
        (generation, handle)
    }

    /// Wipe history and viewed ids, then reload in default order.
    pub async fn clear_history(&self) -> Result<(u64, JoinHandle<()>), FeedError> {
        self.inner.history.blocking(|h| h.clear()).await?;
        info!(target: "engine", "history cleared, reloading");
        Ok(self.spawn_refresh(self.inner.settings.listing))
    }

    pub async fn history_count(&self) -> Result<usize, FeedError> {
        self.inner.history.blocking(|h| h.history_count()).await
    }

    /// Generation of the most recently started refresh.
    pub fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Cancel in-flight refreshes; later `refresh()` calls become no-ops.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

impl Drop for RecommendationEngine {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl Inner {
    async fn run_cycle(&self, generation: u64, params: ListingParams, token: CancellationToken) {
        let started = Instant::now();
        analytics::emit(
            &self.analytics,
            AnalyticsEvent::ForYouTabView { ts: Utc::now() },
        );

        let transition = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(target: "engine", generation, "refresh cancelled in flight");
                return;
            }
            t = self.compute(&params, started) => t,
        };

        if token.is_cancelled() {
            debug!(target: "engine", generation, "refresh finished after teardown; result dropped");
            return;
        }
        self.publish(generation, transition);
    }

    async fn compute(&self, params: &ListingParams, started: Instant) -> Transition {
        let s = &self.settings;

        // 1) Candidates
        let fetched = match self.source.fetch(params, 1, s.candidate_batch_size).await {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "engine", source = self.source.name(), error = ?e, "candidate fetch failed");
                return Transition::Failed(FeedError::SourceFetch(format!("{e:#}")));
            }
        };

        // 2) Exclude already viewed
        let viewed = self
            .history
            .blocking(|h| h.viewed_ids())
            .await
            .unwrap_or_else(|e| {
                warn!(target: "engine", error = %e, "viewed ids unreadable; excluding nothing");
                HashSet::new()
            });
        let fetched_count = fetched.len();
        let (unseen, excluded) = exclude_viewed(fetched, &viewed);
        counter!("feed_candidates_excluded_total").increment(excluded as u64);
        info!(
            target: "engine",
            fetched = fetched_count,
            unseen = unseen.len(),
            excluded,
            "candidates filtered"
        );
        if unseen.is_empty() {
            return Transition::Empty;
        }

        // 3) History
        let max_items = s.history_for_scoring;
        let history = self
            .history
            .blocking(move |h| h.recent_contents(max_items))
            .await
            .unwrap_or_else(|e| {
                warn!(target: "engine", error = %e, "history unreadable; using cold start");
                Vec::new()
            });

        // 4) Cold start: source order, no scoring call
        if history.is_empty() {
            debug!(target: "engine", "no history; keeping source order");
            return Transition::Success {
                items: unseen,
                personalized: false,
                label: Some(ALGORITHM_NONE.to_string()),
            };
        }

        // 5) Personalized
        let t0 = Instant::now();
        let scored = self.gateway.score(&history, &unseen, s.top_k).await;
        histogram!("feed_scoring_latency_ms").record(t0.elapsed().as_millis() as f64);

        analytics::emit(
            &self.analytics,
            AnalyticsEvent::RecommendationRequest {
                history_size: history.len(),
                candidate_count: unseen.len(),
                response_time_ms: started.elapsed().as_millis() as u64,
                success: scored.is_ok(),
                ts: Utc::now(),
            },
        );

        match scored {
            Ok(outcome) => {
                let ranked = rank_by_scores(unseen, &outcome);
                for (i, (c, score)) in ranked.iter().take(5).enumerate() {
                    debug!(target: "engine", rank = i, score, id = %c.id, title = %anon_hash(&c.title), "ranked");
                }
                Transition::Success {
                    items: ranked.into_iter().map(|(c, _)| c).collect(),
                    personalized: true,
                    label: outcome.algorithm,
                }
            }
            Err(f) => {
                warn!(target: "engine", gateway = self.gateway.name(), error = %f, "scoring failed");
                Transition::Failed(f.into())
            }
        }
    }

    fn publish(&self, generation: u64, transition: Transition) {
        if self.settings.stale_policy == StalePolicy::LatestStarted
            && self.generation.load(Ordering::SeqCst) != generation
        {
            debug!(target: "engine", generation, "superseded refresh; result dropped");
            counter!("feed_refresh_total", "outcome" => "superseded").increment(1);
            return;
        }

        let outcome = transition.outcome();
        self.state.send_modify(|s| {
            let next = match transition {
                Transition::Success {
                    items,
                    personalized,
                    label,
                } => FeedState::success(items, personalized, label, generation),
                Transition::Empty => FeedState::empty(generation),
                Transition::Failed(err) => FeedState::failed(s, err, generation),
            };
            *s = next;
        });
        counter!("feed_refresh_total", "outcome" => outcome).increment(1);
        info!(target: "engine", generation, outcome, "feed state published");
    }
}
