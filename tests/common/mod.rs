// tests/common/mod.rs
//
// Shared fakes for integration tests. Each test binary uses a different
// subset, hence the allow.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::Notify;

use foryou_feed::analytics::{AnalyticsEvent, AnalyticsSink, DynAnalytics};
use foryou_feed::engine::{EngineSettings, RecommendationEngine};
use foryou_feed::history::HistoryStore;
use foryou_feed::model::{CandidateItem, ItemId, ScoredResult};
use foryou_feed::scoring::{ScoringFailure, ScoringGateway, ScoringOutcome};
use foryou_feed::source::{CandidateSource, ListingParams};

pub fn items(n: usize) -> Vec<CandidateItem> {
    (1..=n)
        .map(|i| CandidateItem::new(i as i64, format!("post {i}"), format!("body {i}")))
        .collect()
}

pub fn ids(items: &[CandidateItem]) -> Vec<String> {
    items.iter().map(|c| c.id.to_string()).collect()
}

pub fn outcome(algorithm: &str, pairs: &[(&str, f64)]) -> ScoringOutcome {
    ScoringOutcome {
        algorithm: Some(algorithm.to_string()),
        scores: pairs
            .iter()
            .map(|(id, s)| ScoredResult {
                id: ItemId::from(*id),
                relevance_score: *s,
            })
            .collect(),
        note: None,
    }
}

// ------------------------------------------------------------
// Candidate source
// ------------------------------------------------------------

#[derive(Default)]
pub struct FakeSource {
    pub items: Mutex<Vec<CandidateItem>>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    pub last_params: Mutex<Option<ListingParams>>,
}

impl FakeSource {
    pub fn with_items(items: Vec<CandidateItem>) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(items),
            ..Self::default()
        })
    }
}

#[async_trait]
impl CandidateSource for FakeSource {
    async fn fetch(
        &self,
        params: &ListingParams,
        _page: u32,
        limit: u32,
    ) -> Result<Vec<CandidateItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(*params);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("instance unreachable"));
        }
        let all = self.items.lock().unwrap().clone();
        Ok(all.into_iter().take(limit as usize).collect())
    }

    fn name(&self) -> &'static str {
        "fake-source"
    }
}

// ------------------------------------------------------------
// Scoring gateway
// ------------------------------------------------------------

/// Answers from a queue of scripted replies; the last reply repeats.
pub struct FakeGateway {
    replies: Mutex<VecDeque<(Duration, Result<ScoringOutcome, ScoringFailure>)>>,
    pub calls: AtomicUsize,
    pub last_history: Mutex<Vec<String>>,
    pub last_candidates: Mutex<Vec<ItemId>>,
    pub last_top_k: AtomicUsize,
    called: Notify,
}

impl FakeGateway {
    pub fn replying(reply: Result<ScoringOutcome, ScoringFailure>) -> Arc<Self> {
        Self::scripted(vec![(Duration::ZERO, reply)])
    }

    pub fn scripted(replies: Vec<(Duration, Result<ScoringOutcome, ScoringFailure>)>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            last_history: Mutex::new(Vec::new()),
            last_candidates: Mutex::new(Vec::new()),
            last_top_k: AtomicUsize::new(0),
            called: Notify::new(),
        })
    }

    pub fn set_reply(&self, reply: Result<ScoringOutcome, ScoringFailure>) {
        let mut q = self.replies.lock().unwrap();
        q.clear();
        q.push_back((Duration::ZERO, reply));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Park until at least `n` scoring calls have started.
    pub async fn wait_for_calls(&self, n: usize) {
        let wait = async {
            while self.call_count() < n {
                self.called.notified().await;
            }
        };
        tokio::time::timeout(Duration::from_secs(60), wait)
            .await
            .expect("gateway was never called");
    }

    fn next_reply(&self) -> (Duration, Result<ScoringOutcome, ScoringFailure>) {
        let mut q = self.replies.lock().unwrap();
        if q.len() > 1 {
            q.pop_front().unwrap()
        } else {
            q.front()
                .cloned()
                .unwrap_or((Duration::ZERO, Ok(ScoringOutcome::default())))
        }
    }
}

#[async_trait]
impl ScoringGateway for FakeGateway {
    async fn score(
        &self,
        history_texts: &[String],
        candidates: &[CandidateItem],
        top_k: usize,
    ) -> Result<ScoringOutcome, ScoringFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_history.lock().unwrap() = history_texts.to_vec();
        *self.last_candidates.lock().unwrap() = candidates.iter().map(|c| c.id.clone()).collect();
        self.last_top_k.store(top_k, Ordering::SeqCst);
        self.called.notify_one();

        let (delay, reply) = self.next_reply();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        reply
    }

    async fn health(&self) -> Result<(), ScoringFailure> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake-gateway"
    }
}

// ------------------------------------------------------------
// Analytics
// ------------------------------------------------------------

#[derive(Default)]
pub struct RecordingAnalytics {
    pub events: Mutex<Vec<AnalyticsEvent>>,
    pub fail: AtomicBool,
}

impl RecordingAnalytics {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }

    /// Let spawned deliveries run until `pred` holds (or give up).
    pub async fn wait_for(&self, pred: impl Fn(&[AnalyticsEvent]) -> bool) -> bool {
        for _ in 0..200 {
            if pred(&self.events.lock().unwrap()) {
                return true;
            }
            tokio::task::yield_now().await;
        }
        false
    }
}

#[async_trait]
impl AnalyticsSink for RecordingAnalytics {
    async fn record(&self, ev: &AnalyticsEvent) -> Result<()> {
        self.events.lock().unwrap().push(ev.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("collector down"));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// ------------------------------------------------------------
// Wiring
// ------------------------------------------------------------

pub struct Harness {
    pub source: Arc<FakeSource>,
    pub gateway: Arc<FakeGateway>,
    pub history: Arc<HistoryStore>,
    pub analytics: Arc<RecordingAnalytics>,
    pub engine: RecommendationEngine,
}

impl Harness {
    pub fn new(source: Arc<FakeSource>, gateway: Arc<FakeGateway>) -> Self {
        Self::with_settings(source, gateway, EngineSettings::default())
    }

    pub fn with_settings(
        source: Arc<FakeSource>,
        gateway: Arc<FakeGateway>,
        settings: EngineSettings,
    ) -> Self {
        Self::with_history(source, gateway, settings, Arc::new(HistoryStore::in_memory()))
    }

    pub fn with_history(
        source: Arc<FakeSource>,
        gateway: Arc<FakeGateway>,
        settings: EngineSettings,
        history: Arc<HistoryStore>,
    ) -> Self {
        let analytics = Arc::new(RecordingAnalytics::default());
        let sink: DynAnalytics = analytics.clone();
        let engine = RecommendationEngine::new(
            source.clone(),
            gateway.clone(),
            Arc::clone(&history),
            sink,
            settings,
        );
        Self {
            source,
            gateway,
            history,
            analytics,
            engine,
        }
    }

    /// Run one refresh to completion.
    pub async fn refresh(&self) {
        self.engine.refresh().await.expect("refresh task");
    }
}
