//! Scoring gateway: provider abstraction over the remote relevance scorer.
//!
//! The gateway is stateless and never retries; retry policy belongs to the
//! caller. Failures come back typed so the engine can render them.

pub mod http;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{CandidateItem, ItemId, ScoredResult};

pub use http::HttpScoringGateway;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoringFailure {
    /// Unreachable host, connection reset, timeout.
    #[error("network failure: {0}")]
    Network(String),
    /// Non-2xx status or a body that does not match the wire contract.
    #[error("upstream failure: {0}")]
    Upstream(String),
    /// Valid payload that reports failure or carries no scores.
    #[error("empty result: {0}")]
    EmptyResult(String),
}

/// What a successful scoring call yields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoringOutcome {
    pub algorithm: Option<String>,
    pub scores: Vec<ScoredResult>,
    pub note: Option<String>,
}

impl ScoringOutcome {
    /// id -> score lookup; later duplicates win.
    pub fn score_map(&self) -> HashMap<&ItemId, f64> {
        self.scores
            .iter()
            .map(|s| (&s.id, s.relevance_score))
            .collect()
    }
}

#[async_trait]
pub trait ScoringGateway: Send + Sync {
    /// Score `candidates` against `history_texts`. `candidates` is never empty.
    async fn score(
        &self,
        history_texts: &[String],
        candidates: &[CandidateItem],
        top_k: usize,
    ) -> Result<ScoringOutcome, ScoringFailure>;

    /// Cheap liveness probe of the backend.
    async fn health(&self) -> Result<(), ScoringFailure>;

    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynScoringGateway = Arc<dyn ScoringGateway>;

// ------------------------------------------------------------
// Wire contract
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireCandidate {
    pub id: String,
    pub title: String,
    pub body: String,
}

impl From<&CandidateItem> for WireCandidate {
    fn from(c: &CandidateItem) -> Self {
        Self {
            id: c.id.to_string(),
            title: c.title.clone(),
            body: c.body.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreRequest {
    pub history_contents: Vec<String>,
    pub candidates: Vec<WireCandidate>,
    pub top_k: usize,
}

impl ScoreRequest {
    pub fn build(history_texts: &[String], candidates: &[CandidateItem], top_k: usize) -> Self {
        Self {
            history_contents: history_texts.to_vec(),
            candidates: candidates.iter().map(WireCandidate::from).collect(),
            top_k,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireScored {
    pub id: ItemId,
    pub similarity_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreResponse {
    pub success: bool,
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub scored_candidates: Vec<WireScored>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl ScoreResponse {
    /// Apply the contract: `success = false` or no scores at all is a failure.
    pub fn into_outcome(self) -> Result<ScoringOutcome, ScoringFailure> {
        if !self.success {
            let msg = self
                .error
                .unwrap_or_else(|| "Unknown error from backend".to_string());
            return Err(ScoringFailure::EmptyResult(msg));
        }
        if self.scored_candidates.is_empty() {
            return Err(ScoringFailure::EmptyResult(
                "backend returned no scored candidates".to_string(),
            ));
        }
        Ok(ScoringOutcome {
            algorithm: self.algorithm,
            scores: self
                .scored_candidates
                .into_iter()
                .map(|s| ScoredResult {
                    id: s.id,
                    relevance_score: s.similarity_score,
                })
                .collect(),
            note: self.note,
        })
    }
}

// ------------------------------------------------------------
// Deterministic mock
// ------------------------------------------------------------

/// Scores by word overlap with the history. Used with `SCORING_TEST_MODE=mock`
/// so the whole service runs without a scoring backend.
#[derive(Debug, Clone, Default)]
pub struct StaticScoringGateway;

impl StaticScoringGateway {
    pub const ALGORITHM: &'static str = "mock-overlap";
}

#[async_trait]
impl ScoringGateway for StaticScoringGateway {
    async fn score(
        &self,
        history_texts: &[String],
        candidates: &[CandidateItem],
        _top_k: usize,
    ) -> Result<ScoringOutcome, ScoringFailure> {
        let vocab: std::collections::HashSet<String> = history_texts
            .iter()
            .flat_map(|h| h.split_whitespace())
            .map(|w| w.to_lowercase())
            .collect();

        let scores = candidates
            .iter()
            .map(|c| {
                let words: Vec<String> = c
                    .title
                    .split_whitespace()
                    .chain(c.body.split_whitespace())
                    .map(|w| w.to_lowercase())
                    .collect();
                let hits = words.iter().filter(|w| vocab.contains(*w)).count();
                let score = if words.is_empty() {
                    0.0
                } else {
                    hits as f64 / words.len() as f64
                };
                ScoredResult {
                    id: c.id.clone(),
                    relevance_score: score,
                }
            })
            .collect();

        Ok(ScoringOutcome {
            algorithm: Some(Self::ALGORITHM.to_string()),
            scores,
            note: None,
        })
    }

    async fn health(&self) -> Result<(), ScoringFailure> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
