//! Error taxonomy for the feed pipeline.
//!
//! Every failure path of a refresh ends up as a `FeedError` in the published
//! `FeedState`; none of them are fatal to the process.

use serde::Serialize;
use thiserror::Error;

use crate::scoring::ScoringFailure;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FeedError {
    /// Candidate retrieval from the content source failed.
    #[error("Failed to load posts: {0}")]
    SourceFetch(String),

    /// Scoring backend unreachable or timed out.
    #[error("Cannot reach recommendation backend: {0}")]
    ScoringNetwork(String),

    /// Non-2xx or malformed response from the scoring backend.
    #[error("Backend error {0}")]
    ScoringUpstream(String),

    /// Scoring backend answered, but without a usable result.
    #[error("Scoring error: {0}")]
    ScoringEmptyResult(String),

    /// History read/write failed.
    #[error("History persistence error: {0}")]
    Persistence(String),
}

impl FeedError {
    /// Stable short name, used as a metrics label and in the HTTP view.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::SourceFetch(_) => "source_fetch",
            FeedError::ScoringNetwork(_) => "scoring_network",
            FeedError::ScoringUpstream(_) => "scoring_upstream",
            FeedError::ScoringEmptyResult(_) => "scoring_empty_result",
            FeedError::Persistence(_) => "persistence",
        }
    }
}

impl From<ScoringFailure> for FeedError {
    fn from(f: ScoringFailure) -> Self {
        match f {
            ScoringFailure::Network(m) => FeedError::ScoringNetwork(m),
            ScoringFailure::Upstream(m) => FeedError::ScoringUpstream(m),
            ScoringFailure::EmptyResult(m) => FeedError::ScoringEmptyResult(m),
        }
    }
}

impl From<std::io::Error> for FeedError {
    fn from(e: std::io::Error) -> Self {
        FeedError::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
