// src/model.rs
//! Core data types shared by the pipeline stages.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::FeedError;

/// Opaque, source-provided item identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

/// Accepts both JSON strings and integers; sources disagree on id type.
impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Int(i64),
        }
        Ok(match Raw::deserialize(d)? {
            Raw::Str(s) => ItemId(s),
            Raw::Int(n) => ItemId::from(n),
        })
    }
}

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ItemId {
    fn from(v: i64) -> Self {
        Self(v.to_string())
    }
}

impl From<&str> for ItemId {
    fn from(v: &str) -> Self {
        Self(v.to_string())
    }
}

impl From<String> for ItemId {
    fn from(v: String) -> Self {
        Self(v)
    }
}

/// Community/author of a candidate. Carried through, never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerContext {
    #[serde(default)]
    pub community: String,
    #[serde(default)]
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub id: ItemId,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub owner: OwnerContext,
}

impl CandidateItem {
    pub fn new(id: impl Into<ItemId>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            owner: OwnerContext::default(),
        }
    }
}

/// One score per candidate the service chose to score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub id: ItemId,
    pub relevance_score: f64,
}

/// Where the engine currently is in its refresh state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedPhase {
    Idle,
    Loading,
    Success,
    Empty,
    Failed,
}

/// Algorithm label published for unranked (cold start / empty) results.
pub const ALGORITHM_NONE: &str = "none";

/// Externally observable feed state. Replaced wholesale on every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedState {
    pub phase: FeedPhase,
    pub is_loading: bool,
    pub error: Option<FeedError>,
    pub items: Vec<CandidateItem>,
    pub using_personalization: bool,
    pub algorithm_label: Option<String>,
    /// Generation of the refresh that produced this state (0 = none yet).
    pub generation: u64,
}

impl Default for FeedState {
    fn default() -> Self {
        Self::idle()
    }
}

impl FeedState {
    pub fn idle() -> Self {
        Self {
            phase: FeedPhase::Idle,
            is_loading: false,
            error: None,
            items: Vec::new(),
            using_personalization: false,
            algorithm_label: None,
            generation: 0,
        }
    }

    /// Loading keeps whatever was on screen, clears the error.
    pub fn loading(prev: &FeedState, generation: u64) -> Self {
        Self {
            phase: FeedPhase::Loading,
            is_loading: true,
            error: None,
            items: prev.items.clone(),
            using_personalization: prev.using_personalization,
            algorithm_label: prev.algorithm_label.clone(),
            generation,
        }
    }

    pub fn success(
        items: Vec<CandidateItem>,
        personalized: bool,
        algorithm_label: Option<String>,
        generation: u64,
    ) -> Self {
        Self {
            phase: FeedPhase::Success,
            is_loading: false,
            error: None,
            items,
            using_personalization: personalized,
            algorithm_label,
            generation,
        }
    }

    pub fn empty(generation: u64) -> Self {
        Self {
            phase: FeedPhase::Empty,
            is_loading: false,
            error: None,
            items: Vec::new(),
            using_personalization: false,
            algorithm_label: Some(ALGORITHM_NONE.to_string()),
            generation,
        }
    }

    /// Failed keeps the items from the previous state visible.
    pub fn failed(prev: &FeedState, error: FeedError, generation: u64) -> Self {
        Self {
            phase: FeedPhase::Failed,
            is_loading: false,
            error: Some(error),
            items: prev.items.clone(),
            using_personalization: prev.using_personalization,
            algorithm_label: prev.algorithm_label.clone(),
            generation,
        }
    }
}
