// src/recorder.rs
//! View recording: one opened item → exclusion set + reading history + a
//! `post_view` analytics event. Also keeps the per-session view and
//! interaction tallies reported by `session_end`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use metrics::counter;
use tracing::{debug, warn};

use crate::analytics::{self, AnalyticsEvent, DynAnalytics};
use crate::error::Result;
use crate::history::HistoryStore;
use crate::model::ItemId;

pub const DEFAULT_VIEW_SOURCE: &str = "for_you";
pub const DEFAULT_INTERACTION_SOURCE: &str = "unknown";

/// An item the user opened.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewEvent {
    pub id: ItemId,
    pub title: String,
    pub body: String,
    pub community: String,
    pub source: String,
}

impl ViewEvent {
    pub fn new(id: impl Into<ItemId>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            community: String::new(),
            source: DEFAULT_VIEW_SOURCE.to_string(),
        }
    }
}

/// History text for one view. The title is repeated so it weighs more than
/// the body; a blank title yields nothing. Text is stored as given, blankness
/// is judged on the trimmed value.
pub fn weighted_content(title: &str, body: &str) -> Option<String> {
    if title.trim().is_empty() {
        None
    } else if body.trim().is_empty() {
        Some(title.to_string())
    } else {
        Some(format!("{title} {title} {body}"))
    }
}

/// Tallies reported when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub duration_seconds: u64,
    pub posts_viewed: usize,
    pub interactions: usize,
}

struct SessionCounters {
    started: Mutex<Instant>,
    posts_viewed: AtomicUsize,
    interactions: AtomicUsize,
}

impl SessionCounters {
    fn new() -> Self {
        Self {
            started: Mutex::new(Instant::now()),
            posts_viewed: AtomicUsize::new(0),
            interactions: AtomicUsize::new(0),
        }
    }

    /// Read and reset in one step; the next session starts now.
    fn take(&self) -> SessionSummary {
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        let summary = SessionSummary {
            duration_seconds: started.elapsed().as_secs(),
            posts_viewed: self.posts_viewed.swap(0, Ordering::SeqCst),
            interactions: self.interactions.swap(0, Ordering::SeqCst),
        };
        *started = Instant::now();
        summary
    }
}

#[derive(Clone)]
pub struct ViewEventRecorder {
    history: Arc<HistoryStore>,
    analytics: DynAnalytics,
    session: Arc<SessionCounters>,
}

impl ViewEventRecorder {
    pub fn new(history: Arc<HistoryStore>, analytics: DynAnalytics) -> Self {
        Self {
            history,
            analytics,
            session: Arc::new(SessionCounters::new()),
        }
    }

    pub fn record_view(&self, id: impl Into<ItemId>, title: &str, body: &str) -> Result<()> {
        self.record_view_with(ViewEvent::new(id, title, body))
    }

    /// Marks the id viewed and records weighted content. Each step is retried
    /// once; analytics only fires when both succeeded. Needs a tokio runtime
    /// for the analytics spawn.
    pub fn record_view_with(&self, ev: ViewEvent) -> Result<()> {
        retry_once("mark_viewed", || self.history.mark_viewed(&ev.id))?;

        let content = weighted_content(&ev.title, &ev.body);
        match &content {
            Some(text) => retry_once("record_content", || self.history.record_content(text))?,
            None => debug!(target: "recorder", id = %ev.id, "blank title; no history content"),
        }

        counter!("history_views_recorded_total").increment(1);
        self.session.posts_viewed.fetch_add(1, Ordering::SeqCst);
        let content_length = content.as_deref().map_or(0, |c| c.chars().count());
        analytics::emit(
            &self.analytics,
            AnalyticsEvent::post_view(&ev.id, &ev.title, &ev.community, content_length, &ev.source),
        );
        Ok(())
    }

    /// Upvote, save, share... Touches analytics and the session tally only;
    /// history and the exclusion set are left alone.
    pub fn record_interaction(&self, id: &ItemId, action_type: &str, source: Option<&str>) {
        let source = source
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_INTERACTION_SOURCE);
        self.session.interactions.fetch_add(1, Ordering::SeqCst);
        analytics::emit(
            &self.analytics,
            AnalyticsEvent::post_interaction(id, action_type, source),
        );
    }

    /// Emits `session_end` with the tallies since the previous call (or since
    /// construction) and starts a new session.
    pub fn end_session(&self) -> SessionSummary {
        let summary = self.session.take();
        debug!(
            target: "recorder",
            duration_seconds = summary.duration_seconds,
            posts_viewed = summary.posts_viewed,
            interactions = summary.interactions,
            "session ended"
        );
        analytics::emit(
            &self.analytics,
            AnalyticsEvent::SessionEnd {
                duration_seconds: summary.duration_seconds,
                posts_viewed: summary.posts_viewed,
                interactions: summary.interactions,
                ts: Utc::now(),
            },
        );
        summary
    }
}

fn retry_once<F>(step: &'static str, mut op: F) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    match op() {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!(target: "recorder", step, error = %first, "persistence failed; retrying once");
            op()
        }
    }
}
