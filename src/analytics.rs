//! Analytics sinks: read-only copies of user-facing events.
//!
//! The core never awaits a sink. `emit` spawns the delivery and only logs a
//! failure, so analytics can never affect history or feed state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use reqwest::Client;
use serde::Serialize;

use crate::model::ItemId;
use crate::telemetry::{anon_hash, truncate_chars};

pub const TITLE_MAX_CHARS: usize = 100;
pub const COMMUNITY_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    PostView {
        post_id: ItemId,
        post_title: String,
        community: String,
        content_length: usize,
        view_source: String,
        ts: DateTime<Utc>,
    },
    PostInteraction {
        post_id: ItemId,
        action_type: String,
        source: String,
        ts: DateTime<Utc>,
    },
    ForYouTabView {
        ts: DateTime<Utc>,
    },
    RecommendationRequest {
        history_size: usize,
        candidate_count: usize,
        response_time_ms: u64,
        success: bool,
        ts: DateTime<Utc>,
    },
    SessionEnd {
        duration_seconds: u64,
        posts_viewed: usize,
        interactions: usize,
        ts: DateTime<Utc>,
    },
}

impl AnalyticsEvent {
    /// Builds a `PostView`, truncating free text to the collector's limits.
    pub fn post_view(
        post_id: &ItemId,
        title: &str,
        community: &str,
        content_length: usize,
        source: &str,
    ) -> Self {
        AnalyticsEvent::PostView {
            post_id: post_id.clone(),
            post_title: truncate_chars(title, TITLE_MAX_CHARS),
            community: truncate_chars(community, COMMUNITY_MAX_CHARS),
            content_length,
            view_source: source.to_string(),
            ts: Utc::now(),
        }
    }

    /// Upvote, save, share, comment and friends.
    pub fn post_interaction(post_id: &ItemId, action_type: &str, source: &str) -> Self {
        AnalyticsEvent::PostInteraction {
            post_id: post_id.clone(),
            action_type: action_type.to_string(),
            source: source.to_string(),
            ts: Utc::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AnalyticsEvent::PostView { .. } => "post_view",
            AnalyticsEvent::PostInteraction { .. } => "post_interaction",
            AnalyticsEvent::SessionEnd { .. } => "session_end",
            AnalyticsEvent::ForYouTabView { .. } => "for_you_tab_view",
            AnalyticsEvent::RecommendationRequest { .. } => "recommendation_request",
        }
    }
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, ev: &AnalyticsEvent) -> Result<()>;
    fn name(&self) -> &'static str;
}

pub type DynAnalytics = Arc<dyn AnalyticsSink>;

/// Fire-and-forget delivery. Must be called from within a tokio runtime.
pub fn emit(sink: &DynAnalytics, ev: AnalyticsEvent) {
    let sink = Arc::clone(sink);
    tokio::spawn(async move {
        counter!("analytics_events_total", "event" => ev.name()).increment(1);
        if let Err(e) = sink.record(&ev).await {
            tracing::warn!(target: "analytics", sink = sink.name(), event = ev.name(), error = ?e, "analytics delivery failed");
        }
    });
}

/// Writes events to the `analytics` tracing target. Titles are hashed.
#[derive(Debug, Default, Clone)]
pub struct LogAnalytics;

#[async_trait]
impl AnalyticsSink for LogAnalytics {
    async fn record(&self, ev: &AnalyticsEvent) -> Result<()> {
        match ev {
            AnalyticsEvent::PostView {
                post_id,
                post_title,
                content_length,
                view_source,
                ..
            } => tracing::info!(
                target: "analytics",
                event = ev.name(),
                %post_id,
                title = %anon_hash(post_title),
                content_length,
                view_source = %view_source,
                "analytics event"
            ),
            AnalyticsEvent::PostInteraction {
                post_id,
                action_type,
                source,
                ..
            } => tracing::info!(
                target: "analytics",
                event = ev.name(),
                %post_id,
                action_type = %action_type,
                source = %source,
                "analytics event"
            ),
            AnalyticsEvent::SessionEnd {
                duration_seconds,
                posts_viewed,
                interactions,
                ..
            } => tracing::info!(
                target: "analytics",
                event = ev.name(),
                duration_seconds,
                posts_viewed,
                interactions,
                "analytics event"
            ),
            AnalyticsEvent::ForYouTabView { .. } => {
                tracing::info!(target: "analytics", event = ev.name(), "analytics event")
            }
            AnalyticsEvent::RecommendationRequest {
                history_size,
                candidate_count,
                response_time_ms,
                success,
                ..
            } => tracing::info!(
                target: "analytics",
                event = ev.name(),
                history_size,
                candidate_count,
                response_time_ms,
                success,
                "analytics event"
            ),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// POSTs each event as JSON to a collector endpoint.
pub struct WebhookAnalytics {
    url: String,
    client: Client,
}

impl WebhookAnalytics {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl AnalyticsSink for WebhookAnalytics {
    async fn record(&self, ev: &AnalyticsEvent) -> Result<()> {
        self.client
            .post(&self.url)
            .json(ev)
            .send()
            .await
            .context("analytics post")?
            .error_for_status()
            .context("analytics non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Fans one event out to several sinks; a failing sink does not stop the others.
/// While collection is disabled every event is dropped before any sink sees it.
pub struct AnalyticsMux {
    sinks: Vec<DynAnalytics>,
    enabled: AtomicBool,
}

impl AnalyticsMux {
    pub fn new(sinks: Vec<DynAnalytics>) -> Self {
        Self {
            sinks,
            enabled: AtomicBool::new(true),
        }
    }

    /// Log sink always; webhook sink when a URL is configured.
    pub fn with_webhook(url: Option<String>) -> Self {
        let mut sinks: Vec<DynAnalytics> = vec![Arc::new(LogAnalytics)];
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            sinks.push(Arc::new(WebhookAnalytics::new(url)));
        }
        Self::new(sinks)
    }

    /// Privacy switch. Takes effect for events recorded after the call.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        tracing::info!(target: "analytics", enabled, "analytics collection toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalyticsSink for AnalyticsMux {
    async fn record(&self, ev: &AnalyticsEvent) -> Result<()> {
        if !self.is_enabled() {
            tracing::debug!(target: "analytics", event = ev.name(), "collection disabled; event dropped");
            return Ok(());
        }
        for s in &self.sinks {
            if let Err(e) = s.record(ev).await {
                tracing::warn!(target: "analytics", sink = s.name(), error = ?e, "sink failed");
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mux"
    }
}
