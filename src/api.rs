use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::analytics::AnalyticsMux;
use crate::bootstrap::FeedRuntime;
use crate::error::FeedError;
use crate::history::HistoryStore;
use crate::model::{FeedPhase, FeedState, ItemId};
use crate::recorder::{SessionSummary, ViewEvent, ViewEventRecorder, DEFAULT_VIEW_SOURCE};
use crate::source::{ListingParams, ListingType, SortType};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<crate::engine::RecommendationEngine>,
    pub recorder: ViewEventRecorder,
    pub history: Arc<HistoryStore>,
    pub analytics: Arc<AnalyticsMux>,
}

impl AppState {
    pub fn from_runtime(rt: &FeedRuntime) -> Self {
        Self {
            engine: Arc::clone(&rt.engine),
            recorder: rt.recorder.clone(),
            history: Arc::clone(&rt.history),
            analytics: Arc::clone(&rt.analytics),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/feed", get(get_feed))
        .route("/feed/refresh", post(refresh_feed))
        .route("/feed/view", post(record_view))
        .route("/feed/interaction", post(record_interaction))
        .route("/session/end", post(end_session))
        .route("/history", get(history_stats).delete(clear_history))
        .route("/analytics", get(analytics_status).put(set_analytics))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Persistence failures surface as 500 with the error kind.
struct ApiError(FeedError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

impl From<FeedError> for ApiError {
    fn from(e: FeedError) -> Self {
        ApiError(e)
    }
}

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
}

#[derive(Serialize)]
struct ItemView {
    id: ItemId,
    title: String,
    body: String,
    community: String,
}

#[derive(Serialize)]
pub struct FeedView {
    phase: FeedPhase,
    is_loading: bool,
    error: Option<String>,
    error_kind: Option<&'static str>,
    items: Vec<ItemView>,
    using_personalization: bool,
    algorithm: Option<String>,
    generation: u64,
}

impl From<FeedState> for FeedView {
    fn from(s: FeedState) -> Self {
        Self {
            phase: s.phase,
            is_loading: s.is_loading,
            error: s.error.as_ref().map(|e| e.to_string()),
            error_kind: s.error.as_ref().map(FeedError::kind),
            items: s
                .items
                .into_iter()
                .map(|c| ItemView {
                    id: c.id,
                    title: c.title,
                    body: c.body,
                    community: c.owner.community,
                })
                .collect(),
            using_personalization: s.using_personalization,
            algorithm: s.algorithm_label,
            generation: s.generation,
        }
    }
}

async fn get_feed(State(state): State<AppState>) -> Json<FeedView> {
    Json(state.engine.state().into())
}

#[derive(Deserialize, Default)]
struct RefreshQuery {
    #[serde(default)]
    wait: bool,
    listing: Option<ListingType>,
    sort: Option<SortType>,
}

#[derive(Serialize)]
struct Accepted {
    generation: u64,
}

async fn refresh_feed(State(state): State<AppState>, Query(q): Query<RefreshQuery>) -> Response {
    let defaults = state.engine.settings().listing;
    let params = ListingParams {
        listing: q.listing.unwrap_or(defaults.listing),
        sort: q.sort.unwrap_or(defaults.sort),
    };
    let (generation, handle) = state.engine.spawn_refresh(params);

    if q.wait {
        if let Err(e) = handle.await {
            warn!(error = ?e, "refresh task did not complete");
        }
        return Json(FeedView::from(state.engine.state())).into_response();
    }
    (StatusCode::ACCEPTED, Json(Accepted { generation })).into_response()
}

#[derive(Deserialize)]
struct ViewReq {
    id: ItemId,
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    community: String,
    #[serde(default)]
    source: Option<String>,
}

async fn record_view(
    State(state): State<AppState>,
    Json(req): Json<ViewReq>,
) -> Result<StatusCode, ApiError> {
    let ev = ViewEvent {
        id: req.id,
        title: req.title,
        body: req.body,
        community: req.community,
        source: req.source.unwrap_or_else(|| DEFAULT_VIEW_SOURCE.to_string()),
    };
    // Store writes block; keep them off the runtime workers.
    let recorder = state.recorder.clone();
    tokio::task::spawn_blocking(move || recorder.record_view_with(ev))
        .await
        .map_err(|e| FeedError::Persistence(format!("view task failed: {e}")))??;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct InteractionReq {
    id: ItemId,
    action: String,
    #[serde(default)]
    source: Option<String>,
}

async fn record_interaction(
    State(state): State<AppState>,
    Json(req): Json<InteractionReq>,
) -> Response {
    let action = req.action.trim();
    if action.is_empty() {
        return bad_request("action must not be blank");
    }
    state
        .recorder
        .record_interaction(&req.id, action, req.source.as_deref());
    StatusCode::NO_CONTENT.into_response()
}

async fn end_session(State(state): State<AppState>) -> Json<SessionSummary> {
    Json(state.recorder.end_session())
}

#[derive(Serialize)]
struct HistoryStats {
    history_count: usize,
    viewed_count: usize,
}

async fn history_stats(State(state): State<AppState>) -> Result<Json<HistoryStats>, ApiError> {
    let stats = state
        .history
        .blocking(|h| {
            Ok(HistoryStats {
                history_count: h.history_count()?,
                viewed_count: h.viewed_count()?,
            })
        })
        .await?;
    Ok(Json(stats))
}

async fn clear_history(State(state): State<AppState>) -> Result<Response, ApiError> {
    let (generation, _reload) = state.engine.clear_history().await?;
    Ok((StatusCode::ACCEPTED, Json(Accepted { generation })).into_response())
}

#[derive(Serialize, Deserialize)]
struct AnalyticsToggle {
    enabled: bool,
}

async fn analytics_status(State(state): State<AppState>) -> Json<AnalyticsToggle> {
    Json(AnalyticsToggle {
        enabled: state.analytics.is_enabled(),
    })
}

async fn set_analytics(
    State(state): State<AppState>,
    Json(req): Json<AnalyticsToggle>,
) -> Json<AnalyticsToggle> {
    state.analytics.set_enabled(req.enabled);
    Json(AnalyticsToggle {
        enabled: state.analytics.is_enabled(),
    })
}
