// tests/scoring_http.rs
//
// HttpScoringGateway against a fake scoring backend on an ephemeral port.
//
// Covered:
// - request shape (history_contents, candidates, top_k)
// - success payload with numeric ids
// - success=false, non-2xx, malformed body, timeout, unreachable host
// - health probe

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use foryou_feed::model::{CandidateItem, ItemId};
use foryou_feed::scoring::{HttpScoringGateway, ScoreRequest, ScoringFailure, ScoringGateway};

#[derive(Clone, Default)]
struct Backend {
    last_request: Arc<Mutex<Option<ScoreRequest>>>,
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake backend");
    });
    format!("http://{addr}/api")
}

fn gateway(base: &str, timeout: Duration) -> HttpScoringGateway {
    HttpScoringGateway::new(base, timeout).expect("gateway")
}

fn candidates() -> Vec<CandidateItem> {
    vec![
        CandidateItem::new(1_i64, "Rust async", "tokio"),
        CandidateItem::new(2_i64, "Baking", "bread"),
    ]
}

#[tokio::test]
async fn successful_scoring_round_trip() {
    let backend = Backend::default();
    let app = Router::new()
        .route(
            "/api/score",
            post(|State(b): State<Backend>, Json(req): Json<ScoreRequest>| async move {
                *b.last_request.lock().unwrap() = Some(req);
                Json(json!({
                    "success": true,
                    "algorithm": "tfidf",
                    "count": 2,
                    "scored_candidates": [
                        {"id": 2, "similarity_score": 0.85},
                        {"id": "1", "similarity_score": 0.12}
                    ],
                    "note": "warm cache"
                }))
            }),
        )
        .with_state(backend.clone());
    let base = serve(app).await;

    let out = gateway(&base, Duration::from_secs(5))
        .score(&["Rust async Rust async tokio".to_string()], &candidates(), 20)
        .await
        .expect("scores");

    assert_eq!(out.algorithm.as_deref(), Some("tfidf"));
    assert_eq!(out.note.as_deref(), Some("warm cache"));
    let m = out.score_map();
    assert_eq!(m[&ItemId::from(2_i64)], 0.85);
    assert_eq!(m[&ItemId::from(1_i64)], 0.12);

    let req = backend.last_request.lock().unwrap().clone().expect("request seen");
    assert_eq!(req.top_k, 20);
    assert_eq!(req.history_contents, vec!["Rust async Rust async tokio"]);
    assert_eq!(req.candidates.len(), 2);
    assert_eq!(req.candidates[0].id, "1");
    assert_eq!(req.candidates[1].title, "Baking");
}

#[tokio::test]
async fn unsuccessful_payload_maps_to_empty_result() {
    let app = Router::new().route(
        "/api/score",
        post(|| async { Json(json!({"success": false, "error": "Model not loaded"})) }),
    );
    let base = serve(app).await;

    let err = gateway(&base, Duration::from_secs(5))
        .score(&["h".to_string()], &candidates(), 20)
        .await
        .unwrap_err();

    assert_eq!(err, ScoringFailure::EmptyResult("Model not loaded".into()));
}

#[tokio::test]
async fn non_2xx_maps_to_upstream_with_code() {
    let app = Router::new().route(
        "/api/score",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response() }),
    );
    let base = serve(app).await;

    let err = gateway(&base, Duration::from_secs(5))
        .score(&["h".to_string()], &candidates(), 20)
        .await
        .unwrap_err();

    assert_eq!(err, ScoringFailure::Upstream("500: boom".into()));
}

#[tokio::test]
async fn malformed_body_maps_to_upstream() {
    let app = Router::new().route("/api/score", post(|| async { "not json" }));
    let base = serve(app).await;

    let err = gateway(&base, Duration::from_secs(5))
        .score(&["h".to_string()], &candidates(), 20)
        .await
        .unwrap_err();

    assert!(matches!(err, ScoringFailure::Upstream(ref m) if m.starts_with("malformed response")));
}

#[tokio::test]
async fn slow_backend_times_out_as_network() {
    let app = Router::new().route(
        "/api/score",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(Value::Null)
        }),
    );
    let base = serve(app).await;

    let err = gateway(&base, Duration::from_millis(200))
        .score(&["h".to_string()], &candidates(), 20)
        .await
        .unwrap_err();

    assert!(matches!(err, ScoringFailure::Network(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_backend_is_network() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = gateway(&format!("http://{addr}/api"), Duration::from_secs(2))
        .score(&["h".to_string()], &candidates(), 20)
        .await
        .unwrap_err();

    assert!(matches!(err, ScoringFailure::Network(_)), "got {err:?}");
}

#[tokio::test]
async fn health_probe_reports_status() {
    let app = Router::new().route("/api/health", get(|| async { Json(json!({"status": "ok"})) }));
    let base = serve(app).await;
    assert!(gateway(&base, Duration::from_secs(2)).health().await.is_ok());

    let app = Router::new().route(
        "/api/health",
        get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    let base = serve(app).await;
    assert!(matches!(
        gateway(&base, Duration::from_secs(2)).health().await,
        Err(ScoringFailure::Upstream(_))
    ));
}
