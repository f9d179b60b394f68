//! HTTP scoring gateway (`POST {base}/score`, `GET {base}/health`).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ScoreRequest, ScoreResponse, ScoringFailure, ScoringGateway, ScoringOutcome};
use crate::model::CandidateItem;
use crate::telemetry::truncate_chars;

pub const DEFAULT_TIMEOUT_SECS: u64 = 12;
const CONNECT_TIMEOUT_SECS: u64 = 4;
const ERROR_BODY_MAX: usize = 200;

pub struct HttpScoringGateway {
    http: reqwest::Client,
    base_url: String,
}

impl HttpScoringGateway {
    /// `base_url` is the API root, e.g. `http://10.0.2.2:5000/api`.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("foryou-feed/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

fn transport_failure(e: reqwest::Error) -> ScoringFailure {
    if e.is_timeout() {
        ScoringFailure::Network(format!("timed out: {e}"))
    } else if e.is_decode() {
        ScoringFailure::Upstream(format!("malformed response: {e}"))
    } else {
        ScoringFailure::Network(e.to_string())
    }
}

#[async_trait]
impl ScoringGateway for HttpScoringGateway {
    async fn score(
        &self,
        history_texts: &[String],
        candidates: &[CandidateItem],
        top_k: usize,
    ) -> Result<ScoringOutcome, ScoringFailure> {
        let req = ScoreRequest::build(history_texts, candidates, top_k);
        let t0 = Instant::now();

        let resp = self
            .http
            .post(self.url("score"))
            .json(&req)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(target: "scoring", %status, "scoring backend returned non-2xx");
            return Err(ScoringFailure::Upstream(format!(
                "{}: {}",
                status.as_u16(),
                truncate_chars(body.trim(), ERROR_BODY_MAX)
            )));
        }

        let body: ScoreResponse = resp.json().await.map_err(|e| {
            ScoringFailure::Upstream(format!("malformed response: {e}"))
        })?;

        debug!(
            target: "scoring",
            candidates = candidates.len(),
            scored = body.scored_candidates.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "scoring call finished"
        );
        body.into_outcome()
    }

    async fn health(&self) -> Result<(), ScoringFailure> {
        let resp = self
            .http
            .get(self.url("health"))
            .send()
            .await
            .map_err(transport_failure)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ScoringFailure::Upstream(format!(
                "health check returned {}",
                resp.status().as_u16()
            )))
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_normalized() {
        let g = HttpScoringGateway::new("http://localhost:5000/api/", Duration::from_secs(1))
            .unwrap();
        assert_eq!(g.url("score"), "http://localhost:5000/api/score");
    }
}
