// src/config/feed.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::StalePolicy;
use crate::history::{DEFAULT_HISTORY_FOR_SCORING, DEFAULT_MAX_HISTORY, DEFAULT_MAX_VIEWED};
use crate::scoring::http::DEFAULT_TIMEOUT_SECS;
use crate::source::ListingParams;

pub const ENV_CONFIG_PATH: &str = "FEED_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/feed.toml";

pub const ENV_SCORING_BASE_URL: &str = "SCORING_BASE_URL";
pub const ENV_SCORING_TEST_MODE: &str = "SCORING_TEST_MODE";
pub const ENV_SOURCE_BASE_URL: &str = "SOURCE_BASE_URL";
pub const ENV_SOURCE_TEST_MODE: &str = "SOURCE_TEST_MODE";
pub const ENV_HISTORY_DIR: &str = "HISTORY_DIR";
pub const ENV_ANALYTICS_WEBHOOK_URL: &str = "ANALYTICS_WEBHOOK_URL";
pub const ENV_ANALYTICS_ENABLED: &str = "ANALYTICS_ENABLED";

fn default_batch_size() -> u32 {
    50
}
fn default_top_k() -> usize {
    20
}
fn default_history_for_scoring() -> usize {
    DEFAULT_HISTORY_FOR_SCORING
}
fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}
fn default_max_viewed() -> usize {
    DEFAULT_MAX_VIEWED
}
fn default_history_dir() -> PathBuf {
    PathBuf::from("data/history")
}
fn default_scoring_url() -> String {
    "http://127.0.0.1:5000/api".to_string()
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_source_url() -> String {
    "https://lemmy.ml".to_string()
}
fn default_fixture_path() -> PathBuf {
    PathBuf::from("fixtures/posts.json")
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMode {
    #[default]
    Http,
    /// Deterministic in-process scorer, no backend needed.
    Mock,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    #[default]
    Http,
    /// Serve `fixture_path` instead of calling the instance.
    Fixture,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_scoring_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub mode: GatewayMode,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_url: default_scoring_url(),
            timeout_secs: default_timeout_secs(),
            mode: GatewayMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_url")]
    pub base_url: String,
    #[serde(default)]
    pub mode: SourceMode,
    #[serde(default = "default_fixture_path")]
    pub fixture_path: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_url(),
            mode: SourceMode::default(),
            fixture_path: default_fixture_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Collection switch; when false no event reaches any sink.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Candidates fetched per refresh; oversampled so enough survive exclusion.
    #[serde(default = "default_batch_size")]
    pub candidate_batch_size: u32,
    /// Display count sent to the scorer as `top_k`.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Most recent history entries sent with each scoring request.
    #[serde(default = "default_history_for_scoring")]
    pub history_for_scoring: usize,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_max_viewed")]
    pub max_viewed: usize,
    #[serde(default)]
    pub listing: ListingParams,
    #[serde(default)]
    pub stale_policy: StalePolicy,
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            candidate_batch_size: default_batch_size(),
            top_k: default_top_k(),
            history_for_scoring: default_history_for_scoring(),
            max_history: default_max_history(),
            max_viewed: default_max_viewed(),
            listing: ListingParams::default(),
            stale_policy: StalePolicy::default(),
            history_dir: default_history_dir(),
            scoring: ScoringConfig::default(),
            source: SourceConfig::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl FeedConfig {
    /// Parse a TOML file, then apply env overrides and sanitize.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading feed config from {}", path.display()))?;
        let cfg: FeedConfig = toml::from_str(&content)
            .with_context(|| format!("parsing feed config {}", path.display()))?;
        Ok(cfg.with_env_overrides().sanitized())
    }

    /// Lookup order:
    /// 1) $FEED_CONFIG_PATH (must exist)
    /// 2) config/feed.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("FEED_CONFIG_PATH points to non-existent path"));
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        Ok(FeedConfig::default().with_env_overrides().sanitized())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_nonempty(ENV_SCORING_BASE_URL) {
            self.scoring.base_url = v;
        }
        if env_nonempty(ENV_SCORING_TEST_MODE).is_some_and(|v| v.eq_ignore_ascii_case("mock")) {
            self.scoring.mode = GatewayMode::Mock;
        }
        if let Some(v) = env_nonempty(ENV_SOURCE_BASE_URL) {
            self.source.base_url = v;
        }
        if env_nonempty(ENV_SOURCE_TEST_MODE).is_some_and(|v| v.eq_ignore_ascii_case("fixture")) {
            self.source.mode = SourceMode::Fixture;
        }
        if let Some(v) = env_nonempty(ENV_HISTORY_DIR) {
            self.history_dir = PathBuf::from(v);
        }
        if let Some(v) = env_nonempty(ENV_ANALYTICS_WEBHOOK_URL) {
            self.analytics.webhook_url = Some(v);
        }
        if let Some(v) = env_nonempty(ENV_ANALYTICS_ENABLED) {
            match v.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "off" | "no" => self.analytics.enabled = false,
                "1" | "true" | "on" | "yes" => self.analytics.enabled = true,
                other => tracing::warn!(value = other, "ignoring unrecognized ANALYTICS_ENABLED"),
            }
        }
        self
    }

    /// Zero sizes make the pipeline useless; fall back to defaults.
    fn sanitized(mut self) -> Self {
        if self.candidate_batch_size == 0 {
            self.candidate_batch_size = default_batch_size();
        }
        if self.top_k == 0 {
            self.top_k = default_top_k();
        }
        if self.history_for_scoring == 0 {
            self.history_for_scoring = default_history_for_scoring();
        }
        if self.max_history == 0 {
            self.max_history = default_max_history();
        }
        if self.max_viewed == 0 {
            self.max_viewed = default_max_viewed();
        }
        if self.scoring.timeout_secs == 0 {
            self.scoring.timeout_secs = default_timeout_secs();
        }
        // Sending more history than is retained is pointless.
        self.history_for_scoring = self.history_for_scoring.min(self.max_history);
        self
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ListingType, SortType};
    use std::env;

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: FeedConfig = toml::from_str(
            r#"
            top_k = 5
            stale_policy = "latest_started"

            [listing]
            listing = "Local"
            sort = "New"

            [scoring]
            base_url = "http://scorer:5000/api"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.top_k, 5);
        assert_eq!(cfg.candidate_batch_size, 50);
        assert_eq!(cfg.max_viewed, 200);
        assert_eq!(cfg.stale_policy, StalePolicy::LatestStarted);
        assert_eq!(cfg.listing.listing, ListingType::Local);
        assert_eq!(cfg.listing.sort, SortType::New);
        assert_eq!(cfg.scoring.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(cfg.analytics.enabled);
    }

    #[test]
    fn analytics_can_be_disabled_in_toml() {
        let cfg: FeedConfig = toml::from_str(
            r#"
            [analytics]
            enabled = false
            "#,
        )
        .unwrap();
        assert!(!cfg.analytics.enabled);
        assert!(cfg.analytics.webhook_url.is_none());
    }

    #[test]
    fn zero_sizes_are_sanitized() {
        let cfg = FeedConfig {
            candidate_batch_size: 0,
            top_k: 0,
            max_history: 3,
            history_for_scoring: 10,
            ..FeedConfig::default()
        }
        .sanitized();
        assert_eq!(cfg.candidate_batch_size, 50);
        assert_eq!(cfg.top_k, 20);
        assert_eq!(cfg.history_for_scoring, 3);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var(ENV_SCORING_TEST_MODE);
        env::remove_var(ENV_ANALYTICS_ENABLED);

        // No files in temp CWD -> defaults
        let cfg = FeedConfig::load_default().unwrap();
        assert_eq!(cfg.top_k, 20);
        assert_eq!(cfg.scoring.mode, GatewayMode::Http);

        // Env path wins, env overrides apply on top
        let p = tmp.path().join("custom.toml");
        fs::write(&p, "top_k = 7\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        env::set_var(ENV_SCORING_TEST_MODE, "mock");
        let cfg = FeedConfig::load_default().unwrap();
        assert_eq!(cfg.top_k, 7);
        assert_eq!(cfg.scoring.mode, GatewayMode::Mock);
        assert!(cfg.analytics.enabled);

        env::set_var(ENV_ANALYTICS_ENABLED, "off");
        assert!(!FeedConfig::load_default().unwrap().analytics.enabled);
        env::remove_var(ENV_ANALYTICS_ENABLED);

        // Missing env path is an error
        env::set_var(ENV_CONFIG_PATH, tmp.path().join("nope.toml").display().to_string());
        assert!(FeedConfig::load_default().is_err());

        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var(ENV_SCORING_TEST_MODE);
        env::set_current_dir(&old).unwrap();
    }
}
