use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{parse_post_list, CandidateSource, ListingParams};
use crate::model::CandidateItem;

/// Serves a fixed post list (Lemmy `post/list` JSON). Pages past the first are empty.
pub struct FixtureCandidateSource {
    items: Vec<CandidateItem>,
}

impl FixtureCandidateSource {
    pub fn from_items(items: Vec<CandidateItem>) -> Self {
        Self { items }
    }

    pub fn from_fixture_str(json: &str) -> Result<Self> {
        Ok(Self {
            items: parse_post_list(json).context("parsing post list fixture")?,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture from {}", path.display()))?;
        Self::from_fixture_str(&json)
    }
}

#[async_trait]
impl CandidateSource for FixtureCandidateSource {
    async fn fetch(
        &self,
        _params: &ListingParams,
        page: u32,
        limit: u32,
    ) -> Result<Vec<CandidateItem>> {
        let page = page.max(1) as usize;
        let limit = limit as usize;
        Ok(self
            .items
            .iter()
            .skip((page - 1) * limit)
            .take(limit)
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
