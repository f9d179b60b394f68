use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{CandidateSource, ListingParams, PostListResponse};
use crate::model::CandidateItem;

/// Lemmy-compatible `GET /api/v3/post/list` client.
pub struct LemmyCandidateSource {
    base_url: String,
    client: reqwest::Client,
}

impl LemmyCandidateSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("foryou-feed/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .context("building source http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl CandidateSource for LemmyCandidateSource {
    async fn fetch(
        &self,
        params: &ListingParams,
        page: u32,
        limit: u32,
    ) -> Result<Vec<CandidateItem>> {
        let url = format!("{}/api/v3/post/list", self.base_url);
        let page = page.to_string();
        let limit = limit.to_string();
        let resp: PostListResponse = self
            .client
            .get(url)
            .query(&[
                ("type_", params.listing.as_str()),
                ("sort", params.sort.as_str()),
                ("page", page.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .context("post list request")?
            .error_for_status()
            .context("post list non-2xx")?
            .json()
            .await
            .context("decoding post list")?;

        Ok(resp.posts.into_iter().map(CandidateItem::from).collect())
    }

    fn name(&self) -> &'static str {
        "lemmy"
    }
}
