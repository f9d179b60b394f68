// src/source/mod.rs
//! Candidate source: paginated retrieval of posts from the primary feed.
//! The engine only needs "page N of items" and treats failures as opaque.

pub mod fixture;
pub mod lemmy;

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::model::CandidateItem;

pub use fixture::FixtureCandidateSource;
pub use lemmy::LemmyCandidateSource;

/// Which listing to pull candidates from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingType {
    #[default]
    All,
    Local,
    Subscribed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortType {
    #[default]
    Active,
    Hot,
    New,
    TopDay,
    TopWeek,
}

impl ListingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingType::All => "All",
            ListingType::Local => "Local",
            ListingType::Subscribed => "Subscribed",
        }
    }
}

impl SortType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortType::Active => "Active",
            SortType::Hot => "Hot",
            SortType::New => "New",
            SortType::TopDay => "TopDay",
            SortType::TopWeek => "TopWeek",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingParams {
    #[serde(default)]
    pub listing: ListingType,
    #[serde(default)]
    pub sort: SortType,
}

#[async_trait::async_trait]
pub trait CandidateSource: Send + Sync {
    /// Fetch one page. The returned order is the default, non-personalized order.
    async fn fetch(&self, params: &ListingParams, page: u32, limit: u32)
        -> Result<Vec<CandidateItem>>;
    fn name(&self) -> &'static str;
}

pub type DynCandidateSource = Arc<dyn CandidateSource>;

// Lemmy `post/list` response shape, shared by the HTTP and fixture sources.
#[derive(Debug, Deserialize)]
pub(crate) struct PostListResponse {
    #[serde(default)]
    pub posts: Vec<PostView>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostView {
    pub post: Post,
    #[serde(default)]
    pub community: Option<NamedRef>,
    #[serde(default)]
    pub creator: Option<NamedRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Post {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NamedRef {
    pub name: String,
}

impl From<PostView> for CandidateItem {
    fn from(v: PostView) -> Self {
        CandidateItem {
            id: v.post.id.into(),
            title: v.post.name,
            body: v.post.body.unwrap_or_default(),
            owner: crate::model::OwnerContext {
                community: v.community.map(|c| c.name).unwrap_or_default(),
                author: v.creator.map(|c| c.name).unwrap_or_default(),
            },
        }
    }
}

pub(crate) fn parse_post_list(json: &str) -> Result<Vec<CandidateItem>> {
    let resp: PostListResponse = serde_json::from_str(json)?;
    Ok(resp.posts.into_iter().map(CandidateItem::from).collect())
}
