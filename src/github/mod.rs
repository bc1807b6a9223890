//! GitHub integration: REST client, perpetual discovery engine, and the
//! ecosystem taxonomy importer.
//!
//! Discovery talks to the API through the [`GithubApi`] trait so the engine
//! can be driven against a stub in tests; [`client::RestGithubClient`] is the
//! production implementation.

pub mod client;
pub mod discovery;
pub mod taxonomy;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub use client::RestGithubClient;
pub use discovery::{DiscoveryEngine, DiscoveryStats};
pub use taxonomy::{TaxonomyImporter, TaxonomyStats};

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("GITHUB_TOKEN not set")]
    MissingToken,

    /// 403 from the API. `reset_epoch` carries `X-RateLimit-Reset` when the
    /// server sent it.
    #[error("GitHub rate limited")]
    RateLimited { reset_epoch: Option<i64> },

    #[error("GitHub resource not found: {0}")]
    NotFound(String),

    #[error("GitHub API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("GitHub network error: {0}")]
    Network(String),

    #[error("GitHub response parse error: {0}")]
    Parse(String),
}

impl GithubError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GithubError::Network(_) | GithubError::Api { status: 500..=599, .. })
    }
}

/// `/users/{u}` payload, trimmed to the fields the pipeline stores.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubUser {
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub blog: Option<String>,
    pub twitter_username: Option<String>,
    #[serde(default)]
    pub followers: i64,
    #[serde(default)]
    pub following: i64,
    #[serde(default)]
    pub public_repos: i64,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubRepoOwner {
    pub login: String,
    pub avatar_url: Option<String>,
}

/// `/repos/{owner}/{name}` and repo-list payloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubRepo {
    pub full_name: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub stargazers_count: i64,
    #[serde(default)]
    pub forks_count: i64,
    pub language: Option<String>,
    #[serde(default)]
    pub owner: GithubRepoOwner,
    #[serde(default)]
    pub fork: bool,
}

/// One entry from `/repos/{owner}/{name}/contributors`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubContributor {
    pub login: String,
    #[serde(default)]
    pub contributions: i64,
    /// `User`, `Bot`, or `Organization`.
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl GithubContributor {
    pub fn is_user(&self) -> bool {
        self.kind.is_empty() || self.kind == "User"
    }
}

/// Core-resource slice of `/rate_limit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitStatus {
    pub remaining: i64,
    pub limit: i64,
    pub reset_epoch: i64,
}

/// The API surface discovery needs. Implemented by the REST client and by
/// test stubs.
#[async_trait]
pub trait GithubApi: Send + Sync {
    async fn get_user(&self, username: &str) -> Result<GithubUser, GithubError>;

    async fn get_user_repos(
        &self,
        username: &str,
        per_page: u32,
    ) -> Result<Vec<GithubRepo>, GithubError>;

    async fn get_repo(&self, full_name: &str) -> Result<GithubRepo, GithubError>;

    async fn get_contributors_page(
        &self,
        full_name: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<GithubContributor>, GithubError>;

    async fn get_org_repos(&self, org: &str, per_page: u32)
        -> Result<Vec<GithubRepo>, GithubError>;

    async fn get_org_members(
        &self,
        org: &str,
        per_page: u32,
    ) -> Result<Vec<GithubContributor>, GithubError>;

    async fn get_rate_limit(&self) -> Result<RateLimitStatus, GithubError>;
}
