//! GitHub REST client.
//!
//! Bearer-token auth against `https://api.github.com`. The client paces
//! itself from the `X-RateLimit-Remaining` / `X-RateLimit-Reset` headers:
//! when the remaining budget drops to the reserve buffer it sleeps until the
//! window resets. Transient failures retry up to 3 times with exponential
//! backoff and jitter; 403 and 404 are surfaced to the caller, which decides
//! whether to wait or skip.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::RngExt;
use serde::de::DeserializeOwned;

use super::{
    GithubApi, GithubContributor, GithubError, GithubRepo, GithubUser, RateLimitStatus,
};
use crate::config::{GITHUB_RATE_LIMIT_BUFFER, GITHUB_REQUEST_DELAY_MS};

const API_BASE: &str = "https://api.github.com";
const MAX_ATTEMPTS: u32 = 3;
const USER_AGENT: &str = concat!("talentgraph/", env!("CARGO_PKG_VERSION"));

pub struct RestGithubClient {
    http: reqwest::Client,
    token: String,
    remaining: AtomicI64,
    reset_epoch: AtomicI64,
}

impl RestGithubClient {
    pub fn new(token: &str) -> Result<Self, GithubError> {
        if token.trim().is_empty() {
            return Err(GithubError::MissingToken);
        }
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GithubError::Network(e.to_string()))?;
        Ok(Self {
            http,
            token: token.to_string(),
            remaining: AtomicI64::new(i64::MAX),
            reset_epoch: AtomicI64::new(0),
        })
    }

    /// Sleep out the window when the tracked budget is down to the reserve.
    async fn wait_for_budget(&self) {
        let remaining = self.remaining.load(Ordering::Relaxed);
        if remaining > GITHUB_RATE_LIMIT_BUFFER {
            return;
        }
        let reset = self.reset_epoch.load(Ordering::Relaxed);
        let now = chrono::Utc::now().timestamp();
        if reset > now {
            let wait = (reset - now).min(3600) as u64 + 1;
            log::warn!(
                "GithubClient: {} calls left in window, sleeping {}s until reset",
                remaining,
                wait
            );
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }
    }

    fn record_headers(&self, headers: &reqwest::header::HeaderMap) {
        if let Some(remaining) = header_i64(headers, "x-ratelimit-remaining") {
            self.remaining.store(remaining, Ordering::Relaxed);
        }
        if let Some(reset) = header_i64(headers, "x-ratelimit-reset") {
            self.reset_epoch.store(reset, Ordering::Relaxed);
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GithubError> {
        let url = format!("{API_BASE}{path}");
        let mut last_error = GithubError::Network("no attempt made".to_string());

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
            self.wait_for_budget().await;

            let response = self
                .http
                .get(&url)
                .query(query)
                .header("Authorization", format!("token {}", self.token))
                .header("Accept", "application/vnd.github.v3+json")
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    last_error = GithubError::Network(e.to_string());
                    continue;
                }
            };

            self.record_headers(response.headers());
            let status = response.status();

            if status.is_success() {
                // Steady pacing keeps us inside the 5000/hour budget even
                // when the headers lag behind
                tokio::time::sleep(Duration::from_millis(GITHUB_REQUEST_DELAY_MS)).await;
                return response
                    .json::<T>()
                    .await
                    .map_err(|e| GithubError::Parse(e.to_string()));
            }

            match status.as_u16() {
                404 => return Err(GithubError::NotFound(path.to_string())),
                403 | 429 => {
                    let reset = self.reset_epoch.load(Ordering::Relaxed);
                    return Err(GithubError::RateLimited {
                        reset_epoch: (reset > 0).then_some(reset),
                    });
                }
                status_code @ 500..=599 => {
                    last_error = GithubError::Api {
                        status: status_code,
                        body: response.text().await.unwrap_or_default(),
                    };
                    continue;
                }
                status_code => {
                    return Err(GithubError::Api {
                        status: status_code,
                        body: response.text().await.unwrap_or_default(),
                    })
                }
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl GithubApi for RestGithubClient {
    async fn get_user(&self, username: &str) -> Result<GithubUser, GithubError> {
        self.get_json(&format!("/users/{username}"), &[]).await
    }

    async fn get_user_repos(
        &self,
        username: &str,
        per_page: u32,
    ) -> Result<Vec<GithubRepo>, GithubError> {
        self.get_json(
            &format!("/users/{username}/repos"),
            &[("per_page", per_page.to_string()), ("sort", "updated".to_string())],
        )
        .await
    }

    async fn get_repo(&self, full_name: &str) -> Result<GithubRepo, GithubError> {
        self.get_json(&format!("/repos/{full_name}"), &[]).await
    }

    async fn get_contributors_page(
        &self,
        full_name: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<GithubContributor>, GithubError> {
        self.get_json(
            &format!("/repos/{full_name}/contributors"),
            &[
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
                ("anon", "false".to_string()),
            ],
        )
        .await
    }

    async fn get_org_repos(
        &self,
        org: &str,
        per_page: u32,
    ) -> Result<Vec<GithubRepo>, GithubError> {
        self.get_json(
            &format!("/orgs/{org}/repos"),
            &[("per_page", per_page.to_string())],
        )
        .await
    }

    async fn get_org_members(
        &self,
        org: &str,
        per_page: u32,
    ) -> Result<Vec<GithubContributor>, GithubError> {
        self.get_json(
            &format!("/orgs/{org}/members"),
            &[("per_page", per_page.to_string())],
        )
        .await
    }

    async fn get_rate_limit(&self) -> Result<RateLimitStatus, GithubError> {
        #[derive(serde::Deserialize)]
        struct RateLimitBody {
            resources: Resources,
        }
        #[derive(serde::Deserialize)]
        struct Resources {
            core: Core,
        }
        #[derive(serde::Deserialize)]
        struct Core {
            remaining: i64,
            limit: i64,
            reset: i64,
        }

        let body: RateLimitBody = self.get_json("/rate_limit", &[]).await?;
        let status = RateLimitStatus {
            remaining: body.resources.core.remaining,
            limit: body.resources.core.limit,
            reset_epoch: body.resources.core.reset,
        };
        self.remaining.store(status.remaining, Ordering::Relaxed);
        self.reset_epoch.store(status.reset_epoch, Ordering::Relaxed);
        Ok(status)
    }
}

/// Exponential backoff with jitter: 500ms, 1s, 2s… plus up to 250ms noise.
fn backoff_delay(attempt: u32) -> Duration {
    let base = 500u64.saturating_mul(1 << attempt.min(6));
    let jitter = rand::rng().random_range(0..250);
    Duration::from_millis(base + jitter)
}

fn header_i64(headers: &reqwest::header::HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}
