//! Environment-driven configuration, passed by reference into each
//! component at construction. No module-level mutable state.

use std::path::PathBuf;

use crate::error::PipelineError;

/// Seconds between GitHub API requests (5000/hour authenticated).
pub const GITHUB_REQUEST_DELAY_MS: u64 = 720;

/// Calls held in reserve against the GitHub hourly budget.
pub const GITHUB_RATE_LIMIT_BUFFER: i64 = 100;

/// Rows per import batch; the importer commits at this boundary.
pub const IMPORT_BATCH_SIZE: usize = 100;

/// Seconds between external enrichment-provider calls.
pub const ENRICH_RATE_LIMIT_SECS: u64 = 2;

/// Minutes after which an `in_progress` queue lease is considered stale.
pub const LEASE_TTL_MINUTES: i64 = 15;

/// Days a repository's contributor sync stays fresh.
pub const CONTRIBUTOR_SYNC_WINDOW_DAYS: i64 = 7;

/// Days a cached network path stays fresh.
pub const PATH_CACHE_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path. Defaults to `~/.talentgraph/talentgraph.db`.
    pub db_path: PathBuf,
    /// GitHub bearer token. Required for discovery; the API allows 60
    /// unauthenticated requests per hour, which is unusable.
    pub github_token: Option<String>,
    /// PhantomBuster API key. Required for LinkedIn enrichment.
    pub phantombuster_api_key: Option<String>,
    /// PhantomBuster agent id for the LinkedIn profile scraper.
    pub phantombuster_agent_id: Option<String>,
}

impl Config {
    /// Build configuration from environment variables.
    pub fn from_env() -> Self {
        let db_path = std::env::var("TALENTGRAPH_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_db_path());

        Self {
            db_path,
            github_token: read_env("GITHUB_TOKEN"),
            phantombuster_api_key: read_env("PHANTOMBUSTER_API_KEY"),
            phantombuster_agent_id: read_env("PHANTOMBUSTER_AGENT_ID"),
        }
    }

    /// `~/.talentgraph/talentgraph.db`, falling back to the working
    /// directory when no home directory exists (containers).
    pub fn default_db_path() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".talentgraph").join("talentgraph.db"))
            .unwrap_or_else(|| PathBuf::from("talentgraph.db"))
    }

    /// The GitHub token, or a fatal error for jobs that cannot run without it.
    pub fn require_github_token(&self) -> Result<&str, PipelineError> {
        self.github_token
            .as_deref()
            .ok_or_else(|| PipelineError::Fatal("GITHUB_TOKEN not set".to_string()))
    }

    /// The PhantomBuster key, or a fatal error for enrichment jobs.
    pub fn require_phantombuster_key(&self) -> Result<&str, PipelineError> {
        self.phantombuster_api_key
            .as_deref()
            .ok_or_else(|| PipelineError::Fatal("PHANTOMBUSTER_API_KEY not set".to_string()))
    }
}

/// Read an env var, treating empty and placeholder values as unset.
fn read_env(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) => {
            let value = value.trim().to_string();
            if value.is_empty() || value == "your_token_here" {
                None
            } else {
                Some(value)
            }
        }
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_github_token() {
        let config = Config {
            db_path: PathBuf::from("test.db"),
            github_token: None,
            phantombuster_api_key: None,
            phantombuster_agent_id: None,
        };
        assert!(config.require_github_token().is_err());

        let config = Config {
            github_token: Some("ghp_abc".to_string()),
            ..config
        };
        assert_eq!(config.require_github_token().unwrap(), "ghp_abc");
    }
}
