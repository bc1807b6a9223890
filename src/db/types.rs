//! Shared type definitions for the database layer.
//!
//! Each query result gets its own record type with documented fields; there
//! is no shared mega-struct across unrelated call sites.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// A row from the `person` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbPerson {
    pub person_id: String,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub headline: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub linkedin_url: Option<String>,
    pub normalized_linkedin_url: Option<String>,
    pub needs_enrichment: bool,
    pub refreshed_at: Option<String>,
    pub created_at: String,
}

/// Nullable field updates applied with COALESCE semantics: a populated
/// column is never overwritten, only filled when currently NULL.
#[derive(Debug, Clone, Default)]
pub struct PersonPatch {
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub headline: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

impl PersonPatch {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.headline.is_none()
            && self.location.is_none()
            && self.description.is_none()
    }
}

/// A row from the `company` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbCompany {
    pub company_id: String,
    pub company_name: String,
    pub company_domain: String,
    pub website_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub size_bucket: Option<String>,
    pub founded_year: Option<i32>,
    pub taxonomy_slug: Option<String>,
}

/// Company row joined with its employment count, as consumed by the
/// deduplication pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDedupRow {
    pub company_id: String,
    pub company_name: String,
    pub company_domain: String,
    pub linkedin_url: Option<String>,
    pub website_url: Option<String>,
    pub founded_year: Option<i32>,
    pub employee_count: i64,
}

/// A row from the `person_email` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbEmail {
    pub email: String,
    pub email_type: String,
    pub is_primary: bool,
    pub source: Option<String>,
}

/// A row from the `github_profile` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbGithubProfile {
    pub github_profile_id: String,
    pub github_username: String,
    pub person_id: Option<String>,
    pub github_name: Option<String>,
    pub github_email: Option<String>,
    pub github_company: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub blog: Option<String>,
    pub twitter_username: Option<String>,
    pub followers: i64,
    pub following: i64,
    pub public_repos: i64,
    pub avatar_url: Option<String>,
    pub importance_score: Option<f64>,
    pub source: Option<String>,
    pub last_enriched: Option<String>,
}

/// An orphan profile (no linked person) joined with its contribution count,
/// as consumed by the promotion engine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanProfile {
    pub github_profile_id: String,
    pub github_username: String,
    pub github_name: Option<String>,
    pub github_email: Option<String>,
    pub github_company: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub followers: i64,
    pub public_repos: i64,
    pub contribution_count: i64,
}

/// A row from the `github_repository` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbGithubRepository {
    pub repo_id: String,
    pub full_name: String,
    pub owner_username: Option<String>,
    pub repo_name: Option<String>,
    pub description: Option<String>,
    pub stars: i64,
    pub forks: i64,
    pub language: Option<String>,
    pub importance_score: Option<f64>,
    pub contributor_count: Option<i64>,
    pub last_contributor_sync: Option<String>,
}

/// A repository selected for contributor discovery, with its effective
/// ecosystem priority tier (1 = highest, 5 = untagged).
#[derive(Debug, Clone)]
pub struct SyncCandidate {
    pub repo_id: String,
    pub full_name: String,
    pub stars: i64,
    pub priority_tier: i64,
    pub last_contributor_sync: Option<String>,
}

/// A row from the `crypto_ecosystem` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbEcosystem {
    pub ecosystem_id: String,
    pub ecosystem_name: String,
    pub normalized_name: Option<String>,
    pub ecosystem_type: Option<String>,
    pub priority_tier: i64,
}

/// A leased enrichment-queue item joined with the person's external URL.
#[derive(Debug, Clone)]
pub struct QueueLease {
    pub queue_id: String,
    pub person_id: String,
    pub full_name: Option<String>,
    pub linkedin_url: Option<String>,
    pub priority: i64,
    pub attempts: i64,
}

/// Per-status queue depth counters.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Counts of a person's owned edges, used by the merge engine to decide
/// whether a duplicate record is safe to delete.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersonEdgeCounts {
    pub employment: i64,
    pub emails: i64,
    pub education: i64,
    pub twitter: i64,
}

impl PersonEdgeCounts {
    pub fn is_empty(&self) -> bool {
        self.employment == 0 && self.emails == 0 && self.education == 0 && self.twitter == 0
    }
}

/// A person record with its enrichment score and github link, as consumed by
/// the person-merge pass.
#[derive(Debug, Clone)]
pub struct PersonMergeRow {
    pub person_id: String,
    pub full_name: String,
    pub linkedin_url: Option<String>,
    pub github_profile_id: Option<String>,
    pub edge_counts: PersonEdgeCounts,
    pub enrichment_score: i64,
}

/// Brief person fields used when enriching graph nodes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonBrief {
    pub person_id: String,
    pub full_name: Option<String>,
    pub headline: Option<String>,
    pub location: Option<String>,
}
