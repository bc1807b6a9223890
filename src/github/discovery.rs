//! Perpetual GitHub discovery engine.
//!
//! Each cycle: select repositories whose contributor sync is stale, walk
//! their contributor lists, create or refresh profiles, ratchet contribution
//! counts, advance the per-repository watermark, then expand the frontier by
//! pulling the repositories of notable developers seen so far.
//!
//! The DB lock is never held across an API call: each repository runs as
//! fetch (no lock) → resolve unknowns (brief locks) → fetch users (no lock)
//! → one write transaction. A failure inside a repository rolls back that
//! repository's writes and the cycle moves on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use super::{GithubApi, GithubContributor, GithubError};
use crate::config::CONTRIBUTOR_SYNC_WINDOW_DAYS;
use crate::db::{DbGithubProfile, SyncCandidate, TalentDb};
use crate::error::PipelineError;
use crate::util::new_id;

/// Repositories processed per cycle.
const REPOS_PER_CYCLE: usize = 10;

/// Candidate pool queried per cycle (ordering happens in SQL).
const CANDIDATE_POOL: i64 = 50;

/// Contributors fetched per repository.
const CONTRIBUTOR_LIMIT: usize = 100;
const CONTRIBUTOR_PAGE_SIZE: u32 = 100;
const MAX_CONTRIBUTOR_PAGES: u32 = 10;

/// Orbit expansion: developers examined per cycle and repos kept per
/// developer.
const ORBIT_DEVELOPERS_PER_CYCLE: usize = 5;
const ORBIT_REPOS_PER_DEVELOPER: usize = 10;

/// Pause after a 403 before the single retry.
const RATE_LIMIT_PAUSE_SECS: u64 = 60;

/// Sleep between repositories and between cycles.
const REPO_PAUSE_SECS: u64 = 2;
const CYCLE_PAUSE_SECS: u64 = 10;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryStats {
    pub cycles_completed: u64,
    pub repos_processed: u64,
    pub repos_discovered: u64,
    pub contributors_discovered: u64,
    pub contributions_recorded: u64,
    pub errors: u64,
}

pub struct DiscoveryEngine {
    db: Arc<Mutex<TalentDb>>,
    api: Arc<dyn GithubApi>,
    stats: DiscoveryStats,
}

impl DiscoveryEngine {
    pub fn new(db: Arc<Mutex<TalentDb>>, api: Arc<dyn GithubApi>) -> Self {
        Self {
            db,
            api,
            stats: DiscoveryStats::default(),
        }
    }

    pub fn stats(&self) -> &DiscoveryStats {
        &self.stats
    }

    /// Run cycles until the shutdown signal flips. The in-flight repository
    /// finishes before the engine exits; nothing is killed mid-transaction.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!("Discovery: engine started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.run_cycle(&shutdown).await {
                log::error!("Discovery: cycle failed: {}", e);
                self.stats.errors += 1;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(Duration::from_secs(CYCLE_PAUSE_SECS)) => {}
            }
        }
        log::info!(
            "Discovery: stopped after {} cycles ({} repos, {} new contributors, {} errors)",
            self.stats.cycles_completed,
            self.stats.repos_processed,
            self.stats.contributors_discovered,
            self.stats.errors,
        );
    }

    /// One discovery cycle: process stale repositories, then expand.
    pub async fn run_cycle(&mut self, shutdown: &watch::Receiver<bool>) -> Result<(), PipelineError> {
        let candidates = {
            let db = self.db.lock().expect("db lock");
            db.repos_needing_contributor_sync(CONTRIBUTOR_SYNC_WINDOW_DAYS, CANDIDATE_POOL)?
        };
        log::info!(
            "Discovery: cycle {}: {} candidate repositories",
            self.stats.cycles_completed + 1,
            candidates.len()
        );

        for candidate in candidates.iter().take(REPOS_PER_CYCLE) {
            if *shutdown.borrow() {
                return Ok(());
            }
            if let Err(e) = self.process_repository(candidate).await {
                log::error!("Discovery: {} failed: {}", candidate.full_name, e);
                self.stats.errors += 1;
            }
            tokio::time::sleep(Duration::from_secs(REPO_PAUSE_SECS)).await;
        }

        self.expand_orbit().await;

        self.stats.cycles_completed += 1;
        Ok(())
    }

    /// Contributor discovery for one repository.
    async fn process_repository(&mut self, candidate: &SyncCandidate) -> Result<(), PipelineError> {
        log::info!(
            "Discovery: processing {} (stars {}, tier {})",
            candidate.full_name,
            candidate.stars,
            candidate.priority_tier,
        );

        let contributors = match self.fetch_contributors(&candidate.full_name).await {
            Ok(contributors) => contributors,
            Err(GithubError::NotFound(_)) => {
                // Deleted or renamed upstream: advance the watermark so the
                // candidate query stops offering it every cycle
                log::warn!("Discovery: {} not found, skipping", candidate.full_name);
                let db = self.db.lock().expect("db lock");
                db.mark_repo_synced(&candidate.repo_id, 0)?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let users: Vec<&GithubContributor> =
            contributors.iter().filter(|c| c.is_user()).collect();

        // Resolve which usernames we already track
        let mut known: HashMap<String, String> = HashMap::new();
        {
            let db = self.db.lock().expect("db lock");
            for contributor in &users {
                if let Some(profile) = db.get_github_profile_by_username(&contributor.login)? {
                    known.insert(contributor.login.to_lowercase(), profile.github_profile_id);
                }
            }
        }

        // Fetch full profiles for the unknowns (no DB lock held)
        let mut fetched: Vec<DbGithubProfile> = Vec::new();
        for contributor in &users {
            if known.contains_key(&contributor.login.to_lowercase()) {
                continue;
            }
            match self.fetch_user_with_retry(&contributor.login).await {
                Ok(user) => fetched.push(DbGithubProfile {
                    github_profile_id: new_id(),
                    github_username: user.login,
                    person_id: None,
                    github_name: user.name,
                    github_email: user.email,
                    github_company: user.company,
                    bio: user.bio,
                    location: user.location,
                    blog: user.blog,
                    twitter_username: user.twitter_username,
                    followers: user.followers,
                    following: user.following,
                    public_repos: user.public_repos,
                    avatar_url: user.avatar_url,
                    importance_score: None,
                    source: Some("github_discovery".to_string()),
                    last_enriched: None,
                }),
                Err(GithubError::NotFound(_)) => {
                    log::debug!("Discovery: user {} vanished, skipping", contributor.login);
                }
                Err(e) => {
                    log::warn!("Discovery: failed to fetch {}: {}", contributor.login, e);
                    self.stats.errors += 1;
                }
            }
        }

        // Single write transaction per repository
        let (created, recorded) = {
            let db = self.db.lock().expect("db lock");
            db.with_transaction(|db| {
                let mut created = 0u64;
                for profile in &fetched {
                    let id = db.upsert_github_profile(profile)?;
                    known.insert(profile.github_username.to_lowercase(), id);
                    created += 1;
                }

                let mut recorded = 0u64;
                for contributor in &users {
                    if let Some(profile_id) = known.get(&contributor.login.to_lowercase()) {
                        db.upsert_contribution(
                            profile_id,
                            &candidate.repo_id,
                            contributor.contributions,
                        )?;
                        recorded += 1;
                    }
                }

                db.mark_repo_synced(&candidate.repo_id, users.len() as i64)?;
                Ok((created, recorded))
            })?
        };

        self.stats.repos_processed += 1;
        self.stats.contributors_discovered += created;
        self.stats.contributions_recorded += recorded;
        log::info!(
            "Discovery: {} done: {} contributors, {} new profiles",
            candidate.full_name,
            recorded,
            created,
        );
        Ok(())
    }

    /// Fetch contributor pages until the limit, a short page, or the page
    /// cap. A 403 sleeps out the pause and retries once.
    async fn fetch_contributors(
        &self,
        full_name: &str,
    ) -> Result<Vec<GithubContributor>, GithubError> {
        let mut contributors = Vec::new();
        let mut page = 1u32;
        let mut rate_limit_retried = false;

        while contributors.len() < CONTRIBUTOR_LIMIT && page <= MAX_CONTRIBUTOR_PAGES {
            let batch = match self
                .api
                .get_contributors_page(full_name, page, CONTRIBUTOR_PAGE_SIZE)
                .await
            {
                Ok(batch) => batch,
                Err(GithubError::RateLimited { .. }) if !rate_limit_retried => {
                    log::warn!(
                        "Discovery: rate limited on {}, sleeping {}s",
                        full_name,
                        RATE_LIMIT_PAUSE_SECS
                    );
                    rate_limit_retried = true;
                    tokio::time::sleep(Duration::from_secs(RATE_LIMIT_PAUSE_SECS)).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if batch.is_empty() {
                break;
            }
            let short_page = batch.len() < CONTRIBUTOR_PAGE_SIZE as usize;
            contributors.extend(batch);
            if short_page {
                break;
            }
            page += 1;
        }

        contributors.truncate(CONTRIBUTOR_LIMIT);
        Ok(contributors)
    }

    async fn fetch_user_with_retry(
        &self,
        username: &str,
    ) -> Result<super::GithubUser, GithubError> {
        match self.api.get_user(username).await {
            Err(GithubError::RateLimited { .. }) => {
                log::warn!(
                    "Discovery: rate limited fetching {}, sleeping {}s",
                    username,
                    RATE_LIMIT_PAUSE_SECS
                );
                tokio::time::sleep(Duration::from_secs(RATE_LIMIT_PAUSE_SECS)).await;
                self.api.get_user(username).await
            }
            other => other,
        }
    }

    /// Orbit expansion: pull the repositories of the most notable developers
    /// already in the graph and seed any unseen ones for future cycles.
    async fn expand_orbit(&mut self) {
        let notable = {
            let db = self.db.lock().expect("db lock");
            match db.notable_developers(20) {
                Ok(devs) => devs,
                Err(e) => {
                    log::error!("Discovery: notable-developer query failed: {}", e);
                    self.stats.errors += 1;
                    return;
                }
            }
        };

        for (username, followers) in notable.into_iter().take(ORBIT_DEVELOPERS_PER_CYCLE) {
            log::debug!("Discovery: orbit expansion via {} ({} followers)", username, followers);
            let repos = match self.api.get_user_repos(&username, 30).await {
                Ok(repos) => repos,
                Err(e) => {
                    log::warn!("Discovery: orbit fetch for {} failed: {}", username, e);
                    self.stats.errors += 1;
                    continue;
                }
            };

            let db = self.db.lock().expect("db lock");
            for repo in repos.iter().take(ORBIT_REPOS_PER_DEVELOPER) {
                match db.insert_repo_ignore(
                    &repo.full_name,
                    Some(&repo.owner.login),
                    Some(&repo.name),
                    repo.description.as_deref(),
                    repo.stargazers_count,
                    repo.forks_count,
                    repo.language.as_deref(),
                ) {
                    Ok(true) => {
                        self.stats.repos_discovered += 1;
                        log::info!("Discovery: orbit found new repo {}", repo.full_name);
                    }
                    Ok(false) => {
                        // Revisit: refresh the volatile metadata
                        if let Ok(Some(existing)) = db.get_repo_by_full_name(&repo.full_name) {
                            let _ = db.refresh_repo_metadata(
                                &existing.repo_id,
                                repo.description.as_deref(),
                                repo.stargazers_count,
                                repo.forks_count,
                                repo.language.as_deref(),
                            );
                        }
                    }
                    Err(e) => {
                        log::warn!("Discovery: orbit insert failed: {}", e);
                        self.stats.errors += 1;
                    }
                }
            }
        }
    }
}
