//! Importance scoring for repositories and developers.
//!
//! Deterministic scalar functions over graph state, recomputed by sweep
//! jobs. Star and follower counts are heavy-tailed, so those terms are
//! log-damped; contributor count stays linear. Developer scores fold in the
//! importance of the repositories they contribute to, weighted by
//! contribution share capped at 100 commits.
//!
//! Sweeps only touch rows with a null-or-zero score and commit every 1000
//! updates, so an interrupted run resumes where it stopped.

use std::time::Instant;

use crate::db::github::{DeveloperScoreInput, RepoScoreInput};
use crate::db::{DbError, TalentDb};

/// Updates per commit during a sweep.
const SWEEP_COMMIT_EVERY: usize = 1000;

// Repository weights
const REPO_STARS_WEIGHT: f64 = 10.0;
const REPO_FORKS_WEIGHT: f64 = 5.0;
const REPO_CONTRIBUTOR_WEIGHT: f64 = 1.0;
const REPO_ECOSYSTEM_BONUS: f64 = 25.0;

// Developer weights
const DEV_FOLLOWERS_WEIGHT: f64 = 5.0;
const DEV_PUBLIC_REPOS_WEIGHT: f64 = 0.5;
const DEV_REPO_IMPORTANCE_WEIGHT: f64 = 1.0;

/// Scalar importance of a repository.
pub fn compute_repository_importance(
    stars: i64,
    forks: i64,
    contributor_count: i64,
    ecosystem_count: i64,
) -> f64 {
    let mut score = REPO_STARS_WEIGHT * (1.0 + stars.max(0) as f64).ln()
        + REPO_FORKS_WEIGHT * (1.0 + forks.max(0) as f64).ln()
        + REPO_CONTRIBUTOR_WEIGHT * contributor_count.max(0) as f64;
    if ecosystem_count > 0 {
        score += REPO_ECOSYSTEM_BONUS;
    }
    (score * 100.0).round() / 100.0
}

/// Scalar importance of a developer. `weighted_repo_importance` is
/// `Σ repo_importance × min(contributions, 100) / 100` over their
/// contribution edges.
pub fn compute_developer_importance(
    followers: i64,
    public_repos: i64,
    weighted_repo_importance: f64,
) -> f64 {
    let score = DEV_FOLLOWERS_WEIGHT * (1.0 + followers.max(0) as f64).ln()
        + DEV_PUBLIC_REPOS_WEIGHT * public_repos.max(0) as f64
        + DEV_REPO_IMPORTANCE_WEIGHT * weighted_repo_importance.max(0.0);
    (score * 100.0).round() / 100.0
}

/// Score every repository with a null-or-zero importance score.
pub fn score_repositories(db: &TalentDb, limit: Option<i64>) -> Result<u64, DbError> {
    let inputs = db.repos_needing_score(limit)?;
    let total = inputs.len();
    if total == 0 {
        log::info!("Scoring: no repositories need scoring");
        return Ok(0);
    }
    log::info!("Scoring: computing importance for {} repositories", total);

    let started = Instant::now();
    let mut scored = 0u64;

    for chunk in inputs.chunks(SWEEP_COMMIT_EVERY) {
        db.with_transaction(|db| {
            for input in chunk {
                let RepoScoreInput {
                    repo_id,
                    stars,
                    forks,
                    contributor_count,
                    ecosystem_count,
                } = input;
                let score = compute_repository_importance(
                    *stars,
                    *forks,
                    *contributor_count,
                    *ecosystem_count,
                );
                db.set_repo_importance(repo_id, score)?;
            }
            Ok(())
        })?;

        scored += chunk.len() as u64;
        log_sweep_progress("repositories", scored, total as u64, started);
    }

    log::info!("Scoring: repository sweep complete ({} scored)", scored);
    Ok(scored)
}

/// Score every developer with a null-or-zero importance score. Run after the
/// repository sweep so the contribution-weighted term sees fresh values.
pub fn score_developers(db: &TalentDb, limit: Option<i64>) -> Result<u64, DbError> {
    let inputs = db.developers_needing_score(limit)?;
    let total = inputs.len();
    if total == 0 {
        log::info!("Scoring: no developers need scoring");
        return Ok(0);
    }
    log::info!("Scoring: computing importance for {} developers", total);

    let started = Instant::now();
    let mut scored = 0u64;

    for chunk in inputs.chunks(SWEEP_COMMIT_EVERY) {
        db.with_transaction(|db| {
            for input in chunk {
                let DeveloperScoreInput {
                    github_profile_id,
                    followers,
                    public_repos,
                    weighted_repo_importance,
                } = input;
                let score = compute_developer_importance(
                    *followers,
                    *public_repos,
                    *weighted_repo_importance,
                );
                db.set_developer_importance(github_profile_id, score)?;
            }
            Ok(())
        })?;

        scored += chunk.len() as u64;
        log_sweep_progress("developers", scored, total as u64, started);
    }

    log::info!("Scoring: developer sweep complete ({} scored)", scored);
    Ok(scored)
}

fn log_sweep_progress(what: &str, done: u64, total: u64, started: Instant) {
    let elapsed = started.elapsed().as_secs_f64();
    let rate = if elapsed > 0.0 { done as f64 / elapsed } else { 0.0 };
    let eta_secs = if rate > 0.0 {
        (total.saturating_sub(done)) as f64 / rate
    } else {
        0.0
    };
    log::info!(
        "Scoring: {}/{} {} ({:.0}/s, ETA {:.1}min)",
        done,
        total,
        what,
        rate,
        eta_secs / 60.0,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_test_db;
    use crate::db::DbGithubProfile;

    #[test]
    fn test_repository_importance_deterministic_and_monotone() {
        let small = compute_repository_importance(10, 2, 5, 0);
        let same = compute_repository_importance(10, 2, 5, 0);
        assert_eq!(small, same);

        let more_stars = compute_repository_importance(1000, 2, 5, 0);
        assert!(more_stars > small);

        let with_ecosystem = compute_repository_importance(10, 2, 5, 1);
        assert_eq!(with_ecosystem, small + 25.0);

        assert_eq!(compute_repository_importance(0, 0, 0, 0), 0.0);
    }

    #[test]
    fn test_developer_importance_weights() {
        let base = compute_developer_importance(0, 0, 0.0);
        assert_eq!(base, 0.0);

        let popular = compute_developer_importance(5000, 40, 0.0);
        let contributor = compute_developer_importance(5000, 40, 120.0);
        assert!(contributor > popular);
        assert_eq!(contributor, popular + 120.0);
    }

    #[test]
    fn test_repo_sweep_is_idempotent_and_resumable() {
        let (_dir, db) = open_test_db();
        db.insert_repo_ignore("a/one", None, None, None, 100, 10, None).unwrap();
        db.insert_repo_ignore("b/two", None, None, None, 50, 5, None).unwrap();

        assert_eq!(score_repositories(&db, None).unwrap(), 2);
        // All rows scored: the second sweep has nothing to do
        assert_eq!(score_repositories(&db, None).unwrap(), 0);

        let score: f64 = db
            .conn_ref()
            .query_row(
                "SELECT importance_score FROM github_repository WHERE full_name = 'a/one'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(score > 0.0);
    }

    #[test]
    fn test_developer_sweep_uses_contribution_weighting() {
        let (_dir, db) = open_test_db();
        db.insert_repo_ignore("a/one", None, None, None, 1000, 10, None).unwrap();
        let repo = db.get_repo_by_full_name("a/one").unwrap().unwrap();
        score_repositories(&db, None).unwrap();

        let contributor = db
            .upsert_github_profile(&DbGithubProfile {
                github_profile_id: crate::util::new_id(),
                github_username: "busy".into(),
                followers: 10,
                public_repos: 4,
                ..Default::default()
            })
            .unwrap();
        db.upsert_contribution(&contributor, &repo.repo_id, 200).unwrap();

        let bystander = db
            .upsert_github_profile(&DbGithubProfile {
                github_profile_id: crate::util::new_id(),
                github_username: "quiet".into(),
                followers: 10,
                public_repos: 4,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(score_developers(&db, None).unwrap(), 2);

        let fetch = |id: &str| -> f64 {
            db.conn_ref()
                .query_row(
                    "SELECT importance_score FROM github_profile WHERE github_profile_id = ?1",
                    [id],
                    |row| row.get(0),
                )
                .unwrap()
        };
        assert!(fetch(&contributor) > fetch(&bystander));
    }
}
