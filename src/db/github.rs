use rusqlite::{params, OptionalExtension};

use super::*;
use crate::util::{new_id, now_rfc3339};

impl TalentDb {
    // =========================================================================
    // GitHub profiles
    // =========================================================================

    /// Insert a GitHub profile. The username is unique case-insensitively;
    /// on conflict the existing profile's id is returned and raw profile
    /// fields are refreshed with COALESCE semantics.
    pub fn upsert_github_profile(&self, profile: &DbGithubProfile) -> Result<String, DbError> {
        let id: String = self.conn.query_row(
            "INSERT INTO github_profile (
                github_profile_id, github_username, person_id, github_name, github_email,
                github_company, bio, location, blog, twitter_username,
                followers, following, public_repos, avatar_url, source, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(github_username) DO UPDATE SET
                person_id = COALESCE(github_profile.person_id, excluded.person_id),
                github_name = COALESCE(excluded.github_name, github_profile.github_name),
                github_email = COALESCE(excluded.github_email, github_profile.github_email),
                github_company = COALESCE(excluded.github_company, github_profile.github_company),
                bio = COALESCE(excluded.bio, github_profile.bio),
                location = COALESCE(excluded.location, github_profile.location),
                blog = COALESCE(excluded.blog, github_profile.blog),
                twitter_username = COALESCE(excluded.twitter_username, github_profile.twitter_username),
                followers = MAX(github_profile.followers, excluded.followers),
                public_repos = MAX(github_profile.public_repos, excluded.public_repos),
                avatar_url = COALESCE(excluded.avatar_url, github_profile.avatar_url)
             RETURNING github_profile_id",
            params![
                profile.github_profile_id,
                profile.github_username,
                profile.person_id,
                profile.github_name,
                profile.github_email,
                profile.github_company,
                profile.bio,
                profile.location,
                profile.blog,
                profile.twitter_username,
                profile.followers,
                profile.following,
                profile.public_repos,
                profile.avatar_url,
                profile.source,
                now_rfc3339(),
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_github_profile_by_username(
        &self,
        username: &str,
    ) -> Result<Option<DbGithubProfile>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT github_profile_id, github_username, person_id, github_name, github_email,
                    github_company, bio, location, blog, twitter_username,
                    followers, following, public_repos, avatar_url,
                    importance_score, source, last_enriched
             FROM github_profile WHERE github_username = ?1 COLLATE NOCASE",
        )?;
        let profile = stmt
            .query_row(params![username], Self::map_github_profile_row)
            .optional()?;
        Ok(profile)
    }

    /// Link an orphan profile to a person. Refuses to relink a profile that
    /// already belongs to someone else. Returns true when the link was made.
    pub fn link_profile_to_person(
        &self,
        github_profile_id: &str,
        person_id: &str,
        source: &str,
    ) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE github_profile SET person_id = ?2, source = COALESCE(source, ?3)
             WHERE github_profile_id = ?1 AND person_id IS NULL",
            params![github_profile_id, person_id, source],
        )?;
        Ok(changed > 0)
    }

    /// Reassign a profile to a different person (merge path, unconditional).
    pub fn reparent_profile(&self, github_profile_id: &str, person_id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE github_profile SET person_id = ?2 WHERE github_profile_id = ?1",
            params![github_profile_id, person_id],
        )?;
        Ok(())
    }

    /// All orphan profiles with their contribution counts, highest-signal
    /// first, for the promotion engine.
    pub fn orphan_profiles(&self) -> Result<Vec<OrphanProfile>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT gp.github_profile_id, gp.github_username, gp.github_name, gp.github_email,
                    gp.github_company, gp.bio, gp.location, gp.followers, gp.public_repos,
                    COUNT(gc.contribution_id)
             FROM github_profile gp
             LEFT JOIN github_contribution gc ON gc.github_profile_id = gp.github_profile_id
             WHERE gp.person_id IS NULL
             GROUP BY gp.github_profile_id
             ORDER BY COUNT(gc.contribution_id) DESC, gp.followers DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(OrphanProfile {
                github_profile_id: row.get(0)?,
                github_username: row.get(1)?,
                github_name: row.get(2)?,
                github_email: row.get(3)?,
                github_company: row.get(4)?,
                bio: row.get(5)?,
                location: row.get(6)?,
                followers: row.get(7)?,
                public_repos: row.get(8)?,
                contribution_count: row.get(9)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // =========================================================================
    // GitHub repositories
    // =========================================================================

    /// Insert a repository discovered by crawl or taxonomy import; no-op when
    /// the full name is already known. Returns true when inserted.
    pub fn insert_repo_ignore(
        &self,
        full_name: &str,
        owner_username: Option<&str>,
        repo_name: Option<&str>,
        description: Option<&str>,
        stars: i64,
        forks: i64,
        language: Option<&str>,
    ) -> Result<bool, DbError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO github_repository
                (repo_id, full_name, owner_username, repo_name, description,
                 stars, forks, language, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                new_id(),
                full_name,
                owner_username,
                repo_name,
                description,
                stars,
                forks,
                language,
                now_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_repo_by_full_name(
        &self,
        full_name: &str,
    ) -> Result<Option<DbGithubRepository>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT repo_id, full_name, owner_username, repo_name, description, stars, forks,
                    language, importance_score, contributor_count, last_contributor_sync
             FROM github_repository WHERE full_name = ?1 COLLATE NOCASE",
        )?;
        let repo = stmt
            .query_row(params![full_name], |row| {
                Ok(DbGithubRepository {
                    repo_id: row.get(0)?,
                    full_name: row.get(1)?,
                    owner_username: row.get(2)?,
                    repo_name: row.get(3)?,
                    description: row.get(4)?,
                    stars: row.get(5)?,
                    forks: row.get(6)?,
                    language: row.get(7)?,
                    importance_score: row.get(8)?,
                    contributor_count: row.get(9)?,
                    last_contributor_sync: row.get(10)?,
                })
            })
            .optional()?;
        Ok(repo)
    }

    /// Refresh repository metadata from a crawl revisit.
    pub fn refresh_repo_metadata(
        &self,
        repo_id: &str,
        description: Option<&str>,
        stars: i64,
        forks: i64,
        language: Option<&str>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE github_repository SET
                description = COALESCE(?2, description),
                stars = ?3,
                forks = ?4,
                language = COALESCE(?5, language)
             WHERE repo_id = ?1",
            params![repo_id, description, stars, forks, language],
        )?;
        Ok(())
    }

    /// Repositories due for contributor discovery: never synced, or synced
    /// longer ago than the window. Ordered by ecosystem priority tier, then
    /// stars, then staleness (never-synced first).
    pub fn repos_needing_contributor_sync(
        &self,
        window_days: i64,
        limit: i64,
    ) -> Result<Vec<SyncCandidate>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT r.repo_id, r.full_name, r.stars,
                    COALESCE((
                        SELECT MIN(ce.priority_tier)
                        FROM ecosystem_repository er
                        JOIN crypto_ecosystem ce ON ce.ecosystem_id = er.ecosystem_id
                        WHERE er.repo_id = r.repo_id
                    ), 5) AS priority_tier,
                    r.last_contributor_sync
             FROM github_repository r
             WHERE r.last_contributor_sync IS NULL
                OR r.last_contributor_sync < datetime('now', '-' || ?1 || ' days')
             ORDER BY priority_tier ASC,
                      r.stars DESC,
                      r.last_contributor_sync ASC NULLS FIRST
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![window_days, limit], |row| {
            Ok(SyncCandidate {
                repo_id: row.get(0)?,
                full_name: row.get(1)?,
                stars: row.get(2)?,
                priority_tier: row.get(3)?,
                last_contributor_sync: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Advance the contributor-sync watermark after processing a repository.
    /// The watermark uses SQL-side datetime('now') so the staleness window
    /// comparison in the candidate query stays within one format.
    pub fn mark_repo_synced(&self, repo_id: &str, contributor_count: i64) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE github_repository
             SET last_contributor_sync = datetime('now'), contributor_count = ?2
             WHERE repo_id = ?1",
            params![repo_id, contributor_count],
        )?;
        Ok(())
    }

    // =========================================================================
    // Contributions
    // =========================================================================

    /// Upsert a contribution edge. Counts only ratchet upward
    /// (`MAX(existing, incoming)`), which makes discovery cycles idempotent.
    pub fn upsert_contribution(
        &self,
        github_profile_id: &str,
        repo_id: &str,
        contribution_count: i64,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO github_contribution
                (contribution_id, github_profile_id, repo_id, contribution_count, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(github_profile_id, repo_id) DO UPDATE SET
                contribution_count = MAX(github_contribution.contribution_count,
                                         excluded.contribution_count),
                updated_at = excluded.updated_at",
            params![new_id(), github_profile_id, repo_id, contribution_count, now_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_contribution_count(
        &self,
        github_profile_id: &str,
        repo_id: &str,
    ) -> Result<Option<i64>, DbError> {
        let count = self
            .conn
            .query_row(
                "SELECT contribution_count FROM github_contribution
                 WHERE github_profile_id = ?1 AND repo_id = ?2",
                params![github_profile_id, repo_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count)
    }

    /// Notable developers for orbit expansion: already-contributing profiles
    /// with real follower and repo counts, most-followed first.
    pub fn notable_developers(&self, limit: i64) -> Result<Vec<(String, i64)>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT gp.github_username, gp.followers
             FROM github_profile gp
             JOIN github_contribution gc ON gc.github_profile_id = gp.github_profile_id
             WHERE gp.public_repos > 5 AND gp.followers > 100
             ORDER BY gp.followers DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Propagate ecosystem names onto the profiles contributing to tagged
    /// repositories. Stored as a JSON array on `github_profile`; rebuilt
    /// wholesale, so reruns converge. Returns the number of profiles tagged.
    pub fn propagate_ecosystem_tags(&self) -> Result<usize, DbError> {
        let pairs: Vec<(String, String)> = {
            let mut stmt = self.conn.prepare(
                "SELECT DISTINCT gc.github_profile_id, ce.ecosystem_name
                 FROM github_contribution gc
                 JOIN ecosystem_repository er ON er.repo_id = gc.repo_id
                 JOIN crypto_ecosystem ce ON ce.ecosystem_id = er.ecosystem_id
                 ORDER BY gc.github_profile_id, ce.ecosystem_name",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut by_profile: std::collections::HashMap<String, Vec<String>> =
            std::collections::HashMap::new();
        for (profile_id, ecosystem_name) in pairs {
            by_profile.entry(profile_id).or_default().push(ecosystem_name);
        }

        let tagged = by_profile.len();
        self.with_transaction(|db| {
            for (profile_id, names) in &by_profile {
                let tags = serde_json::to_string(names)?;
                db.conn.execute(
                    "UPDATE github_profile SET ecosystem_tags = ?2
                     WHERE github_profile_id = ?1",
                    params![profile_id, tags],
                )?;
            }
            Ok(())
        })?;
        Ok(tagged)
    }

    // =========================================================================
    // Importance scoring support
    // =========================================================================

    /// Repositories with no score yet, highest-stars first.
    pub fn repos_needing_score(&self, limit: Option<i64>) -> Result<Vec<RepoScoreInput>, DbError> {
        let sql = format!(
            "SELECT r.repo_id, r.stars, r.forks,
                    COALESCE(r.contributor_count,
                             (SELECT COUNT(*) FROM github_contribution gc
                              WHERE gc.repo_id = r.repo_id)),
                    (SELECT COUNT(*) FROM ecosystem_repository er WHERE er.repo_id = r.repo_id)
             FROM github_repository r
             WHERE r.importance_score IS NULL OR r.importance_score = 0
             ORDER BY r.stars DESC, r.repo_id
             {}",
            match limit {
                Some(n) => format!("LIMIT {n}"),
                None => String::new(),
            }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(RepoScoreInput {
                repo_id: row.get(0)?,
                stars: row.get(1)?,
                forks: row.get(2)?,
                contributor_count: row.get(3)?,
                ecosystem_count: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn set_repo_importance(&self, repo_id: &str, score: f64) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE github_repository SET importance_score = ?2 WHERE repo_id = ?1",
            params![repo_id, score],
        )?;
        Ok(())
    }

    /// Profiles with no score yet, plus their contribution-weighted repo
    /// importance sum, most-followed first.
    pub fn developers_needing_score(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<DeveloperScoreInput>, DbError> {
        let sql = format!(
            "SELECT gp.github_profile_id, gp.followers, gp.public_repos,
                    COALESCE((
                        SELECT SUM(COALESCE(r.importance_score, 0)
                                   * MIN(gc.contribution_count, 100) / 100.0)
                        FROM github_contribution gc
                        JOIN github_repository r ON r.repo_id = gc.repo_id
                        WHERE gc.github_profile_id = gp.github_profile_id
                    ), 0)
             FROM github_profile gp
             WHERE gp.importance_score IS NULL OR gp.importance_score = 0
             ORDER BY gp.followers DESC, gp.github_profile_id
             {}",
            match limit {
                Some(n) => format!("LIMIT {n}"),
                None => String::new(),
            }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(DeveloperScoreInput {
                github_profile_id: row.get(0)?,
                followers: row.get(1)?,
                public_repos: row.get(2)?,
                weighted_repo_importance: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn set_developer_importance(&self, profile_id: &str, score: f64) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE github_profile SET importance_score = ?2 WHERE github_profile_id = ?1",
            params![profile_id, score],
        )?;
        Ok(())
    }

    pub(crate) fn map_github_profile_row(
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<DbGithubProfile> {
        Ok(DbGithubProfile {
            github_profile_id: row.get(0)?,
            github_username: row.get(1)?,
            person_id: row.get(2)?,
            github_name: row.get(3)?,
            github_email: row.get(4)?,
            github_company: row.get(5)?,
            bio: row.get(6)?,
            location: row.get(7)?,
            blog: row.get(8)?,
            twitter_username: row.get(9)?,
            followers: row.get(10)?,
            following: row.get(11)?,
            public_repos: row.get(12)?,
            avatar_url: row.get(13)?,
            importance_score: row.get(14)?,
            source: row.get(15)?,
            last_enriched: row.get(16)?,
        })
    }
}

/// Inputs to `compute_repository_importance`.
#[derive(Debug, Clone)]
pub struct RepoScoreInput {
    pub repo_id: String,
    pub stars: i64,
    pub forks: i64,
    pub contributor_count: i64,
    pub ecosystem_count: i64,
}

/// Inputs to `compute_developer_importance`.
#[derive(Debug, Clone)]
pub struct DeveloperScoreInput {
    pub github_profile_id: String,
    pub followers: i64,
    pub public_repos: i64,
    pub weighted_repo_importance: f64,
}
