//! Post-promotion person merge.
//!
//! Promotion can mint a bare Person for a GitHub profile whose human already
//! exists from a CSV import. This pass groups people by identical full name,
//! keeps the record with the most data, reparents GitHub profiles to the
//! keeper, and deletes duplicates only when they own no other edges:
//! employment, emails, education, or twitter rows are never orphaned
//! silently.

use serde::Serialize;

use crate::db::{DbError, PersonMergeRow, TalentDb};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonMergeStats {
    pub duplicate_groups: u64,
    pub github_profiles_moved: u64,
    pub people_deleted: u64,
    pub kept_with_data: u64,
    pub errors: Vec<String>,
}

pub struct PersonMerger<'a> {
    db: &'a TalentDb,
    dry_run: bool,
}

impl<'a> PersonMerger<'a> {
    pub fn new(db: &'a TalentDb, dry_run: bool) -> Self {
        Self { db, dry_run }
    }

    pub fn run(&self) -> Result<PersonMergeStats, DbError> {
        let mode = if self.dry_run { "dry-run" } else { "live" };
        log::info!("PersonMerge: starting ({mode})");

        let rows = self.db.people_with_duplicate_names()?;
        let mut stats = PersonMergeStats::default();

        // Rows arrive grouped by name, score-descending within each group
        let mut groups: Vec<Vec<PersonMergeRow>> = Vec::new();
        for row in rows {
            match groups.last_mut() {
                Some(group) if group[0].full_name == row.full_name => group.push(row),
                _ => groups.push(vec![row]),
            }
        }

        for group in groups.iter().filter(|g| g.len() > 1) {
            // Only act on groups that promotion plausibly produced
            if !group.iter().any(|r| r.github_profile_id.is_some()) {
                continue;
            }
            stats.duplicate_groups += 1;
            if let Err(e) = self.merge_group(group, &mut stats) {
                stats
                    .errors
                    .push(format!("group '{}': {}", group[0].full_name, e));
            }
        }

        log::info!(
            "PersonMerge: {} groups, {} profiles moved, {} deleted, {} kept (own data) ({mode})",
            stats.duplicate_groups,
            stats.github_profiles_moved,
            stats.people_deleted,
            stats.kept_with_data,
        );
        Ok(stats)
    }

    fn merge_group(
        &self,
        group: &[PersonMergeRow],
        stats: &mut PersonMergeStats,
    ) -> Result<(), DbError> {
        let Some(keeper) = group.iter().max_by_key(|r| r.enrichment_score) else {
            return Ok(());
        };

        if self.dry_run {
            for dup in group.iter().filter(|r| r.person_id != keeper.person_id) {
                if dup.github_profile_id.is_some() {
                    stats.github_profiles_moved += 1;
                }
                if dup.edge_counts.is_empty() {
                    stats.people_deleted += 1;
                } else {
                    stats.kept_with_data += 1;
                }
            }
            return Ok(());
        }

        self.db.with_transaction(|db| {
            for dup in group.iter().filter(|r| r.person_id != keeper.person_id) {
                if let Some(profile_id) = dup.github_profile_id.as_deref() {
                    db.reparent_profile(profile_id, &keeper.person_id)?;
                    stats.github_profiles_moved += 1;
                }

                // Re-read edge counts inside the transaction: the snapshot
                // from the grouping query may be stale.
                let counts = db.person_edge_counts(&dup.person_id)?;
                if counts.is_empty() {
                    db.delete_queue_items_for_person(&dup.person_id)?;
                    db.delete_person(&dup.person_id)?;
                    stats.people_deleted += 1;
                    log::info!(
                        "PersonMerge: '{}': deleted duplicate {} (kept {})",
                        dup.full_name,
                        dup.person_id,
                        keeper.person_id,
                    );
                } else {
                    stats.kept_with_data += 1;
                    log::info!(
                        "PersonMerge: '{}': duplicate {} owns data, keeping",
                        dup.full_name,
                        dup.person_id,
                    );
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_test_db;
    use crate::db::{DbGithubProfile, DbPerson};

    fn seed_person(db: &TalentDb, id: &str, name: &str, linkedin: bool) {
        db.insert_person(&DbPerson {
            person_id: id.into(),
            full_name: Some(name.into()),
            linkedin_url: linkedin.then(|| format!("https://linkedin.com/in/{id}")),
            normalized_linkedin_url: linkedin.then(|| format!("linkedin.com/in/{id}")),
            ..Default::default()
        })
        .unwrap();
    }

    #[test]
    fn test_merge_reparents_profile_and_deletes_empty_duplicate() {
        let (_dir, db) = open_test_db();
        // Rich record from CSV import
        seed_person(&db, "rich", "0age", true);
        db.add_person_email("rich", "dev@example.com", "work", true, "csv").unwrap();
        // Bare record minted by promotion, owning the GitHub profile
        seed_person(&db, "bare", "0age", false);
        db.upsert_github_profile(&DbGithubProfile {
            github_profile_id: "g1".into(),
            github_username: "0age".into(),
            person_id: Some("bare".into()),
            ..Default::default()
        })
        .unwrap();

        let stats = PersonMerger::new(&db, false).run().unwrap();
        assert_eq!(stats.duplicate_groups, 1);
        assert_eq!(stats.github_profiles_moved, 1);
        assert_eq!(stats.people_deleted, 1);

        // Profile now belongs to the keeper; the bare duplicate is gone
        let profile = db.get_github_profile_by_username("0age").unwrap().unwrap();
        assert_eq!(profile.person_id.as_deref(), Some("rich"));
        assert!(db.get_person("bare").unwrap().is_none());
        assert!(db.get_person("rich").unwrap().is_some());
    }

    #[test]
    fn test_duplicate_with_own_data_survives() {
        let (_dir, db) = open_test_db();
        seed_person(&db, "rich", "Ada Lovelace", true);
        seed_person(&db, "other", "Ada Lovelace", false);
        db.upsert_github_profile(&DbGithubProfile {
            github_profile_id: "g1".into(),
            github_username: "ada".into(),
            person_id: Some("other".into()),
            ..Default::default()
        })
        .unwrap();
        // The duplicate owns an email, so it must not be deleted
        db.add_person_email("other", "ada@elsewhere.org", "work", true, "csv").unwrap();

        let stats = PersonMerger::new(&db, false).run().unwrap();
        assert_eq!(stats.github_profiles_moved, 1);
        assert_eq!(stats.people_deleted, 0);
        assert_eq!(stats.kept_with_data, 1);
        assert!(db.get_person("other").unwrap().is_some());
    }

    #[test]
    fn test_groups_without_github_profile_ignored() {
        let (_dir, db) = open_test_db();
        seed_person(&db, "a", "John Smith", true);
        seed_person(&db, "b", "John Smith", false);

        let stats = PersonMerger::new(&db, false).run().unwrap();
        assert_eq!(stats.duplicate_groups, 0);
        assert!(db.get_person("a").unwrap().is_some());
        assert!(db.get_person("b").unwrap().is_some());
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let (_dir, db) = open_test_db();
        seed_person(&db, "rich", "0age", true);
        seed_person(&db, "bare", "0age", false);
        db.upsert_github_profile(&DbGithubProfile {
            github_profile_id: "g1".into(),
            github_username: "0age".into(),
            person_id: Some("bare".into()),
            ..Default::default()
        })
        .unwrap();

        let stats = PersonMerger::new(&db, true).run().unwrap();
        assert_eq!(stats.people_deleted, 1);
        assert!(db.get_person("bare").unwrap().is_some());
        let profile = db.get_github_profile_by_username("0age").unwrap().unwrap();
        assert_eq!(profile.person_id.as_deref(), Some("bare"));
    }
}
