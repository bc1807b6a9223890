//! Company deduplication and merge.
//!
//! Groups companies by normalized name, scores each candidate, merges the
//! rest of the group into the winner, and upgrades known placeholder
//! domains. Ecosystem nuance: a "Labs" and a "Foundation" sharing a base
//! name are usually distinct legal entities and are never unified.

use std::collections::HashMap;

use serde::Serialize;

use crate::db::{CompanyDedupRow, DbError, TalentDb};
use crate::normalize::{
    company_names_fuzzy_equal, is_placeholder_domain, is_valid_company_name,
    normalize_company_name,
};

/// Pairs that must never merge even though their normalized names collide.
const KEEP_SEPARATE: &[(&str, &str)] = &[
    ("uniswap labs", "uniswap foundation"),
    ("aptos labs", "aptos foundation"),
    ("optimism", "optimism foundation"),
];

/// Known real domains for frequently-imported companies, used to upgrade
/// placeholder domains in place.
const KNOWN_DOMAINS: &[(&str, &str)] = &[
    ("0x", "0x.org"),
    ("0x labs", "0x.org"),
    ("1inch", "1inch.io"),
    ("1inch network", "1inch.io"),
    ("aave", "aave.com"),
    ("aave labs", "aave.com"),
    ("alchemy", "alchemy.com"),
    ("aptos labs", "aptos.dev"),
    ("bitgo", "bitgo.com"),
    ("coinbase", "coinbase.com"),
    ("eigen labs", "eigenlayer.xyz"),
    ("polygon", "polygon.technology"),
    ("polygon labs", "polygon.technology"),
    ("uniswap", "uniswap.org"),
    ("uniswap labs", "uniswap.org"),
];

/// Whether two company names are a protected keep-separate pair.
pub fn should_keep_separate(name_a: &str, name_b: &str) -> bool {
    let a = name_a.trim().to_lowercase();
    let b = name_b.trim().to_lowercase();
    KEEP_SEPARATE
        .iter()
        .any(|(x, y)| (a == *x && b == *y) || (a == *y && b == *x))
}

/// Score a merge candidate; the highest-scoring row becomes canonical.
///
/// A real domain dominates everything else; the remaining signals order
/// rows that are otherwise equally anonymous.
pub fn canonical_score(company: &CompanyDedupRow) -> i64 {
    let mut score = 0;
    if !is_placeholder_domain(&company.company_domain) {
        score += 1000;
    }
    score += company.employee_count;
    if company.linkedin_url.is_some() {
        score += 100;
    }
    if company.website_url.is_some() {
        score += 50;
    }
    if company.founded_year.is_some() {
        score += 10;
    }
    if company.company_name.to_lowercase().contains("labs") {
        score += 20;
    }
    score
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyMergeStats {
    pub companies_analyzed: u64,
    pub invalid_names_skipped: u64,
    pub duplicate_groups: u64,
    pub companies_merged: u64,
    pub companies_deleted: u64,
    pub employment_records_moved: u64,
    pub repo_links_moved: u64,
    pub kept_separate: u64,
    pub domains_promoted: u64,
    pub errors: Vec<String>,
}

pub struct CompanyDeduplicator<'a> {
    db: &'a TalentDb,
    dry_run: bool,
}

impl<'a> CompanyDeduplicator<'a> {
    pub fn new(db: &'a TalentDb, dry_run: bool) -> Self {
        Self { db, dry_run }
    }

    /// Full pass: group, merge, then promote known domains.
    pub fn run(&self) -> Result<CompanyMergeStats, DbError> {
        let mode = if self.dry_run { "dry-run" } else { "live" };
        log::info!("CompanyDedup: starting ({mode})");

        let mut stats = CompanyMergeStats::default();
        let groups = self.find_duplicate_groups(&mut stats)?;
        stats.duplicate_groups = groups.len() as u64;

        for group in groups {
            if let Err(e) = self.merge_group(&group, &mut stats) {
                stats.errors.push(format!(
                    "group '{}': {}",
                    group.first().map(|c| c.company_name.as_str()).unwrap_or("?"),
                    e
                ));
            }
        }

        self.promote_known_domains(&mut stats)?;

        log::info!(
            "CompanyDedup: {} analyzed, {} groups, {} merged, {} employment moved, {} kept separate ({mode})",
            stats.companies_analyzed,
            stats.duplicate_groups,
            stats.companies_merged,
            stats.employment_records_moved,
            stats.kept_separate,
        );
        Ok(stats)
    }

    /// Group companies by normalized name and drop groups the keep-separate
    /// rules protect.
    fn find_duplicate_groups(
        &self,
        stats: &mut CompanyMergeStats,
    ) -> Result<Vec<Vec<CompanyDedupRow>>, DbError> {
        let companies = self.db.companies_for_dedup()?;
        stats.companies_analyzed = companies.len() as u64;

        let mut by_normalized: HashMap<String, Vec<CompanyDedupRow>> = HashMap::new();
        for company in companies {
            if !is_valid_company_name(&company.company_name) {
                stats.invalid_names_skipped += 1;
                continue;
            }
            let key = normalize_company_name(&company.company_name);
            if key.is_empty() {
                stats.invalid_names_skipped += 1;
                continue;
            }
            by_normalized.entry(key).or_default().push(company);
        }

        // Coalesce keys that are fuzzy-equal: exact normalized grouping
        // misses punctuation and spelling drift ("Maker-DAO" vs "MakerDAO")
        let mut keys: Vec<String> = by_normalized.keys().cloned().collect();
        keys.sort();
        for i in 0..keys.len() {
            for j in 0..i {
                if by_normalized.contains_key(&keys[i])
                    && by_normalized.contains_key(&keys[j])
                    && company_names_fuzzy_equal(&keys[i], &keys[j])
                {
                    if let Some(moved) = by_normalized.remove(&keys[i]) {
                        by_normalized
                            .entry(keys[j].clone())
                            .or_default()
                            .extend(moved);
                    }
                    break;
                }
            }
        }

        let mut groups = Vec::new();
        for (_, group) in by_normalized {
            if group.len() < 2 {
                continue;
            }
            let filtered = self.split_separate_entities(group, stats);
            if filtered.len() > 1 {
                groups.push(filtered);
            }
        }
        // Stable ordering for reproducible reports
        groups.sort_by(|a, b| a[0].company_name.cmp(&b[0].company_name));
        Ok(groups)
    }

    /// Labs vs Foundation: when a group carries both variants, drop the
    /// Foundation rows for known pairs and skip the whole group otherwise;
    /// merging distinct legal entities is worse than leaving duplicates.
    fn split_separate_entities(
        &self,
        group: Vec<CompanyDedupRow>,
        stats: &mut CompanyMergeStats,
    ) -> Vec<CompanyDedupRow> {
        let has_labs = group
            .iter()
            .any(|c| c.company_name.to_lowercase().contains("labs"));
        let has_foundation = group
            .iter()
            .any(|c| c.company_name.to_lowercase().contains("foundation"));

        if !(has_labs && has_foundation) {
            return group;
        }

        let known_pair = group.iter().any(|a| {
            group
                .iter()
                .any(|b| should_keep_separate(&a.company_name, &b.company_name))
        });

        if known_pair {
            stats.kept_separate += 1;
            log::info!(
                "CompanyDedup: keeping Foundation variant separate in group '{}'",
                group[0].company_name
            );
            let non_foundation: Vec<CompanyDedupRow> = group
                .into_iter()
                .filter(|c| !c.company_name.to_lowercase().contains("foundation"))
                .collect();
            if non_foundation.len() > 1 {
                non_foundation
            } else {
                Vec::new()
            }
        } else {
            // Unknown Labs+Foundation collision: be conservative
            stats.kept_separate += group.len() as u64 - 1;
            log::info!(
                "CompanyDedup: unknown Labs+Foundation collision for '{}', skipping group",
                group[0].company_name
            );
            Vec::new()
        }
    }

    /// Merge one duplicate group into its highest-scoring row. Employment
    /// and repository links move wholesale, then the duplicates are deleted,
    /// all in a single transaction.
    fn merge_group(
        &self,
        group: &[CompanyDedupRow],
        stats: &mut CompanyMergeStats,
    ) -> Result<(), DbError> {
        let Some(canonical) = group.iter().max_by_key(|c| canonical_score(c)) else {
            return Ok(());
        };

        if self.dry_run {
            for dup in group.iter().filter(|c| c.company_id != canonical.company_id) {
                log::info!(
                    "CompanyDedup: would merge '{}' ({} employees) into '{}'",
                    dup.company_name,
                    dup.employee_count,
                    canonical.company_name,
                );
                stats.companies_merged += 1;
                stats.employment_records_moved += dup.employee_count as u64;
            }
            return Ok(());
        }

        self.db.with_transaction(|db| {
            for dup in group.iter().filter(|c| c.company_id != canonical.company_id) {
                let moved = db.move_employment(&dup.company_id, &canonical.company_id)?;
                let repo_links =
                    db.move_repo_company_links(&dup.company_id, &canonical.company_id)?;
                db.delete_company(&dup.company_id)?;

                stats.companies_merged += 1;
                stats.companies_deleted += 1;
                stats.employment_records_moved += moved as u64;
                stats.repo_links_moved += repo_links as u64;

                log::info!(
                    "CompanyDedup: merged '{}' into '{}' ({} employment rows moved)",
                    dup.company_name,
                    canonical.company_name,
                    moved,
                );
            }
            Ok(())
        })
    }

    /// Upgrade placeholder domains using the known-domain table. Idempotent:
    /// companies already holding a real domain are untouched.
    fn promote_known_domains(&self, stats: &mut CompanyMergeStats) -> Result<(), DbError> {
        for company in self.db.companies_for_dedup()? {
            if !is_placeholder_domain(&company.company_domain) {
                continue;
            }
            let lowered = company.company_name.trim().to_lowercase();
            if let Some((_, domain)) = KNOWN_DOMAINS.iter().find(|(name, _)| *name == lowered) {
                if self.dry_run {
                    log::info!(
                        "CompanyDedup: would promote domain of '{}' to {}",
                        company.company_name,
                        domain
                    );
                    stats.domains_promoted += 1;
                } else if self.db.promote_company_domain(&company.company_id, domain)? {
                    stats.domains_promoted += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_test_db;
    use crate::db::DbPerson;

    fn seed_company_with_employees(
        db: &TalentDb,
        name: &str,
        domain: Option<&str>,
        employees: usize,
    ) -> String {
        let company_id = db.create_company(name, domain).unwrap();
        for i in 0..employees {
            let person_id = format!("{name}-{i}").replace(' ', "-").to_lowercase();
            db.insert_person(&DbPerson {
                person_id: person_id.clone(),
                full_name: Some(person_id.clone()),
                ..Default::default()
            })
            .unwrap();
            db.add_employment(&person_id, &company_id, None, None, None, None, "t", 0.9)
                .unwrap();
        }
        company_id
    }

    #[test]
    fn test_canonical_score_weights() {
        let placeholder = CompanyDedupRow {
            company_id: "a".into(),
            company_name: "Uniswap".into(),
            company_domain: "uniswap.placeholder".into(),
            linkedin_url: None,
            website_url: None,
            founded_year: None,
            employee_count: 5,
        };
        let real = CompanyDedupRow {
            company_id: "b".into(),
            company_name: "Uniswap Labs".into(),
            company_domain: "uniswap.org".into(),
            linkedin_url: Some("https://linkedin.com/company/uniswap".into()),
            website_url: None,
            founded_year: Some(2018),
            employee_count: 2,
        };
        assert_eq!(canonical_score(&placeholder), 5);
        assert_eq!(canonical_score(&real), 1000 + 2 + 100 + 10 + 20);
    }

    #[test]
    fn test_should_keep_separate_symmetric() {
        assert!(should_keep_separate("Uniswap Labs", "Uniswap Foundation"));
        assert!(should_keep_separate("uniswap foundation", "UNISWAP LABS"));
        assert!(!should_keep_separate("Uniswap Labs", "Uniswap"));
    }

    #[test]
    fn test_merge_moves_employment_and_respects_keep_separate() {
        let (_dir, db) = open_test_db();
        // A="Uniswap" (5 employees), B="Uniswap Labs" (10), C="Uniswap Foundation" (3)
        let a = seed_company_with_employees(&db, "Uniswap", None, 5);
        let b = seed_company_with_employees(&db, "Uniswap Labs", None, 10);
        let c = seed_company_with_employees(&db, "Uniswap Foundation", None, 3);

        let stats = CompanyDeduplicator::new(&db, false).run().unwrap();

        // A merged into B (more employees + labs bonus); C untouched
        assert_eq!(stats.companies_merged, 1);
        assert_eq!(stats.employment_records_moved, 5);
        assert!(db.get_company(&a).unwrap().is_none());
        assert!(db.get_company(&b).unwrap().is_some());
        assert!(db.get_company(&c).unwrap().is_some());

        let b_employees: i64 = db
            .conn_ref()
            .query_row(
                "SELECT COUNT(*) FROM employment WHERE company_id = ?1",
                [&b],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(b_employees, 15);
        let c_employees: i64 = db
            .conn_ref()
            .query_row(
                "SELECT COUNT(*) FROM employment WHERE company_id = ?1",
                [&c],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(c_employees, 3);

        // No dangling employment rows point at the deleted id
        let dangling: i64 = db
            .conn_ref()
            .query_row(
                "SELECT COUNT(*) FROM employment WHERE company_id = ?1",
                [&a],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(dangling, 0);
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let (_dir, db) = open_test_db();
        seed_company_with_employees(&db, "Aave", None, 2);
        seed_company_with_employees(&db, "Aave Labs", None, 1);

        let stats = CompanyDeduplicator::new(&db, true).run().unwrap();
        assert_eq!(stats.companies_merged, 1);
        assert_eq!(stats.companies_deleted, 0);

        let companies: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM company", [], |row| row.get(0))
            .unwrap();
        assert_eq!(companies, 2);
    }

    #[test]
    fn test_unknown_labs_foundation_collision_skipped() {
        let (_dir, db) = open_test_db();
        seed_company_with_employees(&db, "Nova Labs", None, 2);
        seed_company_with_employees(&db, "Nova Foundation", None, 2);

        let stats = CompanyDeduplicator::new(&db, false).run().unwrap();
        assert_eq!(stats.companies_merged, 0);
        assert!(stats.kept_separate > 0);
    }

    #[test]
    fn test_known_domain_promotion() {
        let (_dir, db) = open_test_db();
        let id = db.create_company("Coinbase", None).unwrap();

        let stats = CompanyDeduplicator::new(&db, false).run().unwrap();
        assert_eq!(stats.domains_promoted, 1);
        assert_eq!(
            db.get_company(&id).unwrap().unwrap().company_domain,
            "coinbase.com"
        );

        // Idempotent second pass
        let rerun = CompanyDeduplicator::new(&db, false).run().unwrap();
        assert_eq!(rerun.domains_promoted, 0);
    }
}
