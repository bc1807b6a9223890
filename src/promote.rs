//! Promotion of orphan GitHub profiles into Person records.
//!
//! In crypto, pseudonymity is common enough that a GitHub username *is* a
//! professional identity: "0age" and "transmissions11" are names here. So
//! a profile with real signal gets a Person record under its profile name
//! or, failing that, its username. Three confidence tiers decide:
//!
//! - Tier 1 (high): contributes to a tracked repo, or >100 followers, or
//!   has a name plus an email or location.
//! - Tier 2 (medium): github_company matches a tracked company, or >10
//!   public repos, or a bio using crypto vocabulary.
//! - Tier 3 (low): skipped. Likely bots or inactive accounts.

use std::collections::HashSet;

use serde::Serialize;

use crate::db::{DbError, DbPerson, OrphanProfile, TalentDb};
use crate::util::{new_id, now_rfc3339};

/// Bio vocabulary that marks an account as active in this space.
const CRYPTO_KEYWORDS: &[&str] = &[
    "blockchain", "crypto", "ethereum", "solidity", "web3", "defi",
    "smart contract", "dapp", "nft", "dao", "protocol", "trustless",
    "decentralized", "layer 2", "l2", "zero knowledge", "zkp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionTier {
    Tier1,
    Tier2,
}

/// Decide whether an orphan profile should become a Person.
/// Returns the tier and a human-readable reason, or `None` to skip.
pub fn promotion_tier(
    profile: &OrphanProfile,
    tracked_companies: &HashSet<String>,
) -> Option<(PromotionTier, String)> {
    // Tier 1: definite people
    if profile.contribution_count > 0 {
        return Some((
            PromotionTier::Tier1,
            format!("contributor ({} contributions)", profile.contribution_count),
        ));
    }
    if profile.followers > 100 {
        return Some((
            PromotionTier::Tier1,
            format!("high_followers ({} followers)", profile.followers),
        ));
    }
    let has_name = profile
        .github_name
        .as_deref()
        .is_some_and(|n| !n.trim().is_empty());
    if has_name && (profile.github_email.is_some() || profile.location.is_some()) {
        return Some((PromotionTier::Tier1, "has_identity (name + email/location)".to_string()));
    }

    // Tier 2: probably people
    if let Some(company) = profile.github_company.as_deref() {
        let company = company.trim().trim_start_matches('@').to_lowercase();
        if !company.is_empty() && tracked_companies.contains(&company) {
            return Some((PromotionTier::Tier2, format!("company_match ({company})")));
        }
    }
    if profile.public_repos > 10 {
        return Some((
            PromotionTier::Tier2,
            format!("active_developer ({} repos)", profile.public_repos),
        ));
    }
    if let Some(bio) = profile.bio.as_deref() {
        let bio = bio.to_lowercase();
        if CRYPTO_KEYWORDS.iter().any(|kw| bio.contains(kw)) {
            return Some((PromotionTier::Tier2, "crypto_bio".to_string()));
        }
    }

    None
}

/// Per-run promotion counters.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionStats {
    pub orphans_scanned: u64,
    pub tier1_promoted: u64,
    pub tier2_promoted: u64,
    pub tier3_skipped: u64,
    pub people_created: u64,
    pub profiles_linked: u64,
    pub emails_added: u64,
    pub errors: Vec<String>,
}

pub struct Promoter<'a> {
    db: &'a TalentDb,
    dry_run: bool,
}

impl<'a> Promoter<'a> {
    pub fn new(db: &'a TalentDb, dry_run: bool) -> Self {
        Self { db, dry_run }
    }

    /// Evaluate every orphan profile and promote the eligible ones.
    /// Each promotion commits in its own transaction; one failed promotion
    /// is recorded and the run continues.
    pub fn run(&self) -> Result<PromotionStats, DbError> {
        let mode = if self.dry_run { "dry-run" } else { "live" };
        log::info!("Promotion: starting ({mode})");

        let tracked = self.db.company_names_lower()?;
        let orphans = self.db.orphan_profiles()?;

        let mut stats = PromotionStats {
            orphans_scanned: orphans.len() as u64,
            ..Default::default()
        };

        for profile in &orphans {
            match promotion_tier(profile, &tracked) {
                Some((tier, reason)) => {
                    match tier {
                        PromotionTier::Tier1 => stats.tier1_promoted += 1,
                        PromotionTier::Tier2 => stats.tier2_promoted += 1,
                    }
                    if self.dry_run {
                        stats.people_created += 1;
                        log::debug!(
                            "Promotion: would promote @{} ({:?}: {})",
                            profile.github_username,
                            tier,
                            reason,
                        );
                        continue;
                    }
                    match self.promote(profile, tier, &reason, &mut stats) {
                        Ok(()) => {}
                        Err(e) => {
                            stats
                                .errors
                                .push(format!("@{}: {}", profile.github_username, e));
                        }
                    }
                }
                None => stats.tier3_skipped += 1,
            }
        }

        log::info!(
            "Promotion: {} scanned, {} tier1, {} tier2, {} skipped, {} people created ({mode})",
            stats.orphans_scanned,
            stats.tier1_promoted,
            stats.tier2_promoted,
            stats.tier3_skipped,
            stats.people_created,
        );
        Ok(stats)
    }

    fn promote(
        &self,
        profile: &OrphanProfile,
        tier: PromotionTier,
        reason: &str,
        stats: &mut PromotionStats,
    ) -> Result<(), DbError> {
        self.db.with_transaction(|db| {
            // Profile name when present; otherwise the username is the name
            let full_name = profile
                .github_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(&profile.github_username)
                .to_string();

            let mut name_parts = full_name.split_whitespace();
            let first_name = name_parts.next().map(str::to_string);
            let last_name = {
                let rest = name_parts.collect::<Vec<_>>().join(" ");
                if rest.is_empty() { None } else { Some(rest) }
            };

            let mut headline_parts = vec![format!("GitHub: @{}", profile.github_username)];
            if let Some(company) = profile.github_company.as_deref() {
                headline_parts.push(format!("@ {company}"));
            }
            if profile.followers > 0 {
                headline_parts.push(format!("{} followers", profile.followers));
            }

            let tier_label = match tier {
                PromotionTier::Tier1 => "tier1",
                PromotionTier::Tier2 => "tier2",
            };
            let description = profile.bio.clone().unwrap_or_else(|| {
                format!("GitHub contributor - profile needs enrichment ({tier_label}: {reason})")
            });

            // Sparse records stay flagged so the enrichment sweep picks them up
            let sparse = profile.github_email.is_none() && profile.location.is_none();

            let person = DbPerson {
                person_id: new_id(),
                full_name: Some(full_name),
                first_name,
                last_name,
                headline: Some(headline_parts.join(" | ")),
                location: profile.location.clone(),
                description: Some(description),
                linkedin_url: None,
                normalized_linkedin_url: None,
                needs_enrichment: sparse,
                refreshed_at: Some(now_rfc3339()),
                created_at: String::new(),
            };
            db.insert_person(&person)?;
            stats.people_created += 1;

            if let Some(email) = profile.github_email.as_deref() {
                if db.add_person_email(&person.person_id, email, "work", true, "github_promotion")? {
                    stats.emails_added += 1;
                }
            }

            if db.link_profile_to_person(
                &profile.github_profile_id,
                &person.person_id,
                "github_promotion",
            )? {
                stats.profiles_linked += 1;
            }

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_test_db;
    use crate::db::DbGithubProfile;

    fn orphan(username: &str) -> OrphanProfile {
        OrphanProfile {
            github_profile_id: "g1".into(),
            github_username: username.into(),
            github_name: None,
            github_email: None,
            github_company: None,
            bio: None,
            location: None,
            followers: 0,
            public_repos: 0,
            contribution_count: 0,
        }
    }

    #[test]
    fn test_tier1_contributor() {
        let profile = OrphanProfile {
            contribution_count: 3,
            followers: 5000,
            ..orphan("0age")
        };
        let (tier, reason) = promotion_tier(&profile, &HashSet::new()).unwrap();
        assert_eq!(tier, PromotionTier::Tier1);
        assert!(reason.starts_with("contributor"));
    }

    #[test]
    fn test_tier1_followers_and_identity() {
        let profile = OrphanProfile {
            followers: 101,
            ..orphan("famous")
        };
        assert_eq!(
            promotion_tier(&profile, &HashSet::new()).unwrap().0,
            PromotionTier::Tier1
        );

        let profile = OrphanProfile {
            github_name: Some("Ada Lovelace".into()),
            location: Some("London".into()),
            ..orphan("ada")
        };
        let (tier, reason) = promotion_tier(&profile, &HashSet::new()).unwrap();
        assert_eq!(tier, PromotionTier::Tier1);
        assert_eq!(reason, "has_identity (name + email/location)");
    }

    #[test]
    fn test_tier2_signals() {
        let mut tracked = HashSet::new();
        tracked.insert("uniswap labs".to_string());

        let profile = OrphanProfile {
            github_company: Some("@Uniswap Labs".into()),
            ..orphan("dev")
        };
        assert_eq!(promotion_tier(&profile, &tracked).unwrap().0, PromotionTier::Tier2);

        let profile = OrphanProfile {
            public_repos: 11,
            ..orphan("busy")
        };
        assert_eq!(promotion_tier(&profile, &tracked).unwrap().0, PromotionTier::Tier2);

        let profile = OrphanProfile {
            bio: Some("Building zero knowledge proofs for Ethereum".into()),
            ..orphan("zk")
        };
        let (tier, reason) = promotion_tier(&profile, &tracked).unwrap();
        assert_eq!(tier, PromotionTier::Tier2);
        assert_eq!(reason, "crypto_bio");
    }

    #[test]
    fn test_tier3_skipped() {
        assert!(promotion_tier(&orphan("lurker"), &HashSet::new()).is_none());
    }

    #[test]
    fn test_promotion_creates_and_links_person() {
        let (_dir, db) = open_test_db();
        // Seed an orphan with contributions: tier 1
        let profile_id = db
            .upsert_github_profile(&DbGithubProfile {
                github_profile_id: crate::util::new_id(),
                github_username: "0age".into(),
                followers: 5000,
                ..Default::default()
            })
            .unwrap();
        db.insert_repo_ignore("tracked/repo", None, None, None, 100, 0, None).unwrap();
        let repo = db.get_repo_by_full_name("tracked/repo").unwrap().unwrap();
        db.upsert_contribution(&profile_id, &repo.repo_id, 3).unwrap();

        let stats = Promoter::new(&db, false).run().unwrap();
        assert_eq!(stats.tier1_promoted, 1);
        assert_eq!(stats.people_created, 1);
        assert_eq!(stats.profiles_linked, 1);

        // Username became the person's name; profile now owned
        let linked = db.get_github_profile_by_username("0age").unwrap().unwrap();
        let person = db.get_person(linked.person_id.as_deref().unwrap()).unwrap().unwrap();
        assert_eq!(person.full_name.as_deref(), Some("0age"));
        assert!(person.needs_enrichment);

        // Second run finds no orphans
        let rerun = Promoter::new(&db, false).run().unwrap();
        assert_eq!(rerun.orphans_scanned, 0);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let (_dir, db) = open_test_db();
        db.upsert_github_profile(&DbGithubProfile {
            github_profile_id: crate::util::new_id(),
            github_username: "famous".into(),
            followers: 500,
            ..Default::default()
        })
        .unwrap();

        let stats = Promoter::new(&db, true).run().unwrap();
        assert_eq!(stats.people_created, 1);

        let people: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM person", [], |row| row.get(0))
            .unwrap();
        assert_eq!(people, 0);
    }
}
