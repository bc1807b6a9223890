//! Entity resolver: maps an input record onto an existing person, or
//! signals "create new".
//!
//! Tiered match, first hit wins:
//! 1. canonical LinkedIn URL
//! 2. GitHub username, when the profile is linked to a person
//! 3. fuzzy name + company, disabled by default (see `with_fuzzy_matching`)
//!
//! The resolver never errors on "not found". Store errors during lookup
//! degrade to `None` (the safe-create path) with a warning, because a
//! spurious create is recoverable by the merge engine while a dropped row
//! is gone.

use crate::db::TalentDb;
use crate::index::IdentifierIndex;
use crate::normalize::{
    extract_github_username, is_valid_company_name, name_similarity,
    normalize_linkedin_url, placeholder_domain, NAME_SIMILARITY_THRESHOLD,
};

/// Identifier fields extracted from an input record.
#[derive(Debug, Clone, Default)]
pub struct RecordIdentifiers {
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub full_name: Option<String>,
    pub company_name: Option<String>,
}

pub struct EntityResolver<'a> {
    db: &'a TalentDb,
    index: &'a IdentifierIndex,
    fuzzy_enabled: bool,
}

impl<'a> EntityResolver<'a> {
    pub fn new(db: &'a TalentDb, index: &'a IdentifierIndex) -> Self {
        Self {
            db,
            index,
            fuzzy_enabled: false,
        }
    }

    /// Enable tier 3 (fuzzy name + company). Off by default: it risks false
    /// positives, and a bad fuzzy hit inside a bulk run poisons the batch.
    pub fn with_fuzzy_matching(mut self, enabled: bool) -> Self {
        self.fuzzy_enabled = enabled;
        self
    }

    /// Find the existing person this record refers to, or `None` to create.
    pub fn resolve(&self, record: &RecordIdentifiers) -> Option<String> {
        // Tier 1: canonical LinkedIn URL
        if let Some(raw) = record.linkedin_url.as_deref() {
            if let Some(normalized) = normalize_linkedin_url(raw) {
                if let Some(person_id) = self.index.person_by_linkedin(&normalized) {
                    return Some(person_id);
                }
            }
        }

        // Tier 2: GitHub username, only when the profile has an owner
        if let Some(raw) = record.github_url.as_deref() {
            if let Some(username) = extract_github_username(raw) {
                if let Some((Some(person_id), _profile_id)) = self.index.github_entry(&username) {
                    return Some(person_id);
                }
            }
        }

        // Tier 3: fuzzy name + company, opt-in
        if self.fuzzy_enabled {
            if let Some(person_id) = self.resolve_fuzzy(record) {
                return Some(person_id);
            }
        }

        None
    }

    /// Fuzzy tier: a same-company person whose name clears the Jaccard
    /// threshold. Query errors degrade to `None` with a warning.
    fn resolve_fuzzy(&self, record: &RecordIdentifiers) -> Option<String> {
        let name = record.full_name.as_deref()?.trim();
        let company = record.company_name.as_deref()?.trim();
        if name.is_empty() || company.is_empty() {
            return None;
        }

        let company_id = self.index.company_by_name(company)?;

        let candidates: Vec<(String, String)> = {
            let mut stmt = match self.db.conn_ref().prepare(
                "SELECT DISTINCT p.person_id, p.full_name
                 FROM person p
                 JOIN employment e ON e.person_id = p.person_id
                 WHERE e.company_id = ?1 AND p.full_name IS NOT NULL",
            ) {
                Ok(stmt) => stmt,
                Err(e) => {
                    log::warn!("Resolver: fuzzy candidate query failed: {}", e);
                    return None;
                }
            };
            let rows = stmt.query_map([&company_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            });
            match rows {
                Ok(rows) => rows.filter_map(Result::ok).collect(),
                Err(e) => {
                    log::warn!("Resolver: fuzzy candidate scan failed: {}", e);
                    return None;
                }
            }
        };

        candidates
            .into_iter()
            .find(|(_, candidate)| name_similarity(name, candidate) > NAME_SIMILARITY_THRESHOLD)
            .map(|(person_id, _)| person_id)
    }

    /// Find a company by name in the index/store, or create it with a
    /// placeholder domain. `Ok(None)` means the name failed validation and
    /// the caller should count an invalid-company skip. Created and found
    /// companies are written through to the index.
    pub fn find_or_create_company(
        &self,
        raw_name: &str,
    ) -> Result<Option<String>, crate::db::DbError> {
        let name = raw_name.trim();
        if !is_valid_company_name(name) {
            return Ok(None);
        }

        if let Some(company_id) = self.index.company_by_name(name) {
            return Ok(Some(company_id));
        }

        if let Some(company_id) = self.db.find_company_id_by_name(name)? {
            self.index.insert_company(name, &company_id);
            return Ok(Some(company_id));
        }

        let company_id = self.db.create_company(name, None)?;
        self.index.insert_company(name, &company_id);
        log::debug!(
            "Resolver: created company '{}' ({})",
            name,
            placeholder_domain(name)
        );
        Ok(Some(company_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_test_db;
    use crate::db::{DbGithubProfile, DbPerson};

    fn seed(db: &TalentDb, index: &IdentifierIndex) {
        db.insert_person(&DbPerson {
            person_id: "p1".into(),
            full_name: Some("Ada Lovelace".into()),
            normalized_linkedin_url: Some("linkedin.com/in/ada-lovelace".into()),
            ..Default::default()
        })
        .unwrap();
        db.upsert_github_profile(&DbGithubProfile {
            github_profile_id: "g1".into(),
            github_username: "adadev".into(),
            person_id: Some("p1".into()),
            ..Default::default()
        })
        .unwrap();
        db.upsert_github_profile(&DbGithubProfile {
            github_profile_id: "g2".into(),
            github_username: "orphan".into(),
            ..Default::default()
        })
        .unwrap();
        index.warm_load(db).unwrap();
    }

    #[test]
    fn test_resolve_by_linkedin_tier() {
        let (_dir, db) = open_test_db();
        let index = IdentifierIndex::new();
        seed(&db, &index);
        let resolver = EntityResolver::new(&db, &index);

        // Messy URL variants resolve to the same person
        let record = RecordIdentifiers {
            linkedin_url: Some("https://WWW.LinkedIn.com/in/Ada-Lovelace/?utm=x".into()),
            ..Default::default()
        };
        assert_eq!(resolver.resolve(&record), Some("p1".into()));
    }

    #[test]
    fn test_resolve_by_github_tier_requires_link() {
        let (_dir, db) = open_test_db();
        let index = IdentifierIndex::new();
        seed(&db, &index);
        let resolver = EntityResolver::new(&db, &index);

        let linked = RecordIdentifiers {
            github_url: Some("https://github.com/AdaDev".into()),
            ..Default::default()
        };
        assert_eq!(resolver.resolve(&linked), Some("p1".into()));

        // An orphan profile is not a person match
        let orphan = RecordIdentifiers {
            github_url: Some("https://github.com/orphan".into()),
            ..Default::default()
        };
        assert_eq!(resolver.resolve(&orphan), None);
    }

    #[test]
    fn test_resolve_unknown_is_none() {
        let (_dir, db) = open_test_db();
        let index = IdentifierIndex::new();
        seed(&db, &index);
        let resolver = EntityResolver::new(&db, &index);

        let record = RecordIdentifiers {
            linkedin_url: Some("https://linkedin.com/in/grace-hopper".into()),
            github_url: Some("https://github.com/nobody-here".into()),
            ..Default::default()
        };
        assert_eq!(resolver.resolve(&record), None);
    }

    #[test]
    fn test_fuzzy_tier_disabled_by_default() {
        let (_dir, db) = open_test_db();
        let index = IdentifierIndex::new();
        seed(&db, &index);

        let acme = db.create_company("Acme", Some("acme.com")).unwrap();
        index.insert_company("Acme", &acme);
        db.add_employment("p1", &acme, None, None, None, None, "t", 0.9).unwrap();

        let record = RecordIdentifiers {
            full_name: Some("ada lovelace".into()),
            company_name: Some("Acme".into()),
            ..Default::default()
        };

        let strict = EntityResolver::new(&db, &index);
        assert_eq!(strict.resolve(&record), None);

        let fuzzy = EntityResolver::new(&db, &index).with_fuzzy_matching(true);
        assert_eq!(fuzzy.resolve(&record), Some("p1".into()));
    }

    #[test]
    fn test_find_or_create_company() {
        let (_dir, db) = open_test_db();
        let index = IdentifierIndex::new();
        let resolver = EntityResolver::new(&db, &index);

        // Invalid names are refused, not created
        assert_eq!(resolver.find_or_create_company("Labs").unwrap(), None);

        let first = resolver.find_or_create_company("Analytical Engines").unwrap().unwrap();
        let second = resolver.find_or_create_company("analytical engines").unwrap().unwrap();
        assert_eq!(first, second);
    }
}
