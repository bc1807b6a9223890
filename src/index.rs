//! In-memory identifier index.
//!
//! Four concurrent maps from canonical matching keys to entity ids,
//! warm-loaded at startup with one pass per table and kept write-through by
//! the importer and resolver: a create at row *i* is visible to a resolve at
//! row *j > i* within the same batch, before any commit. The index holds
//! only ids; the relational store owns every other field.

use dashmap::DashMap;

use crate::db::{DbError, TalentDb};
use crate::normalize::normalize_alphanum;

#[derive(Default)]
pub struct IdentifierIndex {
    /// canonical LinkedIn URL → person id
    by_linkedin: DashMap<String, String>,
    /// lowercase GitHub username → (linked person id, profile id)
    by_github_username: DashMap<String, (Option<String>, String)>,
    /// lowercased company name → company id
    by_company_name_lower: DashMap<String, String>,
    /// alphanumeric-collapsed company name → company id
    by_company_name_normalized: DashMap<String, String>,
}

impl IdentifierIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate all maps from the store. Called once at component startup.
    pub fn warm_load(&self, db: &TalentDb) -> Result<(), DbError> {
        {
            let mut stmt = db.conn_ref().prepare(
                "SELECT normalized_linkedin_url, person_id FROM person
                 WHERE normalized_linkedin_url IS NOT NULL AND normalized_linkedin_url != ''",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (url, person_id) = row?;
                self.by_linkedin.insert(url, person_id);
            }
        }

        {
            let mut stmt = db.conn_ref().prepare(
                "SELECT LOWER(github_username), person_id, github_profile_id FROM github_profile",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                let (username, person_id, profile_id) = row?;
                self.by_github_username.insert(username, (person_id, profile_id));
            }
        }

        for (company_id, name) in db.company_index_rows()? {
            self.insert_company(&name, &company_id);
        }

        log::info!(
            "IdentifierIndex: loaded {} linkedin, {} github, {} companies",
            self.by_linkedin.len(),
            self.by_github_username.len(),
            self.by_company_name_lower.len(),
        );
        Ok(())
    }

    pub fn person_by_linkedin(&self, normalized_url: &str) -> Option<String> {
        self.by_linkedin.get(normalized_url).map(|e| e.value().clone())
    }

    pub fn insert_linkedin(&self, normalized_url: &str, person_id: &str) {
        self.by_linkedin
            .insert(normalized_url.to_string(), person_id.to_string());
    }

    /// Undo a write-through entry after a failed row commit.
    pub fn remove_linkedin(&self, normalized_url: &str) {
        self.by_linkedin.remove(normalized_url);
    }

    pub fn github_entry(&self, username: &str) -> Option<(Option<String>, String)> {
        self.by_github_username
            .get(&username.to_lowercase())
            .map(|e| e.value().clone())
    }

    pub fn insert_github(&self, username: &str, person_id: Option<&str>, profile_id: &str) {
        self.by_github_username.insert(
            username.to_lowercase(),
            (person_id.map(str::to_string), profile_id.to_string()),
        );
    }

    pub fn remove_github(&self, username: &str) {
        self.by_github_username.remove(&username.to_lowercase());
    }

    pub fn company_by_name(&self, name: &str) -> Option<String> {
        let lowered = name.trim().to_lowercase();
        if let Some(hit) = self.by_company_name_lower.get(&lowered) {
            return Some(hit.value().clone());
        }
        self.by_company_name_normalized
            .get(&normalize_alphanum(name))
            .map(|e| e.value().clone())
    }

    pub fn insert_company(&self, name: &str, company_id: &str) {
        self.by_company_name_lower
            .insert(name.trim().to_lowercase(), company_id.to_string());
        let collapsed = normalize_alphanum(name);
        if !collapsed.is_empty() {
            self.by_company_name_normalized
                .insert(collapsed, company_id.to_string());
        }
    }

    pub fn remove_company(&self, name: &str) {
        self.by_company_name_lower.remove(&name.trim().to_lowercase());
        self.by_company_name_normalized.remove(&normalize_alphanum(name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_test_db;
    use crate::db::{DbGithubProfile, DbPerson};

    #[test]
    fn test_warm_load_and_lookup() {
        let (_dir, db) = open_test_db();
        db.insert_person(&DbPerson {
            person_id: "p1".into(),
            full_name: Some("Ada".into()),
            normalized_linkedin_url: Some("linkedin.com/in/ada".into()),
            ..Default::default()
        })
        .unwrap();
        db.upsert_github_profile(&DbGithubProfile {
            github_profile_id: "g1".into(),
            github_username: "AdaDev".into(),
            person_id: Some("p1".into()),
            ..Default::default()
        })
        .unwrap();
        db.create_company("Analytical Engines", None).unwrap();

        let index = IdentifierIndex::new();
        index.warm_load(&db).unwrap();

        assert_eq!(index.person_by_linkedin("linkedin.com/in/ada"), Some("p1".into()));
        // Username lookup is case-insensitive
        let (person, profile) = index.github_entry("adadev").unwrap();
        assert_eq!(person.as_deref(), Some("p1"));
        assert_eq!(profile, "g1");
        assert!(index.company_by_name("analytical engines").is_some());
        assert!(index.company_by_name("  Analytical Engines ").is_some());
    }

    #[test]
    fn test_write_through_and_rollback() {
        let index = IdentifierIndex::new();
        index.insert_linkedin("linkedin.com/in/ada", "p1");
        assert!(index.person_by_linkedin("linkedin.com/in/ada").is_some());

        index.remove_linkedin("linkedin.com/in/ada");
        assert!(index.person_by_linkedin("linkedin.com/in/ada").is_none());
    }

    #[test]
    fn test_company_normalized_fallback() {
        let index = IdentifierIndex::new();
        index.insert_company("Uniswap Labs", "c1");
        // Alphanumeric-collapsed lookup tolerates punctuation differences
        assert_eq!(index.company_by_name("uniswap-labs"), Some("c1".into()));
    }
}
