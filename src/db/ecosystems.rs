use rusqlite::{params, OptionalExtension};

use super::*;
use crate::util::new_id;

impl TalentDb {
    // =========================================================================
    // Crypto ecosystems
    // =========================================================================

    /// Get or create an ecosystem by exact name. Returns its id.
    pub fn get_or_create_ecosystem(
        &self,
        ecosystem_name: &str,
        normalized_name: &str,
        ecosystem_type: &str,
        priority_tier: i64,
    ) -> Result<String, DbError> {
        if let Some(id) = self
            .conn
            .query_row(
                "SELECT ecosystem_id FROM crypto_ecosystem WHERE ecosystem_name = ?1",
                params![ecosystem_name],
                |row| row.get::<_, String>(0),
            )
            .optional()?
        {
            return Ok(id);
        }

        let id = new_id();
        self.conn.execute(
            "INSERT INTO crypto_ecosystem
                (ecosystem_id, ecosystem_name, normalized_name, ecosystem_type, priority_tier)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, ecosystem_name, normalized_name, ecosystem_type, priority_tier],
        )?;
        Ok(id)
    }

    pub fn all_ecosystems(&self) -> Result<Vec<DbEcosystem>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT ecosystem_id, ecosystem_name, normalized_name, ecosystem_type, priority_tier
             FROM crypto_ecosystem ORDER BY priority_tier, ecosystem_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DbEcosystem {
                ecosystem_id: row.get(0)?,
                ecosystem_name: row.get(1)?,
                normalized_name: row.get(2)?,
                ecosystem_type: row.get(3)?,
                priority_tier: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Link an ecosystem to a repository (conflict-ignore on the pair).
    pub fn link_ecosystem_repo(
        &self,
        ecosystem_id: &str,
        repo_id: &str,
        attribution: Option<&str>,
    ) -> Result<bool, DbError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO ecosystem_repository (ecosystem_id, repo_id, attribution)
             VALUES (?1, ?2, ?3)",
            params![ecosystem_id, repo_id, attribution],
        )?;
        Ok(inserted > 0)
    }

    /// Link an ecosystem to a company (conflict-ignore on the pair).
    pub fn link_company_ecosystem(
        &self,
        company_id: &str,
        ecosystem_id: &str,
        confidence: f64,
    ) -> Result<bool, DbError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO company_ecosystem (company_id, ecosystem_id, confidence)
             VALUES (?1, ?2, ?3)",
            params![company_id, ecosystem_id, confidence],
        )?;
        Ok(inserted > 0)
    }

    /// Map repo full names (lowercased) to ids for a batch of names.
    /// Used after chunked inserts to resolve link targets.
    pub fn repo_ids_by_full_names(
        &self,
        full_names: &[String],
    ) -> Result<std::collections::HashMap<String, String>, DbError> {
        let mut out = std::collections::HashMap::new();
        let mut stmt = self.conn.prepare(
            "SELECT repo_id, LOWER(full_name) FROM github_repository
             WHERE full_name = ?1 COLLATE NOCASE",
        )?;
        for name in full_names {
            if let Some((id, lowered)) = stmt
                .query_row(params![name], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .optional()?
            {
                out.insert(lowered, id);
            }
        }
        Ok(out)
    }

    /// Companies whose normalized name matches, for ecosystem→company linking.
    pub fn companies_by_normalized_name(
        &self,
        normalized: &str,
    ) -> Result<Vec<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT company_id, company_name FROM company")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, name) = row?;
            if crate::normalize::normalize_company_name(&name) == normalized {
                out.push(id);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::open_test_db;

    #[test]
    fn test_get_or_create_ecosystem_dedups() {
        let (_dir, db) = open_test_db();
        let a = db.get_or_create_ecosystem("Ethereum", "ethereum", "protocol", 1).unwrap();
        let b = db.get_or_create_ecosystem("Ethereum", "ethereum", "protocol", 1).unwrap();
        assert_eq!(a, b);
        assert_eq!(db.all_ecosystems().unwrap().len(), 1);
    }

    #[test]
    fn test_link_ecosystem_repo_ignore_dup() {
        let (_dir, db) = open_test_db();
        let eco = db.get_or_create_ecosystem("Uniswap", "uniswap", "protocol", 1).unwrap();
        db.insert_repo_ignore("uniswap/v3-core", None, None, None, 0, 0, None).unwrap();
        let repo = db.get_repo_by_full_name("uniswap/v3-core").unwrap().unwrap();

        assert!(db.link_ecosystem_repo(&eco, &repo.repo_id, Some("taxonomy")).unwrap());
        assert!(!db.link_ecosystem_repo(&eco, &repo.repo_id, Some("taxonomy")).unwrap());
    }

    #[test]
    fn test_companies_by_normalized_name() {
        let (_dir, db) = open_test_db();
        db.create_company("Uniswap Labs", None).unwrap();
        db.create_company("Paradigm", Some("paradigm.xyz")).unwrap();

        let hits = db.companies_by_normalized_name("uniswap").unwrap();
        assert_eq!(hits.len(), 1);
        assert!(db.companies_by_normalized_name("nomatch").unwrap().is_empty());
    }
}
