use rusqlite::{params, OptionalExtension};

use super::*;
use crate::normalize::placeholder_domain;

impl TalentDb {
    // =========================================================================
    // Companies
    // =========================================================================

    /// Create a company, or return the existing row that owns the same
    /// domain. When no real domain is known a `<slug>.placeholder` domain is
    /// synthesized from the name, so the unique key always exists and a
    /// later real domain can be promoted in place. Returns the company id.
    pub fn create_company(
        &self,
        company_name: &str,
        real_domain: Option<&str>,
    ) -> Result<String, DbError> {
        let domain = match real_domain {
            Some(d) => d.to_lowercase(),
            None => placeholder_domain(company_name),
        };

        let company_id: String = self.conn.query_row(
            "INSERT INTO company (company_id, company_name, company_domain, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(company_domain) DO UPDATE SET company_name = excluded.company_name
             RETURNING company_id",
            params![
                crate::util::new_id(),
                company_name.trim(),
                domain,
                crate::util::now_rfc3339()
            ],
            |row| row.get(0),
        )?;
        Ok(company_id)
    }

    pub fn get_company(&self, company_id: &str) -> Result<Option<DbCompany>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT company_id, company_name, company_domain, website_url, linkedin_url,
                    size_bucket, founded_year, taxonomy_slug
             FROM company WHERE company_id = ?1",
        )?;
        let company = stmt
            .query_row(params![company_id], Self::map_company_row)
            .optional()?;
        Ok(company)
    }

    /// Exact case-insensitive name lookup.
    pub fn find_company_id_by_name(&self, name: &str) -> Result<Option<String>, DbError> {
        let id = self
            .conn
            .query_row(
                "SELECT company_id FROM company
                 WHERE LOWER(TRIM(company_name)) = LOWER(TRIM(?1))
                 LIMIT 1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Promote a placeholder domain to a real one. Idempotent and
    /// id-preserving; a no-op when the company already owns a real domain
    /// or when another company already holds the target domain.
    pub fn promote_company_domain(
        &self,
        company_id: &str,
        real_domain: &str,
    ) -> Result<bool, DbError> {
        let real_domain = real_domain.to_lowercase();

        let taken: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM company WHERE company_domain = ?1 AND company_id != ?2)",
            params![real_domain, company_id],
            |row| row.get(0),
        )?;
        if taken {
            return Ok(false);
        }

        let changed = self.conn.execute(
            "UPDATE company SET company_domain = ?2
             WHERE company_id = ?1 AND company_domain LIKE '%.placeholder'",
            params![company_id, real_domain],
        )?;
        Ok(changed > 0)
    }

    /// Every company with its employment count, as scanned by deduplication.
    pub fn companies_for_dedup(&self) -> Result<Vec<CompanyDedupRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.company_id, c.company_name, c.company_domain, c.linkedin_url,
                    c.website_url, c.founded_year,
                    (SELECT COUNT(*) FROM employment e WHERE e.company_id = c.company_id)
             FROM company c
             ORDER BY c.company_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CompanyDedupRow {
                company_id: row.get(0)?,
                company_name: row.get(1)?,
                company_domain: row.get(2)?,
                linkedin_url: row.get(3)?,
                website_url: row.get(4)?,
                founded_year: row.get(5)?,
                employee_count: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Move all employment rows from one company to another. Returns the
    /// number of rows moved. Runs inside the caller's merge transaction.
    pub fn move_employment(&self, from_company: &str, to_company: &str) -> Result<usize, DbError> {
        let moved = self.conn.execute(
            "UPDATE employment SET company_id = ?2 WHERE company_id = ?1",
            params![from_company, to_company],
        )?;
        Ok(moved)
    }

    /// Repoint repository→company links from one company to another.
    pub fn move_repo_company_links(
        &self,
        from_company: &str,
        to_company: &str,
    ) -> Result<usize, DbError> {
        let moved = self.conn.execute(
            "UPDATE github_repository SET company_id = ?2 WHERE company_id = ?1",
            params![from_company, to_company],
        )?;
        Ok(moved)
    }

    /// Delete a company row. Dependent employment must be moved first.
    pub fn delete_company(&self, company_id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "DELETE FROM company_ecosystem WHERE company_id = ?1",
            params![company_id],
        )?;
        self.conn
            .execute("DELETE FROM company WHERE company_id = ?1", params![company_id])?;
        Ok(())
    }

    /// All company names, lowercased, for the promotion engine's
    /// tracked-company check.
    pub fn company_names_lower(&self) -> Result<std::collections::HashSet<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT LOWER(TRIM(company_name)) FROM company")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// (id, name, lowered name, alphanumeric-collapsed name) for warm-loading
    /// the identifier index.
    pub fn company_index_rows(&self) -> Result<Vec<(String, String)>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT company_id, company_name FROM company")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub(crate) fn map_company_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbCompany> {
        Ok(DbCompany {
            company_id: row.get(0)?,
            company_name: row.get(1)?,
            company_domain: row.get(2)?,
            website_url: row.get(3)?,
            linkedin_url: row.get(4)?,
            size_bucket: row.get(5)?,
            founded_year: row.get(6)?,
            taxonomy_slug: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::open_test_db;

    #[test]
    fn test_create_company_placeholder_domain() {
        let (_dir, db) = open_test_db();
        let id = db.create_company("Analytical Engines", None).unwrap();
        let company = db.get_company(&id).unwrap().unwrap();
        assert_eq!(company.company_domain, "analyticalengines.placeholder");
    }

    #[test]
    fn test_create_company_referentially_transparent() {
        let (_dir, db) = open_test_db();
        let a = db.create_company("Uniswap Labs", None).unwrap();
        let b = db.create_company("Uniswap Labs", None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_promote_company_domain_idempotent() {
        let (_dir, db) = open_test_db();
        let id = db.create_company("Uniswap Labs", None).unwrap();

        assert!(db.promote_company_domain(&id, "uniswap.org").unwrap());
        // Already real: second promotion is a no-op, id unchanged
        assert!(!db.promote_company_domain(&id, "other.org").unwrap());
        let company = db.get_company(&id).unwrap().unwrap();
        assert_eq!(company.company_domain, "uniswap.org");
    }

    #[test]
    fn test_promote_company_domain_refuses_taken_domain() {
        let (_dir, db) = open_test_db();
        let a = db.create_company("Aave", Some("aave.com")).unwrap();
        let b = db.create_company("Aave Labs", None).unwrap();
        assert_ne!(a, b);
        assert!(!db.promote_company_domain(&b, "aave.com").unwrap());
    }

    #[test]
    fn test_move_employment() {
        let (_dir, db) = open_test_db();
        let src = db.create_company("Acme Old", None).unwrap();
        let dst = db.create_company("Acme", Some("acme.com")).unwrap();
        db.insert_person(&super::DbPerson {
            person_id: "p1".into(),
            ..Default::default()
        })
        .unwrap();
        db.add_employment("p1", &src, Some("Eng"), None, None, None, "t", 0.9).unwrap();

        let moved = db.move_employment(&src, &dst).unwrap();
        assert_eq!(moved, 1);

        let count: i64 = db
            .conn_ref()
            .query_row(
                "SELECT COUNT(*) FROM employment WHERE company_id = ?1",
                [&dst],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
