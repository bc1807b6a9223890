use rusqlite::{params, OptionalExtension};

use super::*;
use crate::util::now_rfc3339;

impl TalentDb {
    // =========================================================================
    // People
    // =========================================================================

    /// Insert a new person row. The caller supplies a fresh id and the
    /// already-normalized LinkedIn URL; a unique-index violation on the
    /// normalized URL surfaces as `DbError::Sqlite` and is resolved by the
    /// importer via the conflict path.
    pub fn insert_person(&self, person: &DbPerson) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO person (
                person_id, full_name, first_name, last_name, headline, location,
                description, linkedin_url, normalized_linkedin_url,
                needs_enrichment, refreshed_at, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                person.person_id,
                person.full_name,
                person.first_name,
                person.last_name,
                person.headline,
                person.location,
                person.description,
                person.linkedin_url,
                person.normalized_linkedin_url,
                person.needs_enrichment as i32,
                person.refreshed_at,
                now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_person(&self, person_id: &str) -> Result<Option<DbPerson>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT person_id, full_name, first_name, last_name, headline, location,
                    description, linkedin_url, normalized_linkedin_url,
                    needs_enrichment, refreshed_at, created_at
             FROM person WHERE person_id = ?1",
        )?;
        let person = stmt
            .query_row(params![person_id], Self::map_person_row)
            .optional()?;
        Ok(person)
    }

    pub fn get_person_by_normalized_linkedin(
        &self,
        normalized_url: &str,
    ) -> Result<Option<DbPerson>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT person_id, full_name, first_name, last_name, headline, location,
                    description, linkedin_url, normalized_linkedin_url,
                    needs_enrichment, refreshed_at, created_at
             FROM person WHERE normalized_linkedin_url = ?1",
        )?;
        let person = stmt
            .query_row(params![normalized_url], Self::map_person_row)
            .optional()?;
        Ok(person)
    }

    /// Fill empty scalar fields from a patch. Populated columns are never
    /// overwritten; `refreshed_at` always advances. Returns true when the
    /// row was touched.
    pub fn enrich_person_fields(
        &self,
        person_id: &str,
        patch: &PersonPatch,
    ) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE person SET
                full_name = COALESCE(full_name, ?2),
                first_name = COALESCE(first_name, ?3),
                last_name = COALESCE(last_name, ?4),
                headline = COALESCE(headline, ?5),
                location = COALESCE(location, ?6),
                description = COALESCE(description, ?7),
                refreshed_at = ?8
             WHERE person_id = ?1",
            params![
                person_id,
                patch.full_name,
                patch.first_name,
                patch.last_name,
                patch.headline,
                patch.location,
                patch.description,
                now_rfc3339(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Clear the needs-enrichment flag once a scraper run has filled the
    /// record in.
    pub fn mark_person_enriched(&self, person_id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE person SET needs_enrichment = 0, refreshed_at = ?2 WHERE person_id = ?1",
            params![person_id, now_rfc3339()],
        )?;
        Ok(())
    }

    /// Record an email for a person (lowercased, INSERT OR IGNORE on the
    /// (person, email) unique key). Returns true when a row was inserted.
    pub fn add_person_email(
        &self,
        person_id: &str,
        email: &str,
        email_type: &str,
        is_primary: bool,
        source: &str,
    ) -> Result<bool, DbError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO person_email
                (email_id, person_id, email, email_type, is_primary, source, verified, added_at)
             VALUES (?1, ?2, LOWER(?3), ?4, ?5, ?6, 0, ?7)",
            params![
                crate::util::new_id(),
                person_id,
                email,
                email_type,
                is_primary as i32,
                source,
                now_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_person_emails(&self, person_id: &str) -> Result<Vec<DbEmail>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT email, email_type, is_primary, source
             FROM person_email WHERE person_id = ?1
             ORDER BY is_primary DESC, email",
        )?;
        let rows = stmt.query_map(params![person_id], |row| {
            Ok(DbEmail {
                email: row.get(0)?,
                email_type: row.get(1)?,
                is_primary: row.get::<_, i64>(2)? != 0,
                source: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Add an employment row unless one already exists for this
    /// (person, company, start_date). Returns true when inserted.
    #[allow(clippy::too_many_arguments)]
    pub fn add_employment(
        &self,
        person_id: &str,
        company_id: &str,
        title: Option<&str>,
        start_date: Option<&str>,
        end_date: Option<&str>,
        location: Option<&str>,
        source_ref: &str,
        source_confidence: f64,
    ) -> Result<bool, DbError> {
        // Inverted ranges from garbage input: keep the start, drop the end
        let end_date = match (start_date, end_date) {
            (Some(start), Some(end)) if end < start => {
                log::debug!("employment range inverted ({start}..{end}), dropping end");
                None
            }
            _ => end_date,
        };

        // UNIQUE(person, company, start_date) cannot be a SQL constraint here:
        // NULL start dates must also dedup, and SQL NULLs never compare equal.
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM employment
                WHERE person_id = ?1 AND company_id = ?2
                  AND (start_date = ?3 OR (start_date IS NULL AND ?3 IS NULL))
             )",
            params![person_id, company_id, start_date],
            |row| row.get(0),
        )?;
        if exists {
            return Ok(false);
        }

        self.conn.execute(
            "INSERT INTO employment (
                employment_id, person_id, company_id, title, start_date, end_date,
                location, date_precision, source_text_ref, source_confidence, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                crate::util::new_id(),
                person_id,
                company_id,
                title,
                start_date,
                end_date,
                location,
                if start_date.is_some() { Some("month_year") } else { None },
                source_ref,
                source_confidence,
                now_rfc3339(),
            ],
        )?;
        Ok(true)
    }

    /// Whether any employment row links this person and company. CSV rows
    /// carry no dates, so the importer dedups on the bare pair.
    pub fn has_employment(&self, person_id: &str, company_id: &str) -> Result<bool, DbError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM employment WHERE person_id = ?1 AND company_id = ?2
             )",
            params![person_id, company_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Add an education row unless the person already has this school.
    pub fn add_education(
        &self,
        person_id: &str,
        school_name: &str,
        degree: Option<&str>,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<bool, DbError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM education
                WHERE person_id = ?1 AND LOWER(TRIM(school_name)) = LOWER(TRIM(?2))
             )",
            params![person_id, school_name],
            |row| row.get(0),
        )?;
        if exists {
            return Ok(false);
        }

        self.conn.execute(
            "INSERT INTO education (education_id, person_id, school_name, degree,
                                    start_date, end_date, date_precision)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'year')",
            params![crate::util::new_id(), person_id, school_name, degree, start_date, end_date],
        )?;
        Ok(true)
    }

    /// Record a Twitter/X handle (INSERT OR IGNORE on (person, handle)).
    pub fn add_twitter(
        &self,
        person_id: &str,
        handle: &str,
        source: &str,
    ) -> Result<bool, DbError> {
        let handle = handle.trim().trim_start_matches('@');
        if handle.is_empty() {
            return Ok(false);
        }
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO twitter_profile (twitter_id, person_id, handle, source)
             VALUES (?1, ?2, ?3, ?4)",
            params![crate::util::new_id(), person_id, handle, source],
        )?;
        Ok(inserted > 0)
    }

    /// Counts of a person's owned edges, consulted before a merge delete.
    pub fn person_edge_counts(&self, person_id: &str) -> Result<PersonEdgeCounts, DbError> {
        self.conn
            .query_row(
                "SELECT
                    (SELECT COUNT(*) FROM employment WHERE person_id = ?1),
                    (SELECT COUNT(*) FROM person_email WHERE person_id = ?1),
                    (SELECT COUNT(*) FROM education WHERE person_id = ?1),
                    (SELECT COUNT(*) FROM twitter_profile WHERE person_id = ?1)",
                params![person_id],
                |row| {
                    Ok(PersonEdgeCounts {
                        employment: row.get(0)?,
                        emails: row.get(1)?,
                        education: row.get(2)?,
                        twitter: row.get(3)?,
                    })
                },
            )
            .map_err(DbError::from)
    }

    /// Delete a person row. Callers must have moved or verified-empty all
    /// dependent edges first.
    pub fn delete_person(&self, person_id: &str) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM person WHERE person_id = ?1", params![person_id])?;
        Ok(())
    }

    /// People sharing an identical, non-blank full name, grouped for the
    /// post-promotion merge pass. Each row carries its enrichment score:
    /// LinkedIn +100, headline +10, +50 per employment, +20 per email,
    /// +30 per education, +25 per twitter profile.
    pub fn people_with_duplicate_names(&self) -> Result<Vec<PersonMergeRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "WITH name_counts AS (
                SELECT full_name FROM person
                WHERE full_name IS NOT NULL AND TRIM(full_name) != ''
                GROUP BY full_name HAVING COUNT(*) > 1
             )
             SELECT
                p.person_id,
                p.full_name,
                p.linkedin_url,
                gp.github_profile_id,
                (SELECT COUNT(*) FROM employment WHERE person_id = p.person_id),
                (SELECT COUNT(*) FROM person_email WHERE person_id = p.person_id),
                (SELECT COUNT(*) FROM education WHERE person_id = p.person_id),
                (SELECT COUNT(*) FROM twitter_profile WHERE person_id = p.person_id),
                (CASE WHEN p.linkedin_url IS NOT NULL THEN 100 ELSE 0 END +
                 CASE WHEN p.headline IS NOT NULL THEN 10 ELSE 0 END +
                 (SELECT COUNT(*) * 50 FROM employment WHERE person_id = p.person_id) +
                 (SELECT COUNT(*) * 20 FROM person_email WHERE person_id = p.person_id) +
                 (SELECT COUNT(*) * 30 FROM education WHERE person_id = p.person_id) +
                 (SELECT COUNT(*) * 25 FROM twitter_profile WHERE person_id = p.person_id)
                ) AS enrichment_score
             FROM person p
             LEFT JOIN github_profile gp ON gp.person_id = p.person_id
             WHERE p.full_name IN (SELECT full_name FROM name_counts)
             ORDER BY p.full_name, enrichment_score DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(PersonMergeRow {
                person_id: row.get(0)?,
                full_name: row.get(1)?,
                linkedin_url: row.get(2)?,
                github_profile_id: row.get(3)?,
                edge_counts: PersonEdgeCounts {
                    employment: row.get(4)?,
                    emails: row.get(5)?,
                    education: row.get(6)?,
                    twitter: row.get(7)?,
                },
                enrichment_score: row.get(8)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// People flagged as needing enrichment with a LinkedIn URL to scrape,
    /// not already waiting in the queue. Feeds the scheduler's seeding sweep.
    pub fn people_needing_enrichment(&self, limit: i64) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.person_id FROM person p
             WHERE p.needs_enrichment = 1
               AND p.linkedin_url IS NOT NULL
               AND NOT EXISTS (
                   SELECT 1 FROM enrichment_queue q
                   WHERE q.person_id = p.person_id
                     AND q.status IN ('pending', 'in_progress')
               )
             ORDER BY p.refreshed_at ASC NULLS FIRST
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub(crate) fn map_person_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbPerson> {
        Ok(DbPerson {
            person_id: row.get(0)?,
            full_name: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            headline: row.get(4)?,
            location: row.get(5)?,
            description: row.get(6)?,
            linkedin_url: row.get(7)?,
            normalized_linkedin_url: row.get(8)?,
            needs_enrichment: row.get::<_, i64>(9)? != 0,
            refreshed_at: row.get(10)?,
            created_at: row.get(11)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::open_test_db;
    use super::*;

    fn sample_person(id: &str, linkedin: Option<&str>) -> DbPerson {
        DbPerson {
            person_id: id.to_string(),
            full_name: Some("Ada Lovelace".to_string()),
            linkedin_url: linkedin.map(|u| format!("https://www.{u}")),
            normalized_linkedin_url: linkedin.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_and_get_person() {
        let (_dir, db) = open_test_db();
        db.insert_person(&sample_person("p1", Some("linkedin.com/in/ada"))).unwrap();

        let found = db.get_person("p1").unwrap().unwrap();
        assert_eq!(found.full_name.as_deref(), Some("Ada Lovelace"));

        let by_url = db
            .get_person_by_normalized_linkedin("linkedin.com/in/ada")
            .unwrap()
            .unwrap();
        assert_eq!(by_url.person_id, "p1");
    }

    #[test]
    fn test_normalized_linkedin_unique() {
        let (_dir, db) = open_test_db();
        db.insert_person(&sample_person("p1", Some("linkedin.com/in/ada"))).unwrap();
        let dup = db.insert_person(&sample_person("p2", Some("linkedin.com/in/ada")));
        assert!(dup.is_err());

        // Two pure GitHub-origin people with NULL urls are fine
        db.insert_person(&sample_person("p3", None)).unwrap();
        db.insert_person(&sample_person("p4", None)).unwrap();
    }

    #[test]
    fn test_enrich_never_overwrites() {
        let (_dir, db) = open_test_db();
        db.insert_person(&sample_person("p1", Some("linkedin.com/in/ada"))).unwrap();

        let patch = PersonPatch {
            full_name: Some("Someone Else".to_string()),
            headline: Some("Engineer".to_string()),
            ..Default::default()
        };
        assert!(db.enrich_person_fields("p1", &patch).unwrap());

        let person = db.get_person("p1").unwrap().unwrap();
        // full_name was populated, so it is preserved; headline was empty, so it fills
        assert_eq!(person.full_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(person.headline.as_deref(), Some("Engineer"));
        assert!(person.refreshed_at.is_some());
    }

    #[test]
    fn test_enrich_advances_refreshed_at() {
        let (_dir, db) = open_test_db();
        db.insert_person(&sample_person("p1", None)).unwrap();
        db.enrich_person_fields("p1", &PersonPatch::default()).unwrap();
        let first = db.get_person("p1").unwrap().unwrap().refreshed_at.unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        db.enrich_person_fields("p1", &PersonPatch::default()).unwrap();
        let second = db.get_person("p1").unwrap().unwrap().refreshed_at.unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_add_person_email_dedup() {
        let (_dir, db) = open_test_db();
        db.insert_person(&sample_person("p1", None)).unwrap();

        assert!(db.add_person_email("p1", "Ada@AE.com", "work", true, "csv").unwrap());
        // Same address, different case: unique on lowered form
        assert!(!db.add_person_email("p1", "ada@ae.com", "work", false, "csv").unwrap());

        let emails = db.get_person_emails("p1").unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].email, "ada@ae.com");
        assert!(emails[0].is_primary);
    }

    #[test]
    fn test_add_employment_dedup_by_start_date() {
        let (_dir, db) = open_test_db();
        db.insert_person(&sample_person("p1", None)).unwrap();
        db.create_company("Analytical Engines", None).unwrap();
        let company_id = db.find_company_id_by_name("Analytical Engines").unwrap().unwrap();

        assert!(db
            .add_employment("p1", &company_id, Some("Engineer"), None, None, None, "csv", 0.8)
            .unwrap());
        // Same (person, company, NULL start) is deduped
        assert!(!db
            .add_employment("p1", &company_id, Some("Engineer"), None, None, None, "csv", 0.8)
            .unwrap());
        // Distinct start date is a second stint, allowed
        assert!(db
            .add_employment("p1", &company_id, Some("Lead"), Some("2023-01-01"), None, None, "csv", 0.8)
            .unwrap());
    }

    #[test]
    fn test_add_employment_drops_inverted_end_date() {
        let (_dir, db) = open_test_db();
        db.insert_person(&sample_person("p1", None)).unwrap();
        db.create_company("Acme", Some("acme.com")).unwrap();
        let company_id = db.find_company_id_by_name("Acme").unwrap().unwrap();

        db.add_employment(
            "p1", &company_id, None, Some("2022-06-01"), Some("2020-01-01"), None, "csv", 0.8,
        )
        .unwrap();

        let (start, end): (Option<String>, Option<String>) = db
            .conn_ref()
            .query_row(
                "SELECT start_date, end_date FROM employment WHERE person_id = 'p1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(start.as_deref(), Some("2022-06-01"));
        assert_eq!(end, None);
    }

    #[test]
    fn test_people_with_duplicate_names_scoring() {
        let (_dir, db) = open_test_db();
        let rich = DbPerson {
            person_id: "rich".into(),
            full_name: Some("0age".into()),
            linkedin_url: Some("https://linkedin.com/in/0age".into()),
            normalized_linkedin_url: Some("linkedin.com/in/0age".into()),
            ..Default::default()
        };
        let poor = DbPerson {
            person_id: "poor".into(),
            full_name: Some("0age".into()),
            ..Default::default()
        };
        db.insert_person(&rich).unwrap();
        db.insert_person(&poor).unwrap();
        db.add_person_email("rich", "x@y.com", "work", true, "t").unwrap();

        let rows = db.people_with_duplicate_names().unwrap();
        assert_eq!(rows.len(), 2);
        // Sorted score-descending within the group
        assert_eq!(rows[0].person_id, "rich");
        assert_eq!(rows[0].enrichment_score, 120);
        assert_eq!(rows[1].enrichment_score, 0);
    }
}
