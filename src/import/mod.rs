//! CSV importer: resolve each row against existing entities, then enrich or
//! create, with per-batch commits and per-row savepoints.
//!
//! The only admission requirement is an identifier: rows with neither a
//! LinkedIn URL nor a GitHub URL are counted and skipped. Enrichment never
//! overwrites populated fields; creation synthesizes placeholder names for
//! identifier-only rows and flags them for later enrichment. One bad row
//! rolls back alone and the run continues.

pub mod report;
pub mod row;

use std::path::Path;

use crate::config::IMPORT_BATCH_SIZE;
use crate::db::{DbError, DbPerson, PersonPatch, TalentDb};
use crate::error::PipelineError;
use crate::index::IdentifierIndex;
use crate::normalize::{extract_github_username, infer_email_type, normalize_linkedin_url};
use crate::resolver::{EntityResolver, RecordIdentifiers};
use crate::util::{join_name, new_id, now_rfc3339};

pub use report::{ImportStats, RowOutcome, SkipReason};
pub use row::CsvRow;

pub struct CsvImporter<'a> {
    db: &'a TalentDb,
    index: &'a IdentifierIndex,
    source_tag: String,
    stats: ImportStats,
}

impl<'a> CsvImporter<'a> {
    pub fn new(db: &'a TalentDb, index: &'a IdentifierIndex, source_tag: &str) -> Self {
        Self {
            db,
            index,
            source_tag: source_tag.to_string(),
            stats: ImportStats::default(),
        }
    }

    /// Import a CSV file. Commits every [`IMPORT_BATCH_SIZE`] rows; row-level
    /// failures are rolled back individually and collected into the report.
    pub fn import_file(&mut self, path: &Path) -> Result<ImportStats, PipelineError> {
        let started_at = now_rfc3339();
        log::info!("Import: starting {} (source tag '{}')", path.display(), self.source_tag);

        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| PipelineError::Fatal(format!("cannot open {}: {}", path.display(), e)))?;
        let headers = reader
            .headers()
            .map_err(|e| PipelineError::Fatal(format!("cannot read CSV header: {}", e)))?
            .clone();

        let db = self.db;
        let mut batch: Vec<CsvRow> = Vec::with_capacity(IMPORT_BATCH_SIZE);

        for record in reader.records() {
            match record {
                Ok(record) => batch.push(CsvRow::from_record(&headers, &record)),
                Err(e) => {
                    self.stats.total_rows += 1;
                    self.stats.errors.push(format!("unreadable CSV record: {}", e));
                    continue;
                }
            }
            if batch.len() >= IMPORT_BATCH_SIZE {
                let rows = std::mem::take(&mut batch);
                self.run_batch(db, rows)?;
            }
        }
        if !batch.is_empty() {
            self.run_batch(db, batch)?;
        }

        self.stats.log_report(&path.display().to_string());

        let metadata = serde_json::to_value(&self.stats).unwrap_or_default();
        db.log_migration_event(
            "csv_import",
            &self.source_tag,
            "completed",
            self.stats.total_rows as i64,
            self.stats.profiles_created as i64,
            self.stats.profiles_enriched as i64,
            (self.stats.skipped_empty
                + self.stats.skipped_invalid
                + self.stats.skipped_duplicate_linkedin) as i64,
            None,
            &started_at,
            Some(&metadata),
        )?;

        Ok(std::mem::take(&mut self.stats))
    }

    /// One committed batch. Each row runs inside its own savepoint so a
    /// failure undoes that row only; the identifier-index entries the row
    /// wrote through are restored alongside the savepoint rollback.
    fn run_batch(&mut self, db: &TalentDb, rows: Vec<CsvRow>) -> Result<(), PipelineError> {
        db.with_transaction(|db| {
            for (i, row) in rows.into_iter().enumerate() {
                self.stats.total_rows += 1;
                let snapshot = IndexSnapshot::take(self.index, &row);
                let savepoint = format!("import_row_{i}");
                let result =
                    db.with_savepoint(&savepoint, |db| self.process_row(db, &row));
                match result {
                    Ok(outcome) => self.stats.record_outcome(&outcome),
                    Err(e) => {
                        snapshot.restore(self.index);
                        let who = row.full_name().unwrap_or("<unnamed>");
                        self.stats.errors.push(format!("row for {}: {}", who, e));
                    }
                }
            }
            Ok(())
        })?;

        if self.stats.total_rows % 1000 == 0 {
            log::info!("Import: processed {} rows", self.stats.total_rows);
        }
        Ok(())
    }

    fn process_row(&mut self, db: &TalentDb, row: &CsvRow) -> Result<RowOutcome, DbError> {
        if row.is_empty() {
            return Ok(RowOutcome::Skipped(SkipReason::EmptyRow));
        }

        if row.linkedin_url().is_none() && row.github_url().is_none() {
            return Ok(RowOutcome::Skipped(SkipReason::NoIdentifier));
        }

        let identifiers = RecordIdentifiers {
            linkedin_url: row.linkedin_url().map(str::to_string),
            github_url: row.github_url().map(str::to_string),
            full_name: row.full_name().map(str::to_string),
            company_name: row.company().map(str::to_string),
        };

        // Fuzzy name+company matching stays off for bulk import: a false
        // positive here silently merges two strangers.
        let resolver = EntityResolver::new(db, self.index);

        match resolver.resolve(&identifiers) {
            Some(person_id) => {
                self.enrich_existing(db, &resolver, &person_id, row)?;
                Ok(RowOutcome::Enriched)
            }
            None => self.create_new(db, &resolver, row),
        }
    }

    // -------------------------------------------------------------------------
    // Enrich path
    // -------------------------------------------------------------------------

    fn enrich_existing(
        &mut self,
        db: &TalentDb,
        resolver: &EntityResolver<'_>,
        person_id: &str,
        row: &CsvRow,
    ) -> Result<(), DbError> {
        let patch = PersonPatch {
            full_name: row.full_name().map(str::to_string),
            first_name: row.first_name().map(str::to_string),
            last_name: row.last_name().map(str::to_string),
            headline: row.job_title().map(str::to_string),
            location: row.location().map(str::to_string),
            description: None,
        };
        db.enrich_person_fields(person_id, &patch)?;

        self.add_side_entities(db, resolver, person_id, row)?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Create path
    // -------------------------------------------------------------------------

    fn create_new(
        &mut self,
        db: &TalentDb,
        resolver: &EntityResolver<'_>,
        row: &CsvRow,
    ) -> Result<RowOutcome, DbError> {
        let linkedin_url = row.linkedin_url();
        let github_url = row.github_url();
        let normalized_linkedin = linkedin_url.and_then(normalize_linkedin_url);

        let mut needs_enrichment = false;
        let full_name = match row
            .full_name()
            .map(str::to_string)
            .or_else(|| join_name(row.first_name(), row.last_name()))
        {
            Some(name) => name,
            None => {
                // Identifier-only row: synthesize a placeholder and flag it
                needs_enrichment = true;
                placeholder_name(normalized_linkedin.as_deref(), github_url)
            }
        };

        let person = DbPerson {
            person_id: new_id(),
            full_name: Some(full_name),
            first_name: row.first_name().map(str::to_string),
            last_name: row.last_name().map(str::to_string),
            headline: row.job_title().map(str::to_string),
            location: row.location().map(str::to_string),
            description: None,
            linkedin_url: linkedin_url.map(str::to_string),
            normalized_linkedin_url: normalized_linkedin.clone(),
            needs_enrichment,
            refreshed_at: Some(now_rfc3339()),
            created_at: String::new(),
        };

        if let Err(e) = db.insert_person(&person) {
            if is_unique_violation(&e) {
                // Another writer owns this canonical URL: switch to the
                // enrich path against the existing row.
                if let Some(normalized) = normalized_linkedin.as_deref() {
                    if let Some(existing) = db.get_person_by_normalized_linkedin(normalized)? {
                        self.index.insert_linkedin(normalized, &existing.person_id);
                        self.enrich_existing(db, resolver, &existing.person_id, row)?;
                        return Ok(RowOutcome::Enriched);
                    }
                }
                return Ok(RowOutcome::Skipped(SkipReason::DuplicateLinkedin));
            }
            return Err(e);
        }

        // Write through immediately so later rows in this batch resolve to
        // the new person; the batch runner restores the index snapshot if
        // the rest of the row fails.
        if let Some(normalized) = normalized_linkedin.as_deref() {
            self.index.insert_linkedin(normalized, &person.person_id);
        }

        self.add_side_entities(db, resolver, &person.person_id, row)?;

        if needs_enrichment {
            self.stats.profiles_needing_enrichment += 1;
        }
        match (linkedin_url, github_url) {
            (None, Some(_)) => self.stats.github_only_profiles += 1,
            (Some(_), None) => self.stats.linkedin_only_profiles += 1,
            _ => {}
        }
        Ok(RowOutcome::Created)
    }

    // -------------------------------------------------------------------------
    // Side entities (shared by both paths)
    // -------------------------------------------------------------------------

    fn add_side_entities(
        &mut self,
        db: &TalentDb,
        resolver: &EntityResolver<'_>,
        person_id: &str,
        row: &CsvRow,
    ) -> Result<(), DbError> {
        // Emails: first one primary, conflict-ignore on the unique pair
        for (i, email) in row.emails().iter().enumerate() {
            let email_type = infer_email_type(email);
            if db.add_person_email(person_id, email, email_type, i == 0, &self.source_tag)? {
                self.stats.emails_added += 1;
            }
        }

        // GitHub profile: link an orphan, create a missing one, or count a
        // conflict when the username already belongs to someone else
        if let Some(github_url) = row.github_url() {
            if let Some(username) = extract_github_username(github_url) {
                self.attach_github_profile(db, person_id, &username)?;
            }
        }

        // Employment via the company resolver
        if let Some(company_name) = row.company() {
            let known = self.index.company_by_name(company_name).is_some();
            match resolver.find_or_create_company(company_name)? {
                Some(company_id) => {
                    if !known {
                        self.stats.companies_created += 1;
                    }
                    if !db.has_employment(person_id, &company_id)? {
                        db.add_employment(
                            person_id,
                            &company_id,
                            row.job_title(),
                            None,
                            None,
                            None,
                            &self.source_tag,
                            0.8,
                        )?;
                        self.stats.employment_records_added += 1;
                    }
                }
                None => self.stats.invalid_companies += 1,
            }
        }

        // Education
        if let Some(school) = row.school() {
            if db.add_education(person_id, school, None, None, None)? {
                self.stats.education_records_added += 1;
            }
        }

        // Twitter/X
        if let Some(handle) = row.twitter() {
            if db.add_twitter(person_id, handle, &self.source_tag)? {
                self.stats.twitter_handles_added += 1;
            }
        }

        Ok(())
    }

    fn attach_github_profile(
        &mut self,
        db: &TalentDb,
        person_id: &str,
        username: &str,
    ) -> Result<(), DbError> {
        match self.index.github_entry(username) {
            Some((Some(owner), _)) if owner == person_id => {
                // Already linked to this person; nothing to do
            }
            Some((Some(_other), _)) => {
                self.stats.github_conflicts += 1;
            }
            Some((None, profile_id)) => {
                if db.link_profile_to_person(&profile_id, person_id, &self.source_tag)? {
                    self.index.insert_github(username, Some(person_id), &profile_id);
                    self.stats.github_linked_existing += 1;
                } else {
                    // Lost a race: someone else linked it first
                    self.stats.github_conflicts += 1;
                }
            }
            None => {
                let profile = crate::db::DbGithubProfile {
                    github_profile_id: new_id(),
                    github_username: username.to_string(),
                    person_id: Some(person_id.to_string()),
                    source: Some(self.source_tag.clone()),
                    ..Default::default()
                };
                let profile_id = db.upsert_github_profile(&profile)?;
                self.index.insert_github(username, Some(person_id), &profile_id);
                self.stats.github_created += 1;
            }
        }
        Ok(())
    }
}

/// Pre-row snapshot of the index entries a row can touch. A failed row's
/// DB writes roll back via its savepoint; this restores the write-through
/// map entries to match.
struct IndexSnapshot {
    linkedin: Option<(String, Option<String>)>,
    github: Option<(String, Option<(Option<String>, String)>)>,
    company: Option<(String, Option<String>)>,
}

impl IndexSnapshot {
    fn take(index: &IdentifierIndex, row: &CsvRow) -> Self {
        let linkedin = row
            .linkedin_url()
            .and_then(normalize_linkedin_url)
            .map(|url| {
                let prior = index.person_by_linkedin(&url);
                (url, prior)
            });
        let github = row
            .github_url()
            .and_then(extract_github_username)
            .map(|username| {
                let prior = index.github_entry(&username);
                (username, prior)
            });
        let company = row.company().map(|name| {
            let prior = index.company_by_name(name);
            (name.to_string(), prior)
        });
        Self {
            linkedin,
            github,
            company,
        }
    }

    fn restore(&self, index: &IdentifierIndex) {
        if let Some((url, prior)) = &self.linkedin {
            match prior {
                Some(person_id) => index.insert_linkedin(url, person_id),
                None => index.remove_linkedin(url),
            }
        }
        if let Some((username, prior)) = &self.github {
            match prior {
                Some((person_id, profile_id)) => {
                    index.insert_github(username, person_id.as_deref(), profile_id)
                }
                None => index.remove_github(username),
            }
        }
        if let Some((name, prior)) = &self.company {
            match prior {
                Some(company_id) => index.insert_company(name, company_id),
                None => index.remove_company(name),
            }
        }
    }
}

/// `[LinkedIn] Ada Lovelace` / `[GitHub] 0age` placeholder for rows with an
/// identifier but no name.
fn placeholder_name(normalized_linkedin: Option<&str>, github_url: Option<&str>) -> String {
    if let Some(normalized) = normalized_linkedin {
        let slug = normalized.rsplit('/').next().unwrap_or("");
        let titled = slug
            .split('-')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        return format!("[LinkedIn] {titled}");
    }
    if let Some(username) = github_url.and_then(extract_github_username) {
        return format!("[GitHub] {username}");
    }
    "[Unknown Profile]".to_string()
}

/// Constraint-violation detection for the create/conflict fork.
fn is_unique_violation(err: &DbError) -> bool {
    match err {
        DbError::Sqlite(rusqlite::Error::SqliteFailure(inner, _)) => {
            inner.code == rusqlite::ErrorCode::ConstraintViolation
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_test_db;
    use std::io::Write;

    const HEADER: &str = "Full Name,First Name,Last Name,LinkedIn URL,GitHub URL,Company,Job Title,Location,Emails,School,Twiiter / X";

    fn write_csv(dir: &std::path::Path, name: &str, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    fn import(
        db: &TalentDb,
        index: &IdentifierIndex,
        path: &std::path::Path,
    ) -> ImportStats {
        let mut importer = CsvImporter::new(db, index, "test_source");
        importer.import_file(path).unwrap()
    }

    #[test]
    fn test_import_then_reimport_enriches_once() {
        let (dir, db) = open_test_db();
        let index = IdentifierIndex::new();
        index.warm_load(&db).unwrap();

        let first = write_csv(
            dir.path(),
            "first.csv",
            &[r#"Ada Lovelace,,,https://www.linkedin.com/in/ada-lovelace/,,Analytical Engines,Engineer,,ada@ae.com,,"#],
        );
        let stats = import(&db, &index, &first);
        assert_eq!(stats.profiles_created, 1);
        assert_eq!(stats.emails_added, 1);
        assert_eq!(stats.employment_records_added, 1);
        assert_eq!(stats.companies_created, 1);

        // Second file: same person via a messier URL, one new email
        let second = write_csv(
            dir.path(),
            "second.csv",
            &[r#"Ada Lovelace,,,linkedin.com/in/ada-lovelace,,,,London,"ada@ae.com; ada@gmail.com",,"#],
        );
        let stats = import(&db, &index, &second);
        assert_eq!(stats.profiles_created, 0);
        assert_eq!(stats.profiles_enriched, 1);
        assert_eq!(stats.emails_added, 1);

        // One person, one company, two emails, one employment row
        let person = db
            .get_person_by_normalized_linkedin("linkedin.com/in/ada-lovelace")
            .unwrap()
            .unwrap();
        let emails = db.get_person_emails(&person.person_id).unwrap();
        assert_eq!(emails.len(), 2);
        assert!(emails.iter().any(|e| e.email == "ada@ae.com" && e.email_type == "work"));
        assert!(emails.iter().any(|e| e.email == "ada@gmail.com" && e.email_type == "personal"));
        let counts = db.person_edge_counts(&person.person_id).unwrap();
        assert_eq!(counts.employment, 1);
        // Location filled by the second pass, title preserved from the first
        assert_eq!(person.location.as_deref(), Some("London"));
        assert_eq!(person.headline.as_deref(), Some("Engineer"));
    }

    #[test]
    fn test_import_idempotent() {
        let (dir, db) = open_test_db();
        let index = IdentifierIndex::new();
        index.warm_load(&db).unwrap();

        let csv = write_csv(
            dir.path(),
            "data.csv",
            &[
                r#"Ada Lovelace,,,https://linkedin.com/in/ada,,Acme Labs,Engineer,,ada@ae.com,Cambridge,@ada"#,
                r#"Grace Hopper,,,https://linkedin.com/in/grace,,Acme Labs,Admiral,,grace@navy.mil,,"#,
            ],
        );
        import(&db, &index, &csv);
        let rerun = import(&db, &index, &csv);

        // Second run is pure enrichment noise: nothing new created
        assert_eq!(rerun.profiles_created, 0);
        assert_eq!(rerun.profiles_enriched, 2);
        assert_eq!(rerun.emails_added, 0);
        assert_eq!(rerun.employment_records_added, 0);
        assert_eq!(rerun.education_records_added, 0);
        assert_eq!(rerun.twitter_handles_added, 0);

        let people: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM person", [], |row| row.get(0))
            .unwrap();
        assert_eq!(people, 2);
    }

    #[test]
    fn test_rows_without_identifiers_skipped() {
        let (dir, db) = open_test_db();
        let index = IdentifierIndex::new();
        index.warm_load(&db).unwrap();

        let csv = write_csv(
            dir.path(),
            "data.csv",
            &[
                r#"No Urls Person,,,,,Acme,,,,,"#,
                r#",,,,,,,,,,"#,
            ],
        );
        let stats = import(&db, &index, &csv);
        assert_eq!(stats.skipped_invalid, 1);
        assert_eq!(stats.skipped_empty, 1);
        assert_eq!(stats.profiles_created, 0);
    }

    #[test]
    fn test_github_only_row_gets_placeholder_name() {
        let (dir, db) = open_test_db();
        let index = IdentifierIndex::new();
        index.warm_load(&db).unwrap();

        let csv = write_csv(
            dir.path(),
            "data.csv",
            &[r#",,,,https://github.com/0age,,,,,,"#],
        );
        let stats = import(&db, &index, &csv);
        assert_eq!(stats.profiles_created, 1);
        assert_eq!(stats.github_only_profiles, 1);
        assert_eq!(stats.profiles_needing_enrichment, 1);
        assert_eq!(stats.github_created, 1);

        let name: String = db
            .conn_ref()
            .query_row("SELECT full_name FROM person", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "[GitHub] 0age");
        let flagged: i64 = db
            .conn_ref()
            .query_row("SELECT needs_enrichment FROM person", [], |row| row.get(0))
            .unwrap();
        assert_eq!(flagged, 1);
    }

    #[test]
    fn test_github_username_conflict_counted() {
        let (dir, db) = open_test_db();
        let index = IdentifierIndex::new();
        // Seed a profile already owned by another person
        db.insert_person(&DbPerson {
            person_id: "owner".into(),
            full_name: Some("Owner".into()),
            ..Default::default()
        })
        .unwrap();
        db.upsert_github_profile(&crate::db::DbGithubProfile {
            github_profile_id: "g1".into(),
            github_username: "0age".into(),
            person_id: Some("owner".into()),
            ..Default::default()
        })
        .unwrap();
        index.warm_load(&db).unwrap();

        let csv = write_csv(
            dir.path(),
            "data.csv",
            &[r#"Somebody Else,,,https://linkedin.com/in/somebody,https://github.com/0age,,,,,,"#],
        );
        let stats = import(&db, &index, &csv);
        assert_eq!(stats.profiles_created, 1);
        assert_eq!(stats.github_conflicts, 1);
    }

    #[test]
    fn test_invalid_company_does_not_poison_row() {
        let (dir, db) = open_test_db();
        let index = IdentifierIndex::new();
        index.warm_load(&db).unwrap();

        let csv = write_csv(
            dir.path(),
            "data.csv",
            &[r#"Ada Lovelace,,,https://linkedin.com/in/ada,,Labs,,,,,"#],
        );
        let stats = import(&db, &index, &csv);
        assert_eq!(stats.profiles_created, 1);
        assert_eq!(stats.invalid_companies, 1);
        assert_eq!(stats.employment_records_added, 0);
        assert!(stats.errors.is_empty());
    }

    #[test]
    fn test_placeholder_name_title_case() {
        assert_eq!(
            placeholder_name(Some("linkedin.com/in/ada-lovelace"), None),
            "[LinkedIn] Ada Lovelace"
        );
        assert_eq!(
            placeholder_name(None, Some("https://github.com/0age")),
            "[GitHub] 0age"
        );
        assert_eq!(placeholder_name(None, None), "[Unknown Profile]");
    }

    #[test]
    fn test_migration_log_written() {
        let (dir, db) = open_test_db();
        let index = IdentifierIndex::new();
        index.warm_load(&db).unwrap();

        let csv = write_csv(
            dir.path(),
            "data.csv",
            &[r#"Ada Lovelace,,,https://linkedin.com/in/ada,,,,,,,"#],
        );
        import(&db, &index, &csv);

        let (name, created): (String, i64) = db
            .conn_ref()
            .query_row(
                "SELECT migration_name, records_created FROM migration_log",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(name, "csv_import");
        assert_eq!(created, 1);
    }
}
