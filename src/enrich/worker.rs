//! Enrichment queue worker.
//!
//! Drains the durable queue in leased batches: scrape each person's LinkedIn
//! profile through the provider, apply the result (fill-empty scalar fields,
//! employment and education upserts via the company resolver), then mark the
//! item completed or failed. The DB lock is released during provider calls,
//! and calls are paced 2 s apart.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use super::dates::parse_date_range;
use super::{ProfileScraper, ScrapedProfile};
use crate::config::ENRICH_RATE_LIMIT_SECS;
use crate::db::{DbError, PersonPatch, QueueLease, TalentDb};
use crate::index::IdentifierIndex;
use crate::resolver::EntityResolver;

/// Items leased per drain pass.
const BATCH_SIZE: i64 = 15;

/// Idle sleep when the queue is empty.
const IDLE_SLEEP_SECS: u64 = 30;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichStats {
    pub profiles_attempted: u64,
    pub profiles_enriched: u64,
    pub profiles_failed: u64,
    pub employment_records_added: u64,
    pub education_records_added: u64,
    pub companies_created: u64,
}

pub struct EnrichWorker {
    db: Arc<Mutex<TalentDb>>,
    index: Arc<IdentifierIndex>,
    scraper: Arc<dyn ProfileScraper>,
    stats: EnrichStats,
}

impl EnrichWorker {
    pub fn new(
        db: Arc<Mutex<TalentDb>>,
        index: Arc<IdentifierIndex>,
        scraper: Arc<dyn ProfileScraper>,
    ) -> Self {
        Self {
            db,
            index,
            scraper,
            stats: EnrichStats::default(),
        }
    }

    pub fn stats(&self) -> &EnrichStats {
        &self.stats
    }

    /// Drain the queue until shutdown. The in-flight item always reaches a
    /// terminal or pending state before the worker exits.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!("EnrichWorker: started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let drained = match self.drain_batch(&shutdown).await {
                Ok(count) => count,
                Err(e) => {
                    log::error!("EnrichWorker: batch failed: {}", e);
                    0
                }
            };

            if drained == 0 {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(Duration::from_secs(IDLE_SLEEP_SECS)) => {}
                }
            }
        }
        log::info!(
            "EnrichWorker: stopped ({} attempted, {} enriched, {} failed)",
            self.stats.profiles_attempted,
            self.stats.profiles_enriched,
            self.stats.profiles_failed,
        );
    }

    /// Lease and process one batch. Returns the number of items leased.
    pub async fn drain_batch(
        &mut self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<usize, DbError> {
        let batch = {
            let db = self.db.lock().expect("db lock");
            db.lease_enrichment_batch(BATCH_SIZE)?
        };
        if batch.is_empty() {
            return Ok(0);
        }

        log::info!("EnrichWorker: processing batch of {}", batch.len());
        let total = batch.len();

        for (i, lease) in batch.into_iter().enumerate() {
            self.process_lease(&lease).await;

            // Pace provider calls; stop between items on shutdown
            if i + 1 < total {
                if *shutdown.borrow() {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(ENRICH_RATE_LIMIT_SECS)).await;
            }
        }
        Ok(total)
    }

    async fn process_lease(&mut self, lease: &QueueLease) {
        self.stats.profiles_attempted += 1;

        let Some(linkedin_url) = lease.linkedin_url.as_deref() else {
            let db = self.db.lock().expect("db lock");
            let _ = db.mark_enrichment_failed(&lease.queue_id, "person has no LinkedIn URL");
            self.stats.profiles_failed += 1;
            return;
        };

        log::info!(
            "EnrichWorker: {} ({})",
            lease.full_name.as_deref().unwrap_or("<unnamed>"),
            linkedin_url,
        );

        // Provider call with no DB lock held
        let scraped = match self.scraper.scrape(linkedin_url).await {
            Ok(profile) => profile,
            Err(e) => {
                let db = self.db.lock().expect("db lock");
                let _ = db.mark_enrichment_failed(&lease.queue_id, &e.to_string());
                self.stats.profiles_failed += 1;
                log::warn!("EnrichWorker: scrape failed for {}: {}", linkedin_url, e);
                return;
            }
        };

        let result = {
            let db = Arc::clone(&self.db);
            let guard = db.lock().expect("db lock");
            self.apply_profile(&guard, &lease.person_id, &scraped)
        };

        let db = self.db.lock().expect("db lock");
        match result {
            Ok(()) => {
                let _ = db.mark_enrichment_completed(&lease.queue_id);
                self.stats.profiles_enriched += 1;
            }
            Err(e) => {
                let _ = db.mark_enrichment_failed(&lease.queue_id, &e.to_string());
                self.stats.profiles_failed += 1;
                log::warn!("EnrichWorker: apply failed for {}: {}", lease.person_id, e);
            }
        }
    }

    /// Write a scraped profile back through the standard enrichment paths.
    fn apply_profile(
        &mut self,
        db: &TalentDb,
        person_id: &str,
        profile: &ScrapedProfile,
    ) -> Result<(), DbError> {
        let index = Arc::clone(&self.index);
        db.with_transaction(|db| {
            let patch = PersonPatch {
                full_name: crate::util::join_name(
                    profile.first_name.as_deref(),
                    profile.last_name.as_deref(),
                ),
                first_name: profile.first_name.clone(),
                last_name: profile.last_name.clone(),
                headline: profile.headline.clone(),
                location: profile.location.clone(),
                description: None,
            };
            db.enrich_person_fields(person_id, &patch)?;

            let resolver = EntityResolver::new(db, index.as_ref());

            for experience in &profile.experience {
                let Some(company_name) = experience.company_name.as_deref() else {
                    continue;
                };
                let known = index.company_by_name(company_name).is_some();
                let Some(company_id) = resolver.find_or_create_company(company_name)? else {
                    continue;
                };
                if !known {
                    self.stats.companies_created += 1;
                }

                let (start, end) = experience
                    .date_range
                    .as_deref()
                    .map(parse_date_range)
                    .unwrap_or((None, None));
                if db.add_employment(
                    person_id,
                    &company_id,
                    experience.title.as_deref(),
                    start.map(|d| d.to_string()).as_deref(),
                    end.map(|d| d.to_string()).as_deref(),
                    experience.location.as_deref(),
                    "linkedin_scraper",
                    0.9,
                )? {
                    self.stats.employment_records_added += 1;
                }
            }

            for education in &profile.education {
                let Some(school) = education.school_name.as_deref() else {
                    continue;
                };
                let (start, end) = education
                    .date_range
                    .as_deref()
                    .map(parse_date_range)
                    .unwrap_or((None, None));
                if db.add_education(
                    person_id,
                    school,
                    education.degree.as_deref(),
                    start.map(|d| d.to_string()).as_deref(),
                    end.map(|d| d.to_string()).as_deref(),
                )? {
                    self.stats.education_records_added += 1;
                }
            }

            db.mark_person_enriched(person_id)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_test_db;
    use crate::db::DbPerson;
    use crate::enrich::{EnrichError, ScrapedEducation, ScrapedExperience};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Stub provider: canned profiles by URL, errors for unknown URLs.
    #[derive(Default)]
    struct StubScraper {
        profiles: Mutex<HashMap<String, ScrapedProfile>>,
    }

    #[async_trait]
    impl ProfileScraper for StubScraper {
        async fn scrape(&self, linkedin_url: &str) -> Result<ScrapedProfile, EnrichError> {
            self.profiles
                .lock()
                .unwrap()
                .get(linkedin_url)
                .cloned()
                .ok_or_else(|| EnrichError::Provider("profile unavailable".into()))
        }
    }

    fn seed_person(db: &TalentDb, id: &str, linkedin: &str) {
        db.insert_person(&DbPerson {
            person_id: id.into(),
            full_name: Some("Ada Lovelace".into()),
            linkedin_url: Some(linkedin.into()),
            normalized_linkedin_url: crate::normalize::normalize_linkedin_url(linkedin),
            needs_enrichment: true,
            ..Default::default()
        })
        .unwrap();
    }

    fn worker_with(
        db: TalentDb,
        stub: Arc<StubScraper>,
    ) -> (Arc<Mutex<TalentDb>>, EnrichWorker) {
        let db = Arc::new(Mutex::new(db));
        let index = Arc::new(IdentifierIndex::new());
        index.warm_load(&db.lock().unwrap()).unwrap();
        let worker = EnrichWorker::new(db.clone(), index, stub);
        (db, worker)
    }

    fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_applies_profile_and_completes() {
        let (_dir, db) = open_test_db();
        seed_person(&db, "p1", "https://linkedin.com/in/ada");
        db.enqueue_enrichment("p1", 5).unwrap();

        let stub = Arc::new(StubScraper::default());
        stub.profiles.lock().unwrap().insert(
            "https://linkedin.com/in/ada".into(),
            ScrapedProfile {
                first_name: Some("Ada".into()),
                last_name: Some("Lovelace".into()),
                headline: Some("Engineer".into()),
                location: Some("London".into()),
                experience: vec![ScrapedExperience {
                    company_name: Some("Analytical Engines".into()),
                    title: Some("Chief Engineer".into()),
                    date_range: Some("May 2021 - Present".into()),
                    location: None,
                }],
                education: vec![ScrapedEducation {
                    school_name: Some("Cambridge".into()),
                    degree: None,
                    date_range: Some("1835 - 1837".into()),
                }],
            },
        );

        let (db, mut worker) = worker_with(db, stub);
        let (_tx, rx) = shutdown_channel();
        let drained = worker.drain_batch(&rx).await.unwrap();
        assert_eq!(drained, 1);
        assert_eq!(worker.stats().profiles_enriched, 1);
        assert_eq!(worker.stats().employment_records_added, 1);
        assert_eq!(worker.stats().education_records_added, 1);

        let db = db.lock().unwrap();
        assert_eq!(db.queue_counts().unwrap().completed, 1);

        let person = db.get_person("p1").unwrap().unwrap();
        assert_eq!(person.headline.as_deref(), Some("Engineer"));
        assert!(!person.needs_enrichment);

        // Employment landed with a parsed open-ended range
        let (start, end): (Option<String>, Option<String>) = db
            .conn_ref()
            .query_row(
                "SELECT start_date, end_date FROM employment WHERE person_id = 'p1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(start.as_deref(), Some("2021-05-01"));
        assert_eq!(end, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scrape_failure_marks_failed() {
        let (_dir, db) = open_test_db();
        seed_person(&db, "p1", "https://linkedin.com/in/unknown");
        db.enqueue_enrichment("p1", 0).unwrap();

        let (db, mut worker) = worker_with(db, Arc::new(StubScraper::default()));
        let (_tx, rx) = shutdown_channel();
        worker.drain_batch(&rx).await.unwrap();

        assert_eq!(worker.stats().profiles_failed, 1);
        let db = db.lock().unwrap();
        let counts = db.queue_counts().unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending, 0);

        let message: String = db
            .conn_ref()
            .query_row(
                "SELECT error_message FROM enrichment_queue",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(message.contains("profile unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescrape_preserves_existing_fields() {
        let (_dir, db) = open_test_db();
        seed_person(&db, "p1", "https://linkedin.com/in/ada");
        // Headline already populated from CSV
        db.enrich_person_fields(
            "p1",
            &PersonPatch {
                headline: Some("Original Headline".into()),
                ..Default::default()
            },
        )
        .unwrap();
        db.enqueue_enrichment("p1", 0).unwrap();

        let stub = Arc::new(StubScraper::default());
        stub.profiles.lock().unwrap().insert(
            "https://linkedin.com/in/ada".into(),
            ScrapedProfile {
                headline: Some("Scraped Headline".into()),
                ..Default::default()
            },
        );

        let (db, mut worker) = worker_with(db, stub);
        let (_tx, rx) = shutdown_channel();
        worker.drain_batch(&rx).await.unwrap();

        let db = db.lock().unwrap();
        let person = db.get_person("p1").unwrap().unwrap();
        assert_eq!(person.headline.as_deref(), Some("Original Headline"));
    }
}
