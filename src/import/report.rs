//! Per-run import statistics and the final report.

use serde::Serialize;

/// Outcome of processing one row. Batch runners fold over the stream
/// accumulating per-reason counters; nothing unwinds the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Created,
    Enriched,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Every cell blank.
    EmptyRow,
    /// Neither a LinkedIn URL nor a GitHub URL present.
    NoIdentifier,
    /// Create raced an existing row on the same canonical LinkedIn URL.
    DuplicateLinkedin,
}

/// Structured summary of an import run. Serialized into the migration log's
/// metadata column and printed at the end of the run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    pub total_rows: u64,
    pub profiles_created: u64,
    pub profiles_enriched: u64,
    pub skipped_empty: u64,
    pub skipped_invalid: u64,
    pub skipped_duplicate_linkedin: u64,
    pub github_only_profiles: u64,
    pub linkedin_only_profiles: u64,
    pub profiles_needing_enrichment: u64,
    pub emails_added: u64,
    pub employment_records_added: u64,
    pub education_records_added: u64,
    pub twitter_handles_added: u64,
    pub github_linked_existing: u64,
    pub github_created: u64,
    pub github_conflicts: u64,
    pub companies_created: u64,
    pub invalid_companies: u64,
    pub errors: Vec<String>,
}

impl ImportStats {
    pub fn record_outcome(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Created => self.profiles_created += 1,
            RowOutcome::Enriched => self.profiles_enriched += 1,
            RowOutcome::Skipped(SkipReason::EmptyRow) => self.skipped_empty += 1,
            RowOutcome::Skipped(SkipReason::NoIdentifier) => self.skipped_invalid += 1,
            RowOutcome::Skipped(SkipReason::DuplicateLinkedin) => {
                self.skipped_duplicate_linkedin += 1
            }
        }
    }

    pub fn valid_rows(&self) -> u64 {
        self.total_rows
            .saturating_sub(self.skipped_empty)
            .saturating_sub(self.skipped_invalid)
            .saturating_sub(self.skipped_duplicate_linkedin)
    }

    /// Log the human-readable run summary.
    pub fn log_report(&self, source: &str) {
        log::info!("Import report for {}", source);
        log::info!("  rows processed:       {}", self.total_rows);
        log::info!("  created:              {}", self.profiles_created);
        log::info!("  enriched:             {}", self.profiles_enriched);
        log::info!(
            "  skipped:              {} empty, {} no identifier, {} duplicate linkedin",
            self.skipped_empty,
            self.skipped_invalid,
            self.skipped_duplicate_linkedin,
        );
        log::info!(
            "  new profile types:    {} github-only, {} linkedin-only, {} flagged for enrichment",
            self.github_only_profiles,
            self.linkedin_only_profiles,
            self.profiles_needing_enrichment,
        );
        log::info!(
            "  side entities:        {} emails, {} employment, {} education, {} twitter",
            self.emails_added,
            self.employment_records_added,
            self.education_records_added,
            self.twitter_handles_added,
        );
        log::info!(
            "  github profiles:      {} linked, {} created, {} conflicts",
            self.github_linked_existing,
            self.github_created,
            self.github_conflicts,
        );
        log::info!(
            "  companies:            {} created, {} invalid names",
            self.companies_created,
            self.invalid_companies,
        );

        let valid = self.valid_rows();
        if valid > 0 {
            log::info!(
                "  enrichment rate:      {:.1}%  |  creation rate: {:.1}%",
                self.profiles_enriched as f64 / valid as f64 * 100.0,
                self.profiles_created as f64 / valid as f64 * 100.0,
            );
        }

        if !self.errors.is_empty() {
            log::warn!("  errors: {} (showing first 20)", self.errors.len());
            for error in self.errors.iter().take(20) {
                log::warn!("    - {}", error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcome_counters() {
        let mut stats = ImportStats::default();
        stats.total_rows = 5;
        stats.record_outcome(&RowOutcome::Created);
        stats.record_outcome(&RowOutcome::Enriched);
        stats.record_outcome(&RowOutcome::Skipped(SkipReason::NoIdentifier));
        stats.record_outcome(&RowOutcome::Skipped(SkipReason::EmptyRow));
        stats.record_outcome(&RowOutcome::Skipped(SkipReason::DuplicateLinkedin));

        assert_eq!(stats.profiles_created, 1);
        assert_eq!(stats.profiles_enriched, 1);
        assert_eq!(stats.skipped_invalid, 1);
        assert_eq!(stats.valid_rows(), 2);
    }
}
