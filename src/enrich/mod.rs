//! LinkedIn enrichment: provider abstraction, queue worker, and date-range
//! parsing.
//!
//! The worker leases batches from the durable enrichment queue, calls the
//! scraping provider for each person's LinkedIn URL, and feeds the returned
//! experience and education entries through the same company-resolution and
//! upsert paths the CSV importer uses.

pub mod dates;
pub mod provider;
pub mod worker;

use thiserror::Error;

pub use provider::{PhantomBusterScraper, ProfileScraper, ScrapedEducation, ScrapedExperience, ScrapedProfile};
pub use worker::{EnrichStats, EnrichWorker};

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("PHANTOMBUSTER_API_KEY not set")]
    MissingApiKey,

    #[error("enrichment provider rate limited")]
    RateLimited,

    #[error("enrichment provider error: {0}")]
    Provider(String),

    #[error("enrichment network error: {0}")]
    Network(String),

    #[error("enrichment response parse error: {0}")]
    Parse(String),
}
