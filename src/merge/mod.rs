//! Merge engine: company deduplication and post-promotion person merging.
//!
//! Both passes are destructive and therefore default to dry-run; the CLI
//! requires an explicit confirmation token before a live run. Each duplicate
//! group commits in its own transaction, and after a successful commit no
//! foreign key anywhere references a deleted id.

pub mod companies;
pub mod people;

pub use companies::{CompanyDeduplicator, CompanyMergeStats};
pub use people::{PersonMerger, PersonMergeStats};
