//! Ecosystem taxonomy import.
//!
//! One-shot job over a JSONL export (one `{eco_name, repo_url, tags,
//! branch}` object per line): dedupe by ecosystem name, create ecosystem
//! rows with an inferred type, batch-insert repositories in 1000-row chunks
//! with conflict-ignore, link (ecosystem, repo) pairs, and finally link
//! ecosystems to companies by normalized-name equality.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::db::{DbError, TalentDb};
use crate::error::PipelineError;
use crate::normalize::{extract_owner_repo, normalize_company_name};

/// Repositories inserted per transaction chunk.
const REPO_CHUNK_SIZE: usize = 1000;

/// Canonical names given scan priority (tier 1). Matching is
/// substring-insensitive in both directions so "Uniswap Labs Portfolio"
/// still ranks.
const PRIORITY_ECOSYSTEMS: &[&str] = &[
    // Major protocols
    "ethereum", "uniswap", "avalanche", "solana", "polygon", "arbitrum",
    "optimism", "base", "polkadot", "cosmos", "near", "sui", "aptos",
    // VC portfolios
    "paradigm", "a16z", "coinbase", "haun", "variant", "dragonfly",
    "polychain", "pantera", "multicoin", "electric capital",
    // Exchanges / infrastructure
    "binance", "kraken", "gemini", "circle", "chainlink", "the graph",
    // DeFi
    "aave", "compound", "makerdao", "curve", "balancer", "yearn",
    "synthetix", "lido", "rocket pool",
    // NFT / naming
    "opensea", "blur", "rarible", "ens", "lens protocol",
];

#[derive(Debug, Deserialize)]
struct TaxonomyLine {
    eco_name: String,
    repo_url: String,
    #[serde(default)]
    #[allow(dead_code)]
    tags: Vec<String>,
    #[serde(default)]
    #[allow(dead_code)]
    branch: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyStats {
    pub lines_read: u64,
    pub lines_unparseable: u64,
    pub unique_ecosystems: u64,
    pub ecosystems_filtered_out: u64,
    pub ecosystems_created: u64,
    pub repos_inserted: u64,
    pub repos_linked: u64,
    pub companies_linked: u64,
}

/// Whether an ecosystem name matches the embedded priority list.
pub fn is_priority_ecosystem(eco_name: &str) -> bool {
    let normalized = normalize_company_name(eco_name);
    if normalized.is_empty() {
        return false;
    }
    PRIORITY_ECOSYSTEMS
        .iter()
        .any(|priority| normalized.contains(priority) || priority.contains(normalized.as_str()))
}

/// Infer a coarse ecosystem type from its name.
pub fn infer_ecosystem_type(eco_name: &str) -> &'static str {
    let name = eco_name.to_lowercase();
    if ["ventures", "capital", "labs", "fund"].iter().any(|kw| name.contains(kw)) {
        "vc_portfolio"
    } else if ["protocol", "network", "chain"].iter().any(|kw| name.contains(kw)) {
        "protocol"
    } else if ["exchange", "dex", "swap"].iter().any(|kw| name.contains(kw)) {
        "exchange"
    } else if ["nft", "token", "dao"].iter().any(|kw| name.contains(kw)) {
        "dao_nft"
    } else {
        "other"
    }
}

pub struct TaxonomyImporter<'a> {
    db: &'a TalentDb,
    priority_only: bool,
}

impl<'a> TaxonomyImporter<'a> {
    pub fn new(db: &'a TalentDb, priority_only: bool) -> Self {
        Self { db, priority_only }
    }

    pub fn import_file(&self, path: &Path) -> Result<TaxonomyStats, PipelineError> {
        log::info!(
            "Taxonomy: importing {} (priority_only={})",
            path.display(),
            self.priority_only
        );
        let file = std::fs::File::open(path)
            .map_err(|e| PipelineError::Fatal(format!("cannot open {}: {}", path.display(), e)))?;
        let reader = std::io::BufReader::new(file);

        let mut stats = TaxonomyStats::default();

        // Group repo URLs by ecosystem name
        let mut by_ecosystem: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for line in reader.lines() {
            let line = line.map_err(|e| PipelineError::TransientIo(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            stats.lines_read += 1;

            let parsed: TaxonomyLine = match serde_json::from_str(&line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    stats.lines_unparseable += 1;
                    log::debug!("Taxonomy: unparseable line: {}", e);
                    continue;
                }
            };

            let Some((owner, repo)) = extract_owner_repo(&parsed.repo_url) else {
                stats.lines_unparseable += 1;
                continue;
            };
            by_ecosystem
                .entry(parsed.eco_name.trim().to_string())
                .or_default()
                .push((owner, repo));
        }
        stats.unique_ecosystems = by_ecosystem.len() as u64;

        // Stable processing order for reproducible logs
        let mut ecosystems: Vec<(String, Vec<(String, String)>)> =
            by_ecosystem.into_iter().collect();
        ecosystems.sort_by(|a, b| a.0.cmp(&b.0));

        for (eco_name, repos) in ecosystems {
            if self.priority_only && !is_priority_ecosystem(&eco_name) {
                stats.ecosystems_filtered_out += 1;
                continue;
            }
            self.import_ecosystem(&eco_name, &repos, &mut stats)?;
        }

        log::info!(
            "Taxonomy: {} ecosystems created, {} repos inserted, {} linked, {} companies linked",
            stats.ecosystems_created,
            stats.repos_inserted,
            stats.repos_linked,
            stats.companies_linked,
        );
        Ok(stats)
    }

    fn import_ecosystem(
        &self,
        eco_name: &str,
        repos: &[(String, String)],
        stats: &mut TaxonomyStats,
    ) -> Result<(), DbError> {
        let normalized = normalize_company_name(eco_name);
        let tier = if is_priority_ecosystem(eco_name) { 1 } else { 5 };

        let existed_before: bool = self
            .db
            .conn_ref()
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM crypto_ecosystem WHERE ecosystem_name = ?1)",
                [eco_name],
                |row| row.get(0),
            )
            .unwrap_or(false);

        let ecosystem_id = self.db.get_or_create_ecosystem(
            eco_name,
            &normalized,
            infer_ecosystem_type(eco_name),
            tier,
        )?;
        if !existed_before {
            stats.ecosystems_created += 1;
        }

        // Repos in committed chunks; conflict-ignore keeps reruns idempotent
        for chunk in repos.chunks(REPO_CHUNK_SIZE) {
            self.db.with_transaction(|db| {
                for (owner, repo) in chunk {
                    let full_name = format!("{owner}/{repo}");
                    if db.insert_repo_ignore(
                        &full_name,
                        Some(owner),
                        Some(repo),
                        None,
                        0,
                        0,
                        None,
                    )? {
                        stats.repos_inserted += 1;
                    }
                }
                Ok(())
            })?;
        }

        // Resolve ids and link
        let full_names: Vec<String> = repos
            .iter()
            .map(|(owner, repo)| format!("{owner}/{repo}"))
            .collect();
        let repo_ids = self.db.repo_ids_by_full_names(&full_names)?;
        self.db.with_transaction(|db| {
            for full_name in &full_names {
                if let Some(repo_id) = repo_ids.get(&full_name.to_lowercase()) {
                    if db.link_ecosystem_repo(&ecosystem_id, repo_id, Some("taxonomy"))? {
                        stats.repos_linked += 1;
                    }
                }
            }
            Ok(())
        })?;

        // Company linkage by normalized-name equality
        if !normalized.is_empty() {
            for company_id in self.db.companies_by_normalized_name(&normalized)? {
                if self.db.link_company_ecosystem(&company_id, &ecosystem_id, 0.9)? {
                    stats.companies_linked += 1;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_test_db;
    use std::io::Write;

    fn write_jsonl(dir: &Path, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join("ecosystems.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    #[test]
    fn test_priority_matching_is_substring_insensitive() {
        assert!(is_priority_ecosystem("Ethereum"));
        assert!(is_priority_ecosystem("Uniswap Labs"));
        assert!(is_priority_ecosystem("aave"));
        assert!(!is_priority_ecosystem("Some Obscure Chainless Thing"));
    }

    #[test]
    fn test_ecosystem_type_inference() {
        assert_eq!(infer_ecosystem_type("Paradigm Capital"), "vc_portfolio");
        assert_eq!(infer_ecosystem_type("Lens Protocol"), "protocol");
        assert_eq!(infer_ecosystem_type("SushiSwap"), "exchange");
        assert_eq!(infer_ecosystem_type("OpenSea NFT"), "dao_nft");
        assert_eq!(infer_ecosystem_type("Ethereum"), "other");
    }

    #[test]
    fn test_import_dedups_and_links() {
        let (dir, db) = open_test_db();
        let path = write_jsonl(
            dir.path(),
            &[
                r#"{"eco_name": "Uniswap", "repo_url": "https://github.com/Uniswap/v3-core", "tags": ["defi"], "branch": ["main"]}"#,
                r#"{"eco_name": "Uniswap", "repo_url": "https://github.com/Uniswap/v2-core", "tags": [], "branch": []}"#,
                r#"{"eco_name": "Uniswap", "repo_url": "not a url", "tags": [], "branch": []}"#,
            ],
        );

        let stats = TaxonomyImporter::new(&db, false).import_file(&path).unwrap();
        assert_eq!(stats.lines_read, 3);
        assert_eq!(stats.lines_unparseable, 1);
        assert_eq!(stats.unique_ecosystems, 1);
        assert_eq!(stats.ecosystems_created, 1);
        assert_eq!(stats.repos_inserted, 2);
        assert_eq!(stats.repos_linked, 2);

        // Priority ecosystem got tier 1, which drives the discovery ordering
        let ecosystems = db.all_ecosystems().unwrap();
        assert_eq!(ecosystems.len(), 1);
        assert_eq!(ecosystems[0].priority_tier, 1);

        let candidates = db.repos_needing_contributor_sync(7, 10).unwrap();
        assert!(candidates.iter().all(|c| c.priority_tier == 1));
    }

    #[test]
    fn test_import_is_idempotent() {
        let (dir, db) = open_test_db();
        let path = write_jsonl(
            dir.path(),
            &[r#"{"eco_name": "Aave", "repo_url": "https://github.com/aave/aave-v3-core", "tags": [], "branch": []}"#],
        );

        TaxonomyImporter::new(&db, false).import_file(&path).unwrap();
        let rerun = TaxonomyImporter::new(&db, false).import_file(&path).unwrap();
        assert_eq!(rerun.ecosystems_created, 0);
        assert_eq!(rerun.repos_inserted, 0);
        assert_eq!(rerun.repos_linked, 0);
    }

    #[test]
    fn test_priority_only_filter() {
        let (dir, db) = open_test_db();
        let path = write_jsonl(
            dir.path(),
            &[
                r#"{"eco_name": "Ethereum", "repo_url": "https://github.com/ethereum/go-ethereum", "tags": [], "branch": []}"#,
                r#"{"eco_name": "Tiny Fork Zone", "repo_url": "https://github.com/tiny/fork", "tags": [], "branch": []}"#,
            ],
        );

        let stats = TaxonomyImporter::new(&db, true).import_file(&path).unwrap();
        assert_eq!(stats.ecosystems_created, 1);
        assert_eq!(stats.ecosystems_filtered_out, 1);
        assert!(db.get_repo_by_full_name("tiny/fork").unwrap().is_none());
    }

    #[test]
    fn test_company_linkage_by_normalized_name() {
        let (dir, db) = open_test_db();
        db.create_company("Uniswap Labs", Some("uniswap.org")).unwrap();
        let path = write_jsonl(
            dir.path(),
            &[r#"{"eco_name": "Uniswap", "repo_url": "https://github.com/Uniswap/v3-core", "tags": [], "branch": []}"#],
        );

        let stats = TaxonomyImporter::new(&db, false).import_file(&path).unwrap();
        assert_eq!(stats.companies_linked, 1);
    }
}
