//! TalentGraph CLI: import, discovery, promotion, merging, enrichment,
//! scoring, and network queries.
//!
//! Destructive jobs (the merges) default to dry-run and require
//! `--live --confirm MERGE` to apply. Exit code 0 on success, 1 on any
//! fatal error or interruption.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;

use talentgraph::config::Config;
use talentgraph::enrich::{EnrichWorker, PhantomBusterScraper, ProfileScraper};
use talentgraph::error::PipelineError;
use talentgraph::github::{GithubApi, RestGithubClient, TaxonomyImporter};
use talentgraph::import::CsvImporter;
use talentgraph::merge::{CompanyDeduplicator, PersonMerger};
use talentgraph::network::{connector_graph, neighborhood_graph, shortest_path};
use talentgraph::promote::Promoter;
use talentgraph::scheduler::Scheduler;
use talentgraph::state::AppState;

/// Confirmation token required by live merge runs.
const MERGE_CONFIRM_TOKEN: &str = "MERGE";

#[derive(Parser)]
#[command(name = "talentgraph", version, about = "Talent intelligence pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a CSV of people (LinkedIn/GitHub identifiers required per row)
    Import {
        file: PathBuf,
        /// Source attribution tag recorded on created rows
        #[arg(long, default_value = "csv_import")]
        source: String,
    },

    /// Import an ecosystem taxonomy JSONL export
    Ecosystems {
        file: PathBuf,
        /// Only import ecosystems on the embedded priority list
        #[arg(long)]
        priority_only: bool,
    },

    /// Run the GitHub discovery engine (requires GITHUB_TOKEN)
    Discover {
        /// Run a single cycle instead of looping forever
        #[arg(long)]
        once: bool,
    },

    /// Promote orphan GitHub profiles to people
    Promote {
        /// Apply changes (default is dry-run)
        #[arg(long)]
        live: bool,
    },

    /// Deduplicate and merge companies
    MergeCompanies {
        #[arg(long)]
        live: bool,
        /// Confirmation token, must be MERGE for live runs
        #[arg(long)]
        confirm: Option<String>,
    },

    /// Merge duplicate people created by promotion
    MergePeople {
        #[arg(long)]
        live: bool,
        #[arg(long)]
        confirm: Option<String>,
    },

    /// Drain the enrichment queue once (requires PHANTOMBUSTER_API_KEY)
    Enrich,

    /// Recompute importance scores
    Score {
        #[arg(long)]
        repos: bool,
        #[arg(long)]
        developers: bool,
        #[arg(long)]
        all: bool,
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Shortest path between two people
    Path {
        source_person: String,
        target_person: String,
        #[arg(long, default_value_t = talentgraph::network::paths::DEFAULT_MAX_DEPTH)]
        max_depth: usize,
    },

    /// Neighborhood graph around a person
    Neighborhood {
        person: String,
        #[arg(long, default_value_t = 1)]
        max_degree: usize,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Connector detection across 2-4 people
    Connectors {
        #[arg(num_args = 2..=4)]
        people: Vec<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Connection counts and top companies for one person
    NetworkStats { person: String },

    /// Rebuild the derived co-employment edge table
    RebuildEdges,

    /// Run all background workers until interrupted
    Run,

    /// Entity counts and queue depth
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match dispatch(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Command, config: Config) -> Result<(), PipelineError> {
    let state = AppState::init(config)?;

    match command {
        Command::Import { file, source } => {
            let db = state.db.lock().expect("db lock");
            let mut importer = CsvImporter::new(&db, &state.index, &source);
            importer.import_file(&file)?;
            Ok(())
        }

        Command::Ecosystems { file, priority_only } => {
            let db = state.db.lock().expect("db lock");
            TaxonomyImporter::new(&db, priority_only).import_file(&file)?;
            Ok(())
        }

        Command::Discover { once } => {
            let token = state.config.require_github_token()?.to_string();
            let api: Arc<dyn GithubApi> = Arc::new(RestGithubClient::new(&token)?);
            let mut engine =
                talentgraph::github::DiscoveryEngine::new(state.db.clone(), api);

            let (tx, rx) = watch::channel(false);
            if once {
                engine.run_cycle(&rx).await?;
            } else {
                let run = engine.run(rx.clone());
                tokio::pin!(run);
                tokio::select! {
                    _ = &mut run => {}
                    _ = tokio::signal::ctrl_c() => {
                        log::info!("Interrupt received, finishing current work");
                        let _ = tx.send(true);
                        run.await;
                    }
                }
            }
            Ok(())
        }

        Command::Promote { live } => {
            let db = state.db.lock().expect("db lock");
            Promoter::new(&db, !live).run()?;
            Ok(())
        }

        Command::MergeCompanies { live, confirm } => {
            let dry_run = require_merge_confirmation(live, confirm.as_deref())?;
            let db = state.db.lock().expect("db lock");
            CompanyDeduplicator::new(&db, dry_run).run()?;
            Ok(())
        }

        Command::MergePeople { live, confirm } => {
            let dry_run = require_merge_confirmation(live, confirm.as_deref())?;
            let db = state.db.lock().expect("db lock");
            PersonMerger::new(&db, dry_run).run()?;
            Ok(())
        }

        Command::Enrich => {
            let scraper = build_scraper(&state.config)?;
            let mut worker =
                EnrichWorker::new(state.db.clone(), state.index.clone(), scraper);
            let (_tx, rx) = watch::channel(false);
            let drained = worker.drain_batch(&rx).await?;
            if drained == 0 {
                log::info!("Enrichment queue is empty");
            }
            Ok(())
        }

        Command::Score { repos, developers, all, limit } => {
            let db = state.db.lock().expect("db lock");
            let run_repos = repos || all || (!repos && !developers);
            let run_developers = developers || all || (!repos && !developers);
            if run_repos {
                talentgraph::scoring::score_repositories(&db, limit)?;
            }
            if run_developers {
                talentgraph::scoring::score_developers(&db, limit)?;
            }
            let tagged = db.propagate_ecosystem_tags()?;
            log::info!("Propagated ecosystem tags to {} profiles", tagged);
            Ok(())
        }

        Command::Path { source_person, target_person, max_depth } => {
            let db = state.db.lock().expect("db lock");
            match shortest_path(&db, &source_person, &target_person, max_depth)? {
                Some(path) => print_json(&path),
                None => println!("null"),
            }
            Ok(())
        }

        Command::Neighborhood { person, max_degree, limit } => {
            let db = state.db.lock().expect("db lock");
            let graph = neighborhood_graph(&db, &person, max_degree, limit)?;
            print_json(&graph);
            Ok(())
        }

        Command::Connectors { people, limit } => {
            if !(2..=4).contains(&people.len()) {
                return Err(PipelineError::Validation(
                    "connector detection takes 2 to 4 people".to_string(),
                ));
            }
            let db = state.db.lock().expect("db lock");
            let graph = connector_graph(&db, &people, limit)?;
            print_json(&graph);
            Ok(())
        }

        Command::NetworkStats { person } => {
            let db = state.db.lock().expect("db lock");
            if db.get_person(&person)?.is_none() {
                return Err(PipelineError::NotFound(format!("person {person}")));
            }
            let stats = db.person_network_stats(&person)?;
            print_json(&stats);
            Ok(())
        }

        Command::RebuildEdges => {
            let db = state.db.lock().expect("db lock");
            let edges = db.rebuild_coemployment_edges()?;
            log::info!("Rebuilt {} co-employment edges", edges);
            Ok(())
        }

        Command::Run => {
            let github: Option<Arc<dyn GithubApi>> = match state.config.github_token.as_deref() {
                Some(token) => Some(Arc::new(RestGithubClient::new(token)?)),
                None => None,
            };
            let scraper = build_scraper(&state.config).ok();

            let (tx, rx) = watch::channel(false);
            let scheduler = Scheduler::new(state.clone());
            let run = scheduler.run(github, scraper, rx.clone());
            tokio::pin!(run);
            tokio::select! {
                _ = &mut run => {}
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Interrupt received, shutting down");
                    let _ = tx.send(true);
                    run.await;
                }
            }
            Ok(())
        }

        Command::Status => {
            let db = state.db.lock().expect("db lock");
            for (table, count) in db.entity_counts()? {
                println!("{table:24} {count}");
            }
            let queue = db.queue_counts()?;
            println!(
                "queue: {} pending, {} in progress, {} completed, {} failed",
                queue.pending, queue.in_progress, queue.completed, queue.failed
            );
            println!("cached paths: {}", db.path_cache_count()?);
            Ok(())
        }
    }
}

/// Live merges need the explicit token; everything else stays dry-run.
/// Returns the dry_run flag.
fn require_merge_confirmation(live: bool, confirm: Option<&str>) -> Result<bool, PipelineError> {
    if !live {
        return Ok(true);
    }
    match confirm {
        Some(token) if token == MERGE_CONFIRM_TOKEN => Ok(false),
        _ => Err(PipelineError::Validation(format!(
            "live merge requires --confirm {MERGE_CONFIRM_TOKEN}"
        ))),
    }
}

fn build_scraper(config: &Config) -> Result<Arc<dyn ProfileScraper>, PipelineError> {
    let api_key = config.require_phantombuster_key()?;
    let agent_id = config
        .phantombuster_agent_id
        .as_deref()
        .ok_or_else(|| PipelineError::Fatal("PHANTOMBUSTER_AGENT_ID not set".to_string()))?;
    let scraper = PhantomBusterScraper::new(api_key, agent_id)?;
    Ok(Arc::new(scraper))
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => log::error!("Failed to serialize result: {}", e),
    }
}
