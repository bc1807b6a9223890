//! Background scheduler.
//!
//! A singleton started at process launch: it spawns the long-running
//! workers (discovery engine, enrichment worker) and a maintenance ticker
//! that periodically reaps stale queue leases, seeds the enrichment queue
//! from flagged people, recomputes importance scores, and rebuilds the
//! co-employment edge table. Every task watches the same shutdown signal:
//! the in-flight unit of work completes, then the task exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::LEASE_TTL_MINUTES;
use crate::enrich::{EnrichWorker, ProfileScraper};
use crate::github::{DiscoveryEngine, GithubApi};
use crate::state::AppState;

/// Maintenance ticker resolution.
const TICK_SECS: u64 = 60;

/// Cadences, in ticks.
const REAP_EVERY_TICKS: u64 = 5; // 5 min
const SEED_EVERY_TICKS: u64 = 10; // 10 min
const SCORE_EVERY_TICKS: u64 = 6 * 60; // 6 h
const EDGES_EVERY_TICKS: u64 = 24 * 60; // 24 h

/// People enqueued per seeding sweep.
const SEED_BATCH: i64 = 200;

/// Enrichment workers drained from the queue concurrently. The lease
/// protocol gives each queue item exactly one owner, so workers never
/// double-process.
const ENRICH_WORKER_POOL: usize = 2;

pub struct Scheduler {
    state: Arc<AppState>,
}

impl Scheduler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Start all background tasks and wait for them to finish. Workers are
    /// optional: discovery needs a GitHub client, enrichment a scraper;
    /// the maintenance ticker always runs.
    pub async fn run(
        &self,
        github: Option<Arc<dyn GithubApi>>,
        scraper: Option<Arc<dyn ProfileScraper>>,
        shutdown: watch::Receiver<bool>,
    ) {
        log::info!("Scheduler: starting background tasks");
        let mut handles = Vec::new();

        if let Some(api) = github {
            let mut engine = DiscoveryEngine::new(self.state.db.clone(), api);
            let rx = shutdown.clone();
            handles.push(tokio::spawn(async move {
                engine.run(rx).await;
            }));
        } else {
            log::warn!("Scheduler: no GitHub token, discovery engine disabled");
        }

        if let Some(scraper) = scraper {
            for _ in 0..ENRICH_WORKER_POOL {
                let mut worker = EnrichWorker::new(
                    self.state.db.clone(),
                    self.state.index.clone(),
                    scraper.clone(),
                );
                let rx = shutdown.clone();
                handles.push(tokio::spawn(async move {
                    worker.run(rx).await;
                }));
            }
        } else {
            log::warn!("Scheduler: no PhantomBuster key, enrichment workers disabled");
        }

        let ticker_state = self.state.clone();
        handles.push(tokio::spawn(run_maintenance_ticker(ticker_state, shutdown)));

        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("Scheduler: task panicked: {}", e);
            }
        }
        log::info!("Scheduler: all tasks stopped");
    }
}

/// Periodic sweeps on a one-minute tick.
async fn run_maintenance_ticker(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    log::info!("Scheduler: maintenance ticker started");
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(Duration::from_secs(TICK_SECS)) => {}
        }
        if *shutdown.borrow() {
            break;
        }
        tick += 1;

        if tick % REAP_EVERY_TICKS == 0 {
            reap_stale_leases(&state);
        }
        if tick % SEED_EVERY_TICKS == 0 {
            seed_enrichment_queue(&state);
        }
        if tick % SCORE_EVERY_TICKS == 0 {
            run_importance_sweep(&state);
        }
        if tick % EDGES_EVERY_TICKS == 0 {
            rebuild_edges(&state);
        }
    }
    log::info!("Scheduler: maintenance ticker stopped");
}

/// Return leases abandoned by dead workers to the pending pool.
pub fn reap_stale_leases(state: &AppState) -> usize {
    let db = state.db.lock().expect("db lock");
    match db.reap_stale_leases(LEASE_TTL_MINUTES) {
        Ok(0) => 0,
        Ok(reaped) => {
            log::info!("Scheduler: reaped {} stale enrichment leases", reaped);
            reaped
        }
        Err(e) => {
            log::error!("Scheduler: lease reap failed: {}", e);
            0
        }
    }
}

/// Enqueue people flagged as needing enrichment who aren't already waiting.
pub fn seed_enrichment_queue(state: &AppState) -> usize {
    let db = state.db.lock().expect("db lock");
    let candidates = match db.people_needing_enrichment(SEED_BATCH) {
        Ok(candidates) => candidates,
        Err(e) => {
            log::error!("Scheduler: enrichment seed query failed: {}", e);
            return 0;
        }
    };

    let mut enqueued = 0;
    for person_id in candidates {
        match db.enqueue_enrichment(&person_id, 0) {
            Ok(true) => enqueued += 1,
            Ok(false) => {}
            Err(e) => log::warn!("Scheduler: enqueue failed for {}: {}", person_id, e),
        }
    }
    if enqueued > 0 {
        log::info!("Scheduler: seeded {} people into the enrichment queue", enqueued);
    }
    enqueued
}

/// Recompute missing importance scores, repositories before developers,
/// and refresh the propagated ecosystem tags on profiles.
pub fn run_importance_sweep(state: &AppState) {
    let db = state.db.lock().expect("db lock");
    if let Err(e) = crate::scoring::score_repositories(&db, None) {
        log::error!("Scheduler: repository scoring failed: {}", e);
    }
    if let Err(e) = crate::scoring::score_developers(&db, None) {
        log::error!("Scheduler: developer scoring failed: {}", e);
    }
    match db.propagate_ecosystem_tags() {
        Ok(tagged) if tagged > 0 => {
            log::info!("Scheduler: propagated ecosystem tags to {} profiles", tagged)
        }
        Ok(_) => {}
        Err(e) => log::error!("Scheduler: ecosystem tag propagation failed: {}", e),
    }
}

/// Rebuild the derived co-employment edges.
pub fn rebuild_edges(state: &AppState) {
    let db = state.db.lock().expect("db lock");
    match db.rebuild_coemployment_edges() {
        Ok(edges) => log::info!("Scheduler: rebuilt {} co-employment edges", edges),
        Err(e) => log::error!("Scheduler: edge rebuild failed: {}", e),
    }
}
