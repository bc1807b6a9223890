//! BFS shortest path with a persistent 7-day cache.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::config::PATH_CACHE_TTL_DAYS;
use crate::db::{DbError, TalentDb};

/// Neighbors pulled per edge kind per expansion step.
const NEIGHBORS_PER_KIND: i64 = 50;

/// Default and maximum search depth.
pub const DEFAULT_MAX_DEPTH: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathNode {
    pub person_id: String,
    pub name: String,
    pub headline: Option<String>,
    pub location: Option<String>,
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathEdge {
    pub from: String,
    pub to: String,
    /// `coworker`, `github_collaborator`, or `unknown`.
    pub edge_type: String,
    /// Company name for coworker edges, repo full name for collaborators.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathResult {
    pub path_length: usize,
    pub nodes: Vec<PathNode>,
    pub edges: Vec<PathEdge>,
    pub cached: bool,
}

/// Serialized shape of the cache blob.
#[derive(Serialize, Deserialize)]
struct CachedPathBlob {
    nodes: Vec<PathNode>,
    edges: Vec<PathEdge>,
}

/// Find the shortest path between two people within `max_depth` hops.
///
/// Cache first (7-day TTL), then BFS over co-employment and shared-repo
/// edges with 50 neighbors per kind per node. A found path is enriched with
/// person and edge detail and upserted into the cache; a miss returns `None`
/// and writes nothing, so unconnected pairs are re-checked as the graph
/// grows.
pub fn shortest_path(
    db: &TalentDb,
    source: &str,
    target: &str,
    max_depth: usize,
) -> Result<Option<PathResult>, DbError> {
    if source == target {
        return Ok(None);
    }

    if let Some((path_length, blob)) = db.get_cached_path(source, target, PATH_CACHE_TTL_DAYS)? {
        match serde_json::from_str::<CachedPathBlob>(&blob) {
            Ok(cached) => {
                return Ok(Some(PathResult {
                    path_length: path_length as usize,
                    nodes: cached.nodes,
                    edges: cached.edges,
                    cached: true,
                }));
            }
            Err(e) => {
                // Stale or corrupt blob: fall through to a fresh search
                log::warn!("NetworkPath: discarding unreadable cache entry: {}", e);
            }
        }
    }

    let Some(id_path) = bfs(db, source, target, max_depth)? else {
        return Ok(None);
    };

    let result = enrich_path(db, &id_path)?;

    let blob = serde_json::to_string(&CachedPathBlob {
        nodes: result.nodes.clone(),
        edges: result.edges.clone(),
    })?;
    db.cache_path(source, target, result.path_length as i64, &blob)?;

    Ok(Some(result))
}

/// Plain BFS over person ids. Paths longer than `max_depth` hops are never
/// expanded; the visited set keeps already-expanded people out of the queue.
fn bfs(
    db: &TalentDb,
    source: &str,
    target: &str,
    max_depth: usize,
) -> Result<Option<Vec<String>>, DbError> {
    let mut queue: VecDeque<Vec<String>> = VecDeque::new();
    let mut visited: HashSet<String> = HashSet::new();

    queue.push_back(vec![source.to_string()]);
    visited.insert(source.to_string());

    while let Some(path) = queue.pop_front() {
        if path.len() > max_depth + 1 {
            continue;
        }
        let Some(current) = path.last().cloned() else {
            continue;
        };
        if current == target {
            return Ok(Some(path));
        }
        if path.len() == max_depth + 1 {
            // Expanding further would exceed the depth budget
            continue;
        }

        let mut neighbors = db.coemployment_neighbors(&current, NEIGHBORS_PER_KIND)?;
        neighbors.extend(db.cocontribution_neighbors(&current, NEIGHBORS_PER_KIND)?);

        for neighbor in neighbors {
            if visited.insert(neighbor.clone()) {
                let mut next = path.clone();
                next.push(neighbor);
                queue.push_back(next);
            }
        }
    }

    Ok(None)
}

/// Turn an id path into full node records and per-hop edge records.
fn enrich_path(db: &TalentDb, id_path: &[String]) -> Result<PathResult, DbError> {
    let briefs = db.persons_brief(id_path)?;
    let by_id: HashMap<&str, _> = briefs.iter().map(|b| (b.person_id.as_str(), b)).collect();

    let mut nodes = Vec::with_capacity(id_path.len());
    for (position, person_id) in id_path.iter().enumerate() {
        let brief = by_id.get(person_id.as_str());
        nodes.push(PathNode {
            person_id: person_id.clone(),
            name: brief
                .and_then(|b| b.full_name.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            headline: brief.and_then(|b| b.headline.clone()),
            location: brief.and_then(|b| b.location.clone()),
            position,
        });
    }

    let mut edges = Vec::with_capacity(id_path.len().saturating_sub(1));
    for pair in id_path.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        let edge = if let Some(company) = db.coemployment_company_between(from, to)? {
            PathEdge {
                from: from.clone(),
                to: to.clone(),
                edge_type: "coworker".to_string(),
                via: Some(company),
            }
        } else if let Some(repo) = db.shared_repo_between(from, to)? {
            PathEdge {
                from: from.clone(),
                to: to.clone(),
                edge_type: "github_collaborator".to_string(),
                via: Some(repo),
            }
        } else {
            PathEdge {
                from: from.clone(),
                to: to.clone(),
                edge_type: "unknown".to_string(),
                via: None,
            }
        };
        edges.push(edge);
    }

    Ok(PathResult {
        path_length: id_path.len() - 1,
        nodes,
        edges,
        cached: false,
    })
}
