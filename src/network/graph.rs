//! Neighborhood graphs and connector detection.
//!
//! Connector detection is the recruiter-facing centerpiece: given 2–4
//! center people, find the nodes adjacent to at least two of them: people
//! who bridge otherwise separate circles.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::db::{DbError, TalentDb};

/// First-degree neighbors pulled per edge kind per center.
const NEIGHBORS_PER_KIND: i64 = 50;

/// Second-degree nodes expanded per first-degree node.
const SECOND_DEGREE_PER_NODE: i64 = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub person_id: String,
    pub name: String,
    pub headline: Option<String>,
    pub location: Option<String>,
    /// Hops from the (nearest) center.
    pub degree: usize,
    pub is_center: bool,
    /// Centers this node is adjacent to; ≥2 makes it a connector.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub connects: Vec<String>,
    pub is_connector: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    /// `coworker` or `github_collaborator`.
    pub connection_type: String,
}

/// Result of a single-center neighborhood query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborhoodGraph {
    pub center_person_id: String,
    pub max_degree: usize,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Result of a multi-center connector query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorGraph {
    pub center_person_ids: Vec<String>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub connectors: Vec<String>,
}

/// Capped neighbors of one person, labeled by edge kind.
fn neighbors_of(
    db: &TalentDb,
    person_id: &str,
    limit: i64,
) -> Result<Vec<(String, &'static str)>, DbError> {
    let mut out: Vec<(String, &'static str)> = db
        .coemployment_neighbors(person_id, limit)?
        .into_iter()
        .map(|id| (id, "coworker"))
        .collect();
    let seen: HashSet<String> = out.iter().map(|(id, _)| id.clone()).collect();
    for id in db.cocontribution_neighbors(person_id, limit)? {
        if !seen.contains(&id) {
            out.push((id, "github_collaborator"));
        }
    }
    Ok(out)
}

/// First-degree (and optionally second-degree) neighborhood of a person.
pub fn neighborhood_graph(
    db: &TalentDb,
    center: &str,
    max_degree: usize,
    limit: usize,
) -> Result<NeighborhoodGraph, DbError> {
    let max_degree = max_degree.clamp(1, 2);

    let mut degrees: HashMap<String, usize> = HashMap::new();
    let mut edges: Vec<GraphEdge> = Vec::new();
    degrees.insert(center.to_string(), 0);

    // Degree 1
    let first: Vec<(String, &'static str)> = neighbors_of(db, center, NEIGHBORS_PER_KIND)?
        .into_iter()
        .take(limit)
        .collect();
    for (neighbor, kind) in &first {
        degrees.entry(neighbor.clone()).or_insert(1);
        edges.push(GraphEdge {
            source: center.to_string(),
            target: neighbor.clone(),
            connection_type: kind.to_string(),
        });
    }

    // Degree 2, batched over the first ring
    if max_degree >= 2 {
        for (node, _) in &first {
            for (neighbor, kind) in neighbors_of(db, node, SECOND_DEGREE_PER_NODE)? {
                if degrees.len() >= limit + 1 && !degrees.contains_key(&neighbor) {
                    continue;
                }
                degrees.entry(neighbor.clone()).or_insert(2);
                if neighbor != *center {
                    edges.push(GraphEdge {
                        source: node.clone(),
                        target: neighbor,
                        connection_type: kind.to_string(),
                    });
                }
            }
        }
    }

    let nodes = build_nodes(db, &degrees, &[center.to_string()], &HashMap::new())?;
    Ok(NeighborhoodGraph {
        center_person_id: center.to_string(),
        max_degree,
        nodes,
        edges,
    })
}

/// Multi-center graph marking nodes adjacent to two or more centers.
/// Accepts 2–4 centers; others are a validation error at the CLI boundary.
pub fn connector_graph(
    db: &TalentDb,
    centers: &[String],
    limit: usize,
) -> Result<ConnectorGraph, DbError> {
    let mut degrees: HashMap<String, usize> = HashMap::new();
    let mut edges: Vec<GraphEdge> = Vec::new();
    let mut connected_centers: HashMap<String, HashSet<String>> = HashMap::new();

    for center in centers {
        degrees.insert(center.clone(), 0);
    }

    for center in centers {
        let neighbors: Vec<(String, &'static str)> = neighbors_of(db, center, NEIGHBORS_PER_KIND)?
            .into_iter()
            .take(limit)
            .collect();
        for (neighbor, kind) in neighbors {
            if !centers.contains(&neighbor) {
                degrees.entry(neighbor.clone()).or_insert(1);
                connected_centers
                    .entry(neighbor.clone())
                    .or_default()
                    .insert(center.clone());
            }
            edges.push(GraphEdge {
                source: center.clone(),
                target: neighbor,
                connection_type: kind.to_string(),
            });
        }
    }

    let connects: HashMap<String, Vec<String>> = connected_centers
        .into_iter()
        .map(|(node, centers)| {
            let mut list: Vec<String> = centers.into_iter().collect();
            list.sort();
            (node, list)
        })
        .collect();

    let nodes = build_nodes(db, &degrees, centers, &connects)?;
    let connectors: Vec<String> = nodes
        .iter()
        .filter(|n| n.is_connector)
        .map(|n| n.person_id.clone())
        .collect();

    Ok(ConnectorGraph {
        center_person_ids: centers.to_vec(),
        nodes,
        edges,
        connectors,
    })
}

fn build_nodes(
    db: &TalentDb,
    degrees: &HashMap<String, usize>,
    centers: &[String],
    connects: &HashMap<String, Vec<String>>,
) -> Result<Vec<GraphNode>, DbError> {
    let ids: Vec<String> = degrees.keys().cloned().collect();
    let briefs = db.persons_brief(&ids)?;

    let mut nodes: Vec<GraphNode> = briefs
        .into_iter()
        .map(|brief| {
            let degree = degrees.get(&brief.person_id).copied().unwrap_or(1);
            let node_connects = connects.get(&brief.person_id).cloned().unwrap_or_default();
            GraphNode {
                is_center: centers.contains(&brief.person_id),
                is_connector: node_connects.len() >= 2,
                connects: node_connects,
                degree,
                name: brief.full_name.unwrap_or_else(|| "Unknown".to_string()),
                headline: brief.headline,
                location: brief.location,
                person_id: brief.person_id,
            }
        })
        .collect();
    nodes.sort_by(|a, b| a.degree.cmp(&b.degree).then(a.person_id.cmp(&b.person_id)));
    Ok(nodes)
}
