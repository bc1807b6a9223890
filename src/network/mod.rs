//! Network queries over the co-employment + co-contribution graph.
//!
//! The derived `edge_coemployment` table and the contribution join are the
//! only edge sources; BFS and the neighborhood queries read them through
//! capped per-node expansions so a celebrity node cannot blow up a query.

pub mod graph;
pub mod paths;

pub use graph::{
    connector_graph, neighborhood_graph, ConnectorGraph, GraphEdge, GraphNode,
    NeighborhoodGraph,
};
pub use paths::{shortest_path, PathEdge, PathNode, PathResult};
