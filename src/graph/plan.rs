//! Execution order for running every node of a document.
//!
//! The document content is loaded into a petgraph `DiGraph` so upstream nodes
//! are always generated before the nodes they feed.

use std::collections::HashMap;

use petgraph::{
    algo::toposort,
    graph::{DiGraph, NodeIndex},
};

use crate::{
    FlowError, Result,
    model::{GraphContent, NodeId},
};

fn build_graph(content: &GraphContent) -> DiGraph<NodeId, ()> {
    let mut graph = DiGraph::with_capacity(content.node_count(), content.edge_count());
    let mut indices: HashMap<&str, NodeIndex> = HashMap::with_capacity(content.node_count());
    for node in content.nodes() {
        indices.insert(node.id().as_str(), graph.add_node(node.id().clone()));
    }
    for edge in content.edges() {
        if let (Some(from), Some(to)) = (indices.get(edge.source.as_str()), indices.get(edge.target.as_str())) {
            graph.add_edge(*from, *to, ());
        }
    }
    graph
}

/// Node ids ordered so that every edge source comes before its target.
///
/// Fails with `Cycle` naming a node on the cycle.
pub fn execution_order(content: &GraphContent) -> Result<Vec<NodeId>> {
    let graph = build_graph(content);
    let order = toposort(&graph, None).map_err(|cycle| FlowError::Cycle(graph[cycle.node_id()].clone()))?;
    Ok(order.into_iter().map(|idx| graph[idx].clone()).collect())
}
