use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    FlowError, Result,
    model::{Edge, Node},
    utils,
};

/// document id
pub type DocumentId = String;

#[derive(Deserialize)]
struct ContentMetadata {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

/// Nodes and edges of a document, in insertion order.
///
/// Always a valid graph: node ids are unique and every edge joins two distinct
/// nodes that exist. No two edges share the same
/// source, target and handles. Loading drops edges that break this and
/// rejects duplicate node ids.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(try_from = "ContentMetadata")]
pub struct GraphContent {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl TryFrom<ContentMetadata> for GraphContent {
    type Error = FlowError;

    fn try_from(raw: ContentMetadata) -> Result<Self> {
        let mut ids = HashSet::new();
        for node in raw.nodes.iter() {
            if !ids.insert(node.id().as_str()) {
                return Err(FlowError::InvalidData(format!("duplicate node id {}", node.id())));
            }
        }

        let mut edge_ids = HashSet::new();
        let mut edges = Vec::with_capacity(raw.edges.len());
        for edge in raw.edges {
            if !ids.contains(edge.source.as_str()) || !ids.contains(edge.target.as_str()) {
                warn!(edge = %edge.id, "dropping edge with a missing endpoint");
                continue;
            }
            if edge.source == edge.target {
                warn!(edge = %edge.id, "dropping self-loop edge");
                continue;
            }
            if !edge_ids.insert(edge.id.clone()) {
                warn!(edge = %edge.id, "dropping edge with a duplicate id");
                continue;
            }
            if let Some(kept) = edges.iter().find(|e: &&Edge| e.same_connection(&edge.source, edge.source_handle.as_deref(), &edge.target, edge.target_handle.as_deref())) {
                warn!(edge = %edge.id, kept = %kept.id, "dropping duplicate connection");
                continue;
            }
            edges.push(edge);
        }

        Ok(Self {
            nodes: raw.nodes,
            edges,
        })
    }
}

impl GraphContent {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(
        &self,
        id: &str,
    ) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn edge(
        &self,
        id: &str,
    ) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn contains_node(
        &self,
        id: &str,
    ) -> bool {
        self.node(id).is_some()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges whose target is `id`, in insertion order.
    pub fn incoming<'a>(
        &'a self,
        id: &'a str,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == id)
    }

    /// Edges whose source is `id`, in insertion order.
    pub fn outgoing<'a>(
        &'a self,
        id: &'a str,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    pub(crate) fn node_mut(
        &mut self,
        id: &str,
    ) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id() == id)
    }

    pub(crate) fn push_node(
        &mut self,
        node: Node,
    ) {
        self.nodes.push(node);
    }

    pub(crate) fn push_edge(
        &mut self,
        edge: Edge,
    ) {
        self.edges.push(edge);
    }

    /// Remove a node and every edge touching it. Returns the removed edges.
    pub(crate) fn remove_node(
        &mut self,
        id: &str,
    ) -> Option<(Node, Vec<Edge>)> {
        let index = self.nodes.iter().position(|n| n.id() == id)?;
        let node = self.nodes.remove(index);
        let (removed, kept): (Vec<Edge>, Vec<Edge>) = std::mem::take(&mut self.edges).into_iter().partition(|e| e.involves_node(id));
        self.edges = kept;
        Some((node, removed))
    }

    pub(crate) fn remove_edge(
        &mut self,
        id: &str,
    ) -> Option<Edge> {
        let index = self.edges.iter().position(|e| e.id == id)?;
        Some(self.edges.remove(index))
    }
}

/// The persisted aggregate of one workspace: nodes, edges and metadata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphDocument {
    id: DocumentId,
    owner_id: String,
    name: String,
    #[serde(default)]
    content: GraphContent,
    created_at: i64,
    updated_at: i64,
}

impl GraphDocument {
    /// An empty document owned by `owner_id`.
    pub fn new(
        id: impl Into<DocumentId>,
        owner_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let now = utils::time::time_millis();
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            name: name.into(),
            content: GraphContent::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let document = serde_json::from_str::<GraphDocument>(s).map_err(|e| FlowError::Convert(format!("invalid graph document: {}", e)))?;
        if document.id.is_empty() {
            return Err(FlowError::InvalidData("missing id in graph document".into()));
        }
        Ok(document)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &GraphContent {
        &self.content
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Version of the document: strictly increases with every accepted mutation.
    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    pub(crate) fn content_mut(&mut self) -> &mut GraphContent {
        &mut self.content
    }

    pub(crate) fn set_name(
        &mut self,
        name: String,
    ) {
        self.name = name;
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = utils::time::next_millis(self.updated_at);
    }
}
