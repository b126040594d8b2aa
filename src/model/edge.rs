use serde::{Deserialize, Serialize};

use crate::model::NodeId;

/// edge id
pub type EdgeId = String;

/// A directed connection from one node's output port to another's input port.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    pub fn new(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        source_handle: Option<String>,
        target: impl Into<NodeId>,
        target_handle: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle,
            target_handle,
        }
    }

    /// Check if this edge touches a specific node
    pub fn involves_node(
        &self,
        node_id: &str,
    ) -> bool {
        self.source == node_id || self.target == node_id
    }

    /// Same endpoints and ports, ignoring the edge id
    pub fn same_connection(
        &self,
        source: &str,
        source_handle: Option<&str>,
        target: &str,
        target_handle: Option<&str>,
    ) -> bool {
        self.source == source && self.target == target && self.source_handle.as_deref() == source_handle && self.target_handle.as_deref() == target_handle
    }

    /// Whether this edge feeds the given input port. An edge without a target
    /// handle feeds the node's default port, and `None` matches every port.
    pub fn feeds_port(
        &self,
        port: Option<&str>,
    ) -> bool {
        match (port, self.target_handle.as_deref()) {
            (None, _) | (Some(_), None) => true,
            (Some(port), Some(handle)) => port == handle,
        }
    }
}
