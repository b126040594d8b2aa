//! Mutation operations over a graph document.
//!
//! Every edit is a [`Mutation`] value applied with [`GraphDocument::apply`].
//! Each operation validates all of its preconditions before touching the
//! document, so a rejected mutation leaves it exactly as it was.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    Config, FlowError, Result,
    config::DuplicateEdgePolicy,
    graph::layout::{default_position, free_spot},
    model::{Edge, EdgeId, GraphDocument, MediaRef, Node, NodeData, NodeId, NodeType, Position},
    registry::NodeRegistry,
    utils,
};

/// Options for adding a node.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddNodeOptions {
    /// exact position; wins over every other placement rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// centre of the visible canvas, used when no position is given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport_center: Option<Position>,
    /// initial payload; must match the node type, defaults to the registry's
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::model::tagged_data::option")]
    pub data: Option<NodeData>,
}

impl AddNodeOptions {
    pub fn at(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn with_data(
        mut self,
        data: NodeData,
    ) -> Self {
        self.data = Some(data);
        self
    }
}

/// One edit of a graph document. Applied mutations form the document's
/// mutation log; ids left empty are filled in on application.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    AddNode {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<NodeId>,
        node_type: NodeType,
        options: AddNodeOptions,
    },
    DuplicateNode {
        id: NodeId,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_id: Option<NodeId>,
    },
    DeleteNode {
        id: NodeId,
    },
    Connect {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<EdgeId>,
        source: NodeId,
        source_handle: Option<String>,
        target: NodeId,
        target_handle: Option<String>,
    },
    Disconnect {
        id: EdgeId,
    },
    UpdateData {
        id: NodeId,
        #[serde(with = "crate::model::tagged_data")]
        data: NodeData,
    },
    MoveNode {
        id: NodeId,
        position: Position,
    },
    SetMedia {
        id: NodeId,
        media: MediaRef,
    },
    SetOutput {
        id: NodeId,
        output: String,
    },
    Rename {
        name: String,
    },
}

impl Mutation {
    pub fn add_node(
        node_type: impl Into<NodeType>,
        options: AddNodeOptions,
    ) -> Self {
        Mutation::AddNode {
            id: None,
            node_type: node_type.into(),
            options,
        }
    }

    pub fn connect(
        source: impl Into<NodeId>,
        source_handle: Option<&str>,
        target: impl Into<NodeId>,
        target_handle: Option<&str>,
    ) -> Self {
        Mutation::Connect {
            id: None,
            source: source.into(),
            source_handle: source_handle.map(str::to_string),
            target: target.into(),
            target_handle: target_handle.map(str::to_string),
        }
    }

    /// Short name used in logs and events.
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::AddNode {
                ..
            } => "add_node",
            Mutation::DuplicateNode {
                ..
            } => "duplicate_node",
            Mutation::DeleteNode {
                ..
            } => "delete_node",
            Mutation::Connect {
                ..
            } => "connect",
            Mutation::Disconnect {
                ..
            } => "disconnect",
            Mutation::UpdateData {
                ..
            } => "update_data",
            Mutation::MoveNode {
                ..
            } => "move_node",
            Mutation::SetMedia {
                ..
            } => "set_media",
            Mutation::SetOutput {
                ..
            } => "set_output",
            Mutation::Rename {
                ..
            } => "rename",
        }
    }
}

/// Result of an accepted mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// the mutation with generated ids filled in
    pub mutation: Mutation,
    /// id of the node or edge the mutation created or returned
    pub created: Option<String>,
    /// false when the mutation was accepted as a no-op
    pub changed: bool,
    /// nodes whose incoming-edge set changed
    pub affected: Vec<NodeId>,
    /// nodes removed from the document
    pub removed: Vec<NodeId>,
}

impl Applied {
    fn new(mutation: Mutation) -> Self {
        Self {
            mutation,
            created: None,
            changed: true,
            affected: Vec::new(),
            removed: Vec::new(),
        }
    }

    fn unchanged(mutation: Mutation) -> Self {
        Self {
            changed: false,
            ..Self::new(mutation)
        }
    }
}

/// Editing rules taken from the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EditPolicy {
    pub duplicate_edges: DuplicateEdgePolicy,
    /// offset for duplicated and cascaded nodes
    pub offset: Position,
}

impl Default for EditPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl EditPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            duplicate_edges: config.edges.duplicate_policy,
            offset: Position::new(config.layout.offset_x, config.layout.offset_y),
        }
    }
}

impl GraphDocument {
    /// Apply one mutation atomically.
    ///
    /// On success `updated_at` advances if the document changed. On error
    /// the document is untouched.
    pub fn apply(
        &mut self,
        registry: &NodeRegistry,
        policy: &EditPolicy,
        mutation: Mutation,
    ) -> Result<Applied> {
        trace!("document::apply({}, {})", self.id(), mutation.name());
        let applied = match mutation {
            Mutation::AddNode {
                id,
                node_type,
                options,
            } => self.add_node(registry, policy, id, node_type, options)?,
            Mutation::DuplicateNode {
                id,
                new_id,
            } => self.duplicate_node(policy, id, new_id)?,
            Mutation::DeleteNode {
                id,
            } => self.delete_node(id)?,
            Mutation::Connect {
                id,
                source,
                source_handle,
                target,
                target_handle,
            } => self.connect(policy, id, source, source_handle, target, target_handle)?,
            Mutation::Disconnect {
                id,
            } => self.disconnect(id)?,
            Mutation::UpdateData {
                id,
                data,
            } => self.update_data(id, data)?,
            Mutation::MoveNode {
                id,
                position,
            } => self.move_node(id, position)?,
            Mutation::SetMedia {
                id,
                media,
            } => self.set_media(id, media)?,
            Mutation::SetOutput {
                id,
                output,
            } => self.set_output(id, output)?,
            Mutation::Rename {
                name,
            } => self.rename(name),
        };

        if applied.changed {
            self.touch();
        }
        Ok(applied)
    }

    /// Apply several mutations; either all are applied or none.
    pub fn apply_batch(
        &mut self,
        registry: &NodeRegistry,
        policy: &EditPolicy,
        mutations: impl IntoIterator<Item = Mutation>,
    ) -> Result<Vec<Applied>> {
        let mut draft = self.clone();
        let applied = mutations.into_iter().map(|m| draft.apply(registry, policy, m)).collect::<Result<Vec<_>>>()?;
        *self = draft;
        Ok(applied)
    }

    fn add_node(
        &mut self,
        registry: &NodeRegistry,
        policy: &EditPolicy,
        id: Option<NodeId>,
        node_type: NodeType,
        options: AddNodeOptions,
    ) -> Result<Applied> {
        let descriptor = registry.lookup(&node_type)?;
        let id = self.fresh_node_id(id)?;
        let data = options.data.clone().unwrap_or_else(|| descriptor.default_data());
        let position = default_position(self.content(), &options, policy.offset);
        let node = Node::new(id.clone(), node_type.clone(), position, data)?;

        self.content_mut().push_node(node);

        let mut applied = Applied::new(Mutation::AddNode {
            id: Some(id.clone()),
            node_type,
            options,
        });
        applied.created = Some(id);
        Ok(applied)
    }

    fn duplicate_node(
        &mut self,
        policy: &EditPolicy,
        id: NodeId,
        new_id: Option<NodeId>,
    ) -> Result<Applied> {
        let original = self.content().node(&id).ok_or_else(|| FlowError::NodeNotFound(id.clone()))?;
        let new_id = self.fresh_node_id(new_id)?;
        let position = free_spot(self.content(), original.position().offset(policy.offset.x, policy.offset.y), policy.offset);
        let copy = original.duplicate(new_id.clone(), position);

        self.content_mut().push_node(copy);

        let mut applied = Applied::new(Mutation::DuplicateNode {
            id,
            new_id: Some(new_id.clone()),
        });
        applied.created = Some(new_id);
        Ok(applied)
    }

    fn delete_node(
        &mut self,
        id: NodeId,
    ) -> Result<Applied> {
        let (_, removed_edges) = self.content_mut().remove_node(&id).ok_or_else(|| FlowError::NodeNotFound(id.clone()))?;

        let mut affected: Vec<NodeId> = Vec::new();
        for edge in removed_edges {
            if edge.target != id && !affected.contains(&edge.target) {
                affected.push(edge.target);
            }
        }

        let mut applied = Applied::new(Mutation::DeleteNode {
            id: id.clone(),
        });
        applied.affected = affected;
        applied.removed = vec![id];
        Ok(applied)
    }

    fn connect(
        &mut self,
        policy: &EditPolicy,
        id: Option<EdgeId>,
        source: NodeId,
        source_handle: Option<String>,
        target: NodeId,
        target_handle: Option<String>,
    ) -> Result<Applied> {
        if !self.content().contains_node(&source) {
            return Err(FlowError::NodeNotFound(source));
        }
        if !self.content().contains_node(&target) {
            return Err(FlowError::NodeNotFound(target));
        }
        if source == target {
            return Err(FlowError::SelfLoop(source));
        }

        let existing = self
            .content()
            .edges()
            .iter()
            .find(|e| e.same_connection(&source, source_handle.as_deref(), &target, target_handle.as_deref()))
            .map(|e| e.id.clone());
        if let Some(existing) = existing {
            return match policy.duplicate_edges {
                DuplicateEdgePolicy::Reject => Err(FlowError::DuplicateEdge(existing)),
                DuplicateEdgePolicy::Reuse => {
                    let mut applied = Applied::unchanged(Mutation::Connect {
                        id: Some(existing.clone()),
                        source,
                        source_handle,
                        target,
                        target_handle,
                    });
                    applied.created = Some(existing);
                    Ok(applied)
                }
            };
        }

        let id = match id {
            Some(id) if self.content().edge(&id).is_some() => {
                return Err(FlowError::InvalidData(format!("edge id {} is already in use", id)));
            }
            Some(id) => id,
            None => utils::shortid(),
        };

        self.content_mut().push_edge(Edge::new(id.clone(), source.clone(), source_handle.clone(), target.clone(), target_handle.clone()));

        let mut applied = Applied::new(Mutation::Connect {
            id: Some(id.clone()),
            source,
            source_handle,
            target: target.clone(),
            target_handle,
        });
        applied.created = Some(id);
        applied.affected = vec![target];
        Ok(applied)
    }

    fn disconnect(
        &mut self,
        id: EdgeId,
    ) -> Result<Applied> {
        let edge = self.content_mut().remove_edge(&id).ok_or_else(|| FlowError::EdgeNotFound(id.clone()))?;

        let mut applied = Applied::new(Mutation::Disconnect {
            id,
        });
        applied.affected = vec![edge.target];
        Ok(applied)
    }

    fn update_data(
        &mut self,
        id: NodeId,
        data: NodeData,
    ) -> Result<Applied> {
        let node = self.content_mut().node_mut(&id).ok_or_else(|| FlowError::NodeNotFound(id.clone()))?;
        if !data.matches(node.node_type()) {
            return Err(FlowError::InvalidData(format!("payload does not match node type {}", node.node_type())));
        }
        if node.data() == &data {
            return Ok(Applied::unchanged(Mutation::UpdateData {
                id,
                data,
            }));
        }

        *node.data_mut() = data.clone();
        Ok(Applied::new(Mutation::UpdateData {
            id,
            data,
        }))
    }

    fn move_node(
        &mut self,
        id: NodeId,
        position: Position,
    ) -> Result<Applied> {
        let node = self.content_mut().node_mut(&id).ok_or_else(|| FlowError::NodeNotFound(id.clone()))?;
        let changed = node.position() != position;
        node.set_position(position);

        let mutation = Mutation::MoveNode {
            id,
            position,
        };
        Ok(if changed { Applied::new(mutation) } else { Applied::unchanged(mutation) })
    }

    fn set_media(
        &mut self,
        id: NodeId,
        media: MediaRef,
    ) -> Result<Applied> {
        let node = self.content_mut().node_mut(&id).ok_or_else(|| FlowError::NodeNotFound(id.clone()))?;
        if !node.data_mut().set_media(media.clone()) {
            return Err(FlowError::InvalidData(format!("node {} does not hold media", id)));
        }
        Ok(Applied::new(Mutation::SetMedia {
            id,
            media,
        }))
    }

    fn set_output(
        &mut self,
        id: NodeId,
        output: String,
    ) -> Result<Applied> {
        let now = utils::time::time_millis();
        let node = self.content_mut().node_mut(&id).ok_or_else(|| FlowError::NodeNotFound(id.clone()))?;
        if !node.data_mut().set_output(output.clone(), now) {
            return Err(FlowError::InvalidData(format!("node {} does not keep an output", id)));
        }
        Ok(Applied::new(Mutation::SetOutput {
            id,
            output,
        }))
    }

    fn rename(
        &mut self,
        name: String,
    ) -> Applied {
        if self.name() == name {
            return Applied::unchanged(Mutation::Rename {
                name,
            });
        }
        self.set_name(name.clone());
        Applied::new(Mutation::Rename {
            name,
        })
    }

    fn fresh_node_id(
        &self,
        requested: Option<NodeId>,
    ) -> Result<NodeId> {
        match requested {
            Some(id) if self.content().contains_node(&id) => Err(FlowError::InvalidData(format!("node id {} is already in use", id))),
            Some(id) => Ok(id),
            None => {
                let mut id = utils::shortid();
                while self.content().contains_node(&id) {
                    id = utils::shortid();
                }
                Ok(id)
            }
        }
    }
}
