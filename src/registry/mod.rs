//! Node registry: maps a node type tag to its capability contract.
//!
//! The registry is open. New node types are added by registering a
//! [`NodeDescriptor`]; existing descriptors are never touched.

mod code;
mod descriptor;
mod media;
mod text;

use std::{collections::HashMap, sync::Arc};

use strum::IntoEnumIterator;
use tracing::trace;

use crate::{
    FlowError, Result,
    model::{BuiltinType, NodeType},
};

pub use code::CodeGenerator;
pub use descriptor::{Aggregation, GenerateOutput, GenerateRequest, Generator, NodeDescriptor, NoopGenerator, Variant};
pub use media::MediaGenerator;
pub use text::TextGenerator;

/// Descriptors keyed by node type tag.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    descriptors: HashMap<NodeType, Arc<NodeDescriptor>>,
}

impl NodeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the text, image, audio, video and code descriptors.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for builtin in BuiltinType::iter() {
            registry.register(builtin_descriptor(builtin));
        }
        registry
    }

    /// Register a descriptor, returning the one it replaces.
    pub fn register(
        &mut self,
        descriptor: NodeDescriptor,
    ) -> Option<Arc<NodeDescriptor>> {
        trace!("registry::register({})", descriptor.node_type);
        self.descriptors.insert(descriptor.node_type.clone(), Arc::new(descriptor))
    }

    /// Fails with `UnknownNodeType` when the tag is not registered.
    pub fn lookup(
        &self,
        node_type: &NodeType,
    ) -> Result<Arc<NodeDescriptor>> {
        self.get(node_type).ok_or_else(|| FlowError::UnknownNodeType(node_type.to_string()))
    }

    pub fn get(
        &self,
        node_type: &NodeType,
    ) -> Option<Arc<NodeDescriptor>> {
        self.descriptors.get(node_type).cloned()
    }

    pub fn contains(
        &self,
        node_type: &NodeType,
    ) -> bool {
        self.descriptors.contains_key(node_type)
    }

    /// Registered tags, sorted.
    pub fn types(&self) -> Vec<NodeType> {
        let mut types: Vec<NodeType> = self.descriptors.keys().cloned().collect();
        types.sort();
        types
    }
}

fn builtin_descriptor(builtin: BuiltinType) -> NodeDescriptor {
    match builtin {
        BuiltinType::Text => NodeDescriptor::new(builtin.into(), "Text", Arc::new(TextGenerator)),
        BuiltinType::Code => NodeDescriptor::new(builtin.into(), "Code", Arc::new(CodeGenerator)).with_aggregation(Aggregation::concatenate("\n")),
        BuiltinType::Image => media_descriptor(builtin, "Image"),
        BuiltinType::Audio => media_descriptor(builtin, "Audio"),
        BuiltinType::Video => media_descriptor(builtin, "Video"),
    }
}

fn media_descriptor(
    builtin: BuiltinType,
    label: &str,
) -> NodeDescriptor {
    NodeDescriptor::new(builtin.into(), label, Arc::new(MediaGenerator))
        .with_input_handle(media::PROMPT_HANDLE)
        .with_aggregation(Aggregation::First)
        .with_actions(["generate", "upload"])
}
