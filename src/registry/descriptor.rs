use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    FlowError, Result,
    model::{Node, NodeData, NodeType},
};

/// Behavioral variant a node presents, derived from its incoming edges.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Variant {
    /// no incoming edges: accepts direct user input
    #[default]
    Primitive,
    /// at least one incoming edge: derives its output from upstream nodes
    Transform,
}

/// How several upstream values arriving on the same port are combined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregation {
    /// join every value in edge insertion order
    Concatenate {
        separator: String,
    },
    /// take the first value in edge insertion order and warn about the rest
    First,
}

impl Aggregation {
    pub fn concatenate(separator: impl Into<String>) -> Self {
        Aggregation::Concatenate {
            separator: separator.into(),
        }
    }
}

impl Default for Aggregation {
    fn default() -> Self {
        Aggregation::concatenate("\n\n")
    }
}

/// Input of a generation run.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// snapshot of the node being generated
    pub node: Node,
    /// variant resolved when the request was built
    pub variant: Variant,
    /// upstream values after aggregation, `None` for primitive nodes
    pub input: Option<String>,
}

/// Output of a generation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateOutput {
    /// value stored as the node's output, if the node type keeps one
    pub output: Option<String>,
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Runs the node's generation action.
    ///
    /// # Arguments
    ///
    /// * `request` - The [`GenerateRequest`] with the node snapshot and its aggregated input.
    ///
    /// # Returns
    ///
    /// Returns a [`Result<GenerateOutput>`] with the value to store on the node.
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerateOutput>;
}

/// Generator for node types without a generation action.
#[derive(Debug, Clone, Default)]
pub struct NoopGenerator;

#[async_trait]
impl Generator for NoopGenerator {
    async fn generate(
        &self,
        _: GenerateRequest,
    ) -> Result<GenerateOutput> {
        Ok(GenerateOutput::default())
    }
}

/// Capability contract of one node type.
#[derive(Clone)]
pub struct NodeDescriptor {
    /// tag this descriptor is registered under
    pub node_type: NodeType,
    /// display name
    pub label: String,
    /// variants the node may present
    pub variants: Vec<Variant>,
    /// input port that decides the variant; `None` means every port counts
    pub input_handle: Option<String>,
    /// policy for several values on the input port
    pub aggregation: Aggregation,
    /// names of the actions the node exposes
    pub actions: Vec<String>,
    default_data: NodeData,
    generator: Arc<dyn Generator>,
}

impl std::fmt::Debug for NodeDescriptor {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("node_type", &self.node_type)
            .field("label", &self.label)
            .field("variants", &self.variants)
            .field("input_handle", &self.input_handle)
            .field("aggregation", &self.aggregation)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

impl NodeDescriptor {
    pub fn new(
        node_type: NodeType,
        label: impl Into<String>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let default_data = NodeData::default_for(&node_type);
        Self {
            node_type,
            label: label.into(),
            variants: vec![Variant::Primitive, Variant::Transform],
            input_handle: None,
            aggregation: Aggregation::default(),
            actions: vec!["generate".to_string()],
            default_data,
            generator,
        }
    }

    pub fn with_variants(
        mut self,
        variants: impl IntoIterator<Item = Variant>,
    ) -> Self {
        self.variants = variants.into_iter().collect();
        self
    }

    pub fn with_input_handle(
        mut self,
        handle: impl Into<String>,
    ) -> Self {
        self.input_handle = Some(handle.into());
        self
    }

    pub fn with_aggregation(
        mut self,
        aggregation: Aggregation,
    ) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_actions<S: Into<String>>(
        mut self,
        actions: impl IntoIterator<Item = S>,
    ) -> Self {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the payload new nodes start with. It must match the node type.
    pub fn with_default_data(
        mut self,
        data: NodeData,
    ) -> Result<Self> {
        if !data.matches(&self.node_type) {
            return Err(FlowError::InvalidData(format!("default payload does not match node type {}", self.node_type)));
        }
        self.default_data = data;
        Ok(self)
    }

    /// A fresh copy of the default payload.
    pub fn default_data(&self) -> NodeData {
        self.default_data.clone()
    }

    pub fn supports(
        &self,
        variant: Variant,
    ) -> bool {
        self.variants.contains(&variant)
    }

    pub fn generator(&self) -> Arc<dyn Generator> {
        self.generator.clone()
    }
}
