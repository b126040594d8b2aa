use std::{collections::HashMap, sync::Arc};

use tracing::warn;

use crate::{
    FlowError, Result,
    model::{Edge, GraphContent, Node, NodeId},
    registry::{Aggregation, NodeDescriptor, NodeRegistry, Variant},
};

/// Derives each node's variant from the edges feeding it.
///
/// Nothing is cached: every call reads the current content, so the answer is
/// a pure function of the node type and its incoming edges.
#[derive(Clone)]
pub struct VariantResolver {
    registry: Arc<NodeRegistry>,
}

impl VariantResolver {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
        }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Edges into `id` that reach the port deciding its variant, in insertion order.
    pub fn incoming<'a>(
        &self,
        content: &'a GraphContent,
        id: &str,
    ) -> Result<Vec<&'a Edge>> {
        let node = content.node(id).ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
        let descriptor = self.registry.get(node.node_type());
        let port = descriptor.as_ref().and_then(|d| d.input_handle.as_deref());
        Ok(content.incoming(node.id()).filter(|e| e.feeds_port(port)).collect())
    }

    pub fn resolve(
        &self,
        content: &GraphContent,
        id: &str,
    ) -> Result<Variant> {
        let node = content.node(id).ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
        let connected = !self.incoming(content, id)?.is_empty();
        Ok(pick_variant(self.registry.get(node.node_type()).as_deref(), connected))
    }

    /// Variant of every node, in document order.
    pub fn resolve_all(
        &self,
        content: &GraphContent,
    ) -> Vec<(NodeId, Variant)> {
        content
            .nodes()
            .iter()
            .map(|node| {
                let variant = self.resolve(content, node.id()).unwrap_or_default();
                (node.id().clone(), variant)
            })
            .collect()
    }

    /// Upstream values for `id`, combined by its type's aggregation policy.
    ///
    /// `overrides` holds outputs produced earlier in the same run and wins over
    /// the value stored on the upstream node. Returns `None` when no upstream
    /// node has a value yet.
    pub fn gather_input(
        &self,
        content: &GraphContent,
        id: &str,
        overrides: &HashMap<NodeId, String>,
    ) -> Result<Option<String>> {
        let node = content.node(id).ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
        let values: Vec<String> = self
            .incoming(content, id)?
            .into_iter()
            .filter_map(|edge| overrides.get(&edge.source).cloned().or_else(|| content.node(&edge.source).and_then(upstream_value)))
            .collect();
        if values.is_empty() {
            return Ok(None);
        }

        let aggregation = self.registry.get(node.node_type()).map(|d| d.aggregation.clone()).unwrap_or_default();
        let input = match aggregation {
            Aggregation::Concatenate {
                separator,
            } => values.join(&separator),
            Aggregation::First => {
                if values.len() > 1 {
                    warn!(node = %id, count = values.len(), "several inputs on a single-value port, using the first");
                }
                values.into_iter().next().unwrap_or_default()
            }
        };
        Ok(Some(input))
    }
}

fn upstream_value(node: &Node) -> Option<String> {
    node.data().output_value()
}

fn pick_variant(
    descriptor: Option<&NodeDescriptor>,
    connected: bool,
) -> Variant {
    let wanted = if connected { Variant::Transform } else { Variant::Primitive };
    match descriptor {
        Some(d) if !d.supports(wanted) => d.variants.first().copied().unwrap_or_default(),
        _ => wanted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{AddNodeOptions, Applied, EditPolicy, Mutation},
        model::{GraphDocument, NodeData, TextData},
        registry::{NodeDescriptor, NoopGenerator},
    };

    struct Fixture {
        doc: GraphDocument,
        registry: Arc<NodeRegistry>,
        resolver: VariantResolver,
    }

    impl Fixture {
        fn new(registry: NodeRegistry) -> Self {
            let registry = Arc::new(registry);
            Self {
                doc: GraphDocument::new("doc", "owner", "Flow"),
                resolver: VariantResolver::new(registry.clone()),
                registry,
            }
        }

        fn apply(
            &mut self,
            mutation: Mutation,
        ) -> Result<Applied> {
            self.doc.apply(&self.registry, &EditPolicy::default(), mutation)
        }

        fn text(
            &mut self,
            text: &str,
        ) -> NodeId {
            let options = AddNodeOptions::default().with_data(NodeData::Text(TextData {
                text: text.into(),
                ..Default::default()
            }));
            self.apply(Mutation::add_node("text", options)).unwrap().created.unwrap()
        }

        fn add(
            &mut self,
            node_type: &str,
        ) -> NodeId {
            self.apply(Mutation::add_node(node_type, AddNodeOptions::default())).unwrap().created.unwrap()
        }

        fn connect(
            &mut self,
            source: &str,
            target: &str,
            target_handle: Option<&str>,
        ) -> String {
            self.apply(Mutation::connect(source, None, target, target_handle)).unwrap().created.unwrap()
        }

        fn variant(
            &self,
            id: &str,
        ) -> Variant {
            self.resolver.resolve(self.doc.content(), id).unwrap()
        }
    }

    #[test]
    fn test_two_text_nodes_scenario() {
        let mut f = Fixture::new(NodeRegistry::with_builtins());
        let a = f.text("a");
        let b = f.text("b");
        assert_eq!(f.variant(&a), Variant::Primitive);
        assert_eq!(f.variant(&b), Variant::Primitive);

        f.connect(&a, &b, None);
        assert_eq!(f.variant(&a), Variant::Primitive);
        assert_eq!(f.variant(&b), Variant::Transform);

        f.apply(Mutation::DeleteNode {
            id: a.clone(),
        })
        .unwrap();
        assert_eq!(f.variant(&b), Variant::Primitive);
        assert_eq!(f.doc.content().edge_count(), 0);
    }

    #[test]
    fn test_add_then_remove_edge_restores_variant() {
        let mut f = Fixture::new(NodeRegistry::with_builtins());
        let a = f.text("a");
        let b = f.text("b");
        let c = f.text("c");
        f.connect(&a, &b, None);
        let before = f.resolver.resolve_all(f.doc.content());

        let edge = f.connect(&c, &b, None);
        f.apply(Mutation::Disconnect {
            id: edge,
        })
        .unwrap();

        assert_eq!(f.resolver.resolve_all(f.doc.content()), before);
    }

    #[test]
    fn test_resolution_is_independent_of_unrelated_edges() {
        let mut f = Fixture::new(NodeRegistry::with_builtins());
        let a = f.text("a");
        let b = f.text("b");
        let c = f.text("c");
        let d = f.text("d");
        f.connect(&a, &b, None);
        let before = f.variant(&b);

        f.connect(&c, &d, None);
        f.connect(&b, &c, None);
        assert_eq!(f.variant(&b), before);
    }

    #[test]
    fn test_media_only_counts_prompt_port() {
        let mut f = Fixture::new(NodeRegistry::with_builtins());
        let prompt = f.text("a cat");
        let style = f.text("watercolor");
        let image = f.add("image");

        f.connect(&style, &image, Some("style"));
        assert_eq!(f.variant(&image), Variant::Primitive);
        assert!(f.resolver.incoming(f.doc.content(), &image).unwrap().is_empty());

        f.connect(&prompt, &image, Some("prompt"));
        assert_eq!(f.variant(&image), Variant::Transform);

        let defaulted = f.text("no handle");
        let other = f.add("image");
        f.connect(&defaulted, &other, None);
        assert_eq!(f.variant(&other), Variant::Transform);
    }

    #[test]
    fn test_unknown_node_is_reported() {
        let f = Fixture::new(NodeRegistry::with_builtins());
        assert_eq!(f.resolver.resolve(f.doc.content(), "ghost").unwrap_err(), FlowError::NodeNotFound("ghost".into()));
    }

    #[test]
    fn test_descriptor_without_transform_stays_primitive() {
        let mut registry = NodeRegistry::with_builtins();
        registry.register(NodeDescriptor::new("sticker".into(), "Sticker", Arc::new(NoopGenerator)).with_variants([Variant::Primitive]));
        let mut f = Fixture::new(registry);
        let a = f.text("a");
        let s = f.add("sticker");
        f.connect(&a, &s, None);
        assert_eq!(f.variant(&s), Variant::Primitive);
    }

    #[test]
    fn test_concatenates_in_edge_order() {
        let mut f = Fixture::new(NodeRegistry::with_builtins());
        let first = f.text("one");
        let second = f.text("two");
        let target = f.text("");
        f.connect(&second, &target, None);
        f.connect(&first, &target, None);

        let input = f.resolver.gather_input(f.doc.content(), &target, &HashMap::new()).unwrap();
        assert_eq!(input.as_deref(), Some("two\n\none"));

        let overrides = HashMap::from([(first.clone(), "ONE".to_string())]);
        let input = f.resolver.gather_input(f.doc.content(), &target, &overrides).unwrap();
        assert_eq!(input.as_deref(), Some("two\n\nONE"));
    }

    #[test]
    fn test_first_policy_takes_first_edge() {
        let mut f = Fixture::new(NodeRegistry::with_builtins());
        let first = f.text("a cat");
        let second = f.text("a dog");
        let image = f.add("image");
        f.connect(&first, &image, Some("prompt"));
        f.connect(&second, &image, Some("prompt"));

        let input = f.resolver.gather_input(f.doc.content(), &image, &HashMap::new()).unwrap();
        assert_eq!(input.as_deref(), Some("a cat"));
    }

    #[test]
    fn test_no_upstream_values_gives_none() {
        let mut f = Fixture::new(NodeRegistry::with_builtins());
        let empty = f.text("");
        let target = f.text("");
        f.connect(&empty, &target, None);
        assert_eq!(f.resolver.gather_input(f.doc.content(), &target, &HashMap::new()).unwrap(), None);
    }
}
