use async_trait::async_trait;
use tracing::debug;

use crate::{
    FlowError, Result,
    model::NodeData,
    registry::{GenerateOutput, GenerateRequest, Generator, Variant},
};

/// Stub text generation: no model is called.
///
/// The primitive variant emits the user's text as-is. The transform variant
/// emits its aggregated input, prefixed by the node's instructions when any
/// are set.
#[derive(Debug, Clone, Default)]
pub struct TextGenerator;

#[async_trait]
impl Generator for TextGenerator {
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerateOutput> {
        let NodeData::Text(data) = request.node.data() else {
            return Err(FlowError::InvalidData(format!("node {} is not a text node", request.node.id())));
        };
        debug!(node = %request.node.id(), variant = request.variant.as_ref(), "text generation");

        let output = match request.variant {
            Variant::Primitive => data.text.clone(),
            Variant::Transform => {
                let input = request.input.unwrap_or_default();
                if data.instructions.trim().is_empty() {
                    input
                } else {
                    format!("{}\n\n{}", data.instructions.trim(), input)
                }
            }
        };

        Ok(GenerateOutput {
            output: Some(output),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Node, Position, TextData};

    fn text_node(
        text: &str,
        instructions: &str,
    ) -> Node {
        let data = NodeData::Text(TextData {
            text: text.into(),
            instructions: instructions.into(),
            ..Default::default()
        });
        Node::new("t", "text".into(), Position::default(), data).unwrap()
    }

    #[tokio::test]
    async fn test_primitive_echoes_text() {
        let request = GenerateRequest {
            node: text_node("hello", "ignored"),
            variant: Variant::Primitive,
            input: None,
        };
        let output = TextGenerator.generate(request).await.unwrap();
        assert_eq!(output.output.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_transform_prefixes_instructions() {
        let request = GenerateRequest {
            node: text_node("", "Summarize:"),
            variant: Variant::Transform,
            input: Some("a\n\nb".into()),
        };
        let output = TextGenerator.generate(request).await.unwrap();
        assert_eq!(output.output.as_deref(), Some("Summarize:\n\na\n\nb"));
    }
}
