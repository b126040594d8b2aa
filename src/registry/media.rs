use async_trait::async_trait;
use tracing::info;

use crate::{
    Result,
    registry::{GenerateOutput, GenerateRequest, Generator},
};

/// Input port of media nodes that carries the generation prompt.
pub const PROMPT_HANDLE: &str = "prompt";

/// Stub media generation for image, audio and video nodes.
///
/// Media content only arrives through uploads, so generation logs the
/// request and leaves the node untouched.
#[derive(Debug, Clone, Default)]
pub struct MediaGenerator;

#[async_trait]
impl Generator for MediaGenerator {
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerateOutput> {
        info!(
            node = %request.node.id(),
            node_type = %request.node.node_type(),
            prompt = request.input.as_deref().unwrap_or_default(),
            "media generation is not available, skipping"
        );
        Ok(GenerateOutput::default())
    }
}
