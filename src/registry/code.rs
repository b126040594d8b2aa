use async_trait::async_trait;
use tracing::info;

use crate::{
    FlowError, Result,
    model::NodeData,
    registry::{GenerateOutput, GenerateRequest, Generator},
};

/// Stub code generation: the code is logged, never executed.
#[derive(Debug, Clone, Default)]
pub struct CodeGenerator;

#[async_trait]
impl Generator for CodeGenerator {
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerateOutput> {
        let NodeData::Code(data) = request.node.data() else {
            return Err(FlowError::InvalidData(format!("node {} is not a code node", request.node.id())));
        };
        info!(node = %request.node.id(), language = %data.language, lines = data.code.lines().count(), "code generation is not available, skipping");
        Ok(GenerateOutput::default())
    }
}
