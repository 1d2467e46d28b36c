//! Decompile stage - unpacks the downloaded package.

use std::sync::Arc;

use super::DECOMPILE;
use crate::adapters::PackageTool;
use crate::artifacts::ArtifactStore;
use crate::orchestrator::context::{Artifact, ArtifactKind, RunContext};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::Stage;

pub struct DecompileStage {
    tool: Arc<dyn PackageTool>,
    store: ArtifactStore,
}

impl DecompileStage {
    pub fn new(tool: Arc<dyn PackageTool>, store: ArtifactStore) -> Self {
        Self { tool, store }
    }
}

impl Stage for DecompileStage {
    fn name(&self) -> &str {
        DECOMPILE
    }

    fn description(&self) -> &str {
        "Unpack the package into a source tree"
    }

    fn validate_input(&self, ctx: &RunContext) -> StageResult<()> {
        ctx.require_version()?;
        ctx.require_artifact(ArtifactKind::Downloaded)?;
        Ok(())
    }

    fn execute(&self, mut ctx: RunContext) -> StageResult<RunContext> {
        let output = self.store.unpack_dir(ctx.require_version()?)?;
        self.tool
            .unpack(ctx.require_artifact(ArtifactKind::Downloaded)?, &output)?;

        ctx.artifact = Some(Artifact::new(ArtifactKind::Unpacked, output));
        Ok(ctx)
    }

    fn validate_output(&self, ctx: &RunContext) -> StageResult<()> {
        let dir = ctx.require_artifact(ArtifactKind::Unpacked)?;
        if !dir.is_dir() {
            return Err(StageError::invalid_output(format!(
                "unpacked directory {} was not created",
                dir.display()
            )));
        }
        Ok(())
    }
}
