//! Recompile stage - rebuilds the modified tree into a package.

use std::sync::Arc;

use super::RECOMPILE;
use crate::adapters::PackageTool;
use crate::artifacts::ArtifactStore;
use crate::orchestrator::context::{Artifact, ArtifactKind, RunContext};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::Stage;

pub struct RecompileStage {
    tool: Arc<dyn PackageTool>,
    store: ArtifactStore,
}

impl RecompileStage {
    pub fn new(tool: Arc<dyn PackageTool>, store: ArtifactStore) -> Self {
        Self { tool, store }
    }
}

impl Stage for RecompileStage {
    fn name(&self) -> &str {
        RECOMPILE
    }

    fn description(&self) -> &str {
        "Rebuild the modified tree into an unsigned package"
    }

    fn validate_input(&self, ctx: &RunContext) -> StageResult<()> {
        ctx.require_version()?;
        ctx.require_artifact(ArtifactKind::Unpacked)?;
        Ok(())
    }

    fn execute(&self, mut ctx: RunContext) -> StageResult<RunContext> {
        let output = self.store.repack_path(ctx.require_version()?)?;
        self.tool
            .repack(ctx.require_artifact(ArtifactKind::Unpacked)?, &output)?;

        if !output.is_file() {
            return Err(StageError::file_not_found(output.display().to_string()));
        }
        ctx.artifact = Some(Artifact::new(ArtifactKind::Repacked, output));
        Ok(ctx)
    }
}
