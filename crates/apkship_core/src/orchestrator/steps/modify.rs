//! Modify stage - applies the declared patches to the unpacked tree.

use std::sync::Arc;

use super::MODIFY;
use crate::adapters::Patcher;
use crate::logging::RunLogger;
use crate::orchestrator::context::{ArtifactKind, RunContext};
use crate::orchestrator::errors::StageResult;
use crate::orchestrator::stage::Stage;

pub struct ModifyStage {
    patcher: Arc<dyn Patcher>,
    logger: Arc<RunLogger>,
}

impl ModifyStage {
    pub fn new(patcher: Arc<dyn Patcher>, logger: Arc<RunLogger>) -> Self {
        Self { patcher, logger }
    }
}

impl Stage for ModifyStage {
    fn name(&self) -> &str {
        MODIFY
    }

    fn description(&self) -> &str {
        "Apply modifications and record them in the changelog"
    }

    fn validate_input(&self, ctx: &RunContext) -> StageResult<()> {
        ctx.require_artifact(ArtifactKind::Unpacked)?;
        Ok(())
    }

    fn execute(&self, mut ctx: RunContext) -> StageResult<RunContext> {
        let applied = self
            .patcher
            .apply(ctx.require_artifact(ArtifactKind::Unpacked)?)?;

        if applied.is_empty() {
            self.logger.info("No applicable modifications found");
        }
        for entry in &applied {
            self.logger.info(&format!("Modification: {}", entry));
        }

        let added = ctx.changelog.extend(applied);
        tracing::debug!(added, total = ctx.changelog.len(), "changelog updated");
        Ok(ctx)
    }

    fn validate_output(&self, ctx: &RunContext) -> StageResult<()> {
        ctx.require_artifact(ArtifactKind::Unpacked)?;
        Ok(())
    }
}
