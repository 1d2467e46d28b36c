//! Pipeline stage trait definition.

use super::context::RunContext;
use super::errors::StageResult;

/// Trait for pipeline stages.
///
/// The engine calls these methods in order:
///
/// 1. `validate_input` - fail fast when a required context field is missing
/// 2. `execute` - take ownership of the context and return it enriched
/// 3. `validate_output` - check the produced context before moving on
///
/// Stages keep no state between runs; everything a later stage needs goes
/// into the returned `RunContext`.
///
/// # Example
///
/// ```ignore
/// struct RecompileStage { tool: Arc<dyn PackageTool>, store: ArtifactStore }
///
/// impl Stage for RecompileStage {
///     fn name(&self) -> &str { "recompile" }
///
///     fn validate_input(&self, ctx: &RunContext) -> StageResult<()> {
///         ctx.require_artifact(ArtifactKind::Unpacked)?;
///         Ok(())
///     }
///
///     fn execute(&self, mut ctx: RunContext) -> StageResult<RunContext> {
///         let output = self.store.repack_path(ctx.require_version()?)?;
///         self.tool.repack(ctx.require_artifact(ArtifactKind::Unpacked)?, &output)?;
///         ctx.artifact = Some(Artifact::new(ArtifactKind::Repacked, output));
///         Ok(ctx)
///     }
/// }
/// ```
pub trait Stage: Send + Sync {
    /// Stage name, used in logs, errors and timeout overrides.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str {
        self.name()
    }

    /// Check preconditions on the incoming context.
    fn validate_input(&self, ctx: &RunContext) -> StageResult<()>;

    /// Do the stage's work.
    fn execute(&self, ctx: RunContext) -> StageResult<RunContext>;

    /// Check post-conditions on the produced context.
    fn validate_output(&self, _ctx: &RunContext) -> StageResult<()> {
        Ok(())
    }
}
