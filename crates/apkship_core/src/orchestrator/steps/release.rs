//! Release stage - publishes the signed package with release notes.

use std::sync::Arc;

use super::RELEASE;
use crate::adapters::{Publisher, ReleaseRequest};
use crate::changelog::render_release_notes;
use crate::logging::RunLogger;
use crate::orchestrator::context::{ArtifactKind, RunContext};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::Stage;

pub struct ReleaseStage {
    publisher: Arc<dyn Publisher>,
    logger: Arc<RunLogger>,
}

impl ReleaseStage {
    pub fn new(publisher: Arc<dyn Publisher>, logger: Arc<RunLogger>) -> Self {
        Self { publisher, logger }
    }

    /// Tag, title and notes for the context's version.
    pub fn build_request(ctx: &RunContext) -> StageResult<ReleaseRequest> {
        let version = ctx.require_version()?;
        let asset = ctx.require_artifact(ArtifactKind::Signed)?;
        let title = format!("{} Mod {}", ctx.target.name, version);
        let notes = render_release_notes(
            &ctx.target.name,
            version,
            &ctx.changelog,
            ctx.checksum.as_deref(),
            &ctx.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        );

        Ok(ReleaseRequest {
            version: version.to_string(),
            tag: format!("v{}", version),
            asset_label: title.clone(),
            title,
            notes,
            asset: asset.to_path_buf(),
        })
    }
}

impl Stage for ReleaseStage {
    fn name(&self) -> &str {
        RELEASE
    }

    fn description(&self) -> &str {
        "Create the release and upload the signed package"
    }

    fn validate_input(&self, ctx: &RunContext) -> StageResult<()> {
        ctx.require_version()?;
        ctx.require_artifact(ArtifactKind::Signed)?;
        Ok(())
    }

    fn execute(&self, mut ctx: RunContext) -> StageResult<RunContext> {
        let request = Self::build_request(&ctx)?;
        self.logger.info(&format!(
            "Publishing {} with {} changelog entries",
            request.tag,
            ctx.changelog.len()
        ));

        let published = self.publisher.publish(&request)?;
        self.logger
            .info(&format!("Release available at {}", published.release_url));

        ctx.release_url = Some(published.release_url);
        ctx.download_url = Some(published.download_url);
        Ok(ctx)
    }

    fn validate_output(&self, ctx: &RunContext) -> StageResult<()> {
        ctx.require_release_url()
            .and_then(|_| ctx.require_download_url())
            .map_err(|_| StageError::invalid_output("publisher returned an empty URL"))?;
        Ok(())
    }
}
