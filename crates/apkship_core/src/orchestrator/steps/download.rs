//! Download stage - finds the current version and fetches the package.

use std::fs;
use std::sync::Arc;

use super::DOWNLOAD;
use crate::adapters::Fetcher;
use crate::artifacts::{validate_version, ArtifactStore};
use crate::logging::RunLogger;
use crate::orchestrator::context::{Artifact, ArtifactKind, RunContext};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::Stage;

pub struct DownloadStage {
    fetcher: Arc<dyn Fetcher>,
    store: ArtifactStore,
    logger: Arc<RunLogger>,
}

impl DownloadStage {
    pub fn new(fetcher: Arc<dyn Fetcher>, store: ArtifactStore, logger: Arc<RunLogger>) -> Self {
        Self {
            fetcher,
            store,
            logger,
        }
    }
}

impl Stage for DownloadStage {
    fn name(&self) -> &str {
        DOWNLOAD
    }

    fn description(&self) -> &str {
        "Locate the latest package and download it"
    }

    fn validate_input(&self, ctx: &RunContext) -> StageResult<()> {
        if ctx.target.source_url.trim().is_empty() {
            return Err(StageError::precondition_failed("no source URL configured"));
        }
        Ok(())
    }

    fn execute(&self, mut ctx: RunContext) -> StageResult<RunContext> {
        let listing = self.fetcher.discover(&ctx.target.source_url)?;
        validate_version(&listing.version)?;
        self.logger.info(&format!(
            "Found {} version {} at {}",
            ctx.target.name, listing.version, listing.download_url
        ));

        self.store
            .ensure_dirs()
            .map_err(|e| StageError::io_error("creating workspace", e))?;
        let dest = self.store.download_path(&listing.version)?;

        let bytes = self.fetcher.download(&listing.download_url, &dest)?;
        self.logger
            .info(&format!("Downloaded {} bytes to {}", bytes, dest.display()));

        ctx.version = Some(listing.version);
        ctx.artifact = Some(Artifact::new(ArtifactKind::Downloaded, dest));
        Ok(ctx)
    }

    fn validate_output(&self, ctx: &RunContext) -> StageResult<()> {
        ctx.require_version()?;
        let path = ctx.require_artifact(ArtifactKind::Downloaded)?;
        let size = fs::metadata(path)
            .map_err(|e| StageError::io_error(format!("checking {}", path.display()), e))?
            .len();
        if size == 0 {
            return Err(StageError::invalid_output(format!(
                "downloaded package {} is empty",
                path.display()
            )));
        }
        Ok(())
    }
}
