//! Publish-site stage - regenerates the website page for the release.

use std::sync::Arc;

use super::PUBLISH_SITE;
use crate::adapters::{SitePage, SiteRenderer};
use crate::orchestrator::context::RunContext;
use crate::orchestrator::errors::StageResult;
use crate::orchestrator::stage::Stage;

pub struct PublishSiteStage {
    renderer: Arc<dyn SiteRenderer>,
}

impl PublishSiteStage {
    pub fn new(renderer: Arc<dyn SiteRenderer>) -> Self {
        Self { renderer }
    }
}

impl Stage for PublishSiteStage {
    fn name(&self) -> &str {
        PUBLISH_SITE
    }

    fn description(&self) -> &str {
        "Render the website page for the new release"
    }

    fn validate_input(&self, ctx: &RunContext) -> StageResult<()> {
        ctx.require_version()?;
        ctx.require_release_url()?;
        ctx.require_download_url()?;
        Ok(())
    }

    fn execute(&self, mut ctx: RunContext) -> StageResult<RunContext> {
        let page = SitePage {
            version: ctx.require_version()?.to_string(),
            release_date: ctx.started_at.format("%Y-%m-%d").to_string(),
            download_url: ctx.require_download_url()?.to_string(),
            release_url: ctx.require_release_url()?.to_string(),
            changelog: ctx.changelog.clone(),
        };

        let written = self.renderer.render(&page)?;
        ctx.site_path = Some(written);
        Ok(ctx)
    }
}
