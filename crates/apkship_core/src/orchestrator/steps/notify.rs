//! Notify stage - announces the release.

use std::sync::Arc;

use super::NOTIFY;
use crate::adapters::{Announcement, Announcer};
use crate::changelog::render_announcement;
use crate::orchestrator::context::RunContext;
use crate::orchestrator::errors::StageResult;
use crate::orchestrator::stage::Stage;

pub struct NotifyStage {
    announcer: Arc<dyn Announcer>,
}

impl NotifyStage {
    pub fn new(announcer: Arc<dyn Announcer>) -> Self {
        Self { announcer }
    }
}

impl Stage for NotifyStage {
    fn name(&self) -> &str {
        NOTIFY
    }

    fn description(&self) -> &str {
        "Announce the release"
    }

    fn validate_input(&self, ctx: &RunContext) -> StageResult<()> {
        ctx.require_version()?;
        ctx.public_url()?;
        Ok(())
    }

    fn execute(&self, ctx: RunContext) -> StageResult<RunContext> {
        let version = ctx.require_version()?;
        let url = ctx.public_url()?;

        self.announcer.announce(&Announcement {
            version: version.to_string(),
            text: render_announcement(&ctx.target.name, version, url),
            url: url.to_string(),
        })?;
        Ok(ctx)
    }
}
