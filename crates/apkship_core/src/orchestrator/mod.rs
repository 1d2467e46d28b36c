//! Pipeline orchestrator for a release run.
//!
//! This module provides the engine that chains the release stages into
//! one all-or-nothing sequence. A `RunContext` is moved through the
//! stages, each returning it enriched; the first failure ends the run.
//!
//! # Architecture
//!
//! ```text
//! Pipeline
//!     ├── Stage: download
//!     ├── Stage: decompile
//!     ├── Stage: modify
//!     ├── Stage: recompile
//!     ├── Stage: sign
//!     ├── Stage: release
//!     ├── Stage: publish-site   (only with [site])
//!     └── Stage: notify
//! ```
//!
//! # Example
//!
//! ```ignore
//! use apkship_core::orchestrator::{create_standard_pipeline, RunContext, TargetInfo};
//!
//! let pipeline = create_standard_pipeline(&settings, &adapters, logger);
//! let ctx = RunContext::new(TargetInfo::from_settings(&settings.target));
//!
//! match pipeline.run(ctx) {
//!     Ok(report) => println!("Released {:?}", report.context.release_url),
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```

mod context;
mod errors;
mod pipeline;
mod stage;
pub mod steps;

pub use context::{Artifact, ArtifactKind, ContextSummary, RunContext, TargetInfo};
pub use errors::{ErrorKind, PipelineError, PipelineResult, StageError, StageResult};
pub use pipeline::{CancelHandle, Pipeline, RunReport, TimeoutPolicy};
pub use stage::Stage;
pub use steps::{
    DecompileStage, DownloadStage, ModifyStage, NotifyStage, PublishSiteStage, RecompileStage,
    ReleaseStage, SignStage, STANDARD_STAGES,
};

use std::sync::Arc;

use crate::adapters::{Adapters, KeyMaterial};
use crate::artifacts::ArtifactStore;
use crate::config::Settings;
use crate::logging::RunLogger;

/// Create the standard pipeline with all stages in order.
///
/// 1. download - locate and fetch the package
/// 2. decompile - unpack it
/// 3. modify - apply patches, fill the changelog
/// 4. recompile - rebuild the package
/// 5. sign - sign and verify, record the checksum
/// 6. release - publish with release notes
/// 7. publish-site - regenerate the website (only when configured)
/// 8. notify - announce the release
pub fn create_standard_pipeline(
    settings: &Settings,
    adapters: &Adapters,
    logger: Arc<RunLogger>,
) -> Pipeline {
    let store = ArtifactStore::new(&settings.paths.workspace, &settings.target.name);

    let mut pipeline = Pipeline::new(Arc::clone(&logger))
        .with_timeouts(TimeoutPolicy::from_settings(&settings.timeouts))
        .with_stage(DownloadStage::new(
            Arc::clone(&adapters.fetcher),
            store.clone(),
            Arc::clone(&logger),
        ))
        .with_stage(DecompileStage::new(
            Arc::clone(&adapters.package_tool),
            store.clone(),
        ))
        .with_stage(ModifyStage::new(
            Arc::clone(&adapters.patcher),
            Arc::clone(&logger),
        ))
        .with_stage(RecompileStage::new(
            Arc::clone(&adapters.package_tool),
            store.clone(),
        ))
        .with_stage(SignStage::new(
            Arc::clone(&adapters.signer),
            KeyMaterial::from_settings(&settings.signing),
            store,
            Arc::clone(&logger),
        ))
        .with_stage(ReleaseStage::new(
            Arc::clone(&adapters.publisher),
            Arc::clone(&logger),
        ));

    if let Some(site) = &adapters.site {
        pipeline.add_stage(PublishSiteStage::new(Arc::clone(site)));
    }

    pipeline.with_stage(NotifyStage::new(Arc::clone(&adapters.announcer)))
}
