//! Sign stage - signs the rebuilt package and verifies the signature.

use std::sync::Arc;

use super::SIGN;
use crate::adapters::{KeyMaterial, Signer};
use crate::artifacts::{sha256_file, ArtifactStore};
use crate::logging::RunLogger;
use crate::orchestrator::context::{Artifact, ArtifactKind, RunContext};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::Stage;

pub struct SignStage {
    signer: Arc<dyn Signer>,
    key: KeyMaterial,
    store: ArtifactStore,
    logger: Arc<RunLogger>,
}

impl SignStage {
    pub fn new(
        signer: Arc<dyn Signer>,
        key: KeyMaterial,
        store: ArtifactStore,
        logger: Arc<RunLogger>,
    ) -> Self {
        Self {
            signer,
            key,
            store,
            logger,
        }
    }
}

impl Stage for SignStage {
    fn name(&self) -> &str {
        SIGN
    }

    fn description(&self) -> &str {
        "Sign the package and verify the signature"
    }

    fn validate_input(&self, ctx: &RunContext) -> StageResult<()> {
        ctx.require_version()?;
        ctx.require_artifact(ArtifactKind::Repacked)?;
        Ok(())
    }

    fn execute(&self, mut ctx: RunContext) -> StageResult<RunContext> {
        let output = self.store.signed_path(ctx.require_version()?)?;
        let unsigned = ctx.require_artifact(ArtifactKind::Repacked)?;

        self.signer.sign(unsigned, &output, &self.key)?;
        self.signer.verify(&output)?;

        let checksum = sha256_file(&output)
            .map_err(|e| StageError::io_error(format!("hashing {}", output.display()), e))?;
        self.logger
            .info(&format!("Signature verified, SHA-256 {}", checksum));

        ctx.checksum = Some(checksum);
        ctx.artifact = Some(Artifact::new(ArtifactKind::Signed, output));
        Ok(ctx)
    }

    fn validate_output(&self, ctx: &RunContext) -> StageResult<()> {
        let path = ctx.require_artifact(ArtifactKind::Signed)?;
        if !path.is_file() {
            return Err(StageError::file_not_found(path.display().to_string()));
        }
        if ctx.checksum.is_none() {
            return Err(StageError::invalid_output("signed package has no checksum"));
        }
        Ok(())
    }
}
