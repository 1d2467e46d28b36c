//! apksigner wrapper: sign, then verify the result.

use std::path::Path;

use super::types::KeyMaterial;
use super::Signer;
use crate::config::ToolSettings;
use crate::orchestrator::{StageError, StageResult};
use crate::process::{ToolCommand, ToolRunner};

pub struct Apksigner {
    program: String,
    runner: ToolRunner,
}

impl Apksigner {
    pub fn new(settings: &ToolSettings, runner: ToolRunner) -> Self {
        Self {
            program: settings.apksigner.clone(),
            runner,
        }
    }

    /// `apksigner sign --ks .. --ks-pass .. --ks-key-alias .. [--key-pass ..] --out <signed> <unsigned>`
    pub fn sign_command(&self, unsigned: &Path, output: &Path, key: &KeyMaterial) -> ToolCommand {
        let mut cmd = ToolCommand::new(&self.program)
            .arg("sign")
            .arg("--ks")
            .path(&key.keystore)
            .arg("--ks-pass")
            .secret(&key.keystore_password)
            .arg("--ks-key-alias")
            .arg(&key.alias);
        if let Some(key_pass) = &key.key_password {
            cmd = cmd.arg("--key-pass").secret(key_pass);
        }
        cmd.arg("--out").path(output).path(unsigned)
    }

    /// `apksigner verify --verbose <signed>`
    pub fn verify_command(&self, signed: &Path) -> ToolCommand {
        ToolCommand::new(&self.program)
            .arg("verify")
            .arg("--verbose")
            .path(signed)
    }
}

impl Signer for Apksigner {
    fn sign(&self, unsigned: &Path, output: &Path, key: &KeyMaterial) -> StageResult<()> {
        if !unsigned.is_file() {
            return Err(StageError::file_not_found(unsigned.display().to_string()));
        }
        if !key.keystore.is_file() {
            return Err(StageError::file_not_found(key.keystore.display().to_string()));
        }
        self.runner.run(&self.sign_command(unsigned, output, key))?;
        if !output.is_file() {
            return Err(StageError::invalid_output(format!(
                "apksigner produced no file at {}",
                output.display()
            )));
        }
        Ok(())
    }

    fn verify(&self, signed: &Path) -> StageResult<()> {
        let output = self
            .runner
            .run(&self.verify_command(signed))
            .map_err(|e| match e {
                StageError::CommandFailed { message, .. } => {
                    StageError::verification_failed(message)
                }
                other => other,
            })?;

        // With --verbose a good signature prints "Verifies".
        if !output.stdout.contains("Verifies") {
            return Err(StageError::verification_failed(format!(
                "{} did not verify",
                signed.display()
            )));
        }
        Ok(())
    }
}
