//! apktool wrapper for unpacking and rebuilding packages.

use std::path::Path;

use super::PackageTool;
use crate::config::ToolSettings;
use crate::orchestrator::{StageError, StageResult};
use crate::process::{ToolCommand, ToolRunner};

pub struct Apktool {
    program: String,
    use_aapt2: bool,
    runner: ToolRunner,
}

impl Apktool {
    pub fn new(settings: &ToolSettings, runner: ToolRunner) -> Self {
        Self {
            program: settings.apktool.clone(),
            use_aapt2: settings.use_aapt2,
            runner,
        }
    }

    /// `apktool d <package> -o <dir> -f`
    pub fn unpack_command(&self, package: &Path, output_dir: &Path) -> ToolCommand {
        ToolCommand::new(&self.program)
            .arg("d")
            .path(package)
            .arg("-o")
            .path(output_dir)
            .arg("-f")
    }

    /// `apktool b <dir> -o <package> [--use-aapt2]`
    pub fn repack_command(&self, source_dir: &Path, output: &Path) -> ToolCommand {
        let cmd = ToolCommand::new(&self.program)
            .arg("b")
            .path(source_dir)
            .arg("-o")
            .path(output);
        if self.use_aapt2 {
            cmd.arg("--use-aapt2")
        } else {
            cmd
        }
    }
}

impl PackageTool for Apktool {
    fn unpack(&self, package: &Path, output_dir: &Path) -> StageResult<()> {
        if !package.is_file() {
            return Err(StageError::file_not_found(package.display().to_string()));
        }
        self.runner.run(&self.unpack_command(package, output_dir))?;
        Ok(())
    }

    fn repack(&self, source_dir: &Path, output: &Path) -> StageResult<()> {
        if !source_dir.is_dir() {
            return Err(StageError::file_not_found(source_dir.display().to_string()));
        }
        self.runner.run(&self.repack_command(source_dir, output))?;
        Ok(())
    }
}
