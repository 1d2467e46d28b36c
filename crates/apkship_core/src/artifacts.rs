//! Working directories and deterministic artifact naming.
//!
//! Every file a run produces lives under one workspace root and is named
//! from `(target name, version, stage)`, so re-running a version lands on
//! the same paths and two versions never share a file.
//!
//! ```text
//! <workspace>/
//!     downloads/   example_app_2.3.0.apk
//!     decompiled/  example_app_2.3.0/
//!     recompiled/  example_app_mod_2.3.0.apk
//!     signed/      example_app_mod_2.3.0_signed.apk
//! ```

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::orchestrator::{StageError, StageResult};

/// Longest version label accepted for naming.
pub const MAX_VERSION_LEN: usize = 64;

/// Owns the workspace layout for one target.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    slug: String,
}

impl ArtifactStore {
    /// Create a store for `target_name` rooted at `root`.
    ///
    /// Does not touch the filesystem; call `ensure_dirs()` before use.
    pub fn new(root: impl Into<PathBuf>, target_name: &str) -> Self {
        Self {
            root: root.into(),
            slug: slugify(target_name),
        }
    }

    /// Workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File-safe form of the target name.
    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn decompiled_dir(&self) -> PathBuf {
        self.root.join("decompiled")
    }

    pub fn recompiled_dir(&self) -> PathBuf {
        self.root.join("recompiled")
    }

    pub fn signed_dir(&self) -> PathBuf {
        self.root.join("signed")
    }

    /// Create the workspace root and all stage directories.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [
            self.root.clone(),
            self.downloads_dir(),
            self.decompiled_dir(),
            self.recompiled_dir(),
            self.signed_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Raw package fetched from the source.
    pub fn download_path(&self, version: &str) -> StageResult<PathBuf> {
        validate_version(version)?;
        Ok(self
            .downloads_dir()
            .join(format!("{}_{}.apk", self.slug, version)))
    }

    /// Directory the package is unpacked into.
    pub fn unpack_dir(&self, version: &str) -> StageResult<PathBuf> {
        validate_version(version)?;
        Ok(self
            .decompiled_dir()
            .join(format!("{}_{}", self.slug, version)))
    }

    /// Rebuilt, unsigned package.
    pub fn repack_path(&self, version: &str) -> StageResult<PathBuf> {
        validate_version(version)?;
        Ok(self
            .recompiled_dir()
            .join(format!("{}_mod_{}.apk", self.slug, version)))
    }

    /// Signed package, the release asset.
    pub fn signed_path(&self, version: &str) -> StageResult<PathBuf> {
        validate_version(version)?;
        Ok(self
            .signed_dir()
            .join(format!("{}_mod_{}_signed.apk", self.slug, version)))
    }
}

/// Lowercase the name, mapping spaces and anything not file/URL safe to `_`.
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if slug.is_empty() {
        "package".to_string()
    } else {
        slug
    }
}

/// Check that a version label is usable in file names, tags and URLs.
///
/// Accepts ASCII letters, digits, `.`, `_`, `-` and `+`; must start with a
/// letter or digit. An empty label is rejected, never replaced.
pub fn validate_version(version: &str) -> StageResult<()> {
    if version.is_empty() {
        return Err(StageError::precondition_failed("version is empty"));
    }
    if version.len() > MAX_VERSION_LEN {
        return Err(StageError::invalid_input(format!(
            "version '{}' exceeds {} characters",
            version, MAX_VERSION_LEN
        )));
    }
    let starts_ok = version
        .chars()
        .next()
        .map(|c| c.is_ascii_alphanumeric())
        .unwrap_or(false);
    let chars_ok = version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+'));
    if !starts_ok || !chars_ok {
        return Err(StageError::invalid_input(format!(
            "version '{}' is not file/URL safe",
            version
        )));
    }
    Ok(())
}

/// Hex SHA-256 of a file, streamed.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
