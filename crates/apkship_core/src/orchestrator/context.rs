//! Run context threaded through the pipeline.
//!
//! `RunContext` is created once per run from configuration constants and
//! handed to each stage by value. A stage returns the context it received,
//! enriched with what it produced. Populated fields are never cleared; the
//! engine checks this after every stage with [`RunContext::extends`].

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::errors::{StageError, StageResult};
use crate::artifacts::validate_version;
use crate::changelog::Changelog;
use crate::config::TargetSettings;

/// Configuration constants describing what is being released.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
    /// Display name, e.g. "Example App".
    pub name: String,
    /// Android package identifier.
    pub package: String,
    /// Page the package is fetched from.
    pub source_url: String,
}

impl TargetInfo {
    pub fn new(
        name: impl Into<String>,
        package: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            source_url: source_url.into(),
        }
    }

    pub fn from_settings(settings: &TargetSettings) -> Self {
        Self::new(&settings.name, &settings.package, &settings.source_url)
    }
}

/// What the current artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Package as fetched from the source.
    Downloaded,
    /// Decompiled directory tree.
    Unpacked,
    /// Rebuilt, unsigned package.
    Repacked,
    /// Signed package, ready for release.
    Signed,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Downloaded => "downloaded",
            ArtifactKind::Unpacked => "unpacked",
            ArtifactKind::Repacked => "repacked",
            ArtifactKind::Signed => "signed",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The most recently produced file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.path.display())
    }
}

/// Accumulated state of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Configuration constants.
    pub target: TargetInfo,

    /// Version label, assigned by the download stage.
    pub version: Option<String>,

    /// Latest artifact, reassigned by each producing stage.
    pub artifact: Option<Artifact>,

    /// Modification notes, appended by the modify stage.
    pub changelog: Changelog,

    /// SHA-256 of the signed package, hex encoded.
    pub checksum: Option<String>,

    /// Release page, set by the release stage.
    pub release_url: Option<String>,

    /// Direct asset download link, set by the release stage.
    pub download_url: Option<String>,

    /// Website page written by the publish-site stage.
    pub site_path: Option<PathBuf>,

    /// When the run started.
    pub started_at: DateTime<Local>,
}

impl RunContext {
    /// Fresh context carrying only configuration constants.
    pub fn new(target: TargetInfo) -> Self {
        Self {
            target,
            version: None,
            artifact: None,
            changelog: Changelog::new(),
            checksum: None,
            release_url: None,
            download_url: None,
            site_path: None,
            started_at: Local::now(),
        }
    }

    /// Version label, rejecting a missing or unusable one.
    pub fn require_version(&self) -> StageResult<&str> {
        let version = self
            .version
            .as_deref()
            .ok_or_else(|| StageError::precondition_failed("no version in context"))?;
        validate_version(version)?;
        Ok(version)
    }

    /// Path of the current artifact, which must be of `kind`.
    pub fn require_artifact(&self, kind: ArtifactKind) -> StageResult<&Path> {
        match &self.artifact {
            None => Err(StageError::precondition_failed(format!(
                "no artifact in context, expected {}",
                kind
            ))),
            Some(artifact) if artifact.kind != kind => {
                Err(StageError::precondition_failed(format!(
                    "expected {} artifact, found {}",
                    kind, artifact
                )))
            }
            Some(artifact) => Ok(&artifact.path),
        }
    }

    pub fn require_release_url(&self) -> StageResult<&str> {
        non_empty(self.release_url.as_deref(), "release URL")
    }

    pub fn require_download_url(&self) -> StageResult<&str> {
        non_empty(self.download_url.as_deref(), "download URL")
    }

    /// Link handed to readers: the asset download, else the release page.
    pub fn public_url(&self) -> StageResult<&str> {
        self.require_download_url()
            .or_else(|_| self.require_release_url())
    }

    /// Short description for stage transition logs.
    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            version: self.version.clone(),
            artifact: self.artifact.as_ref().map(ToString::to_string),
            changelog_entries: self.changelog.len(),
            release_url: self.release_url.clone(),
        }
    }

    /// Check that `self` still carries everything `before` had.
    ///
    /// Populated fields must stay populated, the version must not change
    /// once assigned and the earlier changelog must be an ordered prefix
    /// of the current one.
    pub fn extends(&self, before: &RunContext) -> Result<(), String> {
        if self.target != before.target {
            return Err("target information changed".to_string());
        }
        if let Some(old) = &before.version {
            match &self.version {
                None => return Err("version was cleared".to_string()),
                Some(new) if new != old => {
                    return Err(format!("version changed from '{}' to '{}'", old, new))
                }
                _ => {}
            }
        }
        let kept = [
            ("artifact", before.artifact.is_some(), self.artifact.is_some()),
            ("checksum", before.checksum.is_some(), self.checksum.is_some()),
            ("release URL", before.release_url.is_some(), self.release_url.is_some()),
            ("download URL", before.download_url.is_some(), self.download_url.is_some()),
            ("site path", before.site_path.is_some(), self.site_path.is_some()),
        ];
        for (field, had, has) in kept {
            if had && !has {
                return Err(format!("{} was cleared", field));
            }
        }
        if !before.changelog.is_prefix_of(&self.changelog) {
            return Err("changelog entries were removed or reordered".to_string());
        }
        Ok(())
    }
}

fn non_empty<'a>(value: Option<&'a str>, what: &str) -> StageResult<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(StageError::precondition_failed(format!(
            "no {} in context",
            what
        ))),
    }
}

/// Context fields worth showing at a stage boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSummary {
    pub version: Option<String>,
    pub artifact: Option<String>,
    pub changelog_entries: usize,
    pub release_url: Option<String>,
}

impl fmt::Display for ContextSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version={} artifact={} changelog={}",
            self.version.as_deref().unwrap_or("-"),
            self.artifact.as_deref().unwrap_or("-"),
            self.changelog_entries
        )?;
        if let Some(url) = &self.release_url {
            write!(f, " release={}", url)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::ErrorKind;

    fn ctx() -> RunContext {
        RunContext::new(TargetInfo::new(
            "Example App",
            "com.example.app",
            "https://example.com/download",
        ))
    }

    #[test]
    fn new_context_has_only_constants() {
        let ctx = ctx();
        assert!(ctx.version.is_none());
        assert!(ctx.artifact.is_none());
        assert!(ctx.changelog.is_empty());
        assert_eq!(ctx.target.package, "com.example.app");
    }

    #[test]
    fn require_version_fails_fast() {
        let mut ctx = ctx();
        assert_eq!(
            ctx.require_version().unwrap_err().kind(),
            ErrorKind::Precondition
        );

        ctx.version = Some(String::new());
        assert_eq!(
            ctx.require_version().unwrap_err().kind(),
            ErrorKind::Precondition
        );

        ctx.version = Some("2.3.0".to_string());
        assert_eq!(ctx.require_version().unwrap(), "2.3.0");
    }

    #[test]
    fn require_artifact_checks_kind() {
        let mut ctx = ctx();
        assert!(ctx.require_artifact(ArtifactKind::Downloaded).is_err());

        ctx.artifact = Some(Artifact::new(ArtifactKind::Repacked, "/w/a.apk"));
        let err = ctx.require_artifact(ArtifactKind::Unpacked).unwrap_err();
        assert!(err.to_string().contains("expected unpacked"));
        assert_eq!(
            ctx.require_artifact(ArtifactKind::Repacked).unwrap(),
            Path::new("/w/a.apk")
        );
    }

    #[test]
    fn public_url_prefers_download() {
        let mut ctx = ctx();
        assert!(ctx.public_url().is_err());

        ctx.release_url = Some("https://r".to_string());
        assert_eq!(ctx.public_url().unwrap(), "https://r");

        ctx.download_url = Some("https://d".to_string());
        assert_eq!(ctx.public_url().unwrap(), "https://d");
    }

    #[test]
    fn extends_accepts_growth() {
        let before = ctx();
        let mut after = before.clone();
        after.version = Some("1.0".to_string());
        after.artifact = Some(Artifact::new(ArtifactKind::Downloaded, "/w/x.apk"));
        after.changelog.push("a");
        assert!(after.extends(&before).is_ok());
    }

    #[test]
    fn extends_rejects_shrinking() {
        let mut before = ctx();
        before.version = Some("1.0".to_string());
        before.changelog.extend(["a", "b"]);

        let mut cleared = before.clone();
        cleared.version = None;
        assert!(cleared.extends(&before).is_err());

        let mut changed = before.clone();
        changed.version = Some("1.1".to_string());
        assert!(changed.extends(&before).is_err());

        let mut truncated = before.clone();
        truncated.changelog = Changelog::new();
        truncated.changelog.push("a");
        assert!(truncated.extends(&before).is_err());
    }

    #[test]
    fn summary_display() {
        let mut ctx = ctx();
        ctx.version = Some("2.3.0".to_string());
        ctx.artifact = Some(Artifact::new(ArtifactKind::Signed, "/w/s.apk"));
        let text = ctx.summary().to_string();
        assert_eq!(text, "version=2.3.0 artifact=signed:/w/s.apk changelog=0");
    }
}
