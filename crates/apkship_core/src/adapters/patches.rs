//! Declared modifications of a decompiled package.
//!
//! A `PatchSet` applies its patches in declaration order. Every patch
//! reports whether it changed something, found its change already in
//! place, or found nothing to change. Descriptions of applied and
//! already-applied patches make up the changelog delta, so re-running on
//! a modified tree gives the same entries and never duplicates them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::Patcher;
use crate::config::{SmaliRewriteSettings, TransformSettings};
use crate::orchestrator::{StageError, StageResult};

const DEBUGGABLE_ATTR: &str = r#"android:debuggable="true""#;
const DEBUGGABLE_OFF: &str = r#"android:debuggable="false""#;

/// Ledger in the unpacked tree listing the smali rewrites that changed it.
const APPLIED_LEDGER: &str = "apkship-applied.txt";

/// Result of applying one patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The patch changed at least one file.
    Applied,
    /// The change was already present.
    AlreadyApplied,
    /// Nothing to change (file or pattern absent).
    NotApplicable,
}

impl PatchOutcome {
    /// Whether the patch belongs in the changelog.
    pub fn is_present(&self) -> bool {
        matches!(self, PatchOutcome::Applied | PatchOutcome::AlreadyApplied)
    }
}

/// One kind of modification.
pub trait Patch: Send + Sync {
    /// Changelog entry for this modification.
    fn description(&self) -> &str;

    fn apply(&self, root: &Path) -> StageResult<PatchOutcome>;
}

/// Marks the application debuggable in `AndroidManifest.xml`.
pub struct DebuggableManifest;

impl Patch for DebuggableManifest {
    fn description(&self) -> &str {
        "Enabled developer options"
    }

    fn apply(&self, root: &Path) -> StageResult<PatchOutcome> {
        let path = root.join("AndroidManifest.xml");
        let Some(content) = read_optional(&path)? else {
            return Ok(PatchOutcome::NotApplicable);
        };
        if content.contains(DEBUGGABLE_ATTR) {
            return Ok(PatchOutcome::AlreadyApplied);
        }

        let patched = if content.contains(DEBUGGABLE_OFF) {
            content.replacen(DEBUGGABLE_OFF, DEBUGGABLE_ATTR, 1)
        } else {
            match find_application_tag(&content) {
                Some(end) => format!("{} {}{}", &content[..end], DEBUGGABLE_ATTR, &content[end..]),
                None => return Ok(PatchOutcome::NotApplicable),
            }
        };
        write_file(&path, &patched)?;
        Ok(PatchOutcome::Applied)
    }
}

/// Byte offset just past `<application` when it opens an element.
fn find_application_tag(content: &str) -> Option<usize> {
    const TAG: &str = "<application";
    content.match_indices(TAG).find_map(|(idx, _)| {
        let end = idx + TAG.len();
        match content[end..].chars().next() {
            Some(c) if c.is_whitespace() || c == '>' || c == '/' => Some(end),
            _ => None,
        }
    })
}

/// Appends a suffix to the `app_name` string resource.
pub struct AppNameSuffix {
    base_name: String,
    suffix: String,
    description: String,
}

impl AppNameSuffix {
    pub fn new(base_name: impl Into<String>, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        Self {
            base_name: base_name.into(),
            description: format!("Changed app name to include '{}'", suffix),
            suffix,
        }
    }

    fn entry(name: &str) -> String {
        format!(r#"<string name="app_name">{}</string>"#, name)
    }
}

impl Patch for AppNameSuffix {
    fn description(&self) -> &str {
        &self.description
    }

    fn apply(&self, root: &Path) -> StageResult<PatchOutcome> {
        let path = root.join("res").join("values").join("strings.xml");
        let Some(content) = read_optional(&path)? else {
            return Ok(PatchOutcome::NotApplicable);
        };

        let original = Self::entry(&self.base_name);
        let renamed = Self::entry(&format!("{} {}", self.base_name, self.suffix));
        if content.contains(&renamed) {
            return Ok(PatchOutcome::AlreadyApplied);
        }
        if !content.contains(&original) {
            return Ok(PatchOutcome::NotApplicable);
        }
        write_file(&path, &content.replace(&original, &renamed))?;
        Ok(PatchOutcome::Applied)
    }
}

/// Literal find/replace over `smali*/**/*.smali` files.
pub struct SmaliRewrite {
    settings: SmaliRewriteSettings,
}

impl SmaliRewrite {
    pub fn new(settings: SmaliRewriteSettings) -> Self {
        Self { settings }
    }

    /// Candidate files, sorted so the walk order never depends on the filesystem.
    fn candidates(&self, root: &Path) -> StageResult<Vec<PathBuf>> {
        let root_str = root.to_str().ok_or_else(|| {
            StageError::invalid_input(format!("non UTF-8 path {}", root.display()))
        })?;
        let pattern = format!("{}/smali*/**/*.smali", glob::Pattern::escape(root_str));
        let entries = glob::glob(&pattern)
            .map_err(|e| StageError::invalid_input(format!("glob pattern: {}", e)))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| {
                StageError::io_error(format!("reading {}", e.path().display()), io::Error::from(e))
            })?;
            let relative = path.strip_prefix(root).unwrap_or(&path);
            if relative.to_string_lossy().contains(&self.settings.path_contains) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl Patch for SmaliRewrite {
    fn description(&self) -> &str {
        &self.settings.description
    }

    /// A rewrite counts as already applied only when the ledger says it
    /// changed this tree; finding the replacement text proves nothing.
    fn apply(&self, root: &Path) -> StageResult<PatchOutcome> {
        let find = self.settings.find.as_str();
        let mut changed = false;

        for path in self.candidates(root)? {
            let content = read_file(&path)?;
            if content.contains(find) {
                write_file(&path, &content.replace(find, &self.settings.replace))?;
                tracing::debug!(file = %path.display(), "rewrote smali");
                changed = true;
            }
        }

        if changed {
            record_applied(root, &self.settings.description)?;
            Ok(PatchOutcome::Applied)
        } else if ledger_contains(root, &self.settings.description)? {
            Ok(PatchOutcome::AlreadyApplied)
        } else {
            Ok(PatchOutcome::NotApplicable)
        }
    }
}

fn ledger_contains(root: &Path, description: &str) -> StageResult<bool> {
    Ok(read_optional(&root.join(APPLIED_LEDGER))?
        .map(|ledger| ledger.lines().any(|line| line == description))
        .unwrap_or(false))
}

fn record_applied(root: &Path, description: &str) -> StageResult<()> {
    if ledger_contains(root, description)? {
        return Ok(());
    }
    let path = root.join(APPLIED_LEDGER);
    let mut ledger = read_optional(&path)?.unwrap_or_default();
    ledger.push_str(description);
    ledger.push('\n');
    write_file(&path, &ledger)
}

/// Ordered list of patches.
#[derive(Default)]
pub struct PatchSet {
    patches: Vec<Box<dyn Patch>>,
}

impl PatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patch<P: Patch + 'static>(mut self, patch: P) -> Self {
        self.patches.push(Box::new(patch));
        self
    }

    /// Manifest flag, app name, then configured smali rewrites.
    pub fn from_settings(target_name: &str, settings: &TransformSettings) -> Self {
        let mut set = Self::new();
        if settings.debuggable {
            set = set.with_patch(DebuggableManifest);
        }
        if !settings.app_name_suffix.trim().is_empty() {
            set = set.with_patch(AppNameSuffix::new(
                target_name,
                settings.app_name_suffix.trim(),
            ));
        }
        for rewrite in &settings.smali {
            set = set.with_patch(SmaliRewrite::new(rewrite.clone()));
        }
        set
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Apply every patch, returning each outcome in order.
    pub fn apply_all(&self, root: &Path) -> StageResult<Vec<(String, PatchOutcome)>> {
        let mut outcomes = Vec::with_capacity(self.patches.len());
        for patch in &self.patches {
            let outcome = patch.apply(root)?;
            tracing::debug!(patch = patch.description(), ?outcome, "patch evaluated");
            outcomes.push((patch.description().to_string(), outcome));
        }
        Ok(outcomes)
    }
}

impl Patcher for PatchSet {
    fn apply(&self, unpacked_dir: &Path) -> StageResult<Vec<String>> {
        if !unpacked_dir.is_dir() {
            return Err(StageError::file_not_found(unpacked_dir.display().to_string()));
        }
        Ok(self
            .apply_all(unpacked_dir)?
            .into_iter()
            .filter(|(_, outcome)| outcome.is_present())
            .map(|(description, _)| description)
            .collect())
    }
}

fn read_optional(path: &Path) -> StageResult<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    read_file(path).map(Some)
}

fn read_file(path: &Path) -> StageResult<String> {
    fs::read_to_string(path)
        .map_err(|e| StageError::io_error(format!("reading {}", path.display()), e))
}

fn write_file(path: &Path, content: &str) -> StageResult<()> {
    fs::write(path, content)
        .map_err(|e| StageError::io_error(format!("writing {}", path.display()), e))
}
