//! Config manager for loading and validating settings.
//!
//! Key features:
//! - Every missing required option is reported in one error
//! - Secrets are resolved (literal or environment) at load time
//! - Atomic writes for the example config (write to temp file, then rename)

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;

use super::settings::Settings;
use crate::orchestrator::steps::STANDARD_STAGES;

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Config file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Missing required option(s): {}", .0.join(", "))]
    MissingOptions(Vec<String>),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Loads the configuration file and validates it once at startup.
///
/// After `load()` succeeds the settings are read-only; builders receive
/// them by reference.
pub struct ConfigManager {
    /// Path to the config file.
    config_path: PathBuf,
    /// Settings loaded from disk.
    settings: Settings,
}

impl ConfigManager {
    /// Create a new config manager with the given config file path.
    ///
    /// Does not load the config - call `load()` after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get a reference to the current settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Consume the manager, keeping only the settings.
    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Load and validate the config file.
    ///
    /// Returns an error if the file doesn't exist, doesn't parse, or
    /// lacks any required option.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        self.settings = Self::parse(&content)?;
        Ok(())
    }

    /// Parse and validate config content.
    pub fn parse(content: &str) -> ConfigResult<Settings> {
        let settings: Settings = toml::from_str(content)?;
        validate(&settings)?;
        Ok(settings)
    }

    /// Ensure the workspace and logs directories exist.
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        let dirs = [&self.settings.paths.workspace, &self.settings.paths.logs];

        for dir in dirs {
            let path = PathBuf::from(dir);
            if !path.exists() {
                fs::create_dir_all(&path)?;
            }
        }

        Ok(())
    }

    /// Get the logs folder path.
    pub fn logs_folder(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.logs)
    }

    /// Write a commented example config to the manager's path.
    ///
    /// Refuses to overwrite an existing file.
    pub fn write_example(&self) -> ConfigResult<()> {
        if self.config_path.exists() {
            return Err(ConfigError::AlreadyExists(self.config_path.clone()));
        }
        self.atomic_write(EXAMPLE_CONFIG)?;
        Ok(())
    }

    /// Write content to config file atomically.
    ///
    /// Writes to a temp file first, then renames.
    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.config_path.with_extension("toml.tmp");

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

impl Settings {
    /// GitHub API token, from `release.token` or `$<release.token_env>`.
    pub fn github_token(&self) -> ConfigResult<String> {
        resolve_secret(
            self.release.token.as_deref(),
            &self.release.token_env,
            "release.token",
        )
    }

    /// Telegram bot token, from `notify.bot_token` or `$<notify.bot_token_env>`.
    pub fn telegram_token(&self) -> ConfigResult<String> {
        resolve_secret(
            self.notify.bot_token.as_deref(),
            &self.notify.bot_token_env,
            "notify.bot_token",
        )
    }
}

fn resolve_secret(literal: Option<&str>, env_name: &str, key: &str) -> ConfigResult<String> {
    if let Some(value) = literal.filter(|v| !v.trim().is_empty()) {
        return Ok(value.to_string());
    }
    match std::env::var(env_name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingOptions(vec![format!(
            "{} (or ${})",
            key, env_name
        )])),
    }
}

/// Validate a parsed config.
///
/// Missing options are collected and reported together; the first
/// malformed value is reported on its own.
pub fn validate(settings: &Settings) -> ConfigResult<()> {
    let required = [
        ("target.name", &settings.target.name),
        ("target.package", &settings.target.package),
        ("target.source_url", &settings.target.source_url),
        ("signing.keystore", &settings.signing.keystore),
        ("signing.key_alias", &settings.signing.key_alias),
        ("signing.keystore_password", &settings.signing.keystore_password),
        ("release.repo", &settings.release.repo),
        ("notify.chat_id", &settings.notify.chat_id),
        ("paths.workspace", &settings.paths.workspace),
        ("paths.logs", &settings.paths.logs),
    ];

    let mut missing: Vec<String> = required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key.to_string())
        .collect();

    for token in [settings.github_token(), settings.telegram_token()] {
        if let Err(ConfigError::MissingOptions(keys)) = token {
            missing.extend(keys);
        }
    }

    if !missing.is_empty() {
        return Err(ConfigError::MissingOptions(missing));
    }

    let repo_parts: Vec<&str> = settings.release.repo.split('/').collect();
    if repo_parts.len() != 2 || repo_parts.iter().any(|p| p.trim().is_empty()) {
        return Err(ConfigError::invalid(
            "release.repo",
            format!("expected 'owner/name', got '{}'", settings.release.repo),
        ));
    }

    if !settings.target.source_url.starts_with("http://")
        && !settings.target.source_url.starts_with("https://")
    {
        return Err(ConfigError::invalid(
            "target.source_url",
            "must be an http(s) URL",
        ));
    }

    validate_password_ref("signing.keystore_password", &settings.signing.keystore_password)?;
    if let Some(ref key_password) = settings.signing.key_password {
        validate_password_ref("signing.key_password", key_password)?;
    }

    for (key, pattern) in [
        ("source.link_pattern", &settings.source.link_pattern),
        ("source.version_pattern", &settings.source.version_pattern),
    ] {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::invalid(key, e.to_string()))?;
        if regex.captures_len() < 2 {
            return Err(ConfigError::invalid(key, "pattern needs a capture group"));
        }
    }

    for stage in settings.timeouts.stages.keys() {
        if !STANDARD_STAGES.contains(&stage.as_str()) {
            return Err(ConfigError::invalid(
                format!("timeouts.stages.{}", stage),
                format!("unknown stage (expected one of {})", STANDARD_STAGES.join(", ")),
            ));
        }
    }

    for (idx, rewrite) in settings.transform.smali.iter().enumerate() {
        if rewrite.description.trim().is_empty() || rewrite.find.is_empty() {
            return Err(ConfigError::invalid(
                format!("transform.smali[{}]", idx),
                "description and find must be non-empty",
            ));
        }
        if rewrite.replace.contains(&rewrite.find) {
            return Err(ConfigError::invalid(
                format!("transform.smali[{}]", idx),
                "replace must not contain find, or the rewrite applies again on every run",
            ));
        }
    }

    if let Some(ref site) = settings.site {
        if site.template.trim().is_empty() || site.output.trim().is_empty() {
            return Err(ConfigError::invalid(
                "site",
                "template and output are required when [site] is present",
            ));
        }
    }

    Ok(())
}

/// apksigner accepts `pass:`, `env:` and `file:` password sources.
fn validate_password_ref(key: &str, value: &str) -> ConfigResult<()> {
    let valid = ["pass:", "env:", "file:"]
        .iter()
        .any(|prefix| value.starts_with(prefix) && value.len() > prefix.len());
    if valid {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            key,
            "expected 'pass:<password>', 'env:<VAR>' or 'file:<path>'",
        ))
    }
}

const EXAMPLE_CONFIG: &str = r#"# apkship configuration

# The application being repackaged
[target]
name = "Example App"
package = "com.example.app"
source_url = "https://example.com/apps/example-app"

# Keystore used by apksigner (passwords: pass:<pw>, env:<VAR> or file:<path>)
[signing]
keystore = "keys/release.jks"
key_alias = "release"
keystore_password = "env:APKSHIP_KS_PASS"

# GitHub release destination (token read from $GITHUB_TOKEN unless `token` is set)
[release]
repo = "owner/example-app-mod"

# Telegram announcement (token read from $TELEGRAM_BOT_TOKEN unless `bot_token` is set)
[notify]
chat_id = "@example_channel"

# Working directories
[paths]
workspace = "apk_workspace"
logs = ".logs"

# Optional website page
# [site]
# template = "site/template.html"
# output = "site/index.html"

# Per-stage time limits in seconds (0 disables)
[timeouts]
default_secs = 1800
"#;
