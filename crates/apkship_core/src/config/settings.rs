//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Required options deserialize to empty values when absent and are
//! rejected by `ConfigManager` validation, so every missing key can be
//! reported in one go.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// The application being repackaged.
    #[serde(default)]
    pub target: TargetSettings,

    /// How the download page is scraped.
    #[serde(default)]
    pub source: SourceSettings,

    /// Keystore used to sign the repacked package.
    #[serde(default)]
    pub signing: SigningSettings,

    /// GitHub release destination.
    #[serde(default)]
    pub release: ReleaseSettings,

    /// Telegram notification destination.
    #[serde(default)]
    pub notify: NotifySettings,

    /// Optional website page regenerated after each release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<SiteSettings>,

    /// Working directory roots.
    #[serde(default)]
    pub paths: PathSettings,

    /// External tool locations.
    #[serde(default)]
    pub tools: ToolSettings,

    /// Per-stage time limits.
    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Modifications applied to the unpacked package.
    #[serde(default)]
    pub transform: TransformSettings,
}

/// Identity of the package being processed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetSettings {
    /// Display name, e.g. "Example App". Used for file and release naming.
    #[serde(default)]
    pub name: String,

    /// Android package identifier, e.g. "com.example.app".
    #[serde(default)]
    pub package: String,

    /// Page the package is downloaded from.
    #[serde(default)]
    pub source_url: String,
}

/// Scraping rules for the download page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Regex whose first capture group is the download link.
    #[serde(default = "default_link_pattern")]
    pub link_pattern: String,

    /// Regex whose first capture group is the version label.
    #[serde(default = "default_version_pattern")]
    pub version_pattern: String,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_link_pattern() -> String {
    r#"<a[^>]*class="[^"]*download-button[^"]*"[^>]*href="([^"]+)""#.to_string()
}

fn default_version_pattern() -> String {
    r#"<span[^>]*class="[^"]*version-number[^"]*"[^>]*>\s*([^<]+?)\s*<"#.to_string()
}

fn default_user_agent() -> String {
    format!("apkship/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            link_pattern: default_link_pattern(),
            version_pattern: default_version_pattern(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Keystore reference for apksigner.
///
/// Passwords use apksigner's own syntax: `pass:<literal>`, `env:<VAR>` or
/// `file:<path>`, and are handed to the tool unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningSettings {
    #[serde(default)]
    pub keystore: String,

    #[serde(default)]
    pub key_alias: String,

    #[serde(default)]
    pub keystore_password: String,

    /// Defaults to the keystore password when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_password: Option<String>,
}

/// GitHub release destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseSettings {
    /// Repository in `owner/name` form.
    #[serde(default)]
    pub repo: String,

    /// Literal API token. Prefer `token_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable holding the API token.
    #[serde(default = "default_github_token_env")]
    pub token_env: String,

    #[serde(default = "default_github_api")]
    pub api_base: String,

    #[serde(default)]
    pub draft: bool,

    #[serde(default)]
    pub prerelease: bool,
}

fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            repo: String::new(),
            token: None,
            token_env: default_github_token_env(),
            api_base: default_github_api(),
            draft: false,
            prerelease: false,
        }
    }
}

/// Telegram notification destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifySettings {
    #[serde(default)]
    pub chat_id: String,

    /// Literal bot token. Prefer `bot_token_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Environment variable holding the bot token.
    #[serde(default = "default_telegram_token_env")]
    pub bot_token_env: String,

    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

fn default_telegram_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_string()
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            chat_id: String::new(),
            bot_token: None,
            bot_token_env: default_telegram_token_env(),
            api_base: default_telegram_api(),
        }
    }
}

/// Website page regenerated from a template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteSettings {
    /// HTML template with `{{VERSION}}`-style placeholders.
    pub template: String,

    /// Page written on each release.
    pub output: String,
}

/// Working directory roots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root for downloads, decompiled trees, repacked and signed packages.
    #[serde(default)]
    pub workspace: String,

    /// Folder for log files.
    #[serde(default)]
    pub logs: String,
}

/// External tool locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_apktool")]
    pub apktool: String,

    #[serde(default = "default_apksigner")]
    pub apksigner: String,

    /// Pass `--use-aapt2` when rebuilding.
    #[serde(default = "default_true")]
    pub use_aapt2: bool,
}

fn default_apktool() -> String {
    "apktool".to_string()
}

fn default_apksigner() -> String {
    "apksigner".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            apktool: default_apktool(),
            apksigner: default_apksigner(),
            use_aapt2: true,
        }
    }
}

/// Per-stage time limits. A value of 0 disables the limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_stage_timeout")]
    pub default_secs: u64,

    /// Overrides keyed by stage name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stages: BTreeMap<String, u64>,
}

fn default_stage_timeout() -> u64 {
    1800
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            default_secs: default_stage_timeout(),
            stages: BTreeMap::new(),
        }
    }
}

impl TimeoutSettings {
    /// Limit for stages without an override, `None` when disabled.
    pub fn default_limit(&self) -> Option<Duration> {
        seconds(self.default_secs)
    }

    /// Effective limit for a stage, `None` when disabled.
    pub fn limit_for(&self, stage: &str) -> Option<Duration> {
        match self.stages.get(stage) {
            Some(secs) => seconds(*secs),
            None => self.default_limit(),
        }
    }

    /// The longer of two stage limits; unlimited wins.
    pub fn longest_of(&self, first: &str, second: &str) -> Option<Duration> {
        Some(self.limit_for(first)?.max(self.limit_for(second)?))
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is unset.
    #[serde(default)]
    pub level: LogLevel,

    /// Also write `apkship.log` under `paths.logs`.
    #[serde(default = "default_true")]
    pub file: bool,

    /// Number of tool output lines replayed when a tool fails.
    #[serde(default = "default_error_tail")]
    pub error_tail: usize,
}

fn default_error_tail() -> usize {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: true,
            error_tail: default_error_tail(),
        }
    }
}

/// Modifications applied to the decompiled tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformSettings {
    /// Add `android:debuggable="true"` to the manifest.
    #[serde(default = "default_true")]
    pub debuggable: bool,

    /// Suffix appended to the `app_name` string resource. Empty disables.
    #[serde(default = "default_app_name_suffix")]
    pub app_name_suffix: String,

    /// Literal smali rewrites, applied in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub smali: Vec<SmaliRewriteSettings>,
}

fn default_app_name_suffix() -> String {
    "Mod".to_string()
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            debuggable: true,
            app_name_suffix: default_app_name_suffix(),
            smali: Vec::new(),
        }
    }
}

/// One literal find/replace over matching smali files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmaliRewriteSettings {
    /// Changelog entry recorded when the rewrite is present.
    pub description: String,

    /// Only files whose path contains this fragment are considered.
    #[serde(default)]
    pub path_contains: String,

    pub find: String,

    pub replace: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_sections() {
        let settings: Settings = toml::from_str("[target]\nname = \"Example\"\n").unwrap();

        assert_eq!(settings.target.name, "Example");
        assert_eq!(settings.tools.apktool, "apktool");
        assert!(settings.tools.use_aapt2);
        assert_eq!(settings.release.token_env, "GITHUB_TOKEN");
        assert_eq!(settings.timeouts.default_secs, 1800);
        assert!(settings.site.is_none());
        assert!(settings.paths.workspace.is_empty());
    }

    #[test]
    fn timeout_overrides_and_disable() {
        let mut timeouts = TimeoutSettings::default();
        timeouts.stages.insert("download".to_string(), 60);
        timeouts.stages.insert("notify".to_string(), 0);

        assert_eq!(timeouts.limit_for("download"), Some(Duration::from_secs(60)));
        assert_eq!(timeouts.limit_for("notify"), None);
        assert_eq!(timeouts.limit_for("sign"), Some(Duration::from_secs(1800)));
        assert_eq!(timeouts.default_limit(), Some(Duration::from_secs(1800)));
        assert_eq!(timeouts.longest_of("download", "sign"), Some(Duration::from_secs(1800)));
        assert_eq!(timeouts.longest_of("download", "notify"), None);
    }

    #[test]
    fn smali_rewrites_parse_in_order() {
        let content = r#"
[[transform.smali]]
description = "first"
find = "a"
replace = "b"

[[transform.smali]]
description = "second"
path_contains = "Login"
find = "c"
replace = "d"
"#;
        let settings: Settings = toml::from_str(content).unwrap();
        let names: Vec<&str> = settings
            .transform
            .smali
            .iter()
            .map(|s| s.description.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(settings.transform.smali[1].path_contains, "Login");
    }
}
