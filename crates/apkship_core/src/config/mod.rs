//! Configuration management for apkship.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Validation on load, reporting every missing required option at once
//! - Secret resolution from literals or environment variables
//!
//! # Example
//!
//! ```no_run
//! use apkship_core::config::ConfigManager;
//!
//! let mut manager = ConfigManager::new("apkship.toml");
//! manager.load().expect("invalid configuration");
//! println!("Target: {}", manager.settings().target.name);
//! ```

mod manager;
mod settings;

pub use manager::{validate, ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    LoggingSettings, NotifySettings, PathSettings, ReleaseSettings, Settings, SigningSettings,
    SiteSettings, SmaliRewriteSettings, SourceSettings, TargetSettings, TimeoutSettings,
    ToolSettings, TransformSettings,
};
