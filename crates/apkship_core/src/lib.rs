//! apkship core - release pipeline engine for Android packages.
//!
//! This crate contains everything except the command line surface:
//! configuration, logging, the run context threaded through the stages,
//! the pipeline engine, and the adapters that perform the side effects
//! (HTTP fetch, apktool, apksigner, GitHub, website, Telegram).

pub mod adapters;
pub mod artifacts;
pub mod changelog;
pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod process;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
