//! Values exchanged between stages and adapters.

use std::fmt;
use std::path::PathBuf;

use crate::changelog::Changelog;
use crate::config::SigningSettings;

/// What the download page advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseListing {
    /// Version label as shown on the page.
    pub version: String,
    /// Absolute link to the package.
    pub download_url: String,
}

/// Keystore reference handed to the signer.
///
/// Passwords are apksigner password specs (`pass:`, `env:`, `file:`).
#[derive(Clone)]
pub struct KeyMaterial {
    pub keystore: PathBuf,
    pub alias: String,
    pub keystore_password: String,
    pub key_password: Option<String>,
}

impl KeyMaterial {
    pub fn from_settings(settings: &SigningSettings) -> Self {
        Self {
            keystore: PathBuf::from(&settings.keystore),
            alias: settings.key_alias.clone(),
            keystore_password: settings.keystore_password.clone(),
            key_password: settings.key_password.clone(),
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("keystore", &self.keystore)
            .field("alias", &self.alias)
            .field("keystore_password", &"****")
            .field("key_password", &self.key_password.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Everything needed to create one release.
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub version: String,
    /// Git tag, `v{version}`.
    pub tag: String,
    /// Release title.
    pub title: String,
    /// Markdown body.
    pub notes: String,
    /// Signed package to attach.
    pub asset: PathBuf,
    /// Label shown for the attached asset.
    pub asset_label: String,
}

/// Where a published release can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRelease {
    pub release_url: String,
    pub download_url: String,
}

/// Values substituted into the website template.
#[derive(Debug, Clone)]
pub struct SitePage {
    pub version: String,
    pub release_date: String,
    pub download_url: String,
    pub release_url: String,
    pub changelog: Changelog,
}

/// Release announcement.
#[derive(Debug, Clone)]
pub struct Announcement {
    pub version: String,
    /// Message body.
    pub text: String,
    /// Link behind the download button.
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_material_debug_hides_passwords() {
        let key = KeyMaterial {
            keystore: PathBuf::from("release.jks"),
            alias: "release".to_string(),
            keystore_password: "pass:hunter2".to_string(),
            key_password: Some("pass:other".to_string()),
        };
        let shown = format!("{:?}", key);
        assert!(shown.contains("release.jks"));
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("other"));
    }
}
