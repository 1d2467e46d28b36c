//! Ordered, append-only changelog and its renderings.
//!
//! The modify stage appends one entry per modification kind in declared
//! order. Release notes, the website list and any other consumer render
//! the same sequence without reordering.

use serde::{Deserialize, Serialize};

/// Ordered, duplicate-free list of modification descriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Changelog {
    entries: Vec<String>,
}

impl Changelog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    ///
    /// Returns `false` (and leaves the changelog untouched) for blank
    /// entries and entries already present.
    pub fn push(&mut self, entry: impl Into<String>) -> bool {
        let entry = entry.into();
        let entry = entry.trim();
        if entry.is_empty() || self.entries.iter().any(|e| e == entry) {
            return false;
        }
        self.entries.push(entry.to_string());
        true
    }

    /// Append entries in order, returning how many were added.
    pub fn extend<I, S>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for entry in entries {
            if self.push(entry) {
                added += 1;
            }
        }
        added
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Whether `self` is an ordered prefix of `later`.
    pub fn is_prefix_of(&self, later: &Changelog) -> bool {
        later.entries.len() >= self.entries.len()
            && self.entries.iter().zip(&later.entries).all(|(a, b)| a == b)
    }
}

/// Markdown release notes for the published release.
pub fn render_release_notes(
    target_name: &str,
    version: &str,
    changelog: &Changelog,
    checksum: Option<&str>,
    date: &str,
) -> String {
    let mut lines = vec![
        format!("# {} Mod v{}", target_name, version),
        format!("Modified on: {}", date),
        String::new(),
    ];

    if changelog.is_empty() {
        lines.push(format!("Release of {} Mod version {}", target_name, version));
    } else {
        lines.push("## Modifications:".to_string());
        lines.extend(changelog.iter().map(|entry| format!("- {}", entry)));
    }

    if let Some(sum) = checksum {
        lines.push(String::new());
        lines.push(format!("SHA-256: `{}`", sum));
    }

    lines.join("\n")
}

/// `<ul>` list of the changelog for the website; empty string when empty.
pub fn render_html_list(changelog: &Changelog) -> String {
    if changelog.is_empty() {
        return String::new();
    }
    let items: String = changelog
        .iter()
        .map(|entry| format!("<li>{}</li>", escape_html(entry)))
        .collect();
    format!("<ul>{}</ul>", items)
}

/// Plain-text announcement body.
pub fn render_announcement(target_name: &str, version: &str, url: &str) -> String {
    format!(
        "New {} Mod v{} is out!\n\nGet the latest features and improvements.\n\nDownload: {}",
        target_name, version, url
    )
}

/// Escape text for inclusion in HTML element content or attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
