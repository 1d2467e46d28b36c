//! Website page rendered from an HTML template.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::types::SitePage;
use super::SiteRenderer;
use crate::changelog::{escape_html, render_html_list};
use crate::config::SiteSettings;
use crate::orchestrator::{StageError, StageResult};

/// Substitutes `{{PLACEHOLDER}}` markers and writes the page.
pub struct TemplateSite {
    template: PathBuf,
    output: PathBuf,
}

impl TemplateSite {
    pub fn new(template: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            output: output.into(),
        }
    }

    pub fn from_settings(settings: &SiteSettings) -> Self {
        Self::new(&settings.template, &settings.output)
    }

    pub fn output(&self) -> &Path {
        &self.output
    }
}

impl SiteRenderer for TemplateSite {
    fn render(&self, page: &SitePage) -> StageResult<PathBuf> {
        if !self.template.is_file() {
            return Err(StageError::file_not_found(self.template.display().to_string()));
        }
        let template = fs::read_to_string(&self.template)
            .map_err(|e| StageError::io_error("reading site template", e))?;

        write_atomic(&self.output, &fill_template(&template, page))?;
        tracing::info!(path = %self.output.display(), "website page written");
        Ok(self.output.clone())
    }
}

/// Replace every placeholder. URLs and the version are HTML-escaped.
pub fn fill_template(template: &str, page: &SitePage) -> String {
    template
        .replace("{{VERSION}}", &escape_html(&page.version))
        .replace("{{RELEASE_DATE}}", &escape_html(&page.release_date))
        .replace("{{DOWNLOAD_URL}}", &escape_html(&page.download_url))
        .replace("{{RELEASE_URL}}", &escape_html(&page.release_url))
        .replace("{{CHANGELOG}}", &render_html_list(&page.changelog))
}

fn write_atomic(path: &Path, content: &str) -> StageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| StageError::io_error("creating site directory", e))?;
        }
    }

    let temp_path = path.with_extension("html.tmp");
    {
        let mut file = fs::File::create(&temp_path)
            .map_err(|e| StageError::io_error("creating site page", e))?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| StageError::io_error("writing site page", e))?;
    }
    fs::rename(&temp_path, path).map_err(|e| StageError::io_error("replacing site page", e))
}
