//! Download page scraping and package download over HTTP.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_LENGTH;
use reqwest::Url;

use super::types::ReleaseListing;
use super::Fetcher;
use crate::config::SourceSettings;
use crate::orchestrator::{StageError, StageResult};

/// Fetcher that scrapes the download page with regex patterns.
pub struct HttpFetcher {
    client: Client,
    link_pattern: Regex,
    version_pattern: Regex,
}

impl HttpFetcher {
    /// Build the client and compile the scraping patterns.
    pub fn new(settings: &SourceSettings) -> StageResult<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| StageError::http("building HTTP client", e.to_string()))?;

        Ok(Self {
            client,
            link_pattern: compile("source.link_pattern", &settings.link_pattern)?,
            version_pattern: compile("source.version_pattern", &settings.version_pattern)?,
        })
    }

    /// Extract the listing from page HTML fetched from `page_url`.
    pub fn scrape(&self, page_url: &str, html: &str) -> StageResult<ReleaseListing> {
        let link = first_capture(&self.link_pattern, html)
            .ok_or_else(|| StageError::parse_error("download page", "no download link found"))?;
        let version = first_capture(&self.version_pattern, html)
            .ok_or_else(|| StageError::parse_error("download page", "no version label found"))?;

        Ok(ReleaseListing {
            version: version.trim().to_string(),
            download_url: resolve_link(page_url, &decode_entities(link))?,
        })
    }
}

impl Fetcher for HttpFetcher {
    fn discover(&self, source_url: &str) -> StageResult<ReleaseListing> {
        tracing::debug!(url = source_url, "fetching download page");
        let response = self
            .client
            .get(source_url)
            .send()?
            .error_for_status()?;
        let html = response.text()?;
        self.scrape(source_url, &html)
    }

    fn download(&self, url: &str, dest: &Path) -> StageResult<u64> {
        let mut response = self.client.get(url).send()?.error_for_status()?;
        let expected = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let partial = dest.with_extension("apk.part");
        let written = write_partial(&mut response, &partial)?;

        if written == 0 {
            let _ = fs::remove_file(&partial);
            return Err(StageError::http(
                format!("downloading {}", url),
                "response body was empty",
            ));
        }
        if let Some(expected) = expected {
            if expected != written {
                let _ = fs::remove_file(&partial);
                return Err(StageError::http(
                    format!("downloading {}", url),
                    format!("incomplete download: {} of {} bytes", written, expected),
                ));
            }
        }

        fs::rename(&partial, dest)
            .map_err(|e| StageError::io_error("moving download into place", e))?;
        Ok(written)
    }
}

fn compile(key: &str, pattern: &str) -> StageResult<Regex> {
    Regex::new(pattern).map_err(|e| StageError::invalid_input(format!("{}: {}", key, e)))
}

fn first_capture<'h>(pattern: &Regex, haystack: &'h str) -> Option<&'h str> {
    pattern
        .captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Resolve `link` against the page it was found on.
fn resolve_link(page_url: &str, link: &str) -> StageResult<String> {
    let base = Url::parse(page_url)
        .map_err(|e| StageError::parse_error("source URL", e.to_string()))?;
    let resolved = base
        .join(link)
        .map_err(|e| StageError::parse_error("download link", e.to_string()))?;
    Ok(resolved.to_string())
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Copy `reader` into `partial`, removing the file again if the copy fails.
fn write_partial(reader: &mut impl Read, partial: &Path) -> StageResult<u64> {
    let mut file =
        File::create(partial).map_err(|e| StageError::io_error("creating download file", e))?;
    let copied = io::copy(reader, &mut file)
        .map_err(|e| StageError::io_error("writing download", e))
        .and_then(|written| {
            file.flush()
                .map(|_| written)
                .map_err(|e| StageError::io_error("flushing download", e))
        });
    if copied.is_err() {
        drop(file);
        let _ = fs::remove_file(partial);
    }
    copied
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
  <h1>Example App</h1>
  <span class="label version-number">
     2.3.0
  </span>
  <a id="dl" class="btn download-button" href="/files/example.apk?a=1&amp;b=2">Download</a>
</body></html>"#;

    /// Yields some bytes, then fails like a dropped connection.
    struct BrokenBody {
        sent: bool,
    }

    impl Read for BrokenBody {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            self.sent = true;
            buf[..2].copy_from_slice(b"PK");
            Ok(2)
        }
    }

    #[test]
    fn failed_copy_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join("example.apk.part");

        let err = write_partial(&mut BrokenBody { sent: false }, &partial).unwrap_err();

        assert_eq!(err.kind(), crate::orchestrator::ErrorKind::Io);
        assert!(!partial.exists());
    }

    #[test]
    fn completed_copy_keeps_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join("example.apk.part");

        let written = write_partial(&mut &b"PK\x03\x04"[..], &partial).unwrap();

        assert_eq!(written, 4);
        assert_eq!(fs::read(&partial).unwrap(), b"PK\x03\x04");
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&SourceSettings::default()).unwrap()
    }

    #[test]
    fn scrapes_link_and_version() {
        let listing = fetcher()
            .scrape("https://example.com/apps/example", PAGE)
            .unwrap();
        assert_eq!(listing.version, "2.3.0");
        assert_eq!(
            listing.download_url,
            "https://example.com/files/example.apk?a=1&b=2"
        );
    }

    #[test]
    fn missing_version_is_an_error() {
        let page = r#"<a class="download-button" href="x.apk">x</a>"#;
        let err = fetcher().scrape("https://example.com/", page).unwrap_err();
        assert!(err.to_string().contains("no version label"));
    }

    #[test]
    fn missing_link_is_an_error() {
        let page = r#"<span class="version-number">1.0</span>"#;
        let err = fetcher().scrape("https://example.com/", page).unwrap_err();
        assert!(err.to_string().contains("no download link"));
    }

    #[test]
    fn absolute_links_are_kept() {
        assert_eq!(
            resolve_link("https://example.com/a/b", "https://cdn.example.net/x.apk").unwrap(),
            "https://cdn.example.net/x.apk"
        );
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let settings = SourceSettings {
            link_pattern: "(unclosed".to_string(),
            ..SourceSettings::default()
        };
        assert!(HttpFetcher::new(&settings).is_err());
    }
}
