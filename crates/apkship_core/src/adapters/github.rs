//! GitHub release publisher (REST API v3).

use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};

use super::types::{PublishedRelease, ReleaseRequest};
use super::Publisher;
use crate::config::ReleaseSettings;
use crate::orchestrator::{StageError, StageResult};

/// Content type of the uploaded asset.
pub const APK_CONTENT_TYPE: &str = "application/vnd.android.package-archive";

const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Deserialize)]
struct CreatedRelease {
    html_url: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadedAsset {
    browser_download_url: String,
}

pub struct GithubPublisher {
    client: Client,
    api_base: String,
    repo: String,
    token: String,
    draft: bool,
    prerelease: bool,
}

impl GithubPublisher {
    pub fn new(settings: &ReleaseSettings, token: impl Into<String>, user_agent: &str) -> StageResult<Self> {
        // No client timeout; the stage time limit bounds uploads.
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| StageError::http("building HTTP client", e.to_string()))?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            repo: settings.repo.clone(),
            token: token.into(),
            draft: settings.draft,
            prerelease: settings.prerelease,
        })
    }

    /// JSON body of the create-release call.
    pub fn release_payload(&self, request: &ReleaseRequest) -> Value {
        json!({
            "tag_name": request.tag,
            "name": request.title,
            "body": request.notes,
            "draft": self.draft,
            "prerelease": self.prerelease,
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn create_release(&self, request: &ReleaseRequest) -> StageResult<CreatedRelease> {
        let url = format!("{}/repos/{}/releases", self.api_base, self.repo);
        let response = self
            .authorized(self.client.post(&url))
            .json(&self.release_payload(request))
            .send()?;
        parse_response(response, "creating release")
    }

    fn upload_asset(&self, upload_url: &str, request: &ReleaseRequest) -> StageResult<UploadedAsset> {
        let name = asset_name(&request.asset)?;
        let url = upload_endpoint(upload_url, &name, &request.asset_label)?;
        let bytes = fs::read(&request.asset)
            .map_err(|e| StageError::io_error(format!("reading {}", request.asset.display()), e))?;

        tracing::info!(asset = %name, bytes = bytes.len(), "uploading release asset");
        let response = self
            .authorized(self.client.post(url))
            .header(CONTENT_TYPE, APK_CONTENT_TYPE)
            .body(bytes)
            .send()?;
        parse_response(response, "uploading asset")
    }
}

impl Publisher for GithubPublisher {
    fn publish(&self, request: &ReleaseRequest) -> StageResult<PublishedRelease> {
        let release = self.create_release(request)?;
        tracing::info!(url = %release.html_url, tag = %request.tag, "release created");

        let asset = self.upload_asset(&release.upload_url, request)?;
        Ok(PublishedRelease {
            release_url: release.html_url,
            download_url: asset.browser_download_url,
        })
    }
}

/// Upload URL with the `{?name,label}` template replaced by a real query.
pub fn upload_endpoint(upload_url: &str, name: &str, label: &str) -> StageResult<Url> {
    let base = upload_url.split('{').next().unwrap_or(upload_url);
    let mut url = Url::parse(base)
        .map_err(|e| StageError::parse_error("upload_url", e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("name", name)
        .append_pair("label", label);
    Ok(url)
}

fn asset_name(path: &Path) -> StageResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StageError::invalid_input(format!("asset path {} has no file name", path.display())))
}

fn parse_response<T: for<'de> Deserialize<'de>>(response: Response, operation: &str) -> StageResult<T> {
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        return Err(StageError::http(
            operation,
            format!("HTTP {}: {}", status.as_u16(), api_message(&body)),
        ));
    }
    serde_json::from_str(&body).map_err(|e| StageError::parse_error("GitHub response", e.to_string()))
}

/// GitHub error bodies carry a `message` field; fall back to the raw body.
fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request() -> ReleaseRequest {
        ReleaseRequest {
            version: "2.3.0".to_string(),
            tag: "v2.3.0".to_string(),
            title: "Example App Mod 2.3.0".to_string(),
            notes: "# Example App Mod v2.3.0".to_string(),
            asset: PathBuf::from("/w/signed/example_app_mod_2.3.0_signed.apk"),
            asset_label: "Example App Mod 2.3.0".to_string(),
        }
    }

    #[test]
    fn payload_carries_tag_title_and_flags() {
        let settings = ReleaseSettings {
            repo: "owner/repo".to_string(),
            prerelease: true,
            ..ReleaseSettings::default()
        };
        let publisher = GithubPublisher::new(&settings, "t", "apkship-test").unwrap();
        let payload = publisher.release_payload(&request());

        assert_eq!(payload["tag_name"], "v2.3.0");
        assert_eq!(payload["name"], "Example App Mod 2.3.0");
        assert_eq!(payload["draft"], false);
        assert_eq!(payload["prerelease"], true);
    }

    #[test]
    fn upload_endpoint_strips_template() {
        let url = upload_endpoint(
            "https://uploads.github.com/repos/o/r/releases/1/assets{?name,label}",
            "example_app_mod_2.3.0_signed.apk",
            "Example App Mod 2.3.0",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://uploads.github.com/repos/o/r/releases/1/assets?name=example_app_mod_2.3.0_signed.apk&label=Example+App+Mod+2.3.0"
        );
    }

    #[test]
    fn asset_name_is_file_name() {
        assert_eq!(
            asset_name(&request().asset).unwrap(),
            "example_app_mod_2.3.0_signed.apk"
        );
    }

    #[test]
    fn api_message_prefers_message_field() {
        assert_eq!(
            api_message(r#"{"message":"Validation Failed","errors":[]}"#),
            "Validation Failed"
        );
        assert_eq!(api_message("Bad Gateway"), "Bad Gateway");
    }
}
