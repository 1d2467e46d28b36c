//! Fake adapters recording every invocation, plus a harness wiring them
//! into the standard pipeline over a temporary workspace.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use apkship_core::adapters::{
    Adapters, Announcement, Announcer, Fetcher, KeyMaterial, PackageTool, PatchSet,
    PublishedRelease, Publisher, ReleaseListing, ReleaseRequest, Signer, SiteRenderer,
    TemplateSite,
};
use apkship_core::config::{Settings, SiteSettings};
use apkship_core::logging::{LogConfig, LogObserver, RunLogger};
use apkship_core::orchestrator::{
    create_standard_pipeline, Pipeline, RunContext, StageError, StageResult, TargetInfo,
};

pub const TARGET_NAME: &str = "Example App";

pub type Calls = Arc<Mutex<Vec<String>>>;

fn record(calls: &Calls, entry: impl Into<String>) {
    calls.lock().unwrap().push(entry.into());
}

pub struct FakeFetcher {
    pub version: String,
    pub delay: Option<Duration>,
    pub calls: Calls,
}

impl Fetcher for FakeFetcher {
    fn discover(&self, source_url: &str) -> StageResult<ReleaseListing> {
        record(&self.calls, "discover");
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        Ok(ReleaseListing {
            version: self.version.clone(),
            download_url: format!("{}/files/example-{}.apk", source_url, self.version),
        })
    }

    fn download(&self, _url: &str, dest: &Path) -> StageResult<u64> {
        record(&self.calls, format!("download:{}", dest.display()));
        let bytes = b"PK\x03\x04 fake package";
        fs::write(dest, bytes).map_err(|e| StageError::io_error("writing fake download", e))?;
        Ok(bytes.len() as u64)
    }
}

/// Unpacks into a minimal apktool-like tree; `bare` leaves out the files
/// the standard patches look for.
pub struct FakeTool {
    pub bare: bool,
    pub calls: Calls,
}

impl PackageTool for FakeTool {
    fn unpack(&self, _package: &Path, output_dir: &Path) -> StageResult<()> {
        record(&self.calls, format!("unpack:{}", output_dir.display()));
        let io = |e| StageError::io_error("writing fake tree", e);
        fs::create_dir_all(output_dir).map_err(io)?;
        fs::write(output_dir.join("apktool.yml"), "version: 2.9.3\n").map_err(io)?;
        if self.bare {
            return Ok(());
        }
        fs::write(
            output_dir.join("AndroidManifest.xml"),
            r#"<manifest package="com.example.app"><application android:label="@string/app_name"></application></manifest>"#,
        )
        .map_err(io)?;
        let values = output_dir.join("res").join("values");
        fs::create_dir_all(&values).map_err(io)?;
        fs::write(
            values.join("strings.xml"),
            format!(r#"<resources><string name="app_name">{}</string></resources>"#, TARGET_NAME),
        )
        .map_err(io)?;
        Ok(())
    }

    fn repack(&self, _source_dir: &Path, output: &Path) -> StageResult<()> {
        record(&self.calls, format!("repack:{}", output.display()));
        fs::write(output, b"PK\x03\x04 repacked")
            .map_err(|e| StageError::io_error("writing fake package", e))
    }
}

pub struct FakeSigner {
    pub verifies: bool,
    pub calls: Calls,
}

impl Signer for FakeSigner {
    fn sign(&self, unsigned: &Path, output: &Path, _key: &KeyMaterial) -> StageResult<()> {
        record(&self.calls, format!("sign:{}", output.display()));
        fs::copy(unsigned, output)
            .map(|_| ())
            .map_err(|e| StageError::io_error("copying fake package", e))
    }

    fn verify(&self, _signed: &Path) -> StageResult<()> {
        record(&self.calls, "verify");
        if self.verifies {
            Ok(())
        } else {
            Err(StageError::verification_failed("DOES NOT VERIFY"))
        }
    }
}

pub struct FakePublisher {
    pub fails: bool,
    pub calls: Calls,
    pub requests: Arc<Mutex<Vec<ReleaseRequest>>>,
}

impl Publisher for FakePublisher {
    fn publish(&self, request: &ReleaseRequest) -> StageResult<PublishedRelease> {
        record(&self.calls, "publish");
        self.requests.lock().unwrap().push(request.clone());
        if self.fails {
            return Err(StageError::http("creating release", "HTTP 502: Bad Gateway"));
        }
        let asset = request
            .asset
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(PublishedRelease {
            release_url: format!("https://github.com/owner/repo/releases/tag/{}", request.tag),
            download_url: format!(
                "https://github.com/owner/repo/releases/download/{}/{}",
                request.tag, asset
            ),
        })
    }
}

pub struct FakeAnnouncer {
    pub calls: Calls,
    pub announcements: Arc<Mutex<Vec<Announcement>>>,
}

impl Announcer for FakeAnnouncer {
    fn announce(&self, announcement: &Announcement) -> StageResult<()> {
        record(&self.calls, "announce");
        self.announcements.lock().unwrap().push(announcement.clone());
        Ok(())
    }
}

/// Knobs for the fake adapters.
#[derive(Clone)]
pub struct Scenario {
    pub version: String,
    pub verifies: bool,
    pub bare_tree: bool,
    pub publish_fails: bool,
    pub with_site: bool,
    pub fetch_delay: Option<Duration>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            version: "2.3.0".to_string(),
            verifies: true,
            bare_tree: false,
            publish_fails: false,
            with_site: false,
            fetch_delay: None,
        }
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub settings: Settings,
    pub calls: Calls,
    pub requests: Arc<Mutex<Vec<ReleaseRequest>>>,
    pub announcements: Arc<Mutex<Vec<Announcement>>>,
    pub log_lines: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = Settings::default();
        settings.target.name = TARGET_NAME.to_string();
        settings.target.package = "com.example.app".to_string();
        settings.target.source_url = "https://example.com/apps/example-app".to_string();
        settings.signing.keystore = dir.path().join("release.jks").display().to_string();
        settings.signing.key_alias = "release".to_string();
        settings.signing.keystore_password = "pass:secret".to_string();
        settings.release.repo = "owner/repo".to_string();
        settings.notify.chat_id = "@example".to_string();
        settings.paths.workspace = dir.path().join("workspace").display().to_string();
        settings.paths.logs = dir.path().join("logs").display().to_string();

        Self {
            dir,
            settings,
            calls: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            announcements: Arc::new(Mutex::new(Vec::new())),
            log_lines: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn workspace(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.workspace)
    }

    /// Logger whose observer collects every line into `log_lines`.
    pub fn logger(&self) -> Arc<RunLogger> {
        let sink = Arc::clone(&self.log_lines);
        let observer: LogObserver = Box::new(move |_level, line| {
            sink.lock().unwrap().push(line.to_string());
        });
        let config = LogConfig {
            show_timestamps: false,
            ..LogConfig::default()
        };
        Arc::new(RunLogger::new("example_app", config, Some(observer)))
    }

    pub fn adapters(&mut self, scenario: &Scenario) -> Adapters {
        let site: Option<Arc<dyn SiteRenderer>> = if scenario.with_site {
            let template = self.dir.path().join("template.html");
            fs::write(
                &template,
                "<h1>{{VERSION}}</h1><a href=\"{{DOWNLOAD_URL}}\">{{RELEASE_DATE}}</a>{{CHANGELOG}}",
            )
            .expect("template");
            let site = SiteSettings {
                template: template.display().to_string(),
                output: self.dir.path().join("site").join("index.html").display().to_string(),
            };
            self.settings.site = Some(site.clone());
            let renderer: Arc<dyn SiteRenderer> = Arc::new(TemplateSite::from_settings(&site));
            Some(renderer)
        } else {
            None
        };

        Adapters {
            fetcher: Arc::new(FakeFetcher {
                version: scenario.version.clone(),
                delay: scenario.fetch_delay,
                calls: Arc::clone(&self.calls),
            }),
            package_tool: Arc::new(FakeTool {
                bare: scenario.bare_tree,
                calls: Arc::clone(&self.calls),
            }),
            patcher: Arc::new(PatchSet::from_settings(
                &self.settings.target.name,
                &self.settings.transform,
            )),
            signer: Arc::new(FakeSigner {
                verifies: scenario.verifies,
                calls: Arc::clone(&self.calls),
            }),
            publisher: Arc::new(FakePublisher {
                fails: scenario.publish_fails,
                calls: Arc::clone(&self.calls),
                requests: Arc::clone(&self.requests),
            }),
            site,
            announcer: Arc::new(FakeAnnouncer {
                calls: Arc::clone(&self.calls),
                announcements: Arc::clone(&self.announcements),
            }),
        }
    }

    pub fn pipeline(&mut self, scenario: &Scenario) -> Pipeline {
        let adapters = self.adapters(scenario);
        create_standard_pipeline(&self.settings, &adapters, self.logger())
    }

    pub fn context(&self) -> RunContext {
        RunContext::new(TargetInfo::from_settings(&self.settings.target))
    }

    /// Recorded calls with any `:argument` suffix removed.
    pub fn call_names(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.split(':').next().unwrap_or(c).to_string())
            .collect()
    }

    pub fn was_called(&self, name: &str) -> bool {
        self.call_names().iter().any(|c| c == name)
    }
}
