//! Adapters performing the side effects behind each stage.
//!
//! Stages only see the traits below; the production implementations talk
//! to the network and to external tools, and tests substitute fakes.
//!
//! | Trait          | Used by                  | Production          |
//! |----------------|--------------------------|---------------------|
//! | `Fetcher`      | download                 | `HttpFetcher`       |
//! | `PackageTool`  | decompile, recompile     | `Apktool`           |
//! | `Patcher`      | modify                   | `PatchSet`          |
//! | `Signer`       | sign                     | `Apksigner`         |
//! | `Publisher`    | release                  | `GithubPublisher`   |
//! | `SiteRenderer` | publish-site             | `TemplateSite`      |
//! | `Announcer`    | notify                   | `TelegramAnnouncer` |

mod apksigner;
mod apktool;
mod fetch;
mod github;
mod patches;
mod site;
mod telegram;
mod types;

pub use apksigner::Apksigner;
pub use apktool::Apktool;
pub use fetch::HttpFetcher;
pub use github::{upload_endpoint, GithubPublisher, APK_CONTENT_TYPE};
pub use patches::{AppNameSuffix, DebuggableManifest, Patch, PatchOutcome, PatchSet, SmaliRewrite};
pub use site::{fill_template, TemplateSite};
pub use telegram::TelegramAnnouncer;
pub use types::{
    Announcement, KeyMaterial, PublishedRelease, ReleaseListing, ReleaseRequest, SitePage,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{ConfigError, ConfigResult, Settings};
use crate::logging::RunLogger;
use crate::orchestrator::steps::{DECOMPILE, RECOMPILE, SIGN};
use crate::orchestrator::StageResult;
use crate::process::ToolRunner;

/// Locates and downloads the package.
pub trait Fetcher: Send + Sync {
    /// Find the current version and its download link.
    fn discover(&self, source_url: &str) -> StageResult<ReleaseListing>;

    /// Download `url` to `dest`, returning the byte count.
    fn download(&self, url: &str, dest: &Path) -> StageResult<u64>;
}

/// Unpacks a package into a directory and rebuilds it.
pub trait PackageTool: Send + Sync {
    fn unpack(&self, package: &Path, output_dir: &Path) -> StageResult<()>;

    fn repack(&self, source_dir: &Path, output: &Path) -> StageResult<()>;
}

/// Modifies an unpacked tree.
pub trait Patcher: Send + Sync {
    /// Returns the descriptions of the modifications present afterwards,
    /// in declared order. An empty list is a valid result.
    fn apply(&self, unpacked_dir: &Path) -> StageResult<Vec<String>>;
}

/// Signs a package and checks the signature.
pub trait Signer: Send + Sync {
    fn sign(&self, unsigned: &Path, output: &Path, key: &KeyMaterial) -> StageResult<()>;

    /// Fails when the signature does not verify.
    fn verify(&self, signed: &Path) -> StageResult<()>;
}

/// Creates a release and attaches the package.
pub trait Publisher: Send + Sync {
    fn publish(&self, request: &ReleaseRequest) -> StageResult<PublishedRelease>;
}

/// Regenerates the website page.
pub trait SiteRenderer: Send + Sync {
    /// Returns the path of the written page.
    fn render(&self, page: &SitePage) -> StageResult<PathBuf>;
}

/// Announces a release.
pub trait Announcer: Send + Sync {
    fn announce(&self, announcement: &Announcement) -> StageResult<()>;
}

/// One implementation per adapter role.
#[derive(Clone)]
pub struct Adapters {
    pub fetcher: Arc<dyn Fetcher>,
    pub package_tool: Arc<dyn PackageTool>,
    pub patcher: Arc<dyn Patcher>,
    pub signer: Arc<dyn Signer>,
    pub publisher: Arc<dyn Publisher>,
    /// Present only when a website is configured.
    pub site: Option<Arc<dyn SiteRenderer>>,
    pub announcer: Arc<dyn Announcer>,
}

impl Adapters {
    /// Production adapters for validated settings.
    pub fn from_settings(settings: &Settings, logger: Arc<RunLogger>) -> ConfigResult<Self> {
        let runner = ToolRunner::new(logger);
        let user_agent = settings.source.user_agent.as_str();

        let fetcher = HttpFetcher::new(&settings.source)
            .map_err(|e| ConfigError::invalid("source", e.to_string()))?;
        let publisher = GithubPublisher::new(&settings.release, settings.github_token()?, user_agent)
            .map_err(|e| ConfigError::invalid("release", e.to_string()))?;
        let announcer = TelegramAnnouncer::new(&settings.notify, settings.telegram_token()?, user_agent)
            .map_err(|e| ConfigError::invalid("notify", e.to_string()))?;

        Ok(Self {
            fetcher: Arc::new(fetcher),
            package_tool: Arc::new(Apktool::new(
                &settings.tools,
                runner.clone().with_limit(settings.timeouts.longest_of(DECOMPILE, RECOMPILE)),
            )),
            patcher: Arc::new(PatchSet::from_settings(
                &settings.target.name,
                &settings.transform,
            )),
            signer: Arc::new(Apksigner::new(
                &settings.tools,
                runner.with_limit(settings.timeouts.limit_for(SIGN)),
            )),
            publisher: Arc::new(publisher),
            site: settings
                .site
                .as_ref()
                .map(|site| Arc::new(TemplateSite::from_settings(site)) as Arc<dyn SiteRenderer>),
            announcer: Arc::new(announcer),
        })
    }
}
