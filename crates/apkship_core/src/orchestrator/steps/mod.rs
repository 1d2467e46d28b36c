//! Concrete pipeline stages.
//!
//! Each stage wraps one adapter and owns its slice of the context
//! contract: what it requires, what it adds.

mod decompile;
mod download;
mod modify;
mod notify;
mod publish_site;
mod recompile;
mod release;
mod sign;

pub use decompile::DecompileStage;
pub use download::DownloadStage;
pub use modify::ModifyStage;
pub use notify::NotifyStage;
pub use publish_site::PublishSiteStage;
pub use recompile::RecompileStage;
pub use release::ReleaseStage;
pub use sign::SignStage;

pub const DOWNLOAD: &str = "download";
pub const DECOMPILE: &str = "decompile";
pub const MODIFY: &str = "modify";
pub const RECOMPILE: &str = "recompile";
pub const SIGN: &str = "sign";
pub const RELEASE: &str = "release";
pub const PUBLISH_SITE: &str = "publish-site";
pub const NOTIFY: &str = "notify";

/// Stage names in standard order. `publish-site` runs only when a website
/// is configured.
pub const STANDARD_STAGES: [&str; 8] = [
    DOWNLOAD,
    DECOMPILE,
    MODIFY,
    RECOMPILE,
    SIGN,
    RELEASE,
    PUBLISH_SITE,
    NOTIFY,
];
