//! CLI command implementations

pub mod access;
pub mod clean;
pub mod clear;
pub mod config;
pub mod evict;
pub mod reclaim;
pub mod stats;
pub mod validate;
pub mod watch;

pub use access::{estimate, execute as access};
pub use clean::execute as clean;
pub use clear::execute as clear;
pub use config::execute as config;
pub use evict::execute as evict;
pub use reclaim::execute as reclaim;
pub use stats::execute as stats;
pub use validate::{execute as validate, sanitize};
pub use watch::execute as watch;

use crate::cache::CacheStateManager;
use crate::config::{CacheSettings, Config};
use crate::error::TierResult;

/// Open the cache state for a one-shot command
pub(crate) async fn open_cache(config: &Config) -> TierResult<CacheStateManager> {
    CacheStateManager::open(CacheSettings::from(config)).await
}
