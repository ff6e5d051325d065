//! Predictive pre-fetch hook

use crate::cache::entry::UsagePattern;
use crate::error::TierResult;
use async_trait::async_trait;
use tracing::info;

/// Receives hints that a model is about to be in demand
///
/// Hints are fire-and-forget: an implementation that starts a fetch should
/// spawn it rather than hold up the predictive pass.
#[async_trait]
pub trait PrefetchTrigger: Send + Sync {
    async fn trigger_load(&self, model_id: &str, pattern: &UsagePattern) -> TierResult<()>;
}

/// Trigger that only logs the hint
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTrigger;

#[async_trait]
impl PrefetchTrigger for LogTrigger {
    async fn trigger_load(&self, model_id: &str, pattern: &UsagePattern) -> TierResult<()> {
        info!(
            "Predicted demand for {} at {:02}:00 ({:.1} requests/day)",
            model_id, pattern.peak_hour, pattern.avg_daily_requests
        );
        Ok(())
    }
}
