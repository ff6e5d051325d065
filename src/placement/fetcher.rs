//! Provider fetcher abstraction
//!
//! Fetchers know how to pull bytes for one provider (usually by wrapping
//! that provider's CLI). The coordinator only ever hands them a staging
//! location; it never lets them write to a final path.

use crate::error::{TierError, TierResult};
use crate::provider::Provider;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Per-provider artifact fetcher
#[async_trait]
pub trait ProviderFetcher: Send + Sync {
    /// Estimated artifact size in GB
    async fn estimate_size_gb(&self, model_id: &str) -> TierResult<f64>;

    /// Materialize `model_id` at `staging`
    ///
    /// `staging` exists as an empty directory. A fetcher may populate it,
    /// or replace it with a single file for single-file artifacts.
    /// Returns `Ok(false)` when the fetch ran but did not succeed.
    async fn fetch_to_path(&self, model_id: &str, staging: &Path) -> TierResult<bool>;
}

/// Fetchers keyed by provider
#[derive(Default, Clone)]
pub struct FetcherRegistry {
    fetchers: HashMap<Provider, Arc<dyn ProviderFetcher>>,
}

impl FetcherRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the fetcher for `provider`
    pub fn register(&mut self, provider: Provider, fetcher: Arc<dyn ProviderFetcher>) {
        self.fetchers.insert(provider, fetcher);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, provider: Provider, fetcher: Arc<dyn ProviderFetcher>) -> Self {
        self.register(provider, fetcher);
        self
    }

    /// Look up the fetcher for `provider`
    pub fn resolve(&self, provider: Provider) -> TierResult<Arc<dyn ProviderFetcher>> {
        self.fetchers
            .get(&provider)
            .cloned()
            .ok_or_else(|| TierError::UnknownProvider(provider.to_string()))
    }

    /// Providers with a registered fetcher
    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<_> = self.fetchers.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Behavior, StubFetcher};
    use super::*;

    #[test]
    fn resolve_registered() {
        let registry =
            FetcherRegistry::new().with(Provider::Ollama, StubFetcher::new(Behavior::LeaveEmpty));
        assert!(registry.resolve(Provider::Ollama).is_ok());
        assert_eq!(registry.providers(), vec![Provider::Ollama]);
    }

    #[test]
    fn resolve_missing_is_unknown_provider() {
        let registry = FetcherRegistry::new();
        let err = registry.resolve(Provider::Vllm).err().unwrap();
        assert!(matches!(err, TierError::UnknownProvider(ref p) if p == "vllm"));
    }
}
