//! Per-process adapter cache.
//!
//! Adapters are built once per (provider, model) pair and reused. Only
//! adapters are cached here; generation results never are.

use moka::future::Cache;
use std::sync::Arc;

use cadence_core::ProviderName;

use crate::providers::{AdapterSource, LlmProvider, ProviderError};

type AdapterKey = (ProviderName, String);

/// Adapter cache using moka.
pub struct AdapterCache {
    cache: Cache<AdapterKey, Arc<dyn LlmProvider>>,
}

impl AdapterCache {
    pub fn new(max_entries: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(max_entries).build(),
        }
    }

    /// Cached adapter for the pair, building it on first use.
    ///
    /// Concurrent callers for the same pair share one build. A failed build
    /// is not cached.
    pub async fn get_or_build(
        &self,
        source: &dyn AdapterSource,
        provider: ProviderName,
        model: &str,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.cache
            .try_get_with((provider, model.to_string()), async { source.build(provider, model) })
            .await
            .map_err(|e: Arc<ProviderError>| (*e).clone())
    }

    pub fn contains(&self, provider: ProviderName, model: &str) -> bool {
        self.cache.contains_key(&(provider, model.to_string()))
    }

    /// Drop every cached adapter.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for AdapterCache {
    fn default() -> Self {
        Self::new(64)
    }
}
