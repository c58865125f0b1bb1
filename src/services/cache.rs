use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{ConfigFilter, MatchConfig};
use crate::services::store::{ConfigStore, StoreError};

const ACTIVE_KEY: &str = "config:active";

/// Read-through cache for match configs
///
/// The active config is read once per pair during a batch, so lookups are
/// served from an in-process moka cache with a short TTL. Only successful
/// lookups are cached; `NotFound` and `Ambiguous` always reach the store.
pub struct ConfigCache {
    store: Arc<dyn ConfigStore>,
    entries: moka::future::Cache<String, MatchConfig>,
}

impl ConfigCache {
    pub fn new(store: Arc<dyn ConfigStore>, ttl: Duration) -> Self {
        let entries = moka::future::CacheBuilder::new(64).time_to_live(ttl).build();

        Self { store, entries }
    }

    fn key_for(filter: &ConfigFilter) -> String {
        if *filter == ConfigFilter::active() {
            return ACTIVE_KEY.to_string();
        }
        format!(
            "config:{}:{}:{}",
            filter.id.map(|id| id.to_string()).unwrap_or_default(),
            filter.version.map(|v| v.to_string()).unwrap_or_default(),
            filter.is_active.map(|a| a.to_string()).unwrap_or_default(),
        )
    }

    /// Drop every cached config
    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
        tracing::debug!("Invalidated match config cache");
    }
}

#[async_trait]
impl ConfigStore for ConfigCache {
    async fn config(&self, filter: &ConfigFilter) -> Result<MatchConfig, StoreError> {
        let key = Self::key_for(filter);

        if let Some(config) = self.entries.get(&key).await {
            tracing::trace!("Config cache hit: {}", key);
            return Ok(config);
        }

        tracing::trace!("Config cache miss: {}", key);
        let config = self.store.config(filter).await?;
        self.entries.insert(key, config.clone()).await;
        Ok(config)
    }
}
