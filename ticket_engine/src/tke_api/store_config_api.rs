use std::{fmt::Debug, time::Duration};

use log::*;

use crate::{
    db_types::StoreConfig,
    tke_api::{errors::StoreConfigError, store_config_cache::StoreConfigCache},
    traits::{StoreConfigStorage, TaxSettingSource},
};

/// `StoreConfigApi` answers "does this shop price its products with tax included?".
///
/// Lookups go to the cache first, then to storage, and finally to the commerce platform. Whatever the platform
/// returns is persisted, so the remote call is made once per shop.
pub struct StoreConfigApi<B, S> {
    db: B,
    source: S,
    cache: StoreConfigCache,
}

impl<B, S> Debug for StoreConfigApi<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StoreConfigApi (ttl: {:?})", self.cache.ttl())
    }
}

impl<B, S> StoreConfigApi<B, S> {
    pub fn new(db: B, source: S) -> Self {
        Self { db, source, cache: StoreConfigCache::default() }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache = StoreConfigCache::new(ttl);
        self
    }

    pub async fn invalidate(&self, shop: &str) {
        self.cache.invalidate(shop).await;
    }

    pub async fn clear(&self) {
        self.cache.clear().await;
    }
}

impl<B, S> StoreConfigApi<B, S>
where
    B: StoreConfigStorage,
    S: TaxSettingSource,
{
    /// The stored configuration for `shop`, if there is one. The commerce platform is not consulted.
    pub async fn get_store_config(&self, shop: &str) -> Result<Option<StoreConfig>, StoreConfigError> {
        if let Some(config) = self.cache.get(shop).await {
            return Ok(Some(config));
        }
        let config = self.db.fetch_store_config(shop).await?;
        if let Some(config) = &config {
            self.cache.set(config.clone()).await;
        }
        Ok(config)
    }

    pub async fn taxes_included(&self, shop: &str) -> Result<bool, StoreConfigError> {
        if let Some(config) = self.get_store_config(shop).await? {
            return Ok(config.taxes_included);
        }
        info!("🪛️ No stored configuration for {shop}. Asking the commerce platform");
        let taxes_included = self.source.fetch_taxes_included(shop).await?;
        let config = self.save_store_config(StoreConfig::new(shop, taxes_included)).await?;
        Ok(config.taxes_included)
    }

    /// Persists `config` and refreshes the local cache entry.
    pub async fn save_store_config(&self, config: StoreConfig) -> Result<StoreConfig, StoreConfigError> {
        let saved = self.db.save_store_config(&config).await?;
        debug!("🪛️ Saved store config for {}: taxes included = {}", saved.shop, saved.taxes_included);
        self.cache.set(saved.clone()).await;
        Ok(saved)
    }
}
