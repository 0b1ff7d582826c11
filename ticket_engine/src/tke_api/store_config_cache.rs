use std::{collections::HashMap, time::Duration};

use log::*;
use tokio::{sync::RwLock, time::Instant};

use crate::db_types::StoreConfig;

pub const DEFAULT_STORE_CONFIG_TTL: Duration = Duration::from_secs(300);

/// A per-process TTL cache of store configurations, keyed by shop. There is no cross-process invalidation, so a
/// change made by another process becomes visible here after at most `ttl`.
#[derive(Debug)]
pub struct StoreConfigCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (StoreConfig, Instant)>>,
}

impl Default for StoreConfigCache {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_CONFIG_TTL)
    }
}

impl StoreConfigCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, shop: &str) -> Option<StoreConfig> {
        let expired = {
            let entries = self.entries.read().await;
            match entries.get(shop) {
                None => return None,
                Some((config, inserted)) if inserted.elapsed() <= self.ttl => {
                    trace!("🪛️ Store config cache hit for {shop}");
                    return Some(config.clone());
                },
                Some(_) => true,
            }
        };
        if expired {
            debug!("🪛️ Store config cache entry for {shop} expired");
            self.entries.write().await.remove(shop);
        }
        None
    }

    pub async fn set(&self, config: StoreConfig) {
        trace!("🪛️ Caching store config for {}", config.shop);
        self.entries.write().await.insert(config.shop.clone(), (config, Instant::now()));
    }

    pub async fn invalidate(&self, shop: &str) {
        debug!("🪛️ Invalidating store config cache entry for {shop}");
        self.entries.write().await.remove(shop);
    }

    pub async fn clear(&self) {
        debug!("🪛️ Clearing the store config cache");
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_the_ttl() {
        let cache = StoreConfigCache::new(Duration::from_secs(300));
        cache.set(StoreConfig::new("shop-a", true)).await;
        assert!(cache.get("shop-a").await.unwrap().taxes_included);
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get("shop-a").await.is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("shop-a").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_and_clear() {
        let cache = StoreConfigCache::default();
        cache.set(StoreConfig::new("shop-a", true)).await;
        cache.set(StoreConfig::new("shop-b", false)).await;
        cache.invalidate("shop-a").await;
        assert!(cache.get("shop-a").await.is_none());
        assert!(cache.get("shop-b").await.is_some());
        cache.clear().await;
        assert!(cache.get("shop-b").await.is_none());
    }
}
