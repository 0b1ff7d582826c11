use crate::{db_types::StoreConfig, traits::StorageError};

#[allow(async_fn_in_trait)]
pub trait StoreConfigStorage {
    async fn fetch_store_config(&self, shop: &str) -> Result<Option<StoreConfig>, StorageError>;

    /// Inserts or overwrites the configuration for `config.shop`.
    async fn save_store_config(&self, config: &StoreConfig) -> Result<StoreConfig, StorageError>;
}
