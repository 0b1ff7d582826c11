use sqlx::SqliteConnection;

use crate::{db_types::StoreConfig, traits::StorageError};

pub async fn fetch_store_config(shop: &str, conn: &mut SqliteConnection) -> Result<Option<StoreConfig>, StorageError> {
    let config = sqlx::query_as::<_, StoreConfig>(
        "SELECT shop, taxes_included, updated_at FROM store_configs WHERE shop = $1",
    )
    .bind(shop)
    .fetch_optional(conn)
    .await?;
    Ok(config)
}

pub async fn upsert_store_config(config: &StoreConfig, conn: &mut SqliteConnection) -> Result<StoreConfig, StorageError> {
    let config = sqlx::query_as::<_, StoreConfig>(
        r#"
            INSERT INTO store_configs (shop, taxes_included, updated_at) VALUES ($1, $2, $3)
            ON CONFLICT (shop) DO UPDATE SET taxes_included = excluded.taxes_included, updated_at = excluded.updated_at
            RETURNING shop, taxes_included, updated_at
        "#,
    )
    .bind(&config.shop)
    .bind(config.taxes_included)
    .bind(config.updated_at)
    .fetch_one(conn)
    .await?;
    Ok(config)
}
