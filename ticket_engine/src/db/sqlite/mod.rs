//! SQLite backend.
//!
//! The functions in the submodules take a `&mut SqliteConnection` and are not atomic on their own. [`SqliteDatabase`]
//! composes them inside transactions where the storage contracts require it.
mod db;

pub mod counters;
pub mod reports;
pub mod store_configs;
pub mod tickets;

use std::{str::FromStr, time::Duration};

pub use db::SqliteDatabase;
use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

use crate::traits::StorageError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, StorageError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    info!("🗃️ Connected to {url} with up to {max_connections} connections");
    Ok(pool)
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
