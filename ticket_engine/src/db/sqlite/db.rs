use std::fmt::Debug;

use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use log::*;
use sqlx::SqlitePool;

use super::{counters, new_pool, reports, store_configs, tickets};
use crate::{
    db_types::{Counter, CounterUpdate, ReportDocument, ReportStatus, StoreConfig, Ticket, TicketSource},
    traits::{
        CommitOutcome,
        CounterStorage,
        CreateOutcome,
        ReportStorage,
        StorageError,
        StoreConfigStorage,
        TicketStorage,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date. Safe to call on every start.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Migrations complete for {}", self.url);
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl CounterStorage for SqliteDatabase {
    async fn fetch_counter(&self, id: &str, partition_key: &str) -> Result<Option<Counter>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        counters::fetch_counter(id, partition_key, &mut conn).await
    }

    async fn create_counter(&self, id: &str, partition_key: &str) -> Result<CreateOutcome<Counter>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        counters::insert_counter(id, partition_key, &mut conn).await
    }
}

impl TicketStorage for SqliteDatabase {
    async fn fetch_ticket(&self, source: &TicketSource, partition_key: &str) -> Result<Option<Ticket>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        tickets::fetch_ticket(source, partition_key, &mut conn).await
    }

    /// In a single atomic transaction,
    /// * moves the counter forward, provided nobody else has done so since it was read,
    /// * inserts the ticket, provided no ticket exists for the same source.
    ///
    /// If either step fails, the transaction is rolled back.
    async fn commit_ticket(
        &self,
        counter: &CounterUpdate,
        ticket: &Ticket,
    ) -> Result<CommitOutcome<Ticket>, StorageError> {
        let mut tx = self.pool.begin().await?;
        if !counters::apply_update(counter, &mut tx).await? {
            tx.rollback().await?;
            debug!("🗃️ Counter {} moved on before ticket {} could be committed", counter.id, ticket.id);
            return Ok(CommitOutcome::StaleCounter);
        }
        match tickets::insert_ticket(ticket, &mut tx).await? {
            CreateOutcome::Created(ticket) => {
                tx.commit().await?;
                debug!("🗃️ Ticket {} committed for {}", ticket.id, ticket.source);
                Ok(CommitOutcome::Committed(ticket))
            },
            CreateOutcome::AlreadyExists => {
                tx.rollback().await?;
                debug!("🗃️ A ticket for {} already exists. Rolled back {}", ticket.source, ticket.id);
                Ok(CommitOutcome::Duplicate)
            },
        }
    }

    fn tickets_in_range(
        &self,
        partition_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxStream<'_, Result<Ticket, StorageError>> {
        tickets::tickets_in_range(&self.pool, partition_key.to_string(), start, end)
    }
}

impl ReportStorage for SqliteDatabase {
    async fn fetch_report(&self, year: i32, month: u32) -> Result<Option<ReportDocument>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        reports::fetch_report(year, month, &mut conn).await
    }

    async fn fetch_report_by_id(&self, id: &str) -> Result<Option<ReportDocument>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        reports::fetch_report_by_id(id, &mut conn).await
    }

    async fn replace_report(&self, report: &ReportDocument) -> Result<ReportDocument, StorageError> {
        let mut conn = self.pool.acquire().await?;
        reports::replace_report(report, &mut conn).await?.ok_or_else(|| StorageError::ReportNotFound(report.id.clone()))
    }

    async fn commit_report(
        &self,
        counter: &CounterUpdate,
        report: &ReportDocument,
    ) -> Result<CommitOutcome<ReportDocument>, StorageError> {
        let mut tx = self.pool.begin().await?;
        if !counters::apply_update(counter, &mut tx).await? {
            tx.rollback().await?;
            debug!("🗃️ Counter {} moved on before report {} could be committed", counter.id, report.id);
            return Ok(CommitOutcome::StaleCounter);
        }
        match reports::insert_report(report, &mut tx).await? {
            CreateOutcome::Created(report) => {
                tx.commit().await?;
                debug!("🗃️ Report {} committed with identifier {}", report.id, report.identifier);
                Ok(CommitOutcome::Committed(report))
            },
            CreateOutcome::AlreadyExists => {
                tx.rollback().await?;
                debug!("🗃️ Report {} already exists. Rolled back", report.id);
                Ok(CommitOutcome::Duplicate)
            },
        }
    }

    async fn update_report_status(
        &self,
        id: &str,
        status: ReportStatus,
        error: Option<String>,
    ) -> Result<ReportDocument, StorageError> {
        let mut conn = self.pool.acquire().await?;
        reports::update_status(id, status, error, &mut conn).await?.ok_or_else(|| StorageError::ReportNotFound(id.into()))
    }

    fn reports_with_status(&self, status: ReportStatus) -> BoxStream<'_, Result<ReportDocument, StorageError>> {
        reports::reports_with_status(&self.pool, status)
    }
}

impl StoreConfigStorage for SqliteDatabase {
    async fn fetch_store_config(&self, shop: &str) -> Result<Option<StoreConfig>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        store_configs::fetch_store_config(shop, &mut conn).await
    }

    async fn save_store_config(&self, config: &StoreConfig) -> Result<StoreConfig, StorageError> {
        let mut conn = self.pool.acquire().await?;
        store_configs::upsert_store_config(config, &mut conn).await
    }
}
