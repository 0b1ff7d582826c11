use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

use crate::{
    db_types::{CounterUpdate, Ticket, TicketSource},
    traits::{CommitOutcome, CounterStorage, StorageError},
};

#[allow(async_fn_in_trait)]
pub trait TicketStorage: CounterStorage {
    /// Looks up the ticket issued for `source` in the given partition, if any.
    async fn fetch_ticket(&self, source: &TicketSource, partition_key: &str) -> Result<Option<Ticket>, StorageError>;

    /// Applies `counter` and inserts `ticket` atomically.
    ///
    /// * If the stored counter version no longer matches `counter.expected_version`, returns `StaleCounter`.
    /// * If a ticket for the same source already exists in the partition, returns `Duplicate`.
    async fn commit_ticket(
        &self,
        counter: &CounterUpdate,
        ticket: &Ticket,
    ) -> Result<CommitOutcome<Ticket>, StorageError>;

    /// Streams the tickets of a partition created within `[start, end]`, oldest first.
    fn tickets_in_range(
        &self,
        partition_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxStream<'_, Result<Ticket, StorageError>>;
}
