use log::*;

use crate::{
    db_types::Counter,
    traits::{CounterStorage, CreateOutcome, StorageError},
};

/// The counter that numbers the tickets of one fiscal year.
pub fn ticket_counter_id(partition_key: &str) -> String {
    format!("counter-{partition_key}")
}

pub const REPORT_COUNTER_ID: &str = "report-counter";
pub const REPORT_COUNTER_PARTITION: &str = "reports";

/// Reads the counter, creating it at zero if it does not exist yet.
///
/// Losing a creation race to a concurrent caller is not an error: the winner's counter is read back and returned.
/// Only a counter that conflicts on creation and then cannot be read is reported, as
/// [`StorageError::CounterVanished`].
pub async fn get_or_create_counter<B: CounterStorage>(
    db: &B,
    id: &str,
    partition_key: &str,
) -> Result<Counter, StorageError> {
    if let Some(counter) = db.fetch_counter(id, partition_key).await? {
        return Ok(counter);
    }
    match db.create_counter(id, partition_key).await? {
        CreateOutcome::Created(counter) => {
            info!("🗃️ Created counter {id} in partition {partition_key}");
            Ok(counter)
        },
        CreateOutcome::AlreadyExists => {
            debug!("🗃️ Counter {id} was created concurrently. Reading it back");
            db.fetch_counter(id, partition_key)
                .await?
                .ok_or_else(|| StorageError::CounterVanished(format!("{id}/{partition_key}")))
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::MemoryDatabase;

    struct RacingStore;

    impl CounterStorage for RacingStore {
        async fn fetch_counter(&self, _id: &str, _partition_key: &str) -> Result<Option<Counter>, StorageError> {
            Ok(None)
        }

        async fn create_counter(&self, _id: &str, _partition_key: &str) -> Result<CreateOutcome<Counter>, StorageError> {
            Ok(CreateOutcome::AlreadyExists)
        }
    }

    #[tokio::test]
    async fn creates_once_then_reads() {
        let db = MemoryDatabase::new();
        let counter = get_or_create_counter(&db, "counter-2025", "2025").await.unwrap();
        assert_eq!(counter.current_value, 0);
        let again = get_or_create_counter(&db, "counter-2025", "2025").await.unwrap();
        assert_eq!(counter, again);
    }

    #[tokio::test]
    async fn concurrent_creation_is_benign() {
        let db = MemoryDatabase::new().with_interleaving();
        let (a, b) = tokio::join!(
            get_or_create_counter(&db, REPORT_COUNTER_ID, REPORT_COUNTER_PARTITION),
            get_or_create_counter(&db, REPORT_COUNTER_ID, REPORT_COUNTER_PARTITION)
        );
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn unreadable_counter_after_conflict() {
        let err = get_or_create_counter(&RacingStore, "counter-2025", "2025").await.unwrap_err();
        assert!(matches!(err, StorageError::CounterVanished(_)));
    }

    #[test]
    fn counter_ids() {
        assert_eq!(ticket_counter_id("2025"), "counter-2025");
    }
}
