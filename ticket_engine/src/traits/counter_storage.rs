use crate::{
    db_types::Counter,
    traits::{CreateOutcome, StorageError},
};

#[allow(async_fn_in_trait)]
pub trait CounterStorage {
    async fn fetch_counter(&self, id: &str, partition_key: &str) -> Result<Option<Counter>, StorageError>;

    /// Creates the counter at value zero. If a counter with the same id already exists in the partition, nothing is
    /// written and `AlreadyExists` is returned.
    async fn create_counter(&self, id: &str, partition_key: &str) -> Result<CreateOutcome<Counter>, StorageError>;
}
