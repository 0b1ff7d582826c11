use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Counter, CounterUpdate},
    traits::{CreateOutcome, StorageError},
};

pub async fn fetch_counter(
    id: &str,
    partition_key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Counter>, StorageError> {
    let counter = sqlx::query_as::<_, Counter>(
        r#"
            SELECT id, partition_key, current_value, version
            FROM counters
            WHERE id = $1 AND partition_key = $2
        "#,
    )
    .bind(id)
    .bind(partition_key)
    .fetch_optional(conn)
    .await?;
    Ok(counter)
}

/// Creates the counter at zero. Creation races are resolved by the primary key: the loser gets `AlreadyExists`.
pub async fn insert_counter(
    id: &str,
    partition_key: &str,
    conn: &mut SqliteConnection,
) -> Result<CreateOutcome<Counter>, StorageError> {
    let result = sqlx::query(
        r#"
            INSERT INTO counters (id, partition_key, current_value, version)
            VALUES ($1, $2, 0, 0)
            ON CONFLICT (id, partition_key) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(partition_key)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        trace!("🗃️ Counter {id}/{partition_key} already exists");
        Ok(CreateOutcome::AlreadyExists)
    } else {
        Ok(CreateOutcome::Created(Counter::new(id, partition_key)))
    }
}

/// Conditionally replaces the counter value. Returns `false` if the stored version no longer matches, in which case
/// nothing was written.
pub async fn apply_update(update: &CounterUpdate, conn: &mut SqliteConnection) -> Result<bool, StorageError> {
    let result = sqlx::query(
        r#"
            UPDATE counters
            SET current_value = $1, version = version + 1
            WHERE id = $2 AND partition_key = $3 AND version = $4
        "#,
    )
    .bind(update.new_value)
    .bind(&update.id)
    .bind(&update.partition_key)
    .bind(update.expected_version)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
