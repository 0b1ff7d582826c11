use thiserror::Error;

/// Result of a create that is guarded by a uniqueness constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome<T> {
    Created(T),
    AlreadyExists,
}

/// Result of an atomic "increment counter and create document" batch.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome<T> {
    /// Both writes persisted.
    Committed(T),
    /// The counter was changed by someone else since it was read. Nothing was written.
    StaleCounter,
    /// A document with the same identity key already exists. Nothing was written.
    Duplicate,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database driver error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Could not run database migrations: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Stored record is corrupt: {0}")]
    CorruptRecord(String),
    #[error("Counter {0} reported a conflict on creation but could not be read back")]
    CounterVanished(String),
    #[error("Report {0} does not exist")]
    ReportNotFound(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::CorruptRecord(e.to_string())
    }
}
