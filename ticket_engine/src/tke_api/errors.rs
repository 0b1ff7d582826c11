use thiserror::Error;
use ticket_common::MoneyError;

use crate::traits::{PlatformError, StorageError};

#[derive(Debug, Error)]
pub enum TicketGenerationError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
    #[error("Could not number {source_key} after {attempts} attempts")]
    RetriesExhausted { source_key: String, attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SummaryError {
    #[error("Invalid amount in payload: {0}")]
    InvalidAmount(#[from] MoneyError),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{year}-{month} is not a valid reporting period")]
    InvalidPeriod { year: i32, month: u32 },
    #[error("No tickets found for {year}-{month:02}")]
    NoTickets { year: i32, month: u32 },
    #[error("Report total and detail don't match. Tickets total {tickets_total:.2}, tax groups total {groups_total:.2}")]
    TotalsMismatch { tickets_total: f64, groups_total: f64 },
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum ReportingError {
    #[error("Could not generate report: {0}")]
    ReportError(#[from] ReportError),
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
    #[error("Could not assign an identifier to report {report_id} after {attempts} attempts")]
    RetriesExhausted { report_id: String, attempts: u32 },
}

#[derive(Debug, Error)]
pub enum StoreConfigError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
    #[error("Could not fetch the store configuration. {0}")]
    PlatformError(#[from] PlatformError),
}
