//! # Storage and platform contracts.
//!
//! The engine never talks to a database, the commerce platform or the ERP directly. Instead it is generic over the traits in
//! this module, which any backend has to implement. The crate ships a SQLite backend (`SqliteDatabase`) and, behind
//! the `test_utils` feature, an in-memory one.
//!
//! Atomicity requirements are part of the contracts:
//! * [`CounterStorage::create_counter`] must fail benignly with [`CreateOutcome::AlreadyExists`] when a concurrent
//!   caller won the race.
//! * [`TicketStorage::commit_ticket`] and [`ReportStorage::commit_report`] apply a conditional counter update and the
//!   creation of the numbered document as one unit. Either both persist or neither does.
//! * Identity keys (ticket source per partition, report year and month) are enforced by the storage layer, not by
//!   callers.
mod commerce_platform;
mod counter_storage;
mod data_objects;
mod report_storage;
mod report_transport;
mod store_config_storage;
mod ticket_storage;

pub use commerce_platform::{AnnotationOutcome, OrderAnnotator, PlatformError, TaxSettingSource};
pub use counter_storage::CounterStorage;
pub use data_objects::{CommitOutcome, CreateOutcome, StorageError};
pub use report_storage::ReportStorage;
pub use report_transport::{ReportTransport, TransportError, TransportResponse};
pub use store_config_storage::StoreConfigStorage;
pub use ticket_storage::TicketStorage;
