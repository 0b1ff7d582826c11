//! The public API of the ticket engine.
//!
//! Each API object wraps a storage backend (and, where needed, an outward port such as the ERP transport) and exposes
//! the domain operations. Callers never use the storage traits directly.
pub mod counter_store;
pub mod errors;
pub mod report_generator;
pub mod report_objects;
pub mod report_repository;
pub mod report_sender;
pub mod reporting_api;
pub mod store_config_api;
pub mod store_config_cache;
pub mod summary_builder;
pub mod ticket_api;
