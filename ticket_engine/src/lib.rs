//! Ticket Engine
//!
//! The ticket engine assigns gapless, per-year fiscal ticket numbers to paid orders and refunds, and turns a month of
//! tickets into the posting document an external ERP expects.
//!
//! The library is divided into three main sections:
//! 1. Storage contracts ([`mod@traits`]) and their backends. A SQLite backend ships with the crate. The engine only
//!    relies on two primitives from a backend: a conditional (versioned) counter update, and an atomic "update counter
//!    and insert document" commit that respects the document's identity key.
//! 2. The domain types ([`mod@db_types`]) and the webhook payloads of the commerce platform ([`mod@shopify_types`]).
//! 3. The engine API: [`TicketNumberGenerator`], the summary builders, [`StoreConfigApi`], and for reporting,
//!    [`MonthlyReportGenerator`], [`ReportRepository`], [`ReportSender`] and the [`ReportingApi`] facade.
mod db;

pub mod db_types;
pub mod helpers;
pub mod shopify_types;
pub mod traits;
mod tke_api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use tke_api::{
    counter_store::{get_or_create_counter, ticket_counter_id, REPORT_COUNTER_ID, REPORT_COUNTER_PARTITION},
    errors::{ReportError, ReportingError, StoreConfigError, SummaryError, TicketGenerationError},
    report_generator::MonthlyReportGenerator,
    report_objects,
    report_repository::ReportRepository,
    report_sender::{ReportSender, SendReportResult},
    reporting_api::ReportingApi,
    store_config_api::StoreConfigApi,
    store_config_cache::{StoreConfigCache, DEFAULT_STORE_CONFIG_TTL},
    summary_builder::{
        generate_order_summary,
        generate_refund_summary,
        OrderSummary,
        RefundSummary,
        SummaryOptions,
        DEFAULT_EXCLUSION_TAG,
    },
    ticket_api::{TicketNumberFormat, TicketNumberGenerator},
};
