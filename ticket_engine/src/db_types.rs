use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use crate::report_objects::MonthlyReport;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

//--------------------------------------       Counter       ---------------------------------------------------------
/// A persisted integer sequence. `version` is the optimistic concurrency token: it changes on every successful
/// update, and a conditional update only succeeds if the stored version still matches the one that was read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Counter {
    pub id: String,
    pub partition_key: String,
    pub current_value: i64,
    pub version: i64,
}

impl Counter {
    pub fn new<S: Into<String>>(id: S, partition_key: S) -> Self {
        Self { id: id.into(), partition_key: partition_key.into(), current_value: 0, version: 0 }
    }

    /// The conditional update that moves this counter to its next value.
    pub fn increment(&self) -> CounterUpdate {
        CounterUpdate {
            id: self.id.clone(),
            partition_key: self.partition_key.clone(),
            expected_version: self.version,
            new_value: self.current_value + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterUpdate {
    pub id: String,
    pub partition_key: String,
    pub expected_version: i64,
    pub new_value: i64,
}

//--------------------------------------      TicketType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketType {
    Order,
    Refund,
}

impl Display for TicketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketType::Order => write!(f, "order"),
            TicketType::Refund => write!(f, "refund"),
        }
    }
}

impl FromStr for TicketType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(Self::Order),
            "refund" => Ok(Self::Refund),
            s => Err(ConversionError(format!("Invalid ticket type: {s}"))),
        }
    }
}

//--------------------------------------     TicketSource     ---------------------------------------------------------
/// The event a ticket numbers. Its identity key is unique within a partition: at most one ticket ever exists per
/// `(order_id, order)` or `(order_id, refund_id, refund)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TicketSource {
    Order { order_id: i64 },
    Refund { order_id: i64, refund_id: i64 },
}

impl TicketSource {
    pub fn ticket_type(&self) -> TicketType {
        match self {
            TicketSource::Order { .. } => TicketType::Order,
            TicketSource::Refund { .. } => TicketType::Refund,
        }
    }

    pub fn order_id(&self) -> i64 {
        match self {
            TicketSource::Order { order_id } | TicketSource::Refund { order_id, .. } => *order_id,
        }
    }

    pub fn refund_id(&self) -> Option<i64> {
        match self {
            TicketSource::Order { .. } => None,
            TicketSource::Refund { refund_id, .. } => Some(*refund_id),
        }
    }

    /// Refunds are posted with the opposite sign of sales in the monthly aggregate.
    pub fn sign(&self) -> f64 {
        match self {
            TicketSource::Order { .. } => 1.0,
            TicketSource::Refund { .. } => -1.0,
        }
    }

    pub fn from_parts(ticket_type: TicketType, order_id: i64, refund_id: Option<i64>) -> Result<Self, ConversionError> {
        match (ticket_type, refund_id) {
            (TicketType::Order, None) => Ok(Self::Order { order_id }),
            (TicketType::Refund, Some(refund_id)) => Ok(Self::Refund { order_id, refund_id }),
            (TicketType::Order, Some(r)) => {
                Err(ConversionError(format!("Order ticket for #{order_id} cannot carry refund id {r}")))
            },
            (TicketType::Refund, None) => Err(ConversionError(format!("Refund ticket for #{order_id} has no refund id"))),
        }
    }
}

impl Display for TicketSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketSource::Order { order_id } => write!(f, "order #{order_id}"),
            TicketSource::Refund { order_id, refund_id } => write!(f, "refund #{refund_id} of order #{order_id}"),
        }
    }
}

//--------------------------------------        TaxLine       ---------------------------------------------------------
/// One tax-rate bucket of a summary. `price` is net of tax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxLine {
    pub rate: f64,
    pub price: f64,
    pub tax: f64,
    pub currency: String,
}

//--------------------------------------         Ticket       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRequest {
    pub source: TicketSource,
    pub created_at: DateTime<Utc>,
    pub total_amount: f64,
    pub currency: String,
    pub tax_lines: Vec<TaxLine>,
}

/// An issued fiscal ticket. Tickets are immutable once committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// The formatted ticket number, e.g. `T25-0001`
    pub id: String,
    /// The fiscal year the ticket was numbered in
    pub partition_key: String,
    pub source: TicketSource,
    pub created_at: DateTime<Utc>,
    pub total_amount: f64,
    pub currency: String,
    pub tax_lines: Vec<TaxLine>,
}

impl Ticket {
    /// Timestamps are kept at millisecond precision, which is what the storage backends persist.
    pub fn from_request(id: String, partition_key: String, request: TicketRequest) -> Self {
        Self {
            id,
            partition_key,
            source: request.source,
            created_at: request.created_at.trunc_subsecs(3),
            total_amount: request.total_amount,
            currency: request.currency,
            tax_lines: request.tax_lines,
        }
    }
}

//--------------------------------------     ReportStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    /// Generated, not yet sent
    Pending,
    /// A submission is in flight
    Sending,
    Success,
    /// The last submission failed. These reports are picked up by the retry sweep.
    Failure,
}

impl Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::Pending => write!(f, "PENDING"),
            ReportStatus::Sending => write!(f, "SENDING"),
            ReportStatus::Success => write!(f, "SUCCESS"),
            ReportStatus::Failure => write!(f, "FAILURE"),
        }
    }
}

impl FromStr for ReportStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SENDING" => Ok(Self::Sending),
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            s => Err(ConversionError(format!("Invalid report status: {s}"))),
        }
    }
}

//--------------------------------------    ReportDocument    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    /// `{year}-{MM}`
    pub id: String,
    pub year: i32,
    pub month: u32,
    /// Sequential across all reports. Assigned once per (year, month) and kept on regeneration.
    pub identifier: i64,
    pub status: ReportStatus,
    pub retry_count: i64,
    pub last_retry_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub report: MonthlyReport,
    pub error: Option<String>,
}

impl ReportDocument {
    pub fn report_id(year: i32, month: u32) -> String {
        format!("{year}-{month:02}")
    }

    pub fn new(identifier: i64, report: NewReport) -> Self {
        let now = Utc::now();
        let mut report_body = report.report;
        report_body.set_identifier(identifier);
        Self {
            id: Self::report_id(report.year, report.month),
            year: report.year,
            month: report.month,
            identifier,
            status: ReportStatus::Pending,
            retry_count: 0,
            last_retry_date: None,
            created_at: now,
            updated_at: now,
            report: report_body,
            error: None,
        }
    }

    /// Replaces the content of an existing report with a regenerated one. The identifier is kept and the delivery
    /// state starts over.
    pub fn regenerated(self, report: MonthlyReport) -> Self {
        let mut report = report;
        report.set_identifier(self.identifier);
        Self {
            status: ReportStatus::Pending,
            retry_count: 0,
            last_retry_date: None,
            updated_at: Utc::now(),
            report,
            error: None,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub year: i32,
    pub month: u32,
    pub report: MonthlyReport,
}

//--------------------------------------      StoreConfig     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StoreConfig {
    pub shop: String,
    pub taxes_included: bool,
    pub updated_at: DateTime<Utc>,
}

impl StoreConfig {
    pub fn new<S: Into<String>>(shop: S, taxes_included: bool) -> Self {
        Self { shop: shop.into(), taxes_included, updated_at: Utc::now() }
    }
}
