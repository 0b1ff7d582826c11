use thiserror::Error;

use crate::report_objects::MonthlyReport;

/// The raw answer of the ERP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new<S: Into<String>>(status: u16, body: S) -> Self {
        Self { status, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced a response (connection refused, timeout, TLS failure, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Delivers posting documents to the ERP. Non-2xx answers are responses, not errors.
#[allow(async_fn_in_trait)]
pub trait ReportTransport {
    async fn post_report(&self, report: &MonthlyReport) -> Result<TransportResponse, TransportError>;
}
