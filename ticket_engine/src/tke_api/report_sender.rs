use std::fmt::{Debug, Display};

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{ReportDocument, ReportStatus},
    tke_api::report_repository::ReportRepository,
    traits::{ReportStorage, ReportTransport, TransportResponse},
};

/// The outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReportResult {
    pub report_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

struct SendFailure {
    error: String,
    status_code: Option<u16>,
    response_text: Option<String>,
}

impl SendFailure {
    fn from_error<E: Display>(e: E) -> Self {
        Self { error: e.to_string(), status_code: None, response_text: None }
    }

    fn rejected(response: TransportResponse) -> Self {
        Self {
            error: format!("API request failed: {}", response.body),
            status_code: Some(response.status),
            response_text: Some(response.body),
        }
    }
}

/// `ReportSender` delivers reports to the ERP and records the outcome on the report.
///
/// Sending never fails from the caller's point of view: storage errors, transport errors and rejections by the ERP
/// all end up in the returned [`SendReportResult`] and, where possible, as a `Failure` status on the report.
pub struct ReportSender<B, T> {
    repository: ReportRepository<B>,
    transport: T,
}

impl<B, T> Debug for ReportSender<B, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReportSender")
    }
}

impl<B, T> ReportSender<B, T> {
    pub fn new(repository: ReportRepository<B>, transport: T) -> Self {
        Self { repository, transport }
    }
}

impl<B, T> ReportSender<B, T>
where
    B: ReportStorage,
    T: ReportTransport,
{
    pub async fn send_report(&self, report: &ReportDocument) -> SendReportResult {
        match self.try_send(report).await {
            Ok(result) => result,
            Err(failure) => self.record_failure(report, failure).await,
        }
    }

    async fn try_send(&self, report: &ReportDocument) -> Result<SendReportResult, SendFailure> {
        self.repository.update_status(&report.id, ReportStatus::Sending, None).await.map_err(SendFailure::from_error)?;
        debug!("📮️ Posting report {} ({} income positions)", report.id, report.report.invoice.income_positions.len());
        let response = self.transport.post_report(&report.report).await.map_err(SendFailure::from_error)?;
        if !response.is_success() {
            return Err(SendFailure::rejected(response));
        }
        self.repository.update_status(&report.id, ReportStatus::Success, None).await.map_err(|e| SendFailure {
            error: e.to_string(),
            status_code: Some(response.status),
            response_text: Some(response.body.clone()),
        })?;
        info!("📮️ Report {} for {}-{:02} delivered. HTTP {}", report.id, report.year, report.month, response.status);
        Ok(SendReportResult {
            report_id: report.id.clone(),
            success: true,
            status_code: Some(response.status),
            response_text: Some(response.body),
            error: None,
            timestamp: Utc::now(),
        })
    }

    async fn record_failure(&self, report: &ReportDocument, failure: SendFailure) -> SendReportResult {
        match failure.status_code {
            Some(status) => error!("📮️ Report {} was rejected with HTTP {status}. {}", report.id, failure.error),
            None => error!("📮️ Could not send report {}. {}", report.id, failure.error),
        }
        let update = self.repository.update_status(&report.id, ReportStatus::Failure, Some(failure.error.clone())).await;
        if let Err(e) = update {
            error!("📮️ Could not mark report {} as failed. {e}", report.id);
        }
        SendReportResult {
            report_id: report.id.clone(),
            success: false,
            status_code: failure.status_code,
            response_text: failure.response_text,
            error: Some(failure.error),
            timestamp: Utc::now(),
        }
    }

    /// Resends every report currently marked as failed. Each report is sent independently; one failure does not stop
    /// the others.
    pub async fn retry_failed_reports(&self) -> Vec<SendReportResult> {
        let mut failed = Vec::new();
        let mut stream = self.repository.find_by_status(ReportStatus::Failure);
        while let Some(item) = stream.next().await {
            match item {
                Ok(report) => failed.push(report),
                Err(e) => error!("📮️ Could not list failed reports. {e}"),
            }
        }
        drop(stream);
        info!("📮️ Retrying {} failed reports", failed.len());
        let mut results = Vec::with_capacity(failed.len());
        for report in &failed {
            results.push(self.send_report(report).await);
        }
        let delivered = results.iter().filter(|r| r.success).count();
        info!("📮️ Retry sweep finished. {delivered} of {} reports delivered", results.len());
        results
    }
}
