use std::fmt::Debug;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::*;

use crate::{
    db_types::{NewReport, ReportDocument},
    helpers::{previous_month, RetryPolicy, DEFAULT_BUSINESS_TIMEZONE},
    tke_api::{
        errors::ReportingError,
        report_generator::MonthlyReportGenerator,
        report_objects::PostingConstants,
        report_repository::ReportRepository,
        report_sender::{ReportSender, SendReportResult},
    },
    traits::{ReportStorage, ReportTransport, StorageError, TicketStorage},
};

/// `ReportingApi` is the entry point for monthly ERP reporting: generating a month's posting document, storing it
/// with its identifier, sending it and retrying failed deliveries.
pub struct ReportingApi<B, T> {
    generator: MonthlyReportGenerator<B>,
    repository: ReportRepository<B>,
    sender: ReportSender<B, T>,
    timezone: Tz,
}

impl<B, T> Debug for ReportingApi<B, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReportingApi ({})", self.timezone)
    }
}

impl<B: Clone, T> ReportingApi<B, T> {
    pub fn new(db: B, transport: T) -> Self {
        let repository = ReportRepository::new(db.clone());
        let sender = ReportSender::new(repository.clone(), transport);
        Self { generator: MonthlyReportGenerator::new(db), repository, sender, timezone: DEFAULT_BUSINESS_TIMEZONE }
    }
}

impl<B, T> ReportingApi<B, T> {
    /// Month boundaries, report dates and "previous month" are evaluated in `timezone`.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.generator = self.generator.with_timezone(timezone);
        self.timezone = timezone;
        self
    }

    pub fn with_constants(mut self, constants: PostingConstants) -> Self {
        self.generator = self.generator.with_constants(constants);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.repository = self.repository.with_retry_policy(policy);
        self
    }

    /// The reporting period that precedes `now` in the business timezone.
    pub fn previous_month(&self, now: DateTime<Utc>) -> (i32, u32) {
        previous_month(now, self.timezone)
    }
}

impl<B, T> ReportingApi<B, T>
where
    B: TicketStorage + ReportStorage,
    T: ReportTransport,
{
    /// Generates the report for a month from its tickets and saves it. Regenerating a month replaces the stored content
    /// and resets its delivery state, but keeps its identifier.
    pub async fn generate_monthly_report(&self, year: i32, month: u32) -> Result<ReportDocument, ReportingError> {
        let report = self.generator.generate_report(year, month).await?;
        self.repository.save_with_counter(NewReport { year, month, report }).await
    }

    /// Sends the stored report for a month, generating it first if there is none.
    pub async fn send_report(&self, year: i32, month: u32) -> Result<SendReportResult, ReportingError> {
        let report = match self.repository.find_by_year_and_month(year, month).await? {
            Some(report) => report,
            None => {
                debug!("📊️ No report stored for {year}-{month:02} yet. Generating it");
                self.generate_monthly_report(year, month).await?
            },
        };
        Ok(self.sender.send_report(&report).await)
    }

    /// Sends the report of the month before `now`.
    pub async fn send_previous_month(&self, now: DateTime<Utc>) -> Result<SendReportResult, ReportingError> {
        let (year, month) = self.previous_month(now);
        info!("📊️ Sending the monthly report for {year}-{month:02}");
        self.send_report(year, month).await
    }

    pub async fn retry_failed_reports(&self) -> Vec<SendReportResult> {
        self.sender.retry_failed_reports().await
    }

    pub async fn find_report(&self, year: i32, month: u32) -> Result<Option<ReportDocument>, StorageError> {
        self.repository.find_by_year_and_month(year, month).await
    }
}
