//! The two recurring reporting jobs: sweeping failed deliveries, and sending last month's report.
use std::sync::Arc;

use chrono::Utc;
use log::*;
use ticket_engine::{db_types::ReportStatus, ReportingApi, SqliteDatabase};

use crate::{
    config::ScheduleConfig,
    erp_client::ErpClient,
    scheduler::{job, DesiredJob},
};

pub const FAILED_REPORTS_JOB: &str = "failed-reports-retries";
pub const MONTHLY_REPORT_JOB: &str = "monthly-report";

pub type ServerReporting = ReportingApi<SqliteDatabase, ErpClient>;

pub fn reporting_jobs(reporting: Arc<ServerReporting>, schedules: &ScheduleConfig) -> Vec<DesiredJob> {
    let api = reporting.clone();
    let retries = job(move || {
        let api = api.clone();
        async move { retry_failed_reports(&api).await }
    });
    let api = reporting;
    let monthly = job(move || {
        let api = api.clone();
        async move { send_monthly_report(&api).await }
    });
    vec![
        DesiredJob::new(FAILED_REPORTS_JOB, schedules.retry_schedule.as_str(), retries),
        DesiredJob::new(MONTHLY_REPORT_JOB, schedules.monthly_schedule.as_str(), monthly),
    ]
}

async fn retry_failed_reports(api: &ServerReporting) {
    info!("🕰️ Retrying failed reports");
    let results = api.retry_failed_reports().await;
    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        warn!("🕰️ {failed} of {} reports are still not delivered", results.len());
    } else {
        info!("🕰️ {} failed reports retried successfully", results.len());
    }
}

/// Regenerates the previous month's report from its tickets, then sends it. A report that was already delivered is
/// left untouched.
async fn send_monthly_report(api: &ServerReporting) {
    let (year, month) = api.previous_month(Utc::now());
    info!("🕰️ Running the monthly report job for {year}-{month:02}");
    match api.find_report(year, month).await {
        Ok(Some(report)) if report.status == ReportStatus::Success => {
            info!("🕰️ Report {} was already delivered. Nothing to do", report.id);
            return;
        },
        Ok(_) => {},
        Err(e) => {
            error!("🕰️ The report for {year}-{month:02} could not be looked up. {e}");
            return;
        },
    }
    if let Err(e) = api.generate_monthly_report(year, month).await {
        error!("🕰️ The report for {year}-{month:02} could not be generated. {e}");
        return;
    }
    match api.send_report(year, month).await {
        Ok(result) if result.success => info!("🕰️ Report {} delivered", result.report_id),
        Ok(result) => {
            let reason = result.error.unwrap_or_default();
            warn!("🕰️ Report {} was not delivered and will be retried. {reason}", result.report_id);
        },
        Err(e) => error!("🕰️ The report for {year}-{month:02} could not be sent. {e}"),
    }
}
