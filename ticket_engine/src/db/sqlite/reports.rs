use chrono::{DateTime, Utc};
use futures_util::{stream::BoxStream, StreamExt};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::{
    db::sqlite::is_unique_violation,
    db_types::{ReportDocument, ReportStatus},
    traits::{CreateOutcome, StorageError},
};

#[derive(Debug, Clone, FromRow)]
struct ReportRow {
    id: String,
    year: i32,
    month: i64,
    identifier: i64,
    status: String,
    retry_count: i64,
    last_retry_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    report: String,
    error: Option<String>,
}

impl TryFrom<ReportRow> for ReportDocument {
    type Error = StorageError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<ReportStatus>().map_err(|e| StorageError::CorruptRecord(e.to_string()))?;
        let month = u32::try_from(row.month)
            .map_err(|_| StorageError::CorruptRecord(format!("Report {} has month {}", row.id, row.month)))?;
        let report = serde_json::from_str(&row.report)?;
        Ok(ReportDocument {
            id: row.id,
            year: row.year,
            month,
            identifier: row.identifier,
            status,
            retry_count: row.retry_count,
            last_retry_date: row.last_retry_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            report,
            error: row.error,
        })
    }
}

const REPORT_COLUMNS: &str =
    "id, year, month, identifier, status, retry_count, last_retry_date, created_at, updated_at, report, error";

pub async fn fetch_report_by_id(id: &str, conn: &mut SqliteConnection) -> Result<Option<ReportDocument>, StorageError> {
    let q = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1");
    let row = sqlx::query_as::<_, ReportRow>(&q).bind(id).fetch_optional(conn).await?;
    row.map(ReportDocument::try_from).transpose()
}

pub async fn fetch_report(
    year: i32,
    month: u32,
    conn: &mut SqliteConnection,
) -> Result<Option<ReportDocument>, StorageError> {
    let q = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE year = $1 AND month = $2");
    let row = sqlx::query_as::<_, ReportRow>(&q).bind(year).bind(i64::from(month)).fetch_optional(conn).await?;
    row.map(ReportDocument::try_from).transpose()
}

/// Inserts a new report. A report for the same period (or with the same identifier) yields `AlreadyExists`.
pub async fn insert_report(
    report: &ReportDocument,
    conn: &mut SqliteConnection,
) -> Result<CreateOutcome<ReportDocument>, StorageError> {
    let body = serde_json::to_string(&report.report)?;
    let result = sqlx::query(
        r#"
            INSERT INTO reports (
                id,
                year,
                month,
                identifier,
                status,
                retry_count,
                last_retry_date,
                created_at,
                updated_at,
                report,
                error
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(&report.id)
    .bind(report.year)
    .bind(i64::from(report.month))
    .bind(report.identifier)
    .bind(report.status.to_string())
    .bind(report.retry_count)
    .bind(report.last_retry_date)
    .bind(report.created_at)
    .bind(report.updated_at)
    .bind(body)
    .bind(&report.error)
    .execute(conn)
    .await;
    match result {
        Ok(_) => Ok(CreateOutcome::Created(report.clone())),
        Err(e) if is_unique_violation(&e) => Ok(CreateOutcome::AlreadyExists),
        Err(e) => Err(e.into()),
    }
}

/// Overwrites the mutable fields of a report. `identifier` and `created_at` are never touched.
pub async fn replace_report(
    report: &ReportDocument,
    conn: &mut SqliteConnection,
) -> Result<Option<ReportDocument>, StorageError> {
    let body = serde_json::to_string(&report.report)?;
    let q = format!(
        "UPDATE reports SET status = $1, retry_count = $2, last_retry_date = $3, updated_at = $4, report = $5, error \
         = $6 WHERE id = $7 RETURNING {REPORT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, ReportRow>(&q)
        .bind(report.status.to_string())
        .bind(report.retry_count)
        .bind(report.last_retry_date)
        .bind(report.updated_at)
        .bind(body)
        .bind(&report.error)
        .bind(&report.id)
        .fetch_optional(conn)
        .await?;
    row.map(ReportDocument::try_from).transpose()
}

/// Sets the status of a report. A `Failure` also bumps the retry count and stamps the retry date.
pub async fn update_status(
    id: &str,
    status: ReportStatus,
    error: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<Option<ReportDocument>, StorageError> {
    let now = Utc::now();
    let is_failure = status == ReportStatus::Failure;
    let retry_increment = i64::from(is_failure);
    let retry_date = is_failure.then_some(now);
    let q = format!(
        "UPDATE reports SET status = $1, error = $2, updated_at = $3, retry_count = retry_count + $4, \
         last_retry_date = COALESCE($5, last_retry_date) WHERE id = $6 RETURNING {REPORT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, ReportRow>(&q)
        .bind(status.to_string())
        .bind(error)
        .bind(now)
        .bind(retry_increment)
        .bind(retry_date)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.map(ReportDocument::try_from).transpose()
}

pub fn reports_with_status(pool: &SqlitePool, status: ReportStatus) -> BoxStream<'_, Result<ReportDocument, StorageError>> {
    sqlx::query_as::<_, ReportRow>(
        r#"
            SELECT id, year, month, identifier, status, retry_count, last_retry_date, created_at, updated_at, report, error
            FROM reports
            WHERE status = $1
            ORDER BY year ASC, month ASC
        "#,
    )
    .bind(status.to_string())
    .fetch(pool)
    .map(|row| row.map_err(StorageError::from).and_then(ReportDocument::try_from))
    .boxed()
}
