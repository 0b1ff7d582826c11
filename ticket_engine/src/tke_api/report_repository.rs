use std::fmt::Debug;

use futures_util::stream::BoxStream;
use log::*;

use crate::{
    db_types::{NewReport, ReportDocument, ReportStatus},
    helpers::{retry_with_backoff, Attempt, RetryError, RetryPolicy},
    tke_api::{
        counter_store::{get_or_create_counter, REPORT_COUNTER_ID, REPORT_COUNTER_PARTITION},
        errors::ReportingError,
    },
    traits::{CommitOutcome, ReportStorage, StorageError},
};

/// Persists monthly reports and their delivery state.
///
/// Every report gets an `identifier` from a single counter shared by all reports. It is assigned when the report for
/// a (year, month) is first saved and kept when the report is regenerated.
#[derive(Clone)]
pub struct ReportRepository<B> {
    db: B,
    retry_policy: RetryPolicy,
}

impl<B> Debug for ReportRepository<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReportRepository")
    }
}

impl<B> ReportRepository<B> {
    pub fn new(db: B) -> Self {
        Self { db, retry_policy: RetryPolicy::default() }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> ReportRepository<B>
where B: ReportStorage
{
    /// Saves a freshly generated report.
    ///
    /// If a report for the same period exists, its content is replaced, its identifier is kept and its delivery state
    /// starts over at `Pending`. Otherwise the next identifier is taken from the report counter, atomically with the
    /// insert.
    pub async fn save_with_counter(&self, report: NewReport) -> Result<ReportDocument, ReportingError> {
        let report_id = ReportDocument::report_id(report.year, report.month);
        let label = format!("Report {report_id}");
        let result = retry_with_backoff(&self.retry_policy, &label, |_| self.attempt_save(&report)).await;
        match result {
            Ok(doc) => Ok(doc),
            Err(RetryError::Failed(e)) => Err(e),
            Err(RetryError::Exhausted(attempts)) => {
                error!("📊️ Gave up saving report {report_id} after {attempts} attempts");
                Err(ReportingError::RetriesExhausted { report_id, attempts })
            },
        }
    }

    async fn attempt_save(&self, report: &NewReport) -> Attempt<ReportDocument, ReportingError> {
        match self.try_save(report).await {
            Ok(Some(doc)) => Attempt::Done(doc),
            Ok(None) => Attempt::Retry,
            Err(e) => Attempt::Fail(e.into()),
        }
    }

    /// `Ok(None)` means a concurrent writer got in first and the save should be tried again.
    async fn try_save(&self, report: &NewReport) -> Result<Option<ReportDocument>, StorageError> {
        if let Some(existing) = self.db.fetch_report(report.year, report.month).await? {
            let identifier = existing.identifier;
            let doc = self.db.replace_report(&existing.regenerated(report.report.clone())).await?;
            info!("📊️ Report {} regenerated. Identifier {identifier} kept", doc.id);
            return Ok(Some(doc));
        }
        let counter = get_or_create_counter(&self.db, REPORT_COUNTER_ID, REPORT_COUNTER_PARTITION).await?;
        let update = counter.increment();
        let doc = ReportDocument::new(update.new_value, report.clone());
        match self.db.commit_report(&update, &doc).await? {
            CommitOutcome::Committed(doc) => {
                info!("📊️ Report {} saved with identifier {}", doc.id, doc.identifier);
                Ok(Some(doc))
            },
            CommitOutcome::StaleCounter => Ok(None),
            CommitOutcome::Duplicate => {
                debug!("📊️ Report {} was created concurrently", doc.id);
                Ok(None)
            },
        }
    }

    /// Moves a report to `status`. A `Failure` also bumps its retry count.
    pub async fn update_status(
        &self,
        id: &str,
        status: ReportStatus,
        error: Option<String>,
    ) -> Result<ReportDocument, StorageError> {
        let doc = self.db.update_report_status(id, status, error).await?;
        debug!("📊️ Report {id} is now {status} (retries: {})", doc.retry_count);
        Ok(doc)
    }

    pub async fn find_by_year_and_month(&self, year: i32, month: u32) -> Result<Option<ReportDocument>, StorageError> {
        self.db.fetch_report(year, month).await
    }

    pub fn find_by_status(&self, status: ReportStatus) -> BoxStream<'_, Result<ReportDocument, StorageError>> {
        self.db.reports_with_status(status)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use futures_util::TryStreamExt;

    use super::*;
    use crate::{report_objects::MonthlyReport, test_utils::MemoryDatabase};

    fn monthly_report(reference: &str) -> MonthlyReport {
        serde_json::from_value(serde_json::json!({
            "Factura": {
                "Cabecera": {
                    "Fecha_documento": "20250331",
                    "Fecha_contable": "20250331",
                    "Ejercicio": "2025",
                    "Periodo": "03",
                    "Sociedad": "H002",
                    "Clase_documento": "Factura",
                    "Referencia": reference,
                    "Texto_cabecera": "T25-0001_",
                    "Fecha_IVA": "20250331"
                },
                "Posicion_cliente": {
                    "Posicion": "1",
                    "Cuenta_cliente": "Cliente",
                    "Cuenta": "",
                    "Importe": "121.00",
                    "Moneda": "EUR",
                    "Num_Asignacion": "T25-0001_T25-0002",
                    "Texto_explicativo": "",
                    "Centro_beneficio": "CEBE"
                },
                "Posicion_ingreso": [],
                "Posicion_impuestos": []
            }
        }))
        .unwrap()
    }

    fn new_report(year: i32, month: u32, reference: &str) -> NewReport {
        NewReport { year, month, report: monthly_report(reference) }
    }

    fn repo(db: MemoryDatabase) -> ReportRepository<MemoryDatabase> {
        let policy =
            RetryPolicy { max_attempts: 5, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(4) };
        ReportRepository::new(db).with_retry_policy(policy)
    }

    #[tokio::test]
    async fn identifiers_are_sequential_across_periods() {
        let repo = repo(MemoryDatabase::new());
        let march = repo.save_with_counter(new_report(2025, 3, "T25-0002")).await.unwrap();
        let april = repo.save_with_counter(new_report(2025, 4, "T25-0009")).await.unwrap();
        let next_year = repo.save_with_counter(new_report(2026, 1, "T26-0003")).await.unwrap();
        assert_eq!((march.identifier, april.identifier, next_year.identifier), (1, 2, 3));
        assert_eq!(march.id, "2025-03");
        assert_eq!(march.status, ReportStatus::Pending);
        assert_eq!(march.report.identifier(), Some("1"));
        assert_eq!(next_year.report.identifier(), Some("3"));
    }

    #[tokio::test]
    async fn regeneration_keeps_the_identifier() {
        let db = MemoryDatabase::new();
        let repo = repo(db.clone());
        let first = repo.save_with_counter(new_report(2025, 3, "T25-0002")).await.unwrap();
        repo.update_status(&first.id, ReportStatus::Failure, Some("HTTP 500".into())).await.unwrap();
        let again = repo.save_with_counter(new_report(2025, 3, "T25-0007")).await.unwrap();
        assert_eq!(again.identifier, first.identifier);
        assert_eq!(again.created_at, first.created_at);
        assert_eq!(again.report.invoice.header.reference, "T25-0007");
        assert_eq!(again.report.identifier(), Some("1"));
        assert_eq!(again.status, ReportStatus::Pending);
        assert_eq!(again.retry_count, 0);
        assert_eq!(again.error, None);
        assert_eq!(db.counter(REPORT_COUNTER_ID, REPORT_COUNTER_PARTITION).unwrap().current_value, 1);
    }

    #[tokio::test]
    async fn concurrent_saves_of_one_period() {
        let db = MemoryDatabase::new().with_interleaving();
        let repo = repo(db.clone());
        let (a, b) = tokio::join!(
            repo.save_with_counter(new_report(2025, 3, "T25-0002")),
            repo.save_with_counter(new_report(2025, 3, "T25-0002"))
        );
        assert_eq!(a.unwrap().identifier, b.unwrap().identifier);
        assert_eq!(db.reports().len(), 1);
        assert_eq!(db.counter(REPORT_COUNTER_ID, REPORT_COUNTER_PARTITION).unwrap().current_value, 1);
    }

    #[tokio::test]
    async fn status_transitions() {
        let repo = repo(MemoryDatabase::new());
        let doc = repo.save_with_counter(new_report(2025, 3, "T25-0002")).await.unwrap();
        let sending = repo.update_status(&doc.id, ReportStatus::Sending, None).await.unwrap();
        assert_eq!((sending.status, sending.retry_count), (ReportStatus::Sending, 0));
        let failed = repo.update_status(&doc.id, ReportStatus::Failure, Some("timeout".into())).await.unwrap();
        assert_eq!(failed.retry_count, 1);
        assert!(failed.last_retry_date.is_some());
        assert_eq!(failed.error.as_deref(), Some("timeout"));
        let failures = repo.find_by_status(ReportStatus::Failure).try_collect::<Vec<_>>().await.unwrap();
        assert_eq!(failures.len(), 1);
        let ok = repo.update_status(&doc.id, ReportStatus::Success, None).await.unwrap();
        assert_eq!((ok.retry_count, ok.error), (1, None));
        let err = repo.update_status("2024-01", ReportStatus::Success, None).await.unwrap_err();
        assert!(matches!(err, StorageError::ReportNotFound(_)));
    }
}
