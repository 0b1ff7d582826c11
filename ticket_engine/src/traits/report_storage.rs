use futures_util::stream::BoxStream;

use crate::{
    db_types::{CounterUpdate, ReportDocument, ReportStatus},
    traits::{CommitOutcome, CounterStorage, StorageError},
};

#[allow(async_fn_in_trait)]
pub trait ReportStorage: CounterStorage {
    async fn fetch_report(&self, year: i32, month: u32) -> Result<Option<ReportDocument>, StorageError>;

    async fn fetch_report_by_id(&self, id: &str) -> Result<Option<ReportDocument>, StorageError>;

    /// Overwrites an existing report. The stored identifier is never changed by this call.
    async fn replace_report(&self, report: &ReportDocument) -> Result<ReportDocument, StorageError>;

    /// Applies `counter` and inserts `report` atomically. Returns `Duplicate` if a report for the same year and month
    /// already exists.
    async fn commit_report(
        &self,
        counter: &CounterUpdate,
        report: &ReportDocument,
    ) -> Result<CommitOutcome<ReportDocument>, StorageError>;

    /// Sets the status (and error message) of a report. A transition to `Failure` also increments the retry count and
    /// stamps the last retry date.
    async fn update_report_status(
        &self,
        id: &str,
        status: ReportStatus,
        error: Option<String>,
    ) -> Result<ReportDocument, StorageError>;

    fn reports_with_status(&self, status: ReportStatus) -> BoxStream<'_, Result<ReportDocument, StorageError>>;
}
