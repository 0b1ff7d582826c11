use std::{fmt::Debug, sync::Arc, time::Duration};

use log::*;
use tokio::task::JoinHandle;

use crate::scheduler::{JobTask, SchedulerError, TaskScheduler};

/// A job that should always be registered.
#[derive(Clone)]
pub struct DesiredJob {
    pub name: String,
    pub schedule: String,
    pub task: JobTask,
}

impl Debug for DesiredJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DesiredJob({}, '{}')", self.name, self.schedule)
    }
}

impl DesiredJob {
    pub fn new<S: Into<String>>(name: S, schedule: S, task: JobTask) -> Self {
        Self { name: name.into(), schedule: schedule.into(), task }
    }
}

/// Compares the desired jobs with what the scheduler has registered, and re-adds whatever is missing.
#[derive(Debug)]
pub struct ScheduleReconciler {
    scheduler: Arc<TaskScheduler>,
    desired: Vec<DesiredJob>,
}

impl ScheduleReconciler {
    pub fn new(scheduler: Arc<TaskScheduler>, desired: Vec<DesiredJob>) -> Self {
        Self { scheduler, desired }
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        self.scheduler.as_ref()
    }

    /// Returns the names of the jobs that were (re-)registered.
    pub fn reconcile(&self) -> Vec<String> {
        let mut restored = Vec::new();
        for job in &self.desired {
            if self.scheduler.has_job(&job.name) {
                continue;
            }
            match self.scheduler.add_job(&job.name, &job.schedule, job.task.clone()) {
                Ok(()) => restored.push(job.name.clone()),
                // Registered concurrently
                Err(SchedulerError::DuplicateJob(_)) => {},
                Err(e) => error!("🕰️ Could not register job {}. {e}", job.name),
            }
        }
        if !restored.is_empty() {
            info!("🕰️ Registered missing jobs: {}", restored.join(", "));
        }
        restored
    }
}

/// Starts the reconciliation worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_reconcile_worker(reconciler: ScheduleReconciler, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        // The first tick completes immediately, and start-up has already reconciled
        timer.tick().await;
        info!("🕰️ Schedule reconciliation worker started. Checking every {interval:?}");
        loop {
            timer.tick().await;
            trace!("🕰️ Checking for missing jobs");
            let restored = reconciler.reconcile();
            if !restored.is_empty() {
                warn!("🕰️ {} jobs had gone missing and were restored", restored.len());
            }
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scheduler::job;

    fn desired() -> Vec<DesiredJob> {
        vec![
            DesiredJob::new("failed-reports-retries", "0 0 */4 * * *", job(|| async {})),
            DesiredJob::new("monthly-report", "0 0 1 1 * *", job(|| async {})),
        ]
    }

    #[tokio::test]
    async fn missing_jobs_are_restored() {
        let scheduler = Arc::new(TaskScheduler::new(chrono_tz::Europe::Madrid));
        let reconciler = ScheduleReconciler::new(scheduler.clone(), desired());
        assert_eq!(reconciler.reconcile(), vec!["failed-reports-retries", "monthly-report"]);
        assert!(reconciler.reconcile().is_empty());
        scheduler.remove_job("monthly-report");
        assert_eq!(reconciler.reconcile(), vec!["monthly-report"]);
        assert_eq!(reconciler.scheduler().get_all_jobs().len(), 2);
    }

    #[tokio::test]
    async fn invalid_jobs_are_not_registered() {
        let scheduler = Arc::new(TaskScheduler::new(chrono_tz::UTC));
        let jobs = vec![DesiredJob::new("broken", "61 * * * * *", job(|| async {}))];
        let reconciler = ScheduleReconciler::new(scheduler.clone(), jobs);
        assert!(reconciler.reconcile().is_empty());
        assert!(!scheduler.has_job("broken"));
    }

    #[tokio::test]
    async fn worker_restores_jobs_periodically() {
        let scheduler = Arc::new(TaskScheduler::new(chrono_tz::UTC));
        let reconciler = ScheduleReconciler::new(scheduler.clone(), desired());
        reconciler.reconcile();
        let worker = start_reconcile_worker(reconciler, Duration::from_millis(50));
        scheduler.remove_job("failed-reports-retries");
        assert!(!scheduler.has_job("failed-reports-retries"));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(scheduler.has_job("failed-reports-retries"));
        worker.abort();
    }
}
