//! # Task scheduler
//!
//! Runs named async jobs on cron schedules. Expressions have six fields, seconds first (`0 0 */4 * * *`), and are
//! evaluated in the business timezone.
//!
//! A job that is still running when its next trigger fires is skipped for that trigger. Stopping a job, or shutting
//! the scheduler down, cancels future triggers only; a run that is in progress is left to finish.
mod reconciler;

use std::{
    collections::HashMap,
    fmt::Debug,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use futures::{future::BoxFuture, FutureExt};
use log::*;
pub use reconciler::{start_reconcile_worker, DesiredJob, ScheduleReconciler};
use thiserror::Error;
use tokio::task::JoinHandle;

pub type JobTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps an async closure as a [`JobTask`].
pub fn job<F, Fut>(f: F) -> JobTask
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("A job named {0} is already registered")]
    DuplicateJob(String),
    #[error("Invalid schedule '{schedule}' for job {name}. {reason}")]
    InvalidSchedule { name: String, schedule: String, reason: String },
    #[error("No job named {0} is registered")]
    UnknownJob(String),
}

#[derive(Debug, Clone, Default)]
struct JobState {
    is_running: bool,
    run_count: u64,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub name: String,
    pub schedule: String,
    pub is_running: bool,
    pub run_count: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    /// Whether the job's timer is running
    pub active: bool,
}

struct JobEntry {
    expression: String,
    schedule: Schedule,
    task: JobTask,
    state: Arc<Mutex<JobState>>,
    timer: Option<JoinHandle<()>>,
}

impl JobEntry {
    fn info(&self, name: &str) -> JobInfo {
        let state = lock(&self.state).clone();
        JobInfo {
            name: name.to_string(),
            schedule: self.expression.clone(),
            is_running: state.is_running,
            run_count: state.run_count,
            last_run: state.last_run,
            next_run: state.next_run,
            active: self.timer.is_some(),
        }
    }

    fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        lock(&self.state).next_run = None;
    }
}

pub struct TaskScheduler {
    timezone: Tz,
    jobs: Mutex<HashMap<String, JobEntry>>,
}

impl Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskScheduler ({}, {} jobs)", self.timezone, lock(&self.jobs).len())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TaskScheduler {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone, jobs: Mutex::new(HashMap::new()) }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Registers `task` under `name` and starts its timer. Must be called from within a tokio runtime.
    pub fn add_job(&self, name: &str, schedule: &str, task: JobTask) -> Result<(), SchedulerError> {
        let parsed = Schedule::from_str(schedule).map_err(|e| SchedulerError::InvalidSchedule {
            name: name.to_string(),
            schedule: schedule.to_string(),
            reason: e.to_string(),
        })?;
        let mut jobs = lock(&self.jobs);
        if jobs.contains_key(name) {
            return Err(SchedulerError::DuplicateJob(name.to_string()));
        }
        let mut entry = JobEntry {
            expression: schedule.to_string(),
            schedule: parsed,
            task,
            state: Arc::new(Mutex::new(JobState::default())),
            timer: None,
        };
        let timer = self.spawn_timer(name, &entry);
        entry.timer = Some(timer);
        jobs.insert(name.to_string(), entry);
        info!("🕰️ Job {name} scheduled with '{schedule}' ({})", self.timezone);
        Ok(())
    }

    /// Stops and unregisters the job. Returns false if there was no such job.
    pub fn remove_job(&self, name: &str) -> bool {
        match lock(&self.jobs).remove(name) {
            Some(mut entry) => {
                entry.stop();
                info!("🕰️ Job {name} removed");
                true
            },
            None => false,
        }
    }

    pub fn has_job(&self, name: &str) -> bool {
        lock(&self.jobs).contains_key(name)
    }

    pub fn get_job(&self, name: &str) -> Option<JobInfo> {
        lock(&self.jobs).get(name).map(|entry| entry.info(name))
    }

    /// All registered jobs, ordered by name.
    pub fn get_all_jobs(&self) -> Vec<JobInfo> {
        let mut jobs = lock(&self.jobs).iter().map(|(name, entry)| entry.info(name)).collect::<Vec<JobInfo>>();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        jobs
    }

    /// Restarts the timer of a stopped job. Returns false if there is no such job.
    pub fn start_job(&self, name: &str) -> bool {
        let mut jobs = lock(&self.jobs);
        let Some(entry) = jobs.get_mut(name) else {
            return false;
        };
        if entry.timer.is_none() {
            let timer = self.spawn_timer(name, entry);
            entry.timer = Some(timer);
            info!("🕰️ Job {name} started");
        }
        true
    }

    /// Cancels future triggers of the job, keeping it registered. Returns false if there is no such job.
    pub fn stop_job(&self, name: &str) -> bool {
        match lock(&self.jobs).get_mut(name) {
            Some(entry) => {
                entry.stop();
                info!("🕰️ Job {name} stopped");
                true
            },
            None => false,
        }
    }

    /// Runs the job now, outside its schedule. Returns `None` if the job is already running.
    pub fn trigger_job(&self, name: &str) -> Result<Option<JoinHandle<()>>, SchedulerError> {
        let jobs = lock(&self.jobs);
        let entry = jobs.get(name).ok_or_else(|| SchedulerError::UnknownJob(name.to_string()))?;
        Ok(run_job(name.to_string(), entry.task.clone(), entry.state.clone()))
    }

    /// Stops every timer. Runs already in progress are not interrupted; use [`Self::wait_idle`] to wait for them.
    pub fn shutdown(&self) {
        let mut jobs = lock(&self.jobs);
        for entry in jobs.values_mut() {
            entry.stop();
        }
        info!("🕰️ Scheduler shut down. {} jobs stopped", jobs.len());
    }

    /// Waits until no job is running. Returns false if some job was still running after `timeout`.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let running = self.get_all_jobs().into_iter().filter(|j| j.is_running).map(|j| j.name).collect::<Vec<_>>();
            if running.is_empty() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("🕰️ Still waiting on {} after {timeout:?}", running.join(", "));
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    fn spawn_timer(&self, name: &str, entry: &JobEntry) -> JoinHandle<()> {
        let name = name.to_string();
        let schedule = entry.schedule.clone();
        let task = entry.task.clone();
        let state = entry.state.clone();
        let timezone = self.timezone;
        tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(timezone).next() else {
                    warn!("🕰️ Job {name} has no upcoming trigger. Its timer is exiting");
                    break;
                };
                let next = next.with_timezone(&Utc);
                lock(&state).next_run = Some(next);
                trace!("🕰️ Job {name} next runs at {next}");
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;
                run_job(name.clone(), task.clone(), state.clone());
            }
        })
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        let jobs = self.jobs.get_mut().unwrap_or_else(PoisonError::into_inner);
        for entry in jobs.values_mut() {
            entry.stop();
        }
    }
}

fn run_job(name: String, task: JobTask, state: Arc<Mutex<JobState>>) -> Option<JoinHandle<()>> {
    {
        let mut state = lock(&state);
        if state.is_running {
            warn!("🕰️ Job {name} is still running. Skipping this trigger");
            return None;
        }
        state.is_running = true;
        state.last_run = Some(Utc::now());
    }
    let run = task();
    Some(tokio::spawn(async move {
        debug!("🕰️ Job {name} started");
        if let Err(e) = tokio::spawn(run).await {
            error!("🕰️ Job {name} did not complete. {e}");
        }
        let mut state = lock(&state);
        state.is_running = false;
        state.run_count += 1;
        debug!("🕰️ Job {name} finished. {} runs so far", state.run_count);
    }))
}
