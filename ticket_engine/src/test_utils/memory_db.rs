use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use futures_util::{stream, stream::BoxStream, StreamExt};

use crate::{
    db_types::{Counter, CounterUpdate, ReportDocument, ReportStatus, StoreConfig, Ticket, TicketSource},
    traits::{
        CommitOutcome,
        CounterStorage,
        CreateOutcome,
        ReportStorage,
        StorageError,
        StoreConfigStorage,
        TicketStorage,
    },
};

#[derive(Default)]
struct MemoryState {
    counters: HashMap<(String, String), Counter>,
    tickets: Vec<Ticket>,
    reports: BTreeMap<String, ReportDocument>,
    store_configs: HashMap<String, StoreConfig>,
}

/// An in-memory backend that honours the same atomicity contracts as the SQLite backend. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
    interleave: bool,
}

impl std::fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryDatabase")
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Yield to the runtime before every operation, so that concurrent callers on the same runtime interleave
    /// between their reads and writes.
    pub fn with_interleaving(mut self) -> Self {
        self.interleave = true;
        self
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.state().tickets.clone()
    }

    pub fn counter(&self, id: &str, partition_key: &str) -> Option<Counter> {
        self.state().counters.get(&(id.to_string(), partition_key.to_string())).cloned()
    }

    pub fn reports(&self) -> Vec<ReportDocument> {
        self.state().reports.values().cloned().collect()
    }

    /// Stores a ticket without touching any counter.
    pub fn insert_ticket(&self, ticket: Ticket) {
        self.state().tickets.push(ticket);
    }

    /// Stores a report as-is, bypassing the counter.
    pub fn insert_report(&self, report: ReportDocument) {
        self.state().reports.insert(report.id.clone(), report);
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory database lock poisoned")
    }

    async fn pause(&self) {
        if self.interleave {
            tokio::task::yield_now().await;
        }
    }
}

fn counter_key(id: &str, partition_key: &str) -> (String, String) {
    (id.to_string(), partition_key.to_string())
}

fn counter_is_current(state: &MemoryState, update: &CounterUpdate) -> bool {
    state
        .counters
        .get(&counter_key(&update.id, &update.partition_key))
        .map(|c| c.version == update.expected_version)
        .unwrap_or(false)
}

fn apply_counter(state: &mut MemoryState, update: &CounterUpdate) {
    if let Some(counter) = state.counters.get_mut(&counter_key(&update.id, &update.partition_key)) {
        counter.current_value = update.new_value;
        counter.version += 1;
    }
}

impl CounterStorage for MemoryDatabase {
    async fn fetch_counter(&self, id: &str, partition_key: &str) -> Result<Option<Counter>, StorageError> {
        self.pause().await;
        Ok(self.counter(id, partition_key))
    }

    async fn create_counter(&self, id: &str, partition_key: &str) -> Result<CreateOutcome<Counter>, StorageError> {
        self.pause().await;
        let mut state = self.state();
        let key = counter_key(id, partition_key);
        if state.counters.contains_key(&key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let counter = Counter::new(id, partition_key);
        state.counters.insert(key, counter.clone());
        Ok(CreateOutcome::Created(counter))
    }
}

impl TicketStorage for MemoryDatabase {
    async fn fetch_ticket(&self, source: &TicketSource, partition_key: &str) -> Result<Option<Ticket>, StorageError> {
        self.pause().await;
        let state = self.state();
        Ok(state.tickets.iter().find(|t| &t.source == source && t.partition_key == partition_key).cloned())
    }

    async fn commit_ticket(
        &self,
        counter: &CounterUpdate,
        ticket: &Ticket,
    ) -> Result<CommitOutcome<Ticket>, StorageError> {
        self.pause().await;
        let mut state = self.state();
        if !counter_is_current(&state, counter) {
            return Ok(CommitOutcome::StaleCounter);
        }
        let duplicate = state
            .tickets
            .iter()
            .any(|t| t.id == ticket.id || (t.source == ticket.source && t.partition_key == ticket.partition_key));
        if duplicate {
            return Ok(CommitOutcome::Duplicate);
        }
        apply_counter(&mut state, counter);
        state.tickets.push(ticket.clone());
        Ok(CommitOutcome::Committed(ticket.clone()))
    }

    fn tickets_in_range(
        &self,
        partition_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxStream<'_, Result<Ticket, StorageError>> {
        let mut tickets = self
            .state()
            .tickets
            .iter()
            .filter(|t| t.partition_key == partition_key && t.created_at >= start && t.created_at <= end)
            .cloned()
            .collect::<Vec<Ticket>>();
        tickets.sort_by_key(|t| t.created_at);
        stream::iter(tickets.into_iter().map(Ok)).boxed()
    }
}

impl ReportStorage for MemoryDatabase {
    async fn fetch_report(&self, year: i32, month: u32) -> Result<Option<ReportDocument>, StorageError> {
        self.pause().await;
        Ok(self.state().reports.get(&ReportDocument::report_id(year, month)).cloned())
    }

    async fn fetch_report_by_id(&self, id: &str) -> Result<Option<ReportDocument>, StorageError> {
        self.pause().await;
        Ok(self.state().reports.get(id).cloned())
    }

    async fn replace_report(&self, report: &ReportDocument) -> Result<ReportDocument, StorageError> {
        self.pause().await;
        let mut state = self.state();
        let existing = state.reports.get_mut(&report.id).ok_or_else(|| StorageError::ReportNotFound(report.id.clone()))?;
        let identifier = existing.identifier;
        *existing = ReportDocument { identifier, ..report.clone() };
        Ok(existing.clone())
    }

    async fn commit_report(
        &self,
        counter: &CounterUpdate,
        report: &ReportDocument,
    ) -> Result<CommitOutcome<ReportDocument>, StorageError> {
        self.pause().await;
        let mut state = self.state();
        if !counter_is_current(&state, counter) {
            return Ok(CommitOutcome::StaleCounter);
        }
        if state.reports.contains_key(&report.id) || state.reports.values().any(|r| r.identifier == report.identifier)
        {
            return Ok(CommitOutcome::Duplicate);
        }
        apply_counter(&mut state, counter);
        state.reports.insert(report.id.clone(), report.clone());
        Ok(CommitOutcome::Committed(report.clone()))
    }

    async fn update_report_status(
        &self,
        id: &str,
        status: ReportStatus,
        error: Option<String>,
    ) -> Result<ReportDocument, StorageError> {
        self.pause().await;
        let mut state = self.state();
        let report = state.reports.get_mut(id).ok_or_else(|| StorageError::ReportNotFound(id.to_string()))?;
        let now = Utc::now();
        report.status = status;
        report.error = error;
        report.updated_at = now;
        if status == ReportStatus::Failure {
            report.retry_count += 1;
            report.last_retry_date = Some(now);
        }
        Ok(report.clone())
    }

    fn reports_with_status(&self, status: ReportStatus) -> BoxStream<'_, Result<ReportDocument, StorageError>> {
        let reports =
            self.state().reports.values().filter(|r| r.status == status).cloned().collect::<Vec<ReportDocument>>();
        stream::iter(reports.into_iter().map(Ok)).boxed()
    }
}

impl StoreConfigStorage for MemoryDatabase {
    async fn fetch_store_config(&self, shop: &str) -> Result<Option<StoreConfig>, StorageError> {
        self.pause().await;
        Ok(self.state().store_configs.get(shop).cloned())
    }

    async fn save_store_config(&self, config: &StoreConfig) -> Result<StoreConfig, StorageError> {
        self.pause().await;
        self.state().store_configs.insert(config.shop.clone(), config.clone());
        Ok(config.clone())
    }
}
