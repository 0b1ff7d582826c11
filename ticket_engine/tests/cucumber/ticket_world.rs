use std::sync::{Arc, Mutex};

use cucumber::World;
use log::*;
use ticket_engine::{
    db_types::Ticket,
    helpers::RetryPolicy,
    report_objects::MonthlyReport,
    test_utils::prepare_env::{create_database, random_db_path, run_migrations},
    traits::{ReportTransport, TransportError, TransportResponse},
    ReportingApi,
    SendReportResult,
    SqliteDatabase,
    TicketNumberGenerator,
};

#[derive(Default, Debug, World)]
pub struct TicketWorld {
    pub system: Option<TicketSystem>,
}

/// An ERP stand-in that answers every submission with a configurable status.
#[derive(Debug, Clone)]
pub struct ScriptedErp {
    answer: Arc<Mutex<(u16, String)>>,
    received: Arc<Mutex<Vec<String>>>,
}

impl Default for ScriptedErp {
    fn default() -> Self {
        Self { answer: Arc::new(Mutex::new((200, "OK".to_string()))), received: Arc::new(Mutex::new(Vec::new())) }
    }
}

impl ScriptedErp {
    pub fn answer_with(&self, status: u16, body: &str) {
        *self.answer.lock().unwrap() = (status, body.to_string());
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

impl ReportTransport for ScriptedErp {
    async fn post_report(&self, report: &MonthlyReport) -> Result<TransportResponse, TransportError> {
        self.received.lock().unwrap().push(report.invoice.header.reference.clone());
        let (status, body) = self.answer.lock().unwrap().clone();
        Ok(TransportResponse::new(status, body))
    }
}

#[derive(Debug)]
pub struct TicketSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub tickets: TicketNumberGenerator<SqliteDatabase>,
    pub reporting: ReportingApi<SqliteDatabase, ScriptedErp>,
    pub erp: ScriptedErp,
    pub last_ticket: Option<Ticket>,
    pub last_send: Option<SendReportResult>,
    pub last_error: Option<String>,
}

impl TicketWorld {
    pub fn system(&mut self) -> &mut TicketSystem {
        self.system.as_mut().expect("Ticket system not initialised")
    }
}

impl TicketSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 2).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let policy = RetryPolicy::default();
        let tickets = TicketNumberGenerator::new(db.clone()).with_retry_policy(policy);
        let erp = ScriptedErp::default();
        let reporting = ReportingApi::new(db.clone(), erp.clone()).with_retry_policy(policy);
        Self { db_path: url, db, tickets, reporting, erp, last_ticket: None, last_send: None, last_error: None }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
