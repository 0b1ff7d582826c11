use chrono::{DateTime, Utc};
use cucumber::{then, when};
use ticket_engine::{
    db_types::{ReportDocument, ReportStatus, TaxLine, TicketRequest, TicketSource},
    traits::{CounterStorage, TicketStorage},
    ticket_counter_id,
};

use crate::cucumber::TicketWorld;

fn request(source: TicketSource, timestamp: &str, net: f64, tax: f64, rate: i64) -> TicketRequest {
    let created_at = timestamp.parse::<DateTime<Utc>>().expect("Not a valid timestamp");
    let total = ((net + tax) * 100.0).round() / 100.0;
    TicketRequest {
        source,
        created_at,
        total_amount: total,
        currency: "EUR".to_string(),
        tax_lines: vec![TaxLine { rate: rate as f64 / 100.0, price: net, tax, currency: "EUR".to_string() }],
    }
}

async fn issue_ticket(world: &mut TicketWorld, request: TicketRequest) {
    let system = world.system();
    let ticket = system.tickets.find_or_generate_ticket(request).await.expect("Error numbering ticket");
    system.last_ticket = Some(ticket);
}

async fn report(world: &mut TicketWorld, year: i32, month: u32) -> ReportDocument {
    world
        .system()
        .reporting
        .find_report(year, month)
        .await
        .expect("Error fetching report")
        .unwrap_or_else(|| panic!("No report stored for {year}-{month:02}"))
}

#[when(expr = "order {int} is paid at {word} for {float} EUR net plus {float} EUR tax at {int}%")]
async fn order_paid(world: &mut TicketWorld, order_id: i64, timestamp: String, net: f64, tax: f64, rate: i64) {
    let source = TicketSource::Order { order_id };
    issue_ticket(world, request(source, &timestamp, net, tax, rate)).await;
}

#[when(expr = "refund {int} of order {int} is issued at {word} for {float} EUR net plus {float} EUR tax at {int}%")]
async fn refund_created(
    world: &mut TicketWorld,
    refund_id: i64,
    order_id: i64,
    timestamp: String,
    net: f64,
    tax: f64,
    rate: i64,
) {
    let source = TicketSource::Refund { order_id, refund_id };
    issue_ticket(world, request(source, &timestamp, net, tax, rate)).await;
}

#[when(expr = "the report for month {int} of {int} is generated")]
async fn generate_report(world: &mut TicketWorld, month: u32, year: i32) {
    let system = world.system();
    match system.reporting.generate_monthly_report(year, month).await {
        Ok(_) => system.last_error = None,
        Err(e) => system.last_error = Some(e.to_string()),
    }
}

#[when(expr = "the ERP answers with status {int} and {string}")]
async fn erp_answers(world: &mut TicketWorld, status: u16, body: String) {
    world.system().erp.answer_with(status, &body);
}

#[when(expr = "the report for month {int} of {int} is sent")]
async fn send_report(world: &mut TicketWorld, month: u32, year: i32) {
    let system = world.system();
    let result = system.reporting.send_report(year, month).await.expect("Error sending report");
    system.last_send = Some(result);
}

#[when("failed reports are retried")]
async fn retry_failed(world: &mut TicketWorld) {
    let system = world.system();
    let results = system.reporting.retry_failed_reports().await;
    system.last_send = results.into_iter().last();
}

#[then(expr = "order {int} has ticket {word}")]
async fn order_has_ticket(world: &mut TicketWorld, order_id: i64, expected: String) {
    let system = world.system();
    let ticket =
        system.db.fetch_ticket(&TicketSource::Order { order_id }, &expected_year(&expected)).await.expect("db error");
    assert_eq!(ticket.map(|t| t.id), Some(expected));
}

#[then(expr = "refund {int} of order {int} has ticket {word}")]
async fn refund_has_ticket(world: &mut TicketWorld, refund_id: i64, order_id: i64, expected: String) {
    let system = world.system();
    let source = TicketSource::Refund { order_id, refund_id };
    let ticket = system.db.fetch_ticket(&source, &expected_year(&expected)).await.expect("db error");
    assert_eq!(ticket.map(|t| t.id), Some(expected));
}

#[then(expr = "the last ticket issued is {word}")]
async fn last_ticket(world: &mut TicketWorld, expected: String) {
    let ticket = world.system().last_ticket.as_ref().map(|t| t.id.clone());
    assert_eq!(ticket, Some(expected));
}

#[then(expr = "the ticket counter for {int} is at {int}")]
async fn counter_value(world: &mut TicketWorld, year: i32, expected: i64) {
    let partition = year.to_string();
    let counter = world.system().db.fetch_counter(&ticket_counter_id(&partition), &partition).await.expect("db error");
    assert_eq!(counter.map(|c| c.current_value), Some(expected));
}

#[then(expr = "the report for month {int} of {int} has identifier {int}")]
async fn report_identifier(world: &mut TicketWorld, month: u32, year: i32, identifier: i64) {
    let report = report(world, year, month).await;
    assert_eq!(report.identifier, identifier);
    assert_eq!(report.report.identifier(), Some(identifier.to_string().as_str()));
}

#[then(expr = "the report for month {int} of {int} charges the customer {word}")]
async fn report_customer_amount(world: &mut TicketWorld, month: u32, year: i32, amount: String) {
    let report = report(world, year, month).await;
    assert_eq!(report.report.invoice.customer_position.amount, amount);
}

#[then(expr = "the report for month {int} of {int} has {int} income positions")]
async fn report_income_positions(world: &mut TicketWorld, month: u32, year: i32, count: usize) {
    let report = report(world, year, month).await;
    assert_eq!(report.report.invoice.income_positions.len(), count);
    assert_eq!(report.report.invoice.tax_positions.len(), count);
}

#[then(expr = "the report for month {int} of {int} is {word} after {int} failed attempts")]
async fn report_state(world: &mut TicketWorld, month: u32, year: i32, status: String, retries: i64) {
    let report = report(world, year, month).await;
    let expected = status.parse::<ReportStatus>().expect("Not a report status");
    assert_eq!(report.status, expected);
    assert_eq!(report.retry_count, retries);
}

#[then("the last delivery succeeded")]
async fn delivery_succeeded(world: &mut TicketWorld) {
    let result = world.system().last_send.clone().expect("Nothing was sent");
    assert!(result.success, "Delivery failed: {:?}", result.error);
    assert_eq!(result.status_code, Some(200));
}

#[then(expr = "the last delivery failed with {string}")]
async fn delivery_failed(world: &mut TicketWorld, message: String) {
    let result = world.system().last_send.clone().expect("Nothing was sent");
    assert!(!result.success);
    assert_eq!(result.error, Some(message));
}

#[then(expr = "the ERP received {int} submissions")]
async fn erp_received(world: &mut TicketWorld, count: usize) {
    assert_eq!(world.system().erp.received().len(), count);
}

#[then(expr = "report generation failed with {string}")]
async fn generation_failed(world: &mut TicketWorld, message: String) {
    assert_eq!(world.system().last_error.clone(), Some(message));
}

/// `T25-0001` belongs to partition `2025`.
fn expected_year(ticket: &str) -> String {
    format!("20{}", &ticket[1..3])
}
