use std::fmt::Debug;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures_util::TryStreamExt;
use log::*;
use ticket_common::money::{format_amount, format_tax_rate, safe_add, safe_multiply, safe_sub};

use crate::{
    db_types::Ticket,
    helpers::{last_day_of_month, month_bounds, DEFAULT_BUSINESS_TIMEZONE},
    tke_api::{
        errors::ReportError,
        report_objects::{
            CustomerPosition,
            IncomePosition,
            Invoice,
            MonthlyReport,
            PostingConstants,
            ReportHeader,
            TaxPosition,
        },
        summary_builder::TaxGroups,
    },
    traits::TicketStorage,
};

/// Everything the posting document needs from one pass over a month of tickets.
struct MonthAggregate {
    first: Ticket,
    last: Ticket,
    currency: String,
    groups: TaxGroups,
    total_with_tax: f64,
}

/// Builds the monthly posting document from the tickets issued in a month.
///
/// Sales and refunds are netted per tax rate (refunds count negatively). Unlike the per-event summaries, a
/// disagreement between the ticket totals and the per-rate totals is not corrected here: it means stored tickets are
/// inconsistent, and generation fails with [`ReportError::TotalsMismatch`].
pub struct MonthlyReportGenerator<B> {
    db: B,
    timezone: Tz,
    constants: PostingConstants,
}

impl<B> Debug for MonthlyReportGenerator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MonthlyReportGenerator ({})", self.timezone)
    }
}

impl<B> MonthlyReportGenerator<B> {
    pub fn new(db: B) -> Self {
        Self { db, timezone: DEFAULT_BUSINESS_TIMEZONE, constants: PostingConstants::default() }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_constants(mut self, constants: PostingConstants) -> Self {
        self.constants = constants;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

impl<B> MonthlyReportGenerator<B>
where B: TicketStorage
{
    pub async fn generate_report(&self, year: i32, month: u32) -> Result<MonthlyReport, ReportError> {
        info!("📊️ Generating monthly report for {year}-{month:02}");
        let (start, end) = month_bounds(year, month, self.timezone).ok_or(ReportError::InvalidPeriod { year, month })?;
        let last_day = last_day_of_month(year, month).ok_or(ReportError::InvalidPeriod { year, month })?;
        let aggregate = self.aggregate_tickets(year, month, start, end).await?;
        let date = last_day.format("%Y%m%d").to_string();
        let ticket_range = format!("{}_{}", aggregate.first.id, aggregate.last.id);
        let c = &self.constants;

        let header = ReportHeader {
            identifier: None,
            document_date: date.clone(),
            posting_date: date.clone(),
            fiscal_year: year.to_string(),
            period: format!("{month:02}"),
            company_code: c.company_code.clone(),
            document_class: c.document_class.clone(),
            reference: aggregate.last.id.clone(),
            header_text: format!("{}_", aggregate.first.id),
            vat_date: date,
        };
        let mut position = 1;
        let customer_position = CustomerPosition {
            position: position.to_string(),
            customer_account: c.customer_account.clone(),
            account: String::new(),
            amount: format_amount(aggregate.total_with_tax),
            currency: aggregate.currency.clone(),
            assignment: ticket_range.clone(),
            description: String::new(),
            profit_center: c.profit_center.clone(),
        };
        let groups = aggregate.groups.iter().filter(|g| g.price != 0.0 || g.tax != 0.0).collect::<Vec<_>>();
        let mut income_positions = Vec::with_capacity(groups.len());
        for group in &groups {
            position += 1;
            income_positions.push(IncomePosition {
                position: position.to_string(),
                income_account: c.income_account.clone(),
                amount: format_amount(-group.price),
                currency: aggregate.currency.clone(),
                vat_indicator: format_tax_rate(group.rate),
                profit_center: c.profit_center.clone(),
                project_element: c.project_element.clone(),
                assignment: ticket_range.clone(),
                description: String::new(),
            });
        }
        let mut tax_positions = Vec::with_capacity(groups.len());
        for group in &groups {
            position += 1;
            tax_positions.push(TaxPosition {
                position: position.to_string(),
                tax_account: c.tax_account.clone(),
                amount: format_amount(-group.tax),
                currency: aggregate.currency.clone(),
                vat_indicator: format_tax_rate(group.rate),
                assignment: ticket_range.clone(),
                description: String::new(),
                profit_center: String::new(),
                taxable_base: format_amount(group.price.abs()),
            });
        }
        info!(
            "📊️ Report for {year}-{month:02} covers tickets {ticket_range} with a total of {:.2}",
            aggregate.total_with_tax
        );
        Ok(MonthlyReport { invoice: Invoice { header, customer_position, income_positions, tax_positions } })
    }

    async fn aggregate_tickets(
        &self,
        year: i32,
        month: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<MonthAggregate, ReportError> {
        let partition_key = year.to_string();
        let mut tickets = self.db.tickets_in_range(&partition_key, start, end);
        let mut first = None;
        let mut last = None;
        let mut groups = TaxGroups::default();
        let mut total_with_tax = 0.0;
        let mut count = 0usize;
        while let Some(ticket) = tickets.try_next().await? {
            let sign = ticket.source.sign();
            total_with_tax = safe_add(total_with_tax, safe_multiply(ticket.total_amount, sign));
            for line in &ticket.tax_lines {
                groups.add(line.rate, line.price * sign, line.tax * sign);
            }
            if first.is_none() {
                first = Some(ticket.clone());
            }
            last = Some(ticket);
            count += 1;
        }
        let (Some(first), Some(last)) = (first, last) else {
            warn!("📊️ No tickets found for {year}-{month:02}");
            return Err(ReportError::NoTickets { year, month });
        };
        let groups_total = groups.total();
        if safe_sub(total_with_tax, groups_total) != 0.0 {
            error!("📊️ Ticket totals ({total_with_tax:.2}) and tax group totals ({groups_total:.2}) disagree");
            return Err(ReportError::TotalsMismatch { tickets_total: total_with_tax, groups_total });
        }
        debug!("📊️ Aggregated {count} tickets for {year}-{month:02}");
        let currency = first.currency.clone();
        Ok(MonthAggregate { first, last, currency, groups, total_with_tax })
    }
}
