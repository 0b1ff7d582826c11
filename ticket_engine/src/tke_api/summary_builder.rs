//! Tax summaries for paid orders and refunds.
//!
//! A summary splits the amount of an event into one bucket per tax rate, holding the net price and the tax of that
//! rate. The buckets of a summary always add up to its total to within a cent: any larger residual (shipping,
//! order-level adjustments, rounding) is moved into the bucket with the largest net price. Buckets keep the order in
//! which their rate was first seen, so the same payload always produces the same summary.
use chrono::{DateTime, Utc};
use log::*;
use ticket_common::money::{parse_amount, round_to_two_decimals, safe_add, safe_divide, safe_multiply, safe_sub};

use crate::{
    db_types::{TaxLine, TicketRequest, TicketSource},
    shopify_types::{Money, OrderLineItem, OrderPaidPayload, RefundCreatedPayload, RefundLineItem, ShopifyTaxLine},
    tke_api::errors::SummaryError,
};

/// Discrepancies up to this amount are treated as rounding noise and left alone.
pub const ROUNDING_TOLERANCE: f64 = 0.01;

pub const DEFAULT_EXCLUSION_TAG: &str = "ceco";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryOptions {
    /// Whether the shop's prices already include tax
    pub taxes_included: bool,
    /// Orders carrying this tag are not ticketed
    pub exclusion_tag: Option<String>,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self { taxes_included: false, exclusion_tag: Some(DEFAULT_EXCLUSION_TAG.to_string()) }
    }
}

impl SummaryOptions {
    pub fn new(taxes_included: bool) -> Self {
        Self { taxes_included, ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderSummary {
    pub order_id: i64,
    pub created_at: DateTime<Utc>,
    pub total_amount: f64,
    pub currency: String,
    pub tax_lines: Vec<TaxLine>,
}

impl From<OrderSummary> for TicketRequest {
    fn from(summary: OrderSummary) -> Self {
        TicketRequest {
            source: TicketSource::Order { order_id: summary.order_id },
            created_at: summary.created_at,
            total_amount: summary.total_amount,
            currency: summary.currency,
            tax_lines: summary.tax_lines,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefundSummary {
    pub refund_id: i64,
    pub order_id: i64,
    pub created_at: DateTime<Utc>,
    pub total_amount: f64,
    pub currency: String,
    pub tax_lines: Vec<TaxLine>,
}

impl From<RefundSummary> for TicketRequest {
    fn from(summary: RefundSummary) -> Self {
        TicketRequest {
            source: TicketSource::Refund { order_id: summary.order_id, refund_id: summary.refund_id },
            created_at: summary.created_at,
            total_amount: summary.total_amount,
            currency: summary.currency,
            tax_lines: summary.tax_lines,
        }
    }
}

/// Accumulates amounts per tax rate, in first-seen order.
#[derive(Debug, Clone, Default)]
pub(crate) struct TaxGroups {
    groups: Vec<TaxGroup>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TaxGroup {
    pub rate: f64,
    pub price: f64,
    pub tax: f64,
}

impl TaxGroups {
    pub fn add(&mut self, rate: f64, price: f64, tax: f64) {
        match self.groups.iter_mut().find(|g| g.rate == rate) {
            Some(group) => {
                group.price = safe_add(group.price, price);
                group.tax = safe_add(group.tax, tax);
            },
            None => self.groups.push(TaxGroup { rate, price: round_to_two_decimals(price), tax: round_to_two_decimals(tax) }),
        }
    }

    /// Σ(price + tax) over all groups
    pub fn total(&self) -> f64 {
        self.groups.iter().fold(0.0, |acc, g| safe_add(acc, safe_add(g.price, g.tax)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaxGroup> {
        self.groups.iter()
    }

    /// Moves the difference between `expected_total` and the group total into the group with the largest price, if
    /// it exceeds the rounding tolerance. Ties go to the group seen first.
    pub fn absorb_residual(&mut self, expected_total: f64) {
        let discrepancy = safe_sub(expected_total, self.total());
        if discrepancy.abs() <= ROUNDING_TOLERANCE {
            return;
        }
        let largest = self.groups.iter_mut().reduce(|max, g| if g.price > max.price { g } else { max });
        if let Some(group) = largest {
            debug!("🧾️ Moving a residual of {discrepancy:.2} into the {} group", group.rate);
            group.price = safe_add(group.price, discrepancy);
        }
    }

    pub fn into_tax_lines(self, currency: &str) -> Vec<TaxLine> {
        self.groups
            .into_iter()
            .map(|g| TaxLine { rate: g.rate, price: g.price, tax: g.tax, currency: currency.to_string() })
            .collect()
    }
}

fn money_amount(money: &Money) -> Result<f64, SummaryError> {
    Ok(parse_amount(&money.amount)?)
}

/// The tax charged on a line, in shop currency where the payload provides it.
fn tax_line_amount(line: &ShopifyTaxLine) -> Result<f64, SummaryError> {
    match &line.price_set {
        Some(set) => money_amount(&set.shop_money),
        None => Ok(parse_amount(&line.price)?),
    }
}

fn add_order_line_item(
    item: &OrderLineItem,
    taxes_included: bool,
    groups: &mut TaxGroups,
) -> Result<(), SummaryError> {
    let unit_price = parse_amount(&item.price)?;
    let gross = safe_multiply(unit_price, item.quantity as f64);
    let mut discount = 0.0;
    for allocation in &item.discount_allocations {
        discount = safe_add(discount, parse_amount(&allocation.amount)?);
    }
    let mut net_price = safe_sub(gross, discount);
    if item.tax_lines.is_empty() {
        groups.add(0.0, net_price, 0.0);
        return Ok(());
    }
    let total_rate: f64 = item.tax_lines.iter().map(|t| t.rate).sum();
    if taxes_included {
        net_price = safe_divide(net_price, 1.0 + total_rate)?;
    }
    let line_count = item.tax_lines.len() as f64;
    for tax_line in &item.tax_lines {
        let share = if total_rate > 0.0 {
            safe_multiply(net_price, tax_line.rate / total_rate)
        } else {
            safe_divide(net_price, line_count)?
        };
        groups.add(tax_line.rate, share, tax_line_amount(tax_line)?);
    }
    Ok(())
}

/// Builds the tax summary of a paid order.
///
/// Returns `Ok(None)` when the order must not be ticketed: it carries the exclusion tag or has no line items.
pub fn generate_order_summary(
    order: &OrderPaidPayload,
    options: &SummaryOptions,
) -> Result<Option<OrderSummary>, SummaryError> {
    if let Some(tag) = options.exclusion_tag.as_deref() {
        if order.has_tag(tag) {
            info!("🧾️ Order #{} is tagged '{tag}'. Discarded", order.id);
            return Ok(None);
        }
    }
    if order.line_items.is_empty() {
        info!("🧾️ Order #{} has no line items. Discarded", order.id);
        return Ok(None);
    }
    let mut groups = TaxGroups::default();
    for item in &order.line_items {
        add_order_line_item(item, options.taxes_included, &mut groups)?;
    }
    let total_amount = parse_amount(&order.total_price)?;
    groups.absorb_residual(total_amount);
    let summary = OrderSummary {
        order_id: order.id,
        created_at: order.created_at,
        total_amount,
        currency: order.currency.clone(),
        tax_lines: groups.into_tax_lines(&order.currency),
    };
    debug!("🧾️ Summary for order #{}: {summary:?}", order.id);
    Ok(Some(summary))
}

struct RefundLineAmounts {
    rate: f64,
    price: f64,
    tax: f64,
    /// What the customer gets back for this line
    total: f64,
}

fn refund_line_amounts(item: &RefundLineItem, taxes_included: bool) -> Result<RefundLineAmounts, SummaryError> {
    let subtotal = money_amount(&item.subtotal_set.shop_money)?;
    let tax_line = item.line_item.tax_lines.first();
    let rate = tax_line.map(|t| t.rate).unwrap_or(0.0);
    if taxes_included {
        let price = safe_divide(subtotal, 1.0 + rate)?;
        return Ok(RefundLineAmounts { rate, price, tax: safe_sub(subtotal, price), total: subtotal });
    }
    let tax = match (&item.total_tax_set, tax_line) {
        (Some(set), _) => money_amount(&set.shop_money)?,
        (None, Some(line)) => tax_line_amount(line)?,
        (None, None) => 0.0,
    };
    // The refund subtotal already carries the tax
    Ok(RefundLineAmounts { rate, price: safe_sub(subtotal, tax), tax, total: subtotal })
}

/// Builds the tax summary of a refund. Each refunded line carries a single tax rate.
///
/// Returns `Ok(None)` for a refund without refunded lines (e.g. a shipping-only or restock-only refund).
pub fn generate_refund_summary(
    refund: &RefundCreatedPayload,
    taxes_included: bool,
) -> Result<Option<RefundSummary>, SummaryError> {
    let Some(first) = refund.refund_line_items.first() else {
        info!("🧾️ Refund #{} of order #{} has no refund line items. Discarded", refund.id, refund.order_id);
        return Ok(None);
    };
    let currency = first.subtotal_set.shop_money.currency_code.clone();
    let mut groups = TaxGroups::default();
    let mut total_amount = 0.0;
    for item in &refund.refund_line_items {
        let line = refund_line_amounts(item, taxes_included)?;
        groups.add(line.rate, line.price, line.tax);
        total_amount = safe_add(total_amount, line.total);
    }
    groups.absorb_residual(total_amount);
    let summary = RefundSummary {
        refund_id: refund.id,
        order_id: refund.order_id,
        created_at: refund.created_at,
        total_amount,
        currency: currency.clone(),
        tax_lines: groups.into_tax_lines(&currency),
    };
    debug!("🧾️ Summary for refund #{}: {summary:?}", refund.id);
    Ok(Some(summary))
}
