//! Webhook payloads as the commerce platform delivers them. Only the fields the engine reads are modelled; amounts
//! stay as the decimal strings they arrive as and are parsed with `ticket_common::money::parse_amount`.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub amount: String,
    pub currency_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoneySet {
    pub shop_money: Money,
    pub presentment_money: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopifyTaxLine {
    pub rate: f64,
    #[serde(default)]
    pub title: String,
    /// The tax charged for the whole line item
    pub price: String,
    #[serde(default)]
    pub price_set: Option<MoneySet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountAllocation {
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    pub quantity: i64,
    /// Unit price
    pub price: String,
    #[serde(default)]
    pub discount_allocations: Vec<DiscountAllocation>,
    #[serde(default)]
    pub tax_lines: Vec<ShopifyTaxLine>,
}

/// The `orders/paid` webhook body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaidPayload {
    pub id: i64,
    #[serde(default)]
    pub admin_graphql_api_id: String,
    #[serde(default)]
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub total_price: String,
    pub currency: String,
    /// Comma separated, e.g. `"ceco, wholesale"`
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub line_items: Vec<OrderLineItem>,
}

impl OrderPaidPayload {
    pub fn tags(&self) -> Vec<&str> {
        self.tags.split(',').map(str::trim).filter(|t| !t.is_empty()).collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundedLineItem {
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub tax_lines: Vec<ShopifyTaxLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundLineItem {
    pub id: i64,
    pub quantity: i64,
    /// The refunded amount for this line. It includes tax when the shop prices include tax.
    pub subtotal_set: MoneySet,
    #[serde(default)]
    pub total_tax_set: Option<MoneySet>,
    pub line_item: RefundedLineItem,
}

/// The `refunds/create` webhook body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundCreatedPayload {
    pub id: i64,
    pub order_id: i64,
    #[serde(default)]
    pub admin_graphql_api_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub refund_line_items: Vec<RefundLineItem>,
}
