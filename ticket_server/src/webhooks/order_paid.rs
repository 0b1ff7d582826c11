use std::{fmt::Debug, sync::Arc};

use log::*;
use ticket_engine::{
    generate_order_summary,
    shopify_types::OrderPaidPayload,
    traits::{OrderAnnotator, StoreConfigStorage, TaxSettingSource, TicketStorage},
    StoreConfigApi,
    SummaryOptions,
    TicketNumberGenerator,
    DEFAULT_EXCLUSION_TAG,
};

use crate::{
    errors::WebhookError,
    webhooks::{annotate_order, WebhookContext, WebhookHandler, WebhookOutcome},
};

/// Issues a ticket for a paid order and writes its number onto the order.
pub struct OrderPaidHandler<B, A, S> {
    tickets: Arc<TicketNumberGenerator<B>>,
    store_config: Arc<StoreConfigApi<B, S>>,
    annotator: Arc<A>,
    exclusion_tag: Option<String>,
}

impl<B, A, S> Debug for OrderPaidHandler<B, A, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderPaidHandler (excluding {:?})", self.exclusion_tag)
    }
}

impl<B, A, S> OrderPaidHandler<B, A, S> {
    pub fn new(
        tickets: Arc<TicketNumberGenerator<B>>,
        store_config: Arc<StoreConfigApi<B, S>>,
        annotator: Arc<A>,
    ) -> Self {
        Self { tickets, store_config, annotator, exclusion_tag: Some(DEFAULT_EXCLUSION_TAG.to_string()) }
    }

    pub fn with_exclusion_tag(mut self, tag: Option<String>) -> Self {
        self.exclusion_tag = tag;
        self
    }
}

impl<B, A, S> WebhookHandler for OrderPaidHandler<B, A, S>
where
    B: TicketStorage + StoreConfigStorage,
    A: OrderAnnotator,
    S: TaxSettingSource,
{
    type Payload = OrderPaidPayload;

    fn topic(&self) -> &'static str {
        "orders/paid"
    }

    async fn handle(&self, ctx: WebhookContext<OrderPaidPayload>) -> Result<WebhookOutcome, WebhookError> {
        let order = ctx.payload;
        let taxes_included = self.store_config.taxes_included(&ctx.shop).await?;
        debug!("🎫️ Processing order #{} ({}) from {}. Taxes included: {taxes_included}", order.id, order.name, ctx.shop);
        let options = SummaryOptions { taxes_included, exclusion_tag: self.exclusion_tag.clone() };
        let Some(summary) = generate_order_summary(&order, &options)? else {
            return Ok(WebhookOutcome::Discarded(format!("Order #{} does not need a ticket", order.id)));
        };
        let ticket = self.tickets.find_or_generate_ticket(summary.into()).await?;
        info!("🎫️ Order #{} has ticket {}", order.id, ticket.id);
        let annotated = annotate_order(self.annotator.as_ref(), order.id, &ticket).await;
        Ok(WebhookOutcome::Ticketed { ticket, annotated })
    }
}
