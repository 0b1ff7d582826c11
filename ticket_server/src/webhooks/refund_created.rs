use std::{fmt::Debug, sync::Arc};

use log::*;
use ticket_engine::{
    generate_refund_summary,
    shopify_types::RefundCreatedPayload,
    traits::{OrderAnnotator, StoreConfigStorage, TaxSettingSource, TicketStorage},
    StoreConfigApi,
    TicketNumberGenerator,
};

use crate::{
    errors::WebhookError,
    webhooks::{annotate_order, WebhookContext, WebhookHandler, WebhookOutcome},
};

/// Issues a ticket for a refund and adds its number to the refunded order.
pub struct RefundCreatedHandler<B, A, S> {
    tickets: Arc<TicketNumberGenerator<B>>,
    store_config: Arc<StoreConfigApi<B, S>>,
    annotator: Arc<A>,
}

impl<B, A, S> Debug for RefundCreatedHandler<B, A, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundCreatedHandler")
    }
}

impl<B, A, S> RefundCreatedHandler<B, A, S> {
    pub fn new(
        tickets: Arc<TicketNumberGenerator<B>>,
        store_config: Arc<StoreConfigApi<B, S>>,
        annotator: Arc<A>,
    ) -> Self {
        Self { tickets, store_config, annotator }
    }
}

impl<B, A, S> WebhookHandler for RefundCreatedHandler<B, A, S>
where
    B: TicketStorage + StoreConfigStorage,
    A: OrderAnnotator,
    S: TaxSettingSource,
{
    type Payload = RefundCreatedPayload;

    fn topic(&self) -> &'static str {
        "refunds/create"
    }

    async fn handle(&self, ctx: WebhookContext<RefundCreatedPayload>) -> Result<WebhookOutcome, WebhookError> {
        let refund = ctx.payload;
        if refund.refund_line_items.is_empty() {
            info!("🎫️ Refund #{} of order #{} has no refunded lines. Discarded", refund.id, refund.order_id);
            return Ok(WebhookOutcome::Discarded(format!("Refund #{} has no refund line items", refund.id)));
        }
        let taxes_included = self.store_config.taxes_included(&ctx.shop).await?;
        debug!("🎫️ Processing refund #{} of order #{}. Taxes included: {taxes_included}", refund.id, refund.order_id);
        let Some(summary) = generate_refund_summary(&refund, taxes_included)? else {
            return Ok(WebhookOutcome::Discarded(format!("Refund #{} does not need a ticket", refund.id)));
        };
        let ticket = self.tickets.find_or_generate_ticket(summary.into()).await?;
        info!("🎫️ Refund #{} of order #{} has ticket {}", refund.id, refund.order_id, ticket.id);
        let annotated = annotate_order(self.annotator.as_ref(), refund.order_id, &ticket).await;
        Ok(WebhookOutcome::Ticketed { ticket, annotated })
    }
}
