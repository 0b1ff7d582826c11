//! # Webhook handlers
//!
//! Each handler serves one platform topic. Routing HTTP requests to handlers, and verifying their signatures, is the
//! job of whatever receives the webhooks; [`WebhookHandlers::dispatch`] is the entry point it calls with the topic,
//! the shop domain and the raw body.
//!
//! Handling is idempotent. A redelivered event yields the ticket that was issued the first time.
mod order_paid;
mod refund_created;

use std::sync::Arc;

use log::*;
pub use order_paid::OrderPaidHandler;
pub use refund_created::RefundCreatedHandler;
use serde::de::DeserializeOwned;
use ticket_engine::{
    db_types::Ticket,
    traits::{AnnotationOutcome, OrderAnnotator, StoreConfigStorage, TaxSettingSource, TicketStorage},
    StoreConfigApi,
    TicketNumberGenerator,
};

use crate::errors::WebhookError;

#[derive(Debug, Clone)]
pub struct WebhookContext<P> {
    pub topic: String,
    /// The shop domain the event came from
    pub shop: String,
    pub payload: P,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// A ticket exists for the event. `annotated` is false if the order could not be updated on the platform.
    Ticketed { ticket: Ticket, annotated: bool },
    /// Nothing to number
    Discarded(String),
}

#[allow(async_fn_in_trait)]
pub trait WebhookHandler {
    type Payload: DeserializeOwned;

    fn topic(&self) -> &'static str;

    async fn handle(&self, ctx: WebhookContext<Self::Payload>) -> Result<WebhookOutcome, WebhookError>;
}

pub fn parse_payload<P: DeserializeOwned>(body: &str) -> Result<P, WebhookError> {
    Ok(serde_json::from_str(body)?)
}

/// Writes `ticket` onto order `order_id`. The ticket is already durable at this point, so failures are logged and
/// reported as `false` rather than failing the webhook.
pub(crate) async fn annotate_order<A: OrderAnnotator>(annotator: &A, order_id: i64, ticket: &Ticket) -> bool {
    match annotator.annotate_order(order_id, &ticket.id).await {
        Ok(AnnotationOutcome::Annotated) => true,
        Ok(AnnotationOutcome::AlreadyPresent) => {
            debug!("🎫️ Order #{order_id} already shows ticket {}", ticket.id);
            true
        },
        Err(e) => {
            error!("🎫️ Ticket {} was issued for {}, but order #{order_id} could not be annotated. {e}", ticket.id, ticket.source);
            false
        },
    }
}

/// The set of handlers the service registers, keyed by topic.
pub struct WebhookHandlers<B, A, S> {
    order_paid: OrderPaidHandler<B, A, S>,
    refund_created: RefundCreatedHandler<B, A, S>,
}

impl<B, A, S> WebhookHandlers<B, A, S> {
    pub fn new(
        tickets: Arc<TicketNumberGenerator<B>>,
        store_config: Arc<StoreConfigApi<B, S>>,
        annotator: Arc<A>,
        exclusion_tag: Option<String>,
    ) -> Self {
        let order_paid =
            OrderPaidHandler::new(tickets.clone(), store_config.clone(), annotator.clone()).with_exclusion_tag(exclusion_tag);
        let refund_created = RefundCreatedHandler::new(tickets, store_config, annotator);
        Self { order_paid, refund_created }
    }
}

impl<B, A, S> WebhookHandlers<B, A, S>
where
    B: TicketStorage + StoreConfigStorage,
    A: OrderAnnotator,
    S: TaxSettingSource,
{
    pub fn topics(&self) -> Vec<&'static str> {
        vec![self.order_paid.topic(), self.refund_created.topic()]
    }

    pub async fn dispatch(&self, topic: &str, shop: &str, body: &str) -> Result<WebhookOutcome, WebhookError> {
        info!("🎫️ Received {topic} webhook from {shop}");
        if topic == self.order_paid.topic() {
            let ctx = WebhookContext { topic: topic.to_string(), shop: shop.to_string(), payload: parse_payload(body)? };
            self.order_paid.handle(ctx).await
        } else if topic == self.refund_created.topic() {
            let ctx = WebhookContext { topic: topic.to_string(), shop: shop.to_string(), payload: parse_payload(body)? };
            self.refund_created.handle(ctx).await
        } else {
            warn!("🎫️ No handler for topic {topic}");
            Err(WebhookError::UnknownTopic(topic.to_string()))
        }
    }
}
