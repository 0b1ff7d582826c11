use log::*;
use shopify_tools::{order_gid, CustomAttribute, ShopifyApi, ShopifyApiError};
use ticket_engine::traits::{AnnotationOutcome, OrderAnnotator, PlatformError, TaxSettingSource};

/// The order custom attribute that carries ticket numbers.
pub const TICKET_NUMBER_ATTRIBUTE: &str = "ticketNumber";

fn platform_error(e: ShopifyApiError) -> PlatformError {
    PlatformError(e.to_string())
}

/// Appends a `ticketNumber` attribute to `attributes`. Returns `None` if an identical attribute is already present.
/// Other ticket numbers (e.g. the order's own ticket on a refunded order) are kept.
pub fn with_ticket_number(mut attributes: Vec<CustomAttribute>, ticket_number: &str) -> Option<Vec<CustomAttribute>> {
    let present =
        attributes.iter().any(|a| a.key == TICKET_NUMBER_ATTRIBUTE && a.value.as_deref() == Some(ticket_number));
    if present {
        return None;
    }
    attributes.push(CustomAttribute::new(TICKET_NUMBER_ATTRIBUTE, ticket_number));
    Some(attributes)
}

/// Writes ticket numbers onto Shopify orders as custom attributes.
#[derive(Clone)]
pub struct ShopifyOrderAnnotator {
    api: ShopifyApi,
}

impl std::fmt::Debug for ShopifyOrderAnnotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ShopifyOrderAnnotator ({})", self.api.shop())
    }
}

impl ShopifyOrderAnnotator {
    pub fn new(api: ShopifyApi) -> Self {
        Self { api }
    }
}

impl OrderAnnotator for ShopifyOrderAnnotator {
    async fn annotate_order(&self, order_id: i64, ticket_number: &str) -> Result<AnnotationOutcome, PlatformError> {
        let gid = order_gid(order_id);
        let attributes = self.api.fetch_order_custom_attributes(&gid).await.map_err(platform_error)?;
        let Some(attributes) = with_ticket_number(attributes, ticket_number) else {
            debug!("🛍️ Order {order_id} already carries ticket {ticket_number}");
            return Ok(AnnotationOutcome::AlreadyPresent);
        };
        self.api.update_order_custom_attributes(&gid, &attributes).await.map_err(platform_error)?;
        info!("🛍️ Order {order_id} annotated with ticket {ticket_number}");
        Ok(AnnotationOutcome::Annotated)
    }
}

/// Reads the "prices include tax" setting of the shop the API client is configured for.
#[derive(Clone)]
pub struct ShopifyTaxSettings {
    api: ShopifyApi,
}

impl std::fmt::Debug for ShopifyTaxSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ShopifyTaxSettings ({})", self.api.shop())
    }
}

impl ShopifyTaxSettings {
    pub fn new(api: ShopifyApi) -> Self {
        Self { api }
    }
}

impl TaxSettingSource for ShopifyTaxSettings {
    async fn fetch_taxes_included(&self, shop: &str) -> Result<bool, PlatformError> {
        if shop != self.api.shop() {
            warn!("🛍️ Asked for the tax settings of {shop}, but the client is configured for {}", self.api.shop());
        }
        let settings = self.api.fetch_shop_settings().await.map_err(platform_error)?;
        info!("🛍️ {} prices include tax: {}", settings.name, settings.taxes_included);
        Ok(settings.taxes_included)
    }
}
