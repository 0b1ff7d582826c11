use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Commerce platform request failed: {0}")]
pub struct PlatformError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationOutcome {
    Annotated,
    /// The order already carried this ticket number.
    AlreadyPresent,
}

/// Writes ticket references back onto orders in the commerce platform.
#[allow(async_fn_in_trait)]
pub trait OrderAnnotator {
    async fn annotate_order(&self, order_id: i64, ticket_number: &str) -> Result<AnnotationOutcome, PlatformError>;
}

/// Reads the merchant's tax configuration from the commerce platform.
#[allow(async_fn_in_trait)]
pub trait TaxSettingSource {
    async fn fetch_taxes_included(&self, shop: &str) -> Result<bool, PlatformError>;
}
