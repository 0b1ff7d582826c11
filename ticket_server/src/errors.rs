use shopify_tools::ShopifyApiError;
use thiserror::Error;
use ticket_engine::{
    traits::StorageError,
    ReportingError,
    StoreConfigError,
    SummaryError,
    TicketGenerationError,
};

use crate::scheduler::SchedulerError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Database error. {0}")]
    StorageError(#[from] StorageError),
    #[error("Reporting error. {0}")]
    ReportingError(#[from] ReportingError),
    #[error("Shopify error. {0}")]
    ShopifyError(#[from] ShopifyApiError),
    #[error("Scheduler error. {0}")]
    SchedulerError(#[from] SchedulerError),
    #[error("Webhook could not be processed. {0}")]
    WebhookError(#[from] WebhookError),
    #[error("Report {report_id} was not delivered. {reason}")]
    DeliveryError { report_id: String, reason: String },
}

/// Why a webhook delivery could not be processed. Any of these should be answered with a non-2xx status so that the
/// platform redelivers the event; numbering is idempotent, so redelivery is safe.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("No handler is registered for topic {0}")]
    UnknownTopic(String),
    #[error("Payload deserialization error. {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("Could not summarise the event. {0}")]
    SummaryError(#[from] SummaryError),
    #[error("Could not look up the store configuration. {0}")]
    StoreConfigError(#[from] StoreConfigError),
    #[error("Could not number the event. {0}")]
    TicketError(#[from] TicketGenerationError),
}

impl WebhookError {
    /// The HTTP status a webhook router should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnknownTopic(_) => 404,
            Self::InvalidPayload(_) | Self::SummaryError(_) => 400,
            Self::StoreConfigError(_) => 503,
            Self::TicketError(_) => 500,
        }
    }
}
