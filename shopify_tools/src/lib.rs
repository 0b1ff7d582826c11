mod api;
mod config;
mod data_objects;
mod error;

pub use api::{order_gid, ShopifyApi};
pub use config::ShopifyConfig;
pub use data_objects::{CustomAttribute, ShopSettings, UserError};
pub use error::ShopifyApiError;
