//! Adapters that back the engine's platform ports with real services.
pub mod shopify;
