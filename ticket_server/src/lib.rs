//! # Ticket server
//! This crate wires the ticket engine to the outside world. It is responsible for:
//! * Handling `orders/paid` and `refunds/create` events from Shopify: each one is numbered, and the ticket number is
//!   written back onto the order.
//! * Delivering monthly reports to the ERP, and retrying failed deliveries, on cron schedules.
//! * Keeping those schedules registered, restoring any job that goes missing.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Commands
//! * `run` (default): run the reporting jobs until SIGINT or SIGTERM.
//! * `report generate|send --year Y --month M`, `report retry`: the reporting admin actions.
//! * `webhook <topic> <payload.json>`: replay a stored webhook body through its handler.
//! * `env`: print the configuration environment, excluding secrets.
pub mod cli;
pub mod config;
pub mod errors;

pub mod erp_client;
pub mod integrations;
pub mod reporting_jobs;
pub mod scheduler;
pub mod server;
pub mod webhooks;

#[cfg(test)]
mod test;
