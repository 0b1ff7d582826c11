use std::{env, env::VarError, path::PathBuf};

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Fiscal ticket numbering and monthly ERP reporting")]
pub struct Arguments {
    /// Defaults to `run`
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the reporting jobs until interrupted
    Run,
    #[command(subcommand)]
    /// Generate, send or retry monthly ERP reports
    Report(ReportCommand),
    /// Replay a stored webhook body through the handler for its topic. Numbering is idempotent, so replaying an event
    /// that was already processed returns the ticket it was given.
    Webhook {
        /// The webhook topic, e.g. `orders/paid`
        #[arg(required = true, index = 1)]
        topic: String,
        /// Path to the JSON body of the webhook
        #[arg(required = true, index = 2)]
        payload: PathBuf,
        /// The shop domain the event came from. Defaults to TKT_SHOPIFY_SHOP
        #[arg(short, long)]
        shop: Option<String>,
    },
    /// Print the current configuration environment (excluding secrets)
    Env,
}

#[derive(Debug, Subcommand)]
pub enum ReportCommand {
    /// Generate (or regenerate) and store the report for a month, without sending it
    Generate(ReportPeriod),
    /// Send the report for a month, generating it first if there is none
    Send(ReportPeriod),
    /// Resend every report whose last delivery failed
    Retry,
}

#[derive(Debug, Args, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    #[arg(short, long)]
    pub year: i32,
    /// 1 to 12
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: u32,
}

pub fn print_environment() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 17] = [
        "RUST_LOG",
        "TKT_DATABASE_URL",
        "TKT_DATABASE_MAX_CONNECTIONS",
        "TKT_SHOPIFY_SHOP",
        "TKT_SHOPIFY_API_VERSION",
        "TKT_ERP_ENDPOINT",
        "TKT_ERP_USERNAME",
        "TKT_ERP_TIMEOUT_SECS",
        "TKT_ERP_COMPANY_CODE",
        "TKT_BUSINESS_TIMEZONE",
        "TKT_TICKET_PREFIX",
        "TKT_TICKET_PADDING",
        "TKT_EXCLUSION_TAG",
        "TKT_STORE_CONFIG_TTL_SECS",
        "TKT_RETRY_SCHEDULE",
        "TKT_MONTHLY_SCHEDULE",
        "TKT_RECONCILE_INTERVAL_SECS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
