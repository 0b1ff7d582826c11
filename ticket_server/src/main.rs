use clap::Parser;
use dotenvy::dotenv;
use log::*;
use ticket_engine::SendReportResult;
use ticket_server::{
    cli::{print_environment, Arguments, Command, ReportCommand},
    config::ServerConfig,
    errors::ServerError,
    server::TicketServer,
    webhooks::WebhookOutcome,
};

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let args = Arguments::parse();
    let command = args.command.unwrap_or(Command::Run);
    if matches!(command, Command::Env) {
        print_environment();
        return;
    }
    let config = ServerConfig::from_env_or_default();
    match run_command(command, config).await {
        Ok(()) => println!("Bye!"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        },
    }
}

async fn run_command(command: Command, config: ServerConfig) -> Result<(), ServerError> {
    let shop = config.shopify_config.shop.clone();
    let server = TicketServer::new(config).await?;
    let result = match command {
        Command::Run | Command::Env => {
            info!("🚀️ Starting ticket server");
            server.run().await
        },
        Command::Report(cmd) => run_report_command(&server, cmd).await,
        Command::Webhook { topic, payload, shop: shop_override } => {
            let body = tokio::fs::read_to_string(&payload).await?;
            let shop = shop_override.unwrap_or(shop);
            match server.webhooks().dispatch(&topic, &shop, &body).await? {
                WebhookOutcome::Ticketed { ticket, annotated } => {
                    println!("{} has ticket {}. Order annotated: {annotated}", ticket.source, ticket.id)
                },
                WebhookOutcome::Discarded(reason) => println!("Discarded. {reason}"),
            }
            Ok(())
        },
    };
    server.close().await;
    result
}

async fn run_report_command(server: &TicketServer, command: ReportCommand) -> Result<(), ServerError> {
    let reporting = server.reporting();
    match command {
        ReportCommand::Generate(period) => {
            let doc = reporting.generate_monthly_report(period.year, period.month).await?;
            let customer = &doc.report.invoice.customer_position;
            println!(
                "Report {} generated with identifier {}. Customer amount: {} {}. Status: {}",
                doc.id, doc.identifier, customer.amount, customer.currency, doc.status
            );
            Ok(())
        },
        ReportCommand::Send(period) => {
            let result = reporting.send_report(period.year, period.month).await?;
            print_result(&result);
            match result.success {
                true => Ok(()),
                false => Err(ServerError::DeliveryError {
                    report_id: result.report_id,
                    reason: result.error.unwrap_or_default(),
                }),
            }
        },
        ReportCommand::Retry => {
            let results = reporting.retry_failed_reports().await;
            if results.is_empty() {
                println!("No failed reports to retry");
            }
            results.iter().for_each(print_result);
            Ok(())
        },
    }
}

fn print_result(result: &SendReportResult) {
    let status = result.status_code.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
    match result.success {
        true => println!("{}: delivered (HTTP {status})", result.report_id),
        false => println!("{}: failed (HTTP {status}). {}", result.report_id, result.error.as_deref().unwrap_or("")),
    }
}
