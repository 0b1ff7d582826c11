use std::{sync::Arc, time::Duration};

use log::*;
use shopify_tools::ShopifyApi;
use ticket_engine::{ReportingApi, SqliteDatabase, StoreConfigApi, TicketNumberGenerator};

use crate::{
    config::ServerConfig,
    erp_client::ErpClient,
    errors::ServerError,
    integrations::shopify::{ShopifyOrderAnnotator, ShopifyTaxSettings},
    reporting_jobs::{reporting_jobs, ServerReporting, FAILED_REPORTS_JOB, MONTHLY_REPORT_JOB},
    scheduler::{start_reconcile_worker, ScheduleReconciler, TaskScheduler},
    webhooks::WebhookHandlers,
};

/// How long a shutdown waits for in-flight job runs
const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);

pub type ServerWebhooks = WebhookHandlers<SqliteDatabase, ShopifyOrderAnnotator, ShopifyTaxSettings>;

/// The assembled service: storage, webhook handlers and the reporting API, all sharing one connection pool.
pub struct TicketServer {
    config: ServerConfig,
    db: SqliteDatabase,
    webhooks: ServerWebhooks,
    reporting: Arc<ServerReporting>,
}

impl TicketServer {
    /// Connects to the database, brings its schema up to date and builds every module.
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let db = SqliteDatabase::new_with_url(&config.database_url, config.database_max_connections).await?;
        db.migrate().await?;
        info!("🗃️ Database ready at {}", db.url());

        let shopify = ShopifyApi::new(config.shopify_config.clone())?;
        let store_config =
            StoreConfigApi::new(db.clone(), ShopifyTaxSettings::new(shopify.clone())).with_ttl(config.store_config_ttl);
        let tickets = TicketNumberGenerator::new(db.clone())
            .with_format(config.ticket_format.clone())
            .with_timezone(config.timezone);
        let webhooks = WebhookHandlers::new(
            Arc::new(tickets),
            Arc::new(store_config),
            Arc::new(ShopifyOrderAnnotator::new(shopify)),
            config.exclusion_tag.clone(),
        );

        if config.erp.endpoint.is_empty() {
            warn!("🚀️ No ERP endpoint is configured. Report deliveries will fail until TKT_ERP_ENDPOINT is set");
        }
        let erp = ErpClient::new(&config.erp)?;
        let reporting = ReportingApi::new(db.clone(), erp)
            .with_timezone(config.timezone)
            .with_constants(config.posting_constants.clone());
        Ok(Self { config, db, webhooks, reporting: Arc::new(reporting) })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn webhooks(&self) -> &ServerWebhooks {
        &self.webhooks
    }

    pub fn reporting(&self) -> &ServerReporting {
        self.reporting.as_ref()
    }

    /// Registers the reporting jobs and keeps them registered until SIGINT or SIGTERM. Runs in progress at that point
    /// are given [`SHUTDOWN_GRACE`] to finish.
    pub async fn run(&self) -> Result<(), ServerError> {
        let scheduler = Arc::new(TaskScheduler::new(self.config.timezone));
        let jobs = reporting_jobs(self.reporting.clone(), &self.config.schedules);
        let reconciler = ScheduleReconciler::new(scheduler.clone(), jobs);
        reconciler.reconcile();
        for name in [FAILED_REPORTS_JOB, MONTHLY_REPORT_JOB] {
            if !scheduler.has_job(name) {
                return Err(ServerError::ConfigurationError(format!("Job {name} could not be scheduled")));
            }
        }
        for job in scheduler.get_all_jobs() {
            info!("🚀️ Job {} ({}) next runs at {:?}", job.name, job.schedule, job.next_run);
        }
        let worker = start_reconcile_worker(reconciler, self.config.schedules.reconcile_interval);

        shutdown_signal().await?;
        info!("🚀️ Shutdown requested. No new job runs will start");
        worker.abort();
        scheduler.shutdown();
        if !scheduler.wait_idle(SHUTDOWN_GRACE).await {
            warn!("🚀️ Exiting with job runs still in progress");
        }
        Ok(())
    }

    pub async fn close(self) {
        self.db.close().await;
    }
}

async fn shutdown_signal() -> Result<(), ServerError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {},
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}
