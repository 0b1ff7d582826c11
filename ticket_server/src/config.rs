use std::{env, time::Duration};

use chrono_tz::Tz;
use log::*;
use shopify_tools::ShopifyConfig;
use ticket_common::{parse_env_or_default, Secret};
use ticket_engine::{
    helpers::DEFAULT_BUSINESS_TIMEZONE,
    report_objects::PostingConstants,
    TicketNumberFormat,
    DEFAULT_EXCLUSION_TAG,
    DEFAULT_STORE_CONFIG_TTL,
};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/tickets.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ERP_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_SCHEDULE: &str = "0 0 */4 * * *";
pub const DEFAULT_MONTHLY_SCHEDULE: &str = "0 0 1 1 * *";
const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub shopify_config: ShopifyConfig,
    pub erp: ErpConfig,
    /// Month boundaries, fiscal years and job schedules are evaluated in this zone
    pub timezone: Tz,
    pub ticket_format: TicketNumberFormat,
    /// Orders tagged with this value are not ticketed. `None` disables the check.
    pub exclusion_tag: Option<String>,
    pub store_config_ttl: Duration,
    pub schedules: ScheduleConfig,
    pub posting_constants: PostingConstants,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            database_max_connections: DEFAULT_MAX_CONNECTIONS,
            shopify_config: ShopifyConfig::default(),
            erp: ErpConfig::default(),
            timezone: DEFAULT_BUSINESS_TIMEZONE,
            ticket_format: TicketNumberFormat::default(),
            exclusion_tag: Some(DEFAULT_EXCLUSION_TAG.to_string()),
            store_config_ttl: DEFAULT_STORE_CONFIG_TTL,
            schedules: ScheduleConfig::default(),
            posting_constants: PostingConstants::default(),
        }
    }
}

/// Where and how monthly reports are delivered.
#[derive(Clone, Debug)]
pub struct ErpConfig {
    pub endpoint: String,
    pub username: String,
    pub password: Secret<String>,
    pub timeout: Duration,
}

impl Default for ErpConfig {
    fn default() -> Self {
        Self {
            endpoint: String::default(),
            username: String::default(),
            password: Secret::default(),
            timeout: DEFAULT_ERP_TIMEOUT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Cron expression (seconds first) for the failed-report retry sweep
    pub retry_schedule: String,
    /// Cron expression (seconds first) for the monthly report job
    pub monthly_schedule: String,
    /// How often missing jobs are looked for and restored
    pub reconcile_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            retry_schedule: DEFAULT_RETRY_SCHEDULE.to_string(),
            monthly_schedule: DEFAULT_MONTHLY_SCHEDULE.to_string(),
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("TKT_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ TKT_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.into()
        });
        let database_max_connections = parse_env_or_default("TKT_DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        let shopify_config = ShopifyConfig::new_from_env_or_default();
        let erp = ErpConfig::from_env_or_default();
        let timezone = configure_timezone();
        let ticket_format = TicketNumberFormat {
            prefix: env::var("TKT_TICKET_PREFIX").unwrap_or_else(|_| TicketNumberFormat::default().prefix),
            padding: parse_env_or_default("TKT_TICKET_PADDING", TicketNumberFormat::default().padding),
        };
        let exclusion_tag = match env::var("TKT_EXCLUSION_TAG") {
            Ok(s) if s.trim().is_empty() => {
                info!("🪛️ TKT_EXCLUSION_TAG is empty. Every order will be ticketed.");
                None
            },
            Ok(s) => Some(s.trim().to_string()),
            Err(_) => Some(DEFAULT_EXCLUSION_TAG.to_string()),
        };
        let store_config_ttl = Duration::from_secs(parse_env_or_default(
            "TKT_STORE_CONFIG_TTL_SECS",
            DEFAULT_STORE_CONFIG_TTL.as_secs(),
        ));
        let schedules = ScheduleConfig::from_env_or_default();
        let posting_constants = posting_constants_from_env();
        Self {
            database_url,
            database_max_connections,
            shopify_config,
            erp,
            timezone,
            ticket_format,
            exclusion_tag,
            store_config_ttl,
            schedules,
            posting_constants,
        }
    }
}

impl ErpConfig {
    pub fn from_env_or_default() -> Self {
        let endpoint = env::var("TKT_ERP_ENDPOINT").ok().unwrap_or_else(|| {
            error!("🪛️ TKT_ERP_ENDPOINT is not set. Monthly reports cannot be delivered until it is.");
            String::default()
        });
        let username = env::var("TKT_ERP_USERNAME").ok().unwrap_or_else(|| {
            error!("🪛️ TKT_ERP_USERNAME is not set. Please set it to the ERP API user.");
            String::default()
        });
        let password = Secret::new(env::var("TKT_ERP_PASSWORD").ok().unwrap_or_else(|| {
            error!("🪛️ TKT_ERP_PASSWORD is not set. Please set it to the ERP API password.");
            String::default()
        }));
        let timeout = Duration::from_secs(parse_env_or_default("TKT_ERP_TIMEOUT_SECS", DEFAULT_ERP_TIMEOUT.as_secs()));
        Self { endpoint, username, password, timeout }
    }
}

impl ScheduleConfig {
    pub fn from_env_or_default() -> Self {
        let retry_schedule = env::var("TKT_RETRY_SCHEDULE").unwrap_or_else(|_| DEFAULT_RETRY_SCHEDULE.to_string());
        let monthly_schedule =
            env::var("TKT_MONTHLY_SCHEDULE").unwrap_or_else(|_| DEFAULT_MONTHLY_SCHEDULE.to_string());
        let reconcile_interval = Duration::from_secs(parse_env_or_default(
            "TKT_RECONCILE_INTERVAL_SECS",
            DEFAULT_RECONCILE_INTERVAL.as_secs(),
        ));
        Self { retry_schedule, monthly_schedule, reconcile_interval }
    }
}

fn configure_timezone() -> Tz {
    match env::var("TKT_BUSINESS_TIMEZONE") {
        Ok(s) => s.trim().parse::<Tz>().unwrap_or_else(|e| {
            error!(
                "🪛️ {s} is not a valid timezone for TKT_BUSINESS_TIMEZONE. {e} Using the default, \
                 {DEFAULT_BUSINESS_TIMEZONE}, instead."
            );
            DEFAULT_BUSINESS_TIMEZONE
        }),
        Err(_) => DEFAULT_BUSINESS_TIMEZONE,
    }
}

fn posting_constants_from_env() -> PostingConstants {
    let defaults = PostingConstants::default();
    let var = |key: &str, default: String| env::var(key).unwrap_or(default);
    PostingConstants {
        company_code: var("TKT_ERP_COMPANY_CODE", defaults.company_code),
        document_class: var("TKT_ERP_DOCUMENT_CLASS", defaults.document_class),
        customer_account: var("TKT_ERP_CUSTOMER_ACCOUNT", defaults.customer_account),
        profit_center: var("TKT_ERP_PROFIT_CENTER", defaults.profit_center),
        income_account: var("TKT_ERP_INCOME_ACCOUNT", defaults.income_account),
        tax_account: var("TKT_ERP_TAX_ACCOUNT", defaults.tax_account),
        project_element: var("TKT_ERP_PROJECT_ELEMENT", defaults.project_element),
    }
}
