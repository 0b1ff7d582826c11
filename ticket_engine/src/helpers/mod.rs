mod retry;
mod time;

pub use retry::{retry_with_backoff, Attempt, RetryError, RetryPolicy};
pub use time::{last_day_of_month, month_bounds, partition_year, previous_month, DEFAULT_BUSINESS_TIMEZONE};
