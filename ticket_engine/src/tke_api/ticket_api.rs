use std::fmt::Debug;

use chrono_tz::Tz;
use log::*;

use crate::{
    db_types::{Ticket, TicketRequest},
    helpers::{partition_year, retry_with_backoff, Attempt, RetryError, RetryPolicy, DEFAULT_BUSINESS_TIMEZONE},
    tke_api::{counter_store::get_or_create_counter, counter_store::ticket_counter_id, errors::TicketGenerationError},
    traits::{CommitOutcome, TicketStorage},
};

/// How ticket numbers are rendered: `{prefix}{YY}-{n}`, with `n` zero-padded to `padding` digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketNumberFormat {
    pub prefix: String,
    /// Use `0` for the unpadded legacy scheme (`T25-1`)
    pub padding: usize,
}

impl Default for TicketNumberFormat {
    fn default() -> Self {
        Self { prefix: "T".to_string(), padding: 4 }
    }
}

impl TicketNumberFormat {
    pub fn format(&self, year: i32, value: i64) -> String {
        let yy = year.rem_euclid(100);
        format!("{}{yy:02}-{value:0width$}", self.prefix, width = self.padding)
    }
}

/// `TicketNumberGenerator` hands out fiscal ticket numbers, one per order or refund and fiscal year.
///
/// Numbering is idempotent. Asking for a ticket for an event that already has one returns the existing ticket, and
/// concurrent requests for the same event (e.g. a webhook delivered twice) end up with the same ticket. Numbers
/// within a year are gapless because the counter increment and the ticket insert are committed together.
pub struct TicketNumberGenerator<B> {
    db: B,
    format: TicketNumberFormat,
    timezone: Tz,
    retry_policy: RetryPolicy,
}

impl<B> Debug for TicketNumberGenerator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TicketNumberGenerator ({:?}, {})", self.format, self.timezone)
    }
}

impl<B> TicketNumberGenerator<B> {
    pub fn new(db: B) -> Self {
        Self {
            db,
            format: TicketNumberFormat::default(),
            timezone: DEFAULT_BUSINESS_TIMEZONE,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_format(mut self, format: TicketNumberFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> TicketNumberGenerator<B>
where B: TicketStorage
{
    /// Returns the ticket for `request.source`, creating it if this is the first time the event is seen.
    ///
    /// A conflicting counter update is retried with backoff according to the retry policy. If all attempts conflict,
    /// [`TicketGenerationError::RetriesExhausted`] is returned and nothing was written.
    pub async fn find_or_generate_ticket(&self, request: TicketRequest) -> Result<Ticket, TicketGenerationError> {
        let year = partition_year(request.created_at, self.timezone);
        let partition_key = year.to_string();
        if let Some(ticket) = self.db.fetch_ticket(&request.source, &partition_key).await? {
            debug!("🎫️ {} already has ticket {}", request.source, ticket.id);
            return Ok(ticket);
        }
        let counter_id = ticket_counter_id(&partition_key);
        let label = format!("Ticket for {}", request.source);
        let result = retry_with_backoff(&self.retry_policy, &label, |_| {
            self.attempt_ticket(&request, year, &partition_key, &counter_id)
        })
        .await;
        match result {
            Ok(ticket) => Ok(ticket),
            Err(RetryError::Failed(e)) => Err(e),
            Err(RetryError::Exhausted(attempts)) => {
                error!("🎫️ Gave up numbering {} after {attempts} attempts", request.source);
                Err(TicketGenerationError::RetriesExhausted { source_key: request.source.to_string(), attempts })
            },
        }
    }

    async fn attempt_ticket(
        &self,
        request: &TicketRequest,
        year: i32,
        partition_key: &str,
        counter_id: &str,
    ) -> Attempt<Ticket, TicketGenerationError> {
        let counter = match get_or_create_counter(&self.db, counter_id, partition_key).await {
            Ok(c) => c,
            Err(e) => return Attempt::Fail(e.into()),
        };
        let update = counter.increment();
        let number = self.format.format(year, update.new_value);
        let ticket = Ticket::from_request(number, partition_key.to_string(), request.clone());
        match self.db.commit_ticket(&update, &ticket).await {
            Ok(CommitOutcome::Committed(ticket)) => {
                info!("🎫️ Issued ticket {} for {}", ticket.id, ticket.source);
                Attempt::Done(ticket)
            },
            Ok(CommitOutcome::StaleCounter) => Attempt::Retry,
            Ok(CommitOutcome::Duplicate) => match self.db.fetch_ticket(&request.source, partition_key).await {
                Ok(Some(existing)) => {
                    debug!("🎫️ {} was numbered concurrently as {}", request.source, existing.id);
                    Attempt::Done(existing)
                },
                Ok(None) => {
                    warn!("🎫️ Ticket number {} is taken by another event. Re-reading the counter", ticket.id);
                    Attempt::Retry
                },
                Err(e) => Attempt::Fail(e.into()),
            },
            Err(e) => Attempt::Fail(e.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use futures_util::future::join_all;

    use super::*;
    use crate::{
        db_types::{CounterUpdate, TaxLine, TicketSource},
        test_utils::MemoryDatabase,
        traits::{CounterStorage, CreateOutcome, StorageError},
    };

    fn fast_policy() -> RetryPolicy {
        RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(8) }
    }

    fn request(source: TicketSource, created_at: &str) -> TicketRequest {
        TicketRequest {
            source,
            created_at: created_at.parse::<DateTime<Utc>>().unwrap(),
            total_amount: 190.0,
            currency: "EUR".to_string(),
            tax_lines: vec![TaxLine { rate: 0.21, price: 157.02, tax: 32.98, currency: "EUR".to_string() }],
        }
    }

    #[test]
    fn ticket_number_formats() {
        let format = TicketNumberFormat::default();
        assert_eq!(format.format(2025, 1), "T25-0001");
        assert_eq!(format.format(2025, 12345), "T25-12345");
        assert_eq!(format.format(2100, 7), "T00-0007");
        let legacy = TicketNumberFormat { prefix: "T".into(), padding: 0 };
        assert_eq!(legacy.format(2025, 1), "T25-1");
    }

    #[tokio::test]
    async fn numbers_are_sequential_per_year() {
        let db = MemoryDatabase::new();
        let api = TicketNumberGenerator::new(db.clone()).with_retry_policy(fast_policy());
        let a = api.find_or_generate_ticket(request(TicketSource::Order { order_id: 1 }, "2025-03-01T10:00:00Z")).await;
        let b = api.find_or_generate_ticket(request(TicketSource::Order { order_id: 2 }, "2025-03-02T10:00:00Z")).await;
        let r = api
            .find_or_generate_ticket(request(TicketSource::Refund { order_id: 1, refund_id: 9 }, "2025-03-03T10:00:00Z"))
            .await;
        let next_year =
            api.find_or_generate_ticket(request(TicketSource::Order { order_id: 3 }, "2025-12-31T23:30:00Z")).await;
        assert_eq!(a.unwrap().id, "T25-0001");
        assert_eq!(b.unwrap().id, "T25-0002");
        assert_eq!(r.unwrap().id, "T25-0003");
        let next_year = next_year.unwrap();
        assert_eq!(next_year.id, "T26-0001");
        assert_eq!(next_year.partition_key, "2026");
        assert_eq!(db.counter("counter-2025", "2025").unwrap().current_value, 3);
    }

    #[tokio::test]
    async fn replays_return_the_existing_ticket() {
        let db = MemoryDatabase::new();
        let api = TicketNumberGenerator::new(db.clone()).with_retry_policy(fast_policy());
        let source = TicketSource::Order { order_id: 555 };
        let first = api.find_or_generate_ticket(request(source, "2025-03-01T10:00:00Z")).await.unwrap();
        let mut replay = request(source, "2025-03-01T10:00:00Z");
        replay.total_amount = 1.0;
        let second = api.find_or_generate_ticket(replay).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(db.tickets().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_duplicates_share_one_ticket() {
        let _ = env_logger::try_init();
        let db = MemoryDatabase::new().with_interleaving();
        let api = TicketNumberGenerator::new(db.clone()).with_retry_policy(fast_policy());
        let source = TicketSource::Order { order_id: 555 };
        let (a, b) = tokio::join!(
            api.find_or_generate_ticket(request(source, "2025-03-01T10:00:00Z")),
            api.find_or_generate_ticket(request(source, "2025-03-01T10:00:00Z"))
        );
        assert_eq!(a.unwrap().id, "T25-0001");
        assert_eq!(b.unwrap().id, "T25-0001");
        assert_eq!(db.tickets().len(), 1);
        assert_eq!(db.counter("counter-2025", "2025").unwrap().current_value, 1);
    }

    #[tokio::test]
    async fn many_duplicates_share_one_ticket() {
        let db = MemoryDatabase::new().with_interleaving();
        let policy = RetryPolicy { max_attempts: 10, ..fast_policy() };
        let api = TicketNumberGenerator::new(db.clone()).with_retry_policy(policy);
        let source = TicketSource::Refund { order_id: 555, refund_id: 1 };
        let calls = (0..5).map(|_| api.find_or_generate_ticket(request(source, "2025-03-01T10:00:00Z")));
        let results = join_all(calls).await;
        for result in results {
            assert_eq!(result.unwrap().id, "T25-0001");
        }
        assert_eq!(db.tickets().len(), 1);
    }

    /// Every commit looks stale, as if another process always got there first.
    struct ContendedStore(MemoryDatabase);

    impl CounterStorage for ContendedStore {
        async fn fetch_counter(&self, id: &str, pk: &str) -> Result<Option<crate::db_types::Counter>, StorageError> {
            self.0.fetch_counter(id, pk).await
        }

        async fn create_counter(
            &self,
            id: &str,
            pk: &str,
        ) -> Result<CreateOutcome<crate::db_types::Counter>, StorageError> {
            self.0.create_counter(id, pk).await
        }
    }

    impl TicketStorage for ContendedStore {
        async fn fetch_ticket(&self, source: &TicketSource, pk: &str) -> Result<Option<Ticket>, StorageError> {
            self.0.fetch_ticket(source, pk).await
        }

        async fn commit_ticket(&self, _: &CounterUpdate, _: &Ticket) -> Result<CommitOutcome<Ticket>, StorageError> {
            Ok(CommitOutcome::StaleCounter)
        }

        fn tickets_in_range(
            &self,
            pk: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> futures_util::stream::BoxStream<'_, Result<Ticket, StorageError>> {
            self.0.tickets_in_range(pk, start, end)
        }
    }

    #[tokio::test]
    async fn exhausted_retries_are_terminal() {
        let db = MemoryDatabase::new();
        let api = TicketNumberGenerator::new(ContendedStore(db.clone())).with_retry_policy(fast_policy());
        let err = api
            .find_or_generate_ticket(request(TicketSource::Order { order_id: 7 }, "2025-03-01T10:00:00Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, TicketGenerationError::RetriesExhausted { attempts: 3, .. }));
        assert!(db.tickets().is_empty());
    }
}
