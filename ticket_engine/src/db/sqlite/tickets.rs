use chrono::{DateTime, TimeZone, Utc};
use futures_util::{stream::BoxStream, StreamExt};
use log::trace;
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::{
    db::sqlite::is_unique_violation,
    db_types::{Ticket, TicketSource, TicketType},
    traits::{CreateOutcome, StorageError},
};

#[derive(Debug, Clone, FromRow)]
struct TicketRow {
    id: String,
    partition_key: String,
    ticket_type: String,
    order_id: i64,
    refund_id: Option<i64>,
    created_at: i64,
    total_amount: f64,
    currency: String,
    tax_lines: String,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StorageError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let ticket_type = row.ticket_type.parse::<TicketType>().map_err(|e| StorageError::CorruptRecord(e.to_string()))?;
        let source = TicketSource::from_parts(ticket_type, row.order_id, row.refund_id)
            .map_err(|e| StorageError::CorruptRecord(format!("Ticket {}. {e}", row.id)))?;
        let created_at = Utc
            .timestamp_millis_opt(row.created_at)
            .single()
            .ok_or_else(|| StorageError::CorruptRecord(format!("Ticket {} has an invalid timestamp", row.id)))?;
        let tax_lines = serde_json::from_str(&row.tax_lines)?;
        Ok(Ticket {
            id: row.id,
            partition_key: row.partition_key,
            source,
            created_at,
            total_amount: row.total_amount,
            currency: row.currency,
            tax_lines,
        })
    }
}

const TICKET_COLUMNS: &str =
    "id, partition_key, ticket_type, order_id, refund_id, created_at, total_amount, currency, tax_lines";

pub async fn fetch_ticket(
    source: &TicketSource,
    partition_key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Ticket>, StorageError> {
    let row = match source {
        TicketSource::Order { order_id } => {
            let q = format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE partition_key = $1 AND order_id = $2 AND ticket_type = \
                 'order' AND refund_id IS NULL"
            );
            sqlx::query_as::<_, TicketRow>(&q).bind(partition_key).bind(order_id).fetch_optional(conn).await?
        },
        TicketSource::Refund { order_id, refund_id } => {
            let q = format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE partition_key = $1 AND order_id = $2 AND refund_id = $3 \
                 AND ticket_type = 'refund'"
            );
            sqlx::query_as::<_, TicketRow>(&q)
                .bind(partition_key)
                .bind(order_id)
                .bind(refund_id)
                .fetch_optional(conn)
                .await?
        },
    };
    row.map(Ticket::try_from).transpose()
}

/// Inserts the ticket. A unique-key collision (same identity key in the partition) yields `AlreadyExists`.
pub async fn insert_ticket(ticket: &Ticket, conn: &mut SqliteConnection) -> Result<CreateOutcome<Ticket>, StorageError> {
    let tax_lines = serde_json::to_string(&ticket.tax_lines)?;
    let result = sqlx::query(
        r#"
            INSERT INTO tickets (
                id,
                partition_key,
                ticket_type,
                order_id,
                refund_id,
                created_at,
                total_amount,
                currency,
                tax_lines
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&ticket.id)
    .bind(&ticket.partition_key)
    .bind(ticket.source.ticket_type().to_string())
    .bind(ticket.source.order_id())
    .bind(ticket.source.refund_id())
    .bind(ticket.created_at.timestamp_millis())
    .bind(ticket.total_amount)
    .bind(&ticket.currency)
    .bind(tax_lines)
    .execute(conn)
    .await;
    match result {
        Ok(_) => Ok(CreateOutcome::Created(ticket.clone())),
        Err(e) if is_unique_violation(&e) => {
            trace!("🗃️ Ticket for {} already exists. {e}", ticket.source);
            Ok(CreateOutcome::AlreadyExists)
        },
        Err(e) => Err(e.into()),
    }
}

/// Streams the tickets of `partition_key` created within `[start, end]`, oldest first.
pub fn tickets_in_range(
    pool: &SqlitePool,
    partition_key: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> BoxStream<'_, Result<Ticket, StorageError>> {
    sqlx::query_as::<_, TicketRow>(
        r#"
            SELECT id, partition_key, ticket_type, order_id, refund_id, created_at, total_amount, currency, tax_lines
            FROM tickets
            WHERE partition_key = $1 AND created_at BETWEEN $2 AND $3
            ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(partition_key)
    .bind(start.timestamp_millis())
    .bind(end.timestamp_millis())
    .fetch(pool)
    .map(|row| row.map_err(StorageError::from).and_then(Ticket::try_from))
    .boxed()
}
