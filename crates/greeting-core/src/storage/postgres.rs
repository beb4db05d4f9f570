//! PostgreSQL record store and ledger mirror

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;

use super::GreetingStore;
use crate::error::GreetingError;
use crate::ledger::{LedgerEntry, LedgerEntryKind};
use crate::types::{Challenge, Greeting, PaymentState, ResponseRecord};

const GREETING_COLUMNS: &str = "id, owner_token_hash, content, challenge_question, \
    challenge_answer, payment_state, payment_code, view_count, accepted, accepted_at, created_at";

pub(super) async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, GreetingError> {
    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .map_err(|e| GreetingError::storage("postgres connect failed", e))
}

/// PostgreSQL-backed greeting store.
///
/// Each mutation is a single conditional statement, so concurrent writers to one id are
/// serialized by the row lock.
#[derive(Debug, Clone)]
pub struct PostgresGreetingStore {
    pool: PgPool,
}

impl PostgresGreetingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), GreetingError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS greetings (
                id TEXT PRIMARY KEY,
                owner_token_hash TEXT NOT NULL UNIQUE,
                content JSONB NOT NULL,
                challenge_question TEXT NULL,
                challenge_answer TEXT NULL,
                payment_state TEXT NOT NULL,
                payment_code TEXT NULL,
                view_count BIGINT NOT NULL DEFAULT 0,
                accepted BOOLEAN NULL,
                accepted_at TIMESTAMPTZ NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_greetings_payment_state ON greetings (payment_state)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| GreetingError::storage("postgres schema create failed", e))?;
        }
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool, GreetingError> {
        let row = sqlx::query("SELECT 1 AS present FROM greetings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| GreetingError::storage("postgres lookup failed", e))?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl GreetingStore for PostgresGreetingStore {
    fn backend_label(&self) -> &'static str {
        "postgres"
    }

    async fn insert(&self, greeting: Greeting) -> Result<(), GreetingError> {
        let content = serde_json::to_value(&greeting.content)
            .map_err(|e| GreetingError::storage("greeting content encode failed", e))?;
        let view_count = to_bigint(greeting.view_count)?;

        sqlx::query(
            r#"
            INSERT INTO greetings (
                id,
                owner_token_hash,
                content,
                challenge_question,
                challenge_answer,
                payment_state,
                payment_code,
                view_count,
                accepted,
                accepted_at,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&greeting.id)
        .bind(&greeting.owner_token_hash)
        .bind(content)
        .bind(greeting.challenge.as_ref().map(|c| c.question.clone()))
        .bind(greeting.challenge.as_ref().map(|c| c.expected_answer.clone()))
        .bind(greeting.payment_state.name())
        .bind(&greeting.payment_code)
        .bind(view_count)
        .bind(greeting.response.map(|r| r.accepted))
        .bind(greeting.response.map(|r| r.accepted_at))
        .bind(greeting.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| GreetingError::storage("postgres insert failed", e))?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Greeting>, GreetingError> {
        let row = sqlx::query(&format!(
            "SELECT {GREETING_COLUMNS} FROM greetings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GreetingError::storage("postgres fetch failed", e))?;

        row.as_ref().map(greeting_from_row).transpose()
    }

    async fn find_by_owner_token_hash(
        &self,
        owner_token_hash: &str,
    ) -> Result<Option<Greeting>, GreetingError> {
        let row = sqlx::query(&format!(
            "SELECT {GREETING_COLUMNS} FROM greetings WHERE owner_token_hash = $1"
        ))
        .bind(owner_token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GreetingError::storage("postgres owner lookup failed", e))?;

        row.as_ref().map(greeting_from_row).transpose()
    }

    async fn increment_views(&self, id: &str) -> Result<Greeting, GreetingError> {
        let row = sqlx::query(&format!(
            "UPDATE greetings SET view_count = view_count + 1 WHERE id = $1 \
             RETURNING {GREETING_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GreetingError::storage("postgres view increment failed", e))?;

        match row {
            Some(row) => greeting_from_row(&row),
            None => Err(GreetingError::greeting_not_found(id)),
        }
    }

    async fn record_response(
        &self,
        id: &str,
        response: ResponseRecord,
    ) -> Result<ResponseRecord, GreetingError> {
        let updated = sqlx::query(
            "UPDATE greetings SET accepted = $2, accepted_at = $3 \
             WHERE id = $1 AND accepted_at IS NULL RETURNING accepted_at",
        )
        .bind(id)
        .bind(response.accepted)
        .bind(response.accepted_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GreetingError::storage("postgres response update failed", e))?;

        if updated.is_some() {
            return Ok(response);
        }

        let existing = sqlx::query("SELECT accepted_at FROM greetings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| GreetingError::storage("postgres response lookup failed", e))?
            .ok_or_else(|| GreetingError::greeting_not_found(id))?;

        let accepted_at: Option<DateTime<Utc>> = existing
            .try_get("accepted_at")
            .map_err(|e| GreetingError::storage("postgres decode accepted_at failed", e))?;
        match accepted_at {
            Some(accepted_at) => Err(GreetingError::AlreadyResolved { accepted_at }),
            None => Err(GreetingError::Transient(format!(
                "response for greeting '{id}' was not recorded; retry"
            ))),
        }
    }

    async fn transition_payment(
        &self,
        id: &str,
        from: PaymentState,
        to: PaymentState,
        payment_code: Option<String>,
    ) -> Result<Option<Greeting>, GreetingError> {
        let row = sqlx::query(&format!(
            "UPDATE greetings SET payment_state = $3, payment_code = $4 \
             WHERE id = $1 AND payment_state = $2 RETURNING {GREETING_COLUMNS}"
        ))
        .bind(id)
        .bind(from.name())
        .bind(to.name())
        .bind(payment_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GreetingError::storage("postgres payment transition failed", e))?;

        match row {
            Some(row) => greeting_from_row(&row).map(Some),
            None if self.exists(id).await? => Ok(None),
            None => Err(GreetingError::greeting_not_found(id)),
        }
    }
}

fn greeting_from_row(row: &PgRow) -> Result<Greeting, GreetingError> {
    let content: Value = decode(row, "content")?;
    let content = serde_json::from_value(content)
        .map_err(|e| GreetingError::storage("postgres decode content failed", e))?;

    let question: Option<String> = decode(row, "challenge_question")?;
    let answer: Option<String> = decode(row, "challenge_answer")?;
    let challenge = match (question, answer) {
        (Some(question), Some(answer)) => Some(Challenge::new(question, answer)),
        _ => None,
    };

    let payment_state: String = decode(row, "payment_state")?;
    let payment_state = PaymentState::parse(&payment_state).ok_or_else(|| {
        GreetingError::Transient(format!("unknown payment state '{payment_state}' in postgres"))
    })?;

    let view_count: i64 = decode(row, "view_count")?;
    let accepted: Option<bool> = decode(row, "accepted")?;
    let accepted_at: Option<DateTime<Utc>> = decode(row, "accepted_at")?;
    let response = match (accepted, accepted_at) {
        (Some(accepted), Some(accepted_at)) => Some(ResponseRecord {
            accepted,
            accepted_at,
        }),
        _ => None,
    };

    Ok(Greeting {
        id: decode(row, "id")?,
        owner_token_hash: decode(row, "owner_token_hash")?,
        content,
        challenge,
        payment_state,
        payment_code: decode(row, "payment_code")?,
        view_count: view_count
            .try_into()
            .map_err(|_| GreetingError::Transient("negative view count in storage".to_string()))?,
        response,
        created_at: decode(row, "created_at")?,
    })
}

fn decode<'r, T>(row: &'r PgRow, column: &str) -> Result<T, GreetingError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| GreetingError::storage(&format!("postgres decode {column} failed"), e))
}

fn to_bigint(value: u64) -> Result<i64, GreetingError> {
    value
        .try_into()
        .map_err(|_| GreetingError::Transient("value exceeds postgres BIGINT range".to_string()))
}

/// Append-only mirror of the payment ledger.
#[derive(Debug, Clone)]
pub(super) struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub(super) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(super) async fn ensure_schema(&self) -> Result<(), GreetingError> {
        // The application controls index and hash generation.
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS greeting_ledger_entries (
                ledger_index BIGINT PRIMARY KEY,
                entry_id TEXT NOT NULL UNIQUE,
                greeting_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                payment_code TEXT NULL,
                entry_timestamp TIMESTAMPTZ NOT NULL,
                payload JSONB NOT NULL,
                previous_hash TEXT NULL,
                entry_hash TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_greeting_ledger_greeting_id \
             ON greeting_ledger_entries (greeting_id)",
            "CREATE INDEX IF NOT EXISTS idx_greeting_ledger_payment_code \
             ON greeting_ledger_entries (payment_code)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| GreetingError::storage("postgres ledger schema create failed", e))?;
        }
        Ok(())
    }

    pub(super) async fn load_entries(&self) -> Result<Vec<LedgerEntry>, GreetingError> {
        let rows = sqlx::query(
            r#"
            SELECT
                ledger_index,
                entry_id,
                greeting_id,
                kind,
                payment_code,
                entry_timestamp,
                payload,
                previous_hash,
                entry_hash
            FROM greeting_ledger_entries
            ORDER BY ledger_index ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GreetingError::storage("postgres ledger load failed", e))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = decode(&row, "kind")?;
            let kind = LedgerEntryKind::parse(&kind).ok_or_else(|| {
                GreetingError::Transient(format!("unknown ledger kind '{kind}' in postgres"))
            })?;
            let index: i64 = decode(&row, "ledger_index")?;

            entries.push(LedgerEntry {
                entry_id: decode(&row, "entry_id")?,
                index: index.try_into().map_err(|_| {
                    GreetingError::Transient("negative ledger index in storage".to_string())
                })?,
                greeting_id: decode(&row, "greeting_id")?,
                kind,
                payment_code: decode(&row, "payment_code")?,
                timestamp: decode(&row, "entry_timestamp")?,
                payload: decode(&row, "payload")?,
                previous_hash: decode(&row, "previous_hash")?,
                entry_hash: decode(&row, "entry_hash")?,
            });
        }

        Ok(entries)
    }

    pub(super) async fn insert_entry(&self, entry: &LedgerEntry) -> Result<(), GreetingError> {
        sqlx::query(
            r#"
            INSERT INTO greeting_ledger_entries (
                ledger_index,
                entry_id,
                greeting_id,
                kind,
                payment_code,
                entry_timestamp,
                payload,
                previous_hash,
                entry_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(to_bigint(entry.index)?)
        .bind(&entry.entry_id)
        .bind(&entry.greeting_id)
        .bind(entry.kind.name())
        .bind(&entry.payment_code)
        .bind(entry.timestamp)
        .bind(&entry.payload)
        .bind(&entry.previous_hash)
        .bind(&entry.entry_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| GreetingError::storage("postgres ledger insert failed", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_kinds_roundtrip_through_column_text() {
        for kind in [LedgerEntryKind::Payment, LedgerEntryKind::Audit] {
            assert_eq!(LedgerEntryKind::parse(kind.name()), Some(kind));
        }
        assert_eq!(LedgerEntryKind::parse("outcome"), None);
    }

    #[test]
    fn payment_states_roundtrip_through_column_text() {
        for state in [
            PaymentState::Unpaid,
            PaymentState::PendingManualReview,
            PaymentState::Paid,
        ] {
            assert_eq!(PaymentState::parse(state.name()), Some(state));
        }
        assert!(to_bigint(u64::MAX).is_err());
    }
}
