mod postgres;

pub use postgres::PostgresGreetingStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::GreetingError;
use crate::ledger::{AppendOnlyLedger, AuditEvent, LedgerEntry, LedgerEntryKind, PaymentRecord};
use crate::payments::PaymentPurpose;
use crate::types::{Greeting, PaymentState, ResponseRecord};
use postgres::PostgresLedgerStore;

/// Record store backend configuration.
#[derive(Debug, Clone, Default)]
pub enum StoreConfig {
    /// Greetings and ledger live in process memory only.
    #[default]
    Memory,
    /// Greetings and ledger entries are persisted in PostgreSQL.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

/// Opaque record store for greetings.
///
/// Every mutating call is atomic per greeting id. Backends must serialize concurrent
/// writes to the same id.
#[async_trait]
pub trait GreetingStore: Send + Sync {
    fn backend_label(&self) -> &'static str;

    async fn insert(&self, greeting: Greeting) -> Result<(), GreetingError>;

    async fn get(&self, id: &str) -> Result<Option<Greeting>, GreetingError>;

    async fn find_by_owner_token_hash(
        &self,
        owner_token_hash: &str,
    ) -> Result<Option<Greeting>, GreetingError>;

    /// Add one view and return the updated record.
    async fn increment_views(&self, id: &str) -> Result<Greeting, GreetingError>;

    /// Set the response if none is recorded yet.
    ///
    /// Fails with `AlreadyResolved` carrying the original timestamp otherwise.
    async fn record_response(
        &self,
        id: &str,
        response: ResponseRecord,
    ) -> Result<ResponseRecord, GreetingError>;

    /// Compare-and-set on `payment_state`. `Ok(None)` when the current state is not `from`.
    async fn transition_payment(
        &self,
        id: &str,
        from: PaymentState,
        to: PaymentState,
        payment_code: Option<String>,
    ) -> Result<Option<Greeting>, GreetingError>;
}

#[derive(Debug, Default)]
pub struct MemoryGreetingStore {
    greetings: RwLock<HashMap<String, Greeting>>,
}

impl MemoryGreetingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GreetingStore for MemoryGreetingStore {
    fn backend_label(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, greeting: Greeting) -> Result<(), GreetingError> {
        let mut greetings = self.greetings.write().await;
        if greetings.contains_key(&greeting.id) {
            return Err(GreetingError::Transient(format!(
                "greeting id '{}' already exists",
                greeting.id
            )));
        }
        greetings.insert(greeting.id.clone(), greeting);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Greeting>, GreetingError> {
        Ok(self.greetings.read().await.get(id).cloned())
    }

    async fn find_by_owner_token_hash(
        &self,
        owner_token_hash: &str,
    ) -> Result<Option<Greeting>, GreetingError> {
        Ok(self
            .greetings
            .read()
            .await
            .values()
            .find(|greeting| greeting.owner_token_hash == owner_token_hash)
            .cloned())
    }

    async fn increment_views(&self, id: &str) -> Result<Greeting, GreetingError> {
        let mut greetings = self.greetings.write().await;
        let greeting = greetings
            .get_mut(id)
            .ok_or_else(|| GreetingError::greeting_not_found(id))?;
        greeting.view_count = greeting.view_count.saturating_add(1);
        Ok(greeting.clone())
    }

    async fn record_response(
        &self,
        id: &str,
        response: ResponseRecord,
    ) -> Result<ResponseRecord, GreetingError> {
        let mut greetings = self.greetings.write().await;
        let greeting = greetings
            .get_mut(id)
            .ok_or_else(|| GreetingError::greeting_not_found(id))?;
        if let Some(existing) = greeting.response {
            return Err(GreetingError::AlreadyResolved {
                accepted_at: existing.accepted_at,
            });
        }
        greeting.response = Some(response);
        Ok(response)
    }

    async fn transition_payment(
        &self,
        id: &str,
        from: PaymentState,
        to: PaymentState,
        payment_code: Option<String>,
    ) -> Result<Option<Greeting>, GreetingError> {
        let mut greetings = self.greetings.write().await;
        let greeting = greetings
            .get_mut(id)
            .ok_or_else(|| GreetingError::greeting_not_found(id))?;
        if greeting.payment_state != from {
            return Ok(None);
        }
        greeting.payment_state = to;
        greeting.payment_code = payment_code;
        Ok(Some(greeting.clone()))
    }
}

#[derive(Debug, Clone)]
enum LedgerBackend {
    Memory,
    Postgres(PostgresLedgerStore),
}

/// Runtime ledger wrapper that keeps the authoritative chain in memory while
/// optionally mirroring each entry to PostgreSQL.
///
/// - Entry hash/index is computed against the in-memory chain first.
/// - Entry is persisted before it is committed in memory.
/// - On startup, PostgreSQL entries are hydrated and hash-verified.
#[derive(Debug, Clone)]
pub struct PersistentLedger {
    ledger: AppendOnlyLedger,
    backend: LedgerBackend,
}

impl Default for PersistentLedger {
    fn default() -> Self {
        Self {
            ledger: AppendOnlyLedger::new(),
            backend: LedgerBackend::Memory,
        }
    }
}

impl PersistentLedger {
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Result<Self, GreetingError> {
        Ok(Self {
            ledger: AppendOnlyLedger::from_entries(entries)?,
            backend: LedgerBackend::Memory,
        })
    }

    pub fn backend_label(&self) -> &'static str {
        match self.backend {
            LedgerBackend::Memory => "memory",
            LedgerBackend::Postgres(_) => "postgres",
        }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        self.ledger.entries()
    }

    pub fn verify_chain(&self) -> bool {
        self.ledger.verify_chain()
    }

    pub fn code_claim(&self, code: &str) -> Option<PaymentRecord> {
        self.ledger.code_claim(code)
    }

    pub fn accepted_payment(&self, greeting_id: &str, code: &str, purpose: PaymentPurpose) -> bool {
        self.ledger.accepted_payment(greeting_id, code, purpose)
    }

    pub async fn append_payment(
        &mut self,
        record: &PaymentRecord,
    ) -> Result<LedgerEntry, GreetingError> {
        let payload = crate::ledger::to_payload(record)?;
        self.append(
            &record.greeting_id,
            LedgerEntryKind::Payment,
            Some(record.code.clone()),
            payload,
        )
        .await
    }

    pub async fn append_audit(
        &mut self,
        greeting_id: &str,
        payment_code: Option<String>,
        event: AuditEvent,
    ) -> Result<LedgerEntry, GreetingError> {
        let payload = crate::ledger::to_payload(&event)?;
        self.append(greeting_id, LedgerEntryKind::Audit, payment_code, payload)
            .await
    }

    async fn append(
        &mut self,
        greeting_id: &str,
        kind: LedgerEntryKind,
        payment_code: Option<String>,
        payload: serde_json::Value,
    ) -> Result<LedgerEntry, GreetingError> {
        let entry = self
            .ledger
            .build_entry(greeting_id, kind, payment_code, payload);

        if let LedgerBackend::Postgres(store) = &self.backend {
            store.insert_entry(&entry).await?;
        }

        self.ledger.commit_entry(entry.clone())?;
        Ok(entry)
    }
}

/// Store and ledger wired to the same backend.
pub struct Storage {
    pub store: Arc<dyn GreetingStore>,
    pub ledger: PersistentLedger,
}

pub async fn bootstrap_storage(config: StoreConfig) -> Result<Storage, GreetingError> {
    match config {
        StoreConfig::Memory => Ok(Storage {
            store: Arc::new(MemoryGreetingStore::new()),
            ledger: PersistentLedger::default(),
        }),
        StoreConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let pool = postgres::connect(&database_url, max_connections).await?;

            let store = PostgresGreetingStore::new(pool.clone());
            store.ensure_schema().await?;

            let ledger_store = PostgresLedgerStore::new(pool);
            ledger_store.ensure_schema().await?;
            let entries = ledger_store.load_entries().await?;

            Ok(Storage {
                store: Arc::new(store),
                ledger: PersistentLedger {
                    ledger: AppendOnlyLedger::from_entries(entries)?,
                    backend: LedgerBackend::Postgres(ledger_store),
                },
            })
        }
    }
}
