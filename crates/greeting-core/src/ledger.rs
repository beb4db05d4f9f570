use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::GreetingError;
use crate::payments::PaymentPurpose;
use crate::types::PaymentMethod;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    /// A code accepted for one (greeting, purpose).
    Payment,
    Audit,
}

impl LedgerEntryKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Audit => "audit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "payment" => Some(Self::Payment),
            "audit" => Some(Self::Audit),
            _ => None,
        }
    }
}

/// Hash-chained ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub index: u64,
    pub greeting_id: String,
    pub kind: LedgerEntryKind,
    pub payment_code: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

/// Payload of a `Payment` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub greeting_id: String,
    pub code: String,
    pub purpose: PaymentPurpose,
    pub method: PaymentMethod,
    /// Set when a human approved the code rather than the external ledger.
    pub reviewer: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn new(
        greeting_id: impl Into<String>,
        code: impl Into<String>,
        purpose: PaymentPurpose,
        method: PaymentMethod,
    ) -> Self {
        Self {
            greeting_id: greeting_id.into(),
            code: code.into(),
            purpose,
            method,
            reviewer: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn reviewed_by(mut self, reviewer: impl Into<String>) -> Self {
        self.reviewer = Some(reviewer.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub stage: String,
    pub detail: String,
}

impl AuditEvent {
    pub fn new(stage: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            detail: detail.into(),
        }
    }
}

/// Append-only ledger with hash-chain proofs.
///
/// No in-place mutation is exposed. Every accepted code and every review decision is an
/// additional record.
#[derive(Debug, Default, Clone)]
pub struct AppendOnlyLedger {
    entries: Vec<LedgerEntry>,
    /// Payment records keyed by normalized code. First claim wins.
    claims: HashMap<String, PaymentRecord>,
}

impl AppendOnlyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted entries and verify hash-chain integrity.
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Result<Self, GreetingError> {
        for (expected_index, entry) in entries.iter().enumerate() {
            if entry.index != expected_index as u64 {
                return Err(GreetingError::Integrity(format!(
                    "ledger index gap detected at position {} (found {})",
                    expected_index, entry.index
                )));
            }
        }

        let mut ledger = Self {
            entries,
            claims: HashMap::new(),
        };
        if !ledger.verify_chain() {
            return Err(GreetingError::Integrity(
                "persisted ledger hash-chain verification failed".to_string(),
            ));
        }

        let records: Vec<PaymentRecord> = ledger
            .entries
            .iter()
            .filter(|entry| entry.kind == LedgerEntryKind::Payment)
            .map(|entry| {
                serde_json::from_value(entry.payload.clone()).map_err(|e| {
                    GreetingError::Integrity(format!(
                        "payment entry {} has an unreadable payload: {e}",
                        entry.index
                    ))
                })
            })
            .collect::<Result<_, _>>()?;
        for record in records {
            ledger.index_claim(record);
        }

        Ok(ledger)
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn payment_records(&self) -> impl Iterator<Item = PaymentRecord> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.kind == LedgerEntryKind::Payment)
            .filter_map(|entry| serde_json::from_value(entry.payload.clone()).ok())
    }

    /// Who, if anyone, already spent this code.
    pub fn code_claim(&self, code: &str) -> Option<PaymentRecord> {
        self.claims.get(&claim_key(code)).cloned()
    }

    pub fn accepted_payment(
        &self,
        greeting_id: &str,
        code: &str,
        purpose: PaymentPurpose,
    ) -> bool {
        self.code_claim(code)
            .map(|record| record.greeting_id == greeting_id && record.purpose == purpose)
            .unwrap_or(false)
    }

    pub fn append_payment(&mut self, record: &PaymentRecord) -> Result<LedgerEntry, GreetingError> {
        let payload = to_payload(record)?;
        self.append(
            &record.greeting_id,
            LedgerEntryKind::Payment,
            Some(record.code.clone()),
            payload,
        )
    }

    pub fn append_audit(
        &mut self,
        greeting_id: &str,
        payment_code: Option<String>,
        event: AuditEvent,
    ) -> Result<LedgerEntry, GreetingError> {
        let payload = to_payload(&event)?;
        self.append(greeting_id, LedgerEntryKind::Audit, payment_code, payload)
    }

    pub fn verify_chain(&self) -> bool {
        let mut previous_hash: Option<String> = None;
        for entry in &self.entries {
            let expected_hash = compute_entry_hash(
                entry.index,
                &entry.greeting_id,
                entry.kind,
                entry.payment_code.as_deref(),
                entry.timestamp,
                &entry.payload,
                previous_hash.as_deref(),
            );
            if entry.entry_hash != expected_hash {
                return false;
            }
            if entry.previous_hash != previous_hash {
                return false;
            }
            previous_hash = Some(entry.entry_hash.clone());
        }
        true
    }

    fn append(
        &mut self,
        greeting_id: &str,
        kind: LedgerEntryKind,
        payment_code: Option<String>,
        payload: Value,
    ) -> Result<LedgerEntry, GreetingError> {
        let entry = self.build_entry(greeting_id, kind, payment_code, payload);
        self.commit_entry(entry.clone())?;
        Ok(entry)
    }

    /// Build the next entry without mutating the in-memory chain.
    pub fn build_entry(
        &self,
        greeting_id: &str,
        kind: LedgerEntryKind,
        payment_code: Option<String>,
        payload: Value,
    ) -> LedgerEntry {
        let index = self.entries.len() as u64;
        let timestamp = Utc::now();
        let previous_hash = self.entries.last().map(|entry| entry.entry_hash.clone());
        let entry_hash = compute_entry_hash(
            index,
            greeting_id,
            kind,
            payment_code.as_deref(),
            timestamp,
            &payload,
            previous_hash.as_deref(),
        );

        LedgerEntry {
            entry_id: Uuid::new_v4().to_string(),
            index,
            greeting_id: greeting_id.to_string(),
            kind,
            payment_code,
            timestamp,
            payload,
            previous_hash,
            entry_hash,
        }
    }

    /// Commit a pre-built entry after external durability succeeds.
    pub fn commit_entry(&mut self, entry: LedgerEntry) -> Result<(), GreetingError> {
        let expected_index = self.entries.len() as u64;
        if entry.index != expected_index {
            return Err(GreetingError::Transient(format!(
                "ledger commit index mismatch: expected {}, got {}",
                expected_index, entry.index
            )));
        }

        let expected_previous_hash = self.entries.last().map(|e| e.entry_hash.clone());
        if entry.previous_hash != expected_previous_hash {
            return Err(GreetingError::Transient(
                "ledger commit previous hash mismatch".to_string(),
            ));
        }

        let expected_hash = compute_entry_hash(
            entry.index,
            &entry.greeting_id,
            entry.kind,
            entry.payment_code.as_deref(),
            entry.timestamp,
            &entry.payload,
            entry.previous_hash.as_deref(),
        );
        if entry.entry_hash != expected_hash {
            return Err(GreetingError::Transient(
                "ledger commit hash mismatch".to_string(),
            ));
        }

        if entry.kind == LedgerEntryKind::Payment {
            let record: PaymentRecord = serde_json::from_value(entry.payload.clone())
                .map_err(|e| GreetingError::storage("ledger payment payload decode failed", e))?;
            self.index_claim(record);
        }
        self.entries.push(entry);
        Ok(())
    }

    fn index_claim(&mut self, record: PaymentRecord) {
        self.claims.entry(claim_key(&record.code)).or_insert(record);
    }
}

fn claim_key(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

pub(crate) fn to_payload<T: Serialize>(value: &T) -> Result<Value, GreetingError> {
    serde_json::to_value(value).map_err(|e| GreetingError::storage("ledger payload encode failed", e))
}

fn compute_entry_hash(
    index: u64,
    greeting_id: &str,
    kind: LedgerEntryKind,
    payment_code: Option<&str>,
    timestamp: DateTime<Utc>,
    payload: &Value,
    previous_hash: Option<&str>,
) -> String {
    let material = serde_json::json!({
        "index": index,
        "greeting_id": greeting_id,
        "kind": kind,
        "payment_code": payment_code,
        "timestamp": timestamp,
        "payload": payload,
        "previous_hash": previous_hash,
    });

    let bytes = serde_json::to_vec(&material).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(greeting_id: &str, code: &str, purpose: PaymentPurpose) -> PaymentRecord {
        PaymentRecord::new(greeting_id, code, purpose, PaymentMethod::Mpesa)
    }

    #[test]
    fn verifies_hash_chain() {
        let mut ledger = AppendOnlyLedger::new();
        ledger
            .append_payment(&record("g1", "QK7ABC12XZ", PaymentPurpose::Publish))
            .unwrap();
        ledger
            .append_audit(
                "g1",
                Some("QK7ABC12XZ".to_string()),
                AuditEvent::new("manual_review_approved", "reviewer=ops"),
            )
            .unwrap();

        assert_eq!(ledger.entries().len(), 2);
        assert!(ledger.verify_chain());
    }

    #[test]
    fn detects_tampered_entries() {
        let mut ledger = AppendOnlyLedger::new();
        ledger
            .append_payment(&record("g1", "QK7ABC12XZ", PaymentPurpose::Reveal))
            .unwrap();

        let mut tampered = ledger.clone();
        tampered.entries[0].payload = serde_json::json!({"tampered": true});
        assert!(!tampered.verify_chain());
    }

    #[test]
    fn code_claims_are_scoped_to_greeting_and_purpose() {
        let mut ledger = AppendOnlyLedger::new();
        ledger
            .append_payment(&record("g1", "QK7ABC12XZ", PaymentPurpose::Reveal))
            .unwrap();

        assert!(ledger.accepted_payment("g1", "qk7abc12xz", PaymentPurpose::Reveal));
        assert!(!ledger.accepted_payment("g1", "QK7ABC12XZ", PaymentPurpose::Publish));
        assert!(!ledger.accepted_payment("g2", "QK7ABC12XZ", PaymentPurpose::Reveal));
        assert!(ledger.code_claim("UNUSED0001").is_none());
    }

    #[test]
    fn from_entries_rejects_index_gaps() {
        let mut ledger = AppendOnlyLedger::new();
        ledger
            .append_audit("g1", None, AuditEvent::new("a", "b"))
            .unwrap();
        let mut entries = ledger.entries().to_vec();
        entries[0].index = 4;

        let err = AppendOnlyLedger::from_entries(entries).unwrap_err();
        assert!(matches!(err, GreetingError::Integrity(_)));
        assert!(err.to_string().contains("index gap"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn from_entries_reports_broken_chain_as_integrity_failure() {
        let mut ledger = AppendOnlyLedger::new();
        ledger
            .append_payment(&record("g1", "QK7ABC12XZ", PaymentPurpose::Publish))
            .unwrap();
        ledger
            .append_audit("g1", None, AuditEvent::new("manual_review_approved", "ops"))
            .unwrap();
        let mut entries = ledger.entries().to_vec();
        entries[1].payload = serde_json::json!({"stage": "rewritten"});

        let err = AppendOnlyLedger::from_entries(entries).unwrap_err();
        assert!(matches!(err, GreetingError::Integrity(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn reloaded_ledger_keeps_code_claims() {
        let mut ledger = AppendOnlyLedger::new();
        for (id, code) in [("g1", "QK7ABC12XZ"), ("g2", "PAIDBYALICE1")] {
            ledger
                .append_payment(&record(id, code, PaymentPurpose::Reveal))
                .unwrap();
        }
        ledger
            .append_audit("g1", None, AuditEvent::new("note", "after payments"))
            .unwrap();

        let reloaded = AppendOnlyLedger::from_entries(ledger.entries().to_vec()).unwrap();
        let claim = reloaded.code_claim("  paidbyalice1 ").unwrap();
        assert_eq!(claim.greeting_id, "g2");
        assert!(reloaded.accepted_payment("g1", "qk7abc12xz", PaymentPurpose::Reveal));
        assert!(reloaded.code_claim("UNUSED0001").is_none());
    }

    #[test]
    fn first_claim_on_a_code_wins() {
        let mut ledger = AppendOnlyLedger::new();
        ledger
            .append_payment(&record("g1", "QK7ABC12XZ", PaymentPurpose::Publish))
            .unwrap();
        ledger
            .append_payment(&record("g2", "qk7abc12xz", PaymentPurpose::Publish))
            .unwrap();

        assert_eq!(ledger.code_claim("QK7ABC12XZ").unwrap().greeting_id, "g1");
    }
}
