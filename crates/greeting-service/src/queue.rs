use chrono::{DateTime, Utc};
use greeting_core::PaymentMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("review queue IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("review queue serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Publish payment waiting for a human to match it against the statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReview {
    pub greeting_id: String,
    pub code: String,
    pub method: PaymentMethod,
    pub queued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct QueueData {
    entries: BTreeMap<String, PendingReview>,
}

/// File-backed manual payment review queue, keyed by greeting id.
///
/// Persisted after every mutation so parked payments survive restarts.
#[derive(Debug)]
pub struct ReviewQueue {
    path: PathBuf,
    data: QueueData,
}

impl ReviewQueue {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let path = path.into();
        let data = if path.exists() {
            let bytes = fs::read(&path)?;
            if bytes.is_empty() {
                QueueData::default()
            } else {
                serde_json::from_slice(&bytes)?
            }
        } else {
            QueueData::default()
        };

        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Park or refresh a payment. A resubmitted code keeps its original queue position.
    pub fn upsert(
        &mut self,
        greeting_id: &str,
        code: &str,
        method: PaymentMethod,
    ) -> Result<(), QueueError> {
        let now = Utc::now();
        let queued_at = self
            .data
            .entries
            .get(greeting_id)
            .filter(|entry| entry.code.eq_ignore_ascii_case(code))
            .map(|entry| entry.queued_at)
            .unwrap_or(now);

        self.data.entries.insert(
            greeting_id.to_string(),
            PendingReview {
                greeting_id: greeting_id.to_string(),
                code: code.to_string(),
                method,
                queued_at,
                updated_at: now,
            },
        );

        self.persist()
    }

    pub fn get(&self, greeting_id: &str) -> Option<&PendingReview> {
        self.data.entries.get(greeting_id)
    }

    pub fn remove(&mut self, greeting_id: &str) -> Result<Option<PendingReview>, QueueError> {
        let removed = self.data.entries.remove(greeting_id);
        if removed.is_some() {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Oldest first.
    pub fn list(&self) -> Vec<PendingReview> {
        let mut values: Vec<PendingReview> = self.data.entries.values().cloned().collect();
        values.sort_by_key(|item| item.queued_at);
        values
    }

    fn persist(&self) -> Result<(), QueueError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = serde_json::to_vec_pretty(&self.data)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, bytes)?;
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn queue_path(label: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("greeting-queue-{label}-{}", Uuid::new_v4()))
            .join("reviews.json")
    }

    #[test]
    fn queue_persists_across_reload() {
        let path = queue_path("reload");

        let mut queue = ReviewQueue::load(&path).unwrap();
        queue
            .upsert("abc123def456", "QK7ABC12XZ", PaymentMethod::Mpesa)
            .unwrap();

        let reloaded = ReviewQueue::load(&path).unwrap();
        assert_eq!(reloaded.list().len(), 1);
        assert_eq!(
            reloaded.get("abc123def456").map(|entry| entry.method),
            Some(PaymentMethod::Mpesa)
        );
    }

    #[test]
    fn resubmitting_same_code_keeps_queue_position() {
        let path = queue_path("position");
        let mut queue = ReviewQueue::load(&path).unwrap();

        queue.upsert("g1", "QK7ABC12XZ", PaymentMethod::Mpesa).unwrap();
        let first = queue.get("g1").cloned().unwrap();
        queue.upsert("g1", "qk7abc12xz", PaymentMethod::Mpesa).unwrap();
        assert_eq!(queue.get("g1").unwrap().queued_at, first.queued_at);

        queue.upsert("g1", "NEWCODE123", PaymentMethod::Paypal).unwrap();
        let replaced = queue.get("g1").unwrap();
        assert_eq!(replaced.code, "NEWCODE123");
        assert!(replaced.queued_at >= first.queued_at);

        assert!(queue.remove("g1").unwrap().is_some());
        assert!(queue.remove("g1").unwrap().is_none());
        assert!(ReviewQueue::load(&path).unwrap().list().is_empty());
    }
}
