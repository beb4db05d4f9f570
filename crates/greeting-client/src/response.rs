//! Fire-and-forget acceptance recording.

use greeting_core::{GreetingApi, ResponseReceipt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Sends the recipient's acceptance on a background task.
///
/// The caller has already shown the celebration; a failed request is logged and never
/// rolled back.
#[derive(Clone)]
pub struct ResponseRecorder {
    api: Arc<dyn GreetingApi>,
}

impl ResponseRecorder {
    pub fn new(api: Arc<dyn GreetingApi>) -> Self {
        Self { api }
    }

    /// Must be called from within a tokio runtime.
    pub fn record(&self, greeting_id: &str) -> JoinHandle<Option<ResponseReceipt>> {
        let api = Arc::clone(&self.api);
        let greeting_id = greeting_id.to_string();
        tokio::spawn(async move {
            match api.record_response(&greeting_id, true).await {
                Ok(receipt) => {
                    debug!(
                        greeting_id = %greeting_id,
                        newly_recorded = receipt.newly_recorded,
                        "Response recorded"
                    );
                    Some(receipt)
                }
                Err(err) => {
                    warn!(greeting_id = %greeting_id, error = %err, "Failed to record response");
                    None
                }
            }
        })
    }
}

impl std::fmt::Debug for ResponseRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseRecorder").finish_non_exhaustive()
    }
}
