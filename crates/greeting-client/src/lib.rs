//! Caller-side greeting flows.
//!
//! Everything here talks to a [`GreetingApi`]: either [`HttpGreetingClient`] against a
//! running `greetingd`, or an in-process `GreetingEngine`.

#![deny(unsafe_code)]

pub mod authoring;
pub mod decline;
pub mod http;
pub mod response;
pub mod viewer;

pub use authoring::AuthoringSession;
pub use decline::DeclineButton;
pub use greeting_core::{GreetingApi, OwnerSession};
pub use http::{HttpGreetingClient, ServiceHealth};
pub use response::ResponseRecorder;
pub use viewer::ViewerSession;

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use greeting_core::{
        ContentDraft, CreatedGreeting, GreetingApi, GreetingEngine, GreetingError, GreetingView,
        ManagementView, ManualPaymentReceipt, MemoryGreetingStore, OwnerSession, PaymentLedger,
        PaymentMethod, PersistentLedger, ResponseReceipt, RevealReceipt, UnlockReceipt,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    pub fn engine_with(payments: Arc<dyn PaymentLedger>) -> Arc<GreetingEngine> {
        Arc::new(GreetingEngine::from_parts(
            Arc::new(MemoryGreetingStore::new()),
            PersistentLedger::default(),
            payments,
        ))
    }

    pub fn open_draft() -> ContentDraft {
        ContentDraft {
            sender_name: "Amani".to_string(),
            recipient_name: "Wanjiru".to_string(),
            message: "Will you be my valentine?".to_string(),
            ..ContentDraft::default()
        }
    }

    pub fn challenge_draft() -> ContentDraft {
        ContentDraft {
            challenge_question: "City?".to_string(),
            challenge_answer: "Nairobi".to_string(),
            ..open_draft()
        }
    }

    /// In-process API that counts calls reaching the service.
    pub struct CountingApi {
        inner: Arc<GreetingEngine>,
        creates: AtomicUsize,
        answers: AtomicUsize,
        payments: AtomicUsize,
        responses: AtomicUsize,
        fail_responses: AtomicBool,
    }

    impl CountingApi {
        pub fn new(inner: Arc<GreetingEngine>) -> Self {
            Self {
                inner,
                creates: AtomicUsize::new(0),
                answers: AtomicUsize::new(0),
                payments: AtomicUsize::new(0),
                responses: AtomicUsize::new(0),
                fail_responses: AtomicBool::new(false),
            }
        }

        pub fn creates(&self) -> usize {
            self.creates.load(Ordering::SeqCst)
        }

        pub fn answers(&self) -> usize {
            self.answers.load(Ordering::SeqCst)
        }

        pub fn payments(&self) -> usize {
            self.payments.load(Ordering::SeqCst)
        }

        pub fn responses(&self) -> usize {
            self.responses.load(Ordering::SeqCst)
        }

        pub fn fail_responses(&self) {
            self.fail_responses.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl GreetingApi for CountingApi {
        async fn create(&self, draft: &ContentDraft) -> Result<CreatedGreeting, GreetingError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.inner.create(draft).await
        }

        async fn fetch(
            &self,
            id: &str,
            owner: Option<&OwnerSession>,
            preview: bool,
        ) -> Result<GreetingView, GreetingError> {
            GreetingApi::fetch(self.inner.as_ref(), id, owner, preview).await
        }

        async fn submit_answer(
            &self,
            id: &str,
            answer: &str,
        ) -> Result<UnlockReceipt, GreetingError> {
            self.answers.fetch_add(1, Ordering::SeqCst);
            self.inner.submit_answer(id, answer).await
        }

        async fn submit_manual_payment(
            &self,
            id: &str,
            code: &str,
            method: PaymentMethod,
        ) -> Result<ManualPaymentReceipt, GreetingError> {
            self.payments.fetch_add(1, Ordering::SeqCst);
            self.inner.submit_manual_payment(id, code, method).await
        }

        async fn submit_payment_proof(
            &self,
            id: &str,
            code: &str,
            method: PaymentMethod,
        ) -> Result<RevealReceipt, GreetingError> {
            self.payments.fetch_add(1, Ordering::SeqCst);
            self.inner.submit_payment_proof(id, code, method).await
        }

        async fn record_response(
            &self,
            id: &str,
            accepted: bool,
        ) -> Result<ResponseReceipt, GreetingError> {
            self.responses.fetch_add(1, Ordering::SeqCst);
            if self.fail_responses.load(Ordering::SeqCst) {
                return Err(GreetingError::Transient("connection reset".to_string()));
            }
            self.inner.record_response(id, accepted).await
        }

        async fn management_view(
            &self,
            owner_token: &str,
        ) -> Result<ManagementView, GreetingError> {
            self.inner.management_view(owner_token).await
        }
    }
}
