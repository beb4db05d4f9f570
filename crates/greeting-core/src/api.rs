//! Transport-neutral greeting operations.
//!
//! Implemented in-process by [`GreetingEngine`] and over HTTP by the client crate, so
//! viewer and authoring flows are written once against this trait.

use async_trait::async_trait;

use crate::draft::ContentDraft;
use crate::engine::GreetingEngine;
use crate::error::GreetingError;
use crate::gate::OwnerSession;
use crate::types::{
    CreatedGreeting, GreetingView, ManagementView, ManualPaymentReceipt, PaymentMethod,
    ResponseReceipt, RevealReceipt, UnlockReceipt,
};

#[async_trait]
pub trait GreetingApi: Send + Sync {
    async fn create(&self, draft: &ContentDraft) -> Result<CreatedGreeting, GreetingError>;

    /// Fetch by public id. The owner session only matters when `preview` is set.
    async fn fetch(
        &self,
        id: &str,
        owner: Option<&OwnerSession>,
        preview: bool,
    ) -> Result<GreetingView, GreetingError>;

    async fn submit_answer(&self, id: &str, answer: &str) -> Result<UnlockReceipt, GreetingError>;

    async fn submit_manual_payment(
        &self,
        id: &str,
        code: &str,
        method: PaymentMethod,
    ) -> Result<ManualPaymentReceipt, GreetingError>;

    async fn submit_payment_proof(
        &self,
        id: &str,
        code: &str,
        method: PaymentMethod,
    ) -> Result<RevealReceipt, GreetingError>;

    async fn record_response(
        &self,
        id: &str,
        accepted: bool,
    ) -> Result<ResponseReceipt, GreetingError>;

    async fn management_view(&self, owner_token: &str) -> Result<ManagementView, GreetingError>;
}

#[async_trait]
impl GreetingApi for GreetingEngine {
    async fn create(&self, draft: &ContentDraft) -> Result<CreatedGreeting, GreetingError> {
        GreetingEngine::create(self, draft).await
    }

    async fn fetch(
        &self,
        id: &str,
        owner: Option<&OwnerSession>,
        preview: bool,
    ) -> Result<GreetingView, GreetingError> {
        let owner_token = owner
            .filter(|session| session.owns(id))
            .map(|session| session.owner_token.as_str());
        GreetingEngine::fetch(self, id, owner_token, preview).await
    }

    async fn submit_answer(&self, id: &str, answer: &str) -> Result<UnlockReceipt, GreetingError> {
        GreetingEngine::submit_answer(self, id, answer).await
    }

    async fn submit_manual_payment(
        &self,
        id: &str,
        code: &str,
        method: PaymentMethod,
    ) -> Result<ManualPaymentReceipt, GreetingError> {
        GreetingEngine::submit_manual_payment(self, id, code, method).await
    }

    async fn submit_payment_proof(
        &self,
        id: &str,
        code: &str,
        method: PaymentMethod,
    ) -> Result<RevealReceipt, GreetingError> {
        GreetingEngine::submit_payment_proof(self, id, code, method).await
    }

    async fn record_response(
        &self,
        id: &str,
        accepted: bool,
    ) -> Result<ResponseReceipt, GreetingError> {
        GreetingEngine::record_response(self, id, accepted).await
    }

    async fn management_view(&self, owner_token: &str) -> Result<ManagementView, GreetingError> {
        GreetingEngine::management_view(self, owner_token).await
    }
}
