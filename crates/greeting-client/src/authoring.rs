//! Author-side flow: walk the wizard, submit once, then settle the publish payment.

use greeting_core::{
    normalize_payment_code, CreatedGreeting, GreetingApi, GreetingError, ManagementView,
    ManualPaymentReceipt, OwnerSession, PaymentMethod, StepSequencer,
};
use tracing::info;

#[derive(Debug, Default)]
pub struct AuthoringSession {
    sequencer: StepSequencer,
    created: Option<CreatedGreeting>,
}

impl AuthoringSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sequencer(sequencer: StepSequencer) -> Self {
        Self {
            sequencer,
            created: None,
        }
    }

    pub fn sequencer(&self) -> &StepSequencer {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut StepSequencer {
        &mut self.sequencer
    }

    pub fn created(&self) -> Option<&CreatedGreeting> {
        self.created.as_ref()
    }

    pub fn is_submitted(&self) -> bool {
        self.created.is_some()
    }

    /// Owner session for the submitted greeting, to be kept by the caller.
    pub fn owner_session(&self) -> Option<OwnerSession> {
        self.created
            .as_ref()
            .map(|created| OwnerSession::new(&created.id, &created.owner_token))
    }

    /// Create the greeting from the final step.
    ///
    /// Runs full validation locally first. A session submits at most once; later calls
    /// return the first result without another request.
    pub async fn submit(&mut self, api: &dyn GreetingApi) -> Result<CreatedGreeting, GreetingError> {
        if let Some(created) = &self.created {
            return Ok(created.clone());
        }

        self.sequencer.finish()?;
        let created = api.create(self.sequencer.draft()).await?;
        info!(greeting_id = %created.id, "Greeting submitted");
        self.created = Some(created.clone());
        Ok(created)
    }

    /// Submit the publish payment code. Malformed codes never leave the client.
    pub async fn pay_publish(
        &self,
        api: &dyn GreetingApi,
        code: &str,
        method: PaymentMethod,
    ) -> Result<ManualPaymentReceipt, GreetingError> {
        let code = normalize_payment_code(code)?;
        let created = self.require_created()?;
        api.submit_manual_payment(&created.id, &code, method).await
    }

    pub async fn dashboard(&self, api: &dyn GreetingApi) -> Result<ManagementView, GreetingError> {
        let created = self.require_created()?;
        api.management_view(&created.owner_token).await
    }

    fn require_created(&self) -> Result<&CreatedGreeting, GreetingError> {
        self.created
            .as_ref()
            .ok_or_else(|| GreetingError::NotFound("greeting has not been submitted".to_string()))
    }
}
