//! Recipient-side flow over one greeting.
//!
//! The session owns its unlock grant and revealed content for its own lifetime; nothing
//! about the unlock is stored server-side. An owner session is passed in explicitly and
//! only turns into a preview when the caller asks for one.

use greeting_core::{
    normalize_payment_code, AccessGate, DraftField, GateOutcome, GreetingApi, GreetingError,
    GreetingView, OwnerSession, PaymentMethod, ResponseReceipt, RevealReceipt, UnlockGrant,
    ViewerContext,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::decline::DeclineButton;
use crate::response::ResponseRecorder;

pub struct ViewerSession {
    api: Arc<dyn GreetingApi>,
    greeting_id: String,
    owner: Option<OwnerSession>,
    preview: bool,
    view: Option<GreetingView>,
    grant: Option<UnlockGrant>,
    recorder: ResponseRecorder,
    accepted: bool,
    celebration_pending: bool,
    decline: DeclineButton,
}

impl ViewerSession {
    pub fn new(api: Arc<dyn GreetingApi>, greeting_id: impl Into<String>) -> Self {
        Self {
            recorder: ResponseRecorder::new(Arc::clone(&api)),
            api,
            greeting_id: greeting_id.into(),
            owner: None,
            preview: false,
            view: None,
            grant: None,
            accepted: false,
            celebration_pending: false,
            decline: DeclineButton::new(),
        }
    }

    /// Attach the creator's session. `preview` opts into the owner preview.
    pub fn with_owner(mut self, owner: OwnerSession, preview: bool) -> Self {
        self.owner = Some(owner);
        self.preview = preview;
        self
    }

    pub fn greeting_id(&self) -> &str {
        &self.greeting_id
    }

    /// Fetch the greeting. A view already revealed in this session is kept.
    pub async fn load(&mut self) -> Result<GateOutcome, GreetingError> {
        let view = self
            .api
            .fetch(&self.greeting_id, self.owner.as_ref(), self.preview)
            .await?;
        self.accepted = self.accepted || view.is_accepted();
        let keep_revealed = self.grant.is_some()
            && self
                .view
                .as_ref()
                .map(|current| !current.is_locked)
                .unwrap_or(false);
        if !keep_revealed {
            self.view = Some(view);
        }
        Ok(self.gate())
    }

    pub fn gate(&self) -> GateOutcome {
        let Some(view) = self.view.as_ref() else {
            return GateOutcome::Locked;
        };

        let mut context = ViewerContext::anonymous();
        if let Some(owner) = self.owner.as_ref() {
            context = context.with_owner(owner, self.preview);
        }
        if let Some(grant) = self.grant.as_ref() {
            context = context.with_unlock(grant);
        }
        AccessGate::evaluate(view, context)
    }

    /// Greeting as currently renderable. Content is `None` while locked.
    pub fn view(&self) -> Option<&GreetingView> {
        self.view.as_ref()
    }

    pub fn is_unlocked(&self) -> bool {
        self.gate().is_open()
    }

    /// Try the secret answer. A blank answer fails validation without a request.
    pub async fn unlock(&mut self, answer: &str) -> Result<bool, GreetingError> {
        if answer.trim().is_empty() {
            return Err(GreetingError::invalid(
                DraftField::Answer,
                "enter an answer to unlock",
            ));
        }
        if self.grant.is_some() {
            return Ok(true);
        }

        let receipt = self.api.submit_answer(&self.greeting_id, answer).await?;
        if !receipt.matched {
            debug!(greeting_id = %self.greeting_id, "Answer did not match");
            return Ok(false);
        }

        self.grant = Some(UnlockGrant::new(&self.greeting_id));
        if let Some(revealed) = receipt.revealed {
            self.accepted = self.accepted || revealed.is_accepted();
            self.view = Some(revealed);
        }
        info!(greeting_id = %self.greeting_id, "Greeting unlocked");
        Ok(true)
    }

    /// Pay to learn the answer. With `auto_submit`, an accepted answer is fed straight
    /// into [`ViewerSession::unlock`].
    pub async fn reveal_with_payment(
        &mut self,
        code: &str,
        method: PaymentMethod,
        auto_submit: bool,
    ) -> Result<RevealReceipt, GreetingError> {
        let code = normalize_payment_code(code)?;
        let receipt = self
            .api
            .submit_payment_proof(&self.greeting_id, &code, method)
            .await?;

        if auto_submit {
            if let Some(answer) = receipt.answer.as_deref() {
                self.unlock(answer).await?;
            }
        }
        Ok(receipt)
    }

    /// "Yes". Shows the celebration at once and records the response in the background.
    ///
    /// Returns the background task when a request was sent. Locked greetings and owner
    /// previews never send one, and a session sends at most one.
    pub fn accept(&mut self) -> Option<JoinHandle<Option<ResponseReceipt>>> {
        let outcome = self.gate();
        if !outcome.records_response() || self.accepted {
            debug!(greeting_id = %self.greeting_id, ?outcome, "Accept ignored");
            return None;
        }

        self.accepted = true;
        self.celebration_pending = outcome.celebrates();
        Some(self.recorder.record(&self.greeting_id))
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    /// True exactly once after a successful accept.
    pub fn take_celebration(&mut self) -> bool {
        std::mem::take(&mut self.celebration_pending)
    }

    /// "No" dodged again; returns the new button copy.
    pub fn evade_decline(&mut self) -> &'static str {
        self.decline.evade()
    }

    pub fn decline_label(&self) -> &'static str {
        self.decline.label()
    }
}

impl std::fmt::Debug for ViewerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerSession")
            .field("greeting_id", &self.greeting_id)
            .field("owner", &self.owner.is_some())
            .field("preview", &self.preview)
            .field("unlocked", &self.grant.is_some())
            .field("accepted", &self.accepted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{challenge_draft, engine_with, open_draft, CountingApi};
    use greeting_adapters::{AcceptAllLedger, ManualReviewLedger};
    use greeting_core::{GreetingEngine, PaymentState};

    async fn session_for(
        engine: Arc<GreetingEngine>,
        draft: greeting_core::ContentDraft,
    ) -> (Arc<CountingApi>, ViewerSession, greeting_core::CreatedGreeting) {
        let api = Arc::new(CountingApi::new(engine));
        let created = api.create(&draft).await.unwrap();
        let session = ViewerSession::new(api.clone(), &created.id);
        (api, session, created)
    }

    #[tokio::test]
    async fn greeting_without_challenge_is_unlocked_on_load() {
        let (_, mut session, _) =
            session_for(engine_with(Arc::new(ManualReviewLedger)), open_draft()).await;
        assert_eq!(session.gate(), GateOutcome::Locked);

        assert_eq!(session.load().await.unwrap(), GateOutcome::Unlocked);
        assert!(session.view().unwrap().content.is_some());
    }

    #[tokio::test]
    async fn normalized_answer_unlocks_and_caches() {
        let (api, mut session, _) =
            session_for(engine_with(Arc::new(ManualReviewLedger)), challenge_draft()).await;

        assert_eq!(session.load().await.unwrap(), GateOutcome::Locked);
        assert!(session.view().unwrap().content.is_none());

        assert!(!session.unlock("Mombasa").await.unwrap());
        assert_eq!(session.gate(), GateOutcome::Locked);

        assert!(session.unlock("nairobi ").await.unwrap());
        assert_eq!(session.gate(), GateOutcome::Unlocked);
        assert_eq!(api.answers(), 2);

        assert!(session.unlock("anything").await.unwrap());
        assert_eq!(api.answers(), 2);

        assert_eq!(session.load().await.unwrap(), GateOutcome::Unlocked);
        assert!(session.view().unwrap().content.is_some());
    }

    #[tokio::test]
    async fn blank_answer_never_reaches_service() {
        let (api, mut session, _) =
            session_for(engine_with(Arc::new(ManualReviewLedger)), challenge_draft()).await;
        session.load().await.unwrap();

        assert!(matches!(
            session.unlock("   ").await,
            Err(GreetingError::Validation(_))
        ));
        assert_eq!(api.answers(), 0);
    }

    #[tokio::test]
    async fn paid_reveal_auto_submits_answer() {
        let (api, mut session, created) =
            session_for(engine_with(Arc::new(AcceptAllLedger)), challenge_draft()).await;
        session.load().await.unwrap();

        let receipt = session
            .reveal_with_payment("REVEAL1234", PaymentMethod::Mpesa, true)
            .await
            .unwrap();
        assert!(receipt.accepted);
        assert_eq!(receipt.answer.as_deref(), Some("Nairobi"));
        assert_eq!(session.gate(), GateOutcome::Unlocked);

        let dashboard = api.management_view(&created.owner_token).await.unwrap();
        assert_eq!(dashboard.payment_state, PaymentState::Unpaid);
    }

    #[tokio::test]
    async fn accept_celebrates_once_and_records_once() {
        let (api, mut session, created) =
            session_for(engine_with(Arc::new(ManualReviewLedger)), open_draft()).await;
        session.load().await.unwrap();

        let handle = session.accept().expect("request sent");
        assert!(session.take_celebration());
        assert!(!session.take_celebration());

        let receipt = handle.await.unwrap().expect("recorded");
        assert!(receipt.newly_recorded);
        assert!(session.accept().is_none());
        assert_eq!(api.responses(), 1);

        let dashboard = api.management_view(&created.owner_token).await.unwrap();
        assert!(dashboard.is_accepted);
        assert_eq!(dashboard.view_count, 1);
    }

    #[tokio::test]
    async fn locked_greeting_cannot_be_accepted() {
        let (api, mut session, _) =
            session_for(engine_with(Arc::new(ManualReviewLedger)), challenge_draft()).await;
        session.load().await.unwrap();

        assert!(session.accept().is_none());
        assert!(!session.take_celebration());
        assert_eq!(api.responses(), 0);
    }

    #[tokio::test]
    async fn owner_preview_is_open_but_silent() {
        let engine = engine_with(Arc::new(ManualReviewLedger));
        let api = Arc::new(CountingApi::new(engine));
        let created = api.create(&challenge_draft()).await.unwrap();
        let owner = OwnerSession::new(&created.id, &created.owner_token);

        let mut preview = ViewerSession::new(api.clone(), &created.id).with_owner(owner.clone(), true);
        assert_eq!(preview.load().await.unwrap(), GateOutcome::OwnerPreview);
        assert!(preview.view().unwrap().content.is_some());
        assert!(preview.accept().is_none());
        assert!(!preview.take_celebration());
        assert_eq!(api.responses(), 0);

        let mut owner_as_viewer = ViewerSession::new(api.clone(), &created.id).with_owner(owner, false);
        assert_eq!(owner_as_viewer.load().await.unwrap(), GateOutcome::Locked);

        let dashboard = api.management_view(&created.owner_token).await.unwrap();
        assert_eq!(dashboard.view_count, 1);
        assert!(dashboard.response.is_none());
    }

    #[tokio::test]
    async fn owner_preview_of_open_greeting_never_responds() {
        let engine = engine_with(Arc::new(ManualReviewLedger));
        let api = Arc::new(CountingApi::new(engine));
        let created = api.create(&open_draft()).await.unwrap();
        let owner = OwnerSession::new(&created.id, &created.owner_token);

        let mut preview = ViewerSession::new(api.clone(), &created.id).with_owner(owner, true);
        assert_eq!(preview.load().await.unwrap(), GateOutcome::OwnerPreview);
        assert!(preview.view().unwrap().preview);
        assert!(preview.is_unlocked());
        assert!(preview.accept().is_none());
        assert!(!preview.take_celebration());
        assert_eq!(api.responses(), 0);

        let dashboard = api.management_view(&created.owner_token).await.unwrap();
        assert_eq!(dashboard.view_count, 0);
        assert!(dashboard.response.is_none());
    }

    #[tokio::test]
    async fn failed_response_keeps_celebration() {
        let engine = engine_with(Arc::new(ManualReviewLedger));
        let api = Arc::new(CountingApi::new(engine));
        let created = api.create(&open_draft()).await.unwrap();

        let mut session = ViewerSession::new(api.clone(), &created.id);
        session.load().await.unwrap();
        api.fail_responses();

        let handle = session.accept().expect("request sent");
        assert!(handle.await.unwrap().is_none());
        assert!(session.is_accepted());
        assert!(session.take_celebration());
    }

    #[test]
    fn decline_button_escalates_without_requests() {
        let api = Arc::new(CountingApi::new(engine_with(Arc::new(ManualReviewLedger))));
        let mut session = ViewerSession::new(api.clone(), "abc123def456");
        assert_eq!(session.decline_label(), "No");
        session.evade_decline();
        session.evade_decline();
        assert_eq!(session.evade_decline(), "Really? 😢");
        assert_eq!(api.responses(), 0);
    }
}
