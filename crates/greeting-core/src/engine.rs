use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::draft::{ContentDraft, DraftField};
use crate::error::GreetingError;
use crate::gate::{AccessGate, GateOutcome, OwnerSession, ViewerContext};
use crate::ledger::{AuditEvent, LedgerEntry, PaymentRecord};
use crate::payments::{
    codes_match, ensure_transition, normalize_payment_code, PaymentLedger, PaymentProof,
    PaymentPurpose, PaymentVerdict,
};
use crate::pricing::publish_quote;
use crate::storage::{bootstrap_storage, GreetingStore, PersistentLedger, StoreConfig};
use crate::tokens::{generate_owner_token, generate_public_id, hash_owner_token};
use crate::types::{
    CreatedGreeting, Greeting, GreetingView, ManagementView, ManualPaymentReceipt, NewGreeting,
    PaymentMethod, PaymentState, ResponseReceipt, ResponseRecord, RevealReceipt, UnlockReceipt,
};

#[derive(Debug, Clone, Default)]
pub struct GreetingEngineConfig {
    pub store: StoreConfig,
}

/// Human decision on a parked manual payment.
#[derive(Debug, Clone)]
pub struct ReviewDecision {
    pub reviewer_id: String,
    pub method: PaymentMethod,
    pub note: Option<String>,
}

/// Greeting lifecycle engine: creation, gated fetch, verification and response tracking.
pub struct GreetingEngine {
    store: Arc<dyn GreetingStore>,
    ledger: Arc<AsyncMutex<PersistentLedger>>,
    payments: Arc<dyn PaymentLedger>,
}

impl GreetingEngine {
    pub async fn bootstrap(
        config: GreetingEngineConfig,
        payments: Arc<dyn PaymentLedger>,
    ) -> Result<Self, GreetingError> {
        let storage = bootstrap_storage(config.store).await?;
        info!(
            store = storage.store.backend_label(),
            payment_ledger = payments.ledger_id(),
            "Greeting engine bootstrapped"
        );
        Ok(Self::from_parts(storage.store, storage.ledger, payments))
    }

    pub fn from_parts(
        store: Arc<dyn GreetingStore>,
        ledger: PersistentLedger,
        payments: Arc<dyn PaymentLedger>,
    ) -> Self {
        Self {
            store,
            ledger: Arc::new(AsyncMutex::new(ledger)),
            payments,
        }
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend_label()
    }

    pub fn payment_ledger_id(&self) -> &'static str {
        self.payments.ledger_id()
    }

    /// Validate a submitted draft and persist it as a new, unpaid greeting.
    pub async fn create(&self, draft: &ContentDraft) -> Result<CreatedGreeting, GreetingError> {
        let request = draft.validate()?;
        self.create_validated(request).await
    }

    pub async fn create_validated(
        &self,
        request: NewGreeting,
    ) -> Result<CreatedGreeting, GreetingError> {
        let owner_token = generate_owner_token();
        let template = request.content.template;
        let greeting = Greeting {
            id: generate_public_id(),
            owner_token_hash: hash_owner_token(&owner_token),
            content: request.content,
            challenge: request.challenge,
            payment_state: PaymentState::Unpaid,
            payment_code: None,
            view_count: 0,
            response: None,
            created_at: Utc::now(),
        };
        let id = greeting.id.clone();
        let has_challenge = greeting.has_challenge();
        self.store.insert(greeting).await?;

        info!(
            greeting_id = %id,
            template = template.name(),
            has_challenge,
            "Greeting created"
        );

        Ok(CreatedGreeting {
            share_path: crate::types::share_path(&id),
            id,
            owner_token,
            price: publish_quote(template),
        })
    }

    /// Load a greeting for display, applying the access gate.
    ///
    /// Every fetch counts a view except an owner preview.
    pub async fn fetch(
        &self,
        id: &str,
        owner_token: Option<&str>,
        preview: bool,
    ) -> Result<GreetingView, GreetingError> {
        let greeting = self.load(id).await?;

        let owner = owner_token
            .filter(|token| hash_owner_token(token) == greeting.owner_token_hash)
            .map(|token| OwnerSession::new(id, token));
        let mut context = ViewerContext::anonymous();
        if let Some(owner) = owner.as_ref() {
            context = context.with_owner(owner, preview);
        }

        match AccessGate::evaluate(&greeting, context) {
            GateOutcome::OwnerPreview => {
                debug!(greeting_id = %id, "Owner preview served");
                Ok(greeting.public_view(true, true))
            }
            outcome => {
                let greeting = self.store.increment_views(id).await?;
                Ok(greeting.public_view(outcome.is_open(), false))
            }
        }
    }

    /// Challenge-answer path. Unlimited retries; nothing is persisted.
    pub async fn submit_answer(
        &self,
        id: &str,
        answer: &str,
    ) -> Result<UnlockReceipt, GreetingError> {
        if answer.trim().is_empty() {
            return Err(GreetingError::invalid(DraftField::Answer, "answer is required"));
        }
        let greeting = self.load(id).await?;

        let matched = greeting
            .challenge
            .as_ref()
            .map(|challenge| challenge.accepts(answer))
            .unwrap_or(true);

        if matched {
            debug!(greeting_id = %id, "Challenge answer matched");
            Ok(UnlockReceipt::matched(greeting.public_view(true, false)))
        } else {
            debug!(greeting_id = %id, "Challenge answer did not match");
            Ok(UnlockReceipt::not_matched())
        }
    }

    /// Creator-side publish payment.
    ///
    /// A confirmed code publishes immediately; an unknown code parks the greeting in
    /// `pending_manual_review` for a human reviewer.
    pub async fn submit_manual_payment(
        &self,
        id: &str,
        code: &str,
        method: PaymentMethod,
    ) -> Result<ManualPaymentReceipt, GreetingError> {
        let code = normalize_payment_code(code)?;
        let greeting = self.load(id).await?;

        if greeting.payment_state == PaymentState::Paid {
            return Ok(publish_receipt(
                true,
                PaymentState::Paid,
                "Payment already confirmed. Your greeting is live.",
            ));
        }

        // Held for the whole check-then-record sequence so one code cannot be accepted twice.
        let mut ledger = self.ledger.lock().await;
        if let Some(claim) = ledger.code_claim(&code) {
            if claim.greeting_id != id || claim.purpose != PaymentPurpose::Publish {
                warn!(greeting_id = %id, "Publish code already used elsewhere");
                return Ok(publish_receipt(
                    false,
                    greeting.payment_state,
                    "This payment code has already been used.",
                ));
            }
        }

        let proof = PaymentProof {
            greeting_id: id.to_string(),
            code: code.clone(),
            purpose: PaymentPurpose::Publish,
            method,
        };
        match self.payments.verify(&proof).await? {
            PaymentVerdict::Confirmed => {
                ensure_transition(greeting.payment_state, PaymentState::Paid)?;
                if !ledger.accepted_payment(id, &code, PaymentPurpose::Publish) {
                    ledger
                        .append_payment(&PaymentRecord::new(
                            id,
                            &code,
                            PaymentPurpose::Publish,
                            method,
                        ))
                        .await?;
                }
                let moved = self
                    .store
                    .transition_payment(id, greeting.payment_state, PaymentState::Paid, Some(code))
                    .await?;
                if moved.is_none() {
                    return self.current_publish_receipt(id).await;
                }

                info!(greeting_id = %id, method = method.name(), "Publish payment confirmed");
                Ok(publish_receipt(
                    true,
                    PaymentState::Paid,
                    "Payment confirmed. Your greeting is live.",
                ))
            }
            PaymentVerdict::Unknown => {
                let already_parked = greeting.payment_state == PaymentState::PendingManualReview
                    && greeting
                        .payment_code
                        .as_deref()
                        .map(|parked| codes_match(parked, &code))
                        .unwrap_or(false);

                if !already_parked {
                    ensure_transition(greeting.payment_state, PaymentState::PendingManualReview)?;
                    let moved = self
                        .store
                        .transition_payment(
                            id,
                            greeting.payment_state,
                            PaymentState::PendingManualReview,
                            Some(code.clone()),
                        )
                        .await?;
                    if moved.is_none() {
                        return self.current_publish_receipt(id).await;
                    }
                    ledger
                        .append_audit(
                            id,
                            Some(code),
                            AuditEvent::new(
                                "manual_review_requested",
                                format!("method={}", method.name()),
                            ),
                        )
                        .await?;
                    info!(greeting_id = %id, method = method.name(), "Publish payment parked for manual review");
                }

                Ok(publish_receipt(
                    true,
                    PaymentState::PendingManualReview,
                    "Payment submitted. It will be verified manually shortly.",
                ))
            }
            PaymentVerdict::Declined(reason) => {
                warn!(greeting_id = %id, reason = %reason, "Publish payment declined");
                Ok(publish_receipt(false, greeting.payment_state, reason))
            }
        }
    }

    /// Reviewer confirmed the parked code by hand.
    pub async fn approve_manual_review(
        &self,
        id: &str,
        decision: ReviewDecision,
    ) -> Result<ManagementView, GreetingError> {
        let greeting = self.load(id).await?;
        match greeting.payment_state {
            PaymentState::Paid => return Ok(greeting.management_view()),
            PaymentState::Unpaid => {
                return Err(GreetingError::VerificationMismatch(format!(
                    "greeting '{id}' has no payment awaiting review"
                )))
            }
            PaymentState::PendingManualReview => {}
        }
        let code = greeting.payment_code.clone().ok_or_else(|| {
            GreetingError::Transient(format!("greeting '{id}' is pending without a code"))
        })?;

        let mut ledger = self.ledger.lock().await;
        if let Some(claim) = ledger.code_claim(&code) {
            if claim.greeting_id != id || claim.purpose != PaymentPurpose::Publish {
                return Err(GreetingError::VerificationMismatch(
                    "this payment code has already been used".to_string(),
                ));
            }
        } else {
            ledger
                .append_payment(
                    &PaymentRecord::new(id, &code, PaymentPurpose::Publish, decision.method)
                        .reviewed_by(&decision.reviewer_id),
                )
                .await?;
        }
        ledger
            .append_audit(
                id,
                Some(code.clone()),
                AuditEvent::new(
                    "manual_review_approved",
                    review_detail(&decision.reviewer_id, decision.note.as_deref()),
                ),
            )
            .await?;

        let updated = self
            .store
            .transition_payment(
                id,
                PaymentState::PendingManualReview,
                PaymentState::Paid,
                Some(code),
            )
            .await?;
        let greeting = match updated {
            Some(greeting) => greeting,
            None => self.load(id).await?,
        };

        info!(greeting_id = %id, reviewer = %decision.reviewer_id, "Manual payment approved");
        Ok(greeting.management_view())
    }

    /// Reviewer could not find the payment; the greeting goes back to unpaid.
    pub async fn reject_manual_review(
        &self,
        id: &str,
        decision: ReviewDecision,
    ) -> Result<ManagementView, GreetingError> {
        let greeting = self.load(id).await?;
        ensure_transition(greeting.payment_state, PaymentState::Unpaid)?;

        let mut ledger = self.ledger.lock().await;
        let updated = self
            .store
            .transition_payment(id, PaymentState::PendingManualReview, PaymentState::Unpaid, None)
            .await?
            .ok_or_else(|| {
                GreetingError::VerificationMismatch(format!(
                    "greeting '{id}' is no longer awaiting review"
                ))
            })?;
        ledger
            .append_audit(
                id,
                greeting.payment_code.clone(),
                AuditEvent::new(
                    "manual_review_rejected",
                    review_detail(&decision.reviewer_id, decision.note.as_deref()),
                ),
            )
            .await?;

        warn!(greeting_id = %id, reviewer = %decision.reviewer_id, "Manual payment rejected");
        Ok(updated.management_view())
    }

    /// Viewer-side "pay to skip": a confirmed code buys the plaintext answer.
    ///
    /// Leaves `payment_state` alone. Idempotent per (greeting, code).
    pub async fn submit_payment_proof(
        &self,
        id: &str,
        code: &str,
        method: PaymentMethod,
    ) -> Result<RevealReceipt, GreetingError> {
        let code = normalize_payment_code(code)?;
        let greeting = self.load(id).await?;
        let Some(challenge) = greeting.challenge else {
            return Ok(RevealReceipt::rejected(
                "This greeting has no secret question to reveal.",
            ));
        };

        let mut ledger = self.ledger.lock().await;
        if let Some(claim) = ledger.code_claim(&code) {
            if claim.greeting_id == id && claim.purpose == PaymentPurpose::Reveal {
                return Ok(RevealReceipt::revealed(challenge.expected_answer));
            }
            warn!(greeting_id = %id, "Reveal code already used elsewhere");
            return Ok(RevealReceipt::rejected(
                "This payment code has already been used.",
            ));
        }

        let proof = PaymentProof {
            greeting_id: id.to_string(),
            code: code.clone(),
            purpose: PaymentPurpose::Reveal,
            method,
        };
        match self.payments.verify(&proof).await? {
            PaymentVerdict::Confirmed => {
                ledger
                    .append_payment(&PaymentRecord::new(
                        id,
                        code,
                        PaymentPurpose::Reveal,
                        method,
                    ))
                    .await?;
                info!(greeting_id = %id, method = method.name(), "Reveal payment confirmed");
                Ok(RevealReceipt::revealed(challenge.expected_answer))
            }
            PaymentVerdict::Unknown => Ok(RevealReceipt::rejected(
                "Payment not found yet. Confirmation can take a few minutes; try again shortly.",
            )),
            PaymentVerdict::Declined(reason) => {
                warn!(greeting_id = %id, reason = %reason, "Reveal payment declined");
                Ok(RevealReceipt::rejected(reason))
            }
        }
    }

    /// Record the recipient's acceptance. At most once; repeats return the first timestamp.
    pub async fn record_response(
        &self,
        id: &str,
        accepted: bool,
    ) -> Result<ResponseReceipt, GreetingError> {
        if !accepted {
            return Err(GreetingError::invalid(
                DraftField::Response,
                "only an acceptance can be recorded",
            ));
        }

        let record = ResponseRecord {
            accepted,
            accepted_at: Utc::now(),
        };
        match self.store.record_response(id, record).await {
            Ok(recorded) => {
                info!(greeting_id = %id, "Greeting accepted");
                Ok(ResponseReceipt {
                    ok: true,
                    accepted_at: recorded.accepted_at,
                    newly_recorded: true,
                })
            }
            Err(GreetingError::AlreadyResolved { accepted_at }) => {
                debug!(greeting_id = %id, "Response already recorded");
                Ok(ResponseReceipt {
                    ok: true,
                    accepted_at,
                    newly_recorded: false,
                })
            }
            Err(err) => Err(err),
        }
    }

    pub async fn management_view(&self, owner_token: &str) -> Result<ManagementView, GreetingError> {
        let greeting = self
            .store
            .find_by_owner_token_hash(&hash_owner_token(owner_token))
            .await?
            .ok_or_else(|| GreetingError::NotFound("no greeting for this owner token".to_string()))?;
        Ok(greeting.management_view())
    }

    pub async fn ledger_entries(&self) -> Result<Vec<LedgerEntry>, GreetingError> {
        let ledger = self.ledger.lock().await;
        Ok(ledger.entries().to_vec())
    }

    pub async fn verify_ledger_chain(&self) -> bool {
        self.ledger.lock().await.verify_chain()
    }

    pub async fn ledger_backend(&self) -> &'static str {
        self.ledger.lock().await.backend_label()
    }

    async fn load(&self, id: &str) -> Result<Greeting, GreetingError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| GreetingError::greeting_not_found(id))
    }

    async fn current_publish_receipt(&self, id: &str) -> Result<ManualPaymentReceipt, GreetingError> {
        let greeting = self.load(id).await?;
        let state = greeting.payment_state;
        let message = match state {
            PaymentState::Paid => "Payment confirmed. Your greeting is live.",
            PaymentState::PendingManualReview => "Payment is awaiting manual review.",
            PaymentState::Unpaid => "Payment state changed concurrently; please resubmit.",
        };
        Ok(publish_receipt(state != PaymentState::Unpaid, state, message))
    }
}

fn publish_receipt(
    accepted: bool,
    payment_state: PaymentState,
    message: impl Into<String>,
) -> ManualPaymentReceipt {
    ManualPaymentReceipt {
        accepted,
        payment_state,
        message: message.into(),
    }
}

fn review_detail(reviewer_id: &str, note: Option<&str>) -> String {
    match note {
        Some(note) if !note.trim().is_empty() => format!("reviewer={reviewer_id}: {note}"),
        _ => format!("reviewer={reviewer_id}"),
    }
}
