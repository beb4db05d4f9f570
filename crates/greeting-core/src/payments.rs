use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::draft::DraftField;
use crate::error::GreetingError;
use crate::types::{PaymentMethod, PaymentState};

pub const MIN_PAYMENT_CODE_CHARS: usize = 8;
pub const MAX_PAYMENT_CODE_CHARS: usize = 1000;

/// What a payment code is being spent on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPurpose {
    /// Creator publishing the greeting.
    Publish,
    /// Viewer buying the secret answer.
    Reveal,
}

impl PaymentPurpose {
    pub fn name(self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Reveal => "reveal",
        }
    }
}

/// Code submitted by a human, plus the context it is claimed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    pub greeting_id: String,
    pub code: String,
    pub purpose: PaymentPurpose,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum PaymentVerdict {
    Confirmed,
    /// The ledger has no record yet; a human has to look at it.
    Unknown,
    Declined(String),
}

/// External payment ledger consulted for every submitted code.
///
/// Verification is a lookup, not cryptography: adapters answer whether a reference code
/// is known to have settled.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    fn ledger_id(&self) -> &'static str;

    async fn verify(&self, proof: &PaymentProof) -> Result<PaymentVerdict, GreetingError>;
}

/// Trim and length-check a transaction code. Shared by client and server.
pub fn normalize_payment_code(code: &str) -> Result<String, GreetingError> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return Err(GreetingError::invalid(
            DraftField::PaymentCode,
            "payment code is required",
        ));
    }
    let length = trimmed.chars().count();
    if length < MIN_PAYMENT_CODE_CHARS {
        return Err(GreetingError::invalid(
            DraftField::PaymentCode,
            format!("payment code must be at least {MIN_PAYMENT_CODE_CHARS} characters"),
        ));
    }
    if length > MAX_PAYMENT_CODE_CHARS {
        return Err(GreetingError::invalid(
            DraftField::PaymentCode,
            format!("payment code must be at most {MAX_PAYMENT_CODE_CHARS} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

pub fn codes_match(left: &str, right: &str) -> bool {
    left.trim().eq_ignore_ascii_case(right.trim())
}

/// Allowed publish-state moves.
///
/// `Paid` is terminal; a pending submission may be replaced by a newer code.
pub fn can_transition(from: PaymentState, to: PaymentState) -> bool {
    use PaymentState::*;
    matches!(
        (from, to),
        (Unpaid, PendingManualReview)
            | (Unpaid, Paid)
            | (PendingManualReview, PendingManualReview)
            | (PendingManualReview, Paid)
            | (PendingManualReview, Unpaid)
    )
}

pub fn ensure_transition(from: PaymentState, to: PaymentState) -> Result<(), GreetingError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(GreetingError::VerificationMismatch(format!(
            "payment cannot move from '{}' to '{}'",
            from.name(),
            to.name()
        )))
    }
}
