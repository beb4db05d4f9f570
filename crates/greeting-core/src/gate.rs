//! Access gate: decides what a viewer may see of a greeting.
//!
//! The gate itself is stateless. Unlock grants and owner sessions are supplied by the
//! caller in a [`ViewerContext`]; nothing about a viewer is kept server-side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Greeting, GreetingView};

/// Challenge comparison: trimmed, Unicode lowercase equality.
pub fn answers_match(given: &str, expected: &str) -> bool {
    normalize_answer(given) == normalize_answer(expected)
}

pub fn normalize_answer(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Anything the gate can be evaluated against.
pub trait Gated {
    fn greeting_id(&self) -> &str;
    fn has_challenge(&self) -> bool;
}

impl Gated for Greeting {
    fn greeting_id(&self) -> &str {
        &self.id
    }

    fn has_challenge(&self) -> bool {
        Greeting::has_challenge(self)
    }
}

impl Gated for GreetingView {
    fn greeting_id(&self) -> &str {
        &self.id
    }

    fn has_challenge(&self) -> bool {
        GreetingView::has_challenge(self)
    }
}

/// Proof of ownership held by the author after creating a greeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSession {
    pub greeting_id: String,
    pub owner_token: String,
}

impl OwnerSession {
    pub fn new(greeting_id: impl Into<String>, owner_token: impl Into<String>) -> Self {
        Self {
            greeting_id: greeting_id.into(),
            owner_token: owner_token.into(),
        }
    }

    pub fn owns(&self, greeting_id: &str) -> bool {
        self.greeting_id == greeting_id
    }
}

/// Issued to a viewing session after a matched answer. Lives only as long as the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockGrant {
    pub greeting_id: String,
    pub granted_at: DateTime<Utc>,
}

impl UnlockGrant {
    pub fn new(greeting_id: impl Into<String>) -> Self {
        Self {
            greeting_id: greeting_id.into(),
            granted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ViewerContext<'a> {
    pub owner: Option<&'a OwnerSession>,
    pub unlock: Option<&'a UnlockGrant>,
    /// Owner explicitly asked to see the greeting as the recipient would.
    pub preview: bool,
}

impl<'a> ViewerContext<'a> {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_owner(mut self, owner: &'a OwnerSession, preview: bool) -> Self {
        self.owner = Some(owner);
        self.preview = preview;
        self
    }

    pub fn with_unlock(mut self, unlock: &'a UnlockGrant) -> Self {
        self.unlock = Some(unlock);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Locked,
    Unlocked,
    /// Rendered as unlocked for the owner; never records a response or celebrates.
    OwnerPreview,
}

impl GateOutcome {
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Locked)
    }

    pub fn records_response(self) -> bool {
        matches!(self, Self::Unlocked)
    }

    pub fn celebrates(self) -> bool {
        matches!(self, Self::Unlocked)
    }
}

pub struct AccessGate;

impl AccessGate {
    pub fn evaluate<G: Gated + ?Sized>(greeting: &G, context: ViewerContext<'_>) -> GateOutcome {
        let id = greeting.greeting_id();
        // Owner previews win over every unlock path, challenge or not.
        if context.preview && context.owner.map(|owner| owner.owns(id)).unwrap_or(false) {
            return GateOutcome::OwnerPreview;
        }
        if !greeting.has_challenge() {
            return GateOutcome::Unlocked;
        }
        if context
            .unlock
            .map(|grant| grant.greeting_id == id)
            .unwrap_or(false)
        {
            return GateOutcome::Unlocked;
        }
        GateOutcome::Locked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Challenge, GreetingContent, PaymentState, TemplateKind, Theme};
    use proptest::prelude::*;

    fn greeting(id: &str, challenge: Option<Challenge>) -> Greeting {
        Greeting {
            id: id.to_string(),
            owner_token_hash: "hash".to_string(),
            content: GreetingContent {
                sender_name: "Kevin".to_string(),
                sender_location: None,
                recipient_name: "Aisha".to_string(),
                message: "Be mine".to_string(),
                title: None,
                theme: Theme::Classic,
                template: TemplateKind::Classic,
                music_link: None,
                image_url: None,
            },
            challenge,
            payment_state: PaymentState::Unpaid,
            payment_code: None,
            view_count: 0,
            response: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn challenged_greeting_is_locked_for_strangers() {
        let g = greeting("g1", Some(Challenge::new("City?", "Nairobi")));
        assert_eq!(
            AccessGate::evaluate(&g, ViewerContext::anonymous()),
            GateOutcome::Locked
        );
    }

    #[test]
    fn unlock_grant_must_match_greeting() {
        let g = greeting("g1", Some(Challenge::new("City?", "Nairobi")));
        let other = UnlockGrant::new("g2");
        let own = UnlockGrant::new("g1");

        assert_eq!(
            AccessGate::evaluate(&g, ViewerContext::anonymous().with_unlock(&other)),
            GateOutcome::Locked
        );
        assert_eq!(
            AccessGate::evaluate(&g, ViewerContext::anonymous().with_unlock(&own)),
            GateOutcome::Unlocked
        );
    }

    #[test]
    fn owner_preview_requires_explicit_request() {
        let g = greeting("g1", Some(Challenge::new("City?", "Nairobi")));
        let owner = OwnerSession::new("g1", "token");

        let outcome = AccessGate::evaluate(&g, ViewerContext::anonymous().with_owner(&owner, true));
        assert_eq!(outcome, GateOutcome::OwnerPreview);
        assert!(outcome.is_open());
        assert!(!outcome.records_response());
        assert!(!outcome.celebrates());

        assert_eq!(
            AccessGate::evaluate(&g, ViewerContext::anonymous().with_owner(&owner, false)),
            GateOutcome::Locked
        );

        let stranger = OwnerSession::new("g9", "token");
        assert_eq!(
            AccessGate::evaluate(&g, ViewerContext::anonymous().with_owner(&stranger, true)),
            GateOutcome::Locked
        );
    }

    #[test]
    fn owner_preview_of_open_greeting_stays_a_preview() {
        let g = greeting("g1", None);
        let owner = OwnerSession::new("g1", "token");
        let grant = UnlockGrant::new("g1");

        let outcome = AccessGate::evaluate(&g, ViewerContext::anonymous().with_owner(&owner, true));
        assert_eq!(outcome, GateOutcome::OwnerPreview);
        assert!(outcome.is_open());
        assert!(!outcome.records_response());

        let unlocked = ViewerContext::anonymous()
            .with_owner(&owner, true)
            .with_unlock(&grant);
        assert_eq!(AccessGate::evaluate(&g, unlocked), GateOutcome::OwnerPreview);

        assert_eq!(
            AccessGate::evaluate(&g, ViewerContext::anonymous().with_owner(&owner, false)),
            GateOutcome::Unlocked
        );
    }

    #[test]
    fn answer_matching_ignores_case_and_outer_whitespace() {
        assert!(answers_match("nairobi ", "Nairobi"));
        assert!(answers_match("  NAIROBI", " nairobi\t"));
        assert!(!answers_match("Mombasa", "Nairobi"));
        assert!(!answers_match("nai robi", "nairobi"));
        assert!(answers_match("ÉCOLE", "école"));
    }

    proptest! {
        #[test]
        fn property_challenge_free_greetings_are_always_open(
            id in "[a-f0-9]{12}",
            preview in any::<bool>(),
            owned in any::<bool>(),
        ) {
            let g = greeting(&id, None);
            let owner = OwnerSession::new(if owned { id.clone() } else { "other".to_string() }, "t");
            let context = ViewerContext::anonymous().with_owner(&owner, preview);
            let outcome = AccessGate::evaluate(&g, context);
            prop_assert!(outcome.is_open());
            let expected = if preview && owned { GateOutcome::OwnerPreview } else { GateOutcome::Unlocked };
            prop_assert_eq!(outcome, expected);
        }

        #[test]
        fn property_answers_match_under_case_and_padding(
            answer in "[a-zA-Z0-9]{1,16}",
            left in "[ \t]{0,3}",
            right in "[ \t]{0,3}",
            upper in any::<bool>(),
        ) {
            let cased = if upper { answer.to_uppercase() } else { answer.to_lowercase() };
            let submitted = format!("{left}{cased}{right}");
            prop_assert!(answers_match(&submitted, &answer));
        }

        #[test]
        fn property_matching_agrees_with_normalized_equality(
            given in "[ a-cA-C]{0,6}",
            expected in "[ a-cA-C]{0,6}",
        ) {
            prop_assert_eq!(
                answers_match(&given, &expected),
                given.trim().to_lowercase() == expected.trim().to_lowercase()
            );
        }
    }
}
