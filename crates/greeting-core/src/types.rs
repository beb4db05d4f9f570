use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gate::answers_match;
use crate::pricing::{publish_quote, PriceQuote};

/// Visual theme chosen during authoring. Closed set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Classic,
    Midnight,
    Golden,
}

impl Theme {
    pub const ALL: [Theme; 3] = [Theme::Classic, Theme::Midnight, Theme::Golden];

    pub fn name(self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Midnight => "midnight",
            Self::Golden => "golden",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|theme| theme.name().eq_ignore_ascii_case(value.trim()))
    }
}

/// Presentation template. `LoveLetter` and `Poem` are premium experiences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    #[default]
    Classic,
    LoveLetter,
    Poem,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 3] = [
        TemplateKind::Classic,
        TemplateKind::LoveLetter,
        TemplateKind::Poem,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::LoveLetter => "love_letter",
            Self::Poem => "poem",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(value.trim()))
    }

    pub fn is_premium(self) -> bool {
        !matches!(self, Self::Classic)
    }
}

/// Creation-side publish state. Never consulted for recipient visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Unpaid,
    PendingManualReview,
    Paid,
}

impl PaymentState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::PendingManualReview => "pending_manual_review",
            Self::Paid => "paid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unpaid" => Some(Self::Unpaid),
            "pending_manual_review" => Some(Self::PendingManualReview),
            "paid" => Some(Self::Paid),
            _ => None,
        }
    }

    pub fn is_published(self) -> bool {
        matches!(self, Self::Paid)
    }
}

/// How the sender settled a manual payment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Mpesa,
    Paypal,
}

impl PaymentMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::Mpesa => "mpesa",
            Self::Paypal => "paypal",
        }
    }
}

/// Secret question guarding a greeting's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub question: String,
    pub expected_answer: String,
}

impl Challenge {
    pub fn new(question: impl Into<String>, expected_answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            expected_answer: expected_answer.into(),
        }
    }

    pub fn accepts(&self, answer: &str) -> bool {
        answers_match(answer, &self.expected_answer)
    }
}

/// Authored content fields of a greeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetingContent {
    pub sender_name: String,
    pub sender_location: Option<String>,
    pub recipient_name: String,
    pub message: String,
    pub title: Option<String>,
    pub theme: Theme,
    pub template: TemplateKind,
    pub music_link: Option<String>,
    pub image_url: Option<String>,
}

/// Recipient's recorded answer. Set at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub accepted: bool,
    pub accepted_at: DateTime<Utc>,
}

/// Validated creation request produced from a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGreeting {
    pub content: GreetingContent,
    pub challenge: Option<Challenge>,
}

/// Persisted greeting record.
///
/// Only `payment_state`, `payment_code`, `view_count` and `response` change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    pub id: String,
    pub owner_token_hash: String,
    pub content: GreetingContent,
    pub challenge: Option<Challenge>,
    pub payment_state: PaymentState,
    /// Code under manual review, or the code that settled the publish payment.
    pub payment_code: Option<String>,
    pub view_count: u64,
    pub response: Option<ResponseRecord>,
    pub created_at: DateTime<Utc>,
}

impl Greeting {
    pub fn has_challenge(&self) -> bool {
        self.challenge.is_some()
    }

    pub fn share_path(&self) -> String {
        share_path(&self.id)
    }

    /// Public projection. The expected answer and owner token never leave through here.
    pub fn public_view(&self, revealed: bool, preview: bool) -> GreetingView {
        let is_locked = self.has_challenge() && !revealed;
        let content = if is_locked {
            None
        } else {
            Some(RevealedContent {
                title: self.content.title.clone(),
                message: self.content.message.clone(),
                sender_location: self.content.sender_location.clone(),
                music_link: self.content.music_link.clone(),
                image_url: self.content.image_url.clone(),
            })
        };

        GreetingView {
            id: self.id.clone(),
            sender_name: self.content.sender_name.clone(),
            recipient_name: self.content.recipient_name.clone(),
            theme: self.content.theme,
            template: self.content.template,
            is_locked,
            question: self
                .challenge
                .as_ref()
                .map(|challenge| challenge.question.clone()),
            content,
            preview,
            payment_state: self.payment_state,
            view_count: self.view_count,
            response: self.response,
        }
    }

    pub fn management_view(&self) -> ManagementView {
        ManagementView {
            id: self.id.clone(),
            share_path: self.share_path(),
            sender_name: self.content.sender_name.clone(),
            recipient_name: self.content.recipient_name.clone(),
            template: self.content.template,
            has_challenge: self.has_challenge(),
            view_count: self.view_count,
            response: self.response,
            is_accepted: self.response.map(|r| r.accepted).unwrap_or(false),
            payment_state: self.payment_state,
            published: self.payment_state.is_published(),
            price: publish_quote(self.content.template),
            created_at: self.created_at,
        }
    }
}

pub fn share_path(id: &str) -> String {
    format!("/d/{id}")
}

/// Content withheld from locked views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedContent {
    pub title: Option<String>,
    pub message: String,
    pub sender_location: Option<String>,
    pub music_link: Option<String>,
    pub image_url: Option<String>,
}

/// What a viewer receives when fetching a greeting by its public id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetingView {
    pub id: String,
    pub sender_name: String,
    pub recipient_name: String,
    pub theme: Theme,
    pub template: TemplateKind,
    pub is_locked: bool,
    pub question: Option<String>,
    pub content: Option<RevealedContent>,
    /// Owner preview: rendered unlocked, but never records a response.
    pub preview: bool,
    pub payment_state: PaymentState,
    pub view_count: u64,
    pub response: Option<ResponseRecord>,
}

impl GreetingView {
    pub fn has_challenge(&self) -> bool {
        self.question.is_some()
    }

    pub fn is_accepted(&self) -> bool {
        self.response.map(|r| r.accepted).unwrap_or(false)
    }
}

/// Owner dashboard data, reachable only with the owner token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementView {
    pub id: String,
    pub share_path: String,
    pub sender_name: String,
    pub recipient_name: String,
    pub template: TemplateKind,
    pub has_challenge: bool,
    pub view_count: u64,
    pub response: Option<ResponseRecord>,
    pub is_accepted: bool,
    pub payment_state: PaymentState,
    /// "published" vs "awaiting payment" on the dashboard.
    pub published: bool,
    pub price: PriceQuote,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedGreeting {
    pub id: String,
    pub owner_token: String,
    pub share_path: String,
    pub price: PriceQuote,
}

/// Challenge-answer verification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockReceipt {
    pub matched: bool,
    pub revealed: Option<GreetingView>,
}

impl UnlockReceipt {
    pub fn matched(revealed: GreetingView) -> Self {
        Self {
            matched: true,
            revealed: Some(revealed),
        }
    }

    pub fn not_matched() -> Self {
        Self {
            matched: false,
            revealed: None,
        }
    }
}

/// Creator-side manual payment result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualPaymentReceipt {
    pub accepted: bool,
    pub payment_state: PaymentState,
    pub message: String,
}

/// Viewer-side "pay to reveal" result. `answer` is set only when accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealReceipt {
    pub accepted: bool,
    pub answer: Option<String>,
    pub message: String,
}

impl RevealReceipt {
    pub fn revealed(answer: impl Into<String>) -> Self {
        Self {
            accepted: true,
            answer: Some(answer.into()),
            message: "Payment confirmed. Here is the answer.".to_string(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            answer: None,
            message: message.into(),
        }
    }
}

/// Response tracker acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseReceipt {
    pub ok: bool,
    pub accepted_at: DateTime<Utc>,
    /// False when an earlier response was already on record.
    pub newly_recorded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greeting(challenge: Option<Challenge>) -> Greeting {
        Greeting {
            id: "abc123def456".to_string(),
            owner_token_hash: "hash".to_string(),
            content: GreetingContent {
                sender_name: "Kevin".to_string(),
                sender_location: Some("Westlands".to_string()),
                recipient_name: "Aisha".to_string(),
                message: "Will you be mine?".to_string(),
                title: None,
                theme: Theme::Golden,
                template: TemplateKind::LoveLetter,
                music_link: None,
                image_url: None,
            },
            challenge,
            payment_state: PaymentState::Unpaid,
            payment_code: None,
            view_count: 3,
            response: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn locked_view_withholds_content_and_answer() {
        let greeting = greeting(Some(Challenge::new("City?", "Nairobi")));
        let view = greeting.public_view(false, false);

        assert!(view.is_locked);
        assert!(view.content.is_none());
        assert_eq!(view.question.as_deref(), Some("City?"));

        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("Nairobi\""), "answer must not leak: {json}");
        assert!(!json.contains("Will you be mine?"));
    }

    #[test]
    fn challenge_free_view_is_open() {
        let view = greeting(None).public_view(false, false);
        assert!(!view.is_locked);
        assert_eq!(
            view.content.map(|content| content.message),
            Some("Will you be mine?".to_string())
        );
    }

    #[test]
    fn management_view_reports_publish_state() {
        let mut greeting = greeting(None);
        assert!(!greeting.management_view().published);

        greeting.payment_state = PaymentState::Paid;
        let view = greeting.management_view();
        assert!(view.published);
        assert_eq!(view.share_path, "/d/abc123def456");
        assert_eq!(view.price.mpesa.amount, 350);
    }

    #[test]
    fn enums_parse_their_wire_names() {
        assert_eq!(Theme::parse("Midnight"), Some(Theme::Midnight));
        assert_eq!(TemplateKind::parse("love_letter"), Some(TemplateKind::LoveLetter));
        assert_eq!(
            PaymentState::parse("pending_manual_review"),
            Some(PaymentState::PendingManualReview)
        );
        assert_eq!(Theme::parse("neon"), None);
        assert!(TemplateKind::Poem.is_premium());
        assert!(!TemplateKind::Classic.is_premium());
    }
}
