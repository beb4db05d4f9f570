use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FieldError, GreetingError};
use crate::sources::{Poem, Suggestion, Track};
use crate::types::{Challenge, GreetingContent, NewGreeting, TemplateKind, Theme};

pub const MIN_NAME_CHARS: usize = 2;
pub const MAX_LOCATION_CHARS: usize = 100;
pub const MAX_MESSAGE_CHARS: usize = 2000;
pub const MAX_TITLE_CHARS: usize = 120;
pub const MAX_CHALLENGE_CHARS: usize = 255;

/// Addressable input fields, used by step requirements and validation errors.
///
/// The last three are not part of a draft; they name viewer and payment inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftField {
    SenderName,
    SenderLocation,
    RecipientName,
    Template,
    Theme,
    Message,
    Title,
    MusicLink,
    ImageUrl,
    ChallengeQuestion,
    ChallengeAnswer,
    /// Viewer's answer to the secret question.
    Answer,
    PaymentCode,
    Response,
}

impl DraftField {
    pub fn name(self) -> &'static str {
        match self {
            Self::SenderName => "sender_name",
            Self::SenderLocation => "sender_location",
            Self::RecipientName => "recipient_name",
            Self::Template => "template",
            Self::Theme => "theme",
            Self::Message => "message",
            Self::Title => "title",
            Self::MusicLink => "music_link",
            Self::ImageUrl => "image_url",
            Self::ChallengeQuestion => "challenge_question",
            Self::ChallengeAnswer => "challenge_answer",
            Self::Answer => "answer",
            Self::PaymentCode => "payment_code",
            Self::Response => "response",
        }
    }
}

/// In-progress greeting held by the author until the single submit.
///
/// Text fields stay as raw form input; blanks mean "not provided".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentDraft {
    pub sender_name: String,
    pub sender_location: String,
    pub recipient_name: String,
    pub message: String,
    pub title: String,
    pub theme: Theme,
    pub template: TemplateKind,
    pub music_link: String,
    pub image_url: String,
    pub challenge_question: String,
    pub challenge_answer: String,
}

impl ContentDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names(
        mut self,
        sender_name: impl Into<String>,
        recipient_name: impl Into<String>,
    ) -> Self {
        self.sender_name = sender_name.into();
        self.recipient_name = recipient_name.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_challenge(
        mut self,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        self.challenge_question = question.into();
        self.challenge_answer = answer.into();
        self
    }

    /// True when the field holds something other than whitespace.
    ///
    /// Enum-valued fields always have a value.
    pub fn is_filled(&self, field: DraftField) -> bool {
        match field {
            DraftField::Template | DraftField::Theme => true,
            other => self
                .text(other)
                .map(|value| !value.trim().is_empty())
                .unwrap_or(false),
        }
    }

    fn text(&self, field: DraftField) -> Option<&str> {
        let value = match field {
            DraftField::SenderName => &self.sender_name,
            DraftField::SenderLocation => &self.sender_location,
            DraftField::RecipientName => &self.recipient_name,
            DraftField::Message => &self.message,
            DraftField::Title => &self.title,
            DraftField::MusicLink => &self.music_link,
            DraftField::ImageUrl => &self.image_url,
            DraftField::ChallengeQuestion => &self.challenge_question,
            DraftField::ChallengeAnswer => &self.challenge_answer,
            DraftField::Template
            | DraftField::Theme
            | DraftField::Answer
            | DraftField::PaymentCode
            | DraftField::Response => return None,
        };
        Some(value.as_str())
    }

    pub fn has_challenge_question(&self) -> bool {
        self.is_filled(DraftField::ChallengeQuestion)
    }

    /// Use a generated suggestion as the message body.
    pub fn apply_suggestion(&mut self, suggestion: &Suggestion) {
        if let Some(title) = suggestion.title.as_deref() {
            self.title = title.to_string();
        }
        self.message = suggestion.body.clone();
    }

    pub fn apply_track(&mut self, track: &Track) {
        self.music_link = track.url.clone();
    }

    /// Use a catalog poem as title and message, one line per row.
    pub fn apply_poem(&mut self, poem: &Poem) {
        self.title = format!("{} by {}", poem.title, poem.author);
        self.message = poem.lines.join("\n");
    }

    /// Full submit-time validation. Collects every failing field.
    pub fn validate(&self) -> Result<NewGreeting, GreetingError> {
        let mut errors = Vec::new();

        let sender_name = self.sender_name.trim();
        if sender_name.chars().count() < MIN_NAME_CHARS {
            errors.push(FieldError::new(
                DraftField::SenderName,
                format!("must be at least {MIN_NAME_CHARS} characters"),
            ));
        }

        let recipient_name = self.recipient_name.trim();
        if recipient_name.chars().count() < MIN_NAME_CHARS {
            errors.push(FieldError::new(
                DraftField::RecipientName,
                format!("must be at least {MIN_NAME_CHARS} characters"),
            ));
        }

        let sender_location = non_blank(&self.sender_location);
        check_max(
            &mut errors,
            DraftField::SenderLocation,
            sender_location,
            MAX_LOCATION_CHARS,
        );

        let message = self.message.trim();
        if message.is_empty() {
            errors.push(FieldError::new(DraftField::Message, "message is required"));
        } else if message.chars().count() > MAX_MESSAGE_CHARS {
            errors.push(FieldError::new(
                DraftField::Message,
                format!("must be at most {MAX_MESSAGE_CHARS} characters"),
            ));
        }

        let title = non_blank(&self.title);
        check_max(&mut errors, DraftField::Title, title, MAX_TITLE_CHARS);

        let music_link = non_blank(&self.music_link);
        check_url(&mut errors, DraftField::MusicLink, music_link);
        let image_url = non_blank(&self.image_url);
        check_url(&mut errors, DraftField::ImageUrl, image_url);

        let question = non_blank(&self.challenge_question);
        let answer = non_blank(&self.challenge_answer);
        check_max(
            &mut errors,
            DraftField::ChallengeQuestion,
            question,
            MAX_CHALLENGE_CHARS,
        );
        check_max(
            &mut errors,
            DraftField::ChallengeAnswer,
            answer,
            MAX_CHALLENGE_CHARS,
        );
        if question.is_some() && answer.is_none() {
            errors.push(FieldError::new(
                DraftField::ChallengeAnswer,
                "an answer is required when a secret question is set",
            ));
        }

        if !errors.is_empty() {
            return Err(GreetingError::Validation(errors));
        }

        // An answer without a question carries no challenge.
        let challenge = match (question, answer) {
            (Some(question), Some(answer)) => Some(Challenge::new(question, answer)),
            _ => None,
        };

        Ok(NewGreeting {
            content: GreetingContent {
                sender_name: sender_name.to_string(),
                sender_location: sender_location.map(str::to_string),
                recipient_name: recipient_name.to_string(),
                message: message.to_string(),
                title: title.map(str::to_string),
                theme: self.theme,
                template: self.template,
                music_link: music_link.map(str::to_string),
                image_url: image_url.map(str::to_string),
            },
            challenge,
        })
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn check_max(errors: &mut Vec<FieldError>, field: DraftField, value: Option<&str>, max: usize) {
    if value.map(|v| v.chars().count() > max).unwrap_or(false) {
        errors.push(FieldError::new(
            field,
            format!("must be at most {max} characters"),
        ));
    }
}

fn check_url(errors: &mut Vec<FieldError>, field: DraftField, value: Option<&str>) {
    let Some(value) = value else {
        return;
    };
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(_) => errors.push(FieldError::new(field, "must be an http(s) URL")),
        Err(_) => errors.push(FieldError::new(field, "must be a valid URL")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_draft() -> ContentDraft {
        ContentDraft::new()
            .with_names("  Kevin ", "Aisha")
            .with_message("Happy Valentine's!")
    }

    #[test]
    fn validate_trims_and_builds_content() {
        let greeting = complete_draft().validate().unwrap();
        assert_eq!(greeting.content.sender_name, "Kevin");
        assert_eq!(greeting.content.recipient_name, "Aisha");
        assert!(greeting.challenge.is_none());
        assert!(greeting.content.sender_location.is_none());
    }

    #[test]
    fn validate_collects_all_field_errors() {
        let draft = ContentDraft {
            sender_name: "K".to_string(),
            recipient_name: " ".to_string(),
            message: "x".repeat(MAX_MESSAGE_CHARS + 1),
            music_link: "not a url".to_string(),
            image_url: "ftp://example.com/a.png".to_string(),
            ..ContentDraft::default()
        };

        let err = draft.validate().unwrap_err();
        let fields: Vec<DraftField> = err.field_errors().iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                DraftField::SenderName,
                DraftField::RecipientName,
                DraftField::Message,
                DraftField::MusicLink,
                DraftField::ImageUrl,
            ]
        );
    }

    #[test]
    fn question_requires_answer() {
        let draft = complete_draft().with_challenge("City?", "   ");
        let err = draft.validate().unwrap_err();
        assert_eq!(err.field_errors()[0].field, DraftField::ChallengeAnswer);
    }

    #[test]
    fn answer_without_question_is_dropped() {
        let greeting = complete_draft()
            .with_challenge("", "Nairobi")
            .validate()
            .unwrap();
        assert!(greeting.challenge.is_none());
    }

    #[test]
    fn challenge_is_trimmed() {
        let greeting = complete_draft()
            .with_challenge(" City? ", " Nairobi ")
            .validate()
            .unwrap();
        assert_eq!(greeting.challenge, Some(Challenge::new("City?", "Nairobi")));
    }

    #[test]
    fn poem_fills_title_and_message() {
        let mut draft = complete_draft();
        draft.apply_poem(&Poem {
            title: "Sonnet 18".to_string(),
            author: "William Shakespeare".to_string(),
            lines: vec![
                "Shall I compare thee to a summer's day?".to_string(),
                "Thou art more lovely and more temperate:".to_string(),
            ],
        });
        assert_eq!(draft.title, "Sonnet 18 by William Shakespeare");
        assert_eq!(draft.message.lines().count(), 2);
    }
}
