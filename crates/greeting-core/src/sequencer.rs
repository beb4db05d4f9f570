use crate::draft::{ContentDraft, DraftField};
use crate::error::GreetingError;
use crate::types::NewGreeting;

/// Authoring wizard steps, in the only order they can be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WizardStep {
    Names,
    Experience,
    Customize,
    Extras,
    Security,
    Review,
}

impl WizardStep {
    pub const ALL: [WizardStep; 6] = [
        WizardStep::Names,
        WizardStep::Experience,
        WizardStep::Customize,
        WizardStep::Extras,
        WizardStep::Security,
        WizardStep::Review,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// 1-based position.
    pub fn number(self) -> usize {
        match self {
            Self::Names => 1,
            Self::Experience => 2,
            Self::Customize => 3,
            Self::Extras => 4,
            Self::Security => 5,
            Self::Review => 6,
        }
    }

    pub fn from_number(number: usize) -> Option<Self> {
        number
            .checked_sub(1)
            .and_then(|index| Self::ALL.get(index).copied())
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Names => "Names",
            Self::Experience => "Experience",
            Self::Customize => "Customize",
            Self::Extras => "Extras",
            Self::Security => "Security",
            Self::Review => "Preview & Finish",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Names => "Who is this for?",
            Self::Experience => "Choose your presentation",
            Self::Customize => "Style and message",
            Self::Extras => "Music or photo",
            Self::Security => "Secret question",
            Self::Review => "Double check everything",
        }
    }

    fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    fn previous(self) -> Option<Self> {
        Self::from_number(self.number() - 1)
    }

    /// Fields that must be filled before leaving this step.
    ///
    /// Security is the one draft-dependent list: the answer is required only once a
    /// question has been typed.
    pub fn required_fields(self, draft: &ContentDraft) -> Vec<DraftField> {
        match self {
            Self::Names => vec![DraftField::SenderName, DraftField::RecipientName],
            Self::Experience => vec![DraftField::Template],
            Self::Customize => vec![DraftField::Theme, DraftField::Message],
            Self::Extras => Vec::new(),
            Self::Security if draft.has_challenge_question() => {
                vec![DraftField::ChallengeAnswer]
            }
            Self::Security => Vec::new(),
            Self::Review => vec![
                DraftField::SenderName,
                DraftField::RecipientName,
                DraftField::Message,
            ],
        }
    }

    pub fn missing_fields(self, draft: &ContentDraft) -> Vec<DraftField> {
        self.required_fields(draft)
            .into_iter()
            .filter(|field| !draft.is_filled(*field))
            .collect()
    }
}

/// Linear authoring wizard over a [`ContentDraft`].
///
/// The current step only moves through `advance`/`retreat`; there is no way to jump.
#[derive(Debug, Clone)]
pub struct StepSequencer {
    current: WizardStep,
    draft: ContentDraft,
}

impl Default for StepSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl StepSequencer {
    pub fn new() -> Self {
        Self::with_draft(ContentDraft::default())
    }

    pub fn with_draft(draft: ContentDraft) -> Self {
        Self {
            current: WizardStep::Names,
            draft,
        }
    }

    pub fn current_step(&self) -> WizardStep {
        self.current
    }

    pub fn step_number(&self) -> usize {
        self.current.number()
    }

    pub fn draft(&self) -> &ContentDraft {
        &self.draft
    }

    /// Field-level setters go through here.
    pub fn draft_mut(&mut self) -> &mut ContentDraft {
        &mut self.draft
    }

    pub fn can_advance(&self, step: WizardStep) -> bool {
        step.missing_fields(&self.draft).is_empty()
    }

    pub fn is_last_step(&self) -> bool {
        self.current.next().is_none()
    }

    /// Move forward one step. Returns false, leaving everything untouched, when the
    /// current step is incomplete or already last.
    pub fn advance(&mut self) -> bool {
        if !self.can_advance(self.current) {
            return false;
        }
        match self.current.next() {
            Some(next) => {
                self.current = next;
                true
            }
            None => false,
        }
    }

    pub fn retreat(&mut self) -> bool {
        match self.current.previous() {
            Some(previous) => {
                self.current = previous;
                true
            }
            None => false,
        }
    }

    /// Validate the whole draft from the final step and produce the creation request.
    pub fn finish(&self) -> Result<NewGreeting, GreetingError> {
        if !self.is_last_step() {
            return Err(GreetingError::invalid(
                DraftField::Message,
                format!(
                    "cannot finish from step {} of {}",
                    self.current.number(),
                    WizardStep::COUNT
                ),
            ));
        }
        self.draft.validate()
    }
}
