//! Greeting lifecycle core.
//!
//! A greeting is authored through a fixed sequence of steps, persisted once with a public
//! id and a private owner token, shown to viewers through an access gate, unlocked by a
//! secret answer or a paid reveal, and finally accepted by its recipient.

#![deny(unsafe_code)]

pub mod api;
pub mod draft;
pub mod engine;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod payments;
pub mod pricing;
pub mod sequencer;
pub mod sources;
pub mod storage;
pub mod tokens;
pub mod types;

pub use api::GreetingApi;
pub use draft::{ContentDraft, DraftField};
pub use engine::{GreetingEngine, GreetingEngineConfig, ReviewDecision};
pub use error::{FieldError, GreetingError};
pub use gate::{answers_match, AccessGate, GateOutcome, Gated, OwnerSession, UnlockGrant, ViewerContext};
pub use ledger::{AppendOnlyLedger, AuditEvent, LedgerEntry, LedgerEntryKind, PaymentRecord};
pub use payments::{
    normalize_payment_code, PaymentLedger, PaymentProof, PaymentPurpose, PaymentVerdict,
};
pub use pricing::{publish_quote, reveal_quote, Currency, Price, PriceQuote};
pub use sequencer::{StepSequencer, WizardStep};
pub use sources::{
    ContentSources, MusicCatalog, Poem, PoemCatalog, PoemQuery, Suggestion, SuggestionRequest,
    SuggestionSource, Tone, Track,
};
pub use storage::{
    bootstrap_storage, GreetingStore, MemoryGreetingStore, PersistentLedger,
    PostgresGreetingStore, Storage, StoreConfig,
};
pub use types::{
    Challenge, CreatedGreeting, Greeting, GreetingContent, GreetingView, ManagementView,
    ManualPaymentReceipt, NewGreeting, PaymentMethod, PaymentState, ResponseReceipt,
    ResponseRecord, RevealReceipt, RevealedContent, TemplateKind, Theme, UnlockReceipt,
};
