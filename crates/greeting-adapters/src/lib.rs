//! Payment ledger and content-source adapters for the greeting core.

#![deny(unsafe_code)]

use async_trait::async_trait;
use greeting_core::error::GreetingError;
use greeting_core::payments::{codes_match, PaymentLedger, PaymentProof, PaymentVerdict};
use greeting_core::sources::{
    MusicCatalog, Poem, PoemCatalog, PoemQuery, Suggestion, SuggestionRequest, SuggestionSource,
    Tone, Track,
};
use greeting_core::types::TemplateKind;
use tracing::debug;

/// Ledger with no automatic confirmation: every code goes to a human reviewer.
#[derive(Debug, Clone, Default)]
pub struct ManualReviewLedger;

#[async_trait]
impl PaymentLedger for ManualReviewLedger {
    fn ledger_id(&self) -> &'static str {
        "manual"
    }

    async fn verify(&self, proof: &PaymentProof) -> Result<PaymentVerdict, GreetingError> {
        debug!(
            greeting_id = %proof.greeting_id,
            purpose = proof.purpose.name(),
            "Payment code deferred to manual review"
        );
        Ok(PaymentVerdict::Unknown)
    }
}

/// Confirms every well-formed code. Local development only.
#[derive(Debug, Clone, Default)]
pub struct AcceptAllLedger;

#[async_trait]
impl PaymentLedger for AcceptAllLedger {
    fn ledger_id(&self) -> &'static str {
        "accept-all"
    }

    async fn verify(&self, _proof: &PaymentProof) -> Result<PaymentVerdict, GreetingError> {
        Ok(PaymentVerdict::Confirmed)
    }
}

/// Confirms codes from a fixed list (e.g. a reconciled statement export).
#[derive(Debug, Clone, Default)]
pub struct ConfirmedCodesLedger {
    codes: Vec<String>,
}

impl ConfirmedCodesLedger {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes
                .into_iter()
                .map(Into::into)
                .map(|code| code.trim().to_string())
                .filter(|code| !code.is_empty())
                .collect(),
        }
    }

    /// Comma-separated list, as passed through the environment.
    pub fn from_csv(value: &str) -> Self {
        Self::new(value.split(','))
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

#[async_trait]
impl PaymentLedger for ConfirmedCodesLedger {
    fn ledger_id(&self) -> &'static str {
        "confirmed-codes"
    }

    async fn verify(&self, proof: &PaymentProof) -> Result<PaymentVerdict, GreetingError> {
        if self.codes.iter().any(|code| codes_match(code, &proof.code)) {
            Ok(PaymentVerdict::Confirmed)
        } else {
            Ok(PaymentVerdict::Unknown)
        }
    }
}

/// Declines every code with a fixed reason. Useful for failure-path testing.
#[derive(Debug, Clone)]
pub struct AlwaysDeclineLedger {
    reason: String,
}

impl AlwaysDeclineLedger {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PaymentLedger for AlwaysDeclineLedger {
    fn ledger_id(&self) -> &'static str {
        "always-decline"
    }

    async fn verify(&self, _proof: &PaymentProof) -> Result<PaymentVerdict, GreetingError> {
        Ok(PaymentVerdict::Declined(self.reason.clone()))
    }
}

/// Deterministic message suggestions built from per-tone templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateSuggestionSource;

impl TemplateSuggestionSource {
    fn templates(tone: Tone) -> &'static [&'static str] {
        match tone {
            Tone::Romantic => &[
                "{to}, every day with you feels like the first page of my favourite story. Love, {from}.",
                "If I could choose again, {to}, I would still choose you. Always, {from}.",
                "{to}, you are the calm in my storm and the light in my morning. Yours, {from}.",
            ],
            Tone::Playful => &[
                "{to}, I like you more than pizza. And that is saying a lot. {from}",
                "Roses are red, my phone is at two percent, {to}, you are my favourite notification. {from}",
                "{to}, are you a parking ticket? Because you have FINE written all over you. {from}",
            ],
            Tone::Deep => &[
                "{to}, loving you has taught me patience, courage and what home really means. {from}",
                "In a world that moves too fast, {to}, you are the moment I want to stay in. {from}",
            ],
            Tone::Funny => &[
                "{to}, you are the reason I check my phone and smile like an idiot in public. {from}",
                "{to}, I would share my fries with you. Only you. Think about that. {from}",
            ],
        }
    }

    fn title(template: TemplateKind, tone: Tone) -> Option<String> {
        match template {
            TemplateKind::Classic => None,
            TemplateKind::LoveLetter => Some("My Dearest".to_string()),
            TemplateKind::Poem => Some(match tone {
                Tone::Romantic | Tone::Deep => "A Verse For You".to_string(),
                Tone::Playful | Tone::Funny => "A Silly Little Poem".to_string(),
            }),
        }
    }
}

#[async_trait]
impl SuggestionSource for TemplateSuggestionSource {
    fn source_id(&self) -> &'static str {
        "templates"
    }

    async fn suggest(
        &self,
        request: &SuggestionRequest,
    ) -> Result<Vec<Suggestion>, GreetingError> {
        let from = request.sender_name.trim();
        let to = request.recipient_name.trim();
        let from = if from.is_empty() { "me" } else { from };
        let to = if to.is_empty() { "you" } else { to };

        Ok(Self::templates(request.tone)
            .iter()
            .map(|template| Suggestion {
                title: Self::title(request.template, request.tone),
                body: template.replace("{to}", to).replace("{from}", from),
            })
            .collect())
    }
}

/// Small fixed song list searched by title or artist.
#[derive(Debug, Clone)]
pub struct FixtureMusicCatalog {
    tracks: Vec<Track>,
}

impl Default for FixtureMusicCatalog {
    fn default() -> Self {
        let track = |title: &str, artist: &str, slug: &str| Track {
            title: title.to_string(),
            artist: artist.to_string(),
            url: format!("https://music.example.com/tracks/{slug}"),
        };
        Self {
            tracks: vec![
                track("Perfect", "Ed Sheeran", "perfect-ed-sheeran"),
                track("All of Me", "John Legend", "all-of-me-john-legend"),
                track("At Last", "Etta James", "at-last-etta-james"),
                track("Malaika", "Miriam Makeba", "malaika-miriam-makeba"),
                track("Can't Help Falling in Love", "Elvis Presley", "cant-help-falling-in-love"),
                track("Thinking Out Loud", "Ed Sheeran", "thinking-out-loud-ed-sheeran"),
            ],
        }
    }
}

#[async_trait]
impl MusicCatalog for FixtureMusicCatalog {
    fn catalog_id(&self) -> &'static str {
        "fixture-music"
    }

    async fn search(&self, query: &str) -> Result<Vec<Track>, GreetingError> {
        let needle = query.trim().to_lowercase();
        Ok(self
            .tracks
            .iter()
            .filter(|track| {
                track.title.to_lowercase().contains(&needle)
                    || track.artist.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }
}

/// Public-domain love poems filtered by author and title.
#[derive(Debug, Clone)]
pub struct FixturePoemCatalog {
    poems: Vec<Poem>,
}

impl Default for FixturePoemCatalog {
    fn default() -> Self {
        let poem = |title: &str, author: &str, lines: &[&str]| Poem {
            title: title.to_string(),
            author: author.to_string(),
            lines: lines.iter().map(|line| line.to_string()).collect(),
        };
        Self {
            poems: vec![
                poem(
                    "Sonnet 18",
                    "William Shakespeare",
                    &[
                        "Shall I compare thee to a summer's day?",
                        "Thou art more lovely and more temperate:",
                        "Rough winds do shake the darling buds of May,",
                        "And summer's lease hath all too short a date;",
                    ],
                ),
                poem(
                    "How Do I Love Thee?",
                    "Elizabeth Barrett Browning",
                    &[
                        "How do I love thee? Let me count the ways.",
                        "I love thee to the depth and breadth and height",
                        "My soul can reach, when feeling out of sight",
                        "For the ends of being and ideal grace.",
                    ],
                ),
                poem(
                    "She Walks in Beauty",
                    "Lord Byron",
                    &[
                        "She walks in beauty, like the night",
                        "Of cloudless climes and starry skies;",
                        "And all that's best of dark and bright",
                        "Meet in her aspect and her eyes;",
                    ],
                ),
                poem(
                    "A Red, Red Rose",
                    "Robert Burns",
                    &[
                        "O my Luve is like a red, red rose",
                        "That's newly sprung in June;",
                        "O my Luve is like the melody",
                        "That's sweetly played in tune.",
                    ],
                ),
            ],
        }
    }
}

#[async_trait]
impl PoemCatalog for FixturePoemCatalog {
    fn catalog_id(&self) -> &'static str {
        "fixture-poems"
    }

    async fn find(&self, query: &PoemQuery) -> Result<Vec<Poem>, GreetingError> {
        let matches = |value: &str, filter: Option<&String>| {
            filter
                .map(|f| f.trim().to_lowercase())
                .filter(|f| !f.is_empty())
                .map(|f| value.to_lowercase().contains(&f))
                .unwrap_or(true)
        };
        Ok(self
            .poems
            .iter()
            .filter(|poem| matches(&poem.author, query.author.as_ref()))
            .filter(|poem| matches(&poem.title, query.title.as_ref()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greeting_core::payments::PaymentPurpose;
    use greeting_core::types::PaymentMethod;

    fn proof(code: &str) -> PaymentProof {
        PaymentProof {
            greeting_id: "abc123def456".to_string(),
            code: code.to_string(),
            purpose: PaymentPurpose::Publish,
            method: PaymentMethod::Mpesa,
        }
    }

    #[tokio::test]
    async fn confirmed_codes_ledger_matches_case_insensitively() {
        let ledger = ConfirmedCodesLedger::from_csv(" QK7ABC12XZ, ,PP-99887766 ");
        assert_eq!(ledger.len(), 2);
        assert_eq!(
            ledger.verify(&proof("qk7abc12xz")).await.unwrap(),
            PaymentVerdict::Confirmed
        );
        assert_eq!(
            ledger.verify(&proof("UNSEEN0001")).await.unwrap(),
            PaymentVerdict::Unknown
        );
    }

    #[tokio::test]
    async fn fixed_ledgers_return_their_verdicts() {
        assert_eq!(
            ManualReviewLedger.verify(&proof("QK7ABC12XZ")).await.unwrap(),
            PaymentVerdict::Unknown
        );
        assert_eq!(
            AcceptAllLedger.verify(&proof("QK7ABC12XZ")).await.unwrap(),
            PaymentVerdict::Confirmed
        );
        assert_eq!(
            AlwaysDeclineLedger::new("chargeback")
                .verify(&proof("QK7ABC12XZ"))
                .await
                .unwrap(),
            PaymentVerdict::Declined("chargeback".to_string())
        );
    }

    #[tokio::test]
    async fn suggestions_use_names_and_template_title() {
        let suggestions = TemplateSuggestionSource
            .suggest(&SuggestionRequest {
                sender_name: "Kevin".to_string(),
                recipient_name: " Aisha ".to_string(),
                tone: Tone::Romantic,
                template: TemplateKind::LoveLetter,
            })
            .await
            .unwrap();

        assert_eq!(suggestions.len(), 3);
        assert!(suggestions
            .iter()
            .all(|s| s.body.contains("Aisha") && s.body.contains("Kevin")));
        assert_eq!(suggestions[0].title.as_deref(), Some("My Dearest"));
    }

    #[tokio::test]
    async fn music_catalog_searches_title_and_artist() {
        let catalog = FixtureMusicCatalog::default();
        let by_artist = catalog.search("sheeran").await.unwrap();
        assert_eq!(by_artist.len(), 2);
        let by_title = catalog.search("MALAIKA").await.unwrap();
        assert_eq!(by_title[0].artist, "Miriam Makeba");
        assert!(by_title[0].url.starts_with("https://"));
    }

    #[tokio::test]
    async fn poem_catalog_filters_by_author_and_title() {
        let catalog = FixturePoemCatalog::default();
        let all = catalog.find(&PoemQuery::default()).await.unwrap();
        assert_eq!(all.len(), 4);

        let byron = catalog
            .find(&PoemQuery {
                author: Some("byron".to_string()),
                title: None,
            })
            .await
            .unwrap();
        assert_eq!(byron.len(), 1);
        assert_eq!(byron[0].title, "She Walks in Beauty");

        let none = catalog
            .find(&PoemQuery {
                author: Some("Byron".to_string()),
                title: Some("Sonnet".to_string()),
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
