//! Non-core content collaborators that fill draft fields.
//!
//! None of these influence the lifecycle; their output is opaque text or a URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::GreetingError;
use crate::types::TemplateKind;

pub const MAX_POEM_RESULTS: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Romantic,
    Playful,
    Deep,
    Funny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionRequest {
    pub sender_name: String,
    pub recipient_name: String,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub template: TemplateKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub title: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub artist: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoemQuery {
    pub author: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poem {
    pub title: String,
    pub author: String,
    pub lines: Vec<String>,
}

/// Message text generator.
#[async_trait]
pub trait SuggestionSource: Send + Sync {
    fn source_id(&self) -> &'static str;
    async fn suggest(&self, request: &SuggestionRequest) -> Result<Vec<Suggestion>, GreetingError>;
}

#[async_trait]
pub trait MusicCatalog: Send + Sync {
    fn catalog_id(&self) -> &'static str;
    async fn search(&self, query: &str) -> Result<Vec<Track>, GreetingError>;
}

/// Returns at most [`MAX_POEM_RESULTS`] poems.
#[async_trait]
pub trait PoemCatalog: Send + Sync {
    fn catalog_id(&self) -> &'static str;
    async fn find(&self, query: &PoemQuery) -> Result<Vec<Poem>, GreetingError>;
}

/// Registry of the collaborators a deployment was wired with.
#[derive(Clone)]
pub struct ContentSources {
    pub suggestions: Arc<dyn SuggestionSource>,
    pub music: Arc<dyn MusicCatalog>,
    pub poems: Arc<dyn PoemCatalog>,
}

impl ContentSources {
    pub fn new(
        suggestions: Arc<dyn SuggestionSource>,
        music: Arc<dyn MusicCatalog>,
        poems: Arc<dyn PoemCatalog>,
    ) -> Self {
        Self {
            suggestions,
            music,
            poems,
        }
    }

    pub async fn suggest(
        &self,
        request: &SuggestionRequest,
    ) -> Result<Vec<Suggestion>, GreetingError> {
        self.suggestions.suggest(request).await
    }

    /// Blank queries return nothing without consulting the catalog.
    pub async fn search_music(&self, query: &str) -> Result<Vec<Track>, GreetingError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.music.search(query).await
    }

    pub async fn find_poems(&self, query: &PoemQuery) -> Result<Vec<Poem>, GreetingError> {
        let mut poems = self.poems.find(query).await?;
        poems.truncate(MAX_POEM_RESULTS);
        Ok(poems)
    }
}

impl std::fmt::Debug for ContentSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentSources")
            .field("suggestions", &self.suggestions.source_id())
            .field("music", &self.music.catalog_id())
            .field("poems", &self.poems.catalog_id())
            .finish()
    }
}
