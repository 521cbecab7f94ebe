//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - The persistent store (could swap in-memory -> Core-Data-backed bridge)
//! - Text generation (could swap Ollama -> hosted API)
//! - Image generation (two impls: on-device and remote)
//! - Clock and app lifecycle (for testing)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use recall_domain::{Card, CardId, CardKind, Deck, DeckId, DeletedSuggestionRecord, ImageBlob};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TextGenError {
    #[error("Missing credential")]
    MissingCredential,
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ImageGenError {
    #[error("Missing credential")]
    MissingCredential,
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Scheduler-level failure taxonomy. Every provider or store failure a
/// task can hit maps into exactly one of these.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// No credential for a provider that needs one. Detected before any
    /// network call; dropped without consuming a retry ordinal.
    #[error("Missing credential")]
    MissingCredential,
    /// Provider cannot be used right now (app backgrounded, capability
    /// absent). Also fail-fast: cheap to retry after a wake.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("Rate limited or API error {code}: {message}")]
    RateLimitedOrApi { code: u16, message: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    /// Target entity deleted mid-flight. Always a silent no-op.
    #[error("Target vanished")]
    TargetVanished,
    #[error("Transient network error: {0}")]
    TransientNetwork(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GenerationError {
    /// Fail-fast errors are dropped from the current attempt without
    /// consuming a retry ordinal; conditions may change via `wake()`.
    pub fn is_fail_fast(&self) -> bool {
        matches!(self, Self::MissingCredential | Self::ProviderUnavailable(_))
    }
}

impl From<ImageGenError> for GenerationError {
    fn from(err: ImageGenError) -> Self {
        match err {
            ImageGenError::MissingCredential => Self::MissingCredential,
            ImageGenError::Unavailable(reason) => Self::ProviderUnavailable(reason),
            ImageGenError::Api { code, message } => Self::RateLimitedOrApi { code, message },
            ImageGenError::Network(msg) => Self::TransientNetwork(msg),
            ImageGenError::InvalidResponse(msg) => Self::MalformedResponse(msg),
        }
    }
}

impl From<TextGenError> for GenerationError {
    fn from(err: TextGenError) -> Self {
        match err {
            TextGenError::MissingCredential => Self::MissingCredential,
            TextGenError::Api { code, message } => Self::RateLimitedOrApi { code, message },
            TextGenError::Network(msg) => Self::TransientNetwork(msg),
            TextGenError::MalformedResponse(msg) => Self::MalformedResponse(msg),
        }
    }
}

// =============================================================================
// Store Port
// =============================================================================

/// The persistent store collaborator.
///
/// `resolve_card`/`get_deck` returning `None` uniformly means "vanished,
/// treat as no-op". Background writes are merged into the UI-facing
/// context via `refresh()`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeckStore: Send + Sync {
    async fn fetch_all_decks(&self) -> Result<Vec<Deck>, StoreError>;
    async fn get_deck(&self, id: DeckId) -> Result<Option<Deck>, StoreError>;
    async fn save_deck(&self, deck: &Deck) -> Result<(), StoreError>;

    async fn resolve_card(&self, id: CardId) -> Result<Option<Card>, StoreError>;
    async fn cards_in_deck(&self, deck_id: DeckId) -> Result<Vec<Card>, StoreError>;
    async fn save_card(&self, card: &Card) -> Result<(), StoreError>;
    async fn delete_card(&self, id: CardId) -> Result<(), StoreError>;

    async fn deleted_suggestions(
        &self,
        deck_id: DeckId,
    ) -> Result<Vec<DeletedSuggestionRecord>, StoreError>;
    async fn append_deleted_suggestion(
        &self,
        record: &DeletedSuggestionRecord,
    ) -> Result<(), StoreError>;

    /// Merge background-context writes into the UI-facing context.
    async fn refresh(&self) -> Result<(), StoreError>;
}

// =============================================================================
// Text Generation Port
// =============================================================================

/// Context handed to the text provider so it can avoid suggesting content
/// the deck already has (or the user already rejected).
#[derive(Debug, Clone, Default)]
pub struct SuggestionContext {
    pub deck_name: String,
    pub deck_description: String,
    /// Front+kind pairs of active cards in the deck
    pub existing: Vec<(String, CardKind)>,
    /// Front+kind pairs of pending/visible suggestions
    pub suggested: Vec<(String, CardKind)>,
    /// Front+kind pairs from the deleted-suggestion ledger
    pub deleted: Vec<(String, CardKind)>,
}

/// One candidate card drafted by the text provider.
#[derive(Debug, Clone)]
pub struct SuggestionDraft {
    pub front_text: String,
    pub kind: CardKind,
    pub back: recall_domain::CardBack,
    pub image_prompt: Option<String>,
}

/// Generated back content for a known front.
#[derive(Debug, Clone)]
pub struct BackContent {
    pub back: recall_domain::CardBack,
    pub image_prompt: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenPort: Send + Sync {
    fn has_valid_credential(&self) -> bool;

    async fn generate_suggestions(
        &self,
        context: &SuggestionContext,
        count: u32,
    ) -> Result<Vec<SuggestionDraft>, TextGenError>;

    async fn generate_back_content(
        &self,
        front_text: &str,
        deck_context: &str,
        kind: CardKind,
    ) -> Result<BackContent, TextGenError>;
}

// =============================================================================
// Image Generation Port
// =============================================================================

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageGenPort: Send + Sync {
    fn has_valid_credential(&self) -> bool;

    async fn generate(&self, request: ImageRequest) -> Result<ImageBlob, ImageGenError>;

    async fn check_health(&self) -> Result<bool, ImageGenError>;
}

// =============================================================================
// Clock / App Lifecycle Ports
// =============================================================================

pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Foreground/background state of the host application.
///
/// On-device image generation is gated on foreground at dispatch time
/// only; a call already in flight when the app backgrounds is allowed
/// to complete.
pub trait AppStatePort: Send + Sync {
    fn is_foreground(&self) -> bool;
}
