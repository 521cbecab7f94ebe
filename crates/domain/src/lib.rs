//! Recall Domain - core types for the study content model.
//!
//! Pure data and invariants: no async, no I/O, no framework types.

pub mod entities;
pub mod error;
pub mod ids;

pub use entities::{
    Card, CardBack, CardKind, CardState, Deck, DeletedSuggestionRecord, ImageBlob, SuggestionKey,
    DEFAULT_SUGGESTION_TARGET,
};
pub use error::DomainError;
pub use ids::{CardId, DeckId, TaskId};
