//! Domain entities

mod card;
mod deck;
mod suggestion;

pub use card::{Card, CardBack, CardKind, CardState, ImageBlob};
pub use deck::{Deck, DEFAULT_SUGGESTION_TARGET};
pub use suggestion::{DeletedSuggestionRecord, SuggestionKey};
