//! In-memory store implementation for development and testing
//!
//! Simple RwLock-protected maps. Does not persist data; the production
//! app swaps in a bridge to its durable store behind the same port.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use recall_domain::{Card, CardId, Deck, DeckId, DeletedSuggestionRecord};

use crate::infrastructure::ports::{DeckStore, StoreError};

#[derive(Default)]
pub struct InMemoryDeckStore {
    decks: Arc<RwLock<HashMap<DeckId, Deck>>>,
    cards: Arc<RwLock<HashMap<CardId, Card>>>,
    deleted: Arc<RwLock<Vec<DeletedSuggestionRecord>>>,
}

impl InMemoryDeckStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed helper for tests and local runs.
    pub async fn insert_deck(&self, deck: Deck) {
        self.decks.write().await.insert(deck.id, deck);
    }

    /// Seed helper for tests and local runs.
    pub async fn insert_card(&self, card: Card) {
        self.cards.write().await.insert(card.id, card);
    }
}

#[async_trait]
impl DeckStore for InMemoryDeckStore {
    async fn fetch_all_decks(&self) -> Result<Vec<Deck>, StoreError> {
        let decks = self.decks.read().await;
        let mut all: Vec<Deck> = decks.values().cloned().collect();
        // Stable iteration order for the serial pipeline
        all.sort_by_key(|deck| deck.created_at);
        Ok(all)
    }

    async fn get_deck(&self, id: DeckId) -> Result<Option<Deck>, StoreError> {
        Ok(self.decks.read().await.get(&id).cloned())
    }

    async fn save_deck(&self, deck: &Deck) -> Result<(), StoreError> {
        self.decks.write().await.insert(deck.id, deck.clone());
        Ok(())
    }

    async fn resolve_card(&self, id: CardId) -> Result<Option<Card>, StoreError> {
        Ok(self.cards.read().await.get(&id).cloned())
    }

    async fn cards_in_deck(&self, deck_id: DeckId) -> Result<Vec<Card>, StoreError> {
        let cards = self.cards.read().await;
        let mut in_deck: Vec<Card> = cards
            .values()
            .filter(|card| card.deck_id == deck_id)
            .cloned()
            .collect();
        in_deck.sort_by_key(|card| card.created_at);
        Ok(in_deck)
    }

    async fn save_card(&self, card: &Card) -> Result<(), StoreError> {
        self.cards.write().await.insert(card.id, card.clone());
        Ok(())
    }

    async fn delete_card(&self, id: CardId) -> Result<(), StoreError> {
        self.cards.write().await.remove(&id);
        Ok(())
    }

    async fn deleted_suggestions(
        &self,
        deck_id: DeckId,
    ) -> Result<Vec<DeletedSuggestionRecord>, StoreError> {
        let deleted = self.deleted.read().await;
        Ok(deleted
            .iter()
            .filter(|record| record.deck_id == deck_id)
            .cloned()
            .collect())
    }

    async fn append_deleted_suggestion(
        &self,
        record: &DeletedSuggestionRecord,
    ) -> Result<(), StoreError> {
        self.deleted.write().await.push(record.clone());
        Ok(())
    }

    async fn refresh(&self) -> Result<(), StoreError> {
        // Single-context store; nothing to merge.
        Ok(())
    }
}
