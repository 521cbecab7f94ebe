//! Per-deck maintenance pipeline.
//!
//! Five ordered phases, run serially per deck whenever the scheduler's
//! queue is empty: replenish suggestions, materialize pending suggestions,
//! backfill visible-suggestion images, backfill active-card images, and
//! generate a missing deck icon. Each phase commits its mutations before
//! the next phase reads state, and a refresh event is emitted per phase so
//! observers see incremental progress.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use recall_domain::{Card, CardState, Deck, DeckId, SuggestionKey};

use crate::application::services::executor::{ExecutionOutcome, GenerationExecutor};
use crate::infrastructure::app_settings::GenerationSettings;
use crate::infrastructure::ports::{
    DeckStore, GenerationError, SuggestionContext, TextGenPort,
};
use crate::queue_types::{GenerationTask, Priority};

/// One of the five ordered maintenance steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    ReplenishSuggestions,
    MaterializePending,
    BackfillSuggestionImages,
    BackfillCardImages,
    DeckIcon,
}

/// UI-facing progress signal, one per completed phase plus a final one
/// per deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshEvent {
    PhaseCompleted { deck_id: DeckId, phase: PipelinePhase },
    PipelineCompleted { deck_id: DeckId },
}

pub struct DeckPipeline {
    store: Arc<dyn DeckStore>,
    text: Arc<dyn TextGenPort>,
    executor: Arc<GenerationExecutor>,
    settings: GenerationSettings,
    refresh_tx: broadcast::Sender<RefreshEvent>,
}

impl DeckPipeline {
    pub fn new(
        store: Arc<dyn DeckStore>,
        text: Arc<dyn TextGenPort>,
        executor: Arc<GenerationExecutor>,
        settings: GenerationSettings,
        refresh_tx: broadcast::Sender<RefreshEvent>,
    ) -> Self {
        Self {
            store,
            text,
            executor,
            settings,
            refresh_tx,
        }
    }

    /// Run all five phases for one deck. Phase failures are logged and do
    /// not abort later phases; cancellation is honored between phases.
    pub async fn run_deck(&self, deck: &Deck, cancel: &CancellationToken) {
        let phases = [
            PipelinePhase::ReplenishSuggestions,
            PipelinePhase::MaterializePending,
            PipelinePhase::BackfillSuggestionImages,
            PipelinePhase::BackfillCardImages,
            PipelinePhase::DeckIcon,
        ];

        for phase in phases {
            if cancel.is_cancelled() {
                tracing::debug!(deck_id = %deck.id, "Pipeline cancelled between phases");
                return;
            }

            let result = match phase {
                PipelinePhase::ReplenishSuggestions => self.replenish_suggestions(deck).await,
                PipelinePhase::MaterializePending => {
                    self.materialize_pending(deck, cancel).await
                }
                PipelinePhase::BackfillSuggestionImages => {
                    self.backfill_images(deck, CardState::SuggestionVisible, cancel)
                        .await
                }
                PipelinePhase::BackfillCardImages => {
                    self.backfill_images(deck, CardState::Active, cancel).await
                }
                PipelinePhase::DeckIcon => self.generate_icon(deck).await,
            };

            if let Err(err) = result {
                tracing::warn!(
                    deck_id = %deck.id,
                    phase = ?phase,
                    error = %err,
                    "Pipeline phase failed, continuing with next phase"
                );
            }

            self.emit(RefreshEvent::PhaseCompleted {
                deck_id: deck.id,
                phase,
            });
        }

        self.emit(RefreshEvent::PipelineCompleted { deck_id: deck.id });
    }

    /// Phase 1: drive `visible + pending` toward the deck's suggestion
    /// target. The provider receives every front+kind pair already taken;
    /// returned drafts are re-checked locally against the same sets plus
    /// an in-batch set, since providers do repeat themselves.
    async fn replenish_suggestions(&self, deck: &Deck) -> Result<(), GenerationError> {
        let cards = self.store.cards_in_deck(deck.id).await?;

        let current = cards.iter().filter(|card| card.is_suggestion()).count() as u32;
        if current >= deck.suggestion_target {
            return Ok(());
        }
        let shortfall = deck.suggestion_target - current;

        if !self.text.has_valid_credential() {
            tracing::debug!(deck_id = %deck.id, "No text credential, skipping replenishment");
            return Ok(());
        }

        let mut context = SuggestionContext {
            deck_name: deck.name.clone(),
            deck_description: deck.description.clone(),
            ..SuggestionContext::default()
        };
        let mut taken: HashSet<SuggestionKey> = HashSet::new();
        for card in &cards {
            let pair = (card.front_text.clone(), card.kind());
            if card.is_suggestion() {
                context.suggested.push(pair);
            } else {
                context.existing.push(pair);
            }
            taken.insert(SuggestionKey::from(card));
        }
        for record in self.store.deleted_suggestions(deck.id).await? {
            taken.insert(record.key());
            context.deleted.push((record.front_text, record.kind));
        }

        let drafts = self.text.generate_suggestions(&context, shortfall).await?;

        let mut created = 0u32;
        for draft in drafts {
            if created >= shortfall {
                break;
            }
            let key = SuggestionKey::new(&draft.front_text, draft.kind);
            // `taken` doubles as the in-batch dedup set
            if !taken.insert(key) {
                tracing::debug!(
                    deck_id = %deck.id,
                    front = %draft.front_text,
                    kind = %draft.kind,
                    "Discarding duplicate suggestion draft"
                );
                continue;
            }

            let card = Card::new_suggestion(deck.id, draft.front_text, draft.back, draft.image_prompt);
            self.store.save_card(&card).await?;
            created += 1;
        }

        if created > 0 {
            tracing::info!(deck_id = %deck.id, created, "Replenished suggestions");
            self.store.refresh().await?;
        }
        Ok(())
    }

    /// Phase 2: generate images for pending suggestions and promote them
    /// to visible. Promotion happens only on a successful generation.
    async fn materialize_pending(
        &self,
        deck: &Deck,
        cancel: &CancellationToken,
    ) -> Result<(), GenerationError> {
        let cards = self.store.cards_in_deck(deck.id).await?;
        for card in cards {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if card.state != CardState::SuggestionPending {
                continue;
            }
            let Some(prompt) = card.image_prompt.clone() else {
                continue;
            };
            if card.image_attempts_exhausted(self.settings.image_failure_threshold) {
                continue;
            }

            let task =
                GenerationTask::suggestion_image_request(card.id, prompt, Priority::Low);
            match self.executor.execute(&task).await {
                Ok(ExecutionOutcome::Applied) => {
                    // Re-resolve: the executor persisted the attached image
                    let Some(mut fresh) = self.store.resolve_card(card.id).await? else {
                        continue;
                    };
                    if fresh.promote_to_visible().is_ok() {
                        self.store.save_card(&fresh).await?;
                    }
                }
                Ok(ExecutionOutcome::TargetVanished) => {}
                Err(err) if err.is_fail_fast() => {
                    // Provider-wide condition; the rest of the phase would
                    // hit the same wall
                    tracing::debug!(deck_id = %deck.id, error = %err, "Provider unavailable, deferring pending suggestions");
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(card_id = %card.id, error = %err, "Suggestion image failed, left pending");
                }
            }
        }
        self.store.refresh().await?;
        Ok(())
    }

    /// Phases 3 and 4: attach images to cards in `state` that have a
    /// prompt, no image, and an unexhausted failure counter.
    async fn backfill_images(
        &self,
        deck: &Deck,
        state: CardState,
        cancel: &CancellationToken,
    ) -> Result<(), GenerationError> {
        let cards = self.store.cards_in_deck(deck.id).await?;
        for card in cards {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if card.state != state || card.image.is_some() {
                continue;
            }
            let Some(prompt) = card.image_prompt.clone() else {
                continue;
            };
            if prompt.trim().is_empty()
                || card.image_attempts_exhausted(self.settings.image_failure_threshold)
            {
                continue;
            }

            let task = match state {
                CardState::Active => {
                    GenerationTask::card_image_request(card.id, prompt, Priority::Low)
                }
                _ => GenerationTask::suggestion_image_request(card.id, prompt, Priority::Low),
            };
            match self.executor.execute(&task).await {
                Ok(_) => {}
                Err(err) if err.is_fail_fast() => {
                    tracing::debug!(deck_id = %deck.id, error = %err, "Provider unavailable, deferring image backfill");
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(card_id = %card.id, error = %err, "Image backfill failed");
                }
            }
        }
        Ok(())
    }

    /// Phase 5: icons always come from the remote provider. Without a
    /// credential the phase is a silent skip, not a failure.
    async fn generate_icon(&self, deck: &Deck) -> Result<(), GenerationError> {
        // Re-resolve: an earlier cycle or a user request may have attached one
        let Some(fresh) = self.store.get_deck(deck.id).await? else {
            return Ok(());
        };
        if fresh.has_icon() {
            return Ok(());
        }

        let prompt = icon_prompt(&fresh);
        let task = GenerationTask::icon_request(fresh.id, prompt, Priority::Low);
        match self.executor.execute(&task).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_fail_fast() => {
                tracing::debug!(deck_id = %deck.id, error = %err, "Icon provider unavailable, skipping");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn emit(&self, event: RefreshEvent) {
        // No receivers is fine; refresh is best-effort
        let _ = self.refresh_tx.send(event);
    }
}

pub(crate) fn icon_prompt(deck: &Deck) -> String {
    if deck.description.trim().is_empty() {
        format!("app icon representing the topic: {}", deck.name)
    } else {
        format!(
            "app icon representing the topic: {} ({})",
            deck.name, deck.description
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::app_settings::ImageProviderPreference;
    use crate::infrastructure::memory_store::InMemoryDeckStore;
    use crate::infrastructure::ports::TextGenError;
    use crate::test_fixtures::provider_mocks::{ScriptedImageGen, ScriptedTextGen};
    use recall_domain::CardBack;

    struct Harness {
        store: Arc<InMemoryDeckStore>,
        text: Arc<ScriptedTextGen>,
        remote: Arc<ScriptedImageGen>,
        pipeline: DeckPipeline,
    }

    fn harness(text: ScriptedTextGen, remote: ScriptedImageGen) -> Harness {
        let store = Arc::new(InMemoryDeckStore::new());
        let text = Arc::new(text);
        let remote = Arc::new(remote);
        let settings = GenerationSettings {
            provider_preference: ImageProviderPreference::Remote,
            ..GenerationSettings::default()
        };
        let executor = Arc::new(GenerationExecutor::new(
            store.clone(),
            Arc::new(ScriptedImageGen::always_ok()),
            remote.clone(),
            settings.clone(),
        ));
        let (refresh_tx, _) = broadcast::channel(64);
        let pipeline = DeckPipeline::new(
            store.clone(),
            text.clone(),
            executor,
            settings,
            refresh_tx,
        );
        Harness {
            store,
            text,
            remote,
            pipeline,
        }
    }

    fn visible_suggestion(deck_id: DeckId, front: &str) -> Card {
        let mut card = Card::new_suggestion(
            deck_id,
            front,
            CardBack::Vocabulary {
                translation: format!("{front} translated"),
                example_sentence: None,
            },
            Some(format!("a picture of {front}")),
        );
        card.promote_to_visible().expect("pending promotes");
        card.attach_image(ScriptedImageGen::placeholder_image());
        card
    }

    #[tokio::test]
    async fn replenishment_requests_exactly_the_shortfall() {
        let h = harness(
            ScriptedTextGen::new().push_batch(vec![
                ScriptedTextGen::vocab_draft("Uno", "One"),
                ScriptedTextGen::vocab_draft("Dos", "Two"),
            ]),
            ScriptedImageGen::always_ok(),
        );

        let deck = Deck::new("Spanish", "Basics").with_suggestion_target(10);
        let deck_id = deck.id;
        h.store.insert_deck(deck.clone()).await;
        for front in ["A", "B", "C"] {
            h.store.insert_card(visible_suggestion(deck_id, front)).await;
        }
        for front in ["D", "E"] {
            h.store
                .insert_card(Card::new_suggestion(
                    deck_id,
                    front,
                    CardBack::Fact { text: front.to_string() },
                    None,
                ))
                .await;
        }

        h.pipeline
            .replenish_suggestions(&deck)
            .await
            .expect("phase ok");

        // target 10, 3 visible + 2 pending -> exactly 5 requested
        assert_eq!(h.text.requested_counts(), vec![5]);
        let context = &h.text.contexts()[0];
        assert_eq!(context.suggested.len(), 5);
    }

    #[tokio::test]
    async fn malformed_batch_commits_no_suggestions() {
        let h = harness(
            ScriptedTextGen::new().push_error(TextGenError::MalformedResponse(
                "unrepairable response".to_string(),
            )),
            ScriptedImageGen::always_ok(),
        );

        let deck = Deck::new("Spanish", "Basics");
        let deck_id = deck.id;
        h.store.insert_deck(deck.clone()).await;

        let result = h.pipeline.replenish_suggestions(&deck).await;

        assert!(matches!(result, Err(GenerationError::MalformedResponse(_))));
        // The whole batch is abandoned: nothing is persisted
        let cards = h.store.cards_in_deck(deck_id).await.expect("store ok");
        assert!(cards.is_empty());
    }

    #[tokio::test]
    async fn replenishment_skips_silently_without_text_credential() {
        let h = harness(
            ScriptedTextGen::new()
                .without_credential()
                .push_batch(vec![ScriptedTextGen::vocab_draft("Uno", "One")]),
            ScriptedImageGen::always_ok(),
        );

        let deck = Deck::new("Spanish", "Basics");
        let deck_id = deck.id;
        h.store.insert_deck(deck.clone()).await;

        h.pipeline
            .replenish_suggestions(&deck)
            .await
            .expect("skip is not an error");

        assert!(h.text.requested_counts().is_empty());
        let cards = h.store.cards_in_deck(deck_id).await.expect("store ok");
        assert!(cards.is_empty());
    }

    #[tokio::test]
    async fn colliding_drafts_are_discarded_case_insensitively() {
        let h = harness(
            ScriptedTextGen::new().push_batch(vec![
                ScriptedTextGen::vocab_draft("Casa", "House"),
                ScriptedTextGen::vocab_draft("Perro", "Dog"),
                // In-batch duplicate of the survivor
                ScriptedTextGen::vocab_draft("perro", "Dog"),
            ]),
            ScriptedImageGen::always_ok(),
        );

        let deck = Deck::new("Spanish", "Basics");
        let deck_id = deck.id;
        h.store.insert_deck(deck.clone()).await;
        // Active card whose key collides with the "Casa" draft
        h.store
            .insert_card(Card::new(
                deck_id,
                "casa",
                CardBack::Vocabulary {
                    translation: "House".to_string(),
                    example_sentence: None,
                },
            ))
            .await;

        h.pipeline
            .replenish_suggestions(&deck)
            .await
            .expect("phase ok");

        let cards = h.store.cards_in_deck(deck_id).await.expect("ok");
        let suggestions: Vec<_> = cards.iter().filter(|card| card.is_suggestion()).collect();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].front_text, "Perro");
    }

    #[tokio::test]
    async fn replenishment_is_a_no_op_at_target() {
        let h = harness(ScriptedTextGen::new(), ScriptedImageGen::always_ok());
        let deck = Deck::new("Spanish", "Basics").with_suggestion_target(2);
        let deck_id = deck.id;
        h.store.insert_deck(deck.clone()).await;
        for front in ["A", "B"] {
            h.store.insert_card(visible_suggestion(deck_id, front)).await;
        }

        h.pipeline
            .replenish_suggestions(&deck)
            .await
            .expect("phase ok");
        assert!(h.text.requested_counts().is_empty());
    }

    #[tokio::test]
    async fn materialize_promotes_pending_to_visible_on_success() {
        let h = harness(ScriptedTextGen::new(), ScriptedImageGen::always_ok());
        let deck = Deck::new("Spanish", "Basics");
        let deck_id = deck.id;
        let card = Card::new_suggestion(
            deck_id,
            "Gato",
            CardBack::Fact { text: "Cat".to_string() },
            Some("a cat".to_string()),
        );
        let card_id = card.id;
        h.store.insert_deck(deck.clone()).await;
        h.store.insert_card(card).await;

        h.pipeline
            .materialize_pending(&deck, &CancellationToken::new())
            .await
            .expect("phase ok");

        let card = h.store.resolve_card(card_id).await.expect("ok").expect("card");
        assert_eq!(card.state, CardState::SuggestionVisible);
        assert!(card.image.is_some());
    }

    #[tokio::test]
    async fn materialize_leaves_card_pending_on_failure() {
        let h = harness(ScriptedTextGen::new(), ScriptedImageGen::always_api_error());
        let deck = Deck::new("Spanish", "Basics");
        let deck_id = deck.id;
        let card = Card::new_suggestion(
            deck_id,
            "Gato",
            CardBack::Fact { text: "Cat".to_string() },
            Some("a cat".to_string()),
        );
        let card_id = card.id;
        h.store.insert_deck(deck.clone()).await;
        h.store.insert_card(card).await;

        h.pipeline
            .materialize_pending(&deck, &CancellationToken::new())
            .await
            .expect("phase ok");

        let card = h.store.resolve_card(card_id).await.expect("ok").expect("card");
        assert_eq!(card.state, CardState::SuggestionPending);
        assert_eq!(card.consecutive_image_failures, 1);
    }

    #[tokio::test]
    async fn exhausted_cards_are_excluded_from_backfill() {
        let h = harness(ScriptedTextGen::new(), ScriptedImageGen::always_ok());
        let deck = Deck::new("Spanish", "Basics");
        let deck_id = deck.id;
        let mut card = Card::new(
            deck_id,
            "Gato",
            CardBack::Fact { text: "Cat".to_string() },
        );
        card.set_image_prompt("a cat");
        for _ in 0..3 {
            card.record_image_failure();
        }
        h.store.insert_deck(deck.clone()).await;
        h.store.insert_card(card).await;

        h.pipeline
            .backfill_images(&deck, CardState::Active, &CancellationToken::new())
            .await
            .expect("phase ok");
        assert_eq!(h.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn backfill_attaches_images_to_active_cards() {
        let h = harness(ScriptedTextGen::new(), ScriptedImageGen::always_ok());
        let deck = Deck::new("Spanish", "Basics");
        let deck_id = deck.id;
        let mut card = Card::new(
            deck_id,
            "Gato",
            CardBack::Fact { text: "Cat".to_string() },
        );
        card.set_image_prompt("a cat");
        let card_id = card.id;
        h.store.insert_deck(deck.clone()).await;
        h.store.insert_card(card).await;

        h.pipeline
            .backfill_images(&deck, CardState::Active, &CancellationToken::new())
            .await
            .expect("phase ok");

        let card = h.store.resolve_card(card_id).await.expect("ok").expect("card");
        assert!(card.image.is_some());
        assert_eq!(h.remote.call_count(), 1);
    }

    #[tokio::test]
    async fn icon_phase_skips_silently_without_remote_credential() {
        let h = harness(
            ScriptedTextGen::new(),
            ScriptedImageGen::always_ok().without_credential(),
        );
        let deck = Deck::new("Spanish", "Basics");
        h.store.insert_deck(deck.clone()).await;

        h.pipeline.generate_icon(&deck).await.expect("silent skip");
        assert_eq!(h.remote.call_count(), 0);
        let deck = h.store.get_deck(deck.id).await.expect("ok").expect("deck");
        assert!(!deck.has_icon());
    }

    #[tokio::test]
    async fn full_run_emits_one_refresh_per_phase_plus_completion() {
        let h = harness(ScriptedTextGen::new(), ScriptedImageGen::always_ok());
        let deck = Deck::new("Spanish", "Basics").with_suggestion_target(0);
        h.store.insert_deck(deck.clone()).await;

        let mut refresh_rx = h.pipeline.refresh_tx.subscribe();
        h.pipeline.run_deck(&deck, &CancellationToken::new()).await;

        let mut events = Vec::new();
        while let Ok(event) = refresh_rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 6);
        assert_eq!(
            events.last(),
            Some(&RefreshEvent::PipelineCompleted { deck_id: deck.id })
        );
    }
}
