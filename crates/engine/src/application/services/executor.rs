//! Generation executor: dispatches one task to the right provider and
//! applies the result.
//!
//! Dispatch rules:
//! - Icon tasks always go to the remote provider.
//! - Card/suggestion image tasks follow the user's provider preference;
//!   an on-device failure may fall back to remote, but only when the user
//!   opted in AND a remote credential exists.
//! - Credential and foreground checks happen before any network call and
//!   fail fast without consuming a retry ordinal.
//!
//! After a successful generation the target is re-resolved in the store:
//! it may have been deleted mid-flight, in which case the result is
//! discarded as a no-op.

use std::sync::Arc;

use recall_domain::ImageBlob;

use crate::infrastructure::app_settings::{GenerationSettings, ImageProviderPreference};
use crate::infrastructure::ports::{
    DeckStore, GenerationError, ImageGenPort, ImageRequest,
};
use crate::queue_types::{GenerationTarget, GenerationTask, TaskKind};

/// What happened to a task that did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Result attached and persisted
    Applied,
    /// Target deleted mid-flight; result discarded silently
    TargetVanished,
}

pub struct GenerationExecutor {
    store: Arc<dyn DeckStore>,
    local_images: Arc<dyn ImageGenPort>,
    remote_images: Arc<dyn ImageGenPort>,
    settings: GenerationSettings,
}

impl GenerationExecutor {
    pub fn new(
        store: Arc<dyn DeckStore>,
        local_images: Arc<dyn ImageGenPort>,
        remote_images: Arc<dyn ImageGenPort>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            store,
            local_images,
            remote_images,
            settings,
        }
    }

    /// Run one task end to end: generate, re-resolve, persist.
    pub async fn execute(&self, task: &GenerationTask) -> Result<ExecutionOutcome, GenerationError> {
        tracing::info!(
            kind = %task.kind,
            target = %task.target,
            priority = ?task.priority,
            "Executing generation task"
        );

        let image = match self.generate_image(task).await {
            Ok(image) => image,
            Err(err) => {
                self.record_failure(task, &err).await;
                return Err(err);
            }
        };

        self.apply(task, image).await
    }

    async fn generate_image(&self, task: &GenerationTask) -> Result<ImageBlob, GenerationError> {
        let request = ImageRequest {
            prompt: task.prompt.clone(),
            width: self.settings.image_width,
            height: self.settings.image_height,
        };

        match task.kind {
            // Icons are always remote/high-fidelity
            TaskKind::IconRequest => {
                if !self.remote_images.has_valid_credential() {
                    return Err(GenerationError::MissingCredential);
                }
                Ok(self.remote_images.generate(request).await?)
            }
            TaskKind::CardImageRequest | TaskKind::SuggestionImageRequest => {
                match self.settings.provider_preference {
                    ImageProviderPreference::Remote => {
                        if !self.remote_images.has_valid_credential() {
                            return Err(GenerationError::MissingCredential);
                        }
                        Ok(self.remote_images.generate(request).await?)
                    }
                    ImageProviderPreference::OnDevice => {
                        match self.local_images.generate(request.clone()).await {
                            Ok(image) => Ok(image),
                            Err(local_err) => {
                                let err: GenerationError = local_err.into();
                                if self.can_fall_back_to_remote(&err) {
                                    tracing::warn!(
                                        error = %err,
                                        target = %task.target,
                                        "On-device generation failed, falling back to remote"
                                    );
                                    Ok(self.remote_images.generate(request).await?)
                                } else {
                                    Err(err)
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Remote fallback is a policy flag, not automatic: the user must have
    /// opted in and a remote credential must be present. Fail-fast local
    /// errors (backgrounded app) stay fail-fast so the task costs nothing.
    fn can_fall_back_to_remote(&self, err: &GenerationError) -> bool {
        self.settings.allow_remote_fallback
            && self.remote_images.has_valid_credential()
            && !err.is_fail_fast()
    }

    async fn apply(
        &self,
        task: &GenerationTask,
        image: ImageBlob,
    ) -> Result<ExecutionOutcome, GenerationError> {
        match task.target {
            GenerationTarget::Deck(deck_id) => {
                let Some(mut deck) = self.store.get_deck(deck_id).await? else {
                    tracing::debug!(deck_id = %deck_id, "Deck vanished mid-flight, discarding icon");
                    return Ok(ExecutionOutcome::TargetVanished);
                };
                deck.icon_image = Some(image);
                self.store.save_deck(&deck).await?;
            }
            GenerationTarget::Card(card_id) => {
                let Some(mut card) = self.store.resolve_card(card_id).await? else {
                    tracing::debug!(card_id = %card_id, "Card vanished mid-flight, discarding image");
                    return Ok(ExecutionOutcome::TargetVanished);
                };
                card.attach_image(image);
                self.store.save_card(&card).await?;
            }
        }

        self.store.refresh().await?;
        Ok(ExecutionOutcome::Applied)
    }

    /// Persist the consecutive-failure counter for card-scoped tasks.
    /// Icons carry no counter; fail-fast errors cost nothing.
    async fn record_failure(&self, task: &GenerationTask, err: &GenerationError) {
        if err.is_fail_fast() {
            return;
        }
        let GenerationTarget::Card(card_id) = task.target else {
            return;
        };

        let resolved = match self.store.resolve_card(card_id).await {
            Ok(card) => card,
            Err(store_err) => {
                tracing::error!(error = %store_err, card_id = %card_id, "Failed to load card for failure bookkeeping");
                return;
            }
        };
        let Some(mut card) = resolved else {
            return;
        };

        card.record_image_failure();
        if let Err(store_err) = self.store.save_card(&card).await {
            tracing::error!(error = %store_err, card_id = %card_id, "Failed to persist failure counter");
        }
    }
}
