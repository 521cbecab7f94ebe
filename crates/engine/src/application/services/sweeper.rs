//! The generation scheduler: single long-lived control loop plus the
//! caller-facing surface.
//!
//! The loop has three states. Draining: dequeue and execute tasks with
//! bounded parallelism (capacity permits acquired before spawning, so the
//! in-flight count can never exceed capacity). Pipelining: once the queue
//! is empty, walk every deck through the maintenance pipeline, serially.
//! Sleeping: up to `sweep_ticks` one-tick waits, interruptible by `wake()`.
//!
//! Shutdown is cooperative: the cancellation token is observed between
//! dequeues, between pipeline phases, and between sleep ticks, never
//! mid-execution of a provider call.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Notify, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use recall_domain::{CardId, CardState, DeckId};

use crate::application::services::deck_pipeline::{icon_prompt, DeckPipeline, RefreshEvent};
use crate::application::services::executor::{ExecutionOutcome, GenerationExecutor};
use crate::application::services::retry::RetryScheduler;
use crate::application::services::task_queue::TaskQueue;
use crate::infrastructure::app_settings::GenerationSettings;
use crate::infrastructure::ports::{
    DeckStore, GenerationError, ImageGenPort, StoreError, TextGenPort,
};
use crate::queue_types::{GenerationTarget, GenerationTask, Priority};

/// Read-only counter snapshot published on every change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub queue_depth: usize,
    pub in_flight: usize,
    pub succeeded: u64,
    /// Terminal drops only: a task counts here once its retry budget is
    /// exhausted. Failed attempts that are later retried to success are
    /// not counted.
    pub failed: u64,
}

pub struct GenerationScheduler {
    store: Arc<dyn DeckStore>,
    queue: Arc<TaskQueue>,
    retry: Arc<RetryScheduler>,
    executor: Arc<GenerationExecutor>,
    pipeline: DeckPipeline,
    settings: GenerationSettings,
    limiter: Arc<Semaphore>,
    wake: Notify,
    cancel: CancellationToken,
    in_flight: AtomicUsize,
    succeeded: AtomicU64,
    failed: AtomicU64,
    status_tx: watch::Sender<SchedulerStatus>,
    refresh_tx: broadcast::Sender<RefreshEvent>,
}

impl GenerationScheduler {
    pub fn new(
        store: Arc<dyn DeckStore>,
        text: Arc<dyn TextGenPort>,
        local_images: Arc<dyn ImageGenPort>,
        remote_images: Arc<dyn ImageGenPort>,
        settings: GenerationSettings,
    ) -> Arc<Self> {
        let executor = Arc::new(GenerationExecutor::new(
            store.clone(),
            local_images,
            remote_images,
            settings.clone(),
        ));
        let (refresh_tx, _) = broadcast::channel(256);
        let pipeline = DeckPipeline::new(
            store.clone(),
            text,
            executor.clone(),
            settings.clone(),
            refresh_tx.clone(),
        );
        let (status_tx, _) = watch::channel(SchedulerStatus::default());

        Arc::new(Self {
            store,
            queue: Arc::new(TaskQueue::new()),
            retry: Arc::new(RetryScheduler::new(settings.retry_delays())),
            executor,
            pipeline,
            limiter: Arc::new(Semaphore::new(settings.worker_capacity)),
            settings,
            wake: Notify::new(),
            cancel: CancellationToken::new(),
            in_flight: AtomicUsize::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            status_tx,
            refresh_tx,
        })
    }

    // -------------------------------------------------------------------
    // Caller-facing surface
    // -------------------------------------------------------------------

    /// Request an icon for a deck. Resets any retry budget for the key.
    pub async fn enqueue_icon_request(
        &self,
        deck_id: DeckId,
        priority: Priority,
    ) -> Result<bool, StoreError> {
        let Some(deck) = self.store.get_deck(deck_id).await? else {
            tracing::debug!(deck_id = %deck_id, "Icon request for unknown deck ignored");
            return Ok(false);
        };

        let task = GenerationTask::icon_request(deck_id, icon_prompt(&deck), priority);
        Ok(self.accept_caller_task(task))
    }

    /// Request an image for a card, optionally overriding its stored
    /// prompt (the override is persisted, re-arming the failure gate).
    pub async fn enqueue_card_image_request(
        &self,
        card_id: CardId,
        priority: Priority,
        prompt_override: Option<String>,
    ) -> Result<bool, StoreError> {
        let Some(mut card) = self.store.resolve_card(card_id).await? else {
            tracing::debug!(card_id = %card_id, "Image request for unknown card ignored");
            return Ok(false);
        };

        if let Some(prompt) = prompt_override {
            card.set_image_prompt(prompt);
            self.store.save_card(&card).await?;
        }
        let Some(prompt) = card.image_prompt.clone() else {
            tracing::debug!(card_id = %card_id, "Card has no image prompt, nothing to enqueue");
            return Ok(false);
        };

        let task = match card.state {
            CardState::SuggestionPending | CardState::SuggestionVisible => {
                GenerationTask::suggestion_image_request(card_id, prompt, priority)
            }
            _ => GenerationTask::card_image_request(card_id, prompt, priority),
        };
        Ok(self.accept_caller_task(task))
    }

    /// Request an image for a suggestion card. Same path as
    /// `enqueue_card_image_request`; the task kind follows the card's
    /// lifecycle state either way.
    pub async fn enqueue_suggestion_image_request(
        &self,
        card_id: CardId,
        priority: Priority,
    ) -> Result<bool, StoreError> {
        self.enqueue_card_image_request(card_id, priority, None).await
    }

    /// Clear the existing artifact and enqueue a fresh generation at
    /// user-requested priority. Bypasses the failure gate once.
    pub async fn regenerate(&self, target: GenerationTarget) -> Result<bool, StoreError> {
        match target {
            GenerationTarget::Deck(deck_id) => {
                let Some(mut deck) = self.store.get_deck(deck_id).await? else {
                    return Ok(false);
                };
                deck.icon_image = None;
                self.store.save_deck(&deck).await?;
                let task =
                    GenerationTask::icon_request(deck_id, icon_prompt(&deck), Priority::UserRequested);
                Ok(self.accept_caller_task(task))
            }
            GenerationTarget::Card(card_id) => {
                let Some(mut card) = self.store.resolve_card(card_id).await? else {
                    return Ok(false);
                };
                card.image = None;
                card.consecutive_image_failures = 0;
                self.store.save_card(&card).await?;
                let Some(prompt) = card.image_prompt.clone() else {
                    return Ok(false);
                };
                let task = match card.state {
                    CardState::SuggestionPending | CardState::SuggestionVisible => {
                        GenerationTask::suggestion_image_request(
                            card_id,
                            prompt,
                            Priority::UserRequested,
                        )
                    }
                    _ => GenerationTask::card_image_request(card_id, prompt, Priority::UserRequested),
                };
                Ok(self.accept_caller_task(task))
            }
        }
    }

    /// Interrupt the sleeping state. Idempotent; also called on
    /// resume-from-background.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Cancel the loop and drop everything pending. Cooperative: a
    /// provider call already in flight completes first.
    pub fn shutdown(&self) {
        let dropped = self.queue.clear();
        if dropped > 0 {
            tracing::info!(dropped, "Dropped pending tasks at shutdown");
        }
        self.cancel.cancel();
        self.publish_status();
    }

    pub fn status(&self) -> SchedulerStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SchedulerStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_refresh(&self) -> broadcast::Receiver<RefreshEvent> {
        self.refresh_tx.subscribe()
    }

    /// An explicit caller request always restores the full retry budget
    /// for its key, even after a terminal drop.
    fn accept_caller_task(&self, task: GenerationTask) -> bool {
        self.retry.reset(&task.key());
        let accepted = self.queue.enqueue(task);
        if accepted {
            self.publish_status();
            self.wake();
        }
        accepted
    }

    // -------------------------------------------------------------------
    // The loop
    // -------------------------------------------------------------------

    /// Run until shutdown. Spawn this once on a runtime.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            capacity = self.settings.worker_capacity,
            sweep_ticks = self.settings.sweep_ticks,
            "Generation scheduler started"
        );

        while !self.cancel.is_cancelled() {
            Arc::clone(&self).drain().await;

            if self.cancel.is_cancelled() {
                break;
            }
            if self.queue.is_empty() {
                self.run_pipeline().await;
            }
            if self.queue.is_empty() {
                self.sleep().await;
            }
        }

        tracing::info!("Generation scheduler stopped");
    }

    /// Dequeue under the limiter and fire-and-continue. The permit is
    /// acquired here, before spawning, so at most `worker_capacity`
    /// executions are ever in flight.
    async fn drain(self: Arc<Self>) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let Some(task) = self.queue.dequeue_next() else {
                return;
            };
            self.publish_status();

            let permit = tokio::select! {
                _ = self.cancel.cancelled() => return,
                permit = self.limiter.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            let scheduler = Arc::clone(&self);
            tokio::spawn(async move {
                scheduler.execute_one(task, permit).await;
            });
        }
    }

    async fn execute_one(self: Arc<Self>, task: GenerationTask, permit: OwnedSemaphorePermit) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.publish_status();

        let result = self.executor.execute(&task).await;

        drop(permit);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(ExecutionOutcome::Applied) => {
                self.retry.reset(&task.key());
                self.succeeded.fetch_add(1, Ordering::SeqCst);
            }
            Ok(ExecutionOutcome::TargetVanished) => {
                // Silent no-op, neither success nor failure
                self.retry.reset(&task.key());
            }
            Err(err) if err.is_fail_fast() => {
                // No ordinal consumed; conditions may change via wake()
                tracing::debug!(key = %task.key(), error = %err, "Task dropped fail-fast");
            }
            Err(err) => {
                Arc::clone(&self).schedule_retry(task, &err);
            }
        }
        self.publish_status();
    }

    /// Deferred re-enqueue: the delay runs on its own spawned timer, never
    /// inside the queue or the loop.
    fn schedule_retry(self: Arc<Self>, task: GenerationTask, err: &GenerationError) {
        let key = task.key();
        match self.retry.next_delay(key) {
            Some(delay) => {
                tracing::warn!(
                    key = %key,
                    error = %err,
                    delay_secs = delay.as_secs(),
                    attempt = self.retry.attempts(&key),
                    "Task failed, retry scheduled"
                );
                let scheduler = self;
                tokio::spawn(async move {
                    tokio::select! {
                        _ = scheduler.cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            if scheduler.queue.enqueue(task.retry_clone()) {
                                scheduler.publish_status();
                                scheduler.wake();
                            }
                        }
                    }
                });
            }
            None => {
                tracing::error!(key = %key, error = %err, "Task failed terminally, dropping");
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Serial by design: concurrent on-device generation across decks is
    /// unreliable, and serial phases bound rate-limit exposure.
    async fn run_pipeline(&self) {
        let decks = match self.store.fetch_all_decks().await {
            Ok(decks) => decks,
            Err(err) => {
                tracing::error!(error = %err, "Could not list decks for maintenance pipeline");
                return;
            }
        };

        for deck in decks {
            if self.cancel.is_cancelled() {
                return;
            }
            self.pipeline.run_deck(&deck, &self.cancel).await;
        }
    }

    async fn sleep(&self) {
        for _ in 0..self.settings.sweep_ticks {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = self.wake.notified() => {
                    tracing::debug!("Scheduler woken early");
                    return;
                }
                _ = tokio::time::sleep(self.settings.tick()) => {}
            }
            if !self.queue.is_empty() {
                return;
            }
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(SchedulerStatus {
            queue_depth: self.queue.len(),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        });
    }
}
