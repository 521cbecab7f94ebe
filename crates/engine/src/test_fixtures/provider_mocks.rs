//! Scripted provider doubles for scheduler tests.
//!
//! Stateful mocks that record call counts and concurrency, and can hold
//! generations open behind a gate so tests can observe the limiter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use recall_domain::{CardBack, CardKind, ImageBlob};

use crate::infrastructure::ports::{
    BackContent, ImageGenError, ImageGenPort, ImageRequest, SuggestionContext, SuggestionDraft,
    TextGenError, TextGenPort,
};

enum ImageScript {
    AlwaysOk,
    AlwaysApiError,
    FailTimes(AtomicUsize),
}

/// Image provider double with call accounting and an optional gate.
pub struct ScriptedImageGen {
    script: ImageScript,
    has_credential: bool,
    /// When set, `generate` blocks until the test releases a permit
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedImageGen {
    pub fn always_ok() -> Self {
        Self {
            script: ImageScript::AlwaysOk,
            has_credential: true,
            gate: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn always_api_error() -> Self {
        Self {
            script: ImageScript::AlwaysApiError,
            ..Self::always_ok()
        }
    }

    /// Fail the first `failures` generations with an API error, then succeed.
    pub fn fails_then_succeeds(failures: usize) -> Self {
        Self {
            script: ImageScript::FailTimes(AtomicUsize::new(failures)),
            ..Self::always_ok()
        }
    }

    pub fn without_credential(mut self) -> Self {
        self.has_credential = false;
        self
    }

    /// Hold every generation open until the test releases a permit on the gate.
    pub fn held_behind(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently in-flight generations observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn placeholder_image() -> ImageBlob {
        // Minimal PNG header; tests only care that bytes exist
        ImageBlob {
            data: vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
            format: "png".to_string(),
        }
    }
}

#[async_trait]
impl ImageGenPort for ScriptedImageGen {
    fn has_valid_credential(&self) -> bool {
        self.has_credential
    }

    async fn generate(&self, _request: ImageRequest) -> Result<ImageBlob, ImageGenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    return Err(ImageGenError::Unavailable("gate closed".to_string()));
                }
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match &self.script {
            ImageScript::AlwaysOk => Ok(Self::placeholder_image()),
            ImageScript::AlwaysApiError => Err(ImageGenError::Api {
                code: 500,
                message: "scripted failure".to_string(),
            }),
            ImageScript::FailTimes(remaining) => {
                let consumed = remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if consumed {
                    Err(ImageGenError::Api {
                        code: 500,
                        message: "scripted failure".to_string(),
                    })
                } else {
                    Ok(Self::placeholder_image())
                }
            }
        }
    }

    async fn check_health(&self) -> Result<bool, ImageGenError> {
        Ok(true)
    }
}

/// Text provider double that replays scripted suggestion batches and
/// records the contexts and counts it was asked for.
pub struct ScriptedTextGen {
    responses: Mutex<VecDeque<Result<Vec<SuggestionDraft>, TextGenError>>>,
    requested_counts: Mutex<Vec<u32>>,
    contexts: Mutex<Vec<SuggestionContext>>,
    has_credential: bool,
}

impl ScriptedTextGen {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requested_counts: Mutex::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
            has_credential: true,
        }
    }

    pub fn without_credential(mut self) -> Self {
        self.has_credential = false;
        self
    }

    pub fn push_batch(self, drafts: Vec<SuggestionDraft>) -> Self {
        self.push(Ok(drafts))
    }

    pub fn push_error(self, error: TextGenError) -> Self {
        self.push(Err(error))
    }

    fn push(self, response: Result<Vec<SuggestionDraft>, TextGenError>) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
        self
    }

    pub fn requested_counts(&self) -> Vec<u32> {
        self.requested_counts
            .lock()
            .map(|counts| counts.clone())
            .unwrap_or_default()
    }

    pub fn contexts(&self) -> Vec<SuggestionContext> {
        self.contexts
            .lock()
            .map(|contexts| contexts.clone())
            .unwrap_or_default()
    }

    /// Convenience draft builder for tests.
    pub fn vocab_draft(front: &str, translation: &str) -> SuggestionDraft {
        SuggestionDraft {
            front_text: front.to_string(),
            kind: CardKind::Vocabulary,
            back: CardBack::Vocabulary {
                translation: translation.to_string(),
                example_sentence: None,
            },
            image_prompt: Some(format!("an illustration of {front}")),
        }
    }
}

impl Default for ScriptedTextGen {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenPort for ScriptedTextGen {
    fn has_valid_credential(&self) -> bool {
        self.has_credential
    }

    async fn generate_suggestions(
        &self,
        context: &SuggestionContext,
        count: u32,
    ) -> Result<Vec<SuggestionDraft>, TextGenError> {
        if let Ok(mut counts) = self.requested_counts.lock() {
            counts.push(count);
        }
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.push(context.clone());
        }

        match self.responses.lock() {
            Ok(mut responses) => responses.pop_front().unwrap_or_else(|| Ok(Vec::new())),
            Err(_) => Ok(Vec::new()),
        }
    }

    async fn generate_back_content(
        &self,
        front_text: &str,
        _deck_context: &str,
        kind: CardKind,
    ) -> Result<BackContent, TextGenError> {
        let back = match kind {
            CardKind::Vocabulary => CardBack::Vocabulary {
                translation: format!("{front_text} (translated)"),
                example_sentence: None,
            },
            CardKind::Conjugation => CardBack::Conjugation {
                forms: vec![("yo".to_string(), format!("{front_text}o"))],
            },
            CardKind::Fact => CardBack::Fact {
                text: format!("A fact about {front_text}"),
            },
        };
        Ok(BackContent {
            back,
            image_prompt: Some(format!("an illustration of {front_text}")),
        })
    }
}
