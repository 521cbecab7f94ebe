//! Ollama LLM client (OpenAI-compatible API)
//!
//! Implements TextGenPort: suggestion drafting and back-content generation
//! for cards, with tolerant parsing of the model's JSON replies.

use async_trait::async_trait;
use regex_lite::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use recall_domain::{CardBack, CardKind};

use crate::infrastructure::json_repair::repair_truncated_array;
use crate::infrastructure::ports::{
    BackContent, SuggestionContext, SuggestionDraft, TextGenError, TextGenPort,
};

/// Default Ollama base URL.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Default model for Ollama.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

// Models love wrapping JSON in markdown fences; strip them before parsing.
static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("valid regex"));

/// Client for Ollama's OpenAI-compatible API
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        // LLM requests can be slow
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create client from environment variables.
    pub fn from_env() -> Self {
        let base_url = std::env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_OLLAMA_BASE_URL.to_string());
        let model =
            std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string());
        Self::new(&base_url, &model)
    }

    /// Cheap reachability check against the models endpoint, for startup
    /// diagnostics. Generation calls report their own errors either way.
    pub async fn check_health(&self) -> Result<bool, TextGenError> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await
            .map_err(|e| TextGenError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String, TextGenError> {
        let api_request = OpenAIChatRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: Some(0.8),
            max_tokens: None,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| TextGenError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TextGenError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let api_response: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| TextGenError::MalformedResponse(e.to_string()))?;

        api_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| TextGenError::MalformedResponse("No choices in LLM response".to_string()))
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_BASE_URL, DEFAULT_OLLAMA_MODEL)
    }
}

#[async_trait]
impl TextGenPort for OllamaClient {
    fn has_valid_credential(&self) -> bool {
        // Local Ollama needs no credential; a configured base URL is enough.
        !self.base_url.is_empty()
    }

    async fn generate_suggestions(
        &self,
        context: &SuggestionContext,
        count: u32,
    ) -> Result<Vec<SuggestionDraft>, TextGenError> {
        let system = "You draft flashcards for a study app. Reply with ONLY a JSON array, \
                      no prose. Each element: {\"front\": string, \"type\": \
                      \"vocabulary\"|\"conjugation\"|\"fact\", \"back\": object, \
                      \"image_prompt\": string}. Vocabulary backs: {\"translation\", \
                      \"example_sentence\"}. Conjugation backs: {\"forms\": {name: form}}. \
                      Fact backs: {\"text\"}.";
        let user = build_suggestion_prompt(context, count);

        let raw = self.chat(system, &user).await?;
        parse_suggestion_drafts(&raw)
    }

    async fn generate_back_content(
        &self,
        front_text: &str,
        deck_context: &str,
        kind: CardKind,
    ) -> Result<BackContent, TextGenError> {
        let system = "You write the back of a single flashcard. Reply with ONLY a JSON \
                      object: {\"back\": object, \"image_prompt\": string}.";
        let user = format!(
            "Deck: {deck_context}\nFront: {front_text}\nCard type: {kind}\n\
             Produce the back content for this card."
        );

        let raw = self.chat(system, &user).await?;
        let cleaned = strip_fences(&raw);

        let wire: BackContentWire = serde_json::from_str(cleaned.trim())
            .map_err(|e| TextGenError::MalformedResponse(e.to_string()))?;
        let back = wire_back_to_card_back(kind, wire.back)?;

        Ok(BackContent {
            back,
            image_prompt: wire.image_prompt.filter(|p| !p.trim().is_empty()),
        })
    }
}

fn build_suggestion_prompt(context: &SuggestionContext, count: u32) -> String {
    let format_pairs = |pairs: &[(String, CardKind)]| {
        if pairs.is_empty() {
            "(none)".to_string()
        } else {
            pairs
                .iter()
                .map(|(front, kind)| format!("{front} ({kind})"))
                .collect::<Vec<_>>()
                .join(", ")
        }
    };

    format!(
        "Deck: {name}\nDescription: {description}\n\n\
         Draft {count} new flashcard suggestions for this deck.\n\
         Do NOT repeat any of these.\n\
         Existing cards: {existing}\n\
         Already suggested: {suggested}\n\
         Previously rejected: {deleted}",
        name = context.deck_name,
        description = context.deck_description,
        existing = format_pairs(&context.existing),
        suggested = format_pairs(&context.suggested),
        deleted = format_pairs(&context.deleted),
    )
}

fn strip_fences(raw: &str) -> String {
    if let Some(caps) = FENCE_RE.captures(raw) {
        if let Some(inner) = caps.get(1) {
            return inner.as_str().to_string();
        }
    }
    raw.to_string()
}

/// Parse the model's suggestion array, repairing a truncated reply before
/// giving up. Individually malformed elements are skipped with a warning;
/// an unparseable batch is an error so the whole cycle can be abandoned.
fn parse_suggestion_drafts(raw: &str) -> Result<Vec<SuggestionDraft>, TextGenError> {
    let cleaned = strip_fences(raw);

    let elements: Vec<serde_json::Value> = match serde_json::from_str(cleaned.trim()) {
        Ok(values) => values,
        Err(first_err) => {
            let repaired = repair_truncated_array(&cleaned).ok_or_else(|| {
                TextGenError::MalformedResponse(format!("unrepairable suggestion batch: {first_err}"))
            })?;
            tracing::warn!(error = %first_err, "Repaired truncated suggestion batch");
            serde_json::from_str(&repaired)
                .map_err(|e| TextGenError::MalformedResponse(e.to_string()))?
        }
    };

    let mut drafts = Vec::with_capacity(elements.len());
    for element in elements {
        match parse_one_draft(element) {
            Ok(draft) => drafts.push(draft),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed suggestion draft");
            }
        }
    }
    Ok(drafts)
}

fn parse_one_draft(value: serde_json::Value) -> Result<SuggestionDraft, TextGenError> {
    let wire: SuggestionDraftWire = serde_json::from_value(value)
        .map_err(|e| TextGenError::MalformedResponse(e.to_string()))?;
    let kind: CardKind = wire
        .kind
        .parse()
        .map_err(|e| TextGenError::MalformedResponse(format!("{e}")))?;
    let back = wire_back_to_card_back(kind, wire.back)?;

    Ok(SuggestionDraft {
        front_text: wire.front,
        kind,
        back,
        image_prompt: wire.image_prompt.filter(|p| !p.trim().is_empty()),
    })
}

fn wire_back_to_card_back(
    kind: CardKind,
    back: serde_json::Value,
) -> Result<CardBack, TextGenError> {
    let malformed = |e: serde_json::Error| TextGenError::MalformedResponse(e.to_string());

    match kind {
        CardKind::Vocabulary => {
            let wire: VocabularyBackWire = serde_json::from_value(back).map_err(malformed)?;
            Ok(CardBack::Vocabulary {
                translation: wire.translation,
                example_sentence: wire.example_sentence,
            })
        }
        CardKind::Conjugation => {
            let wire: ConjugationBackWire = serde_json::from_value(back).map_err(malformed)?;
            Ok(CardBack::Conjugation {
                forms: wire.forms.into_iter().collect(),
            })
        }
        CardKind::Fact => {
            let wire: FactBackWire = serde_json::from_value(back).map_err(malformed)?;
            Ok(CardBack::Fact { text: wire.text })
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct SuggestionDraftWire {
    front: String,
    #[serde(rename = "type")]
    kind: String,
    back: serde_json::Value,
    #[serde(default)]
    image_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BackContentWire {
    back: serde_json::Value,
    #[serde(default)]
    image_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VocabularyBackWire {
    translation: String,
    #[serde(default)]
    example_sentence: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConjugationBackWire {
    forms: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FactBackWire {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_batch() {
        let raw = r#"[
            {"front":"Casa","type":"vocabulary","back":{"translation":"House","example_sentence":"Mi casa es grande."},"image_prompt":"a cozy house"},
            {"front":"ser","type":"conjugation","back":{"forms":{"yo":"soy","tu":"eres"}}},
            {"front":"Madrid","type":"fact","back":{"text":"Capital of Spain"},"image_prompt":""}
        ]"#;

        let drafts = parse_suggestion_drafts(raw).expect("batch parses");
        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[0].kind, CardKind::Vocabulary);
        assert_eq!(drafts[0].image_prompt.as_deref(), Some("a cozy house"));
        // Empty image prompts normalize to None
        assert_eq!(drafts[2].image_prompt, None);
        match &drafts[1].back {
            CardBack::Conjugation { forms } => assert_eq!(forms.len(), 2),
            other => panic!("unexpected back: {other:?}"),
        }
    }

    #[test]
    fn strips_markdown_fences() {
        let raw = "```json\n[{\"front\":\"a\",\"type\":\"fact\",\"back\":{\"text\":\"b\"}}]\n```";
        let drafts = parse_suggestion_drafts(raw).expect("fenced batch parses");
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].front_text, "a");
    }

    #[test]
    fn repairs_truncated_batch() {
        let raw = r#"[{"front":"a","type":"vocabulary","back":{"translation":"x"}},{"front":"b"#;
        let drafts = parse_suggestion_drafts(raw).expect("truncated batch repairs");
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].front_text, "a");
    }

    #[test]
    fn unrepairable_batch_is_an_error() {
        let result = parse_suggestion_drafts("I cannot help with that.");
        assert!(matches!(result, Err(TextGenError::MalformedResponse(_))));
    }

    #[test]
    fn malformed_elements_are_skipped_not_fatal() {
        let raw = r#"[
            {"front":"good","type":"fact","back":{"text":"ok"}},
            {"front":"bad","type":"mystery","back":{}}
        ]"#;
        let drafts = parse_suggestion_drafts(raw).expect("batch parses");
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].front_text, "good");
    }
}
