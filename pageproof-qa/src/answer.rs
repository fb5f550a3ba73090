//! Cited answer generation against an OpenAI-compatible chat API (C5).
//!
//! Handles the provider-quirk retry ladder (a small state machine that
//! escalates across response formats and prompt variants), defensive JSON
//! parsing, and the post-generation confidence gates.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::{QaError, Result};
use crate::retrieval::RetrievedChunk;

/// One chat message.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub json_format: bool,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: Vec<ChatMessage>,
    pub temperature: Option<f64>,
}

/// The resolved text of a provider call: for chat completions, the message
/// content; for the Responses API, `output_text` if present, else the
/// concatenated text parts of the structured output.
#[derive(Debug, Clone)]
pub struct ProviderOutcome {
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum ProviderCallError {
    /// A 4xx the provider attributes to a specific request field; callers
    /// inspect the message to decide which axis of the retry ladder to
    /// narrow next.
    BadRequest(String),
    Other(String),
}

impl std::fmt::Display for ProviderCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderCallError::BadRequest(m) | ProviderCallError::Other(m) => write!(f, "{m}"),
        }
    }
}

/// Chat-completions provider contract. Object-safe so tests can substitute
/// a scripted fake.
pub trait ChatClient: Send + Sync {
    fn chat_completion<'a>(
        &'a self,
        request: &'a ChatCompletionRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<ProviderOutcome, ProviderCallError>>
        + Send + 'a>>;

    fn responses<'a>(
        &'a self,
        request: &'a ResponsesRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<ProviderOutcome, ProviderCallError>>
        + Send + 'a>>;
}

/// One chunk of assembled context, labeled for the prompt.
#[derive(Debug, Clone)]
pub struct ContextChunk {
    pub chunk_id: Uuid,
    pub page_label: String,
    pub text: String,
}

/// Assembles the top `max_context_chunks` retrieved chunks into prompt
/// context entries, each labeled with its UUID and page range.
#[must_use]
pub fn build_context(retrieved: &[RetrievedChunk], max_context_chunks: usize) -> Vec<ContextChunk> {
    retrieved
        .iter()
        .take(max_context_chunks)
        .map(|r| ContextChunk {
            chunk_id: r.chunk.id,
            page_label: r.chunk.page_label(),
            text: r.chunk.text.clone(),
        })
        .collect()
}

const SYSTEM_PROMPT: &str = "You answer questions using only the supplied document excerpts. \
Use only the supplied chunks; do not use outside knowledge. If the question asks who signed or \
performed something, list every supported name. Respond strictly as JSON of the shape \
{\"answer\": \"...\", \"citations\": [{\"chunk_id\": \"<uuid>\"}]} and nothing else.";

#[must_use]
pub fn build_messages(question: &str, context: &[ContextChunk]) -> Vec<ChatMessage> {
    let mut body = String::new();
    for entry in context {
        body.push_str(&format!(
            "chunk_id: {} ({})\n{}\n\n",
            entry.chunk_id, entry.page_label, entry.text
        ));
    }
    let user = format!("Document excerpts:\n\n{body}Question: {question}");
    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}

/// GPT-5-family models don't accept an explicit `temperature`.
#[must_use]
pub fn default_temperature(model: &str) -> Option<f64> {
    if model.starts_with("gpt-5") {
        None
    } else {
        Some(0.1)
    }
}

#[derive(Debug, Clone, Default)]
struct RetryState {
    json_format: bool,
    temperature: Option<f64>,
    use_responses: bool,
}

/// Runs the retry ladder against `client` and returns the raw provider text.
///
/// 1. Chat-completions with JSON format + temperature.
/// 2. On a bad request mentioning `response_format`, drop it and retry.
/// 3. On a bad request mentioning `temperature`, drop it and retry.
/// 4. On a bad request signalling the Responses API is required, switch to
///    it, preserving the same temperature rule.
pub async fn call_with_retry_ladder(
    client: &dyn ChatClient,
    model: &str,
    messages: &[ChatMessage],
) -> Result<String> {
    let mut state = RetryState { json_format: true, temperature: default_temperature(model), use_responses: false };

    for _ in 0..6 {
        let outcome = if state.use_responses {
            let request = ResponsesRequest {
                model: model.to_string(),
                input: messages.to_vec(),
                temperature: state.temperature,
            };
            client.responses(&request).await
        } else {
            let request = ChatCompletionRequest {
                model: model.to_string(),
                messages: messages.to_vec(),
                json_format: state.json_format,
                temperature: state.temperature,
            };
            client.chat_completion(&request).await
        };

        match outcome {
            Ok(result) => return Ok(result.text),
            Err(ProviderCallError::Other(msg)) => return Err(QaError::Provider(msg)),
            Err(ProviderCallError::BadRequest(msg)) => {
                let lower = msg.to_lowercase();
                if !state.use_responses && state.json_format && lower.contains("response_format") {
                    state.json_format = false;
                    continue;
                }
                if state.temperature.is_some() && lower.contains("temperature") {
                    state.temperature = None;
                    continue;
                }
                if !state.use_responses && lower.contains("responses") {
                    state.use_responses = true;
                    continue;
                }
                return Err(QaError::Provider(msg));
            }
        }
    }

    Err(QaError::Provider("exhausted provider retry ladder".to_string()))
}

#[derive(Debug, Deserialize, Default)]
struct RawPayload {
    answer: Option<String>,
    citations: Option<Vec<RawCitation>>,
}

#[derive(Debug, Deserialize)]
struct RawCitation {
    chunk_id: Option<String>,
}

/// A defensively parsed model answer.
#[derive(Debug, Clone, Default)]
pub struct ParsedAnswer {
    pub answer: String,
    pub citations: Vec<Uuid>,
}

/// Parses the model's raw text defensively: direct JSON parse first; else
/// slice from the first `{` to the last `}`; else treat as an empty
/// payload. Citations are filtered to valid UUIDs, order-preserved,
/// de-duplicated.
#[must_use]
pub fn parse_answer_payload(raw: &str) -> ParsedAnswer {
    let payload = serde_json::from_str::<RawPayload>(raw)
        .ok()
        .or_else(|| {
            let start = raw.find('{')?;
            let end = raw.rfind('}')?;
            if end < start {
                return None;
            }
            serde_json::from_str::<RawPayload>(&raw[start..=end]).ok()
        })
        .unwrap_or_default();

    let answer = payload.answer.unwrap_or_default().trim().to_string();

    let mut seen = HashSet::new();
    let mut citations = Vec::new();
    for citation in payload.citations.unwrap_or_default() {
        let Some(id_str) = citation.chunk_id else { continue };
        let Ok(id) = Uuid::parse_str(&id_str) else { continue };
        if seen.insert(id) {
            citations.push(id);
        }
    }

    ParsedAnswer { answer, citations }
}

const UNCERTAINTY_MARKERS: &[&str] = &[
    "not enough evidence",
    "cannot determine",
    "can't determine",
    "insufficient",
    "uncertain",
    "not clearly supported",
];

/// Whether the answer text contains any of the fixed uncertainty markers.
#[must_use]
pub fn has_uncertainty_marker(answer: &str) -> bool {
    let lower = answer.to_lowercase();
    UNCERTAINTY_MARKERS.iter().any(|m| lower.contains(m))
}

/// Filters `citations` to those that name a chunk present in `context`,
/// preserving order and de-duplicating.
#[must_use]
pub fn filter_citations_to_context(citations: &[Uuid], context: &[ContextChunk]) -> Vec<Uuid> {
    let valid: HashSet<Uuid> = context.iter().map(|c| c.chunk_id).collect();
    let mut seen = HashSet::new();
    citations
        .iter()
        .filter(|id| valid.contains(id) && seen.insert(**id))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_temperature_omitted_for_gpt5_family() {
        assert_eq!(default_temperature("gpt-5-mini"), None);
        assert_eq!(default_temperature("gpt-4o"), Some(0.1));
    }

    #[test]
    fn parse_direct_json() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"answer": " Yes. ", "citations": [{{"chunk_id": "{id}"}}]}}"#);
        let parsed = parse_answer_payload(&raw);
        assert_eq!(parsed.answer, "Yes.");
        assert_eq!(parsed.citations, vec![id]);
    }

    #[test]
    fn parse_slices_surrounding_prose() {
        let id = Uuid::new_v4();
        let raw = format!(r#"Sure, here you go: {{"answer": "Yes", "citations": [{{"chunk_id": "{id}"}}]}} thanks!"#);
        let parsed = parse_answer_payload(&raw);
        assert_eq!(parsed.answer, "Yes");
        assert_eq!(parsed.citations, vec![id]);
    }

    #[test]
    fn parse_falls_back_to_empty_payload() {
        let parsed = parse_answer_payload("not json at all");
        assert_eq!(parsed.answer, "");
        assert!(parsed.citations.is_empty());
    }

    #[test]
    fn s6_invalid_citation_filtered_leaving_only_valid_ones() {
        let c1 = Uuid::new_v4();
        let context = vec![ContextChunk { chunk_id: c1, page_label: "pages 1".to_string(), text: String::new() }];
        let bogus = Uuid::new_v4();
        let filtered = filter_citations_to_context(&[c1, bogus], &context);
        assert_eq!(filtered, vec![c1]);
    }

    #[test]
    fn uncertainty_markers_detected_case_insensitively() {
        assert!(has_uncertainty_marker("I am Uncertain about this."));
        assert!(has_uncertainty_marker("This is Not Clearly Supported by the text."));
        assert!(!has_uncertainty_marker("The contract was signed by Dr. Patel."));
    }

    struct ScriptedClient {
        responses: std::sync::Mutex<Vec<std::result::Result<ProviderOutcome, ProviderCallError>>>,
    }

    impl ChatClient for ScriptedClient {
        fn chat_completion<'a>(
            &'a self,
            _request: &'a ChatCompletionRequest,
        ) -> Pin<Box<dyn Future<Output = std::result::Result<ProviderOutcome, ProviderCallError>> + Send + 'a>>
        {
            let next = self.responses.lock().unwrap().remove(0);
            Box::pin(async move { next })
        }

        fn responses<'a>(
            &'a self,
            _request: &'a ResponsesRequest,
        ) -> Pin<Box<dyn Future<Output = std::result::Result<ProviderOutcome, ProviderCallError>> + Send + 'a>>
        {
            let next = self.responses.lock().unwrap().remove(0);
            Box::pin(async move { next })
        }
    }

    #[tokio::test]
    async fn retry_ladder_drops_response_format_then_succeeds() {
        let client = ScriptedClient {
            responses: std::sync::Mutex::new(vec![
                Err(ProviderCallError::BadRequest("unknown parameter: response_format".to_string())),
                Ok(ProviderOutcome { text: r#"{"answer":"ok","citations":[]}"#.to_string() }),
            ]),
        };
        let messages = vec![ChatMessage::user("q")];
        let result = call_with_retry_ladder(&client, "gpt-4o", &messages).await.unwrap();
        assert!(result.contains("\"ok\""));
    }

    #[tokio::test]
    async fn retry_ladder_falls_back_to_responses_api() {
        let client = ScriptedClient {
            responses: std::sync::Mutex::new(vec![
                Err(ProviderCallError::BadRequest("please use the responses api".to_string())),
                Ok(ProviderOutcome { text: r#"{"answer":"ok","citations":[]}"#.to_string() }),
            ]),
        };
        let messages = vec![ChatMessage::user("q")];
        let result = call_with_retry_ladder(&client, "gpt-4o", &messages).await.unwrap();
        assert!(result.contains("\"ok\""));
    }

    #[tokio::test]
    async fn retry_ladder_surfaces_unrecoverable_error() {
        let client = ScriptedClient {
            responses: std::sync::Mutex::new(vec![Err(ProviderCallError::Other("boom".to_string()))]),
        };
        let messages = vec![ChatMessage::user("q")];
        let result = call_with_retry_ladder(&client, "gpt-4o", &messages).await;
        assert!(result.is_err());
    }
}
