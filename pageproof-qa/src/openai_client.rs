//! `reqwest`-backed [`EmbeddingClient`] and [`ChatClient`] implementation
//! against an OpenAI-compatible REST API: a small `Config` held behind an
//! `Arc`, a builder for base URL and API key, and one async function per
//! endpoint.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::answer::{
    ChatClient, ChatCompletionRequest, ProviderCallError, ProviderOutcome, ResponsesRequest,
};
use crate::embedding::EmbeddingClient;
use crate::error::{QaError, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug)]
struct Config {
    base_url: String,
    api_key: String,
}

/// An OpenAI (or OpenAI-compatible) REST client implementing both the
/// embedding and chat-completion provider contracts used by this crate.
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: Arc<Config>,
}

impl OpenAiClient {
    /// Builds a client for the default `api.openai.com` endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::builder(api_key).build()
    }

    #[must_use]
    pub fn builder(api_key: impl Into<String>) -> OpenAiClientBuilder {
        OpenAiClientBuilder { api_key: api_key.into(), base_url: None }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }
}

/// Builder for [`OpenAiClient`].
pub struct OpenAiClientBuilder {
    api_key: String,
    base_url: Option<String>,
}

impl OpenAiClientBuilder {
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn build(self) -> OpenAiClient {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        OpenAiClient {
            http,
            config: Arc::new(Config {
                base_url: self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                api_key: self.api_key,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    index: usize,
}

impl EmbeddingClient for OpenAiClient {
    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
        model: &'a str,
        dimensions: Option<usize>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>>> + Send + 'a>> {
        Box::pin(async move {
            let request = EmbeddingRequest { model, input: texts, dimensions };
            let response = self
                .http
                .post(self.url("/embeddings"))
                .bearer_auth(&self.config.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| QaError::Provider(e.to_string()))?;

            let status = response.status();
            let body = response.text().await.map_err(|e| QaError::Provider(e.to_string()))?;
            if !status.is_success() {
                return Err(QaError::Provider(format!("embeddings request failed ({status}): {body}")));
            }

            let mut parsed: EmbeddingResponse =
                serde_json::from_str(&body).map_err(|e| QaError::Provider(e.to_string()))?;
            parsed.data.sort_by_key(|item| item.index);
            Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatMessagePayload<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormatPayload {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionPayload<'a> {
    model: &'a str,
    messages: Vec<ChatMessagePayload<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormatPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResponsesPayload<'a> {
    model: &'a str,
    input: Vec<ChatMessagePayload<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<ResponsesOutputItem>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputItem {
    #[serde(default)]
    content: Vec<ResponsesContentPart>,
}

#[derive(Debug, Deserialize)]
struct ResponsesContentPart {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

async fn provider_error_from_response(response: reqwest::Response) -> ProviderCallError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.as_u16() == 400 || status.is_client_error() {
        ProviderCallError::BadRequest(body)
    } else {
        ProviderCallError::Other(format!("request failed ({status}): {body}"))
    }
}

impl ChatClient for OpenAiClient {
    fn chat_completion<'a>(
        &'a self,
        request: &'a ChatCompletionRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<ProviderOutcome, ProviderCallError>> + Send + 'a>>
    {
        Box::pin(async move {
            let payload = ChatCompletionPayload {
                model: &request.model,
                messages: request
                    .messages
                    .iter()
                    .map(|m| ChatMessagePayload { role: &m.role, content: &m.content })
                    .collect(),
                response_format: request.json_format.then_some(ResponseFormatPayload { kind: "json_object" }),
                temperature: request.temperature,
            };

            let response = self
                .http
                .post(self.url("/chat/completions"))
                .bearer_auth(&self.config.api_key)
                .json(&payload)
                .send()
                .await
                .map_err(|e| ProviderCallError::Other(e.to_string()))?;

            if !response.status().is_success() {
                return Err(provider_error_from_response(response).await);
            }

            let body = response.text().await.map_err(|e| ProviderCallError::Other(e.to_string()))?;
            let parsed: ChatCompletionResponse =
                serde_json::from_str(&body).map_err(|e| ProviderCallError::Other(e.to_string()))?;
            let text = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();
            Ok(ProviderOutcome { text })
        })
    }

    fn responses<'a>(
        &'a self,
        request: &'a ResponsesRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<ProviderOutcome, ProviderCallError>> + Send + 'a>>
    {
        Box::pin(async move {
            let payload = ResponsesPayload {
                model: &request.model,
                input: request.input.iter().map(|m| ChatMessagePayload { role: &m.role, content: &m.content }).collect(),
                temperature: request.temperature,
            };

            let response = self
                .http
                .post(self.url("/responses"))
                .bearer_auth(&self.config.api_key)
                .json(&payload)
                .send()
                .await
                .map_err(|e| ProviderCallError::Other(e.to_string()))?;

            if !response.status().is_success() {
                return Err(provider_error_from_response(response).await);
            }

            let body = response.text().await.map_err(|e| ProviderCallError::Other(e.to_string()))?;
            let parsed: ResponsesResponse =
                serde_json::from_str(&body).map_err(|e| ProviderCallError::Other(e.to_string()))?;

            if let Some(text) = parsed.output_text {
                return Ok(ProviderOutcome { text });
            }

            let text = parsed
                .output
                .into_iter()
                .flat_map(|item| item.content)
                .filter(|part| part.kind == "output_text")
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("");
            Ok(ProviderOutcome { text })
        })
    }
}
