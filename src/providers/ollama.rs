//! Local models served by an Ollama daemon (`POST /api/chat`).
//!
//! Streamed replies arrive as newline-delimited JSON, one chat chunk per
//! line, the last one flagged `done`.

use serde::{Deserialize, Serialize};

use super::sse::{spawn_text_stream, Framing};
use super::{
    check_http_response, ensure_success, CompletionRequest, CompletionResponse, ContentPart,
    LlmProvider, ProviderError, Role, StopReason, TextStream, UsageStats,
};

/// Where a stock Ollama install listens.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// `/api/chat` body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct OllamaRequest {
    /// Local model tag, e.g. `qwen3:8b`.
    pub model: String,
    /// System turn first, then the conversation.
    pub messages: Vec<OllamaMessage>,
    /// `false` asks for one JSON document instead of NDJSON.
    pub stream: bool,
    /// Sampling knobs; omitted when nothing is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OllamaOptions>,
}

/// One chat turn. Ollama wants a flat string per turn.
#[doc(hidden)]
#[derive(Debug, Serialize, Deserialize)]
pub struct OllamaMessage {
    /// `system`, `user` or `assistant`.
    pub role: String,
    /// Turn text.
    pub content: String,
}

/// Sampling knobs under `options`.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct OllamaOptions {
    /// Output token cap (`num_predict`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// A full reply, or one NDJSON line of a streamed one.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OllamaResponse {
    /// Assistant turn (partial when streaming).
    pub message: OllamaReply,
    /// Tag of the model that answered.
    #[serde(default)]
    pub model: String,
    /// `stop` or `length`; only on the final chunk.
    #[serde(default)]
    pub done_reason: Option<String>,
    /// Prompt tokens evaluated.
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    /// Tokens generated.
    #[serde(default)]
    pub eval_count: Option<u32>,
}

/// Assistant turn inside a reply.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OllamaReply {
    /// Visible text.
    #[serde(default)]
    pub content: String,
    /// Reasoning emitted by thinking models.
    #[serde(default)]
    pub thinking: Option<String>,
}

/// Client for one model on one Ollama host.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    model_spec: String,
    /// Local model tag sent in each request.
    #[doc(hidden)]
    pub model: String,
    /// Daemon URL without a trailing slash.
    #[doc(hidden)]
    pub base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Talk to `model_name` on [`DEFAULT_OLLAMA_URL`].
    pub fn new(model_spec: String, model_name: String) -> Self {
        Self {
            model_spec,
            model: model_name,
            base_url: DEFAULT_OLLAMA_URL.to_owned(),
            client: reqwest::Client::new(),
        }
    }

    /// Use another daemon.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_owned();
        self
    }

    async fn send(&self, body: &OllamaRequest) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        Ok(self.client.post(url).json(body).send().await?)
    }
}

/// Flatten a completion request into Ollama turns.
///
/// Parts of a multi-part message are joined with newlines; the system
/// instruction becomes a leading `system` turn.
#[doc(hidden)]
pub fn build_request(model: &str, request: &CompletionRequest, stream: bool) -> OllamaRequest {
    let system = request.system.iter().map(|text| OllamaMessage {
        role: "system".to_owned(),
        content: text.clone(),
    });
    let turns = request.messages.iter().map(|msg| OllamaMessage {
        role: match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
        .to_owned(),
        content: msg.content.text(),
    });

    let options = (request.max_tokens.is_some() || request.temperature.is_some()).then(|| {
        OllamaOptions {
            num_predict: request.max_tokens,
            temperature: request.temperature,
        }
    });

    OllamaRequest {
        model: model.to_owned(),
        messages: system.chain(turns).collect(),
        stream,
        options,
    }
}

fn decode(body: &str) -> Result<OllamaResponse, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))
}

/// Decode a non-streamed reply. Thinking output becomes a reasoning part
/// ahead of the visible text.
///
/// # Errors
///
/// Returns `ProviderError::Parse` when the body is not a chat reply.
#[doc(hidden)]
pub fn parse_response(body: &str) -> Result<CompletionResponse, ProviderError> {
    let reply = decode(body)?;
    let OllamaReply { content, thinking } = reply.message;

    let reasoning = thinking
        .filter(|t| !t.is_empty())
        .map(|text| ContentPart::Reasoning { text });
    let visible = Some(content)
        .filter(|t| !t.is_empty())
        .map(|text| ContentPart::Text { text });

    let stop_reason = match reply.done_reason.as_deref() {
        None | Some("stop") => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        Some(reason) => StopReason::Other(reason.to_owned()),
    };

    Ok(CompletionResponse {
        content: reasoning.into_iter().chain(visible).collect(),
        stop_reason,
        usage: UsageStats {
            input_tokens: reply.prompt_eval_count.unwrap_or_default(),
            output_tokens: reply.eval_count.unwrap_or_default(),
        },
        model: reply.model,
    })
}

/// Visible text of one NDJSON line; the closing `done` line is usually empty.
///
/// # Errors
///
/// Returns `ProviderError::Parse` when the line is not a chat chunk.
#[doc(hidden)]
pub fn parse_stream_chunk(payload: &str) -> Result<Option<String>, ProviderError> {
    let chunk = decode(payload)?;
    Ok(Some(chunk.message.content).filter(|t| !t.is_empty()))
}

#[async_trait::async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let response = self.send(&build_request(&self.model, &request, false)).await?;
        parse_response(&check_http_response(response).await?)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, ProviderError> {
        let response = self.send(&build_request(&self.model, &request, true)).await?;
        let response = ensure_success(response).await?;
        Ok(spawn_text_stream(response, Framing::Ndjson, parse_stream_chunk))
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn model_id(&self) -> &str {
        &self.model_spec
    }
}
