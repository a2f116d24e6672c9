//! OpenAI-compatible chat completions (`POST /v1/chat/completions`).
//!
//! Works against api.openai.com and any server speaking the same dialect
//! (set `llm.base_url`). Streaming uses server-sent events terminated by
//! `data: [DONE]`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::sse::{spawn_text_stream, Framing};
use super::{
    check_http_response, ensure_success, CompletionRequest, CompletionResponse, ContentPart,
    LlmProvider, MessageContent, ProviderError, Role, StopReason, TextStream, UsageStats,
};

/// Public OpenAI host.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Chat completions body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct OpenAiRequest {
    /// Model name without the `openai/` prefix.
    pub model: String,
    /// System turn first, then the conversation.
    pub messages: Vec<OpenAiMessage>,
    /// Output token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Ask for SSE; left out of the body when `false`.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

/// One chat turn.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct OpenAiMessage {
    /// `system`, `user` or `assistant`.
    pub role: String,
    /// A string, or an array of `{"type": "text", "text": ...}` parts.
    pub content: Value,
}

/// Non-streamed reply.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiResponse {
    /// Candidate replies; only the first is read.
    pub choices: Vec<OpenAiChoice>,
    /// Dated model name that answered.
    pub model: String,
    /// Token accounting, when the server reports it.
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

/// One candidate reply.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiChoice {
    /// Assistant turn.
    pub message: OpenAiDelta,
    /// `stop`, `length`, `content_filter`, ...
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Assistant text, whole or incremental.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiDelta {
    /// Text; absent on role-only stream chunks.
    #[serde(default)]
    pub content: Option<String>,
}

/// Token accounting.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiUsage {
    /// Prompt side.
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    /// Completion side.
    #[serde(default)]
    pub completion_tokens: Option<u32>,
}

/// One SSE event of a streamed reply.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiStreamChunk {
    /// Incremental candidates.
    #[serde(default)]
    pub choices: Vec<OpenAiStreamChoice>,
}

/// Incremental candidate.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiStreamChoice {
    /// Text added by this event.
    pub delta: OpenAiDelta,
}

/// Client for one model on an OpenAI-compatible host.
#[derive(Clone)]
pub struct OpenAiProvider {
    model_spec: String,
    model_name: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("model_spec", &self.model_spec)
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiProvider {
    /// Talk to `model_name` on [`DEFAULT_OPENAI_URL`] with `api_key`.
    pub fn new(model_spec: String, model_name: String, api_key: String) -> Self {
        Self {
            model_spec,
            model_name,
            api_key,
            base_url: DEFAULT_OPENAI_URL.to_owned(),
            client: reqwest::Client::new(),
        }
    }

    /// Use another compatible host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_owned();
        self
    }

    async fn send(&self, body: &OpenAiRequest) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        Ok(self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?)
    }
}

fn turn_content(content: &MessageContent) -> Value {
    match content {
        MessageContent::Text(text) => Value::String(text.clone()),
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(json!({"type": "text", "text": text})),
                ContentPart::Reasoning { .. } => None,
            })
            .collect(),
    }
}

/// Map a completion request onto chat turns. Reasoning parts are dropped;
/// the thinking budget has no counterpart here.
#[doc(hidden)]
pub fn build_request(model: &str, request: &CompletionRequest, stream: bool) -> OpenAiRequest {
    let system = request.system.iter().map(|text| OpenAiMessage {
        role: "system".to_owned(),
        content: Value::String(text.clone()),
    });
    let turns = request.messages.iter().map(|msg| OpenAiMessage {
        role: match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
        .to_owned(),
        content: turn_content(&msg.content),
    });

    OpenAiRequest {
        model: model.to_owned(),
        messages: system.chain(turns).collect(),
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        stream,
    }
}

/// Decode a non-streamed reply from its first choice.
///
/// # Errors
///
/// Returns `ProviderError::Parse` for malformed JSON or an empty
/// `choices` array.
#[doc(hidden)]
pub fn parse_response(body: &str) -> Result<CompletionResponse, ProviderError> {
    let reply: OpenAiResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    let Some(choice) = reply.choices.into_iter().next() else {
        return Err(ProviderError::Parse("response contained no choices".to_owned()));
    };

    let stop_reason = match choice.finish_reason.as_deref() {
        None | Some("stop") => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        Some("content_filter") => StopReason::Safety,
        Some(reason) => StopReason::Other(reason.to_owned()),
    };
    let usage = reply
        .usage
        .map(|u| UsageStats {
            input_tokens: u.prompt_tokens.unwrap_or_default(),
            output_tokens: u.completion_tokens.unwrap_or_default(),
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        content: choice
            .message
            .content
            .into_iter()
            .map(|text| ContentPart::Text { text })
            .collect(),
        stop_reason,
        usage,
        model: reply.model,
    })
}

/// Text added by one SSE payload; `[DONE]` and role-only events add none.
///
/// # Errors
///
/// Returns `ProviderError::Parse` when the payload is not JSON.
#[doc(hidden)]
pub fn parse_stream_chunk(payload: &str) -> Result<Option<String>, ProviderError> {
    if payload.trim() == "[DONE]" {
        return Ok(None);
    }
    let chunk: OpenAiStreamChunk =
        serde_json::from_str(payload).map_err(|e| ProviderError::Parse(e.to_string()))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|t| !t.is_empty()))
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let response = self
            .send(&build_request(&self.model_name, &request, false))
            .await?;
        parse_response(&check_http_response(response).await?)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, ProviderError> {
        let response = self
            .send(&build_request(&self.model_name, &request, true))
            .await?;
        let response = ensure_success(response).await?;
        Ok(spawn_text_stream(response, Framing::Sse, parse_stream_chunk))
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn model_id(&self) -> &str {
        &self.model_spec
    }
}
