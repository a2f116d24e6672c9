//! Gemini provider implementation using the Generative Language API.
//!
//! Non-streamed calls use `models/{model}:generateContent`; streamed calls
//! use `models/{model}:streamGenerateContent?alt=sse`.

use serde::{Deserialize, Serialize};

use super::sse::{spawn_text_stream, Framing};
use super::{
    check_http_response, ensure_success, CompletionRequest, CompletionResponse, ContentPart,
    LlmProvider, MessageContent, ProviderError, Role, StopReason, TextStream, UsageStats,
};

/// Default Generative Language API base URL.
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// `generateContent` request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    /// System instruction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    /// Conversation turns.
    pub contents: Vec<GeminiContent>,
    /// Sampling and length settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

/// One conversation turn.
#[doc(hidden)]
#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiContent {
    /// `user` or `model`; omitted for the system instruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Ordered parts.
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

/// One part of a turn.
#[doc(hidden)]
#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiPart {
    /// Text content.
    #[serde(default)]
    pub text: Option<String>,
    /// Marks reasoning output in responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

/// Generation settings.
#[doc(hidden)]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Output token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Reasoning settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

/// Reasoning settings.
#[doc(hidden)]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    /// Reasoning token budget; `0` disables thinking.
    pub thinking_budget: i32,
    /// Whether thought summaries are returned.
    pub include_thoughts: bool,
}

/// `generateContent` response body (also one streamed chunk).
#[doc(hidden)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    /// Candidate replies; the first one is used.
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    /// Token usage.
    #[serde(default)]
    pub usage_metadata: Option<GeminiUsage>,
    /// Model version that served the call.
    #[serde(default)]
    pub model_version: Option<String>,
    /// Present when the prompt itself was blocked.
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

/// One candidate reply.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    /// Reply content.
    #[serde(default)]
    pub content: Option<GeminiContent>,
    /// Why generation stopped.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage metadata.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiUsage {
    /// Prompt tokens.
    #[serde(default)]
    pub prompt_token_count: Option<u32>,
    /// Reply tokens.
    #[serde(default)]
    pub candidates_token_count: Option<u32>,
}

/// Prompt-level safety feedback.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    /// Block reason, if the prompt was rejected.
    #[serde(default)]
    pub block_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Gemini Generative Language API provider.
#[derive(Clone)]
pub struct GeminiProvider {
    model_spec: String,
    model_name: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("model_spec", &self.model_spec)
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiProvider {
    /// Create a new Gemini provider instance.
    pub fn new(model_spec: String, model_name: String, api_key: String) -> Self {
        Self {
            model_spec,
            model_name,
            api_key,
            base_url: DEFAULT_GEMINI_URL.to_owned(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the provider at a different API host (proxies, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_owned();
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{method}",
            self.base_url, self.model_name
        )
    }
}

// ---------------------------------------------------------------------------
// Request / Response builders (pub for integration testing)
// ---------------------------------------------------------------------------

/// Build a Gemini request from a completion request.
#[doc(hidden)]
pub fn build_request(request: &CompletionRequest) -> GeminiRequest {
    let contents = request
        .messages
        .iter()
        .map(|msg| GeminiContent {
            role: Some(
                match msg.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                }
                .to_owned(),
            ),
            parts: match &msg.content {
                MessageContent::Text(t) => vec![text_part(t)],
                MessageContent::Parts(parts) => parts
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text } => Some(text_part(text)),
                        ContentPart::Reasoning { .. } => None,
                    })
                    .collect(),
            },
        })
        .collect();

    let system_instruction = request.system.as_ref().map(|s| GeminiContent {
        role: None,
        parts: vec![text_part(s)],
    });

    let thinking_config = request.thinking_budget.map(|budget| ThinkingConfig {
        thinking_budget: budget,
        include_thoughts: false,
    });
    let generation_config = if request.temperature.is_none()
        && request.max_tokens.is_none()
        && thinking_config.is_none()
    {
        None
    } else {
        Some(GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
            thinking_config,
        })
    };

    GeminiRequest {
        system_instruction,
        contents,
        generation_config,
    }
}

fn text_part(text: &str) -> GeminiPart {
    GeminiPart {
        text: Some(text.to_owned()),
        thought: None,
    }
}

/// Parse a `generateContent` response body.
///
/// # Errors
///
/// Returns `ProviderError::Parse` if the body is not a Gemini response.
#[doc(hidden)]
pub fn parse_response(body: &str, requested_model: &str) -> Result<CompletionResponse, ProviderError> {
    let resp: GeminiResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let blocked = resp
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.clone());
    let candidate = resp.candidates.into_iter().next();

    let (content, finish_reason) = match candidate {
        Some(c) => (
            c.content.map(|c| c.parts).unwrap_or_default(),
            c.finish_reason,
        ),
        None => (Vec::new(), blocked.map(|_| "SAFETY".to_owned())),
    };

    let content = content
        .into_iter()
        .filter_map(|part| {
            let text = part.text?;
            Some(if part.thought.unwrap_or(false) {
                ContentPart::Reasoning { text }
            } else {
                ContentPart::Text { text }
            })
        })
        .collect();

    let stop_reason = match finish_reason.as_deref() {
        Some("STOP") | None => StopReason::EndTurn,
        Some("MAX_TOKENS") => StopReason::MaxTokens,
        Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("BLOCKLIST") => StopReason::Safety,
        Some(other) => StopReason::Other(other.to_owned()),
    };

    let usage = resp.usage_metadata.map_or_else(UsageStats::default, |u| UsageStats {
        input_tokens: u.prompt_token_count.unwrap_or(0),
        output_tokens: u.candidates_token_count.unwrap_or(0),
    });

    Ok(CompletionResponse {
        content,
        stop_reason,
        usage,
        model: resp
            .model_version
            .unwrap_or_else(|| requested_model.to_owned()),
    })
}

/// Extract the visible text of one streamed chunk.
///
/// # Errors
///
/// Returns `ProviderError::Parse` if the chunk is not a Gemini response.
#[doc(hidden)]
pub fn parse_stream_chunk(payload: &str) -> Result<Option<String>, ProviderError> {
    let resp = parse_response(payload, "")?;
    let text: String = resp
        .content
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            ContentPart::Reasoning { .. } => None,
        })
        .collect();
    Ok(Some(text).filter(|t| !t.is_empty()))
}

// ---------------------------------------------------------------------------
// Trait impl
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let api_request = build_request(&request);
        let response = self
            .client
            .post(self.endpoint("generateContent"))
            .header("x-goog-api-key", &self.api_key)
            .json(&api_request)
            .send()
            .await?;

        let payload = check_http_response(response).await?;
        parse_response(&payload, &self.model_name)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, ProviderError> {
        let api_request = build_request(&request);
        let response = self
            .client
            .post(self.endpoint("streamGenerateContent?alt=sse"))
            .header("x-goog-api-key", &self.api_key)
            .json(&api_request)
            .send()
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
