//! Model providers.
//!
//! Everything above this module talks to a model through [`LlmProvider`]
//! and the provider-neutral [`CompletionRequest`] / [`CompletionResponse`]
//! pair. Implementations:
//! - [`gemini::GeminiProvider`]: Google Generative Language API
//! - [`openai::OpenAiProvider`]: OpenAI-compatible chat completions
//! - [`ollama::OllamaProvider`]: a local Ollama daemon
//!
//! [`router::build_provider`] picks one from a `provider/model` spec.

use std::pin::Pin;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;

pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod router;
pub mod sse;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Who wrote a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The booth, speaking for the guest.
    User,
    /// The model.
    Assistant,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author.
    pub role: Role,
    /// Body.
    pub content: MessageContent,
}

/// Turn body: one string, or ordered parts that providers may keep apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Single string.
    Text(String),
    /// Ordered parts.
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Visible text, parts joined by newlines and reasoning left out.
    pub fn text(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(ContentPart::visible_text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// One part of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text shown to the guest.
    Text {
        /// Part text.
        text: String,
    },
    /// Model "thought" output; never shown.
    Reasoning {
        /// Part text.
        text: String,
    },
}

impl ContentPart {
    fn visible_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Reasoning { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

/// Provider-neutral completion call.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Turns, oldest first.
    pub messages: Vec<Message>,
    /// System instruction, sent out of band where the API allows.
    pub system: Option<String>,
    /// Output token cap.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Reasoning budget; ignored by providers without one.
    pub thinking_budget: Option<i32>,
}

/// Why generation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Model finished on its own.
    EndTurn,
    /// Hit the output token cap.
    MaxTokens,
    /// Cut off by a safety filter.
    Safety,
    /// Anything else the provider reported.
    Other(String),
}

/// Token counts of one call; informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UsageStats {
    /// Prompt tokens.
    pub input_tokens: u32,
    /// Reply tokens.
    pub output_tokens: u32,
}

/// Provider-neutral reply.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Reply parts in the order the provider sent them.
    pub content: Vec<ContentPart>,
    /// Why generation ended.
    pub stop_reason: StopReason,
    /// Token counts.
    pub usage: UsageStats,
    /// Model that answered, as reported by the provider.
    pub model: String,
}

impl CompletionResponse {
    /// First visible part with non-whitespace text.
    pub fn first_text(&self) -> Option<&str> {
        self.content
            .iter()
            .filter_map(ContentPart::visible_text)
            .find(|text| !text.trim().is_empty())
    }
}

/// Reply fragments in arrival order.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Provider call failures.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Connection, TLS or body read failure.
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The body was not the expected shape.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// The API answered with a non-2xx status.
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus {
        /// Status code.
        status: u16,
        /// Body after [`sanitize_http_error_body`].
        body: String,
    },
    /// The provider cannot serve this request as configured.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Transport failures, 429 and 5xx are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Parse(_) | Self::Unavailable(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP plumbing shared by the providers
// ---------------------------------------------------------------------------

const MAX_ERROR_BODY_CHARS: usize = 256;

const SECRET_PATTERNS: [&str; 4] = [
    r"AIza[0-9A-Za-z_\-]{20,}",
    r"sk-[A-Za-z0-9_\-]{20,}",
    r"(?i)bearer\s+[A-Za-z0-9._\-]{16,}",
    r"eyJ[A-Za-z0-9_\-]{10,}\.[A-Za-z0-9_\-]{10,}\.[A-Za-z0-9_\-]*",
];

/// Read the body of a 2xx response.
///
/// # Errors
///
/// `ProviderError::HttpStatus` for non-2xx, `ProviderError::Request` if the
/// body cannot be read.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, ProviderError> {
    Ok(ensure_success(response).await?.text().await?)
}

/// Hand back a 2xx response unread, for streaming bodies.
///
/// # Errors
///
/// `ProviderError::HttpStatus` with a sanitised body for non-2xx.
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let raw = response.text().await?;
    Err(ProviderError::HttpStatus {
        status: status.as_u16(),
        body: sanitize_http_error_body(&raw),
    })
}

/// Make an error body safe to log: single spaces, API keys and bearer
/// tokens replaced by `[REDACTED]`, at most 256 characters.
pub fn sanitize_http_error_body(raw: &str) -> String {
    let mut cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    for pattern in SECRET_PATTERNS {
        if let Ok(regex) = Regex::new(pattern) {
            cleaned = regex.replace_all(&cleaned, "[REDACTED]").into_owned();
        }
    }

    if cleaned.chars().count() <= MAX_ERROR_BODY_CHARS {
        return cleaned;
    }
    let head: String = cleaned.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!("{head}...[truncated]")
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A text-generation backend.
///
/// One instance is shared by every request the booth serves, hence
/// `Send + Sync`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// One-shot completion.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport, status or parse failure.
    async fn complete(&self, request: CompletionRequest)
        -> Result<CompletionResponse, ProviderError>;

    /// Completion delivered as text fragments.
    ///
    /// Without native streaming this makes one [`LlmProvider::complete`]
    /// call and yields its first text as a single fragment.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the call cannot be started.
    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, ProviderError> {
        let response = self.complete(request).await?;
        let text = response.first_text().unwrap_or_default().to_owned();
        Ok(Box::pin(tokio_stream::once(Ok(text))))
    }

    /// Whether [`LlmProvider::stream`] is incremental.
    fn supports_streaming(&self) -> bool;

    /// Canonical `provider/model` spec this instance serves.
    fn model_id(&self) -> &str;
}
