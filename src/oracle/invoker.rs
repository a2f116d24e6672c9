//! Model invocation with timeout and bounded retry.

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::providers::{
    CompletionRequest, ContentPart, LlmProvider, Message, MessageContent, ProviderError, Role,
    StopReason, UsageStats,
};
use crate::retry::RetryPolicy;

use super::composer::PromptPayload;

/// Generation failures.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The call, retries included, ran past its deadline.
    #[error("model call timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    /// The reply carried no usable text.
    #[error("model reply contained no text")]
    EmptyReply,
}

impl GenerationError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_transient(),
            Self::Timeout(_) | Self::EmptyReply => false,
        }
    }
}

/// Sampling and call limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvokeSettings {
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token cap.
    pub max_output_tokens: u32,
    /// Reasoning budget, if any.
    pub thinking_budget: Option<i32>,
    /// Collect incremental fragments instead of one reply.
    pub stream: bool,
    /// Deadline for the whole call, retries and backoff included.
    pub timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl From<&LlmConfig> for InvokeSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            thinking_budget: config.thinking_budget,
            stream: config.stream,
            timeout: Duration::from_secs(config.timeout_seconds),
            retry: config.retry,
        }
    }
}

/// Generated fortune text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    /// Reply text.
    pub text: String,
    /// Model that produced it.
    pub model: String,
    /// Token counts when the provider reports them (non-streamed calls).
    pub usage: Option<UsageStats>,
}

/// Provider-neutral request: the system instruction plus one user message
/// carrying one text part per segment.
pub fn completion_request(payload: &PromptPayload, settings: &InvokeSettings) -> CompletionRequest {
    let parts = payload
        .segments
        .iter()
        .map(|segment| ContentPart::Text {
            text: segment.clone(),
        })
        .collect();
    CompletionRequest {
        messages: vec![Message {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }],
        system: Some(payload.system.clone()),
        max_tokens: Some(settings.max_output_tokens),
        temperature: Some(settings.temperature),
        thinking_budget: settings.thinking_budget,
    }
}

/// Calls the configured provider for a composed prompt.
#[derive(Clone)]
pub struct Invoker {
    provider: Arc<dyn LlmProvider>,
    settings: InvokeSettings,
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("model", &self.provider.model_id())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Invoker {
    /// Create an invoker.
    pub fn new(provider: Arc<dyn LlmProvider>, settings: InvokeSettings) -> Self {
        Self { provider, settings }
    }

    /// Model spec of the underlying provider.
    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// Generate text for `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError`] when every attempt fails or the reply is
    /// empty.
    pub async fn invoke(&self, payload: &PromptPayload) -> Result<Generated, GenerationError> {
        let request = completion_request(payload, &self.settings);
        let timeout = self.settings.timeout;
        let attempts = self
            .settings
            .retry
            .run("model call", GenerationError::is_transient, || {
                self.attempt(request.clone())
            });
        match tokio::time::timeout(timeout, attempts).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(timeout)),
        }
    }

    async fn attempt(&self, request: CompletionRequest) -> Result<Generated, GenerationError> {
        if self.settings.stream {
            return self.attempt_streamed(request).await;
        }

        let response = self.provider.complete(request).await?;
        if response.stop_reason == StopReason::Safety {
            debug!(model = %response.model, "reply stopped by provider safety filter");
        }
        let text = response
            .first_text()
            .map(str::to_owned)
            .ok_or(GenerationError::EmptyReply)?;
        info!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "fortune generated"
        );
        Ok(Generated {
            text,
            model: response.model,
            usage: Some(response.usage),
        })
    }

    async fn attempt_streamed(&self, request: CompletionRequest) -> Result<Generated, GenerationError> {
        let mut stream = self.provider.stream(request).await?;
        let mut text = String::new();
        let mut fragments: u32 = 0;
        while let Some(fragment) = stream.next().await {
            text.push_str(&fragment?);
            fragments = fragments.saturating_add(1);
        }
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyReply);
        }
        info!(model = %self.provider.model_id(), fragments, "fortune streamed");
        Ok(Generated {
            text,
            model: self.provider.model_id().to_owned(),
            usage: None,
        })
    }
}
