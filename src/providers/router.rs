//! Provider selection from a `provider/model` spec.

use std::sync::Arc;

use crate::credentials::Credentials;

use super::gemini::GeminiProvider;
use super::ollama::OllamaProvider;
use super::openai::OpenAiProvider;
use super::LlmProvider;

/// Provider used when a spec carries no `provider/` prefix.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Provider routing errors.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Model spec is empty or has an empty half.
    #[error("invalid model spec '{spec}', expected '<provider>/<model>' or '<model>'")]
    InvalidModelSpec {
        /// Invalid raw spec.
        spec: String,
    },
    /// Unsupported provider type in spec prefix.
    #[error("unsupported provider '{provider}'")]
    UnsupportedProvider {
        /// Unsupported provider prefix.
        provider: String,
    },
    /// Required API credential missing for selected provider.
    #[error("missing credential for provider '{provider}': {key}")]
    MissingCredential {
        /// Provider name.
        provider: String,
        /// Missing credential key.
        key: String,
    },
}

/// A model spec split into provider and model name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Provider prefix (`gemini`, `openai`, `ollama`).
    pub provider: String,
    /// Model name passed to the provider.
    pub model: String,
}

impl ModelSpec {
    /// Canonical `provider/model` form.
    pub fn canonical(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}

/// Split a model spec. A bare model name selects [`DEFAULT_PROVIDER`].
///
/// Only the first `/` separates the provider, so Ollama tags such as
/// `ollama/library/qwen3:8b` keep their inner slashes.
///
/// # Errors
///
/// Returns [`RouterError::InvalidModelSpec`] for empty halves.
pub fn parse_model_spec(spec: &str) -> Result<ModelSpec, RouterError> {
    let spec = spec.trim();
    let invalid = || RouterError::InvalidModelSpec {
        spec: spec.to_owned(),
    };
    match spec.split_once('/') {
        Some((provider, model)) => {
            if provider.is_empty() || model.is_empty() {
                return Err(invalid());
            }
            Ok(ModelSpec {
                provider: provider.to_owned(),
                model: model.to_owned(),
            })
        }
        None if spec.is_empty() => Err(invalid()),
        None => Ok(ModelSpec {
            provider: DEFAULT_PROVIDER.to_owned(),
            model: spec.to_owned(),
        }),
    }
}

/// Instantiate the provider named by `spec`.
///
/// `base_url` overrides the provider's default API host.
///
/// # Errors
///
/// Returns an error for malformed specs, unknown providers, or a missing
/// API key.
pub fn build_provider(
    spec: &str,
    credentials: &Credentials,
    base_url: Option<&str>,
) -> Result<Arc<dyn LlmProvider>, RouterError> {
    let parsed = parse_model_spec(spec)?;
    let model_spec = parsed.canonical();
    let base_url = base_url.map(str::to_owned);

    match parsed.provider.as_str() {
        "gemini" => {
            let key = require_key(credentials, "gemini", "GEMINI_API_KEY")?;
            let mut provider = GeminiProvider::new(model_spec, parsed.model, key);
            if let Some(url) = base_url {
                provider = provider.with_base_url(url);
            }
            Ok(Arc::new(provider))
        }
        "openai" => {
            let key = require_key(credentials, "openai", "OPENAI_API_KEY")?;
            let mut provider = OpenAiProvider::new(model_spec, parsed.model, key);
            if let Some(url) = base_url {
                provider = provider.with_base_url(url);
            }
            Ok(Arc::new(provider))
        }
        "ollama" => {
            let mut provider = OllamaProvider::new(model_spec, parsed.model);
            if let Some(url) = base_url {
                provider = provider.with_base_url(url);
            }
            Ok(Arc::new(provider))
        }
        other => Err(RouterError::UnsupportedProvider {
            provider: other.to_owned(),
        }),
    }
}

fn require_key(credentials: &Credentials, provider: &str, key: &str) -> Result<String, RouterError> {
    credentials
        .get(key)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_owned)
        .ok_or_else(|| RouterError::MissingCredential {
            provider: provider.to_owned(),
            key: key.to_owned(),
        })
}
