//! The fortune pipeline: resolve, compose, invoke.
//!
//! [`FortuneService::tell`] is the single entry point the presentation
//! layer calls. Each call gets a [`RequestContext`] whose id tags every
//! log line of the request.

use std::sync::Arc;

use tracing::{field, info, instrument, Span};
use uuid::Uuid;

use crate::config::PromptConfig;
use crate::providers::UsageStats;
use crate::roster::resolver::{resolve, Identifier, InputError, LookupError};
use crate::roster::{NAME_COLUMN, TEAM_COLUMN};
use crate::source::cache::WorkbookCache;
use crate::source::SourceError;

pub mod composer;
pub mod invoker;

use composer::compose;
use invoker::{GenerationError, Invoker};

/// Everything that can stop a fortune from being told.
#[derive(Debug, thiserror::Error)]
pub enum FortuneError {
    /// The identifier or fortune number is malformed.
    #[error(transparent)]
    Input(#[from] InputError),
    /// No participant matches.
    #[error(transparent)]
    NotFound(#[from] LookupError),
    /// The workbook could not be fetched.
    #[error("failed to load participant data: {0}")]
    Source(#[from] SourceError),
    /// The participant record could not be serialised into the prompt.
    #[error("failed to serialise participant record: {0}")]
    Record(#[from] serde_json::Error),
    /// The model call failed.
    #[error("failed to generate fortune: {0}")]
    Generation(#[from] GenerationError),
}

/// Per-request state threaded through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Correlation id for logs.
    pub request_id: Uuid,
    /// Parsed lookup key.
    pub identifier: Identifier,
    /// Optional number folded into the prompt.
    pub fortune_number: Option<u32>,
}

impl RequestContext {
    /// Validate raw input and open a new request.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] for a blank or out-of-range identifier or a
    /// fortune number that is not a `u32`.
    pub fn new(raw_identifier: &str, raw_fortune_number: Option<&str>) -> Result<Self, InputError> {
        Ok(Self {
            request_id: Uuid::new_v4(),
            identifier: Identifier::parse(raw_identifier)?,
            fortune_number: parse_fortune_number(raw_fortune_number)?,
        })
    }
}

/// Parse the optional fortune number; blank means none.
///
/// # Errors
///
/// Returns [`InputError::FortuneNumber`] when the trimmed text is not a `u32`.
pub fn parse_fortune_number(raw: Option<&str>) -> Result<Option<u32>, InputError> {
    let Some(trimmed) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    trimmed
        .parse::<u32>()
        .map(Some)
        .map_err(|_| InputError::FortuneNumber(trimmed.to_owned()))
}

/// Where the fortune text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FortuneOrigin {
    /// Pre-written text from the workbook; no model call was made.
    Fixed,
    /// Generated by a model.
    Generated {
        /// Model that produced the text.
        model: String,
        /// Token counts, when reported.
        usage: Option<UsageStats>,
    },
}

/// A told fortune.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fortune {
    /// Participant name, if the record has one.
    pub name: Option<String>,
    /// Participant team, if the record has one.
    pub team: Option<String>,
    /// Fortune text.
    pub text: String,
    /// Fixed or generated.
    pub origin: FortuneOrigin,
}

/// Resolves participants and tells their fortunes.
#[derive(Debug)]
pub struct FortuneService {
    cache: Arc<WorkbookCache>,
    invoker: Invoker,
    prompt: PromptConfig,
}

impl FortuneService {
    /// Wire the pipeline together.
    pub fn new(cache: Arc<WorkbookCache>, invoker: Invoker, prompt: PromptConfig) -> Self {
        Self {
            cache,
            invoker,
            prompt,
        }
    }

    /// Shared workbook cache.
    pub fn cache(&self) -> &Arc<WorkbookCache> {
        &self.cache
    }

    /// Tell the fortune for raw user input.
    ///
    /// # Errors
    ///
    /// Returns [`FortuneError`] for bad input, unknown participants, data
    /// source failures, or generation failures.
    pub async fn tell(
        &self,
        raw_identifier: &str,
        raw_fortune_number: Option<&str>,
    ) -> Result<Fortune, FortuneError> {
        let ctx = RequestContext::new(raw_identifier, raw_fortune_number)?;
        self.run(&ctx).await
    }

    /// Drop cached data so the next request re-fetches the workbook.
    ///
    /// Returns the new refresh generation.
    pub async fn refresh(&self) -> u64 {
        self.cache.invalidate().await
    }

    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id, generation = field::Empty))]
    async fn run(&self, ctx: &RequestContext) -> Result<Fortune, FortuneError> {
        info!(identifier = %ctx.identifier, fortune_number = ?ctx.fortune_number, "fortune requested");

        let snapshot = self.cache.get().await?;
        Span::current().record("generation", snapshot.generation);
        let resolution = resolve(&ctx.identifier, &snapshot.workbook.participants)?;
        let name = resolution.record.text(NAME_COLUMN);
        let team = resolution
            .record
            .text(TEAM_COLUMN)
            .filter(|t| !t.trim().is_empty());

        if let Some(fixed) = resolution.effective_fixed_response() {
            info!("using fixed response");
            return Ok(Fortune {
                name,
                team,
                text: fixed.to_owned(),
                origin: FortuneOrigin::Fixed,
            });
        }

        let payload = compose(
            &resolution,
            &snapshot.workbook,
            &self.prompt,
            ctx.fortune_number,
        )?;
        info!(
            language = ?payload.language,
            segments = payload.segments.len(),
            "prompt composed"
        );

        let generated = self.invoker.invoke(&payload).await?;
        Ok(Fortune {
            name,
            team,
            text: generated.text,
            origin: FortuneOrigin::Generated {
                model: generated.model,
                usage: generated.usage,
            },
        })
    }
}
