//! In-process fakes for the provider and data-source seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use fortune_booth::providers::{
    CompletionRequest, CompletionResponse, ContentPart, LlmProvider, ProviderError, StopReason,
    TextStream, UsageStats,
};
use fortune_booth::roster::Workbook;
use fortune_booth::source::{DataSource, SourceError};

/// Provider that records requests and replies from a script.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    stream_fragments: Option<Vec<String>>,
}

impl ScriptedProvider {
    /// Always answer with `text`.
    pub fn answering(text: &str) -> Arc<Self> {
        Arc::new(Self::with_replies(vec![Ok(text.to_owned())]))
    }

    /// Answer with each scripted result in turn; the last one repeats.
    pub fn with_replies(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    /// Stream the given fragments.
    pub fn streaming(fragments: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            stream_fragments: Some(fragments.iter().map(|f| (*f).to_owned()).collect()),
            ..Self::default()
        })
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("lock").clone()
    }

    /// Number of calls received.
    pub fn calls(&self) -> usize {
        self.requests.lock().expect("lock").len()
    }

    fn next_reply(&self) -> Result<String, ProviderError> {
        let mut replies = self.replies.lock().expect("lock");
        if replies.len() > 1 {
            return replies.pop_front().expect("non-empty");
        }
        match replies.front() {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(ProviderError::HttpStatus { status, body })) => Err(ProviderError::HttpStatus {
                status: *status,
                body: body.clone(),
            }),
            Some(Err(e)) => Err(ProviderError::Unavailable(e.to_string())),
            None => Ok(String::new()),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.requests.lock().expect("lock").push(request);
        let text = self.next_reply()?;
        Ok(CompletionResponse {
            content: vec![
                ContentPart::Reasoning {
                    text: "thinking...".to_owned(),
                },
                ContentPart::Text { text },
            ],
            stop_reason: StopReason::EndTurn,
            usage: UsageStats {
                input_tokens: 120,
                output_tokens: 40,
            },
            model: "scripted-model".to_owned(),
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<TextStream, ProviderError> {
        let Some(fragments) = self.stream_fragments.clone() else {
            let response = self.complete(request).await?;
            let text = response.first_text().unwrap_or_default().to_owned();
            return Ok(Box::pin(tokio_stream::once(Ok(text))));
        };
        self.requests.lock().expect("lock").push(request);
        Ok(Box::pin(tokio_stream::iter(fragments.into_iter().map(Ok))))
    }

    fn supports_streaming(&self) -> bool {
        self.stream_fragments.is_some()
    }

    fn model_id(&self) -> &str {
        "scripted/model"
    }
}

/// Data source returning a fixed workbook and counting fetches.
pub struct CountingSource {
    workbook: Mutex<Workbook>,
    fetches: AtomicU32,
    delay: Duration,
    failures: Mutex<VecDeque<SourceError>>,
}

impl CountingSource {
    /// Serve `workbook` immediately.
    pub fn new(workbook: Workbook) -> Arc<Self> {
        Self::slow(workbook, Duration::ZERO)
    }

    /// Serve `workbook` after `delay`.
    pub fn slow(workbook: Workbook, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            workbook: Mutex::new(workbook),
            fetches: AtomicU32::new(0),
            delay,
            failures: Mutex::new(VecDeque::new()),
        })
    }

    /// Fail the next fetches with these errors, in order.
    pub fn fail_next(&self, errors: Vec<SourceError>) {
        self.failures.lock().expect("lock").extend(errors);
    }

    /// Replace the workbook served by later fetches.
    pub fn set_workbook(&self, workbook: Workbook) {
        *self.workbook.lock().expect("lock") = workbook;
    }

    /// Fetches started so far.
    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for CountingSource {
    async fn fetch(&self) -> Result<Workbook, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = self.failures.lock().expect("lock").pop_front() {
            return Err(err);
        }
        Ok(self.workbook.lock().expect("lock").clone())
    }

    fn describe(&self) -> String {
        "counting fake".to_owned()
    }
}
