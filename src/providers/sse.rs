//! Line framing for streamed provider bodies.
//!
//! Server-sent events (`data: {...}` lines) and newline-delimited JSON both
//! arrive as arbitrary byte chunks. [`LineDecoder`] buffers partial lines,
//! including multi-byte characters split across chunks, and
//! [`spawn_text_stream`] turns a response body into a [`TextStream`].

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

use super::{ProviderError, TextStream};

const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Splits a byte stream into complete lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let rest = self.pending.split_off(pos.saturating_add(1));
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Flush a trailing line that had no terminator.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&line).trim_end_matches('\r').to_owned())
    }
}

/// Payload of an SSE `data:` line, `None` for comments, blanks and other fields.
pub fn sse_data(line: &str) -> Option<&str> {
    let payload = line.strip_prefix("data:")?;
    Some(payload.strip_prefix(' ').unwrap_or(payload))
}

/// How a streamed body frames its events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Server-sent events; only `data:` lines carry payloads.
    Sse,
    /// One JSON document per line.
    Ndjson,
}

/// Extracts the text fragment from one event payload.
///
/// `Ok(None)` means the event carries no text (keep-alives, end markers).
pub type ChunkParser = fn(&str) -> Result<Option<String>, ProviderError>;

/// Pump a streaming response body into a [`TextStream`].
///
/// Fragments are forwarded in arrival order. The first error ends the
/// stream; dropping the stream stops the pump.
pub fn spawn_text_stream(
    response: reqwest::Response,
    framing: Framing,
    parse: ChunkParser,
) -> TextStream {
    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut body = Box::pin(response.bytes_stream());
        let mut decoder = LineDecoder::new();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = tx.send(Err(ProviderError::Request(e))).await;
                    return;
                }
            };
            for line in decoder.push(&chunk) {
                if !forward_line(&line, framing, parse, &tx).await {
                    return;
                }
            }
        }
        if let Some(line) = decoder.finish() {
            forward_line(&line, framing, parse, &tx).await;
        }
    });
    Box::pin(ReceiverStream::new(rx))
}

/// Returns `false` once the stream should stop.
async fn forward_line(
    line: &str,
    framing: Framing,
    parse: ChunkParser,
    tx: &mpsc::Sender<Result<String, ProviderError>>,
) -> bool {
    let payload = match framing {
        Framing::Sse => sse_data(line),
        Framing::Ndjson => Some(line.trim()).filter(|l| !l.is_empty()),
    };
    let Some(payload) = payload else {
        return true;
    };
    match parse(payload) {
        Ok(Some(fragment)) => tx.send(Ok(fragment)).await.is_ok(),
        Ok(None) => true,
        Err(e) => {
            debug!(error = %e, "stream chunk rejected");
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}
