//! Incremental server-sent-events decoding.
//!
//! Bytes are fed in as they arrive; complete lines are parsed and an event is
//! emitted at every blank line that follows at least one `data:` line. Comment
//! lines (`:`) are ignored and a trailing event without a final blank line is
//! flushed by [`SseDecoder::finish`].

use std::fmt;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use utcp_types::{ToolChunk, ToolStreamSender, UtcpError};

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

/// Line-oriented SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data_lines: Vec<String>,
    id: Option<String>,
    retry: Option<u64>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of bytes and returns every event completed by it.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes the pending event at end of stream.
    pub fn finish(mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let remaining = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&remaining).trim_end_matches('\r').to_string();
            if let Some(event) = self.process_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field.trim(), value.strip_prefix(' ').unwrap_or(value)),
            None => (line.trim(), ""),
        };
        match field {
            "data" => self.data_lines.push(value.to_string()),
            "event" => self.event = Some(value.trim().to_string()),
            "id" => self.id = Some(value.trim().to_string()),
            "retry" => {
                if let Ok(ms) = value.trim().parse() {
                    self.retry = Some(ms);
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data_lines.is_empty() {
            self.event = None;
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data_lines).join("\n"),
            id: self.id.clone(),
            retry: self.retry,
        })
    }
}

/// Reads an SSE byte stream and forwards decoded events to `sender`.
///
/// `decode` maps each event to a chunk, or `None` to skip it. Stops at end of
/// body, on the first transport error, after `read_timeout` without data, or
/// once the consumer cancels.
pub async fn forward_sse_stream<S, B, E, F>(source: &str, body: S, sender: ToolStreamSender, read_timeout: Option<Duration>, mut decode: F)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
    F: FnMut(SseEvent) -> Option<ToolChunk>,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::new();

    loop {
        let next = tokio::select! {
            _ = sender.cancellation().cancelled() => return,
            next = async {
                match read_timeout {
                    Some(limit) => tokio::time::timeout(limit, body.as_mut().next()).await.map_err(|_| limit),
                    None => Ok(body.as_mut().next().await),
                }
            } => next,
        };

        let chunk = match next {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(None) => break,
            Ok(Some(Err(error))) => {
                let _ = sender.send(Err(UtcpError::transport(format!("stream from '{source}' failed: {error}")))).await;
                return;
            }
            Err(limit) => {
                let _ = sender
                    .send(Err(UtcpError::transport(format!(
                        "stream from '{source}' idle for more than {}ms",
                        limit.as_millis()
                    ))))
                    .await;
                return;
            }
        };

        for event in decoder.push(chunk.as_ref()) {
            if let Some(item) = decode(event)
                && !sender.send(item).await
            {
                return;
            }
        }
    }

    if let Some(event) = decoder.finish()
        && let Some(item) = decode(event)
    {
        sender.send(item).await;
    }
}
