//! Cancellable streaming of tool results.
//!
//! A protocol adapter writes chunks into a [`ToolStreamSender`] from a
//! background task and the caller reads them from the paired [`ToolStream`].
//! The stream ends when the producer drops its sender (upstream EOF). Dropping
//! the stream, or cancelling the token it was created from, signals the
//! producer to stop.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::UtcpError;

/// One streamed item.
pub type ToolChunk = Result<Value, UtcpError>;

const DEFAULT_STREAM_BUFFER: usize = 16;

/// Receiving half of a streamed tool call.
#[derive(Debug)]
pub struct ToolStream {
    receiver: mpsc::Receiver<ToolChunk>,
    _producer_guard: Option<DropGuard>,
}

/// Producing half of a streamed tool call.
#[derive(Debug, Clone)]
pub struct ToolStreamSender {
    sender: mpsc::Sender<ToolChunk>,
    cancellation: CancellationToken,
}

impl ToolStream {
    /// Creates a linked sender/stream pair whose producer is cancelled when
    /// `parent` fires or the stream is dropped.
    pub fn channel(parent: &CancellationToken) -> (ToolStreamSender, ToolStream) {
        Self::channel_with_capacity(parent, DEFAULT_STREAM_BUFFER)
    }

    pub fn channel_with_capacity(parent: &CancellationToken, capacity: usize) -> (ToolStreamSender, ToolStream) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let cancellation = parent.child_token();
        let stream = ToolStream {
            receiver,
            _producer_guard: Some(cancellation.clone().drop_guard()),
        };
        (ToolStreamSender { sender, cancellation }, stream)
    }

    /// A stream that yields exactly one chunk.
    pub fn once(chunk: ToolChunk) -> Self {
        Self::from_chunks(vec![chunk])
    }

    /// A stream over already-computed chunks.
    pub fn from_chunks(chunks: Vec<ToolChunk>) -> Self {
        let (sender, receiver) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            // Capacity matches the chunk count, so this never fails.
            let _ = sender.try_send(chunk);
        }
        ToolStream {
            receiver,
            _producer_guard: None,
        }
    }

    /// Waits for the next chunk; `None` once the producer has finished.
    pub async fn next_chunk(&mut self) -> Option<ToolChunk> {
        self.receiver.recv().await
    }

    /// Drains the stream, stopping at the first error.
    pub async fn collect_values(mut self) -> Result<Vec<Value>, UtcpError> {
        let mut values = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            values.push(chunk?);
        }
        Ok(values)
    }
}

impl Stream for ToolStream {
    type Item = ToolChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl ToolStreamSender {
    /// Sends a chunk; returns false once the consumer is gone or the stream was cancelled.
    pub async fn send(&self, chunk: ToolChunk) -> bool {
        tokio::select! {
            _ = self.cancellation.cancelled() => false,
            sent = self.sender.send(chunk) => sent.is_ok(),
        }
    }

    /// Token that fires when the consumer stops listening.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_closed(&self) -> bool {
        self.cancellation.is_cancelled() || self.sender.is_closed()
    }
}
