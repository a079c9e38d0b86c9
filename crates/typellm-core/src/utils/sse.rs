use crate::error::LlmError;
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Parses Server-Sent Events from a byte stream and yields each event's data
/// payload. Multi-line `data:` fields are joined with `\n`, comments and other
/// fields are ignored, and the stream ends at the `[DONE]` sentinel.
pub fn sse_lines<S>(stream: S) -> SseLines<S>
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    SseLines {
        stream: Some(stream),
        buffer: String::new(),
        pending: Vec::new(),
        events: VecDeque::new(),
        done: false,
    }
}

pub struct SseLines<S> {
    stream: Option<S>,
    buffer: String,
    // bytes of an incomplete UTF-8 sequence split across chunks
    pending: Vec<u8>,
    events: VecDeque<String>,
    done: bool,
}

impl<S> SseLines<S> {
    /// Drop the underlying byte stream; later polls return `None`
    pub fn close(&mut self) {
        self.stream = None;
        self.done = true;
        self.events.clear();
    }

    fn parse_events(&mut self) {
        while let Some(end) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..end + 2).collect();

            let mut data: Vec<&str> = Vec::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.strip_prefix(' ').unwrap_or(value));
                }
            }
            if data.is_empty() {
                continue;
            }

            let payload = data.join("\n");
            if payload.trim() == "[DONE]" {
                self.done = true;
                self.buffer.clear();
                return;
            }
            self.events.push_back(payload);
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), LlmError> {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(LlmError::serialization("Invalid UTF-8 in SSE stream", e));
            }
        };
        let complete: Vec<u8> = self.pending.drain(..valid).collect();
        let text = String::from_utf8_lossy(&complete);
        self.buffer.push_str(&text.replace("\r\n", "\n"));
        Ok(())
    }
}

impl<S> Stream for SseLines<S>
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<String, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if self.done {
                self.stream = None;
                return Poll::Ready(None);
            }

            let Some(stream) = self.stream.as_mut() else {
                return Poll::Ready(None);
            };

            match Pin::new(stream).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    if let Err(e) = self.push_bytes(&bytes) {
                        self.close();
                        return Poll::Ready(Some(Err(e)));
                    }
                    self.parse_events();
                }
                Poll::Ready(Some(Err(e))) => {
                    self.close();
                    return Poll::Ready(Some(Err(LlmError::network_with_source(
                        "Stream error",
                        e,
                    ))));
                }
                Poll::Ready(None) => {
                    // flush a final event that lacks its blank line
                    if !self.buffer.trim().is_empty() {
                        self.buffer.push_str("\n\n");
                        self.parse_events();
                    }
                    self.done = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
