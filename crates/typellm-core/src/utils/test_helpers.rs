//! Test utilities
//!
//! Fake SSE byte streams for the transport parser, scripted frame sources that
//! count pulls and cancellations, raw frame builders, and an in-memory
//! [`CompletionTransport`].

use futures::Stream;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use crate::embedding::EmbeddingRequest;
use crate::error::LlmError;
use crate::stream::FrameSource;
use crate::transport::CompletionTransport;
use crate::types::ChatRequest;

/// Configuration for fake SSE response generation
#[derive(Debug, Clone, Default)]
pub struct FakeSseConfig {
    /// Whether to append a final "[DONE]" event
    pub include_done: bool,
    /// Split events across multiple chunks to test partial frame handling
    pub chunk_size: Option<usize>,
}

/// Creates a fake SSE response stream for testing
///
/// # Examples
/// ```
/// use futures::StreamExt;
/// use typellm_core::utils::test_helpers::fake_sse_response;
///
/// # tokio_test::block_on(async {
/// let chunks: Vec<_> = fake_sse_response(&["hello"], None).collect().await;
/// assert_eq!(chunks.len(), 1);
/// # });
/// ```
pub fn fake_sse_response(
    events: &[&str],
    config: Option<FakeSseConfig>,
) -> FakeSseStream {
    let config = config.unwrap_or_default();

    let mut response = String::new();
    for event in events {
        response.push_str(&format!("data: {event}\n\n"));
    }

    if config.include_done {
        response.push_str("data: [DONE]\n\n");
    }

    FakeSseStream::new(response, config)
}

/// Byte stream behind [`fake_sse_response`]
pub struct FakeSseStream {
    data: Vec<u8>,
    position: usize,
    chunk_size: Option<usize>,
}

impl FakeSseStream {
    fn new(response: String, config: FakeSseConfig) -> Self {
        Self {
            data: response.into_bytes(),
            position: 0,
            chunk_size: config.chunk_size,
        }
    }
}

impl Stream for FakeSseStream {
    type Item = Result<bytes::Bytes, reqwest::Error>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.position >= self.data.len() {
            return Poll::Ready(None);
        }

        let chunk_size = self
            .chunk_size
            .unwrap_or(self.data.len() - self.position)
            .max(1);
        let end_pos = std::cmp::min(self.position + chunk_size, self.data.len());

        let chunk = self.data[self.position..end_pos].to_vec();
        self.position = end_pos;

        Poll::Ready(Some(Ok(bytes::Bytes::from(chunk))))
    }
}

/// Creates a fake SSE response with events split across chunk boundaries
pub fn fake_sse_response_chunked(events: &[&str], chunk_size: usize) -> FakeSseStream {
    fake_sse_response(
        events,
        Some(FakeSseConfig {
            chunk_size: Some(chunk_size),
            ..Default::default()
        }),
    )
}

/// Creates a fake SSE response that includes a [DONE] event at the end
pub fn fake_sse_response_with_done(events: &[&str]) -> FakeSseStream {
    fake_sse_response(
        events,
        Some(FakeSseConfig {
            include_done: true,
            ..Default::default()
        }),
    )
}

/// Shared pull and cancel counts of a [`ScriptedSource`]
#[derive(Debug, Clone, Default)]
pub struct SourceCounters {
    pulls: Arc<AtomicUsize>,
    cancels: Arc<AtomicUsize>,
}

impl SourceCounters {
    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

/// In-memory frame source replaying a fixed script
#[derive(Debug)]
pub struct ScriptedSource {
    frames: VecDeque<Result<Value, LlmError>>,
    counters: SourceCounters,
    cancelled: bool,
}

impl ScriptedSource {
    pub fn new(frames: impl IntoIterator<Item = Value>) -> Self {
        Self::with_results(frames.into_iter().map(Ok))
    }

    pub fn with_results(frames: impl IntoIterator<Item = Result<Value, LlmError>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            counters: SourceCounters::default(),
            cancelled: false,
        }
    }

    pub fn counters(&self) -> SourceCounters {
        self.counters.clone()
    }
}

impl Stream for ScriptedSource {
    type Item = Result<Value, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancelled {
            return Poll::Ready(None);
        }
        self.counters.pulls.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(self.frames.pop_front())
    }
}

impl FrameSource for ScriptedSource {
    fn cancel(&mut self) {
        self.cancelled = true;
        self.counters.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// A raw `chat.completion.chunk` frame
pub fn chunk(choices: Vec<Value>) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": "gpt-4",
        "choices": choices
    })
}

pub fn role_delta(index: u32) -> Value {
    json!({ "index": index, "delta": { "role": "assistant", "content": "" }, "finish_reason": null })
}

pub fn content_delta(index: u32, content: &str) -> Value {
    json!({ "index": index, "delta": { "content": content }, "finish_reason": null })
}

pub fn function_name_delta(index: u32, name: &str, arguments: &str) -> Value {
    json!({
        "index": index,
        "delta": {
            "role": "assistant",
            "content": null,
            "function_call": { "name": name, "arguments": arguments }
        },
        "finish_reason": null
    })
}

pub fn function_args_delta(index: u32, arguments: &str) -> Value {
    json!({ "index": index, "delta": { "function_call": { "arguments": arguments } }, "finish_reason": null })
}

pub fn finish_delta(index: u32, reason: &str) -> Value {
    json!({ "index": index, "delta": {}, "finish_reason": reason })
}

/// A raw non-streaming `chat.completion`
pub fn completion(choices: Vec<Value>) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4",
        "choices": choices,
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
    })
}

pub fn stop_choice(index: u32, content: &str) -> Value {
    json!({
        "index": index,
        "message": { "role": "assistant", "content": content },
        "finish_reason": "stop"
    })
}

pub fn function_call_choice(index: u32, finish_reason: &str, name: &str, arguments: &str) -> Value {
    json!({
        "index": index,
        "message": {
            "role": "assistant",
            "content": null,
            "function_call": { "name": name, "arguments": arguments }
        },
        "finish_reason": finish_reason
    })
}

/// Scripted [`CompletionTransport`] that records every request it receives
#[derive(Debug, Default)]
pub struct MockTransport {
    completions: Mutex<VecDeque<Result<Value, LlmError>>>,
    streams: Mutex<VecDeque<Vec<Result<Value, LlmError>>>>,
    embeddings: Mutex<VecDeque<Value>>,
    chat_requests: Mutex<Vec<ChatRequest>>,
    embedding_requests: Mutex<Vec<EmbeddingRequest>>,
    stream_counters: Mutex<Vec<SourceCounters>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_completion(self, response: Value) -> Self {
        lock(&self.completions).push_back(Ok(response));
        self
    }

    pub fn with_completion_error(self, error: LlmError) -> Self {
        lock(&self.completions).push_back(Err(error));
        self
    }

    pub fn with_stream(self, frames: Vec<Value>) -> Self {
        lock(&self.streams).push_back(frames.into_iter().map(Ok).collect());
        self
    }

    pub fn with_stream_results(self, frames: Vec<Result<Value, LlmError>>) -> Self {
        lock(&self.streams).push_back(frames);
        self
    }

    pub fn with_embedding(self, response: Value) -> Self {
        lock(&self.embeddings).push_back(response);
        self
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        lock(&self.chat_requests).clone()
    }

    pub fn embedding_requests(&self) -> Vec<EmbeddingRequest> {
        lock(&self.embedding_requests).clone()
    }

    /// Counters of every stream handed out so far, in order
    pub fn stream_counters(&self) -> Vec<SourceCounters> {
        lock(&self.stream_counters).clone()
    }
}

#[async_trait::async_trait]
impl CompletionTransport for MockTransport {
    async fn create_completion(&self, request: &ChatRequest) -> Result<Value, LlmError> {
        lock(&self.chat_requests).push(request.clone());
        lock(&self.completions)
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::configuration("no scripted completion left")))
    }

    async fn create_completion_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<Box<dyn FrameSource>, LlmError> {
        lock(&self.chat_requests).push(request.clone());
        let frames = lock(&self.streams)
            .pop_front()
            .ok_or_else(|| LlmError::configuration("no scripted stream left"))?;
        let source = ScriptedSource::with_results(frames);
        lock(&self.stream_counters).push(source.counters());
        Ok(Box::new(source))
    }

    async fn create_embedding(&self, request: &EmbeddingRequest) -> Result<Value, LlmError> {
        lock(&self.embedding_requests).push(request.clone());
        lock(&self.embeddings)
            .pop_front()
            .ok_or_else(|| LlmError::configuration("no scripted embedding left"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_basic_fake_sse_response() {
        let events = ["hello", "world"];
        let stream = fake_sse_response(&events, None);
        let chunks: Vec<Result<bytes::Bytes, reqwest::Error>> = stream.collect().await;

        assert_eq!(chunks.len(), 1);
        let chunk = chunks[0].as_ref().unwrap();
        let data = String::from_utf8(chunk.to_vec()).unwrap();
        assert_eq!(data, "data: hello\n\ndata: world\n\n");
    }

    #[tokio::test]
    async fn test_fake_sse_response_chunked() {
        let stream = fake_sse_response_chunked(&["hello", "world"], 5);
        let chunks: Vec<Result<bytes::Bytes, reqwest::Error>> = stream.collect().await;
        assert!(chunks.len() > 1);

        let mut full_data = String::new();
        for chunk in chunks {
            let bytes = chunk.unwrap();
            full_data.push_str(core::str::from_utf8(&bytes).unwrap());
        }
        assert_eq!(full_data, "data: hello\n\ndata: world\n\n");
    }

    #[tokio::test]
    async fn test_scripted_source_counts_and_stops_after_cancel() {
        let mut source = ScriptedSource::new(vec![json!(1), json!(2)]);
        let counters = source.counters();

        assert_eq!(source.next().await.unwrap().unwrap(), json!(1));
        source.cancel();
        assert!(source.next().await.is_none());
        assert_eq!(counters.pulls(), 1);
        assert_eq!(counters.cancels(), 1);
    }

    #[tokio::test]
    async fn test_mock_transport_records_and_runs_dry() {
        let transport = MockTransport::new().with_completion(completion(vec![]));
        let request = ChatRequest {
            model: "gpt-4".to_string(),
            messages: vec![],
            n: 1,
            stream: false,
            temperature: None,
            top_p: None,
            max_tokens: None,
            functions: vec![],
            function_call: None,
        };

        assert!(transport.create_completion(&request).await.is_ok());
        assert!(transport.create_completion(&request).await.is_err());
        assert!(transport.create_completion_stream(&request).await.is_err());
        assert_eq!(transport.chat_requests().len(), 3);
    }
}
