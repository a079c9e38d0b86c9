//! Provider transport
//!
//! [`CompletionTransport`] is the seam between the typed chat layer and the
//! provider. It deals in raw JSON; validation against the response model
//! happens above it. [`OpenAIClient`] is the HTTP implementation.

use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::config::{ConfigBuilder, OpenAIConfig, ProviderConfig};
use crate::embedding::EmbeddingRequest;
use crate::error::LlmError;
use crate::stream::FrameSource;
use crate::types::ChatRequest;
use crate::utils::sse::{SseLines, sse_lines};

const PROVIDER: &str = "openai";

/// Raw provider operations
#[async_trait::async_trait]
pub trait CompletionTransport: Send + Sync {
    /// `POST /chat/completions` with `stream: false`
    async fn create_completion(&self, request: &ChatRequest) -> Result<Value, LlmError>;

    /// `POST /chat/completions` with `stream: true`; frames are pulled lazily
    async fn create_completion_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<Box<dyn FrameSource>, LlmError>;

    /// `POST /embeddings`
    async fn create_embedding(&self, request: &EmbeddingRequest) -> Result<Value, LlmError>;
}

/// OpenAI-compatible HTTP client
#[derive(Clone)]
pub struct OpenAIClient {
    config: OpenAIConfig,
    client: reqwest::Client,
}

impl OpenAIClient {
    /// Create a new OpenAI client
    pub fn new(config: OpenAIConfig) -> Result<Self, LlmError> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LlmError::configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self, LlmError> {
        Self::new(ConfigBuilder::openai_from_env()?)
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url())
    }

    fn header_map(&self) -> reqwest::header::HeaderMap {
        let mut header_map = reqwest::header::HeaderMap::new();
        for (key, value) in self.config.headers() {
            if let (Ok(name), Ok(val)) = (
                reqwest::header::HeaderName::from_bytes(key.as_bytes()),
                reqwest::header::HeaderValue::from_str(&value),
            ) {
                header_map.insert(name, val);
            }
        }
        header_map
    }

    async fn post(
        &self,
        path: &str,
        body: &impl serde::Serialize,
        accept: &'static str,
    ) -> Result<reqwest::Response, LlmError> {
        let mut headers = self.header_map();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(accept),
        );

        let response = self
            .client
            .post(self.url(path))
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        check_status(response).await
    }

    fn send_error(&self, error: reqwest::Error) -> LlmError {
        if error.is_timeout() {
            LlmError::timeout(self.config.timeout())
        } else {
            error.into()
        }
    }

    async fn json(&self, response: reqwest::Response, what: &str) -> Result<Value, LlmError> {
        response
            .json()
            .await
            .map_err(|e| LlmError::serialization(format!("Failed to parse {what} response"), e))
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let response = self
            .client
            .get(self.url("models"))
            .headers(self.header_map())
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        let json = self.json(check_status(response).await?, "models").await?;

        let models = json
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| LlmError::schema_mismatch("models response has no data array", json.clone()))?
            .iter()
            .filter_map(|m| m.get("id").and_then(Value::as_str).map(str::to_string))
            .collect();

        Ok(models)
    }

    /// Health check
    pub async fn health_check(&self) -> Result<(), LlmError> {
        self.list_models().await.map(|_| ())
    }
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("base_url", &self.config.base_url())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl CompletionTransport for OpenAIClient {
    async fn create_completion(&self, request: &ChatRequest) -> Result<Value, LlmError> {
        log::debug!("POST chat/completions model={} n={}", request.model, request.n);
        let response = self
            .post("chat/completions", request, "application/json")
            .await?;
        self.json(response, "chat completion").await
    }

    async fn create_completion_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<Box<dyn FrameSource>, LlmError> {
        log::debug!(
            "POST chat/completions (stream) model={} n={}",
            request.model,
            request.n
        );
        let response = self
            .post("chat/completions", request, "text/event-stream")
            .await?;
        let bytes: ByteStream = Box::pin(response.bytes_stream());
        Ok(Box::new(SseFrameSource::new(bytes)))
    }

    async fn create_embedding(&self, request: &EmbeddingRequest) -> Result<Value, LlmError> {
        log::debug!("POST embeddings model={}", request.model);
        let response = self.post("embeddings", request, "application/json").await?;
        self.json(response, "embedding").await
    }
}

/// Turn a non-success response into an [`LlmError::Api`]
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(api_error(status, &body))
}

fn api_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    // OpenAI wraps failures as {"error": {"message", "type", "code"}}
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let message = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    let code = error
        .and_then(|e| e.get("code").or_else(|| e.get("type")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| status.as_u16().to_string());

    LlmError::api(PROVIDER, format!("{status}: {message}"), Some(code))
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>;

/// Streams SSE `data:` payloads as JSON frames
pub struct SseFrameSource<S> {
    lines: SseLines<S>,
}

impl<S> SseFrameSource<S>
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    pub fn new(bytes: S) -> Self {
        Self {
            lines: sse_lines(bytes),
        }
    }
}

impl<S> Stream for SseFrameSource<S>
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<Value, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.lines).poll_next(cx) {
            Poll::Ready(Some(Ok(data))) => Poll::Ready(Some(
                serde_json::from_str::<Value>(&data).map_err(|e| {
                    LlmError::serialization(format!("Failed to parse stream frame: {data}"), e)
                }),
            )),
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> FrameSource for SseFrameSource<S>
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + Unpin,
{
    fn cancel(&mut self) {
        self.lines.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_helpers::{fake_sse_response_chunked, fake_sse_response_with_done};
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_sse_frame_source_parses_json() {
        let events = [r#"{"id":"a","n":1}"#, r#"{"id":"b","n":2}"#];
        let mut source = SseFrameSource::new(fake_sse_response_chunked(&events, 5));

        assert_eq!(source.next().await.unwrap().unwrap(), json!({ "id": "a", "n": 1 }));
        assert_eq!(source.next().await.unwrap().unwrap(), json!({ "id": "b", "n": 2 }));
        assert!(source.next().await.is_none());
    }

    #[tokio::test]
    async fn test_sse_frame_source_stops_at_done_and_cancel() {
        let mut source = SseFrameSource::new(fake_sse_response_with_done(&["{}", "{}"]));
        assert!(source.next().await.unwrap().is_ok());
        source.cancel();
        assert!(source.next().await.is_none());
    }

    #[tokio::test]
    async fn test_sse_frame_source_bad_json() {
        let mut source = SseFrameSource::new(fake_sse_response_with_done(&["not json"]));
        assert!(matches!(
            source.next().await,
            Some(Err(LlmError::Serialization { .. }))
        ));
    }

    #[test]
    fn test_api_error_extracts_provider_message() {
        let body = r#"{"error":{"message":"Invalid API key","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        match api_error(reqwest::StatusCode::UNAUTHORIZED, body) {
            LlmError::Api {
                provider,
                message,
                code,
            } => {
                assert_eq!(provider, "openai");
                assert!(message.contains("Invalid API key"));
                assert_eq!(code.as_deref(), Some("invalid_api_key"));
            }
            other => panic!("unexpected: {other}"),
        }

        match api_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down") {
            LlmError::Api { message, code, .. } => {
                assert!(message.contains("upstream down"));
                assert_eq!(code.as_deref(), Some("502"));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_client_requires_valid_config() {
        assert!(OpenAIClient::new(OpenAIConfig::new("")).is_err());
        let client = OpenAIClient::new(OpenAIConfig::new("k").with_base_url("http://localhost:1/v1")).unwrap();
        assert_eq!(client.url("chat/completions"), "http://localhost:1/v1/chat/completions");
    }
}
