//! Embedding requests
//!
//! [`Embedding`] fixes the model at construction, like the chat builders, and
//! validates the response: one vector per input, indices unique and in range.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{LlmError, PathSegment, ValidationError};
use crate::transport::CompletionTransport;

/// Text to embed: one string or a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingText {
    Single(String),
    Batch(Vec<String>),
}

impl EmbeddingText {
    pub fn len(&self) -> usize {
        match self {
            EmbeddingText::Single(_) => 1,
            EmbeddingText::Batch(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for EmbeddingText {
    fn from(text: &str) -> Self {
        EmbeddingText::Single(text.to_string())
    }
}

impl From<String> for EmbeddingText {
    fn from(text: String) -> Self {
        EmbeddingText::Single(text)
    }
}

impl From<Vec<String>> for EmbeddingText {
    fn from(items: Vec<String>) -> Self {
        EmbeddingText::Batch(items)
    }
}

/// Per-call input; `model` may be given but must match the builder's
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub input: EmbeddingText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl EmbeddingInput {
    pub fn new(input: impl Into<EmbeddingText>) -> Self {
        Self {
            model: None,
            input: input.into(),
            user: None,
        }
    }
}

/// Outbound request body for `/embeddings`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: EmbeddingText,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub index: u32,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u32,
    pub total_tokens: u32,
}

/// Validated embedding response; `data[i].index == i`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub model: String,
    pub data: Vec<EmbeddingVector>,
    #[serde(default)]
    pub usage: Option<EmbeddingUsage>,
}

impl EmbeddingResponse {
    /// Check the vectors against the request and order them by index
    fn validated(mut self, expected: usize, raw: &Value) -> Result<Self, LlmError> {
        if self.data.len() != expected {
            return Err(LlmError::schema_mismatch(
                format!("expected {expected} embedding(s), received {}", self.data.len()),
                raw.clone(),
            ));
        }

        self.data.sort_by_key(|v| v.index);
        for (position, vector) in self.data.iter().enumerate() {
            if vector.index as usize != position {
                return Err(LlmError::schema_mismatch(
                    format!("embedding indices are not unique and in range near {}", vector.index),
                    raw.clone(),
                ));
            }
        }
        Ok(self)
    }
}

/// Embedding builder bound to one model
#[derive(Clone)]
pub struct Embedding {
    transport: Arc<dyn CompletionTransport>,
    model: String,
}

impl Embedding {
    pub fn new(transport: Arc<dyn CompletionTransport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, input: EmbeddingInput) -> Result<EmbeddingRequest, LlmError> {
        let mut errors = ValidationError::default();

        if let Some(model) = &input.model {
            if model != &self.model {
                errors.push(
                    vec![PathSegment::from("model")],
                    format!("Invalid literal value, expected {:?}", self.model),
                );
            }
        }

        match &input.input {
            EmbeddingText::Single(text) if text.is_empty() => {
                errors.push(vec![PathSegment::from("input")], "Input must not be empty");
            }
            EmbeddingText::Batch(items) if items.is_empty() => {
                errors.push(vec![PathSegment::from("input")], "Input must not be empty");
            }
            EmbeddingText::Batch(items) => {
                for (i, item) in items.iter().enumerate() {
                    if item.is_empty() {
                        errors.push(
                            vec![PathSegment::from("input"), PathSegment::from(i)],
                            "Input must not be empty",
                        );
                    }
                }
            }
            EmbeddingText::Single(_) => {}
        }

        errors.into_result()?;

        Ok(EmbeddingRequest {
            model: self.model.clone(),
            input: input.input,
            user: input.user,
        })
    }

    pub async fn get(&self, input: EmbeddingInput) -> Result<EmbeddingResponse, LlmError> {
        let request = self.request(input)?;
        let expected = request.input.len();

        let raw = self.transport.create_embedding(&request).await?;
        let response: EmbeddingResponse = serde_json::from_value(raw.clone()).map_err(|e| {
            LlmError::schema_mismatch(format!("malformed embedding response: {e}"), raw.clone())
        })?;
        response.validated(expected, &raw)
    }
}

impl std::fmt::Debug for Embedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedding")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}
