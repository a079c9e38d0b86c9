use std::fmt;
use thiserror::Error;

use crate::schema::SchemaKind;

const DOCS_FUNCTION_NAMES: &str = "docs/functions.md#naming";
const DOCS_DESCRIPTIONS: &str = "docs/functions.md#descriptions";
const DOCS_TEMPLATES: &str = "docs/functions.md#description-templates";
const DOCS_DISABLED_KINDS: &str = "docs/functions.md#disabled-kinds";
const DOCS_REQUEST_VALIDATION: &str = "docs/chat.md#request-validation";
const DOCS_RESPONSE_MODEL: &str = "docs/chat.md#response-model";
const DOCS_STREAMING_FUNCTIONS: &str = "docs/streaming.md#function-calls";

/// Main error type for the library
#[derive(Error, Debug)]
pub enum LlmError {
    /// Function name does not match `^[A-Za-z0-9_-]{1,64}$`
    #[error("Invalid function name: {name:?}")]
    InvalidName { name: String },

    /// A node that must be self-documenting carries no description
    #[error("Missing description on {kind} at {path}")]
    MissingDescription { kind: SchemaKind, path: String },

    /// A description does not follow the template registered for its kind
    #[error("Description of {kind} at {path} does not end with {expected_suffix:?}")]
    UntemplatedDescription {
        kind: SchemaKind,
        path: String,
        expected_suffix: String,
    },

    /// A schema kind that the function options disallow
    #[error("Disallowed schema kind {kind} at {path}")]
    DisallowedKind { kind: SchemaKind, path: String },

    /// Request or argument shape mismatch
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An inbound response or frame matched no variant of the response model
    #[error("Response did not match the expected model: {message}")]
    SchemaMismatch {
        message: String,
        raw: serde_json::Value,
    },

    /// A streamed function call could not be reassembled
    #[error("Function call {name:?} on choice {index} failed: {message}")]
    FunctionCall {
        name: String,
        index: u32,
        message: String,
        #[source]
        source: Option<Box<LlmError>>,
    },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Provider-specific API errors
    #[error("API error from {provider}: {message} (code: {code:?})")]
    Api {
        provider: String,
        message: String,
        code: Option<String>,
    },

    /// Timeout errors
    #[error("Request timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// An error wrapped with additional context
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: Box<LlmError>,
    },
}

impl LlmError {
    /// Create an invalid-name error
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }

    /// Create a missing-description error
    pub fn missing_description(kind: SchemaKind, path: impl Into<String>) -> Self {
        Self::MissingDescription {
            kind,
            path: path.into(),
        }
    }

    /// Create an untemplated-description error
    pub fn untemplated_description(
        kind: SchemaKind,
        path: impl Into<String>,
        expected_suffix: impl Into<String>,
    ) -> Self {
        Self::UntemplatedDescription {
            kind,
            path: path.into(),
            expected_suffix: expected_suffix.into(),
        }
    }

    /// Create a disallowed-kind error
    pub fn disallowed_kind(kind: SchemaKind, path: impl Into<String>) -> Self {
        Self::DisallowedKind {
            kind,
            path: path.into(),
        }
    }

    /// Create a single-issue validation error
    pub fn validation(path: Vec<PathSegment>, message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::single(path, message))
    }

    /// Create a schema mismatch error carrying the raw value
    pub fn schema_mismatch(message: impl Into<String>, raw: serde_json::Value) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
            raw,
        }
    }

    /// Create a function-call aggregation error
    pub fn function_call(
        name: impl Into<String>,
        index: u32,
        message: impl Into<String>,
        source: Option<LlmError>,
    ) -> Self {
        Self::FunctionCall {
            name: name.into(),
            index,
            message: message.into(),
            source: source.map(Box::new),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create an API error
    pub fn api(
        provider: impl Into<String>,
        message: impl Into<String>,
        code: Option<String>,
    ) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
            code,
        }
    }

    /// Create a timeout error
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create a serialization error
    pub fn serialization(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Serialization {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wrap this error with additional context
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::Context {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// Short human-readable message without the nested chain
    pub fn message(&self) -> String {
        match self {
            LlmError::Context { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Structured detail, taken from the innermost error that has one
    pub fn detail(&self) -> Option<String> {
        match self {
            LlmError::Context { source, .. } => source.detail(),
            LlmError::FunctionCall {
                source: Some(source),
                ..
            } => source.detail(),
            LlmError::Validation(err) => Some(err.to_string()),
            LlmError::SchemaMismatch { raw, .. } => Some(raw.to_string()),
            LlmError::Api { message, .. } => Some(message.clone()),
            _ => None,
        }
    }

    /// Documentation pointer, taken from the innermost error that has one
    pub fn docs_path(&self) -> Option<&'static str> {
        match self {
            LlmError::Context { source, .. } => source.docs_path(),
            LlmError::FunctionCall { source, .. } => source
                .as_ref()
                .and_then(|s| s.docs_path())
                .or(Some(DOCS_STREAMING_FUNCTIONS)),
            LlmError::InvalidName { .. } => Some(DOCS_FUNCTION_NAMES),
            LlmError::MissingDescription { .. } => Some(DOCS_DESCRIPTIONS),
            LlmError::UntemplatedDescription { .. } => Some(DOCS_TEMPLATES),
            LlmError::DisallowedKind { .. } => Some(DOCS_DISABLED_KINDS),
            LlmError::Validation(_) => Some(DOCS_REQUEST_VALIDATION),
            LlmError::SchemaMismatch { .. } => Some(DOCS_RESPONSE_MODEL),
            _ => None,
        }
    }

    /// Suggested fix for authoring errors
    pub fn remedy(&self) -> Option<String> {
        match self {
            LlmError::Context { source, .. } => source.remedy(),
            LlmError::InvalidName { .. } => Some(
                "Use 1 to 64 characters from a-z, A-Z, 0-9, underscore or dash".to_string(),
            ),
            LlmError::MissingDescription { kind, .. } => Some(format!(
                "Call .describe(..) on the {kind} node, or disable require_descriptions"
            )),
            LlmError::UntemplatedDescription {
                expected_suffix, ..
            } => Some(format!(
                "End the description with {expected_suffix:?}, or use .describe_templated(..)"
            )),
            LlmError::DisallowedKind { kind, .. } => Some(format!(
                "Replace the {kind} node with an allowed kind, or remove it from disabled_kinds"
            )),
            _ => None,
        }
    }

    /// Whether the error is a developer mistake caught at format time
    pub fn is_authoring(&self) -> bool {
        match self {
            LlmError::Context { source, .. } => source.is_authoring(),
            LlmError::InvalidName { .. }
            | LlmError::MissingDescription { .. }
            | LlmError::UntemplatedDescription { .. }
            | LlmError::DisallowedKind { .. } => true,
            _ => false,
        }
    }
}

/// Convert from reqwest errors
impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::timeout(std::time::Duration::from_secs(30))
        } else if err.is_connect() {
            LlmError::network_with_source("Connection failed", err)
        } else {
            LlmError::network_with_source("HTTP request failed", err)
        }
    }
}

/// Convert from serde_json errors
impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::serialization("JSON serialization failed", err)
    }
}

/// One step in the path to an offending value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{key}"),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Render a path as `a.b.0.c`, or `<root>` when empty
pub fn format_path(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "<root>".to_string();
    }
    path.iter()
        .map(|segment| segment.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// A single shape mismatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: Vec<PathSegment>,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", format_path(&self.path), self.message)
    }
}

/// All shape mismatches found while validating one value
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn single(path: Vec<PathSegment>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue {
                path,
                message: message.into(),
            }],
        }
    }

    pub fn push(&mut self, path: Vec<PathSegment>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            path,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Paths of every issue, rendered
    pub fn paths(&self) -> Vec<String> {
        self.issues.iter().map(|i| format_path(&i.path)).collect()
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.issues.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", rendered.join("; "))
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_preserves_innermost_docs_and_detail() {
        let inner = LlmError::validation(vec!["messages".into(), 2.into()], "expected object");
        let wrapped = inner.context("request rejected").context("get() failed");

        assert_eq!(wrapped.message(), "get() failed");
        assert_eq!(wrapped.docs_path(), Some(DOCS_REQUEST_VALIDATION));
        assert_eq!(
            wrapped.detail().as_deref(),
            Some("messages.2: expected object")
        );
    }

    #[test]
    fn test_authoring_errors_carry_remedy() {
        let err = LlmError::disallowed_kind(SchemaKind::Tuple, "coords");
        assert!(err.is_authoring());
        assert!(err.remedy().unwrap().contains("tuple"));
        assert_eq!(err.docs_path(), Some(DOCS_DISABLED_KINDS));

        let err = LlmError::network("boom");
        assert!(!err.is_authoring());
        assert!(err.remedy().is_none());
    }

    #[test]
    fn test_function_call_error_falls_back_to_streaming_docs() {
        let err = LlmError::function_call("f", 0, "malformed JSON", None);
        assert_eq!(err.docs_path(), Some(DOCS_STREAMING_FUNCTIONS));

        let nested = LlmError::function_call(
            "f",
            1,
            "arguments rejected",
            Some(LlmError::validation(vec!["a".into()], "expected number")),
        );
        assert_eq!(nested.docs_path(), Some(DOCS_REQUEST_VALIDATION));
        assert_eq!(nested.detail().as_deref(), Some("a: expected number"));
    }

    #[test]
    fn test_format_path() {
        assert_eq!(format_path(&[]), "<root>");
        assert_eq!(
            format_path(&["a".into(), 0.into(), "b".into()]),
            "a.0.b"
        );
    }
}
