//! # typellm-core - typed chat completions
//!
//! A client for OpenAI-style chat and embedding APIs whose responses are
//! validated into precise Rust types.
//!
//! ## Features
//!
//! - **Typed schemas** - describe function parameters as a [`Schema`] tree,
//!   compile it to JSON Schema and validate arguments against it
//! - **Authoring checks** - required descriptions, description templates and
//!   disallowed kinds are enforced on every node before a request is sent
//! - **Fixed response shape** - a chat fixes its model and choice count, so a
//!   completion always has exactly `n` choices in index order
//! - **Streaming reassembly** - streamed deltas are classified into
//!   [`DeltaFrame`]s, function-call arguments are accumulated per choice and
//!   validated when the call completes
//! - **Backpressure and cancellation** - [`ChatStream`] pulls one frame at a
//!   time and cancels the HTTP stream when dropped
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use typellm_core::{Chat, ChatInputBuilder, OpenAIClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(OpenAIClient::from_env()?);
//!     let chat = Chat::builder(client, "gpt-4o-mini").build()?;
//!
//!     let completion = chat
//!         .get(ChatInputBuilder::new().user("What is the capital of France?").build())
//!         .await?;
//!     println!("{}", completion.first_content().unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! ## Functions
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use typellm_core::schema::{enumeration, object, string};
//! use typellm_core::{Chat, ChatInputBuilder, FunctionCallDirective, FunctionDescriptor, OpenAIClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let weather = FunctionDescriptor::new(
//!         "get_weather",
//!         object([
//!             ("location", string().describe("City and state, e.g. San Francisco, CA")),
//!             ("unit", enumeration(["celsius", "fahrenheit"]).describe_templated("Temperature unit")),
//!         ]),
//!     )
//!     .with_description("Get the current weather in a location");
//!
//!     let chat = Chat::builder(Arc::new(OpenAIClient::from_env()?), "gpt-4o-mini")
//!         .function(weather)
//!         .build()?;
//!
//!     let input = ChatInputBuilder::new()
//!         .user("How warm is it in Lisbon?")
//!         .function_call(FunctionCallDirective::named("get_weather"))
//!         .build();
//!
//!     for call in chat.get(input).await?.function_calls() {
//!         println!("{} {}", call.name, call.arguments);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use std::sync::Arc;
//! use typellm_core::{ChatInputBuilder, OpenAIClient, StreamCallbacks, StreamingChat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let chat = StreamingChat::builder(Arc::new(OpenAIClient::from_env()?), "gpt-4o-mini")
//!         .build_streaming()?;
//!
//!     let callbacks = StreamCallbacks::new().on_done(|frames| async move {
//!         println!("\n{} frames", frames.len());
//!         Ok(())
//!     });
//!     let mut stream = chat
//!         .get_with_callbacks(ChatInputBuilder::new().user("Tell me a story").build(), callbacks)
//!         .await?;
//!
//!     while let Some(chunk) = stream.next().await {
//!         for frame in chunk?.choices {
//!             if let Some(text) = frame.content() {
//!                 print!("{text}");
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, LlmError>`](LlmError). Authoring errors
//! carry a documentation path and a remedy:
//!
//! ```rust
//! use typellm_core::schema::{object, string};
//! use typellm_core::FunctionDescriptor;
//!
//! let f = FunctionDescriptor::new("search", object([("q", string())]))
//!     .with_description("Search the docs");
//! let err = f.format().unwrap_err();
//! assert!(err.is_authoring());
//! assert!(err.remedy().is_some());
//! ```

pub mod chat;
pub mod config;
pub mod embedding;
pub mod error;
pub mod function;
pub mod metrics;
pub mod response;
pub mod schema;
pub mod stream;
pub mod transport;
pub mod types;
pub mod utils;

#[cfg(test)]
mod tests;

pub use chat::{Chat, ChatBuilder, StreamingChat};
pub use config::{ConfigBuilder, OpenAIConfig, ProviderConfig};
pub use embedding::{Embedding, EmbeddingInput, EmbeddingResponse, EmbeddingText};
pub use error::{LlmError, PathSegment, ValidationError, ValidationIssue};
pub use function::{
    FunctionCall, FunctionDefinition, FunctionDescriptor, FunctionOptions, FunctionSet,
    FunctionSpec,
};
pub use response::{ChatCompletion, ChatCompletionChunk, Choice, ChoiceCount, DeltaFrame};
pub use schema::{Schema, SchemaKind};
pub use stream::{ChannelStream, ChatStream, FrameSource, StreamCallbacks, StreamSource};
pub use transport::{CompletionTransport, OpenAIClient};
pub use types::{
    ChatInput, ChatInputBuilder, ChatMessage, ChatRequest, ChatRole, FinishReason,
    FunctionCallDirective, TokenUsage,
};
pub use utils::sse::sse_lines;
