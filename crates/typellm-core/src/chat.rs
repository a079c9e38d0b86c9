//! Request builders
//!
//! A chat fixes the model, the number of choices and whether it streams when
//! it is built; changing any of them means building another chat. [`Chat`]
//! returns a validated [`ChatCompletion`], [`StreamingChat`] a [`ChatStream`].
//!
//! Per-call input is validated before anything is sent. Mismatches are
//! reported as [`LlmError::Validation`] with the path of every offending
//! field.

use std::sync::Arc;

use crate::error::{LlmError, PathSegment, ValidationError};
use crate::function::{FunctionDefinition, FunctionDescriptor, FunctionSet};
use crate::response::{ChatCompletion, ChoiceCount, ResponseModel};
use crate::stream::{ChatStream, StreamCallbacks};
use crate::transport::CompletionTransport;
use crate::types::{ChatInput, ChatRequest, ChatRole, FunctionCallDirective};

/// Builder for [`Chat`] and [`StreamingChat`]
pub struct ChatBuilder {
    transport: Arc<dyn CompletionTransport>,
    model: String,
    n: u32,
    functions: Vec<FunctionDescriptor>,
}

impl ChatBuilder {
    pub fn new(transport: Arc<dyn CompletionTransport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            n: ChoiceCount::MIN,
            functions: Vec::new(),
        }
    }

    /// Number of choices per completion, 1 to 20
    pub fn n(mut self, n: u32) -> Self {
        self.n = n;
        self
    }

    pub fn function(mut self, function: FunctionDescriptor) -> Self {
        self.functions.push(function);
        self
    }

    pub fn functions(mut self, functions: impl IntoIterator<Item = FunctionDescriptor>) -> Self {
        self.functions.extend(functions);
        self
    }

    /// Build a non-streaming chat
    pub fn build(self) -> Result<Chat, LlmError> {
        Ok(Chat {
            core: self.into_core()?,
        })
    }

    /// Build a streaming chat
    pub fn build_streaming(self) -> Result<StreamingChat, LlmError> {
        Ok(StreamingChat {
            core: self.into_core()?,
        })
    }

    fn into_core(self) -> Result<ChatCore, LlmError> {
        if self.model.is_empty() {
            return Err(LlmError::configuration("A chat needs a model name"));
        }
        let n = ChoiceCount::new(self.n)?;
        let functions = FunctionSet::from_functions(self.functions)?;
        // authoring errors surface here rather than on the first request
        let definitions = functions.definitions()?;

        log::debug!(
            "Built chat for model {} with n={} and {} function(s)",
            self.model,
            n.get(),
            definitions.len()
        );

        Ok(ChatCore {
            transport: self.transport,
            model: self.model,
            response_model: ResponseModel::new(n, functions),
            definitions,
        })
    }
}

impl std::fmt::Debug for ChatBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatBuilder")
            .field("model", &self.model)
            .field("n", &self.n)
            .field("functions", &self.functions.len())
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct ChatCore {
    transport: Arc<dyn CompletionTransport>,
    model: String,
    response_model: ResponseModel,
    definitions: Vec<FunctionDefinition>,
}

impl ChatCore {
    fn request(&self, input: ChatInput, stream: bool) -> Result<ChatRequest, LlmError> {
        let mut errors = ValidationError::default();
        let n = self.response_model.n().get();
        let functions = self.response_model.functions();

        if let Some(model) = &input.model {
            if model != &self.model {
                errors.push(
                    path(["model"]),
                    format!("Invalid literal value, expected {:?}", self.model),
                );
            }
        }

        if let Some(requested) = input.n {
            if requested != n {
                errors.push(path(["n"]), format!("Invalid literal value, expected {n}"));
            }
        }

        if input.messages.is_empty() {
            errors.push(path(["messages"]), "Array must contain at least 1 element(s)");
        }

        for (i, message) in input.messages.iter().enumerate() {
            let at = |field: &str| {
                vec![
                    PathSegment::from("messages"),
                    PathSegment::from(i),
                    PathSegment::from(field),
                ]
            };

            match message.role {
                ChatRole::Function => {
                    if message.name.as_deref().is_none_or(str::is_empty) {
                        errors.push(at("name"), "Required");
                    }
                    if message.content.is_none() {
                        errors.push(at("content"), "Required");
                    }
                }
                ChatRole::Assistant => {
                    if message.content.is_none() && message.function_call.is_none() {
                        errors.push(at("content"), "Required");
                    }
                }
                ChatRole::System | ChatRole::User => {
                    if message.content.is_none() {
                        errors.push(at("content"), "Required");
                    }
                    if message.function_call.is_some() {
                        errors.push(
                            at("function_call"),
                            format!("Only assistant messages may carry a function call, not {}", message.role),
                        );
                    }
                }
            }
        }

        if let Some(temperature) = input.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                errors.push(
                    path(["temperature"]),
                    format!("Number must be between 0 and 2, received {temperature}"),
                );
            }
        }

        if let Some(top_p) = input.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                errors.push(
                    path(["top_p"]),
                    format!("Number must be between 0 and 1, received {top_p}"),
                );
            }
        }

        if input.max_tokens == Some(0) {
            errors.push(path(["max_tokens"]), "Number must be greater than 0");
        }

        match &input.function_call {
            Some(_) if functions.is_empty() => {
                errors.push(
                    path(["function_call"]),
                    "function_call requires at least one attached function",
                );
            }
            Some(FunctionCallDirective::Named(name)) if functions.get(name).is_none() => {
                let expected = functions
                    .names()
                    .iter()
                    .map(|n| format!("'{n}'"))
                    .collect::<Vec<_>>()
                    .join(" | ");
                errors.push(
                    path(["function_call", "name"]),
                    format!("Invalid enum value. Expected {expected}, received {name:?}"),
                );
            }
            _ => {}
        }

        errors.into_result()?;

        Ok(ChatRequest {
            model: self.model.clone(),
            messages: input.messages,
            n,
            stream,
            temperature: input.temperature,
            top_p: input.top_p,
            max_tokens: input.max_tokens,
            functions: self.definitions.clone(),
            function_call: input.function_call,
        })
    }
}

fn path<const N: usize>(segments: [&str; N]) -> Vec<PathSegment> {
    segments.into_iter().map(PathSegment::from).collect()
}

/// Non-streaming chat with a fixed model and choice count
#[derive(Clone)]
pub struct Chat {
    core: ChatCore,
}

impl Chat {
    pub fn builder(transport: Arc<dyn CompletionTransport>, model: impl Into<String>) -> ChatBuilder {
        ChatBuilder::new(transport, model)
    }

    pub fn model(&self) -> &str {
        &self.core.model
    }

    pub fn n(&self) -> ChoiceCount {
        self.core.response_model.n()
    }

    pub fn functions(&self) -> &FunctionSet {
        self.core.response_model.functions()
    }

    /// Validate the input and build the outbound request without sending it
    pub fn request(&self, input: ChatInput) -> Result<ChatRequest, LlmError> {
        self.core.request(input, false)
    }

    /// Send one request and validate the response into exactly `n` choices
    pub async fn get(&self, input: ChatInput) -> Result<ChatCompletion, LlmError> {
        let request = self.request(input)?;
        let raw = self.core.transport.create_completion(&request).await?;
        let completion = self.core.response_model.parse_completion(&raw)?;

        log::debug!(
            "Completion {} returned {} choice(s)",
            completion.id,
            completion.choices().len()
        );
        Ok(completion)
    }
}

impl std::fmt::Debug for Chat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chat")
            .field("model", &self.core.model)
            .field("n", &self.n().get())
            .field("functions", &self.functions().names())
            .finish()
    }
}

/// Streaming chat with a fixed model and choice count
#[derive(Clone)]
pub struct StreamingChat {
    core: ChatCore,
}

impl StreamingChat {
    pub fn builder(transport: Arc<dyn CompletionTransport>, model: impl Into<String>) -> ChatBuilder {
        ChatBuilder::new(transport, model)
    }

    pub fn model(&self) -> &str {
        &self.core.model
    }

    pub fn n(&self) -> ChoiceCount {
        self.core.response_model.n()
    }

    pub fn functions(&self) -> &FunctionSet {
        self.core.response_model.functions()
    }

    /// Validate the input and build the outbound request without sending it
    pub fn request(&self, input: ChatInput) -> Result<ChatRequest, LlmError> {
        self.core.request(input, true)
    }

    /// Open a stream without callbacks
    pub async fn get(&self, input: ChatInput) -> Result<ChatStream, LlmError> {
        self.get_with_callbacks(input, StreamCallbacks::default()).await
    }

    /// Open a stream; the callbacks are awaited as frames are read
    pub async fn get_with_callbacks(
        &self,
        input: ChatInput,
        callbacks: StreamCallbacks,
    ) -> Result<ChatStream, LlmError> {
        let request = self.request(input)?;
        let source = self.core.transport.create_completion_stream(&request).await?;
        Ok(ChatStream::new(
            self.core.model.clone(),
            source,
            self.core.response_model.clone(),
            callbacks,
        ))
    }
}

impl std::fmt::Debug for StreamingChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingChat")
            .field("model", &self.core.model)
            .field("n", &self.n().get())
            .field("functions", &self.functions().names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaKind, object, string, tuple};
    use crate::types::{ChatInputBuilder, ChatMessage};
    use crate::utils::test_helpers::{
        MockTransport, chunk, completion, content_delta, finish_delta, role_delta, stop_choice,
    };
    use futures::StreamExt;
    use serde_json::json;

    fn lookup() -> FunctionDescriptor {
        FunctionDescriptor::new("lookup", object([("query", string().describe("search text"))]))
            .with_description("Look something up")
    }

    fn validation_paths(err: LlmError) -> Vec<String> {
        match err {
            LlmError::Validation(errors) => errors.paths(),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_builder_rejects_bad_n_and_authoring_errors() {
        let transport = Arc::new(MockTransport::new());
        assert!(matches!(
            Chat::builder(transport.clone(), "gpt-4").n(0).build(),
            Err(LlmError::Validation(_))
        ));

        let undocumented = FunctionDescriptor::new("f", object([("q", string())]))
            .with_description("no leaf docs");
        assert!(matches!(
            Chat::builder(transport.clone(), "gpt-4")
                .function(undocumented)
                .build(),
            Err(LlmError::MissingDescription {
                kind: SchemaKind::String,
                ..
            })
        ));

        assert!(matches!(
            Chat::builder(transport, "gpt-4")
                .function(lookup())
                .function(lookup())
                .build(),
            Err(LlmError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_transport() {
        let transport = Arc::new(MockTransport::new());
        let chat = Chat::builder(transport.clone(), "gpt-4")
            .n(2)
            .function(lookup())
            .build()
            .unwrap();

        let input = ChatInput {
            model: Some("gpt-3.5-turbo".to_string()),
            n: Some(3),
            messages: vec![ChatMessage {
                name: None,
                ..ChatMessage::function("x", "{}")
            }],
            temperature: Some(3.5),
            function_call: Some(FunctionCallDirective::named("missing")),
            ..Default::default()
        };

        let paths = validation_paths(chat.get(input).await.unwrap_err());
        assert_eq!(
            paths,
            vec![
                "model",
                "n",
                "messages.0.name",
                "temperature",
                "function_call.name"
            ]
        );
        assert!(transport.chat_requests().is_empty());
    }

    #[test]
    fn test_empty_messages_and_directive_without_functions() {
        let chat = Chat::builder(Arc::new(MockTransport::new()), "gpt-4")
            .build()
            .unwrap();
        let input = ChatInput {
            function_call: Some(FunctionCallDirective::Auto),
            ..Default::default()
        };
        assert_eq!(
            validation_paths(chat.request(input).unwrap_err()),
            vec!["messages", "function_call"]
        );
    }

    #[test]
    fn test_request_carries_fixed_fields_and_functions() {
        let chat = Chat::builder(Arc::new(MockTransport::new()), "gpt-4")
            .n(3)
            .function(lookup())
            .build()
            .unwrap();
        let request = chat
            .request(
                ChatInputBuilder::new()
                    .user("hi")
                    .model("gpt-4")
                    .function_call(FunctionCallDirective::named("lookup"))
                    .build(),
            )
            .unwrap();

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["model"], "gpt-4");
        assert_eq!(wire["n"], 3);
        assert_eq!(wire["stream"], false);
        assert_eq!(wire["functions"][0]["name"], "lookup");
        assert_eq!(wire["function_call"], json!({ "name": "lookup" }));
    }

    #[test]
    fn test_request_omits_functions_when_none_attached() {
        let chat = StreamingChat::builder(Arc::new(MockTransport::new()), "gpt-4")
            .build_streaming()
            .unwrap();
        let wire = serde_json::to_value(chat.request(ChatInputBuilder::new().user("hi").build()).unwrap())
            .unwrap();
        assert!(wire.get("functions").is_none());
        assert_eq!(wire["stream"], true);
    }

    #[tokio::test]
    async fn test_get_parses_completion() {
        let transport = Arc::new(
            MockTransport::new().with_completion(completion(vec![stop_choice(0, "Paris")])),
        );
        let chat = Chat::builder(transport.clone(), "gpt-4").build().unwrap();
        let response = chat
            .get(ChatInputBuilder::new().user("Capital of France?").build())
            .await
            .unwrap();
        assert_eq!(response.first_content(), Some("Paris"));
        assert_eq!(transport.chat_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_errors_pass_through() {
        let transport = Arc::new(
            MockTransport::new()
                .with_completion_error(LlmError::api("openai", "overloaded", Some("503".into()))),
        );
        let chat = Chat::builder(transport, "gpt-4").build().unwrap();
        assert!(matches!(
            chat.get(ChatInputBuilder::new().user("hi").build()).await,
            Err(LlmError::Api { .. })
        ));
    }

    #[tokio::test]
    async fn test_streaming_get() {
        let transport = Arc::new(MockTransport::new().with_stream(vec![
            chunk(vec![role_delta(0)]),
            chunk(vec![content_delta(0, "Hi")]),
            chunk(vec![content_delta(0, " there")]),
            chunk(vec![finish_delta(0, "stop")]),
        ]));
        let chat = StreamingChat::builder(transport.clone(), "gpt-4")
            .build_streaming()
            .unwrap();

        let stream = chat
            .get(ChatInputBuilder::new().user("hello").build())
            .await
            .unwrap();
        assert_eq!(stream.collect_text(0).await.unwrap(), "Hi there");
        assert!(transport.chat_requests()[0].stream);
    }

    #[tokio::test]
    async fn test_streaming_rejects_frame_for_unknown_choice() {
        let transport = Arc::new(
            MockTransport::new().with_stream(vec![chunk(vec![content_delta(1, "x")])]),
        );
        let chat = StreamingChat::builder(transport, "gpt-4")
            .build_streaming()
            .unwrap();
        let mut stream = chat
            .get(ChatInputBuilder::new().user("hello").build())
            .await
            .unwrap();
        assert!(matches!(
            stream.next().await,
            Some(Err(LlmError::SchemaMismatch { .. }))
        ));
    }

    #[test]
    fn test_disabled_tuple_fails_build() {
        use crate::function::FunctionOptions;
        use crate::schema::{array, number};

        let deep = object([(
            "outer",
            array(object([(
                "inner",
                tuple([number().describe("x"), number().describe("y")]),
            )])),
        )]);
        let function = FunctionDescriptor::new("plot", deep)
            .with_description("Plot points")
            .with_options(FunctionOptions::new().disable_kind(SchemaKind::Tuple));
        assert!(matches!(
            Chat::builder(Arc::new(MockTransport::new()), "gpt-4")
                .function(function)
                .build(),
            Err(LlmError::DisallowedKind {
                kind: SchemaKind::Tuple,
                ..
            })
        ));
    }
}
