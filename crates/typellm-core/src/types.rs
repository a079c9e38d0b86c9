use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::function::FunctionDefinition;

/// Represents a message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default)]
    pub content: Option<String>,
    /// Function name, required on `function` role messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallMessage>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            name: None,
            function_call: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    /// Result of a function call, fed back to the model
    pub fn function(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(ChatRole::Function, content)
        }
    }

    /// Assistant message that requested a function call
    pub fn function_request(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: None,
            name: None,
            function_call: Some(FunctionCallMessage {
                name: name.into(),
                arguments: arguments.into(),
            }),
        }
    }
}

/// Role of the message sender
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Function,
}

/// Function call as it appears on an assistant message, arguments still raw JSON text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallMessage {
    pub name: String,
    pub arguments: String,
}

/// Constrains which function, if any, the model may call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DirectiveRepr", into = "DirectiveRepr")]
pub enum FunctionCallDirective {
    None,
    Auto,
    Named(String),
}

impl FunctionCallDirective {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum DirectiveRepr {
    Mode(String),
    Named { name: String },
}

impl TryFrom<DirectiveRepr> for FunctionCallDirective {
    type Error = String;

    fn try_from(repr: DirectiveRepr) -> Result<Self, Self::Error> {
        match repr {
            DirectiveRepr::Mode(mode) => match mode.as_str() {
                "none" => Ok(Self::None),
                "auto" => Ok(Self::Auto),
                other => Err(format!("unknown function_call mode {other:?}")),
            },
            DirectiveRepr::Named { name } => Ok(Self::Named(name)),
        }
    }
}

impl From<FunctionCallDirective> for DirectiveRepr {
    fn from(directive: FunctionCallDirective) -> Self {
        match directive {
            FunctionCallDirective::None => DirectiveRepr::Mode("none".to_string()),
            FunctionCallDirective::Auto => DirectiveRepr::Mode("auto".to_string()),
            FunctionCallDirective::Named(name) => DirectiveRepr::Named { name },
        }
    }
}

/// Why a choice stopped generating
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    FunctionCall,
    ContentFilter,
}

/// Token usage information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Per-call input to a chat
///
/// `model` and `n` may be given but must equal the values the chat was built
/// with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallDirective>,
}

/// Outbound request body for `/chat/completions`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub n: u32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallDirective>,
}

/// Builder pattern for chat input
#[derive(Debug, Default)]
pub struct ChatInputBuilder {
    input: ChatInput,
}

impl ChatInputBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: ChatMessage) -> Self {
        self.input.messages.push(message);
        self
    }

    pub fn add_message(self, role: ChatRole, content: impl Into<String>) -> Self {
        self.message(ChatMessage::new(role, content))
    }

    pub fn system(self, content: impl Into<String>) -> Self {
        self.add_message(ChatRole::System, content)
    }

    pub fn user(self, content: impl Into<String>) -> Self {
        self.add_message(ChatRole::User, content)
    }

    pub fn assistant(self, content: impl Into<String>) -> Self {
        self.add_message(ChatRole::Assistant, content)
    }

    pub fn function_result(self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.message(ChatMessage::function(name, content))
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.input.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.input.top_p = Some(top_p);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.input.max_tokens = Some(max_tokens);
        self
    }

    pub fn function_call(mut self, directive: FunctionCallDirective) -> Self {
        self.input.function_call = Some(directive);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.input.model = Some(model.into());
        self
    }

    pub fn n(mut self, n: u32) -> Self {
        self.input.n = Some(n);
        self
    }

    pub fn build(self) -> ChatInput {
        self.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_directive_wire_forms() {
        assert_eq!(
            serde_json::to_value(FunctionCallDirective::Auto).unwrap(),
            json!("auto")
        );
        assert_eq!(
            serde_json::to_value(FunctionCallDirective::named("get_weather")).unwrap(),
            json!({ "name": "get_weather" })
        );
        let parsed: FunctionCallDirective = serde_json::from_value(json!("none")).unwrap();
        assert_eq!(parsed, FunctionCallDirective::None);
        assert!(serde_json::from_value::<FunctionCallDirective>(json!("always")).is_err());
    }

    #[test]
    fn test_function_message_shape() {
        let message = ChatMessage::function("get_weather", "{\"temp\": 21}");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({ "role": "function", "name": "get_weather", "content": "{\"temp\": 21}" })
        );
    }

    #[test]
    fn test_builder_collects_messages() {
        let input = ChatInputBuilder::new()
            .system("Be brief")
            .user("Hi")
            .temperature(0.2)
            .build();
        assert_eq!(input.messages.len(), 2);
        assert_eq!(input.messages[1].role, ChatRole::User);
        assert_eq!(input.temperature, Some(0.2));
    }

    #[test]
    fn test_finish_reason_names() {
        assert_eq!(FinishReason::ContentFilter.to_string(), "content_filter");
        assert_eq!(
            "function_call".parse::<FinishReason>().unwrap(),
            FinishReason::FunctionCall
        );
    }
}
