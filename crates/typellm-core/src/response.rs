//! Discriminated response model
//!
//! Raw provider responses are validated into closed sum types: [`Choice`] for
//! non-streaming completions and [`DeltaFrame`] for streamed increments. The
//! model is parameterized by the number of choices and the attached functions
//! and is built once per chat.
//!
//! A streamed delta is classified by the first predicate that matches:
//!
//! 1. `finish_reason` present: `stop`, `length`, `content_filter`, or
//!    `function_call` (only when functions are attached)
//! 2. `delta.function_call.name` present: function name announced
//! 3. `delta.role` present: role announced
//! 4. `delta.function_call.arguments` present: argument fragment
//! 5. `delta.content` is a string: content fragment
//!
//! Anything else is a [`LlmError::SchemaMismatch`] carrying the raw value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::{LlmError, PathSegment};
use crate::function::{FunctionCall, FunctionSet};
use crate::types::{ChatRole, FinishReason, FunctionCallMessage, TokenUsage};

/// Number of choices requested per completion, between 1 and 20
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChoiceCount(u32);

impl ChoiceCount {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 20;

    pub fn new(n: u32) -> Result<Self, LlmError> {
        if (Self::MIN..=Self::MAX).contains(&n) {
            Ok(Self(n))
        } else {
            Err(LlmError::validation(
                vec![PathSegment::from("n")],
                format!("n must be between {} and {}, got {n}", Self::MIN, Self::MAX),
            ))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Whether `index` addresses one of the choices
    pub fn contains(self, index: u32) -> bool {
        index < self.0
    }
}

impl Default for ChoiceCount {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u32> for ChoiceCount {
    type Error = LlmError;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

/// One terminal candidate of a non-streaming completion
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Choice {
    Stop {
        index: u32,
        content: String,
    },
    Length {
        index: u32,
        content: Option<String>,
    },
    ContentFiltered {
        index: u32,
        content: Option<String>,
    },
    /// The model asked for a function call; `finish_reason` is `stop` or `function_call`
    FunctionCall {
        index: u32,
        finish_reason: FinishReason,
        call: FunctionCall,
    },
}

impl Choice {
    pub fn index(&self) -> u32 {
        match self {
            Choice::Stop { index, .. }
            | Choice::Length { index, .. }
            | Choice::ContentFiltered { index, .. }
            | Choice::FunctionCall { index, .. } => *index,
        }
    }

    pub fn finish_reason(&self) -> FinishReason {
        match self {
            Choice::Stop { .. } => FinishReason::Stop,
            Choice::Length { .. } => FinishReason::Length,
            Choice::ContentFiltered { .. } => FinishReason::ContentFilter,
            Choice::FunctionCall { finish_reason, .. } => *finish_reason,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Choice::Stop { content, .. } => Some(content),
            Choice::Length { content, .. } | Choice::ContentFiltered { content, .. } => {
                content.as_deref()
            }
            Choice::FunctionCall { .. } => None,
        }
    }

    pub fn function_call(&self) -> Option<&FunctionCall> {
        match self {
            Choice::FunctionCall { call, .. } => Some(call),
            _ => None,
        }
    }
}

/// A validated non-streaming completion with exactly N choices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletion {
    pub id: String,
    pub model: String,
    pub created: u64,
    pub usage: Option<TokenUsage>,
    choices: Vec<Choice>,
}

impl ChatCompletion {
    /// Choices in index order; `choices()[i].index() == i`
    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    pub fn into_choices(self) -> Vec<Choice> {
        self.choices
    }

    pub fn choice(&self, index: u32) -> Option<&Choice> {
        self.choices.get(index as usize)
    }

    /// Text of the first choice, if it carries any
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().and_then(Choice::content)
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.choices.iter().filter_map(Choice::function_call)
    }
}

/// One classified increment of a streamed choice
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeltaFrame {
    Role {
        index: u32,
        role: ChatRole,
    },
    Content {
        index: u32,
        content: String,
    },
    FunctionName {
        index: u32,
        name: String,
        /// Argument text that arrived together with the name
        arguments: String,
    },
    FunctionArguments {
        index: u32,
        arguments: String,
    },
    /// The reassembled, validated call
    FunctionCompleted {
        index: u32,
        call: FunctionCall,
    },
    Stop {
        index: u32,
    },
    Length {
        index: u32,
    },
    ContentFiltered {
        index: u32,
    },
}

impl DeltaFrame {
    pub fn index(&self) -> u32 {
        match self {
            DeltaFrame::Role { index, .. }
            | DeltaFrame::Content { index, .. }
            | DeltaFrame::FunctionName { index, .. }
            | DeltaFrame::FunctionArguments { index, .. }
            | DeltaFrame::FunctionCompleted { index, .. }
            | DeltaFrame::Stop { index }
            | DeltaFrame::Length { index }
            | DeltaFrame::ContentFiltered { index } => *index,
        }
    }

    /// Whether this frame ends its choice
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeltaFrame::FunctionCompleted { .. }
                | DeltaFrame::Stop { .. }
                | DeltaFrame::Length { .. }
                | DeltaFrame::ContentFiltered { .. }
        )
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        match self {
            DeltaFrame::FunctionCompleted { .. } => Some(FinishReason::FunctionCall),
            DeltaFrame::Stop { .. } => Some(FinishReason::Stop),
            DeltaFrame::Length { .. } => Some(FinishReason::Length),
            DeltaFrame::ContentFiltered { .. } => Some(FinishReason::ContentFilter),
            _ => None,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            DeltaFrame::Content { content, .. } => Some(content),
            _ => None,
        }
    }
}

/// One validated streamed frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub model: String,
    pub created: u64,
    pub choices: Vec<DeltaFrame>,
}

/// Classifier output for one raw delta choice
///
/// Identical to [`DeltaFrame`] except that a finished function call is not yet
/// reassembled; the stream session turns it into
/// [`DeltaFrame::FunctionCompleted`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Delta {
    Frame(DeltaFrame),
    FunctionCallFinished { index: u32 },
}

/// Header of a raw chunk plus its classified deltas
#[derive(Debug)]
pub(crate) struct ClassifiedChunk {
    pub id: String,
    pub model: String,
    pub created: u64,
    pub deltas: Vec<Delta>,
}

#[derive(Deserialize)]
struct RawCompletion {
    id: String,
    model: String,
    #[serde(default)]
    created: u64,
    #[serde(default)]
    usage: Option<TokenUsage>,
    choices: Vec<RawChoice>,
}

#[derive(Deserialize)]
struct RawChoice {
    index: u32,
    #[serde(default)]
    finish_reason: Option<String>,
    message: RawMessage,
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCallMessage>,
}

#[derive(Deserialize)]
struct RawChunk {
    id: String,
    model: String,
    #[serde(default)]
    created: u64,
    #[serde(default)]
    choices: Vec<Value>,
}

#[derive(Deserialize)]
struct RawDeltaChoice {
    index: u32,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    delta: RawDelta,
}

#[derive(Deserialize, Default)]
struct RawDelta {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<RawFunctionDelta>,
}

#[derive(Deserialize, Default)]
struct RawFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Validation model for the responses of one chat
#[derive(Debug, Clone, Default)]
pub struct ResponseModel {
    n: ChoiceCount,
    functions: FunctionSet,
}

impl ResponseModel {
    pub fn new(n: ChoiceCount, functions: FunctionSet) -> Self {
        Self { n, functions }
    }

    pub fn n(&self) -> ChoiceCount {
        self.n
    }

    pub fn functions(&self) -> &FunctionSet {
        &self.functions
    }

    pub fn has_functions(&self) -> bool {
        !self.functions.is_empty()
    }

    fn check_index(&self, index: u32, raw: &Value) -> Result<(), LlmError> {
        if self.n.contains(index) {
            Ok(())
        } else {
            Err(LlmError::schema_mismatch(
                format!("choice index {index} is out of range for n = {}", self.n.get()),
                raw.clone(),
            ))
        }
    }

    fn finish_reason(&self, reason: &str, raw: &Value) -> Result<FinishReason, LlmError> {
        let parsed = FinishReason::from_str(reason).map_err(|_| {
            LlmError::schema_mismatch(format!("unknown finish_reason {reason:?}"), raw.clone())
        })?;
        if parsed == FinishReason::FunctionCall && !self.has_functions() {
            return Err(LlmError::schema_mismatch(
                "finish_reason function_call without attached functions",
                raw.clone(),
            ));
        }
        Ok(parsed)
    }

    /// Validate a non-streaming response
    pub fn parse_completion(&self, raw: &Value) -> Result<ChatCompletion, LlmError> {
        let completion: RawCompletion = serde_json::from_value(raw.clone()).map_err(|e| {
            LlmError::schema_mismatch(format!("malformed completion: {e}"), raw.clone())
        })?;

        if completion.choices.len() != self.n.get() as usize {
            return Err(LlmError::schema_mismatch(
                format!(
                    "expected {} choice(s), received {}",
                    self.n.get(),
                    completion.choices.len()
                ),
                raw.clone(),
            ));
        }

        let mut choices = Vec::with_capacity(completion.choices.len());
        for (position, choice) in completion.choices.into_iter().enumerate() {
            if choice.index as usize != position {
                return Err(LlmError::schema_mismatch(
                    format!("choice at position {position} has index {}", choice.index),
                    raw.clone(),
                ));
            }
            choices.push(self.classify_choice(choice, raw)?);
        }

        Ok(ChatCompletion {
            id: completion.id,
            model: completion.model,
            created: completion.created,
            usage: completion.usage,
            choices,
        })
    }

    fn classify_choice(&self, choice: RawChoice, raw: &Value) -> Result<Choice, LlmError> {
        let index = choice.index;
        let Some(reason) = choice.finish_reason.as_deref() else {
            return Err(LlmError::schema_mismatch(
                format!("choice {index} has no finish_reason"),
                raw.clone(),
            ));
        };
        let reason = self.finish_reason(reason, raw)?;

        match (reason, choice.message.function_call) {
            (FinishReason::Stop | FinishReason::FunctionCall, Some(call)) => {
                if !self.has_functions() {
                    return Err(LlmError::schema_mismatch(
                        format!("choice {index} calls a function but none are attached"),
                        raw.clone(),
                    ));
                }
                let call = self.functions.resolve(index, &call.name, &call.arguments)?;
                Ok(Choice::FunctionCall {
                    index,
                    finish_reason: reason,
                    call,
                })
            }
            (FinishReason::FunctionCall, None) => Err(LlmError::schema_mismatch(
                format!("choice {index} finished with function_call but carries no call"),
                raw.clone(),
            )),
            (FinishReason::Stop, None) => match choice.message.content {
                Some(content) => Ok(Choice::Stop { index, content }),
                None => Err(LlmError::schema_mismatch(
                    format!("choice {index} stopped without content"),
                    raw.clone(),
                )),
            },
            (FinishReason::Length, _) => Ok(Choice::Length {
                index,
                content: choice.message.content,
            }),
            (FinishReason::ContentFilter, _) => Ok(Choice::ContentFiltered {
                index,
                content: choice.message.content,
            }),
        }
    }

    /// Validate the envelope of a streamed frame and classify each of its choices
    pub(crate) fn classify_chunk(&self, raw: &Value) -> Result<ClassifiedChunk, LlmError> {
        let chunk: RawChunk = serde_json::from_value(raw.clone())
            .map_err(|e| LlmError::schema_mismatch(format!("malformed chunk: {e}"), raw.clone()))?;

        let deltas = chunk
            .choices
            .iter()
            .map(|choice| self.classify_delta(choice))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ClassifiedChunk {
            id: chunk.id,
            model: chunk.model,
            created: chunk.created,
            deltas,
        })
    }

    /// Ordered-predicate classifier for one raw delta choice
    pub(crate) fn classify_delta(&self, raw: &Value) -> Result<Delta, LlmError> {
        let choice: RawDeltaChoice = serde_json::from_value(raw.clone())
            .map_err(|e| LlmError::schema_mismatch(format!("malformed delta: {e}"), raw.clone()))?;
        let index = choice.index;
        self.check_index(index, raw)?;

        if let Some(reason) = choice.finish_reason.as_deref() {
            return Ok(match self.finish_reason(reason, raw)? {
                FinishReason::Stop => Delta::Frame(DeltaFrame::Stop { index }),
                FinishReason::Length => Delta::Frame(DeltaFrame::Length { index }),
                FinishReason::ContentFilter => Delta::Frame(DeltaFrame::ContentFiltered { index }),
                FinishReason::FunctionCall => Delta::FunctionCallFinished { index },
            });
        }

        let delta = choice.delta;
        let function = delta.function_call.unwrap_or_default();
        let calls_function = function.name.is_some() || function.arguments.is_some();
        if calls_function && !self.has_functions() {
            return Err(LlmError::schema_mismatch(
                "function call delta without attached functions",
                raw.clone(),
            ));
        }

        if let Some(name) = function.name {
            return Ok(Delta::Frame(DeltaFrame::FunctionName {
                index,
                name,
                arguments: function.arguments.unwrap_or_default(),
            }));
        }

        if let Some(role) = delta.role {
            let role = ChatRole::from_str(&role).map_err(|_| {
                LlmError::schema_mismatch(format!("unknown role {role:?}"), raw.clone())
            })?;
            return Ok(Delta::Frame(DeltaFrame::Role { index, role }));
        }

        if let Some(arguments) = function.arguments {
            return Ok(Delta::Frame(DeltaFrame::FunctionArguments { index, arguments }));
        }

        if let Some(content) = delta.content {
            return Ok(Delta::Frame(DeltaFrame::Content { index, content }));
        }

        Err(LlmError::schema_mismatch(
            "delta matches no frame variant",
            raw.clone(),
        ))
    }
}
