use crate::chat::{Chat, StreamingChat};
use crate::error::LlmError;
use crate::function::{FunctionCall, FunctionDescriptor, FunctionOptions};
use crate::response::{Choice, DeltaFrame};
use crate::schema::{
    self, CompileOptions, Schema, SchemaKind, array, bigint, boolean, date, enumeration,
    integer, native_enum, number, object, string, tuple,
};
use crate::stream::StreamCallbacks;
use crate::types::{ChatInputBuilder, ChatMessage, FinishReason, FunctionCallDirective};
use crate::utils::test_helpers::{
    MockTransport, chunk, completion, content_delta, finish_delta, function_args_delta,
    function_call_choice, function_name_delta, role_delta, stop_choice,
};
use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

const DESCRIBED_KINDS: [SchemaKind; 7] = [
    SchemaKind::String,
    SchemaKind::Number,
    SchemaKind::Boolean,
    SchemaKind::Date,
    SchemaKind::Enum,
    SchemaKind::NativeEnum,
    SchemaKind::BigInt,
];

/// A tree with one leaf of every kind that needs a description; the leaf of
/// kind `bare` is left undescribed
fn documented_tree(bare: Option<SchemaKind>) -> Schema {
    let leaf = |node: Schema, text: &str| {
        if bare == Some(node.kind()) {
            node
        } else {
            node.describe_templated(text)
        }
    };

    object([
        ("name", leaf(string(), "Display name")),
        ("score", leaf(number(), "Score between 0 and 1")),
        ("active", leaf(boolean(), "Whether the account is active")),
        ("since", leaf(date(), "Creation date")),
        (
            "details",
            object([
                ("tier", leaf(enumeration(["free", "pro"]), "Plan tier")),
                ("level", leaf(native_enum([1, 2, 3]), "Support level")),
                ("budget", leaf(bigint(), "Budget in cents").optional()),
            ]),
        ),
    ])
}

fn weather() -> FunctionDescriptor {
    FunctionDescriptor::new(
        "get_weather",
        object([
            (
                "location",
                string().describe("City and state, e.g. San Francisco, CA"),
            ),
            (
                "unit",
                enumeration(["celsius", "fahrenheit"])
                    .describe_templated("Temperature unit")
                    .optional(),
            ),
        ]),
    )
    .with_description("Get the current weather in a location")
}

fn sum() -> FunctionDescriptor {
    FunctionDescriptor::new("f", object([("a", integer().describe("First operand"))]))
        .with_description("Test function")
}

#[tokio::test]
async fn test_completion_has_n_unique_choices_for_every_n() {
    for n in 1..=20u32 {
        let raw = completion((0..n).map(|i| stop_choice(i, "ok")).collect());
        let transport = Arc::new(MockTransport::new().with_completion(raw));
        let chat = Chat::builder(transport.clone(), "gpt-4").n(n).build().unwrap();

        let response = chat
            .get(ChatInputBuilder::new().user("hi").build())
            .await
            .unwrap();

        assert_eq!(response.choices().len(), n as usize);
        let mut indices: Vec<u32> = response.choices().iter().map(Choice::index).collect();
        indices.dedup();
        assert_eq!(indices, (0..n).collect::<Vec<_>>());
        assert_eq!(transport.chat_requests()[0].n, n);
    }
}

#[test]
fn test_complete_descriptions_compile() {
    let options = CompileOptions::default().require_descriptions(true);
    assert!(schema::compile(&documented_tree(None), &options).is_ok());
}

#[test]
fn test_each_missing_description_reports_its_kind() {
    let options = CompileOptions::default().require_descriptions(true);
    for kind in DESCRIBED_KINDS {
        match schema::compile(&documented_tree(Some(kind)), &options) {
            Err(LlmError::MissingDescription { kind: reported, .. }) => {
                assert_eq!(reported, kind)
            }
            other => panic!("{kind}: unexpected {other:?}"),
        }
    }
}

#[test]
fn test_compilation_is_idempotent() {
    let tree = documented_tree(None);
    let options = CompileOptions::default();
    let first = schema::compile(&tree, &options).unwrap();
    let second = schema::compile(&tree, &options).unwrap();
    assert_eq!(first.document(), second.document());
}

#[test]
fn test_disabled_kind_three_levels_deep() {
    let parameters = object([(
        "route",
        object([(
            "legs",
            array(object([(
                "point",
                tuple([number().describe("Latitude"), number().describe("Longitude")]),
            )])),
        )]),
    )]);
    let function = FunctionDescriptor::new("plan_route", parameters)
        .with_description("Plan a route through points")
        .with_options(FunctionOptions::new().disable_kind(SchemaKind::Tuple));

    match function.format() {
        Err(LlmError::DisallowedKind { kind, path }) => {
            assert_eq!(kind, SchemaKind::Tuple);
            assert!(path.contains("point"));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn test_five_message_function_call_round_trip() {
    for reason in ["function_call", "stop"] {
        let raw = completion(vec![function_call_choice(
            0,
            reason,
            "get_weather",
            r#"{"location": "Lisbon, PT", "unit": "celsius"}"#,
        )]);
        let transport = Arc::new(MockTransport::new().with_completion(raw));
        let chat = Chat::builder(transport.clone(), "gpt-4")
            .function(weather())
            .build()
            .unwrap();

        let input = ChatInputBuilder::new()
            .system("You are a weather assistant")
            .user("Is it warm in Porto?")
            .message(ChatMessage::function_request(
                "get_weather",
                r#"{"location": "Porto, PT"}"#,
            ))
            .function_result("get_weather", r#"{"temperature": 19}"#)
            .user("And in Lisbon?")
            .function_call(FunctionCallDirective::Auto)
            .build();
        assert_eq!(input.messages.len(), 5);

        let response = chat.get(input).await.unwrap();
        match &response.choices()[0] {
            Choice::FunctionCall {
                index,
                finish_reason,
                call,
            } => {
                assert_eq!(*index, 0);
                assert!(matches!(
                    finish_reason,
                    FinishReason::FunctionCall | FinishReason::Stop
                ));
                assert_eq!(call.name, "get_weather");
                assert!(weather().parameters().accepts(&call.arguments));
                assert_eq!(call.arguments["unit"], "celsius");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let sent = &transport.chat_requests()[0];
        assert_eq!(sent.functions[0].name, "get_weather");
        assert!(!sent.stream);
    }
}

#[tokio::test]
async fn test_non_matching_arguments_fail_the_completion() {
    let raw = completion(vec![function_call_choice(
        0,
        "function_call",
        "get_weather",
        r#"{"unit": "kelvin"}"#,
    )]);
    let transport = Arc::new(MockTransport::new().with_completion(raw));
    let chat = Chat::builder(transport, "gpt-4")
        .function(weather())
        .build()
        .unwrap();

    let err = chat
        .get(ChatInputBuilder::new().user("weather?").build())
        .await
        .unwrap_err();
    match &err {
        LlmError::FunctionCall { name, .. } => assert_eq!(name, "get_weather"),
        other => panic!("unexpected: {other}"),
    }
    assert!(err.detail().is_some());
    assert!(err.docs_path().is_some());
}

fn streamed_story() -> Vec<Value> {
    vec![
        chunk(vec![role_delta(0), role_delta(1)]),
        chunk(vec![content_delta(0, "Once")]),
        chunk(vec![content_delta(1, "Long ago")]),
        chunk(vec![content_delta(0, " upon a time")]),
        chunk(vec![finish_delta(0, "stop")]),
        chunk(vec![finish_delta(1, "length")]),
    ]
}

#[tokio::test]
async fn test_streamed_frames_keep_order_and_feed_callbacks() {
    let transport = Arc::new(MockTransport::new().with_stream(streamed_story()));
    let chat = StreamingChat::builder(transport, "gpt-4")
        .n(2)
        .build_streaming()
        .unwrap();

    let per_frame = Arc::new(Mutex::new(Vec::new()));
    let done = Arc::new(Mutex::new(Vec::new()));
    let callbacks = {
        let per_frame = per_frame.clone();
        let done = done.clone();
        StreamCallbacks::new()
            .on_frame(move |frame| {
                let per_frame = per_frame.clone();
                async move {
                    tokio::task::yield_now().await;
                    per_frame.lock().unwrap().push(frame);
                    Ok(())
                }
            })
            .on_done(move |frames| async move {
                *done.lock().unwrap() = frames;
                Ok(())
            })
    };

    let stream = chat
        .get_with_callbacks(ChatInputBuilder::new().user("story").build(), callbacks)
        .await
        .unwrap();
    let yielded: Vec<_> = stream.map(|c| c.unwrap()).collect().await;

    let expected_indices = vec![vec![0, 1], vec![0], vec![1], vec![0], vec![0], vec![1]];
    let indices: Vec<Vec<u32>> = yielded
        .iter()
        .map(|c| c.choices.iter().map(DeltaFrame::index).collect())
        .collect();
    assert_eq!(indices, expected_indices);

    let per_frame = per_frame.lock().unwrap().clone();
    assert_eq!(per_frame, yielded);
    assert_eq!(*done.lock().unwrap(), per_frame);
}

#[tokio::test]
async fn test_stream_reads_at_most_one_frame_ahead() {
    let transport = Arc::new(MockTransport::new().with_stream(streamed_story()));
    let chat = StreamingChat::builder(transport.clone(), "gpt-4")
        .n(2)
        .build_streaming()
        .unwrap();
    let mut stream = chat
        .get(ChatInputBuilder::new().user("story").build())
        .await
        .unwrap();
    let counters = transport.stream_counters().remove(0);

    assert_eq!(counters.pulls(), 0);
    let mut delivered = 0;
    while let Some(frame) = stream.next().await {
        frame.unwrap();
        delivered += 1;
        assert!(counters.pulls() <= delivered + 1);
        assert!(counters.pulls() >= delivered);
    }
    assert_eq!(delivered, 6);
}

#[tokio::test]
async fn test_cancel_after_k_frames() {
    for k in 0..4 {
        let transport = Arc::new(MockTransport::new().with_stream(streamed_story()));
        let chat = StreamingChat::builder(transport.clone(), "gpt-4")
            .n(2)
            .build_streaming()
            .unwrap();
        let mut stream = chat
            .get(ChatInputBuilder::new().user("story").build())
            .await
            .unwrap();
        let counters = transport.stream_counters().remove(0);

        for _ in 0..k {
            stream.next().await.unwrap().unwrap();
        }
        stream.cancel();

        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
        drop(stream);
        assert_eq!(counters.cancels(), 1, "k = {k}");
        assert_eq!(counters.pulls(), k, "k = {k}");
    }
}

#[tokio::test]
async fn test_streamed_function_call_fires_callback_once() {
    let frames = vec![
        chunk(vec![function_name_delta(0, "f", "")]),
        chunk(vec![function_args_delta(0, "{\"a\":")]),
        chunk(vec![function_args_delta(0, "1}")]),
        chunk(vec![finish_delta(0, "function_call")]),
    ];
    let transport = Arc::new(MockTransport::new().with_stream(frames));
    let chat = StreamingChat::builder(transport, "gpt-4")
        .function(sum())
        .build_streaming()
        .unwrap();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let callbacks = {
        let calls = calls.clone();
        StreamCallbacks::new().on_function_call(move |_, call| {
            calls.lock().unwrap().push(call);
            async { Ok(()) }
        })
    };

    let stream = chat
        .get_with_callbacks(
            ChatInputBuilder::new()
                .user("add")
                .function_call(FunctionCallDirective::named("f"))
                .build(),
            callbacks,
        )
        .await
        .unwrap();
    let frames: Vec<_> = stream.collect().await;
    assert!(frames.iter().all(Result::is_ok));

    assert_eq!(
        *calls.lock().unwrap(),
        vec![FunctionCall {
            name: "f".to_string(),
            arguments: json!({ "a": 1 }),
        }]
    );
}

#[tokio::test]
async fn test_channel_adapter_cancels_when_receiver_dropped() {
    let transport = Arc::new(MockTransport::new().with_stream(streamed_story()));
    let chat = StreamingChat::builder(transport.clone(), "gpt-4")
        .n(2)
        .build_streaming()
        .unwrap();
    let stream = chat
        .get(ChatInputBuilder::new().user("story").build())
        .await
        .unwrap();
    let counters = transport.stream_counters().remove(0);

    let mut channel = stream.into_channel(1);
    assert!(channel.next().await.unwrap().is_ok());
    drop(channel);

    for _ in 0..100 {
        if counters.cancels() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(counters.cancels(), 1);
    assert!(counters.pulls() < 6);
}
