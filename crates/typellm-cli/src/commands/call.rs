use anyhow::Result;
use clap::Args;
use futures::StreamExt;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use typellm_core::{
    Chat, ChatInput, Choice, CompletionTransport, FunctionCall, FunctionCallDirective,
    FunctionDescriptor, LlmError, StreamCallbacks, StreamingChat,
};

use crate::args::{Cli, CliConfig, function_arg_completer};
use crate::cli_helpers::{apply_options, base_input, merge_stdin_and_query, resolve_model};
use crate::output::{self, OutputLevel};

#[derive(Args)]
pub struct CallArgs {
    /// Stored function to attach
    #[arg(add = function_arg_completer())]
    pub function: String,

    /// Let the model decide whether to call the function
    #[arg(long)]
    pub auto: bool,

    /// The user query/prompt
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,
}

impl CallArgs {
    pub async fn run(&self, output_level: OutputLevel, cli_config: &CliConfig, cli: &Cli) -> Result<()> {
        let store = cli_config.function_store()?;
        let Some(spec) = store.get(&self.function) else {
            output::hint(
                &format!(
                    "add it with {}",
                    output::format_command("typellm functions import <file.toml>")
                ),
                output_level,
            );
            anyhow::bail!("Function '{}' not found", self.function);
        };
        let descriptor = spec.to_descriptor(cli_config.config.require_descriptions);

        let query = merge_stdin_and_query(self.query.clone())
            .ok_or_else(|| anyhow::anyhow!("No query provided. Use --help for usage information."))?;
        let directive = if self.auto {
            FunctionCallDirective::Auto
        } else {
            descriptor.function_config()
        };
        let input = apply_options(base_input(cli.system.as_deref(), &query), &cli.option)?
            .function_call(directive)
            .build();

        let model = resolve_model(&cli.model, &cli_config.config.default_model)?;
        output::note(
            &format!("Calling {} with {}", self.function, output::format_model(&model)),
            output_level,
        );

        call_function(
            crate::commands::connect()?,
            &model,
            cli.choice_count(cli_config),
            descriptor,
            input,
            !cli.no_streaming,
            output_level,
            &mut std::io::stdout(),
        )
        .await
    }
}

/// One JSON line per choice that called the function, in index order
fn emit_call<W: Write>(out: &mut W, index: u32, call: &FunctionCall) -> Result<()> {
    let line = json!({ "index": index, "name": call.name, "arguments": call.arguments });
    writeln!(out, "{}", serde_json::to_string(&line)?)?;
    Ok(())
}

fn report_text(index: u32, text: &str, output_level: OutputLevel) {
    output::warning(
        &format!("choice {index} answered without calling the function"),
        output_level,
    );
    if !text.is_empty() {
        output::note(text, output_level);
    }
}

/// Run a chat with one attached function and write every parsed call to `out`
///
/// Arguments are validated against the function's parameter schema before
/// anything is written; a mismatch fails the whole command.
#[allow(clippy::too_many_arguments)]
pub async fn call_function<W: Write>(
    transport: Arc<dyn CompletionTransport>,
    model: &str,
    n: u32,
    function: FunctionDescriptor,
    input: ChatInput,
    streaming: bool,
    output_level: OutputLevel,
    out: &mut W,
) -> Result<()> {
    if !streaming {
        let chat = Chat::builder(transport, model)
            .n(n)
            .function(function)
            .build()?;
        let completion = chat.get(input).await?;

        for choice in completion.choices() {
            match choice {
                Choice::FunctionCall { index, call, .. } => emit_call(out, *index, call)?,
                other => report_text(other.index(), other.content().unwrap_or_default(), output_level),
            }
        }
        return Ok(());
    }

    let chat = StreamingChat::builder(transport, model)
        .n(n)
        .function(function)
        .build_streaming()?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let callbacks = StreamCallbacks::new().on_function_call(move |index, call| {
        let _ = tx.send((index, call));
        std::future::ready(Ok::<(), LlmError>(()))
    });
    let mut stream = chat.get_with_callbacks(input, callbacks).await?;

    let mut texts = vec![String::new(); n as usize];
    while let Some(chunk) = stream.next().await {
        for frame in chunk?.choices {
            if let (Some(text), Some(buffer)) = (frame.content(), texts.get_mut(frame.index() as usize)) {
                buffer.push_str(text);
            }
        }
    }
    drop(stream);

    let mut calls: Vec<Option<FunctionCall>> = vec![None; n as usize];
    while let Ok((index, call)) = rx.try_recv() {
        if let Some(slot) = calls.get_mut(index as usize) {
            *slot = Some(call);
        }
    }

    for (index, call) in calls.iter().enumerate() {
        match call {
            Some(call) => emit_call(out, index as u32, call)?,
            None => report_text(index as u32, &texts[index], output_level),
        }
    }
    Ok(())
}
