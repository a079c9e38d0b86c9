use anyhow::Result;
use clap::Subcommand;
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use typellm_core::{
    Chat, ChatInput, CompletionTransport, FinishReason, OpenAIClient, StreamCallbacks,
    StreamingChat,
};

use crate::output::{self, OutputLevel};

pub mod call;
pub mod completions;
pub mod functions;
pub mod info;

pub use call::CallArgs;
pub use completions::CompletionsArgs;
pub use functions::FunctionsArgs;
pub use info::InfoArgs;

const FUNCTIONS_EXAMPLES: &str = r#"EXAMPLES:
  typellm functions list                       # Show stored functions
  typellm functions import ./get_weather.toml  # Check and store a definition
  typellm functions compile get_weather        # Print the wire definition as JSON
  typellm functions check                      # Check every stored definition
  typellm functions remove get_weather         # Delete a definition"#;

const CALL_EXAMPLES: &str = r#"EXAMPLES:
  typellm call get_weather "How warm is Lisbon?"        # Force a call, print its arguments
  typellm call get_weather --auto "Hi there"            # Let the model decide
  typellm call get_weather -n 3 "Weather in Oslo?"      # One JSON line per choice"#;

const INFO_EXAMPLES: &str = r#"EXAMPLES:
  typellm info                                 # Show config paths and env var status"#;

const COMPLETIONS_EXAMPLES: &str = r#"EXAMPLES:
  typellm completions bash > ~/.bashrc         # Add bash completions
  typellm completions zsh > ~/.zshrc           # Add zsh completions
  typellm completions fish > ~/.config/fish/completions/typellm.fish"#;

#[derive(Subcommand)]
pub enum Commands {
    /// Manage stored function definitions
    #[command(after_long_help = FUNCTIONS_EXAMPLES)]
    Functions(FunctionsArgs),
    /// Ask the model to call a stored function and print the parsed arguments
    #[command(after_long_help = CALL_EXAMPLES)]
    Call(CallArgs),
    /// Show configuration and system information
    #[command(after_long_help = INFO_EXAMPLES)]
    Info(InfoArgs),
    /// Generate shell completions
    #[command(after_long_help = COMPLETIONS_EXAMPLES)]
    Completions(CompletionsArgs),
}

/// Check environment variable status
fn env_var_status(var_name: &str) -> &'static str {
    if std::env::var(var_name).is_ok() {
        "Present"
    } else {
        "None"
    }
}

/// Build the HTTP transport from `OPENAI_*` variables
pub fn connect() -> Result<Arc<dyn CompletionTransport>> {
    Ok(Arc::new(OpenAIClient::from_env()?))
}

fn warn_unfinished(index: u32, reason: FinishReason, output_level: OutputLevel) {
    match reason {
        FinishReason::Length => output::warning(
            &format!("choice {index} stopped at the token limit"),
            output_level,
        ),
        FinishReason::ContentFilter => output::warning(
            &format!("choice {index} was cut by the content filter"),
            output_level,
        ),
        FinishReason::Stop | FinishReason::FunctionCall => {}
    }
}

/// Run one query and write the choices to `out` in index order
///
/// When streaming, choice 0 is written as it arrives and the other choices
/// once the stream ends.
pub async fn run_single_query<W: Write>(
    transport: Arc<dyn CompletionTransport>,
    model: &str,
    n: u32,
    input: ChatInput,
    streaming: bool,
    output_level: OutputLevel,
    out: &mut W,
) -> Result<()> {
    if !streaming {
        let chat = Chat::builder(transport, model).n(n).build()?;
        output::progress("Generating response", output_level);

        let completion = chat.get(input).await?;
        for choice in completion.choices() {
            if n > 1 {
                writeln!(out, "[{}]", choice.index())?;
            }
            writeln!(out, "{}", choice.content().unwrap_or_default())?;
            warn_unfinished(choice.index(), choice.finish_reason(), output_level);
        }
        if let Some(usage) = &completion.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion usage"
            );
        }
        return Ok(());
    }

    let chat = StreamingChat::builder(transport, model)
        .n(n)
        .build_streaming()?;
    let callbacks = StreamCallbacks::new().on_done(|frames| async move {
        tracing::debug!(frames = frames.len(), "stream finished");
        Ok(())
    });
    let mut stream = chat.get_with_callbacks(input, callbacks).await?;

    let mut texts = vec![String::new(); n as usize];
    let mut finishes: Vec<Option<FinishReason>> = vec![None; n as usize];
    if n > 1 {
        writeln!(out, "[0]")?;
    }
    while let Some(chunk) = stream.next().await {
        for frame in chunk?.choices {
            let index = frame.index() as usize;
            if let Some(text) = frame.content() {
                if index == 0 {
                    write!(out, "{text}")?;
                    out.flush()?;
                } else if let Some(buffer) = texts.get_mut(index) {
                    buffer.push_str(text);
                }
            }
            if let Some(slot) = finishes.get_mut(index) {
                *slot = frame.finish_reason().or(*slot);
            }
        }
    }
    writeln!(out)?;

    for (index, text) in texts.iter().enumerate().skip(1) {
        writeln!(out, "[{index}]")?;
        writeln!(out, "{text}")?;
    }
    for (index, reason) in finishes.into_iter().enumerate() {
        if let Some(reason) = reason {
            warn_unfinished(index as u32, reason, output_level);
        }
    }
    Ok(())
}
