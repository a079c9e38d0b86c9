//! Small helpers shared by the quick query and the `call` command

use anyhow::{Context, Result};
use std::io::Read;
use typellm_core::ChatInputBuilder;

/// Resolve model priority: global CLI model, then the configured default
pub fn resolve_model(global_model: &Option<String>, default_model: &Option<String>) -> Result<String> {
    global_model
        .clone()
        .or_else(|| default_model.clone())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Model is required. Use --model (e.g., gpt-4o-mini) or set default_model in config"
            )
        })
}

/// Start an input with the optional system prompt and the user query
pub fn base_input(system: Option<&str>, query: &str) -> ChatInputBuilder {
    let builder = ChatInputBuilder::new();
    let builder = match system {
        Some(system) => builder.system(system),
        None => builder,
    };
    builder.user(query)
}

/// Apply `--option key=value` sampling settings to an input
///
/// Range checks are left to the chat, which reports them with their field path.
pub fn apply_options(
    mut builder: ChatInputBuilder,
    options: &[(String, String)],
) -> Result<ChatInputBuilder> {
    for (key, value) in options {
        builder = match key.as_str() {
            "temperature" => builder.temperature(
                value
                    .parse()
                    .with_context(|| format!("temperature must be a number, got '{value}'"))?,
            ),
            "top_p" => builder.top_p(
                value
                    .parse()
                    .with_context(|| format!("top_p must be a number, got '{value}'"))?,
            ),
            "max_tokens" => builder.max_tokens(
                value
                    .parse()
                    .with_context(|| format!("max_tokens must be an integer, got '{value}'"))?,
            ),
            other => anyhow::bail!(
                "Unknown option '{other}'. Supported options: temperature, top_p, max_tokens"
            ),
        };
    }
    Ok(builder)
}

/// Merges piped stdin and an optional query argument into a single query string.
///
/// This is used to support CLI usage like:
///   cat foo.py | typellm 'explain this'   // stdin + arg
///   cat foo.py | typellm                  // stdin only
///   typellm 'explain this'                // arg only
pub fn merge_stdin_and_query(query: Option<String>) -> Option<String> {
    let mut stdin_buf = String::new();
    let stdin_piped = !atty::is(atty::Stream::Stdin)
        && std::io::stdin().read_to_string(&mut stdin_buf).is_ok()
        && !stdin_buf.trim().is_empty();

    match (stdin_piped, query) {
        (true, Some(arg_query)) => {
            let combined = if stdin_buf.ends_with('\n') {
                format!("{stdin_buf}{arg_query}")
            } else {
                format!("{stdin_buf}\n{arg_query}")
            };
            Some(combined)
        }
        (true, None) => Some(stdin_buf),
        (false, Some(arg_query)) => Some(arg_query),
        (false, None) => None,
    }
}
