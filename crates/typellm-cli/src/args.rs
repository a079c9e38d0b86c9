use etcetera::BaseStrategy;
use std::path::PathBuf;

use clap::Parser;
use clap_complete::CompletionCandidate;
use clap_complete::engine::ArgValueCompleter;
use std::ffi::OsStr;

use crate::commands::Commands;
use crate::config::{self, Config};
use crate::constants::BINARY_NAME;
use crate::functions::FunctionStore;

// Example strings for after_long_help
const CLI_EXAMPLES: &str = r#"EXAMPLES:
  typellm "What is Rust?"                          # Quick query with default model
  typellm -m gpt-4o "Explain async Rust"          # Query with specific model
  typellm -n 3 "Name a color"                      # Three choices, printed in index order
  typellm --no-streaming "Tell me a story"         # Wait for the whole completion
  typellm --option temperature=0.2 "Summarize"     # Sampling options
  cat notes.md | typellm "Summarize this"          # Piped input is prepended to the query
  typellm functions list                           # Show stored functions
  typellm call get_weather "Weather in Lisbon?"    # Force a function call"#;

/// Remove surrounding quotes from a value
fn unquote_value(value: &str) -> String {
    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

/// Parse a single key-value pair
/// Supports formats: "key=value", "key=\"quoted value\"", "key value"
fn parse_key_val(s: &str) -> anyhow::Result<(String, String)> {
    let s = s.trim();

    if s.is_empty() {
        return Err(anyhow::anyhow!(
            "invalid KEY=VALUE or KEY VALUE format: empty input"
        ));
    }

    // Prefer "key=value" format
    if let Some(pos) = s.find('=') {
        let key = s[..pos].trim().to_string();
        if key.is_empty() {
            return Err(anyhow::anyhow!("invalid KEY=VALUE format: empty key"));
        }
        return Ok((key, unquote_value(s[pos + 1..].trim())));
    }

    let pos = s.find(' ').ok_or_else(|| {
        anyhow::anyhow!("invalid KEY=VALUE or KEY VALUE format: no '=' or space found in `{s}`")
    })?;

    let key = s[..pos].trim().to_string();
    if key.is_empty() {
        return Err(anyhow::anyhow!("invalid KEY VALUE format: empty key"));
    }
    Ok((key, unquote_value(s[pos + 1..].trim())))
}

pub struct CliConfig {
    pub config_base_path: PathBuf,
    pub config: Config,
}

impl CliConfig {
    pub fn load() -> anyhow::Result<Self> {
        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| anyhow::anyhow!("Failed to locate the config directory: {e}"))?;

        let config_base_path = strategy.config_dir().join(BINARY_NAME);
        let config = config::Config::load(&config_base_path)?;

        Ok(Self {
            config_base_path,
            config,
        })
    }

    pub fn function_store(&self) -> anyhow::Result<FunctionStore> {
        let mut store = FunctionStore::new(&self.config_base_path);
        store.load()?;
        Ok(store)
    }
}

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(about = "Typed chat completions from the command line")]
#[command(name = BINARY_NAME)]
#[command(after_long_help = CLI_EXAMPLES)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model name (e.g., gpt-4o-mini); defaults to default_model from config
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Number of choices to request (1-20)
    #[arg(short = 'n', long = "choices", global = true)]
    pub n: Option<u32>,

    /// Set options in format: --option key=value (temperature, top_p, max_tokens)
    #[arg(long, value_parser = parse_key_val, global = true)]
    pub option: Vec<(String, String)>,

    /// Verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Quiet output (only show errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable streaming output (stream tokens by default)
    #[arg(long, global = true)]
    pub no_streaming: bool,

    /// System prompt
    #[arg(long, global = true)]
    pub system: Option<String>,

    /// The user query/prompt
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,
}

impl Cli {
    /// Choice count from the flag, else from config
    pub fn choice_count(&self, cli_config: &CliConfig) -> u32 {
        self.n.unwrap_or(cli_config.config.default_n)
    }
}

/// Complete stored function names
pub fn function_completer(current: &OsStr) -> Vec<CompletionCandidate> {
    let cur_str = current.to_string_lossy();

    let Ok(cli_config) = CliConfig::load() else {
        return Vec::new();
    };
    let Ok(store) = cli_config.function_store() else {
        return Vec::new();
    };

    store
        .list()
        .into_iter()
        .filter(|name| name.starts_with(cur_str.as_ref()))
        .map(CompletionCandidate::new)
        .collect()
}

pub fn function_arg_completer() -> ArgValueCompleter {
    ArgValueCompleter::new(function_completer)
}
