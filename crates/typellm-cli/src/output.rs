//! Output formatting and logging utilities
//!
//! Colored status messages go to stderr so stdout carries only model output
//! and JSON, which keeps the binary pipe-friendly.

use owo_colors::OwoColorize;
use std::env;
use tracing_subscriber::EnvFilter;
use typellm_core::LlmError;

/// Output level for controlling what gets displayed
#[derive(Debug, Clone, Copy)]
pub enum OutputLevel {
    /// Show all output (normal mode)
    Normal,
    /// Show only errors (quiet mode)
    Quiet,
    /// Show extra debug information (verbose mode)
    Verbose,
}

impl OutputLevel {
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    /// Check if user-facing messages should be shown (excludes errors/hints which always show)
    pub fn show_user(&self) -> bool {
        matches!(self, Self::Normal | Self::Verbose)
    }

    fn default_filter(&self) -> &'static str {
        match self {
            Self::Verbose => "debug",
            Self::Normal | Self::Quiet => "warn",
        }
    }
}

/// Install the fmt subscriber; `RUST_LOG` wins over the level flags
///
/// Records emitted through the `log` facade by the library are forwarded too.
pub fn init_logging(output_level: OutputLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(output_level.default_filter()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!colors_disabled())
        .try_init();
}

/// Check if colored output should be disabled
fn colors_disabled() -> bool {
    env::var("NO_COLOR").is_ok()
        || env::var("TERM").is_ok_and(|t| t == "dumb")
        || !atty::is(atty::Stream::Stderr)
}

fn print_colored<T>(msg: &str, styled_msg: T, output_level: OutputLevel, always_show: bool)
where
    T: std::fmt::Display,
{
    if always_show || output_level.show_user() {
        if !colors_disabled() {
            eprintln!("{styled_msg}");
        } else {
            eprintln!("{msg}");
        }
    }
}

/// Print a heading with bold formatting
pub fn heading(msg: &str, output_level: OutputLevel) {
    print_colored(msg, msg.bold(), output_level, false);
}

/// Print a note message with default formatting (no prefix)
pub fn note(msg: &str, output_level: OutputLevel) {
    if output_level.show_user() {
        eprintln!("{msg}");
    }
}

/// Print a success message with green color (no prefix)
pub fn success(msg: &str, output_level: OutputLevel) {
    print_colored(msg, msg.green(), output_level, false);
}

/// Print a progress message with cyan color and ellipsis
pub fn progress(msg: &str, output_level: OutputLevel) {
    if output_level.show_user() {
        let progress_msg = if msg.ends_with("...") || msg.ends_with("…") {
            msg.to_string()
        } else {
            format!("{msg}…")
        };

        print_colored(&progress_msg, progress_msg.cyan(), output_level, false);
    }
}

/// Print a warning message with "Warning:" prefix in yellow
pub fn warning(msg: &str, output_level: OutputLevel) {
    if output_level.show_user() {
        if !colors_disabled() {
            eprintln!("{} {}", "Warning:".yellow().bold(), msg.yellow());
        } else {
            eprintln!("Warning: {msg}");
        }
    }
}

/// Print an error message with "Error:" prefix in red (always shown)
pub fn error(msg: &str, _output_level: OutputLevel) {
    if !colors_disabled() {
        eprintln!("{} {}", "Error:".red().bold(), msg.red());
    } else {
        eprintln!("Error: {msg}");
    }
}

/// Print a hint message with "Hint:" prefix in blue (always shown)
pub fn hint(msg: &str, _output_level: OutputLevel) {
    if !colors_disabled() {
        eprintln!("{} {}", "Hint:".blue().bold(), msg.blue());
    } else {
        eprintln!("Hint: {msg}");
    }
}

/// Print a top-level failure, with the remedy and docs pointer of a library error
pub fn report(err: &anyhow::Error, output_level: OutputLevel) {
    error(&format!("{err:#}"), output_level);

    let Some(llm_error) = err.downcast_ref::<LlmError>() else {
        return;
    };
    if let Some(detail) = llm_error.detail() {
        note(&format!("  {detail}"), output_level);
    }
    if let Some(remedy) = llm_error.remedy() {
        hint(&remedy, output_level);
    }
    if let Some(docs) = llm_error.docs_path() {
        hint(&format!("see {docs}"), output_level);
    }
}

/// Format a model name with colors
pub fn format_model(model: &str) -> String {
    if colors_disabled() {
        model.to_string()
    } else {
        model.cyan().to_string()
    }
}

/// Format a command or option with colors
pub fn format_command(cmd: &str) -> String {
    if colors_disabled() {
        format!("`{cmd}`")
    } else {
        format!("`{}`", cmd.yellow().bold())
    }
}
