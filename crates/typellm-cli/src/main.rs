// Binary entry point for typellm-cli

mod args;
mod cli_helpers;
mod commands;
mod config;
mod constants;
mod functions;
mod output;

use anyhow::Result;
use args::{Cli, CliConfig};
use clap::{CommandFactory, Parser};
use cli_helpers::{apply_options, base_input, merge_stdin_and_query, resolve_model};
use commands::Commands;
use output::OutputLevel;

#[tokio::main]
async fn main() {
    // Enable shell completion generation when the user sets COMPLETE=fish etc.
    clap_complete::CompleteEnv::with_factory(Cli::command).complete();
    let cli = Cli::parse();

    let output_level = OutputLevel::from_flags(cli.quiet, cli.verbose);
    output::init_logging(output_level);

    if let Err(err) = run(&cli, output_level).await {
        output::report(&err, output_level);
        std::process::exit(1);
    }
}

/// Load configuration and dispatch to the requested sub-command
pub async fn run(cli: &Cli, output_level: OutputLevel) -> Result<()> {
    let cli_config = CliConfig::load()?;
    tracing::debug!(config = %cli_config.config_base_path.display(), "loaded configuration");

    match &cli.command {
        Some(Commands::Functions(args)) => args.run(output_level, &cli_config, cli).await?,
        Some(Commands::Call(args)) => args.run(output_level, &cli_config, cli).await?,
        Some(Commands::Info(args)) => args.run(output_level, &cli_config, cli).await?,
        Some(Commands::Completions(args)) => args.run(output_level, &cli_config, cli).await?,
        None => {
            let Some(query) = merge_stdin_and_query(cli.query.clone()) else {
                anyhow::bail!("No query provided. Use --help for usage information.");
            };

            let model = resolve_model(&cli.model, &cli_config.config.default_model)?;
            let input = apply_options(base_input(cli.system.as_deref(), &query), &cli.option)?.build();

            commands::run_single_query(
                commands::connect()?,
                &model,
                cli.choice_count(&cli_config),
                input,
                !cli.no_streaming,
                output_level,
                &mut std::io::stdout(),
            )
            .await?;
        }
    }

    Ok(())
}
