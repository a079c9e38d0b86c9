use anyhow::Result;
use clap::Args;

use crate::{
    args::{Cli, CliConfig},
    commands::env_var_status,
    constants::*,
    output::{self, OutputLevel},
};

const ENV_VARS: [&str; 4] = [
    "OPENAI_API_KEY",
    "OPENAI_ORGANIZATION",
    "OPENAI_PROJECT",
    "OPENAI_BASE_URL",
];

#[derive(Args)]
pub struct InfoArgs {}

impl InfoArgs {
    pub async fn run(&self, output_level: OutputLevel, cli_config: &CliConfig, _cli: &Cli) -> Result<()> {
        let config_path = cli_config.config_base_path.join(CONFIG_FILE_NAME);
        let functions_path = cli_config.config_base_path.join(FUNCTIONS_DIR_NAME);

        output::note(
            &format!("config file: {}", config_path.display()),
            output_level,
        );
        output::note(
            &format!("functions dir: {}", functions_path.display()),
            output_level,
        );

        output::heading("\nDefaults:", output_level);
        let config = &cli_config.config;
        output::note(
            &format!(
                "default_model = {}",
                config.default_model.as_deref().map(output::format_model).unwrap_or_else(|| "None".to_string())
            ),
            output_level,
        );
        output::note(&format!("default_n = {}", config.default_n), output_level);
        output::note(
            &format!("require_descriptions = {}", config.require_descriptions),
            output_level,
        );

        output::heading("\nEnv Vars:", output_level);
        for var in ENV_VARS {
            output::note(&format!("{var} = {}", env_var_status(var)), output_level);
        }

        output::heading("\nVersion info:", output_level);
        output::note(
            &format!("version: {}", env!("CARGO_PKG_VERSION")),
            output_level,
        );

        Ok(())
    }
}
