use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;
use typellm_core::{FunctionDefinition, FunctionSpec};

use crate::args::{Cli, CliConfig, function_arg_completer};
use crate::functions::FunctionStore;
use crate::output::{self, OutputLevel};

#[derive(Args)]
pub struct FunctionsArgs {
    #[command(subcommand)]
    pub action: FunctionAction,
}

#[derive(Subcommand)]
pub enum FunctionAction {
    /// List stored functions
    List,
    /// Print a stored definition as TOML
    Show {
        /// Function name
        #[arg(add = function_arg_completer())]
        name: String,
    },
    /// Print the wire definition sent to the provider as JSON
    Compile {
        /// Function name
        #[arg(add = function_arg_completer())]
        name: String,
    },
    /// Compile every stored function and report authoring errors
    Check,
    /// Check a TOML definition and copy it into the store
    Import {
        /// Path to the TOML file
        path: PathBuf,
        /// Overwrite if the function already exists
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Remove a stored function
    Remove {
        /// Function name
        #[arg(add = function_arg_completer())]
        name: String,
    },
}

/// Compile a spec with the configured description requirement
pub fn compile(spec: &FunctionSpec, require_descriptions: bool) -> Result<FunctionDefinition> {
    Ok(spec.to_descriptor(require_descriptions).format()?.clone())
}

impl FunctionsArgs {
    pub async fn run(&self, output_level: OutputLevel, cli_config: &CliConfig, _cli: &Cli) -> Result<()> {
        let mut store = cli_config.function_store()?;
        let require_descriptions = cli_config.config.require_descriptions;

        match &self.action {
            FunctionAction::List => {
                let names = store.list();
                if names.is_empty() {
                    output::note("No functions found.", output_level);
                } else {
                    output::heading("Stored functions:", output_level);
                    for name in names {
                        let description = store
                            .get(&name)
                            .and_then(|spec| spec.description.as_deref())
                            .unwrap_or("(no description)");
                        println!("{name}\t{description}");
                    }
                }
            }
            FunctionAction::Show { name } => {
                let spec = lookup(&store, name)?;
                print!("{}", spec.to_toml()?);
            }
            FunctionAction::Compile { name } => {
                let definition = compile(lookup(&store, name)?, require_descriptions)?;
                println!("{}", serde_json::to_string_pretty(&definition)?);
            }
            FunctionAction::Check => {
                let failed = check_all(&store, require_descriptions, output_level);
                if failed > 0 {
                    anyhow::bail!("{failed} function(s) failed to compile");
                }
            }
            FunctionAction::Import { path, force } => {
                let spec = FunctionStore::read_file(path)?;
                compile(&spec, require_descriptions)?;

                if store.contains(&spec.name) && !*force {
                    output::warning(
                        &format!(
                            "Function '{}' already exists. Use --force to overwrite.",
                            spec.name
                        ),
                        output_level,
                    );
                    return Ok(());
                }

                store.save(&spec)?;
                output::success(&format!("Saved function '{}'.", spec.name), output_level);
            }
            FunctionAction::Remove { name } => {
                if store.delete(name)? {
                    output::success(&format!("Removed function '{name}'."), output_level);
                } else {
                    output::warning(&format!("Function '{name}' not found."), output_level);
                }
            }
        }

        Ok(())
    }
}

fn lookup<'a>(store: &'a FunctionStore, name: &str) -> Result<&'a FunctionSpec> {
    store
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("Function '{name}' not found in {}", store.functions_dir().display()))
}

/// Returns the number of functions that failed
fn check_all(store: &FunctionStore, require_descriptions: bool, output_level: OutputLevel) -> usize {
    let mut failed = 0;
    for name in store.list() {
        let Some(spec) = store.get(&name) else {
            continue;
        };
        match compile(spec, require_descriptions) {
            Ok(_) => output::success(&format!("{name}: ok"), output_level),
            Err(e) => {
                failed += 1;
                output::report(&e.context(name.clone()), output_level);
            }
        }
    }
    failed
}
