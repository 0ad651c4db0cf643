//! Subcommand handlers.

pub mod assert;
pub mod config;
pub mod heartbeats;
pub mod list;
pub mod send;

use std::path::Path;

use cetrack_core::CetrackConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

/// Run the parsed command.
pub async fn dispatch(cli: Cli, writer: &OutputWriter) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Send(args) => send::execute(args, config_path, writer).await,
        Commands::Heartbeats(args) => heartbeats::execute(args, config_path, writer).await,
        Commands::List(args) => list::execute(args, config_path, writer).await,
        Commands::Assert(args) => assert::execute(args, config_path, writer).await,
        Commands::Config(args) => config::execute(args, config_path, writer).await,
    }
}

/// Load the effective configuration.
///
/// With a path: file, then env overrides, then validation.
/// Without one: defaults, then env overrides, then validation.
pub async fn load_config(config_path: Option<&Path>) -> Result<CetrackConfig, CliError> {
    match config_path {
        Some(path) => Ok(CetrackConfig::load(path).await?),
        None => {
            let mut config = CetrackConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }
}
