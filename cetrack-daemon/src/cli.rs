//! CLI argument definitions for cetrack-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use cetrack_core::CetrackConfig;

/// cetrack event recording daemon.
///
/// Runs a CloudEvents sink that records every accepted event in arrival
/// order and serves the recorded history to trackers over HTTP.
#[derive(Parser, Debug)]
#[command(name = "cetrack-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to cetrack.toml configuration file.
    ///
    /// When omitted, built-in defaults and `CETRACK_*` environment
    /// variables are used.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the sink listen address (e.g. 0.0.0.0:8080).
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Override the maximum number of recorded events.
    #[arg(long)]
    pub max_events: Option<usize>,

    /// Validate configuration and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut CetrackConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(bind) = &self.bind {
            config.sink.bind_addr.clone_from(bind);
        }
        if let Some(max_events) = self.max_events {
            config.sink.max_events = max_events;
        }
    }
}
