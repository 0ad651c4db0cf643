//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// cetrack -- record and assert on CloudEvents.
///
/// Use `cetrack <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "cetrack", version, about, long_about = None)]
pub struct Cli {
    /// Path to a cetrack.toml configuration file.
    ///
    /// When omitted, defaults plus `CETRACK_*` environment overrides are used.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

/// HTTP content mode used when emitting an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmitMode {
    /// Attributes in `ce-*` headers, payload as the body.
    Binary,
    /// A single `application/cloudevents+json` envelope.
    Structured,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one CloudEvent to a sink.
    Send(SendArgs),

    /// Emit heartbeat events periodically (or once).
    Heartbeats(HeartbeatsArgs),

    /// List events recorded by a sink.
    List(ListArgs),

    /// Wait until a sink has recorded matching events.
    Assert(AssertArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

/// Sink location shared by all sink-facing commands.
#[derive(Args, Debug, Clone)]
pub struct SinkArgs {
    /// Base URL of the sink (e.g. http://127.0.0.1:8080).
    #[arg(long, env = "K_SINK")]
    pub sink: String,
}

// ---- send ----

/// Send one CloudEvent.
#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub sink: SinkArgs,

    /// Event id (default: random UUID).
    #[arg(long)]
    pub id: Option<String>,

    /// Event source URI.
    #[arg(long, default_value = "cetrack/cli")]
    pub source: String,

    /// Event type.
    #[arg(long = "type", default_value = "dev.cetrack.cli.event")]
    pub event_type: String,

    /// Event subject.
    #[arg(long)]
    pub subject: Option<String>,

    /// Extension attribute as `name=value` (repeatable).
    #[arg(short = 'e', long = "extension", value_parser = parse_key_value)]
    pub extensions: Vec<(String, String)>,

    /// Payload text.
    #[arg(short, long, default_value = "")]
    pub data: String,

    /// Payload content type.
    #[arg(long)]
    pub content_type: Option<String>,

    /// HTTP content mode.
    #[arg(long, default_value = "binary")]
    pub mode: EmitMode,
}

// ---- heartbeats ----

/// Emit `dev.knative.eventing.samples.heartbeat` events.
#[derive(Args, Debug)]
pub struct HeartbeatsArgs {
    #[command(flatten)]
    pub sink: SinkArgs,

    /// Seconds between heartbeats.
    #[arg(long, default_value_t = 5)]
    pub period: u64,

    /// Label included in every payload.
    #[arg(long, default_value = "")]
    pub label: String,

    /// Message included in every payload.
    #[arg(long, default_value = "")]
    pub msg: String,

    /// Send a single heartbeat and exit.
    #[arg(long, env = "ONE_SHOT")]
    pub one_shot: bool,

    /// Stop after this many heartbeats.
    #[arg(long)]
    pub count: Option<u64>,

    /// Pod name used in the event source.
    #[arg(long, env = "POD_NAME", default_value = "heartbeats")]
    pub pod_name: String,

    /// Pod namespace used in the event source.
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    pub pod_namespace: String,

    /// CloudEvent overrides injected by a sink binding.
    ///
    /// JSON of the form `{"extensions": {"name": "value"}}`.
    #[arg(long, env = "K_CE_OVERRIDES")]
    pub ce_overrides: Option<String>,
}

// ---- list ----

/// List recorded events.
#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub sink: SinkArgs,

    /// Only events with a sequence number greater than this.
    #[arg(long, default_value_t = 0)]
    pub since: u64,

    /// Show payloads in text output.
    #[arg(short, long)]
    pub verbose: bool,
}

// ---- assert ----

/// Assert that a sink has recorded matching events.
///
/// All given filters must hold for an event to match. Without filters
/// every event matches.
#[derive(Args, Debug)]
pub struct AssertArgs {
    #[command(flatten)]
    pub sink: SinkArgs,

    /// Minimum number of matching events.
    #[arg(long, default_value_t = 1)]
    pub min: usize,

    /// Maximum number of matching events.
    #[arg(long)]
    pub max: Option<usize>,

    /// Require that no event matches (single snapshot, no waiting).
    #[arg(long, conflicts_with_all = ["min", "max"])]
    pub none: bool,

    /// Seconds to wait (default: `[tracker] default_deadline_ms`).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Required event source.
    #[arg(long)]
    pub source: Option<String>,

    /// Required event type.
    #[arg(long = "type")]
    pub event_type: Option<String>,

    /// Required event id.
    #[arg(long)]
    pub id: Option<String>,

    /// Required subject.
    #[arg(long)]
    pub subject: Option<String>,

    /// Required extension attribute as `name=value` (repeatable).
    #[arg(short = 'e', long = "extension", value_parser = parse_key_value)]
    pub extensions: Vec<(String, String)>,

    /// Payload must contain this text.
    #[arg(long)]
    pub data_contains: Option<String>,

    /// Payload must match this regular expression.
    #[arg(long)]
    pub data_regex: Option<String>,

    /// JSON payload field as `/pointer=value` (repeatable).
    ///
    /// The value is parsed as JSON and falls back to a string.
    #[arg(long = "json-field", value_parser = parse_key_value)]
    pub json_fields: Vec<(String, String)>,

    /// Match payloads produced by `cetrack heartbeats --msg <MSG>`.
    #[arg(long)]
    pub heartbeat_msg: Option<String>,
}

// ---- config ----

/// Manage cetrack configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, sink, tracker, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}

/// Parse `name=value` into a pair. The value may contain `=`.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected name=value, got '{s}'")),
    }
}
