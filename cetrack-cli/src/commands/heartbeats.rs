//! `cetrack heartbeats` command handler
//!
//! Periodically emits heartbeat events the way a sink-bound workload does:
//! the sink URL comes from `K_SINK` and extension overrides from
//! `K_CE_OVERRIDES`.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use cetrack_core::event::{APPLICATION_JSON, CloudEventHeaders};

use crate::cli::{EmitMode, HeartbeatsArgs};
use crate::commands::load_config;
use crate::emitter::Emitter;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Event type of every heartbeat.
pub const HEARTBEAT_TYPE: &str = "dev.knative.eventing.samples.heartbeat";

/// Source prefix; the fragment is `<namespace>/<pod>`.
pub const HEARTBEAT_SOURCE_PREFIX: &str = "https://knative.dev/eventing/test/heartbeats/";

/// Heartbeat payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Heartbeat number, starting at 1
    pub id: u64,
    /// Free-form label
    pub label: String,
    /// Free-form message
    pub msg: String,
}

/// CloudEvent overrides injected through `K_CE_OVERRIDES`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CeOverrides {
    /// Extension attributes added to every event
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

impl CeOverrides {
    /// Parse overrides; an absent or blank value means none.
    pub fn parse(raw: Option<&str>) -> Result<Self, CliError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(json) => serde_json::from_str(json)
                .map_err(|e| CliError::Command(format!("invalid K_CE_OVERRIDES: {e}"))),
        }
    }
}

/// Event source for a pod.
pub fn heartbeat_source(namespace: &str, pod: &str) -> String {
    format!("{HEARTBEAT_SOURCE_PREFIX}#{namespace}/{pod}")
}

/// Build the `seq`-th heartbeat event.
pub fn heartbeat_event(
    seq: u64,
    args: &HeartbeatsArgs,
    overrides: &CeOverrides,
) -> Result<(CloudEventHeaders, Vec<u8>), CliError> {
    let mut attrs = CloudEventHeaders::new(
        uuid::Uuid::new_v4().to_string(),
        heartbeat_source(&args.pod_namespace, &args.pod_name),
        HEARTBEAT_TYPE,
    )
    .with_data_content_type(APPLICATION_JSON);
    attrs.time = Some(chrono::Utc::now().to_rfc3339());
    for (name, value) in &overrides.extensions {
        attrs = attrs.with_extension(name, value);
    }

    let payload = serde_json::to_vec(&Heartbeat {
        id: seq,
        label: args.label.clone(),
        msg: args.msg.clone(),
    })?;
    Ok((attrs, payload))
}

/// Execute the `heartbeats` command.
///
/// Runs until `--count` heartbeats were attempted, after one heartbeat
/// with `--one-shot`, or until Ctrl-C.
pub async fn execute(
    args: HeartbeatsArgs,
    config_path: Option<&Path>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let overrides = CeOverrides::parse(args.ce_overrides.as_deref())?;
    let emitter = Emitter::new(&args.sink.sink, config.tracker.request_timeout())?;

    let limit = if args.one_shot { Some(1) } else { args.count };
    let period = Duration::from_secs(args.period.max(1));

    info!(
        sink = %emitter.sink(),
        source = %heartbeat_source(&args.pod_namespace, &args.pod_name),
        ?period,
        ?limit,
        "emitting heartbeats"
    );

    let mut report = HeartbeatsReport {
        sink: emitter.sink().to_owned(),
        sent: 0,
        failed: 0,
        last_error: None,
    };

    let mut ticker = tokio::time::interval(period);
    let mut seq = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }

        seq += 1;
        let (attrs, payload) = heartbeat_event(seq, &args, &overrides)?;
        match emitter.emit(&attrs, &payload, EmitMode::Binary).await {
            Ok(sequence) => {
                report.sent += 1;
                info!(id = seq, ?sequence, "heartbeat sent");
            }
            Err(e) => {
                report.failed += 1;
                warn!(id = seq, error = %e, "heartbeat failed");
                report.last_error = Some(e.to_string());
            }
        }

        if limit.is_some_and(|n| seq >= n) {
            break;
        }
    }

    writer.render(&report)?;

    if report.sent == 0 {
        if let Some(reason) = report.last_error {
            return Err(CliError::SinkUnavailable(reason));
        }
    }
    Ok(())
}

/// Summary of a heartbeat run.
#[derive(Serialize)]
pub struct HeartbeatsReport {
    /// Sink URL
    pub sink: String,
    /// Heartbeats accepted by the sink
    pub sent: u64,
    /// Heartbeats that failed
    pub failed: u64,
    /// Last failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Render for HeartbeatsReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Heartbeats to {}", self.sink.bold())?;
        writeln!(w, "  Sent:   {}", self.sent.to_string().green())?;
        if self.failed > 0 {
            writeln!(w, "  Failed: {}", self.failed.to_string().red())?;
        }
        if let Some(err) = &self.last_error {
            writeln!(w, "  Last error: {}", err.red())?;
        }
        Ok(())
    }
}
