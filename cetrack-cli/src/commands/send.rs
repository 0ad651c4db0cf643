//! `cetrack send` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use cetrack_core::event::CloudEventHeaders;

use crate::cli::{EmitMode, SendArgs};
use crate::commands::load_config;
use crate::emitter::Emitter;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `send` command.
pub async fn execute(
    args: SendArgs,
    config_path: Option<&Path>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let emitter = Emitter::new(&args.sink.sink, config.tracker.request_timeout())?;

    let attrs = build_headers(&args);
    let sequence = emitter
        .emit(&attrs, args.data.as_bytes(), args.mode)
        .await?;
    info!(id = %attrs.id, sink = %emitter.sink(), ?sequence, "event sent");

    writer.render(&SendReport {
        sink: emitter.sink().to_owned(),
        id: attrs.id,
        source: attrs.source,
        event_type: attrs.ty,
        mode: args.mode,
        sequence,
    })
}

/// Build event attributes from the command arguments.
pub fn build_headers(args: &SendArgs) -> CloudEventHeaders {
    let id = args
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut attrs = CloudEventHeaders::new(id, &args.source, &args.event_type);
    attrs.subject.clone_from(&args.subject);
    attrs.time = Some(chrono::Utc::now().to_rfc3339());
    attrs.datacontenttype.clone_from(&args.content_type);
    for (name, value) in &args.extensions {
        attrs = attrs.with_extension(name, value);
    }
    attrs
}

/// Result of a single send.
#[derive(Serialize)]
pub struct SendReport {
    /// Sink URL the event was posted to
    pub sink: String,
    /// Event id
    pub id: String,
    /// Event source
    pub source: String,
    /// Event type
    #[serde(rename = "type")]
    pub event_type: String,
    /// Content mode used
    #[serde(serialize_with = "serialize_mode")]
    pub mode: EmitMode,
    /// Sequence number assigned by the sink (if reported)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

fn serialize_mode<S: serde::Serializer>(mode: &EmitMode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(match mode {
        EmitMode::Binary => "binary",
        EmitMode::Structured => "structured",
    })
}

impl Render for SendReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        write!(w, "{} event {} to {}", "Sent".green().bold(), self.id.bold(), self.sink)?;
        match self.sequence {
            Some(seq) => writeln!(w, " (sequence {seq})"),
            None => writeln!(w),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::SinkArgs;

    fn args() -> SendArgs {
        SendArgs {
            sink: SinkArgs {
                sink: "http://127.0.0.1:8080".to_owned(),
            },
            id: Some("evt-1".to_owned()),
            source: "/src".to_owned(),
            event_type: "dev.example.ping".to_owned(),
            subject: Some("subj".to_owned()),
            extensions: vec![("SinkBinding".to_owned(), "abc".to_owned())],
            data: "{}".to_owned(),
            content_type: Some("application/json".to_owned()),
            mode: EmitMode::Binary,
        }
    }

    #[test]
    fn test_build_headers_from_args() {
        let attrs = build_headers(&args());
        assert_eq!(attrs.id, "evt-1");
        assert_eq!(attrs.source, "/src");
        assert_eq!(attrs.ty, "dev.example.ping");
        assert_eq!(attrs.subject.as_deref(), Some("subj"));
        assert_eq!(attrs.datacontenttype.as_deref(), Some("application/json"));
        assert_eq!(attrs.extension("sinkbinding"), Some("abc"));
        assert!(attrs.time.is_some());
    }

    #[test]
    fn test_build_headers_generates_id() {
        let mut args = args();
        args.id = None;
        let first = build_headers(&args);
        let second = build_headers(&args);
        assert!(!first.id.is_empty());
        assert_ne!(first.id, second.id, "generated ids should be unique");
    }

    #[test]
    fn test_send_report_render_and_json() {
        let report = SendReport {
            sink: "http://sink".to_owned(),
            id: "evt-1".to_owned(),
            source: "/src".to_owned(),
            event_type: "t".to_owned(),
            mode: EmitMode::Structured,
            sequence: Some(7),
        };

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let text = String::from_utf8(buffer).expect("utf-8");
        assert!(text.contains("evt-1"));
        assert!(text.contains("sequence 7"));

        let json: serde_json::Value =
            serde_json::to_value(&report).expect("json serialization");
        assert_eq!(json["mode"], "structured");
        assert_eq!(json["type"], "t");
        assert_eq!(json["sequence"], 7);
    }
}
