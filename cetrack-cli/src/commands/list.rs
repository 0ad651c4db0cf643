//! `cetrack list` command handler

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use cetrack_core::event::RecordedEvent;
use cetrack_tracker::{HttpSinkClient, SinkClient};

use crate::cli::ListArgs;
use crate::commands::load_config;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `list` command.
pub async fn execute(
    args: ListArgs,
    config_path: Option<&Path>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let client = HttpSinkClient::new(&args.sink.sink, config.tracker.request_timeout())?;

    let events = SinkClient::list(&client, args.since).await?;
    debug!(count = events.len(), since = args.since, "events fetched");

    writer.render(&EventList {
        sink: client.base_url().to_owned(),
        since: args.since,
        verbose: args.verbose,
        events,
    })
}

/// Recorded events returned by a sink.
#[derive(Serialize)]
pub struct EventList {
    /// Sink URL
    pub sink: String,
    /// Lower sequence bound (exclusive)
    pub since: u64,
    #[serde(skip)]
    pub verbose: bool,
    /// Events in arrival order
    pub events: Vec<Arc<RecordedEvent>>,
}

impl Render for EventList {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Events recorded by {} (since {}): {}",
            self.sink.bold(),
            self.since,
            self.events.len().to_string().bold()
        )?;
        if self.events.is_empty() {
            return Ok(());
        }

        writeln!(
            w,
            "{:<6} {:<25} {:<36} {:<40} {:<40}",
            "SEQ", "RECEIVED", "ID", "SOURCE", "TYPE"
        )?;
        writeln!(w, "{}", "-".repeat(150))?;
        for event in &self.events {
            writeln!(
                w,
                "{:<6} {:<25} {:<36} {:<40} {:<40}",
                event.sequence,
                event.received_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                event.event_id(),
                event.source(),
                event.event_type()
            )?;
            if self.verbose {
                for (name, value) in &event.headers.extensions {
                    writeln!(w, "       {}: {}", name.dimmed(), value)?;
                }
                match event.payload_text() {
                    Some(text) if !text.is_empty() => writeln!(w, "       data: {text}")?,
                    Some(_) => {}
                    None => writeln!(w, "       data: <{} bytes>", event.payload.len())?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use cetrack_core::event::CloudEventHeaders;

    use super::*;

    fn list(verbose: bool) -> EventList {
        EventList {
            sink: "http://sink".to_owned(),
            since: 0,
            verbose,
            events: vec![Arc::new(RecordedEvent::new(
                1,
                CloudEventHeaders::new("evt-1", "/src", "dev.example.ping")
                    .with_extension("sinkbinding", "abc"),
                Bytes::from_static(b"hello"),
            ))],
        }
    }

    #[test]
    fn test_event_list_render_text() {
        let mut buffer = Vec::new();
        list(false).render_text(&mut buffer).expect("render");
        let text = String::from_utf8(buffer).expect("utf-8");
        assert!(text.contains("evt-1"));
        assert!(text.contains("dev.example.ping"));
        assert!(!text.contains("hello"), "payload hidden without --verbose");
    }

    #[test]
    fn test_event_list_render_verbose() {
        let mut buffer = Vec::new();
        list(true).render_text(&mut buffer).expect("render");
        let text = String::from_utf8(buffer).expect("utf-8");
        assert!(text.contains("sinkbinding"));
        assert!(text.contains("data: hello"));
    }

    #[test]
    fn test_event_list_json() {
        let json = serde_json::to_value(list(true)).expect("json");
        assert_eq!(json["events"][0]["sequence"], 1);
        assert!(json.get("verbose").is_none());
    }
}
