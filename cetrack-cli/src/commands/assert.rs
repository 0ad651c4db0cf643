//! `cetrack assert` command handler
//!
//! Attaches a tracker to an already-running sink and waits until the
//! requested number of matching events has been recorded.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use cetrack_tracker::matcher::{
    all_of, any_event, data_contains, data_json_field, data_matches, has_extension, has_id,
    has_source, has_subject, has_type, heartbeat_message,
};
use cetrack_tracker::{AssertionReport, BoxedMatcher, EventTracker, StaticProvisioner};

use crate::cli::AssertArgs;
use crate::commands::load_config;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `assert` command.
pub async fn execute(
    args: AssertArgs,
    config_path: Option<&Path>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config(config_path).await?;
    let matcher = build_matcher(&args)?;
    check_bounds(&args)?;

    let provisioner = Arc::new(StaticProvisioner::new(&args.sink.sink));
    let tracker = EventTracker::start("cetrack-cli", provisioner, &config.tracker).await?;

    let outcome = run_assertion(&tracker, &args, matcher).await;
    tracker.stop().await;

    let report = outcome?;
    info!(observed = report.observed, polls = report.polls, "assertion satisfied");
    writer.render(&AssertSummary::from_report(&args.sink.sink, &report))
}

async fn run_assertion(
    tracker: &EventTracker,
    args: &AssertArgs,
    matcher: BoxedMatcher,
) -> Result<AssertionReport, CliError> {
    let assertion = if args.none {
        tracker.assert_not(matcher)
    } else {
        match args.max {
            Some(max) if max == args.min => tracker.assert_exact(args.min, matcher),
            Some(max) => tracker.assert_in_range(args.min, max, matcher),
            None => tracker.assert_at_least(args.min, matcher),
        }
    };
    let assertion = match args.timeout {
        Some(secs) => assertion.within(Duration::from_secs(secs)),
        None => assertion,
    };
    Ok(assertion.await?)
}

fn check_bounds(args: &AssertArgs) -> Result<(), CliError> {
    match args.max {
        Some(max) if !args.none && max < args.min => Err(CliError::Command(format!(
            "--max ({max}) must be >= --min ({})",
            args.min
        ))),
        _ => Ok(()),
    }
}

/// Build the conjunction of every filter given on the command line.
pub fn build_matcher(args: &AssertArgs) -> Result<BoxedMatcher, CliError> {
    let mut matchers = Vec::new();

    if let Some(source) = &args.source {
        matchers.push(has_source(source));
    }
    if let Some(ty) = &args.event_type {
        matchers.push(has_type(ty));
    }
    if let Some(id) = &args.id {
        matchers.push(has_id(id));
    }
    if let Some(subject) = &args.subject {
        matchers.push(has_subject(subject));
    }
    for (name, value) in &args.extensions {
        matchers.push(has_extension(name, value));
    }
    if let Some(needle) = &args.data_contains {
        matchers.push(data_contains(needle));
    }
    if let Some(pattern) = &args.data_regex {
        let regex = Regex::new(pattern)
            .map_err(|e| CliError::Command(format!("invalid --data-regex: {e}")))?;
        matchers.push(data_matches(regex));
    }
    for (pointer, raw) in &args.json_fields {
        let expected =
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.clone()));
        matchers.push(data_json_field(pointer, expected));
    }
    if let Some(msg) = &args.heartbeat_msg {
        matchers.push(heartbeat_message(msg));
    }

    Ok(if matchers.is_empty() {
        any_event()
    } else {
        all_of(matchers)
    })
}

/// Successful assertion summary.
#[derive(Serialize)]
pub struct AssertSummary {
    /// Sink URL
    pub sink: String,
    /// Matcher description
    pub matcher: String,
    /// Expected count, e.g. "at least 2"
    pub expectation: String,
    /// Matching events observed
    pub observed: usize,
    /// Snapshot fetches issued
    pub polls: u64,
    /// Time to satisfaction in milliseconds
    pub elapsed_ms: u128,
    /// Reported matching events
    pub matched: Vec<MatchedEvent>,
}

/// A matching event in the summary.
#[derive(Serialize)]
pub struct MatchedEvent {
    pub sequence: u64,
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
}

impl AssertSummary {
    fn from_report(sink: &str, report: &AssertionReport) -> Self {
        Self {
            sink: sink.to_owned(),
            matcher: report.matcher.clone(),
            expectation: report.expectation.to_string(),
            observed: report.observed,
            polls: report.polls,
            elapsed_ms: report.elapsed.as_millis(),
            matched: report
                .matched
                .iter()
                .map(|e| MatchedEvent {
                    sequence: e.sequence,
                    id: e.event_id().to_owned(),
                    source: e.source().to_owned(),
                    event_type: e.event_type().to_owned(),
                })
                .collect(),
        }
    }
}

impl Render for AssertSummary {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "{} expected {} event(s) matching {}",
            "PASS".green().bold(),
            self.expectation,
            self.matcher
        )?;
        writeln!(
            w,
            "  observed: {}, polls: {}, elapsed: {}ms",
            self.observed, self.polls, self.elapsed_ms
        )?;
        for event in &self.matched {
            writeln!(
                w,
                "  #{} {} source={} type={}",
                event.sequence, event.id, event.source, event.event_type
            )?;
        }
        Ok(())
    }
}
