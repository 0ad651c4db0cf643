//! HTTP CloudEvents emitter shared by `send` and `heartbeats`.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use cetrack_core::event::CloudEventHeaders;
use cetrack_sink::SubmitResponse;
use cetrack_sink::codec::{STRUCTURED_CONTENT_TYPE, encode_binary_headers, encode_structured};
use cetrack_sink::server::ErrorResponse;

use crate::cli::EmitMode;
use crate::error::CliError;

/// Posts CloudEvents to a single sink URL.
pub struct Emitter {
    client: reqwest::Client,
    sink: String,
}

impl Emitter {
    /// Create an emitter for `sink`. Only `http` and `https` URLs are accepted.
    pub fn new(sink: &str, timeout: Duration) -> Result<Self, CliError> {
        let url = reqwest::Url::parse(sink)
            .map_err(|e| CliError::Command(format!("invalid sink url '{sink}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CliError::Command(format!(
                "unsupported sink url scheme '{}'",
                url.scheme()
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CliError::Command(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            sink: sink.to_owned(),
        })
    }

    /// Target sink URL.
    pub fn sink(&self) -> &str {
        &self.sink
    }

    /// Send one event and return the sequence number the sink assigned, if reported.
    pub async fn emit(
        &self,
        attrs: &CloudEventHeaders,
        payload: &[u8],
        mode: EmitMode,
    ) -> Result<Option<u64>, CliError> {
        let mut request = self.client.post(&self.sink);
        request = match mode {
            EmitMode::Binary => {
                for (name, value) in encode_binary_headers(attrs) {
                    request = request.header(name, value);
                }
                request.body(payload.to_vec())
            }
            EmitMode::Structured => {
                let envelope = encode_structured(attrs, payload);
                request
                    .header(CONTENT_TYPE, STRUCTURED_CONTENT_TYPE)
                    .body(serde_json::to_vec(&envelope)?)
            }
        };

        let response = request.send().await?;
        let status = response.status();
        debug!(id = %attrs.id, %status, ?mode, "event posted");

        if status.is_success() {
            // a foreign sink may answer without a body
            let sequence = response
                .json::<SubmitResponse>()
                .await
                .ok()
                .map(|r| r.sequence);
            return Ok(sequence);
        }

        let reason = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("unknown").to_owned(),
        };
        if status == StatusCode::SERVICE_UNAVAILABLE {
            Err(CliError::SinkUnavailable(reason))
        } else {
            Err(CliError::Command(format!(
                "sink rejected event ({status}): {reason}"
            )))
        }
    }
}
