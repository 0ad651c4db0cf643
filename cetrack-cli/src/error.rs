//! CLI-specific error types and exit code mapping

use cetrack_core::error::{CetrackError, TrackerError};
use cetrack_tracker::AssertionError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The sink could not be reached or refused the request.
    #[error("sink not reachable: {0}")]
    SinkUnavailable(String),

    /// An assertion finished without being satisfied.
    ///
    /// Carries the full diagnostic report.
    #[error("{0}")]
    Assertion(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from cetrack-core.
    #[error("{0}")]
    Core(#[from] CetrackError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                        |
    /// |------|--------------------------------|
    /// | 0    | Success                        |
    /// | 1    | General / command error        |
    /// | 2    | Configuration error            |
    /// | 3    | Sink unreachable               |
    /// | 4    | Assertion not satisfied        |
    /// | 10   | IO error                       |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(CetrackError::Config(_)) => 2,
            Self::SinkUnavailable(_) => 3,
            Self::Assertion(_) => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<TrackerError> for CliError {
    fn from(e: TrackerError) -> Self {
        Self::SinkUnavailable(e.to_string())
    }
}

impl From<AssertionError> for CliError {
    fn from(e: AssertionError) -> Self {
        Self::Assertion(e.to_string())
    }
}

impl From<reqwest::Error> for CliError {
    fn from(e: reqwest::Error) -> Self {
        Self::SinkUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_core_config_error() {
        use cetrack_core::error::ConfigError;
        let err: CliError = CetrackError::Config(ConfigError::FileNotFound {
            path: "cetrack.toml".to_owned(),
        })
        .into();
        assert_eq!(err.exit_code(), 2, "core config error should map to 2");
    }

    #[test]
    fn test_exit_code_sink_unavailable() {
        let err: CliError = TrackerError::ReadFailure("connection refused".to_owned()).into();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_exit_code_assertion() {
        let err = CliError::Assertion("assertion timed out".to_owned());
        assert_eq!(err.exit_code(), 4);
        assert_eq!(err.to_string(), "assertion timed out");
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = CliError::Io(io_err);
        assert_eq!(err.exit_code(), 10, "io error should return exit code 10");
    }

    #[test]
    fn test_exit_code_command_error() {
        let err = CliError::Command("execution failed".to_owned());
        assert_eq!(err.exit_code(), 1);
        assert_eq!(format!("{}", err), "execution failed");
    }

    #[test]
    fn test_exit_code_json_serialize_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid json")
            .expect_err("should fail parsing");
        let err = CliError::JsonSerialize(json_err);
        assert_eq!(err.exit_code(), 1);
    }
}
