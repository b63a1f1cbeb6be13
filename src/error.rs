//! Error types for hitspec.
//!
//! This module defines custom error types using `thiserror` for clean
//! error handling throughout the application.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for hitspec operations.
///
/// The four kinds the tool distinguishes are parse, configuration,
/// execution, and network errors; each maps to a distinct exit code.
#[derive(Error, Debug)]
pub enum Error {
    /// Spec file failed to parse. Carries the exact source position
    /// and the offending line for display.
    #[error("{}:{line}:{column}: {message}\n  | {snippet}", file.display())]
    Parse {
        file: PathBuf,
        line: usize,
        column: usize,
        message: String,
        snippet: String,
    },

    /// Invalid configuration (threshold string, profile values, flags).
    /// Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// A request could not be executed (unresolved template, URL
    /// validation, hook failure, path traversal).
    #[error("execution error: {0}")]
    Execution(String),

    /// HTTP transport failure (DNS, connection, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// File I/O error.
    #[error("file error: {0}")]
    File(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Builds a parse error from a source position.
    pub fn parse(
        file: impl Into<PathBuf>,
        line: usize,
        column: usize,
        message: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self::Parse {
            file: file.into(),
            line,
            column,
            message: message.into(),
            snippet: snippet.into(),
        }
    }

    /// Maps the error to the process exit code contract:
    /// 2 parse, 3 config, 4 network, 1 everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Parse { .. } => 2,
            Self::Config(_) => 3,
            Self::Request(_) => 4,
            _ => 1,
        }
    }
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let error = Error::parse(
            "api.http",
            3,
            7,
            "unknown operator 'almost'",
            "expect status almost 200",
        );
        let text = error.to_string();
        assert!(text.contains("api.http:3:7"));
        assert!(text.contains("unknown operator"));
        assert!(text.contains("expect status almost 200"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::parse("f", 1, 1, "m", "s").exit_code(), 2);
        assert_eq!(Error::Config("bad threshold".into()).exit_code(), 3);
        assert_eq!(
            Error::Execution("path traversal detected".into()).exit_code(),
            1
        );
    }

    #[test]
    fn test_config_error_display() {
        let error = Error::Config("ramp-up exceeds duration".into());
        assert!(error.to_string().contains("configuration error"));
    }
}
