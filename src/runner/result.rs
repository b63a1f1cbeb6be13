//! Test run result types.
//!
//! One [`RequestResult`] per executed (or skipped) request, grouped
//! into a [`FileResult`] per spec file and a [`RunResult`] for the
//! whole invocation. All types serialize for the JSON output mode.

use std::path::PathBuf;

use serde::Serialize;

use crate::check::{AssertionResult, CapturedValue};

/// Echo of the outbound request for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEcho {
    pub method: String,
    pub url: String,
}

/// Echo of the response. Long bodies are truncated for display.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEcho {
    pub status: u16,
    pub body: String,
}

const MAX_ECHO_BODY: usize = 2048;

impl ResponseEcho {
    pub fn new(status: u16, body: &str) -> Self {
        let body = if body.len() > MAX_ECHO_BODY {
            let mut truncated: String = body.chars().take(MAX_ECHO_BODY).collect();
            truncated.push_str("…[truncated]");
            truncated
        } else {
            body.to_string()
        };
        Self { status, body }
    }
}

/// Outcome of a single request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestResult {
    pub name: String,
    pub passed: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestEcho>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseEcho>,
    pub assertions: Vec<AssertionResult>,
    pub captures: Vec<CapturedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestResult {
    /// A request that never executed.
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            skipped: true,
            skip_reason: Some(reason.into()),
            duration_ms: 0,
            request: None,
            response: None,
            assertions: Vec::new(),
            captures: Vec::new(),
            error: None,
        }
    }

    /// A request that failed before or during execution.
    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            skipped: false,
            skip_reason: None,
            duration_ms: 0,
            request: None,
            response: None,
            assertions: Vec::new(),
            captures: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Skipped requests do not count against the run.
    pub fn ok(&self) -> bool {
        self.passed || self.skipped
    }
}

/// Results for one spec file.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file: PathBuf,
    pub results: Vec<RequestResult>,
}

impl FileResult {
    pub fn passed(&self) -> bool {
        self.results.iter().all(RequestResult::ok)
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        let passed = self.results.iter().filter(|r| r.passed).count();
        let skipped = self.results.iter().filter(|r| r.skipped).count();
        let failed = self.results.len() - passed - skipped;
        (passed, failed, skipped)
    }
}

/// Results for a whole invocation.
#[derive(Debug, Clone, Serialize, Default)]
pub struct RunResult {
    pub files: Vec<FileResult>,
}

impl RunResult {
    pub fn passed(&self) -> bool {
        self.files.iter().all(FileResult::passed)
    }

    /// (passed, failed, skipped) across all files.
    pub fn counts(&self) -> (usize, usize, usize) {
        self.files.iter().fold((0, 0, 0), |(p, f, s), file| {
            let (fp, ff, fs) = file.counts();
            (p + fp, f + ff, s + fs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_counts_as_ok() {
        let result = RequestResult::skipped("a", "flaky");
        assert!(result.ok());
        assert!(!result.passed);
        assert!(result.skipped);
    }

    #[test]
    fn test_file_counts() {
        let mut ok = RequestResult::failed("a", "");
        ok.passed = true;
        ok.error = None;
        let file = FileResult {
            file: PathBuf::from("t.http"),
            results: vec![
                ok,
                RequestResult::skipped("b", "dep"),
                RequestResult::failed("c", "boom"),
            ],
        };
        assert_eq!(file.counts(), (1, 1, 1));
        assert!(!file.passed());
    }

    #[test]
    fn test_response_echo_truncation() {
        let long = "x".repeat(5000);
        let echo = ResponseEcho::new(200, &long);
        assert!(echo.body.len() < 3000);
        assert!(echo.body.ends_with("…[truncated]"));
        assert_eq!(ResponseEcho::new(200, "short").body, "short");
    }
}
