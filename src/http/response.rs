//! HTTP response handling.
//!
//! Carries everything assertion evaluation and capture extraction need:
//! status, headers, body text, and the observed duration.

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// HTTP response with timing information.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body as string
    pub body: String,
    /// Time taken to receive the response
    pub duration: Duration,
}

impl HttpResponse {
    /// Creates a new HTTP response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: String, duration: Duration) -> Self {
        Self {
            status,
            headers,
            body,
            duration,
        }
    }

    /// Returns true if the response status is successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Observed duration in whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// All headers as a JSON object, names lowercased.
    pub fn headers_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (name, value) in self.headers.iter() {
            if let Ok(text) = value.to_str() {
                map.insert(name.as_str().to_lowercase(), Value::String(text.to_string()));
            }
        }
        Value::Object(map)
    }

    /// Parses the body as JSON, if it is JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            body.to_string(),
            Duration::from_millis(42),
        )
    }

    #[test]
    fn test_is_success() {
        assert!(response(200, "").is_success());
        assert!(!response(404, "").is_success());
    }

    #[test]
    fn test_json_parsing() {
        let r = response(200, r#"{"ok": true}"#);
        assert_eq!(r.json().unwrap()["ok"], Value::Bool(true));
        assert!(response(200, "not json").json().is_none());
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "application/json".parse().unwrap());
        let r = HttpResponse::new(
            StatusCode::OK,
            headers,
            String::new(),
            Duration::from_millis(1),
        );
        assert_eq!(r.header("content-type").as_deref(), Some("application/json"));
        assert_eq!(r.header("CONTENT-TYPE").as_deref(), Some("application/json"));
    }

    #[test]
    fn test_duration_ms() {
        assert_eq!(response(200, "").duration_ms(), 42);
    }
}
