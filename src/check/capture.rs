//! Capture extraction.
//!
//! Lifts values out of a response according to each capture's source.
//! Captured values are strings; a missing path drops the capture rather
//! than failing the request.

use serde::Serialize;
use serde_json::Value;

use super::path;
use crate::http::HttpResponse;
use crate::spec::{Capture, CaptureSource};

/// One extracted capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedValue {
    pub name: String,
    pub value: String,
}

/// Extracts every capture that resolves. Order follows the source order.
pub fn extract(captures: &[Capture], response: &HttpResponse) -> Vec<CapturedValue> {
    captures
        .iter()
        .filter_map(|capture| {
            extract_one(&capture.source, response).map(|value| CapturedValue {
                name: capture.name.clone(),
                value,
            })
        })
        .collect()
}

fn extract_one(source: &CaptureSource, response: &HttpResponse) -> Option<String> {
    match source {
        CaptureSource::Status => Some(response.status.as_u16().to_string()),
        CaptureSource::Duration => Some(response.duration_ms().to_string()),
        CaptureSource::Header(name) => response.header(name),
        CaptureSource::Body(None) => Some(match response.json() {
            Some(value) => stringify(&value),
            // Non-JSON bodies capture as the raw text.
            None => response.body.clone(),
        }),
        CaptureSource::Body(Some(body_path)) => {
            let value = response.json()?;
            path::lookup(&value, body_path).map(stringify)
        }
    }
}

/// Strings capture without quotes; other values as compact JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
