//! Assertion evaluation.
//!
//! Extracts the subject value from a response, resolves the expected
//! side, and dispatches on the operator tag. Every assertion yields a
//! result row whether it passed or not; evaluation itself never fails.

use std::path::Path;

use serde::Serialize;
use serde_json::{json, Value};

use super::path;
use super::snapshot::{SnapshotOutcome, SnapshotStore};
use crate::fspath;
use crate::http::HttpResponse;
use crate::spec::{Assertion, Operator, Subject};
use crate::template::Resolver;

/// Outcome of a single assertion.
#[derive(Debug, Clone, Serialize)]
pub struct AssertionResult {
    pub passed: bool,
    pub subject: String,
    pub operator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    pub message: String,
}

/// Evaluation context: schema paths resolve against `base_dir`, string
/// expectations resolve through `resolver`, snapshot assertions go to
/// the per-invocation `snapshots` handle under `snapshot_key`.
pub struct EvalOptions<'a> {
    pub base_dir: &'a Path,
    pub resolver: Option<&'a Resolver>,
    pub snapshots: Option<&'a SnapshotStore>,
    pub snapshot_key: String,
}

impl<'a> EvalOptions<'a> {
    pub fn new(base_dir: &'a Path) -> Self {
        Self {
            base_dir,
            resolver: None,
            snapshots: None,
            snapshot_key: String::new(),
        }
    }
}

/// Evaluates `assertions` in order against `response`.
pub fn evaluate(
    assertions: &[Assertion],
    response: &HttpResponse,
    options: &EvalOptions,
) -> Vec<AssertionResult> {
    assertions
        .iter()
        .map(|assertion| evaluate_one(assertion, response, options))
        .collect()
}

fn evaluate_one(
    assertion: &Assertion,
    response: &HttpResponse,
    options: &EvalOptions,
) -> AssertionResult {
    let actual = extract_subject(&assertion.subject, response);
    let expected = assertion
        .expected
        .clone()
        .map(|value| resolve_expected(value, options.resolver));

    let verdict = match assertion.operator {
        Operator::Exists => Ok(actual.is_some()),
        Operator::NotExists => Ok(actual.is_none()),
        Operator::Schema => check_schema(actual.as_ref(), expected.as_ref(), options),
        Operator::Snapshot => check_snapshot(actual.as_ref(), expected.as_ref(), options),
        _ => match &actual {
            Some(actual) => apply_operator(assertion.operator, actual, expected.as_ref()),
            None => Err(format!("subject '{}' not found", assertion.subject)),
        },
    };

    let (passed, message) = match verdict {
        Ok(true) => (true, String::new()),
        Ok(false) => (false, describe_failure(assertion, &actual, &expected)),
        Err(message) => (false, message),
    };

    AssertionResult {
        passed,
        subject: assertion.subject.to_string(),
        operator: assertion.operator.as_str().to_string(),
        expected,
        actual,
        message,
    }
}

fn describe_failure(
    assertion: &Assertion,
    actual: &Option<Value>,
    expected: &Option<Value>,
) -> String {
    let actual = actual
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "<missing>".to_string());
    match expected {
        Some(expected) => format!(
            "expected {} {} {expected}, got {actual}",
            assertion.subject, assertion.operator
        ),
        None => format!("{} {} failed, got {actual}", assertion.subject, assertion.operator),
    }
}

/// Pulls the subject value out of the response. For a single request
/// every latency quantile equals the observed duration.
fn extract_subject(subject: &Subject, response: &HttpResponse) -> Option<Value> {
    match subject {
        Subject::Status => Some(json!(response.status.as_u16())),
        Subject::Duration | Subject::P50 | Subject::P95 | Subject::P99 => {
            Some(json!(response.duration_ms()))
        }
        Subject::Header(Some(name)) => response.header(name).map(Value::String),
        Subject::Header(None) => Some(response.headers_value()),
        Subject::Body(None) => Some(
            response
                .json()
                .unwrap_or_else(|| Value::String(response.body.clone())),
        ),
        Subject::Body(Some(body_path)) => response
            .json()
            .as_ref()
            .and_then(|value| path::lookup(value, body_path))
            .cloned(),
        Subject::JsonPath(expr) => {
            let stripped = expr
                .strip_prefix("$.")
                .or_else(|| expr.strip_prefix('$'))
                .or_else(|| expr.strip_prefix("body."))
                .unwrap_or(expr);
            response
                .json()
                .as_ref()
                .and_then(|value| path::lookup(value, stripped))
                .cloned()
        }
    }
}

fn resolve_expected(value: Value, resolver: Option<&Resolver>) -> Value {
    match (&value, resolver) {
        (Value::String(s), Some(resolver)) if s.contains("{{") => {
            Value::String(resolver.resolve(s))
        }
        _ => value,
    }
}

// ---------------------------------------------------------------------
// Operator semantics
// ---------------------------------------------------------------------

fn apply_operator(
    operator: Operator,
    actual: &Value,
    expected: Option<&Value>,
) -> Result<bool, String> {
    let expected =
        expected.ok_or_else(|| format!("operator '{operator}' requires an expected value"))?;
    match operator {
        Operator::Eq => Ok(loose_eq(actual, expected)),
        Operator::Ne => Ok(!loose_eq(actual, expected)),
        Operator::Gt | Operator::Ge | Operator::Lt | Operator::Le => {
            let a = to_f64(actual)
                .ok_or_else(|| format!("cannot compare non-numeric value {actual}"))?;
            let b = to_f64(expected)
                .ok_or_else(|| format!("cannot compare against non-numeric value {expected}"))?;
            Ok(match operator {
                Operator::Gt => a > b,
                Operator::Ge => a >= b,
                Operator::Lt => a < b,
                _ => a <= b,
            })
        }
        Operator::Contains => Ok(stringify(actual).contains(&stringify(expected))),
        Operator::NotContains => Ok(!stringify(actual).contains(&stringify(expected))),
        Operator::StartsWith => Ok(stringify(actual).starts_with(&stringify(expected))),
        Operator::EndsWith => Ok(stringify(actual).ends_with(&stringify(expected))),
        Operator::Matches => {
            let pattern = stringify(expected);
            let pattern = pattern.trim_matches('/');
            let regex = regex::Regex::new(pattern)
                .map_err(|e| format!("invalid regex '{pattern}': {e}"))?;
            Ok(regex.is_match(&stringify(actual)))
        }
        Operator::Length => {
            let length = container_length(actual)
                .ok_or_else(|| format!("value {actual} has no length"))?;
            let want = to_f64(expected)
                .ok_or_else(|| format!("length expects a number, got {expected}"))?;
            Ok(length as f64 == want)
        }
        Operator::Includes => array_contains(actual, expected),
        Operator::NotIncludes => array_contains(actual, expected).map(|found| !found),
        Operator::In => match expected {
            Value::Array(items) => Ok(items.iter().any(|item| loose_eq(actual, item))),
            _ => Err(format!("'in' expects an array, got {expected}")),
        },
        Operator::NotIn => match expected {
            Value::Array(items) => Ok(!items.iter().any(|item| loose_eq(actual, item))),
            _ => Err(format!("'!in' expects an array, got {expected}")),
        },
        Operator::Type => Ok(type_name(actual) == stringify(expected)),
        Operator::Each => check_each(actual, expected),
        // Handled before dispatch.
        Operator::Exists | Operator::NotExists | Operator::Schema | Operator::Snapshot => {
            unreachable!("handled by evaluate_one")
        }
    }
}

fn array_contains(actual: &Value, expected: &Value) -> Result<bool, String> {
    match actual {
        Value::Array(items) => Ok(items.iter().any(|item| loose_eq(item, expected))),
        _ => Err(format!("'includes' expects an array subject, got {actual}")),
    }
}

/// Applies every operator/value pair of an `each` map to every element.
fn check_each(actual: &Value, expected: &Value) -> Result<bool, String> {
    let items = match actual {
        Value::Array(items) => items,
        _ => return Err(format!("'each' expects an array subject, got {actual}")),
    };
    let checks = match expected {
        Value::Object(map) => map,
        _ => return Err("'each' expects an operator/value map".to_string()),
    };
    for item in items {
        for (op_name, op_expected) in checks {
            let operator = Operator::from_str(op_name)
                .ok_or_else(|| format!("unknown operator '{op_name}' in each-map"))?;
            if !apply_operator(operator, item, Some(op_expected))? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn check_schema(
    actual: Option<&Value>,
    expected: Option<&Value>,
    options: &EvalOptions,
) -> Result<bool, String> {
    let actual = actual.ok_or_else(|| "schema subject not found".to_string())?;
    let schema_ref = match expected {
        Some(Value::String(path)) => path,
        _ => return Err("'schema' expects a schema file path".to_string()),
    };
    let schema_path = fspath::resolve_contained(options.base_dir, schema_ref)
        .map_err(|e| e.to_string())?;
    let schema_text = std::fs::read_to_string(&schema_path)
        .map_err(|e| format!("cannot read schema '{}': {e}", schema_path.display()))?;
    let schema_value: Value = serde_json::from_str(&schema_text)
        .map_err(|e| format!("invalid schema JSON '{}': {e}", schema_path.display()))?;
    let compiled = jsonschema::JSONSchema::compile(&schema_value)
        .map_err(|e| format!("invalid JSON Schema: {e}"))?;
    let result = match compiled.validate(actual) {
        Ok(()) => Ok(true),
        Err(errors) => {
            let details: Vec<String> = errors.take(3).map(|e| e.to_string()).collect();
            Err(format!("schema validation failed: {}", details.join("; ")))
        }
    };
    result
}

fn check_snapshot(
    actual: Option<&Value>,
    expected: Option<&Value>,
    options: &EvalOptions,
) -> Result<bool, String> {
    let actual = actual.ok_or_else(|| "snapshot subject not found".to_string())?;
    let store = options
        .snapshots
        .ok_or_else(|| "no snapshot store configured".to_string())?;
    let key = match expected {
        Some(Value::String(name)) => format!("{}::{name}", options.snapshot_key),
        _ => options.snapshot_key.clone(),
    };
    match store.check(&key, actual) {
        outcome if outcome.passed() => Ok(true),
        SnapshotOutcome::Missing => Err(format!(
            "no snapshot recorded for '{key}'; run with snapshot update to create it"
        )),
        SnapshotOutcome::Mismatch { expected } => {
            Err(format!("snapshot '{key}' mismatch: expected {expected}, got {actual}"))
        }
        _ => Ok(true),
    }
}

// ---------------------------------------------------------------------
// Coercion helpers
// ---------------------------------------------------------------------

/// Equality ladder: deep equality, then numeric, then string.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    if let (Some(x), Some(y)) = (to_f64(a), to_f64(b)) {
        return x == y;
    }
    stringify(a) == stringify(b)
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Strings render unquoted; everything else as compact JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn container_length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::parse_str;
    use reqwest::header::HeaderMap;
    use reqwest::StatusCode;
    use std::time::Duration;

    fn response(status: u16, body: &str) -> HttpResponse {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        HttpResponse::new(
            StatusCode::from_u16(status).unwrap(),
            headers,
            body.to_string(),
            Duration::from_millis(120),
        )
    }

    fn run(spec_asserts: &str, status: u16, body: &str) -> Vec<AssertionResult> {
        let source = format!("GET http://x/\n>>>\n{spec_asserts}\n<<<\n");
        let file = parse_str(&source, Path::new("t.http")).unwrap();
        let options = EvalOptions::new(Path::new("."));
        evaluate(&file.requests[0].assertions, &response(status, body), &options)
    }

    fn assert_all_pass(results: &[AssertionResult]) {
        for result in results {
            assert!(result.passed, "{} {}: {}", result.subject, result.operator, result.message);
        }
    }

    #[test]
    fn test_status_and_duration() {
        let results = run(
            "expect status 200\nexpect status >= 200\nexpect status < 300\nexpect duration < 5000\nexpect p95 <= 5000",
            200,
            "{}",
        );
        assert_all_pass(&results);
    }

    #[test]
    fn test_body_paths_and_equality() {
        let body = r#"{"user": {"name": "ada", "id": 7}, "items": [1, 2, 3]}"#;
        let results = run(
            concat!(
                "expect body.user.name == \"ada\"\n",
                "expect body.user.id == \"7\"\n",
                "expect body.items[2] == 3\n",
                "expect body.items length 3\n",
                "expect body.user type object\n",
                "expect body.missing !exists",
            ),
            200,
            body,
        );
        assert_all_pass(&results);
    }

    #[test]
    fn test_string_operators() {
        let body = r#"{"msg": "hello world", "file": "report.txt"}"#;
        let results = run(
            concat!(
                "expect body.msg contains world\n",
                "expect body.msg startsWith hello\n",
                "expect body.file endsWith \".txt\"\n",
                "expect body.msg matches /^hello/\n",
                "expect body.msg !contains goodbye",
            ),
            200,
            body,
        );
        assert_all_pass(&results);
    }

    #[test]
    fn test_array_operators() {
        let body = r#"{"tags": ["a", "b"], "kind": "beta"}"#;
        let results = run(
            concat!(
                "expect body.tags includes \"a\"\n",
                "expect body.tags !includes \"z\"\n",
                "expect body.kind in [\"alpha\", \"beta\"]\n",
                "expect body.kind !in [\"x\", \"y\"]\n",
                "expect body.tags each {\"type\": \"string\"}",
            ),
            200,
            body,
        );
        assert_all_pass(&results);
    }

    #[test]
    fn test_header_subject() {
        let results = run(
            "expect header content-type contains json\nexpect header x-nope !exists",
            200,
            "{}",
        );
        assert_all_pass(&results);
    }

    #[test]
    fn test_failure_carries_message() {
        let results = run("expect status 201", 200, "{}");
        assert!(!results[0].passed);
        assert!(results[0].message.contains("expected status == 201"));
        assert_eq!(results[0].actual, Some(json!(200)));
    }

    #[test]
    fn test_non_json_body_is_raw_string() {
        let results = run("expect body contains pong", 200, "pong!");
        assert_all_pass(&results);
    }

    #[test]
    fn test_jsonpath_subject() {
        let results = run(
            "expect jsonpath $.items[0].id == 1",
            200,
            r#"{"items": [{"id": 1}]}"#,
        );
        assert_all_pass(&results);
    }

    #[test]
    fn test_each_failure() {
        let results = run(
            "expect body.nums each {\">\": 0}",
            200,
            r#"{"nums": [3, -1, 5]}"#,
        );
        assert!(!results[0].passed);
    }

    #[test]
    fn test_expected_resolved_through_resolver() {
        let source = "GET http://x/\n>>>\nexpect body.id == {{userId}}\n<<<\n";
        let file = parse_str(source, Path::new("t.http")).unwrap();
        let resolver = Resolver::new();
        resolver.set_variable("userId", "42");
        let options = EvalOptions {
            resolver: Some(&resolver),
            ..EvalOptions::new(Path::new("."))
        };
        let results = evaluate(
            &file.requests[0].assertions,
            &response(200, r#"{"id": 42}"#),
            &options,
        );
        assert_all_pass(&results);
    }

    #[test]
    fn test_schema_assertion() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("user.schema.json"),
            r#"{"type": "object", "required": ["id"], "properties": {"id": {"type": "integer"}}}"#,
        )
        .unwrap();
        let source = "GET http://x/\n>>>\nexpect body schema user.schema.json\n<<<\n";
        let file = parse_str(source, Path::new("t.http")).unwrap();
        let options = EvalOptions::new(dir.path());

        let ok = evaluate(
            &file.requests[0].assertions,
            &response(200, r#"{"id": 1}"#),
            &options,
        );
        assert!(ok[0].passed, "{}", ok[0].message);

        let bad = evaluate(
            &file.requests[0].assertions,
            &response(200, r#"{"id": "one"}"#),
            &options,
        );
        assert!(!bad[0].passed);
        assert!(bad[0].message.contains("schema validation failed"));
    }

    #[test]
    fn test_schema_path_containment() {
        let source = "GET http://x/\n>>>\nexpect body schema ../../evil.json\n<<<\n";
        let file = parse_str(source, Path::new("t.http")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let options = EvalOptions::new(dir.path());
        let results = evaluate(
            &file.requests[0].assertions,
            &response(200, "{}"),
            &options,
        );
        assert!(!results[0].passed);
        assert!(results[0].message.contains("path traversal detected"));
    }

    #[test]
    fn test_snapshot_assertion() {
        let dir = tempfile::tempdir().unwrap();
        let spec_path = dir.path().join("api.http");
        let store = SnapshotStore::for_spec(&spec_path, true).unwrap();
        let source = "GET http://x/\n>>>\nexpect body.id snapshot\n<<<\n";
        let file = parse_str(source, Path::new("t.http")).unwrap();
        let options = EvalOptions {
            snapshots: Some(&store),
            snapshot_key: "health".to_string(),
            ..EvalOptions::new(dir.path())
        };
        let first = evaluate(
            &file.requests[0].assertions,
            &response(200, r#"{"id": 9}"#),
            &options,
        );
        assert!(first[0].passed);
        store.persist().unwrap();

        let frozen = SnapshotStore::for_spec(&spec_path, false).unwrap();
        let options = EvalOptions {
            snapshots: Some(&frozen),
            snapshot_key: "health".to_string(),
            ..EvalOptions::new(dir.path())
        };
        let same = evaluate(
            &file.requests[0].assertions,
            &response(200, r#"{"id": 9}"#),
            &options,
        );
        assert!(same[0].passed);
        let differs = evaluate(
            &file.requests[0].assertions,
            &response(200, r#"{"id": 10}"#),
            &options,
        );
        assert!(!differs[0].passed);
        assert!(differs[0].message.contains("mismatch"));
    }
}
