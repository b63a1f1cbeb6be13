//! Typed AST for spec files.
//!
//! A [`SpecFile`] owns its declared variables and requests in source
//! order. The AST is built once by the parser and immutable afterwards.

use std::fmt;
use std::path::PathBuf;

use serde_json::Value;

/// The parse unit: one `.http` / `.hitspec` file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecFile {
    /// Absolute path of the source file.
    pub path: PathBuf,
    /// `@name = value` declarations, in source order.
    pub variables: Vec<Variable>,
    /// Requests in source order.
    pub requests: Vec<Request>,
}

impl SpecFile {
    /// Directory containing the file; filesystem paths referenced by the
    /// file (schemas, uploads, hook scripts) are resolved against it.
    pub fn base_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// A `@name = value` file variable. The value is a string template.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub line: usize,
}

/// HTTP method. The grammar admits exactly these nine verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
    Connect,
}

impl Method {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            "TRACE" => Some(Self::Trace),
            "CONNECT" => Some(Self::Connect),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request block.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// `# @name` identifier; unique within a file when set, referenced
    /// by `depends` and capture namespacing.
    pub name: Option<String>,
    pub method: Method,
    /// URL template (may contain `{{…}}` references).
    pub url: String,
    /// Headers in source order. Values are templates.
    pub headers: Vec<(String, String)>,
    /// `?key=value` query parameter lines, in source order.
    pub query_params: Vec<(String, String)>,
    pub body: Body,
    pub assertions: Vec<Assertion>,
    pub captures: Vec<Capture>,
    pub metadata: Metadata,
    /// Line of the method/URL line.
    pub line: usize,
}

impl Request {
    /// Display label: explicit name, else description, else `METHOD url`.
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(desc) = &self.metadata.description {
            return desc.clone();
        }
        format!("{} {}", self.method, self.url)
    }
}

/// Request body variants.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    None,
    /// JSON text (heuristic prefix `{` / `[`, or explicit content type).
    Json(String),
    /// URL-encoded form text detected heuristically (`k=v` single line).
    Form(String),
    /// `>>>form` block: ordered key/value pairs.
    FormBlock(Vec<(String, String)>),
    /// `>>>multipart` block fields, in source order.
    Multipart(Vec<MultipartField>),
    Raw(String),
    Xml(String),
    /// `>>>graphql` block with optional `>>>variables` JSON.
    GraphQl {
        query: String,
        variables: Option<String>,
    },
}

/// One multipart form field.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartField {
    pub name: String,
    pub value: MultipartValue,
}

/// Multipart field payload: a literal value or a file reference whose
/// path is resolved relative to the spec file's directory.
#[derive(Debug, Clone, PartialEq)]
pub enum MultipartValue {
    Text(String),
    File(String),
}

/// What an assertion inspects on the response.
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    Status,
    Duration,
    P50,
    P95,
    P99,
    /// Header by name (case-insensitive); `None` addresses the full map.
    Header(Option<String>),
    /// JSON body, optionally at a dot/bracket path.
    Body(Option<String>),
    /// Same path engine, expression given after the `jsonpath` keyword.
    JsonPath(String),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => write!(f, "status"),
            Self::Duration => write!(f, "duration"),
            Self::P50 => write!(f, "p50"),
            Self::P95 => write!(f, "p95"),
            Self::P99 => write!(f, "p99"),
            Self::Header(Some(name)) => write!(f, "header {name}"),
            Self::Header(None) => write!(f, "header"),
            Self::Body(Some(path)) if path.starts_with('[') => write!(f, "body{path}"),
            Self::Body(Some(path)) => write!(f, "body.{path}"),
            Self::Body(None) => write!(f, "body"),
            Self::JsonPath(expr) => write!(f, "jsonpath {expr}"),
        }
    }
}

/// Closed set of assertion operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Matches,
    Exists,
    NotExists,
    Length,
    Includes,
    NotIncludes,
    In,
    NotIn,
    Type,
    Each,
    Schema,
    Snapshot,
}

impl Operator {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            "contains" => Some(Self::Contains),
            "!contains" => Some(Self::NotContains),
            "startsWith" => Some(Self::StartsWith),
            "endsWith" => Some(Self::EndsWith),
            "matches" => Some(Self::Matches),
            "exists" => Some(Self::Exists),
            "!exists" => Some(Self::NotExists),
            "length" => Some(Self::Length),
            "includes" => Some(Self::Includes),
            "!includes" => Some(Self::NotIncludes),
            "in" => Some(Self::In),
            "!in" => Some(Self::NotIn),
            "type" => Some(Self::Type),
            "each" => Some(Self::Each),
            "schema" => Some(Self::Schema),
            "snapshot" => Some(Self::Snapshot),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Contains => "contains",
            Self::NotContains => "!contains",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Matches => "matches",
            Self::Exists => "exists",
            Self::NotExists => "!exists",
            Self::Length => "length",
            Self::Includes => "includes",
            Self::NotIncludes => "!includes",
            Self::In => "in",
            Self::NotIn => "!in",
            Self::Type => "type",
            Self::Each => "each",
            Self::Schema => "schema",
            Self::Snapshot => "snapshot",
        }
    }

    /// `exists` / `!exists` and `snapshot` may omit the expected value.
    pub fn expected_optional(&self) -> bool {
        matches!(self, Self::Exists | Self::NotExists | Self::Snapshot)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `expect …` line.
#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    pub subject: Subject,
    pub operator: Operator,
    /// Expected value literal; string expectations are templates.
    pub expected: Option<Value>,
    pub line: usize,
}

/// Where a capture reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureSource {
    /// Response body, optionally at a path.
    Body(Option<String>),
    /// Header by name.
    Header(String),
    Status,
    Duration,
}

/// One `<name> from <source-path>` line in a `>>>capture` block.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub name: String,
    pub source: CaptureSource,
    pub line: usize,
}

/// Per-request auth configuration from `# @auth …`.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthConfig {
    Basic { username: String, password: String },
    Bearer { token: String },
    ApiKey { header: String, value: String },
    ApiKeyQuery { name: String, value: String },
    Digest { username: String, password: String },
    Aws {
        access_key: String,
        secret_key: String,
        region: String,
        service: String,
    },
    /// OAuth2 client-credentials, or password grant when credentials
    /// are present.
    OAuth2 {
        token_url: String,
        client_id: String,
        client_secret: String,
        username: Option<String>,
        password: Option<String>,
    },
}

/// Stress-specific per-request flags.
#[derive(Debug, Clone, PartialEq)]
pub struct StressMeta {
    /// Selection weight, at least 1.
    pub weight: u32,
    /// Per-request think time in milliseconds (VU mode).
    pub think_ms: Option<u64>,
    /// Excluded from the stress workload entirely.
    pub skip: bool,
    /// Runs once before the main loop.
    pub setup: bool,
    /// Runs once after the main loop, on a fresh context.
    pub teardown: bool,
}

impl Default for StressMeta {
    fn default() -> Self {
        Self {
            weight: 1,
            think_ms: None,
            skip: false,
            setup: false,
            teardown: false,
        }
    }
}

/// Optional per-request flags collected from annotations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metadata {
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// `Some(reason)` when the request is skipped.
    pub skip: Option<String>,
    pub only: bool,
    pub timeout_ms: Option<u64>,
    /// Extra attempts after the first failure.
    pub retry: u32,
    pub retry_delay_ms: u64,
    /// When non-empty, retry only if the response status is listed.
    pub retry_on: Vec<u16>,
    pub depends: Vec<String>,
    pub auth: Option<AuthConfig>,
    /// Shell command run before the request; non-zero exit fails it.
    pub before: Option<String>,
    /// Shell command run after the request, on every exit path.
    pub after: Option<String>,
    pub stress: StressMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!(Method::from_str("get"), Some(Method::Get));
        assert_eq!(Method::from_str("POST"), Some(Method::Post));
        assert_eq!(Method::from_str("FETCH"), None);
    }

    #[test]
    fn test_operator_round_trip() {
        for op in [
            Operator::Eq,
            Operator::NotContains,
            Operator::StartsWith,
            Operator::Each,
            Operator::Snapshot,
        ] {
            assert_eq!(Operator::from_str(op.as_str()), Some(op));
        }
    }

    #[test]
    fn test_request_label_fallback() {
        let request = Request {
            name: None,
            method: Method::Get,
            url: "/health".into(),
            headers: vec![],
            query_params: vec![],
            body: Body::None,
            assertions: vec![],
            captures: vec![],
            metadata: Metadata::default(),
            line: 1,
        };
        assert_eq!(request.label(), "GET /health");
    }

    #[test]
    fn test_stress_meta_default_weight() {
        assert_eq!(StressMeta::default().weight, 1);
    }
}
