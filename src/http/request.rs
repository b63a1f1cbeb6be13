//! Renders an AST request into a wire-ready form.
//!
//! Every template in the request (URL, headers, query, body parts) is
//! resolved here, the URL is validated, and multipart file references
//! are containment-checked against the spec file's directory before
//! anything touches the network.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::json;

use crate::error::{Error, Result};
use crate::fspath;
use crate::spec::{Body, Method, MultipartValue, Request};
use crate::template::Resolver;

/// Client-level defaults merged into every built request.
#[derive(Debug, Clone)]
pub struct RequestDefaults {
    pub timeout: Duration,
    /// Headers applied to every request unless the request overrides
    /// the same name.
    pub headers: Vec<(String, String)>,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            headers: Vec::new(),
        }
    }
}

/// A fully resolved request, ready for the HTTP client.
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    pub method: reqwest::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: BuiltBody,
    pub timeout: Duration,
}

/// Wire body variants after template resolution.
#[derive(Debug, Clone, Default)]
pub enum BuiltBody {
    #[default]
    None,
    Text {
        content: String,
        /// Content type implied by the body kind; an explicit header wins.
        content_type: Option<&'static str>,
    },
    /// URL-encoded form pairs.
    Form(Vec<(String, String)>),
    Multipart(Vec<BuiltPart>),
}

impl BuiltBody {
    /// Body bytes as they appear on the wire, for signing purposes.
    /// Multipart bodies sign as empty (boundary is chosen at send time).
    pub fn signing_bytes(&self) -> Vec<u8> {
        match self {
            Self::None | Self::Multipart(_) => Vec::new(),
            Self::Text { content, .. } => content.clone().into_bytes(),
            Self::Form(pairs) => {
                let encoded: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| {
                        format!("{}={}", urlencoding::encode(k), urlencoding::encode(v))
                    })
                    .collect();
                encoded.join("&").into_bytes()
            }
        }
    }
}

/// One resolved multipart field.
#[derive(Debug, Clone)]
pub struct BuiltPart {
    pub name: String,
    pub kind: PartKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartKind {
    Text(String),
    /// Containment-checked absolute path to upload.
    File(PathBuf),
}

/// Resolves and validates `request` into a [`BuiltRequest`].
///
/// # Errors
///
/// Returns an execution error for invalid URLs, bad GraphQL variable
/// JSON, or multipart paths escaping `base_dir`.
pub fn build_request(
    request: &Request,
    resolver: &Resolver,
    base_dir: &Path,
    defaults: &RequestDefaults,
) -> Result<BuiltRequest> {
    let url = resolver.resolve(&request.url);
    validate_url(&url)?;

    let mut headers: Vec<(String, String)> = Vec::new();
    for (name, value) in &defaults.headers {
        headers.push((resolver.resolve(name), resolver.resolve(value)));
    }
    for (name, value) in &request.headers {
        let name = resolver.resolve(name);
        let value = resolver.resolve(value);
        headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        headers.push((name, value));
    }

    let query = request
        .query_params
        .iter()
        .map(|(k, v)| (resolver.resolve(k), resolver.resolve(v)))
        .collect();

    let body = build_body(&request.body, resolver, base_dir)?;
    let timeout = request
        .metadata
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(defaults.timeout);

    Ok(BuiltRequest {
        method: to_reqwest_method(request.method),
        url,
        headers,
        query,
        body,
        timeout,
    })
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
        Method::Trace => reqwest::Method::TRACE,
        Method::Connect => reqwest::Method::CONNECT,
    }
}

/// URL must be absolute http(s) with a host. Anything else fails before
/// a connection is attempted.
fn validate_url(url: &str) -> Result<()> {
    let parsed = url::Url::parse(url)
        .map_err(|e| Error::Execution(format!("invalid URL '{url}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::Execution(format!(
            "invalid URL '{url}': scheme must be http or https"
        )));
    }
    if parsed.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(Error::Execution(format!("invalid URL '{url}': missing host")));
    }
    Ok(())
}

fn build_body(body: &Body, resolver: &Resolver, base_dir: &Path) -> Result<BuiltBody> {
    Ok(match body {
        Body::None => BuiltBody::None,
        Body::Json(text) => BuiltBody::Text {
            content: resolver.resolve(text),
            content_type: Some("application/json"),
        },
        Body::Xml(text) => BuiltBody::Text {
            content: resolver.resolve(text),
            content_type: Some("application/xml"),
        },
        Body::Form(text) => BuiltBody::Text {
            content: resolver.resolve(text),
            content_type: Some("application/x-www-form-urlencoded"),
        },
        Body::Raw(text) => BuiltBody::Text {
            content: resolver.resolve(text),
            content_type: None,
        },
        Body::FormBlock(pairs) => BuiltBody::Form(
            pairs
                .iter()
                .map(|(k, v)| (resolver.resolve(k), resolver.resolve(v)))
                .collect(),
        ),
        Body::Multipart(fields) => {
            let mut parts = Vec::with_capacity(fields.len());
            for field in fields {
                let kind = match &field.value {
                    MultipartValue::Text(text) => PartKind::Text(resolver.resolve(text)),
                    MultipartValue::File(path) => {
                        let resolved = resolver.resolve(path);
                        PartKind::File(fspath::resolve_contained(base_dir, &resolved)?)
                    }
                };
                parts.push(BuiltPart {
                    name: resolver.resolve(&field.name),
                    kind,
                });
            }
            BuiltBody::Multipart(parts)
        }
        Body::GraphQl { query, variables } => {
            let query = resolver.resolve(query);
            let envelope = match variables {
                Some(vars) => {
                    let vars = resolver.resolve(vars);
                    let parsed: serde_json::Value = serde_json::from_str(&vars).map_err(|e| {
                        Error::Execution(format!("invalid GraphQL variables JSON: {e}"))
                    })?;
                    json!({ "query": query, "variables": parsed })
                }
                None => json!({ "query": query }),
            };
            BuiltBody::Text {
                content: envelope.to_string(),
                content_type: Some("application/json"),
            }
        }
    })
}
