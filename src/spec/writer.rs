//! Serializes an AST back to spec-file source.
//!
//! The output parses back to an equivalent AST (positions aside), which
//! the round-trip tests rely on. Bodies classified by the prefix
//! heuristic re-classify identically because their text is preserved
//! verbatim.

use super::ast::{
    Assertion, AuthConfig, Body, Capture, CaptureSource, Metadata, MultipartValue, Request,
    SpecFile,
};

/// Renders a [`SpecFile`] as spec-file source text.
pub fn write_file(file: &SpecFile) -> String {
    let mut out = String::new();
    for variable in &file.variables {
        out.push_str(&format!("@{} = {}\n", variable.name, variable.value));
    }
    for request in &file.requests {
        out.push('\n');
        write_request(&mut out, request);
    }
    out
}

fn write_request(out: &mut String, request: &Request) {
    match &request.metadata.description {
        Some(title) => out.push_str(&format!("### {title}\n")),
        None => out.push_str("###\n"),
    }
    write_metadata(out, request);
    out.push_str(&format!("{} {}\n", request.method, request.url));
    for (i, (key, value)) in request.query_params.iter().enumerate() {
        let lead = if i == 0 { '?' } else { '&' };
        out.push_str(&format!("{lead}{key}={value}\n"));
    }
    for (key, value) in &request.headers {
        out.push_str(&format!("{key}: {value}\n"));
    }
    write_body(out, &request.body);
    if !request.assertions.is_empty() {
        out.push_str("\n>>>\n");
        for assertion in &request.assertions {
            write_assertion(out, assertion);
        }
        out.push_str("<<<\n");
    }
    if !request.captures.is_empty() {
        out.push_str("\n>>>capture\n");
        for capture in &request.captures {
            write_capture(out, capture);
        }
        out.push_str("<<<\n");
    }
}

fn write_metadata(out: &mut String, request: &Request) {
    let meta: &Metadata = &request.metadata;
    if let Some(name) = &request.name {
        out.push_str(&format!("# @name {name}\n"));
    }
    if !meta.tags.is_empty() {
        out.push_str(&format!("# @tags {}\n", meta.tags.join(", ")));
    }
    if let Some(reason) = &meta.skip {
        out.push_str(&format!("# @skip {reason}\n"));
    }
    if meta.only {
        out.push_str("# @only\n");
    }
    if let Some(ms) = meta.timeout_ms {
        out.push_str(&format!("# @timeout {ms}\n"));
    }
    if meta.retry > 0 {
        out.push_str(&format!("# @retry {}\n", meta.retry));
    }
    if meta.retry_delay_ms > 0 {
        out.push_str(&format!("# @retrydelay {}\n", meta.retry_delay_ms));
    }
    if !meta.retry_on.is_empty() {
        let list: Vec<String> = meta.retry_on.iter().map(u16::to_string).collect();
        out.push_str(&format!("# @retryon {}\n", list.join(",")));
    }
    if !meta.depends.is_empty() {
        out.push_str(&format!("# @depends {}\n", meta.depends.join(", ")));
    }
    if let Some(auth) = &meta.auth {
        out.push_str(&format!("# @auth {}\n", format_auth(auth)));
    }
    if let Some(cmd) = &meta.before {
        out.push_str(&format!("# @before {cmd}\n"));
    }
    if let Some(cmd) = &meta.after {
        out.push_str(&format!("# @after {cmd}\n"));
    }
    if meta.stress.weight != 1 {
        out.push_str(&format!("# @stress.weight {}\n", meta.stress.weight));
    }
    if let Some(think) = meta.stress.think_ms {
        out.push_str(&format!("# @stress.think {think}\n"));
    }
    if meta.stress.skip {
        out.push_str("# @stress.skip\n");
    }
    if meta.stress.setup {
        out.push_str("# @stress.setup\n");
    }
    if meta.stress.teardown {
        out.push_str("# @stress.teardown\n");
    }
}

fn format_auth(auth: &AuthConfig) -> String {
    let quote = |s: &str| {
        if s.contains(' ') {
            format!("'{s}'")
        } else {
            s.to_string()
        }
    };
    match auth {
        AuthConfig::Basic { username, password } => {
            format!("basic {} {}", quote(username), quote(password))
        }
        AuthConfig::Bearer { token } => format!("bearer {}", quote(token)),
        AuthConfig::ApiKey { header, value } => {
            format!("apikey {} {}", quote(header), quote(value))
        }
        AuthConfig::ApiKeyQuery { name, value } => {
            format!("apikey-query {} {}", quote(name), quote(value))
        }
        AuthConfig::Digest { username, password } => {
            format!("digest {} {}", quote(username), quote(password))
        }
        AuthConfig::Aws {
            access_key,
            secret_key,
            region,
            service,
        } => format!(
            "aws {} {} {} {}",
            quote(access_key),
            quote(secret_key),
            quote(region),
            quote(service)
        ),
        AuthConfig::OAuth2 {
            token_url,
            client_id,
            client_secret,
            username,
            password,
        } => {
            let mut s = format!(
                "oauth2 {} {} {}",
                quote(token_url),
                quote(client_id),
                quote(client_secret)
            );
            if let Some(user) = username {
                s.push_str(&format!(" {}", quote(user)));
            }
            if let Some(pass) = password {
                s.push_str(&format!(" {}", quote(pass)));
            }
            s
        }
    }
}

fn write_body(out: &mut String, body: &Body) {
    match body {
        Body::None => {}
        Body::Json(text) | Body::Xml(text) | Body::Form(text) | Body::Raw(text) => {
            out.push('\n');
            out.push_str(text);
            out.push('\n');
        }
        Body::FormBlock(pairs) => {
            out.push_str("\n>>>form\n");
            for (key, value) in pairs {
                out.push_str(&format!("{key} = {value}\n"));
            }
            out.push_str("<<<\n");
        }
        Body::Multipart(fields) => {
            out.push_str("\n>>>multipart\n");
            for field in fields {
                match &field.value {
                    MultipartValue::Text(value) => {
                        out.push_str(&format!("{} = {value}\n", field.name));
                    }
                    MultipartValue::File(path) => {
                        out.push_str(&format!("{} = @{path}\n", field.name));
                    }
                }
            }
            out.push_str("<<<\n");
        }
        Body::GraphQl { query, variables } => {
            out.push_str("\n>>>graphql\n");
            out.push_str(query);
            out.push_str("\n<<<\n");
            if let Some(variables) = variables {
                out.push_str(">>>variables\n");
                out.push_str(variables);
                out.push_str("\n<<<\n");
            }
        }
    }
}

fn write_assertion(out: &mut String, assertion: &Assertion) {
    out.push_str(&format!("expect {}", assertion.subject));
    out.push_str(&format!(" {}", assertion.operator));
    if let Some(expected) = &assertion.expected {
        // JSON encoding keeps strings quoted so they re-lex as literals.
        out.push_str(&format!(" {expected}"));
    }
    out.push('\n');
}

fn write_capture(out: &mut String, capture: &Capture) {
    let source = match &capture.source {
        CaptureSource::Body(None) => "body".to_string(),
        CaptureSource::Body(Some(path)) => {
            if path.starts_with('[') {
                format!("body{path}")
            } else {
                format!("body.{path}")
            }
        }
        CaptureSource::Header(name) => format!("header {name}"),
        CaptureSource::Status => "status".to_string(),
        CaptureSource::Duration => "duration".to_string(),
    };
    out.push_str(&format!("{} from {}\n", capture.name, source));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::parser::parse_str;
    use std::path::Path;

    /// Source-visible fields survive a write/parse cycle.
    fn round_trip(source: &str) {
        let first = parse_str(source, Path::new("t.http")).expect("first parse");
        let written = write_file(&first);
        let second = parse_str(&written, Path::new("t.http")).expect("second parse");

        assert_eq!(first.variables.len(), second.variables.len());
        for (a, b) in first.variables.iter().zip(&second.variables) {
            assert_eq!((a.name.as_str(), a.value.as_str()), (b.name.as_str(), b.value.as_str()));
        }
        assert_eq!(first.requests.len(), second.requests.len());
        for (a, b) in first.requests.iter().zip(&second.requests) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.method, b.method);
            assert_eq!(a.url, b.url);
            assert_eq!(a.headers, b.headers);
            assert_eq!(a.query_params, b.query_params);
            assert_eq!(a.body, b.body);
            assert_eq!(a.captures.len(), b.captures.len());
            for (ca, cb) in a.captures.iter().zip(&b.captures) {
                assert_eq!((ca.name.as_str(), &ca.source), (cb.name.as_str(), &cb.source));
            }
            assert_eq!(a.assertions.len(), b.assertions.len());
            for (aa, ab) in a.assertions.iter().zip(&b.assertions) {
                assert_eq!(aa.subject, ab.subject);
                assert_eq!(aa.operator, ab.operator);
                assert_eq!(aa.expected, ab.expected);
            }
            let (ma, mb) = (&a.metadata, &b.metadata);
            assert_eq!(ma.tags, mb.tags);
            assert_eq!(ma.depends, mb.depends);
            assert_eq!(ma.timeout_ms, mb.timeout_ms);
            assert_eq!(ma.retry, mb.retry);
            assert_eq!(ma.auth, mb.auth);
            assert_eq!(ma.stress, mb.stress);
        }
    }

    #[test]
    fn test_round_trip_full_request() {
        round_trip(concat!(
            "@baseUrl = https://api.example.com\n",
            "\n",
            "### Login\n",
            "# @name login\n",
            "# @tags auth, smoke\n",
            "# @timeout 5000\n",
            "# @retry 2\n",
            "# @retryon 502,503\n",
            "POST {{baseUrl}}/login\n",
            "Content-Type: application/json\n",
            "\n",
            "{\"user\": \"admin\"}\n",
            "\n",
            ">>>\n",
            "expect status 200\n",
            "expect body.token exists\n",
            "expect duration < 2000\n",
            "<<<\n",
            "\n",
            ">>>capture\n",
            "token from body.token\n",
            "<<<\n",
            "\n",
            "### Fetch\n",
            "# @name fetch\n",
            "# @depends login\n",
            "GET {{baseUrl}}/me\n",
            "Authorization: Bearer {{login.token}}\n",
        ));
    }

    #[test]
    fn test_round_trip_blocks_and_auth() {
        round_trip(concat!(
            "### Upload\n",
            "# @name upload\n",
            "# @auth basic alice 'secret word'\n",
            "# @stress.weight 9\n",
            "POST http://x/upload\n",
            "\n",
            ">>>multipart\n",
            "title = Hello\n",
            "doc = @files/a.txt\n",
            "<<<\n",
        ));
    }

    #[test]
    fn test_round_trip_graphql() {
        round_trip(concat!(
            "### Q\n",
            "POST http://x/graphql\n",
            "\n",
            ">>>graphql\n",
            "query { me { id } }\n",
            "<<<\n",
            ">>>variables\n",
            "{\"a\": 1}\n",
            "<<<\n",
        ));
    }
}
