//! Single-pass recursive-descent parser for spec files.
//!
//! The parser drives the lexer token by token for structured lines and
//! falls back to the lexer's raw-read modes for free-form content (URLs,
//! header values, bodies). Every error carries `file:line:col` plus the
//! offending source line; recovery skips to the next `###` separator so
//! one bad request does not hide the rest of the file. A request either
//! parses completely or not at all.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::ast::{
    Assertion, AuthConfig, Body, Capture, CaptureSource, Metadata, Method, MultipartField,
    MultipartValue, Operator, Request, SpecFile, Subject, Variable,
};
use super::lexer::Lexer;
use super::token::{BlockKind, Token, TokenKind};
use crate::error::{Error, Result};

/// Parses a spec file from disk. The first parse error is fatal for the
/// file, per the error-handling contract.
pub fn parse_file(path: &Path) -> Result<SpecFile> {
    let source = std::fs::read_to_string(path)?;
    parse_str(&source, path)
}

/// Parses spec source text. `path` is used for error reporting and for
/// resolving relative filesystem references later on.
pub fn parse_str(source: &str, path: &Path) -> Result<SpecFile> {
    let (file, mut errors) = Parser::new(source, path).parse();
    if errors.is_empty() {
        Ok(file)
    } else {
        Err(errors.remove(0))
    }
}

/// Recursive-descent parser over a [`Lexer`].
pub struct Parser {
    lexer: Lexer,
    path: PathBuf,
    errors: Vec<Error>,
}

/// An annotation waiting for its request.
struct PendingAnnotation {
    name: String,
    value: String,
    line: usize,
}

impl Parser {
    pub fn new(source: &str, path: &Path) -> Self {
        Self {
            lexer: Lexer::new(source),
            path: path.to_path_buf(),
            errors: Vec::new(),
        }
    }

    /// Parses the whole file, recovering at request separators.
    /// Returns the AST for the requests that parsed cleanly together
    /// with every error encountered.
    pub fn parse(mut self) -> (SpecFile, Vec<Error>) {
        let mut file = SpecFile {
            path: self.path.clone(),
            ..SpecFile::default()
        };
        let mut pending_title: Option<String> = None;
        let mut pending: Vec<PendingAnnotation> = Vec::new();

        loop {
            let token = self.lexer.peek_token();
            match &token.kind {
                TokenKind::Eof => break,
                TokenKind::Newline | TokenKind::Comment(_) => {
                    self.lexer.next_token();
                }
                TokenKind::Separator(name) => {
                    pending_title = name.clone();
                    pending.clear();
                    self.lexer.next_token();
                }
                TokenKind::Annotation {
                    name,
                    value,
                    hashed,
                } => {
                    if !hashed && value.starts_with('=') {
                        file.variables.push(Variable {
                            name: name.clone(),
                            value: value[1..].trim().to_string(),
                            line: token.line,
                        });
                    } else {
                        pending.push(PendingAnnotation {
                            name: name.clone(),
                            value: value
                                .strip_prefix('=')
                                .map(str::trim)
                                .unwrap_or(value)
                                .to_string(),
                            line: token.line,
                        });
                    }
                    self.lexer.next_token();
                }
                TokenKind::Word(word) => {
                    if let Some(method) = Method::from_str(word) {
                        self.lexer.next_token();
                        let title = pending_title.take();
                        let annotations = std::mem::take(&mut pending);
                        match self.parse_request(method, token.line, title, annotations) {
                            Ok(request) => file.requests.push(request),
                            Err(e) => {
                                self.errors.push(e);
                                self.recover();
                            }
                        }
                    } else {
                        let message = format!("expected an HTTP method, found '{word}'");
                        self.errors.push(self.err(&token, message));
                        self.recover();
                    }
                }
                _ => {
                    self.errors.push(self.err(&token, "expected a request or variable"));
                    self.recover();
                }
            }
        }

        self.check_names(&file);
        (file, self.errors)
    }

    /// Post-parse consistency checks: duplicate names are errors,
    /// missing `depends` targets only a warning.
    fn check_names(&mut self, file: &SpecFile) {
        let names: Vec<&str> = file
            .requests
            .iter()
            .filter_map(|r| r.name.as_deref())
            .collect();
        let mut seen: Vec<&str> = Vec::new();
        for request in &file.requests {
            if let Some(name) = request.name.as_deref() {
                if seen.contains(&name) {
                    self.errors.push(self.err_at(
                        request.line,
                        1,
                        format!("duplicate request name '{name}'"),
                    ));
                }
                seen.push(name);
            }
        }
        for request in &file.requests {
            for dep in &request.metadata.depends {
                if !names.contains(&dep.as_str()) {
                    tracing::warn!(
                        file = %self.path.display(),
                        request = %request.label(),
                        dependency = %dep,
                        "depends target not found in file"
                    );
                }
            }
        }
    }

    fn err(&self, token: &Token, message: impl Into<String>) -> Error {
        Error::parse(
            &self.path,
            token.line,
            token.column,
            message,
            self.lexer.line_text(token.line),
        )
    }

    fn err_at(&self, line: usize, column: usize, message: impl Into<String>) -> Error {
        Error::parse(&self.path, line, column, message, self.lexer.line_text(line))
    }

    /// Skips tokens up to the next `###` separator or EOF.
    fn recover(&mut self) {
        loop {
            match self.lexer.peek_token().kind {
                TokenKind::Separator(_) | TokenKind::Eof => break,
                _ => {
                    self.lexer.next_token();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    fn parse_request(
        &mut self,
        method: Method,
        line: usize,
        title: Option<String>,
        annotations: Vec<PendingAnnotation>,
    ) -> Result<Request> {
        let url = self.lexer.read_rest_of_line();
        if url.is_empty() {
            return Err(self.err_at(line, 1, "missing URL after method"));
        }

        let mut request = Request {
            name: None,
            method,
            url,
            headers: Vec::new(),
            query_params: Vec::new(),
            body: Body::None,
            assertions: Vec::new(),
            captures: Vec::new(),
            metadata: Metadata::default(),
            line,
        };
        if let Some(title) = title {
            request.metadata.description = Some(title);
        }
        self.apply_annotations(&mut request, annotations)?;

        let mut body_lines: Vec<String> = Vec::new();
        let mut in_body = false;

        loop {
            if self.lexer.at_eof() {
                break;
            }
            let raw = self.lexer.peek_line();
            let trimmed = raw.trim();

            if trimmed.starts_with("###") {
                break;
            }
            if trimmed.starts_with(">>>") {
                self.finish_raw_body(&mut request, &mut body_lines)?;
                self.parse_block(&mut request)?;
                continue;
            }
            if trimmed.is_empty() {
                self.lexer.read_line_raw();
                if in_body {
                    body_lines.push(String::new());
                }
                continue;
            }
            if !in_body {
                if let Some(rest) = trimmed.strip_prefix('?').or_else(|| trimmed.strip_prefix('&')) {
                    let (key, value) = rest.split_once('=').unwrap_or((rest, ""));
                    request
                        .query_params
                        .push((key.trim().to_string(), value.trim().to_string()));
                    self.lexer.read_line_raw();
                    continue;
                }
                if trimmed.starts_with("//") || trimmed.starts_with('#') {
                    self.lexer.read_line_raw();
                    continue;
                }
                if let Some((key, value)) = header_line(trimmed) {
                    request.headers.push((key, value));
                    self.lexer.read_line_raw();
                    continue;
                }
                in_body = true;
            }
            body_lines.push(self.lexer.read_line_raw());
        }

        self.finish_raw_body(&mut request, &mut body_lines)?;
        Ok(request)
    }

    /// Classifies accumulated raw body lines, honoring an explicit
    /// `Content-Type` header over the prefix heuristic.
    fn finish_raw_body(&mut self, request: &mut Request, lines: &mut Vec<String>) -> Result<()> {
        while lines.last().map(|l| l.trim().is_empty()).unwrap_or(false) {
            lines.pop();
        }
        if lines.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(lines).join("\n");
        if request.body != Body::None {
            return Err(self.err_at(request.line, 1, "request has more than one body"));
        }

        let content_type = request
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.to_ascii_lowercase());
        request.body = match content_type.as_deref() {
            Some(ct) if ct.contains("json") => Body::Json(text),
            Some(ct) if ct.contains("xml") => Body::Xml(text),
            Some(ct) if ct.contains("x-www-form-urlencoded") => Body::Form(text),
            _ => classify_body(text),
        };
        Ok(())
    }

    // ------------------------------------------------------------------
    // Annotations
    // ------------------------------------------------------------------

    fn apply_annotations(
        &mut self,
        request: &mut Request,
        annotations: Vec<PendingAnnotation>,
    ) -> Result<()> {
        for ann in annotations {
            let PendingAnnotation { name, value, line } = ann;
            let meta = &mut request.metadata;
            match name.as_str() {
                "name" => request.name = Some(value),
                "description" => meta.description = Some(value),
                "tags" => {
                    meta.tags = value
                        .split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect();
                }
                "skip" => meta.skip = Some(value),
                "only" => meta.only = true,
                "timeout" => meta.timeout_ms = Some(self.parse_int(&value, line, "timeout")?),
                "retry" => meta.retry = self.parse_int::<u32>(&value, line, "retry")?,
                "retrydelay" => {
                    meta.retry_delay_ms = self.parse_int(&value, line, "retrydelay")?;
                }
                "retryon" => {
                    meta.retry_on = value
                        .split(',')
                        .map(|s| {
                            s.trim().parse::<u16>().map_err(|_| {
                                self.err_at(line, 1, format!("invalid retryon status '{}'", s.trim()))
                            })
                        })
                        .collect::<Result<Vec<_>>>()?;
                }
                "depends" => {
                    meta.depends = value
                        .split(',')
                        .map(|d| d.trim().to_string())
                        .filter(|d| !d.is_empty())
                        .collect();
                }
                "auth" => meta.auth = Some(self.parse_auth(&value, line)?),
                "before" => meta.before = Some(value),
                "after" => meta.after = Some(value),
                "stress.weight" => {
                    let weight: u32 = self.parse_int(&value, line, "stress.weight")?;
                    if weight == 0 {
                        return Err(self.err_at(line, 1, "stress.weight must be at least 1"));
                    }
                    meta.stress.weight = weight;
                }
                "stress.think" => {
                    meta.stress.think_ms = Some(self.parse_int(&value, line, "stress.think")?);
                }
                "stress.skip" => meta.stress.skip = true,
                "stress.setup" => meta.stress.setup = true,
                "stress.teardown" => meta.stress.teardown = true,
                other => {
                    return Err(self.err_at(line, 1, format!("unknown annotation '@{other}'")));
                }
            }
        }
        Ok(())
    }

    fn parse_int<T: std::str::FromStr>(&self, value: &str, line: usize, what: &str) -> Result<T> {
        value
            .trim()
            .parse::<T>()
            .map_err(|_| self.err_at(line, 1, format!("invalid {what} value '{value}'")))
    }

    fn parse_auth(&self, value: &str, line: usize) -> Result<AuthConfig> {
        let mut parts = split_auth_args(value);
        if parts.is_empty() {
            return Err(self.err_at(line, 1, "missing auth scheme"));
        }
        let scheme = parts.remove(0);
        let need = |n: usize, scheme: &str| -> Result<()> {
            if parts.len() < n {
                Err(self.err_at(line, 1, format!("auth {scheme} expects {n} argument(s)")))
            } else {
                Ok(())
            }
        };
        match scheme.as_str() {
            "basic" => {
                need(2, "basic")?;
                Ok(AuthConfig::Basic {
                    username: parts[0].clone(),
                    password: parts[1].clone(),
                })
            }
            "bearer" => {
                need(1, "bearer")?;
                Ok(AuthConfig::Bearer {
                    token: parts[0].clone(),
                })
            }
            "apikey" => {
                need(2, "apikey")?;
                Ok(AuthConfig::ApiKey {
                    header: parts[0].clone(),
                    value: parts[1].clone(),
                })
            }
            "apikey-query" => {
                need(2, "apikey-query")?;
                Ok(AuthConfig::ApiKeyQuery {
                    name: parts[0].clone(),
                    value: parts[1].clone(),
                })
            }
            "digest" => {
                need(2, "digest")?;
                Ok(AuthConfig::Digest {
                    username: parts[0].clone(),
                    password: parts[1].clone(),
                })
            }
            "aws" => {
                need(4, "aws")?;
                Ok(AuthConfig::Aws {
                    access_key: parts[0].clone(),
                    secret_key: parts[1].clone(),
                    region: parts[2].clone(),
                    service: parts[3].clone(),
                })
            }
            "oauth2" => {
                need(3, "oauth2")?;
                Ok(AuthConfig::OAuth2 {
                    token_url: parts[0].clone(),
                    client_id: parts[1].clone(),
                    client_secret: parts[2].clone(),
                    username: parts.get(3).cloned(),
                    password: parts.get(4).cloned(),
                })
            }
            other => Err(self.err_at(line, 1, format!("unknown auth scheme '{other}'"))),
        }
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    fn parse_block(&mut self, request: &mut Request) -> Result<()> {
        let token = self.lexer.next_token();
        let tag = match &token.kind {
            TokenKind::BlockStart(tag) => tag.trim().to_string(),
            _ => return Err(self.err(&token, "expected a block")),
        };
        let kind = BlockKind::from_tag(&tag)
            .ok_or_else(|| self.err(&token, format!("unknown block tag '{tag}'")))?;

        match kind {
            BlockKind::Assertions => self.parse_assertion_block(request),
            BlockKind::Capture => self.parse_capture_block(request),
            BlockKind::Multipart => {
                let (content, start) = self.read_block_body(&token)?;
                let fields = self.parse_multipart_fields(&content, start)?;
                self.set_body(request, Body::Multipart(fields), &token)
            }
            BlockKind::Form => {
                let (content, start) = self.read_block_body(&token)?;
                let pairs = self.parse_form_fields(&content, start)?;
                self.set_body(request, Body::FormBlock(pairs), &token)
            }
            BlockKind::GraphQl => {
                let (content, _) = self.read_block_body(&token)?;
                self.set_body(
                    request,
                    Body::GraphQl {
                        query: content,
                        variables: None,
                    },
                    &token,
                )
            }
            BlockKind::Variables => {
                let (content, _) = self.read_block_body(&token)?;
                match &mut request.body {
                    Body::GraphQl { variables, .. } => {
                        *variables = Some(content);
                        Ok(())
                    }
                    _ => Err(self.err(&token, "variables block requires a graphql body")),
                }
            }
        }
    }

    fn read_block_body(&mut self, token: &Token) -> Result<(String, usize)> {
        let start = self.lexer.current_line();
        let (content, found) = self.lexer.read_raw_until_block_end();
        if !found {
            return Err(self.err(token, "unterminated block: missing '<<<'"));
        }
        Ok((content, start))
    }

    fn set_body(&self, request: &mut Request, body: Body, token: &Token) -> Result<()> {
        if request.body != Body::None {
            return Err(self.err(token, "request has more than one body"));
        }
        request.body = body;
        Ok(())
    }

    fn parse_multipart_fields(&self, content: &str, start: usize) -> Result<Vec<MultipartField>> {
        let mut fields = Vec::new();
        for (offset, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
                continue;
            }
            let (name, value) = trimmed.split_once('=').ok_or_else(|| {
                self.err_at(start + offset, 1, "multipart field must be 'name = value'")
            })?;
            let value = value.trim();
            let field_value = match value.strip_prefix('@') {
                Some(path) => MultipartValue::File(path.trim().to_string()),
                None => MultipartValue::Text(value.to_string()),
            };
            fields.push(MultipartField {
                name: name.trim().to_string(),
                value: field_value,
            });
        }
        Ok(fields)
    }

    fn parse_form_fields(&self, content: &str, start: usize) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        for (offset, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
                continue;
            }
            let (key, value) = trimmed.split_once('=').ok_or_else(|| {
                self.err_at(start + offset, 1, "form field must be 'key = value'")
            })?;
            pairs.push((key.trim().to_string(), value.trim().to_string()));
        }
        Ok(pairs)
    }

    fn parse_assertion_block(&mut self, request: &mut Request) -> Result<()> {
        loop {
            let token = self.lexer.next_token();
            match &token.kind {
                TokenKind::Newline | TokenKind::Comment(_) => continue,
                TokenKind::BlockEnd => return Ok(()),
                TokenKind::Eof => {
                    return Err(self.err(&token, "unterminated assertion block: missing '<<<'"))
                }
                TokenKind::Word(w) if w == "expect" => {
                    let assertion = self.parse_assertion_line(token.line)?;
                    request.assertions.push(assertion);
                }
                _ => return Err(self.err(&token, "expected 'expect' or '<<<'")),
            }
        }
    }

    fn parse_assertion_line(&mut self, line: usize) -> Result<Assertion> {
        let subject = self.parse_subject()?;

        // Operator is optional: a bare subject asserts existence, a
        // subject followed directly by a literal asserts equality.
        let peeked = self.lexer.peek_token();
        let operator = match &peeked.kind {
            TokenKind::Newline | TokenKind::Eof | TokenKind::Comment(_) => {
                return Ok(Assertion {
                    subject,
                    operator: Operator::Exists,
                    expected: None,
                    line,
                });
            }
            TokenKind::Operator(sym) => {
                self.lexer.next_token();
                Operator::from_str(sym)
                    .ok_or_else(|| self.err(&peeked, format!("unknown operator '{sym}'")))?
            }
            TokenKind::Word(w) => {
                if let Some(op) = Operator::from_str(w) {
                    self.lexer.next_token();
                    op
                } else {
                    return Err(self.err(&peeked, format!("unknown operator '{w}'")));
                }
            }
            // A literal directly after the subject asserts equality.
            _ => Operator::Eq,
        };

        let expected = self.parse_expected(&operator)?;
        if expected.is_none() && !operator.expected_optional() {
            return Err(self.err_at(line, 1, format!("operator '{operator}' requires an expected value")));
        }
        Ok(Assertion {
            subject,
            operator,
            expected,
            line,
        })
    }

    fn parse_subject(&mut self) -> Result<Subject> {
        let token = self.lexer.next_token();
        let word = match &token.kind {
            TokenKind::Word(w) => w.clone(),
            _ => return Err(self.err(&token, "expected an assertion subject")),
        };
        match word.as_str() {
            "status" => Ok(Subject::Status),
            "duration" => Ok(Subject::Duration),
            "p50" => Ok(Subject::P50),
            "p95" => Ok(Subject::P95),
            "p99" => Ok(Subject::P99),
            "header" => {
                let peeked = self.lexer.peek_token();
                match &peeked.kind {
                    TokenKind::Word(w) if Operator::from_str(w).is_none() => {
                        self.lexer.next_token();
                        Ok(Subject::Header(Some(w.clone())))
                    }
                    _ => Ok(Subject::Header(None)),
                }
            }
            "body" => Ok(Subject::Body(self.parse_path_suffix()?)),
            "jsonpath" => {
                let token = self.lexer.next_token();
                let head = match &token.kind {
                    TokenKind::Word(w) => w.clone(),
                    _ => return Err(self.err(&token, "expected a path after 'jsonpath'")),
                };
                let mut expr = head;
                if let Some(rest) = self.parse_path_suffix()? {
                    expr.push('.');
                    expr.push_str(&rest);
                }
                Ok(Subject::JsonPath(expr))
            }
            other => Err(self.err(&token, format!("unknown assertion subject '{other}'"))),
        }
    }

    /// Parses a `.seg`, `.0`, or `[0]` path continuation into the
    /// canonical `seg[0].inner` form. Returns `None` for an empty path.
    fn parse_path_suffix(&mut self) -> Result<Option<String>> {
        let mut path = String::new();
        loop {
            let peeked = self.lexer.peek_token();
            match &peeked.kind {
                TokenKind::Dot => {
                    self.lexer.next_token();
                    let token = self.lexer.next_token();
                    let segment = match &token.kind {
                        TokenKind::Word(w) => w.clone(),
                        TokenKind::Number(n) if n.fract() == 0.0 && *n >= 0.0 => {
                            format!("{}", *n as u64)
                        }
                        _ => return Err(self.err(&token, "expected a path segment after '.'")),
                    };
                    if !path.is_empty() {
                        path.push('.');
                    }
                    path.push_str(&segment);
                }
                TokenKind::LBracket => {
                    self.lexer.next_token();
                    let token = self.lexer.next_token();
                    let index = match &token.kind {
                        TokenKind::Number(n) if n.fract() == 0.0 && *n >= 0.0 => *n as u64,
                        _ => return Err(self.err(&token, "expected an array index after '['")),
                    };
                    let token = self.lexer.next_token();
                    if token.kind != TokenKind::RBracket {
                        return Err(self.err(&token, "expected ']'"));
                    }
                    path.push_str(&format!("[{index}]"));
                }
                _ => break,
            }
        }
        Ok(if path.is_empty() { None } else { Some(path) })
    }

    fn parse_expected(&mut self, operator: &Operator) -> Result<Option<Value>> {
        let peeked = self.lexer.peek_token();
        match &peeked.kind {
            TokenKind::Newline | TokenKind::Eof | TokenKind::Comment(_) => Ok(None),
            TokenKind::Str(s) => {
                self.lexer.next_token();
                Ok(Some(Value::String(s.clone())))
            }
            TokenKind::Number(n) => {
                self.lexer.next_token();
                Ok(Some(number_value(*n)))
            }
            TokenKind::Bool(b) => {
                self.lexer.next_token();
                Ok(Some(Value::Bool(*b)))
            }
            TokenKind::Null => {
                self.lexer.next_token();
                Ok(Some(Value::Null))
            }
            TokenKind::VariableRef(name) => {
                self.lexer.next_token();
                Ok(Some(Value::String(format!("{{{{{name}}}}}"))))
            }
            TokenKind::LBracket => {
                self.lexer.next_token();
                Ok(Some(self.parse_array_literal()?))
            }
            _ => {
                // `each` maps and bare words fall back to the raw line.
                let rest = self.lexer.read_rest_of_line();
                if rest.starts_with('{') && !rest.starts_with("{{") {
                    let value: Value = serde_json::from_str(&rest).map_err(|e| {
                        self.err_at(peeked.line, peeked.column, format!("invalid JSON value: {e}"))
                    })?;
                    if *operator == Operator::Each && !value.is_object() {
                        return Err(self.err_at(
                            peeked.line,
                            peeked.column,
                            "'each' expects an operator/value map",
                        ));
                    }
                    Ok(Some(value))
                } else {
                    Ok(Some(Value::String(rest)))
                }
            }
        }
    }

    fn parse_array_literal(&mut self) -> Result<Value> {
        let mut items = Vec::new();
        loop {
            let token = self.lexer.next_token();
            match &token.kind {
                TokenKind::RBracket => break,
                TokenKind::Comma | TokenKind::Newline => continue,
                TokenKind::Str(s) => items.push(Value::String(s.clone())),
                TokenKind::Number(n) => items.push(number_value(*n)),
                TokenKind::Bool(b) => items.push(Value::Bool(*b)),
                TokenKind::Null => items.push(Value::Null),
                TokenKind::Word(w) => items.push(Value::String(w.clone())),
                _ => return Err(self.err(&token, "expected a literal or ']'")),
            }
        }
        Ok(Value::Array(items))
    }

    fn parse_capture_block(&mut self, request: &mut Request) -> Result<()> {
        loop {
            let token = self.lexer.next_token();
            match &token.kind {
                TokenKind::Newline | TokenKind::Comment(_) => continue,
                TokenKind::BlockEnd => return Ok(()),
                TokenKind::Eof => {
                    return Err(self.err(&token, "unterminated capture block: missing '<<<'"))
                }
                TokenKind::Word(name) => {
                    let from = self.lexer.next_token();
                    match &from.kind {
                        TokenKind::Word(w) if w == "from" => {}
                        _ => return Err(self.err(&from, "expected 'from'")),
                    }
                    let source_text = self.lexer.read_rest_of_line();
                    let source = self.parse_capture_source(&source_text, &token)?;
                    request.captures.push(Capture {
                        name: name.clone(),
                        source,
                        line: token.line,
                    });
                }
                _ => return Err(self.err(&token, "expected a capture name or '<<<'")),
            }
        }
    }

    fn parse_capture_source(&self, text: &str, token: &Token) -> Result<CaptureSource> {
        if text == "status" {
            return Ok(CaptureSource::Status);
        }
        if text == "duration" {
            return Ok(CaptureSource::Duration);
        }
        if let Some(name) = text.strip_prefix("header ") {
            return Ok(CaptureSource::Header(name.trim().to_string()));
        }
        if text == "body" {
            return Ok(CaptureSource::Body(None));
        }
        if let Some(path) = text.strip_prefix("body.") {
            return Ok(CaptureSource::Body(Some(path.to_string())));
        }
        if let Some(rest) = text.strip_prefix("body[") {
            return Ok(CaptureSource::Body(Some(format!("[{rest}"))));
        }
        Err(self.err(token, format!("invalid capture source '{text}'")))
    }
}

/// Prefix heuristic for bodies without an explicit content type.
fn classify_body(text: String) -> Body {
    let head = text.trim_start();
    if head.starts_with('{') || head.starts_with('[') {
        Body::Json(text)
    } else if head.starts_with("<?xml") || head.starts_with('<') {
        Body::Xml(text)
    } else if text.contains('=') && !text.contains('\n') {
        Body::Form(text)
    } else {
        Body::Raw(text)
    }
}

/// Converts an f64 literal to the narrowest JSON number.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// `Name: value` header detection. Header names use the RFC 7230 token
/// charset; anything else starts the body.
fn header_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty()
        || !name.chars().all(|c| {
            c.is_ascii_alphanumeric() || "!#$%&'*+.^_`|~-".contains(c)
        })
    {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Splits auth annotation arguments on whitespace, honoring single and
/// double quotes so passwords may contain spaces.
fn split_auth_args(value: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in value.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                } else if c.is_whitespace() {
                    if !current.is_empty() {
                        out.push(std::mem::take(&mut current));
                    }
                } else {
                    current.push(c);
                }
            }
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
