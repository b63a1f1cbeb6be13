//! Variable resolution for `{{…}}` templates.
//!
//! A single [`Resolver`] instance is shared by every worker in a run, so
//! all namespaces sit behind mutexes. Lookup order for a plain name is
//! captures → user variables → dotenv → process environment; `$NAME`
//! forces environment lookup and `$fn(args)` invokes a builtin.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use regex::Regex;

use super::builtins::{split_args, BuiltinRegistry};

static TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^{}]*)\}\}").expect("valid template regex"));

/// Values referenced inside a template may themselves be templates;
/// expansion stops at this depth to stay finite on self-references.
const MAX_DEPTH: usize = 10;

/// Callback invoked with a human-readable message for each warning.
pub type WarnCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Thread-safe `{{…}}` interpolator over four namespaces.
pub struct Resolver {
    variables: Mutex<HashMap<String, String>>,
    captures: Mutex<HashMap<String, String>>,
    dotenv: Mutex<HashMap<String, String>>,
    builtins: BuiltinRegistry,
    warn: Mutex<Option<WarnCallback>>,
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            variables: Mutex::new(HashMap::new()),
            captures: Mutex::new(HashMap::new()),
            dotenv: Mutex::new(HashMap::new()),
            builtins: BuiltinRegistry::with_defaults(),
            warn: Mutex::new(None),
        }
    }

    /// Registers an additional builtin. Must happen before the run
    /// starts sharing the resolver across workers.
    pub fn register_builtin<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&[String]) -> Result<String, String> + Send + Sync + 'static,
    {
        self.builtins.register(name, function);
    }

    /// Installs the warning callback used for unresolved references.
    pub fn on_warning(&self, callback: WarnCallback) {
        *self.warn.lock().unwrap() = Some(callback);
    }

    pub fn set_variable(&self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.lock().unwrap().insert(name.into(), value.into());
    }

    /// Publishes a capture. Writes are visible to every subsequent
    /// resolve call on this resolver.
    pub fn set_capture(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let mut captures = self.captures.lock().unwrap();
        if captures.contains_key(&name) && !name.contains('.') {
            tracing::warn!(capture = %name, "capture name reused; last writer wins");
        }
        captures.insert(name, value.into());
    }

    pub fn set_dotenv(&self, name: impl Into<String>, value: impl Into<String>) {
        self.dotenv.lock().unwrap().insert(name.into(), value.into());
    }

    pub fn get_capture(&self, name: &str) -> Option<String> {
        self.captures.lock().unwrap().get(name).cloned()
    }

    /// Replaces every `{{EXPR}}` in `input`. Unresolved references warn
    /// and stay in place verbatim.
    pub fn resolve(&self, input: &str) -> String {
        self.resolve_depth(input, 0, true)
    }

    /// True when a resolution pass still leaves `{{…}}` holes.
    pub fn has_unresolved_variables(&self, input: &str) -> bool {
        !self.get_unresolved_variables(input).is_empty()
    }

    /// Names of the references that survive a resolution pass.
    pub fn get_unresolved_variables(&self, input: &str) -> Vec<String> {
        let resolved = self.resolve_depth(input, 0, false);
        TEMPLATE_RE
            .captures_iter(&resolved)
            .map(|c| c[1].trim().to_string())
            .collect()
    }

    fn resolve_depth(&self, input: &str, depth: usize, warn: bool) -> String {
        if depth >= MAX_DEPTH || !input.contains("{{") {
            return input.to_string();
        }
        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for caps in TEMPLATE_RE.captures_iter(input) {
            let whole = caps.get(0).unwrap();
            out.push_str(&input[last..whole.start()]);
            let expr = caps[1].trim().to_string();
            match self.resolve_expr(&expr, depth, warn) {
                Some(value) => out.push_str(&value),
                None => {
                    if warn {
                        self.emit_warning(&format!("unresolved variable '{{{{{expr}}}}}'"));
                    }
                    out.push_str(whole.as_str());
                }
            }
            last = whole.end();
        }
        out.push_str(&input[last..]);
        out
    }

    fn resolve_expr(&self, expr: &str, depth: usize, warn: bool) -> Option<String> {
        if let Some(rest) = expr.strip_prefix('$') {
            if rest.contains('(') {
                return self.call_builtin(rest, warn);
            }
            return self.env_lookup(rest);
        }
        // Backward-compatible builtin call without the `$` prefix.
        if expr.contains('(') {
            return self.call_builtin(expr, warn);
        }
        let from_captures = self.captures.lock().unwrap().get(expr).cloned();
        let from_variables =
            || self.variables.lock().unwrap().get(expr).cloned();
        let raw = from_captures
            .or_else(from_variables)
            .or_else(|| self.env_lookup(expr))?;
        // Values may reference other variables; expand them too.
        Some(self.resolve_depth(&raw, depth + 1, warn))
    }

    fn env_lookup(&self, name: &str) -> Option<String> {
        self.dotenv
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }

    fn call_builtin(&self, call: &str, warn: bool) -> Option<String> {
        let open = call.find('(')?;
        let close = call.rfind(')')?;
        if close < open {
            return None;
        }
        let name = call[..open].trim();
        let args = split_args(&call[open + 1..close]);
        match self.builtins.call(name, &args)? {
            Ok(value) => Some(value),
            Err(message) => {
                if warn {
                    self.emit_warning(&format!("builtin '{name}' failed: {message}"));
                }
                None
            }
        }
    }

    fn emit_warning(&self, message: &str) {
        tracing::warn!("{message}");
        if let Some(callback) = self.warn.lock().unwrap().as_ref() {
            callback(message);
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_variable_substitution() {
        let resolver = Resolver::new();
        resolver.set_variable("baseUrl", "https://api.example.com");
        assert_eq!(
            resolver.resolve("{{baseUrl}}/health"),
            "https://api.example.com/health"
        );
    }

    #[test]
    fn test_capture_precedes_variable() {
        let resolver = Resolver::new();
        resolver.set_variable("token", "from-var");
        resolver.set_capture("token", "from-capture");
        assert_eq!(resolver.resolve("{{token}}"), "from-capture");
    }

    #[test]
    fn test_dotenv_precedes_process_env() {
        let resolver = Resolver::new();
        std::env::set_var("HITSPEC_TEST_PRECEDENCE", "os");
        resolver.set_dotenv("HITSPEC_TEST_PRECEDENCE", "dotenv");
        assert_eq!(resolver.resolve("{{$HITSPEC_TEST_PRECEDENCE}}"), "dotenv");
        std::env::remove_var("HITSPEC_TEST_PRECEDENCE");
    }

    #[test]
    fn test_builtin_call() {
        let resolver = Resolver::new();
        let out = resolver.resolve("{{$base64(hi)}}");
        assert_eq!(out, "aGk=");
        // Legacy form without the dollar prefix.
        assert_eq!(resolver.resolve("{{base64(hi)}}"), "aGk=");
    }

    #[test]
    fn test_builtin_args_with_quotes() {
        let resolver = Resolver::new();
        assert_eq!(resolver.resolve("{{$base64('a,b')}}"), "YSxi");
    }

    #[test]
    fn test_unresolved_left_literal_and_warned() {
        let resolver = Resolver::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&hits);
        resolver.on_warning(Arc::new(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        }));
        let out = resolver.resolve("x {{missing}} y");
        assert_eq!(out, "x {{missing}} y");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unresolved_detection() {
        let resolver = Resolver::new();
        resolver.set_variable("known", "v");
        assert!(!resolver.has_unresolved_variables("{{known}}"));
        assert!(resolver.has_unresolved_variables("{{known}} {{ghost}}"));
        assert_eq!(
            resolver.get_unresolved_variables("{{a}} and {{b}}"),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_idempotent_when_fully_resolved() {
        let resolver = Resolver::new();
        resolver.set_variable("host", "example.com");
        resolver.set_variable("url", "https://{{host}}/v1");
        let once = resolver.resolve("{{url}}/users");
        assert_eq!(once, "https://example.com/v1/users");
        assert_eq!(resolver.resolve(&once), once);
    }

    #[test]
    fn test_self_reference_terminates() {
        let resolver = Resolver::new();
        resolver.set_variable("loop", "a{{loop}}");
        let out = resolver.resolve("{{loop}}");
        assert!(out.starts_with('a'));
    }

    #[test]
    fn test_namespaced_capture() {
        let resolver = Resolver::new();
        resolver.set_capture("login.token", "abc");
        assert_eq!(resolver.resolve("Bearer {{login.token}}"), "Bearer abc");
    }

    #[test]
    fn test_concurrent_access() {
        let resolver = Arc::new(Resolver::new());
        resolver.set_variable("base", "x");
        let mut handles = Vec::new();
        for i in 0..8 {
            let resolver = Arc::clone(&resolver);
            handles.push(std::thread::spawn(move || {
                for j in 0..100 {
                    resolver.set_capture(format!("c{i}"), format!("{j}"));
                    let _ = resolver.resolve("{{base}} {{c0}}");
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
