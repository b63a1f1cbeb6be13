//! Test runner: filtering, ordering, execution, capture propagation.
//!
//! For each file the runner parses, seeds a fresh resolver, selects the
//! effective request set, orders it topologically, and executes it
//! either sequentially (captures propagate, dependencies honored) or in
//! a bounded-parallel mode for dependency-free files.

pub mod graph;
pub mod hooks;
pub mod result;

pub use result::{FileResult, RequestEcho, RequestResult, ResponseEcho, RunResult};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::check::{self, EvalOptions, SnapshotStore};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::{build_request, HttpClient, RequestDefaults};
use crate::spec::{self, Request, SpecFile};
use crate::template::Resolver;

/// Invocation-level runner options.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Named environment from the config file.
    pub environment: Option<String>,
    /// Request name pattern: exact, `prefix*`, `*suffix`, or `*infix*`.
    pub filter: Option<String>,
    /// Keep only requests whose tags intersect this set.
    pub tags: Vec<String>,
    pub parallel: bool,
    pub concurrency: usize,
    /// Stop executing after the first failure.
    pub bail: bool,
    pub update_snapshots: bool,
    /// CLI variable overrides, highest precedence.
    pub env_overrides: Vec<(String, String)>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            environment: None,
            filter: None,
            tags: Vec::new(),
            parallel: false,
            concurrency: 4,
            bail: false,
            update_snapshots: false,
            env_overrides: Vec::new(),
        }
    }
}

/// Shared per-file execution context, cheap to hand to spawned tasks.
struct ExecContext {
    client: Arc<HttpClient>,
    resolver: Arc<Resolver>,
    snapshots: Arc<SnapshotStore>,
    base_dir: PathBuf,
    defaults: RequestDefaults,
    default_retries: u32,
    default_retry_delay_ms: u64,
}

/// Runs spec files in test mode.
pub struct TestRunner {
    app: Config,
    options: RunnerConfig,
    client: Arc<HttpClient>,
}

impl TestRunner {
    pub fn new(app: Config, options: RunnerConfig) -> Result<Self> {
        let client = Arc::new(HttpClient::new(&app.client_options())?);
        Ok(Self {
            app,
            options,
            client,
        })
    }

    /// Runs every file, stopping early only when `bail` is set and a
    /// file fails.
    pub async fn run(&self, files: &[PathBuf]) -> Result<RunResult> {
        let mut run = RunResult::default();
        for path in files {
            let file_result = self.run_file(path).await?;
            let failed = !file_result.passed();
            run.files.push(file_result);
            if failed && self.options.bail {
                break;
            }
        }
        Ok(run)
    }

    /// Parses and executes one spec file.
    pub async fn run_file(&self, path: &Path) -> Result<FileResult> {
        let file = spec::parse_file(path)?;
        let base_dir = file.base_dir();

        let resolver = Arc::new(Resolver::new());
        self.app
            .seed_resolver(&resolver, self.options.environment.as_deref(), &base_dir);
        for variable in &file.variables {
            resolver.set_variable(&variable.name, &variable.value);
        }
        for (key, value) in &self.options.env_overrides {
            resolver.set_dotenv(key.clone(), value.clone());
        }

        let snapshots = Arc::new(SnapshotStore::for_spec(path, self.options.update_snapshots)?);
        let requests = self.effective_set(&file);
        let order = graph::topo_order(&requests)?;

        let context = Arc::new(ExecContext {
            client: Arc::clone(&self.client),
            resolver: Arc::clone(&resolver),
            snapshots: Arc::clone(&snapshots),
            base_dir,
            defaults: self.app.request_defaults(),
            default_retries: self.app.retries,
            default_retry_delay_ms: self.app.retry_delay,
        });

        let results = if self.options.parallel {
            if requests.iter().any(|r| !r.metadata.depends.is_empty()) {
                return Err(Error::Config(
                    "parallel execution requires requests without depends".to_string(),
                ));
            }
            self.run_parallel(&requests, context).await
        } else {
            self.run_sequential(&requests, &order, context).await
        };

        snapshots.persist()?;
        Ok(FileResult {
            file: path.to_path_buf(),
            results,
        })
    }

    /// Applies `only`, name, and tag filters. Skip-flagged requests
    /// survive so they can be reported.
    fn effective_set(&self, file: &SpecFile) -> Vec<Request> {
        let any_only = file.requests.iter().any(|r| r.metadata.only);
        file.requests
            .iter()
            .filter(|request| {
                if any_only && !request.metadata.only {
                    return false;
                }
                if let Some(pattern) = &self.options.filter {
                    if !name_matches(pattern, &request.label()) {
                        return false;
                    }
                }
                if !self.options.tags.is_empty()
                    && !request
                        .metadata
                        .tags
                        .iter()
                        .any(|tag| self.options.tags.contains(tag))
                {
                    return false;
                }
                true
            })
            .cloned()
            .collect()
    }

    async fn run_sequential(
        &self,
        requests: &[Request],
        order: &[usize],
        context: Arc<ExecContext>,
    ) -> Vec<RequestResult> {
        let mut slots: Vec<Option<RequestResult>> = vec![None; requests.len()];
        let mut passed_by_name: HashMap<String, bool> = HashMap::new();
        let mut bailed = false;

        for &idx in order {
            let request = &requests[idx];
            let label = request.label();

            if bailed {
                slots[idx] = Some(RequestResult::skipped(label, "bail"));
                continue;
            }
            if let Some(reason) = &request.metadata.skip {
                let reason = if reason.is_empty() { "skipped" } else { reason };
                if let Some(name) = &request.name {
                    passed_by_name.insert(name.clone(), false);
                }
                slots[idx] = Some(RequestResult::skipped(label, reason));
                continue;
            }
            let dependency_failed = request
                .metadata
                .depends
                .iter()
                .any(|dep| passed_by_name.get(dep).copied() != Some(true));
            if dependency_failed {
                if let Some(name) = &request.name {
                    passed_by_name.insert(name.clone(), false);
                }
                slots[idx] = Some(RequestResult::skipped(label, "dependency failed"));
                continue;
            }

            let result = execute_with_retry(&context, request).await;
            if let Some(name) = &request.name {
                passed_by_name.insert(name.clone(), result.passed);
            }
            // Captures publish under the bare name and, for named
            // requests, the namespaced form.
            for capture in &result.captures {
                context.resolver.set_capture(&capture.name, &capture.value);
                if let Some(name) = &request.name {
                    context
                        .resolver
                        .set_capture(format!("{name}.{}", capture.name), &capture.value);
                }
            }
            if !result.ok() && self.options.bail {
                bailed = true;
            }
            slots[idx] = Some(result);
        }

        slots.into_iter().flatten().collect()
    }

    /// Dependency-free fan-out bounded by a semaphore. Captures are not
    /// published back into the resolver here.
    async fn run_parallel(
        &self,
        requests: &[Request],
        context: Arc<ExecContext>,
    ) -> Vec<RequestResult> {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut handles = Vec::new();
        let mut slots: Vec<Option<RequestResult>> = vec![None; requests.len()];

        for (idx, request) in requests.iter().enumerate() {
            if let Some(reason) = &request.metadata.skip {
                let reason = if reason.is_empty() { "skipped" } else { reason };
                slots[idx] = Some(RequestResult::skipped(request.label(), reason));
                continue;
            }
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .expect("semaphore closed");
            let context = Arc::clone(&context);
            let request = request.clone();
            handles.push((
                idx,
                tokio::spawn(async move {
                    let result = execute_with_retry(&context, &request).await;
                    drop(permit);
                    result
                }),
            ));
        }

        for (idx, handle) in handles {
            match handle.await {
                Ok(result) => slots[idx] = Some(result),
                Err(e) => {
                    slots[idx] = Some(RequestResult::failed(
                        requests[idx].label(),
                        format!("task panicked: {e}"),
                    ));
                }
            }
        }
        slots.into_iter().flatten().collect()
    }
}

/// Wildcard name matching: `*x*` infix, `x*` prefix, `*x` suffix,
/// otherwise exact.
fn name_matches(pattern: &str, name: &str) -> bool {
    match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
        (Some(infix), Some(_)) => {
            let infix = infix.trim_end_matches('*');
            name.contains(infix)
        }
        (Some(suffix), None) => name.ends_with(suffix),
        (None, Some(prefix)) => name.starts_with(prefix),
        (None, None) => name == pattern,
    }
}

/// Retry wrapper: at most `retry + 1` attempts, gated by the RetryOn
/// status list when present.
async fn execute_with_retry(context: &ExecContext, request: &Request) -> RequestResult {
    let retries = if request.metadata.retry > 0 {
        request.metadata.retry
    } else {
        context.default_retries
    };
    let delay = if request.metadata.retry_delay_ms > 0 {
        request.metadata.retry_delay_ms
    } else {
        context.default_retry_delay_ms
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = execute_once(context, request).await;
        if result.ok() || attempt > retries {
            return result;
        }
        if !request.metadata.retry_on.is_empty() {
            let status = result.response.as_ref().map(|r| r.status);
            if !status.map(|s| request.metadata.retry_on.contains(&s)).unwrap_or(false) {
                return result;
            }
        }
        tracing::debug!(
            request = %request.label(),
            attempt,
            "retrying after {delay}ms"
        );
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

/// One attempt: before hook, build, send, assert, capture, after hook.
/// The after hook runs on every exit path.
async fn execute_once(context: &ExecContext, request: &Request) -> RequestResult {
    let label = request.label();
    let metadata = &request.metadata;

    if let Some(before) = &metadata.before {
        if let Err(e) = hooks::run_hook(before, &context.base_dir).await {
            run_after_hook(context, request).await;
            return RequestResult::failed(label, e.to_string());
        }
    }

    let built = match build_request(request, &context.resolver, &context.base_dir, &context.defaults)
    {
        Ok(built) => built,
        Err(e) => {
            run_after_hook(context, request).await;
            return RequestResult::failed(label, e.to_string());
        }
    };
    let echo = RequestEcho {
        method: built.method.to_string(),
        url: built.url.clone(),
    };

    let response = match context.client.execute(&built, metadata.auth.as_ref()).await {
        Ok(response) => response,
        Err(e) => {
            run_after_hook(context, request).await;
            let mut result = RequestResult::failed(label, e.to_string());
            result.request = Some(echo);
            return result;
        }
    };

    let eval_options = EvalOptions {
        base_dir: &context.base_dir,
        resolver: Some(context.resolver.as_ref()),
        snapshots: Some(context.snapshots.as_ref()),
        snapshot_key: check::request_key(
            request.name.as_deref(),
            built.method.as_str(),
            &built.url,
        ),
    };
    let assertions = check::evaluate(&request.assertions, &response, &eval_options);
    let captures = check::extract(&request.captures, &response);
    let mut passed = assertions.iter().all(|a| a.passed);
    let mut error = None;

    if let Some(after) = &metadata.after {
        if let Err(e) = hooks::run_hook(after, &context.base_dir).await {
            passed = false;
            error = Some(e.to_string());
        }
    }

    RequestResult {
        name: label,
        passed,
        skipped: false,
        skip_reason: None,
        duration_ms: response.duration_ms(),
        request: Some(echo),
        response: Some(ResponseEcho::new(response.status.as_u16(), &response.body)),
        assertions,
        captures,
        error,
    }
}

async fn run_after_hook(context: &ExecContext, request: &Request) {
    if let Some(after) = &request.metadata.after {
        if let Err(e) = hooks::run_hook(after, &context.base_dir).await {
            tracing::warn!(request = %request.label(), error = %e, "after hook failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matching() {
        assert!(name_matches("health", "health"));
        assert!(!name_matches("health", "health-check"));
        assert!(name_matches("health*", "health-check"));
        assert!(name_matches("*check", "health-check"));
        assert!(name_matches("*alth-ch*", "health-check"));
        assert!(!name_matches("*zzz*", "health-check"));
    }

    #[test]
    fn test_effective_set_only_and_tags() {
        let source = concat!(
            "### a\n# @name a\n# @tags smoke\nGET http://x/a\n",
            "### b\n# @name b\n# @only\n# @tags slow\nGET http://x/b\n",
            "### c\n# @name c\n# @only\n# @tags smoke\nGET http://x/c\n",
        );
        let file = spec::parse_str(source, Path::new("t.http")).unwrap();
        let runner = TestRunner::new(
            Config::default(),
            RunnerConfig {
                tags: vec!["smoke".to_string()],
                ..RunnerConfig::default()
            },
        )
        .unwrap();
        let effective = runner.effective_set(&file);
        // `only` narrows to b and c, the tag filter keeps only c.
        assert_eq!(effective.len(), 1);
        assert_eq!(effective[0].name.as_deref(), Some("c"));
    }

    #[test]
    fn test_filter_by_name_pattern() {
        let source = concat!(
            "### login\n# @name login\nGET http://x/a\n",
            "### logout\n# @name logout\nGET http://x/b\n",
            "### health\n# @name health\nGET http://x/c\n",
        );
        let file = spec::parse_str(source, Path::new("t.http")).unwrap();
        let runner = TestRunner::new(
            Config::default(),
            RunnerConfig {
                filter: Some("log*".to_string()),
                ..RunnerConfig::default()
            },
        )
        .unwrap();
        let effective = runner.effective_set(&file);
        assert_eq!(effective.len(), 2);
    }
}
