//! Stress orchestrator.
//!
//! Loads spec files into one merged namespace, categorizes requests as
//! setup/teardown/main, runs setup sequentially, then drives the main
//! workload in rate mode (token bucket pacing) or VU mode (worker
//! pool), snapshotting metrics every 500 ms. Teardown runs on a fresh,
//! uncancelled context; the summary and threshold verdicts close the
//! run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::metrics::{Outcome, StressMetrics, StressSummary};
use super::scheduler::Scheduler;
use super::thresholds::{self, Threshold, ThresholdResult};
use super::vu::VuPool;
use crate::check::{self, EvalOptions};
use crate::config::{Config, StressProfile};
use crate::error::{Error, Result};
use crate::http::{build_request, HttpClient, RequestDefaults};
use crate::spec::{self, Body, Request};
use crate::template::Resolver;

const SNAPSHOT_INTERVAL: Duration = Duration::from_millis(500);
const RAMP_TICK: Duration = Duration::from_millis(100);

/// Stress run parameters.
#[derive(Debug, Clone)]
pub struct StressConfig {
    pub duration: Duration,
    /// Target requests/sec; `Some` selects rate mode.
    pub rate: Option<f64>,
    /// Virtual users (VU mode).
    pub vus: usize,
    /// Concurrency bound for in-flight requests.
    pub max_vus: usize,
    /// Default think time between VU iterations.
    pub think_time: Duration,
    pub ramp_up: Duration,
    pub thresholds: Vec<Threshold>,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(30),
            rate: None,
            vus: 10,
            max_vus: 50,
            think_time: Duration::ZERO,
            ramp_up: Duration::ZERO,
            thresholds: Vec::new(),
        }
    }
}

impl StressConfig {
    /// Overlays a named profile from the config file. Values already
    /// set by the caller keep their CLI-provided values only when the
    /// profile omits them.
    pub fn apply_profile(&mut self, profile: &StressProfile) -> Result<()> {
        if let Some(secs) = profile.duration {
            self.duration = Duration::from_secs(secs);
        }
        if profile.rate.is_some() {
            self.rate = profile.rate;
        }
        if let Some(vus) = profile.vus {
            self.vus = vus;
        }
        if let Some(max_vus) = profile.max_vus {
            self.max_vus = max_vus;
        }
        if let Some(think) = profile.think_time {
            self.think_time = Duration::from_millis(think);
        }
        if let Some(ramp) = profile.ramp_up {
            self.ramp_up = Duration::from_secs(ramp);
        }
        if !profile.thresholds.is_empty() {
            self.thresholds = thresholds::parse_thresholds(&profile.thresholds_expr())?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.duration.is_zero() {
            return Err(Error::Config("stress duration must be positive".into()));
        }
        if self.ramp_up > self.duration {
            return Err(Error::Config("ramp-up cannot exceed duration".into()));
        }
        if let Some(rate) = self.rate {
            if rate <= 0.0 {
                return Err(Error::Config("rate must be positive".into()));
            }
        } else if self.vus == 0 {
            return Err(Error::Config("vus must be at least 1".into()));
        }
        if self.max_vus == 0 {
            return Err(Error::Config("max-vus must be at least 1".into()));
        }
        Ok(())
    }
}

/// Final outcome: summary, threshold verdicts, and the overall signal.
#[derive(Debug, Clone)]
pub struct StressOutcome {
    pub summary: StressSummary,
    pub thresholds: Vec<ThresholdResult>,
    pub passed: bool,
    /// Set when setup aborted the run; the summary is partial.
    pub setup_error: Option<String>,
}

/// One schedulable request plus the directory its file lives in.
struct Target {
    request: Request,
    base_dir: PathBuf,
    label: String,
}

/// Everything a worker needs, shared behind one Arc.
struct StressContext {
    client: Arc<HttpClient>,
    resolver: Arc<Resolver>,
    defaults: RequestDefaults,
    metrics: Arc<StressMetrics>,
    scheduler: Arc<Scheduler>,
    targets: Vec<Target>,
    think_time: Duration,
    cancel: CancellationToken,
}

/// Drives a stress run end to end.
pub struct StressRunner {
    app: Config,
    config: StressConfig,
    client: Arc<HttpClient>,
}

impl StressRunner {
    pub fn new(app: Config, config: StressConfig) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(HttpClient::new(&app.client_options())?);
        Ok(Self {
            app,
            config,
            client,
        })
    }

    pub async fn run(&self, files: &[PathBuf], environment: Option<&str>) -> Result<StressOutcome> {
        self.run_with_cancel(files, environment, CancellationToken::new())
            .await
    }

    /// Runs the full state machine. `external` lets the caller abort
    /// (e.g. on interrupt); teardown still runs on a fresh context.
    pub async fn run_with_cancel(
        &self,
        files: &[PathBuf],
        environment: Option<&str>,
        external: CancellationToken,
    ) -> Result<StressOutcome> {
        // Loading: all files merge into one resolver namespace.
        let resolver = Arc::new(Resolver::new());
        let mut setup: Vec<Target> = Vec::new();
        let mut teardown: Vec<Target> = Vec::new();
        let mut main: Vec<Target> = Vec::new();

        for path in files {
            let file = spec::parse_file(path)?;
            let base_dir = file.base_dir();
            self.app.seed_resolver(&resolver, environment, &base_dir);
            for variable in &file.variables {
                resolver.set_variable(&variable.name, &variable.value);
            }
            for request in file.requests {
                let stress = &request.metadata.stress;
                if stress.skip {
                    continue;
                }
                let target = Target {
                    label: request.label(),
                    base_dir: base_dir.clone(),
                    request,
                };
                if target.request.metadata.stress.setup {
                    setup.push(target);
                } else if target.request.metadata.stress.teardown {
                    teardown.push(target);
                } else {
                    main.push(target);
                }
            }
        }
        if main.is_empty() {
            return Err(Error::Config("no stress requests found".into()));
        }

        let metrics = Arc::new(StressMetrics::new());
        let defaults = self.app.request_defaults();

        // Setup runs sequentially and aborts the run on first failure.
        for target in &setup {
            if let Err(message) = self
                .run_lifecycle_request(target, &resolver, &defaults, true)
                .await
            {
                tracing::error!(request = %target.label, error = %message, "setup failed");
                let summary = metrics.summary();
                let threshold_results = thresholds::evaluate(&self.config.thresholds, &summary);
                return Ok(StressOutcome {
                    summary,
                    thresholds: threshold_results,
                    passed: false,
                    setup_error: Some(message),
                });
            }
        }

        let weights: Vec<u32> = main
            .iter()
            .map(|t| t.request.metadata.stress.weight)
            .collect();
        let scheduler = Arc::new(Scheduler::new(
            weights,
            self.config.rate,
            self.config.vus,
            self.config.max_vus,
            self.config.ramp_up,
        ));

        let cancel = external.child_token();
        let context = Arc::new(StressContext {
            client: Arc::clone(&self.client),
            resolver: Arc::clone(&resolver),
            defaults: defaults.clone(),
            metrics: Arc::clone(&metrics),
            scheduler: Arc::clone(&scheduler),
            targets: main,
            think_time: self.config.think_time,
            cancel: cancel.clone(),
        });

        // Duration timer and 500 ms snapshot ticker.
        let timer = {
            let cancel = cancel.clone();
            let duration = self.config.duration;
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                cancel.cancel();
            })
        };
        let ticker = {
            let metrics = Arc::clone(&metrics);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(SNAPSHOT_INTERVAL);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            metrics.snapshot();
                        }
                    }
                }
            })
        };

        if self.config.rate.is_some() {
            self.run_rate_mode(&context).await;
        } else {
            self.run_vu_mode(&context).await;
        }

        // Let in-flight requests finish, then close out metrics.
        scheduler.drain().await;
        timer.abort();
        let _ = ticker.await;
        metrics.snapshot();

        // Teardown runs on a fresh, uncancelled context.
        for target in &teardown {
            if let Err(message) = self
                .run_lifecycle_request(target, &resolver, &defaults, false)
                .await
            {
                tracing::warn!(request = %target.label, error = %message, "teardown failed");
            }
        }

        let summary = metrics.summary();
        let threshold_results = thresholds::evaluate(&self.config.thresholds, &summary);
        let passed = threshold_results.iter().all(|t| t.passed);
        Ok(StressOutcome {
            summary,
            thresholds: threshold_results,
            passed,
            setup_error: None,
        })
    }

    /// Rate mode: wait for a token, pick a target, take a slot, spawn.
    async fn run_rate_mode(&self, context: &Arc<StressContext>) {
        let started = Instant::now();
        let ramp_task = if !self.config.ramp_up.is_zero() {
            let scheduler = Arc::clone(&context.scheduler);
            let cancel = context.cancel.clone();
            Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval(RAMP_TICK);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            scheduler.update_rate(scheduler.current_rate(started.elapsed()));
                        }
                    }
                }
            }))
        } else {
            None
        };

        loop {
            if !context.scheduler.wait(&context.cancel).await {
                break;
            }
            let index = context.scheduler.select();
            let Some(permit) = context.scheduler.acquire(&context.cancel).await else {
                break;
            };
            let context = Arc::clone(context);
            tokio::spawn(async move {
                execute_stress_request(&context, index).await;
                drop(permit);
            });
        }

        if let Some(task) = ramp_task {
            let _ = task.await;
        }
    }

    /// VU mode: a worker pool scaled on the ramp tick.
    async fn run_vu_mode(&self, context: &Arc<StressContext>) {
        let pool = {
            let context = Arc::clone(context);
            VuPool::new(context.cancel.clone(), move |token| {
                let context = Arc::clone(&context);
                tokio::spawn(vu_worker(context, token))
            })
        };

        let started = Instant::now();
        let initial = if self.config.ramp_up.is_zero() {
            self.config.vus
        } else {
            context.scheduler.current_vus(Duration::ZERO)
        };
        pool.scale(initial).await;
        context.metrics.set_active_vus(pool.active() as u64);

        if self.config.ramp_up.is_zero() {
            context.cancel.cancelled().await;
        } else {
            let mut interval = tokio::time::interval(RAMP_TICK);
            loop {
                tokio::select! {
                    _ = context.cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let target = context.scheduler.current_vus(started.elapsed());
                        if target != pool.active() {
                            pool.scale(target).await;
                            context.metrics.set_active_vus(pool.active() as u64);
                        }
                    }
                }
            }
        }

        pool.shutdown().await;
        context.metrics.set_active_vus(0);
    }

    /// Setup/teardown execution: assertions are honored, captures
    /// publish into the shared resolver so main requests can use them.
    async fn run_lifecycle_request(
        &self,
        target: &Target,
        resolver: &Arc<Resolver>,
        defaults: &RequestDefaults,
        publish_captures: bool,
    ) -> std::result::Result<(), String> {
        let request = &target.request;
        let built = build_request(request, resolver, &target.base_dir, defaults)
            .map_err(|e| e.to_string())?;
        let response = self
            .client
            .execute(&built, request.metadata.auth.as_ref())
            .await
            .map_err(|e| e.to_string())?;

        let options = EvalOptions {
            resolver: Some(resolver.as_ref()),
            ..EvalOptions::new(&target.base_dir)
        };
        let results = check::evaluate(&request.assertions, &response, &options);
        if let Some(failed) = results.iter().find(|r| !r.passed) {
            return Err(format!(
                "assertion failed: {} {} ({})",
                failed.subject, failed.operator, failed.message
            ));
        }
        if request.assertions.is_empty() && !response.is_success() {
            return Err(format!("unexpected status {}", response.status));
        }

        if publish_captures {
            for capture in check::extract(&request.captures, &response) {
                resolver.set_capture(&capture.name, &capture.value);
                if let Some(name) = &request.name {
                    resolver.set_capture(format!("{name}.{}", capture.name), &capture.value);
                }
            }
        }
        Ok(())
    }
}

/// One VU: select, acquire, execute, think, repeat until cancelled.
async fn vu_worker(context: Arc<StressContext>, token: CancellationToken) {
    loop {
        if token.is_cancelled() {
            break;
        }
        let index = context.scheduler.select();
        let Some(permit) = context.scheduler.acquire(&token).await else {
            break;
        };
        execute_stress_request(&context, index).await;
        drop(permit);

        let think = context.targets[index]
            .request
            .metadata
            .stress
            .think_ms
            .map(Duration::from_millis)
            .unwrap_or(context.think_time);
        if !think.is_zero() {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(think) => {}
            }
        }
    }
}

/// Executes one scheduled request and records its outcome. A template
/// with unresolved holes is refused before it reaches the wire.
async fn execute_stress_request(context: &StressContext, index: usize) {
    let target = &context.targets[index];
    let request = &target.request;

    let unresolved = unresolved_variables(&context.resolver, request);
    if !unresolved.is_empty() {
        tracing::warn!(
            request = %target.label,
            variables = %unresolved.join(", "),
            "skipping request with unresolved variables"
        );
        context
            .metrics
            .record(&target.label, Duration::ZERO, Outcome::Error);
        return;
    }

    let built = match build_request(request, &context.resolver, &target.base_dir, &context.defaults)
    {
        Ok(built) => built,
        Err(e) => {
            tracing::debug!(request = %target.label, error = %e, "build failed");
            context
                .metrics
                .record(&target.label, Duration::ZERO, Outcome::Error);
            return;
        }
    };

    let start = Instant::now();
    let outcome = match context
        .client
        .execute(&built, request.metadata.auth.as_ref())
        .await
    {
        Ok(response) => {
            if context.cancel.is_cancelled() {
                // Completion beyond the deadline counts as a timeout.
                Outcome::Timeout
            } else if response.is_success() {
                Outcome::Success
            } else {
                Outcome::Error
            }
        }
        Err(crate::error::Error::Request(e)) if e.is_timeout() => Outcome::Timeout,
        Err(_) => Outcome::Error,
    };
    context.metrics.record(&target.label, start.elapsed(), outcome);
}

/// Unresolved `{{…}}` names across the URL, header values, and body
/// templates of a request.
fn unresolved_variables(resolver: &Resolver, request: &Request) -> Vec<String> {
    let mut names = resolver.get_unresolved_variables(&request.url);
    for (_, value) in &request.headers {
        names.extend(resolver.get_unresolved_variables(value));
    }
    for text in body_templates(&request.body) {
        names.extend(resolver.get_unresolved_variables(text));
    }
    names.sort();
    names.dedup();
    names
}

fn body_templates(body: &Body) -> Vec<&str> {
    match body {
        Body::None => Vec::new(),
        Body::Json(text) | Body::Form(text) | Body::Raw(text) | Body::Xml(text) => vec![text],
        Body::FormBlock(pairs) => pairs.iter().map(|(_, v)| v.as_str()).collect(),
        Body::Multipart(fields) => fields
            .iter()
            .filter_map(|f| match &f.value {
                spec::MultipartValue::Text(text) => Some(text.as_str()),
                spec::MultipartValue::File(_) => None,
            })
            .collect(),
        Body::GraphQl { query, variables } => {
            let mut out = vec![query.as_str()];
            if let Some(vars) = variables {
                out.push(vars.as_str());
            }
            out
        }
    }
}
