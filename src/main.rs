//! hitspec binary entry point.
//!
//! Thin orchestration over the library: parse the CLI, load config,
//! dispatch to the test runner or the stress runner, print the report,
//! and map the outcome to the exit-code contract (0 success, 1 test or
//! threshold failure, 2 parse error, 3 config error, 4 network error,
//! 64 usage error).

use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use hitspec::cli::{Cli, Commands};
use hitspec::config::Config;
use hitspec::error::{Error, Result};
use hitspec::report::TestReport;
use hitspec::runner::{RunnerConfig, TestRunner};
use hitspec::stress::{parse_thresholds, StressConfig, StressReport, StressRunner};
use hitspec::walk;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(64);
        }
    };

    let filter = if cli.verbose {
        EnvFilter::new("hitspec=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hitspec=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let config = Config::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Run {
            paths,
            env,
            filter,
            tags,
            parallel,
            concurrency,
            bail,
            timeout,
            insecure,
            proxy,
            update_snapshots,
            vars,
            output,
        } => {
            let mut config = config;
            if let Some(ms) = timeout {
                config.timeout = ms;
            }
            if insecure {
                config.validate_ssl = false;
            }
            if let Some(proxy) = proxy {
                config.proxy = proxy;
            }

            let options = RunnerConfig {
                environment: env,
                filter,
                tags: split_list(tags),
                parallel,
                concurrency,
                bail,
                update_snapshots,
                env_overrides: parse_overrides(&vars)?,
            };

            let files = walk::collect_spec_files(&paths)?;
            if files.is_empty() {
                return Err(Error::Config("no spec files found".into()));
            }
            let runner = TestRunner::new(config, options)?;
            let result = runner.run(&files).await?;
            TestReport::print(&result, &output);
            Ok(if result.passed() { 0 } else { 1 })
        }

        Commands::Stress {
            paths,
            env,
            duration,
            rate,
            vus,
            max_vus,
            think_time,
            ramp_up,
            thresholds,
            profile,
            insecure,
            output,
        } => {
            let mut config = config;
            if insecure {
                config.validate_ssl = false;
            }

            let mut stress = StressConfig {
                duration: Duration::from_secs(duration),
                rate,
                vus,
                max_vus: max_vus.unwrap_or_else(|| vus.max(50)),
                think_time: Duration::from_millis(think_time),
                ramp_up: Duration::from_secs(ramp_up),
                thresholds: Vec::new(),
            };
            if let Some(name) = &profile {
                let profile = config.stress.profiles.get(name).cloned().ok_or_else(|| {
                    Error::Config(format!("unknown stress profile '{name}'"))
                })?;
                stress.apply_profile(&profile)?;
            }
            if let Some(expr) = &thresholds {
                stress.thresholds = parse_thresholds(expr)?;
            }

            let files = walk::collect_spec_files(&paths)?;
            if files.is_empty() {
                return Err(Error::Config("no spec files found".into()));
            }

            // Ctrl-C cancels the run; teardown still happens.
            let cancel = CancellationToken::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.cancel();
                    }
                });
            }

            let runner = StressRunner::new(config, stress)?;
            let outcome = runner
                .run_with_cancel(&files, env.as_deref(), cancel)
                .await?;
            StressReport::print(&outcome, &output);
            Ok(if outcome.passed { 0 } else { 1 })
        }
    }
}

fn split_list(input: Option<String>) -> Vec<String> {
    input
        .map(|s| {
            s.split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_overrides(vars: &[String]) -> Result<Vec<(String, String)>> {
    vars.iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .ok_or_else(|| Error::Config(format!("invalid --var '{pair}', expected KEY=VALUE")))
        })
        .collect()
}
