//! CLI argument definitions for hitspec.
//!
//! This module uses the `clap` crate with derive macros to define the
//! `run` (functional test) and `stress` (load generation) subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// File-based HTTP API testing and load generation.
///
/// hitspec executes `.http` / `.hitspec` files as a functional test
/// suite honoring declared dependencies, or as a sustained stress
/// workload with latency thresholds.
///
/// # Examples
///
/// ```bash
/// # Run every spec under ./api as tests
/// hitspec run api/
///
/// # Stress a suite at 50 req/s for 30 seconds
/// hitspec stress api/checkout.http --rate 50 --duration 30 \
///   --thresholds "p95<200ms,errors<1%"
/// ```
#[derive(Parser, Debug)]
#[command(name = "hitspec")]
#[command(version)]
#[command(about = "File-based HTTP API testing and load generation", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ./hitspec.config.json when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run spec files as a functional test suite.
    Run {
        /// Spec files or directories (walked for *.http / *.hitspec).
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Named environment from the config file.
        #[arg(short = 'e', long)]
        env: Option<String>,

        /// Request name pattern: exact, `prefix*`, `*suffix`, `*infix*`.
        #[arg(long)]
        filter: Option<String>,

        /// Comma-separated tag filter.
        #[arg(long)]
        tags: Option<String>,

        /// Run dependency-free files with bounded parallelism.
        #[arg(long)]
        parallel: bool,

        /// Worker count for --parallel.
        #[arg(short = 'c', long, default_value = "4")]
        concurrency: usize,

        /// Stop at the first failing request.
        #[arg(long)]
        bail: bool,

        /// Default request timeout in milliseconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Skip TLS certificate verification.
        #[arg(short = 'k', long)]
        insecure: bool,

        /// Proxy URL for all requests.
        #[arg(long)]
        proxy: Option<String>,

        /// Overwrite mismatched snapshots and record missing ones.
        #[arg(long)]
        update_snapshots: bool,

        /// Variable override, repeatable: --var KEY=VALUE.
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Output format (text, json).
        #[arg(long, default_value = "text")]
        output: String,
    },

    /// Run spec files as a stress workload.
    Stress {
        /// Spec files or directories (walked for *.http / *.hitspec).
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Named environment from the config file.
        #[arg(short = 'e', long)]
        env: Option<String>,

        /// Run duration in seconds.
        #[arg(short = 'd', long, default_value = "30")]
        duration: u64,

        /// Target requests/sec; selects rate mode.
        #[arg(short = 'r', long)]
        rate: Option<f64>,

        /// Virtual users (VU mode, when --rate is absent).
        #[arg(long, default_value = "10")]
        vus: usize,

        /// Concurrency cap for in-flight requests.
        #[arg(long)]
        max_vus: Option<usize>,

        /// Think time between VU iterations in milliseconds.
        #[arg(long, default_value = "0")]
        think_time: u64,

        /// Linear ramp-up interval in seconds.
        #[arg(long, default_value = "0")]
        ramp_up: u64,

        /// Threshold expression, e.g. "p95<200ms,errors<1%".
        #[arg(long)]
        thresholds: Option<String>,

        /// Stress profile name from the config file.
        #[arg(long)]
        profile: Option<String>,

        /// Skip TLS certificate verification.
        #[arg(short = 'k', long)]
        insecure: bool,

        /// Output format (text, json).
        #[arg(long, default_value = "text")]
        output: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let cli = Cli::parse_from(["hitspec", "run", "api.http"]);
        match cli.command {
            Commands::Run {
                paths,
                parallel,
                concurrency,
                bail,
                output,
                ..
            } => {
                assert_eq!(paths, vec![PathBuf::from("api.http")]);
                assert!(!parallel);
                assert_eq!(concurrency, 4);
                assert!(!bail);
                assert_eq!(output, "text");
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_stress_flags() {
        let cli = Cli::parse_from([
            "hitspec", "stress", "api.http", "--rate", "50", "--duration", "5",
            "--thresholds", "p95<200ms,errors<0.1%",
        ]);
        match cli.command {
            Commands::Stress {
                rate,
                duration,
                thresholds,
                vus,
                ..
            } => {
                assert_eq!(rate, Some(50.0));
                assert_eq!(duration, 5);
                assert_eq!(thresholds.as_deref(), Some("p95<200ms,errors<0.1%"));
                assert_eq!(vus, 10);
            }
            other => panic!("expected stress, got {other:?}"),
        }
    }

    #[test]
    fn test_run_vars_repeatable() {
        let cli = Cli::parse_from([
            "hitspec", "run", "a.http", "--var", "A=1", "--var", "B=2",
        ]);
        match cli.command {
            Commands::Run { vars, .. } => assert_eq!(vars, vec!["A=1", "B=2"]),
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_paths_required() {
        assert!(Cli::try_parse_from(["hitspec", "run"]).is_err());
    }
}
