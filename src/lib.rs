//! # hitspec - file-based HTTP API testing and load generation
//!
//! Plain-text files that look like real HTTP requests, augmented with
//! typed directives, response assertions, and captures that chain
//! values between requests. hitspec parses those files, resolves
//! variables, and executes them either as a functional test suite
//! honoring declared dependencies or as a sustained stress workload
//! with latency thresholds.
//!
//! ## Spec file example
//!
//! ```text
//! @baseUrl = https://api.example.com
//!
//! ### Get health
//! # @name health
//! # @tags smoke
//! GET {{baseUrl}}/health
//!
//! >>>
//! expect status 200
//! expect body.status == "ok"
//! <<<
//!
//! >>>capture
//! token from body.access_token
//! <<<
//! ```
//!
//! ## Crate layout
//!
//! - [`spec`] - lexer, parser, and the typed AST
//! - [`template`] - builtin functions and the `{{…}}` resolver
//! - [`check`] - assertions, captures, snapshots
//! - [`http`] - request building, auth schemes, the client
//! - [`runner`] - dependency-ordered test execution
//! - [`stress`] - rate/VU load generation, metrics, thresholds

pub mod check;
pub mod cli;
pub mod config;
pub mod error;
pub mod fspath;
pub mod http;
pub mod report;
pub mod runner;
pub mod spec;
pub mod stress;
pub mod template;
pub mod walk;

pub use config::Config;
pub use error::{Error, Result};
pub use runner::{RunResult, RunnerConfig, TestRunner};
pub use stress::{StressConfig, StressOutcome, StressRunner};
