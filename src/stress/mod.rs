//! Stress engine: scheduling, virtual users, metrics, thresholds, and
//! the orchestrator.
//!
//! - [`Scheduler`] - weighted selection, rate limiting, concurrency cap
//! - [`VuPool`] - long-lived workers with dynamic scaling
//! - [`StressMetrics`] - atomic counters + HDR latency histogram
//! - [`thresholds`] - pass/fail conditions over the final summary
//! - [`StressRunner`] - setup → main loop → teardown → report

pub mod metrics;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod thresholds;
pub mod vu;

pub use metrics::{Outcome, StressMetrics, StressSummary, TimePoint};
pub use report::StressReport;
pub use runner::{StressConfig, StressOutcome, StressRunner};
pub use scheduler::Scheduler;
pub use thresholds::{format_thresholds, parse_thresholds, Threshold, ThresholdResult};
pub use vu::VuPool;
