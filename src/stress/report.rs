//! Stress result formatting.
//!
//! Colored text output for humans and a JSON mode for machines.

use colored::Colorize;
use serde_json::json;

use super::runner::StressOutcome;

/// Stress report formatter.
pub struct StressReport;

impl StressReport {
    /// Prints the outcome in colored text format.
    pub fn print_text(outcome: &StressOutcome) {
        let summary = &outcome.summary;
        println!();
        println!("{}", "═══════════════════════════════════════════════════════════".cyan());
        println!("{}", "                      STRESS RESULTS                        ".cyan().bold());
        println!("{}", "═══════════════════════════════════════════════════════════".cyan());
        println!();

        if let Some(error) = &outcome.setup_error {
            println!("{} {}", "Setup failed:".red().bold(), error);
            println!();
        }

        println!("{}", "Requests".white().bold());
        println!("   Total:               {}", summary.total_requests.to_string().cyan());
        println!("   Success:             {}", summary.success.to_string().green());
        println!(
            "   Errors:              {}",
            if summary.errors > 0 {
                summary.errors.to_string().red()
            } else {
                summary.errors.to_string().green()
            }
        );
        println!("   Timeouts:            {}", summary.timeouts);
        println!("   Duration:            {:.2} s", summary.duration_secs);
        println!(
            "   Requests/sec:        {}",
            format!("{:.2}", summary.rps).yellow().bold()
        );
        println!("   Error Rate:          {:.2}%", summary.error_rate * 100.0);
        println!();

        let latency = &summary.latency;
        println!("{}", "Latency".white().bold());
        println!("   Min:                 {:.2} ms", latency.min_ms);
        println!("   p50 (Median):        {:.2} ms", latency.p50_ms);
        println!("   p95:                 {:.2} ms", latency.p95_ms);
        println!("   p99:                 {:.2} ms", latency.p99_ms);
        println!("   Max:                 {:.2} ms", latency.max_ms);
        println!("   Mean:                {:.2} ms", latency.mean_ms);
        println!("   StdDev:              {:.2} ms", latency.stddev_ms);

        if summary.per_request.len() > 1 {
            println!();
            println!("{}", "Per Request".white().bold());
            for row in &summary.per_request {
                println!(
                    "   {:<28} {:>7} reqs  {:>5} err  p95 {:.1} ms",
                    row.name, row.total, row.errors, row.p95_ms
                );
            }
        }

        if !outcome.thresholds.is_empty() {
            println!();
            println!("{}", "Thresholds".white().bold());
            for threshold in &outcome.thresholds {
                let mark = if threshold.passed {
                    "✓".green()
                } else {
                    "✗".red()
                };
                println!(
                    "   {mark} {:<24} expected {:<12} actual {}",
                    threshold.name, threshold.expected, threshold.actual
                );
            }
        }

        println!();
        let verdict = if outcome.passed {
            "PASSED".green().bold()
        } else {
            "FAILED".red().bold()
        };
        println!("   Result: {verdict}");
        println!("{}", "═══════════════════════════════════════════════════════════".cyan());
    }

    /// Prints the outcome as JSON.
    pub fn print_json(outcome: &StressOutcome) {
        let document = json!({
            "summary": outcome.summary,
            "thresholds": outcome.thresholds,
            "passed": outcome.passed,
            "setup_error": outcome.setup_error,
        });
        match serde_json::to_string_pretty(&document) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("failed to serialize stress outcome: {e}"),
        }
    }

    /// Prints in the requested format (`json` or text).
    pub fn print(outcome: &StressOutcome, format: &str) {
        match format.to_lowercase().as_str() {
            "json" => Self::print_json(outcome),
            _ => Self::print_text(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stress::metrics::{LatencySummary, StressSummary};

    fn outcome() -> StressOutcome {
        StressOutcome {
            summary: StressSummary {
                total_requests: 50,
                success: 50,
                errors: 0,
                timeouts: 0,
                duration_secs: 1.0,
                rps: 50.0,
                success_rate: 1.0,
                error_rate: 0.0,
                latency: LatencySummary {
                    min_ms: 1.0,
                    p50_ms: 5.0,
                    p95_ms: 9.0,
                    p99_ms: 9.9,
                    max_ms: 10.0,
                    mean_ms: 5.2,
                    stddev_ms: 1.1,
                },
                per_request: Vec::new(),
                series: Vec::new(),
            },
            thresholds: Vec::new(),
            passed: true,
            setup_error: None,
        }
    }

    #[test]
    fn test_json_serializes() {
        let outcome = outcome();
        let text = serde_json::to_string(&outcome.summary).unwrap();
        assert!(text.contains("total_requests"));
        assert!(text.contains("p95_ms"));
    }

    #[test]
    fn test_print_does_not_panic() {
        StressReport::print(&outcome(), "text");
        StressReport::print(&outcome(), "json");
    }
}
