//! Test run report formatting.
//!
//! Colored per-request lines with assertion failure details, plus a
//! JSON mode for programmatic consumption.

use colored::Colorize;

use crate::runner::RunResult;

/// Test report formatter.
pub struct TestReport;

impl TestReport {
    /// Prints results in the requested format (`json` or text).
    pub fn print(run: &RunResult, format: &str) {
        match format.to_lowercase().as_str() {
            "json" => Self::print_json(run),
            _ => Self::print_text(run),
        }
    }

    /// Prints colored per-file, per-request lines.
    pub fn print_text(run: &RunResult) {
        for file in &run.files {
            println!();
            println!("{}", file.file.display().to_string().bold());
            for result in &file.results {
                if result.skipped {
                    let reason = result.skip_reason.as_deref().unwrap_or("skipped");
                    println!("  {} {} ({})", "○".yellow(), result.name, reason.dimmed());
                    continue;
                }
                if result.passed {
                    println!(
                        "  {} {} {}",
                        "✓".green(),
                        result.name,
                        format!("({} ms)", result.duration_ms).dimmed()
                    );
                    continue;
                }
                println!("  {} {}", "✗".red(), result.name.red());
                if let Some(error) = &result.error {
                    println!("      {error}");
                }
                for assertion in result.assertions.iter().filter(|a| !a.passed) {
                    println!(
                        "      {} {} {}",
                        "expect".dimmed(),
                        assertion.subject,
                        assertion.message
                    );
                }
            }
        }

        let (passed, failed, skipped) = run.counts();
        println!();
        let summary = format!("{passed} passed, {failed} failed, {skipped} skipped");
        if failed > 0 {
            println!("{}", summary.red().bold());
        } else {
            println!("{}", summary.green().bold());
        }
    }

    /// Prints the whole run as JSON.
    pub fn print_json(run: &RunResult) {
        match serde_json::to_string_pretty(run) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("failed to serialize results: {e}"),
        }
    }
}
