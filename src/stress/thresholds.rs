//! Threshold expressions over the stress summary.
//!
//! A threshold string is a comma-separated list of
//! `<metric><op><value>` tokens, e.g. `p95<200ms,errors<1%,rps>100`.
//! Percentile and max values are durations, error values a decimal or
//! percentage, rps a float.

use std::fmt;

use serde::Serialize;

use super::metrics::StressSummary;
use crate::error::{Error, Result};

/// Metric a threshold constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    P50,
    P95,
    P99,
    Max,
    /// Error fraction of total requests.
    Errors,
    Rps,
}

impl Metric {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "p50" => Some(Self::P50),
            "p95" => Some(Self::P95),
            "p99" => Some(Self::P99),
            "max" => Some(Self::Max),
            "errors" | "error" | "errorRate" => Some(Self::Errors),
            "rps" | "rate" => Some(Self::Rps),
            _ => None,
        }
    }

    fn canonical(&self) -> &'static str {
        match self {
            Self::P50 => "p50",
            Self::P95 => "p95",
            Self::P99 => "p99",
            Self::Max => "max",
            Self::Errors => "errors",
            Self::Rps => "rps",
        }
    }

    fn is_duration(&self) -> bool {
        matches!(self, Self::P50 | Self::P95 | Self::P99 | Self::Max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn holds(&self, actual: f64, limit: f64) -> bool {
        match self {
            Self::Lt => actual < limit,
            Self::Le => actual <= limit,
            Self::Gt => actual > limit,
            Self::Ge => actual >= limit,
        }
    }
}

/// One parsed threshold. Duration limits are milliseconds, error limits
/// fractions, rps limits plain floats.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: Metric,
    pub op: CmpOp,
    pub value: f64,
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = if self.metric.is_duration() {
            format!("{}ms", trim_float(self.value))
        } else {
            trim_float(self.value)
        };
        write!(f, "{}{}{}", self.metric.canonical(), self.op.as_str(), value)
    }
}

fn trim_float(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Parses a comma-separated threshold expression.
pub fn parse_thresholds(input: &str) -> Result<Vec<Threshold>> {
    let mut out = Vec::new();
    for token in input.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        out.push(parse_one(token)?);
    }
    Ok(out)
}

/// Canonical formatting; `parse_thresholds(format_thresholds(t)) == t`.
pub fn format_thresholds(thresholds: &[Threshold]) -> String {
    thresholds
        .iter()
        .map(Threshold::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_one(token: &str) -> Result<Threshold> {
    let op_at = token
        .find(|c| c == '<' || c == '>')
        .ok_or_else(|| Error::Config(format!("invalid threshold '{token}': missing comparator")))?;
    let metric = Metric::parse(&token[..op_at])
        .ok_or_else(|| Error::Config(format!("invalid threshold '{token}': unknown metric")))?;
    let rest = &token[op_at..];
    let (op, value_text) = if let Some(v) = rest.strip_prefix("<=") {
        (CmpOp::Le, v)
    } else if let Some(v) = rest.strip_prefix(">=") {
        (CmpOp::Ge, v)
    } else if let Some(v) = rest.strip_prefix('<') {
        (CmpOp::Lt, v)
    } else {
        (CmpOp::Gt, rest.strip_prefix('>').unwrap_or(rest))
    };
    let value = parse_value(metric, value_text.trim())
        .ok_or_else(|| Error::Config(format!("invalid threshold '{token}': bad value")))?;
    Ok(Threshold { metric, op, value })
}

/// Duration values accept `ms`/`s` suffixes (bare numbers are ms);
/// error values accept a `%` suffix meaning hundredths.
fn parse_value(metric: Metric, text: &str) -> Option<f64> {
    if metric.is_duration() {
        if let Some(v) = text.strip_suffix("ms") {
            return v.trim().parse().ok();
        }
        if let Some(v) = text.strip_suffix('s') {
            return v.trim().parse::<f64>().ok().map(|s| s * 1000.0);
        }
        return text.parse().ok();
    }
    if metric == Metric::Errors {
        if let Some(v) = text.strip_suffix('%') {
            return v.trim().parse::<f64>().ok().map(|p| p / 100.0);
        }
        return text.parse().ok();
    }
    text.parse().ok()
}

/// Evaluation of one threshold against a summary.
#[derive(Debug, Clone, Serialize)]
pub struct ThresholdResult {
    pub name: String,
    pub passed: bool,
    pub expected: String,
    pub actual: String,
}

/// Evaluates thresholds in order against the final summary.
pub fn evaluate(thresholds: &[Threshold], summary: &StressSummary) -> Vec<ThresholdResult> {
    thresholds
        .iter()
        .map(|threshold| {
            let actual = match threshold.metric {
                Metric::P50 => summary.latency.p50_ms,
                Metric::P95 => summary.latency.p95_ms,
                Metric::P99 => summary.latency.p99_ms,
                Metric::Max => summary.latency.max_ms,
                Metric::Errors => summary.error_rate,
                Metric::Rps => summary.rps,
            };
            let actual_text = match threshold.metric {
                Metric::Errors => format!("{:.2}%", actual * 100.0),
                m if m.is_duration() => format!("{actual:.1}ms"),
                _ => format!("{actual:.1}"),
            };
            ThresholdResult {
                name: threshold.to_string(),
                passed: threshold.op.holds(actual, threshold.value),
                expected: format!(
                    "{} {}",
                    threshold.op.as_str(),
                    if threshold.metric.is_duration() {
                        format!("{}ms", trim_float(threshold.value))
                    } else if threshold.metric == Metric::Errors {
                        format!("{:.2}%", threshold.value * 100.0)
                    } else {
                        trim_float(threshold.value)
                    }
                ),
                actual: actual_text,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stress::metrics::{LatencySummary, StressSummary};

    fn summary(p95: f64, error_rate: f64, rps: f64) -> StressSummary {
        StressSummary {
            total_requests: 100,
            success: 99,
            errors: 1,
            timeouts: 0,
            duration_secs: 2.0,
            rps,
            success_rate: 1.0 - error_rate,
            error_rate,
            latency: LatencySummary {
                min_ms: 1.0,
                p50_ms: 10.0,
                p95_ms: p95,
                p99_ms: p95 * 1.5,
                max_ms: p95 * 2.0,
                mean_ms: 12.0,
                stddev_ms: 3.0,
            },
            per_request: Vec::new(),
            series: Vec::new(),
        }
    }

    #[test]
    fn test_parse_mixed_expression() {
        let parsed = parse_thresholds("p95<200ms,errors<0.1%,rps>100").unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].metric, Metric::P95);
        assert_eq!(parsed[0].op, CmpOp::Lt);
        assert_eq!(parsed[0].value, 200.0);
        assert!((parsed[1].value - 0.001).abs() < 1e-9);
        assert_eq!(parsed[2].metric, Metric::Rps);
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_thresholds("p50<1.5s").unwrap()[0].value, 1500.0);
        assert_eq!(parse_thresholds("max<=250").unwrap()[0].value, 250.0);
        assert_eq!(parse_thresholds("p99>=10ms").unwrap()[0].op, CmpOp::Ge);
    }

    #[test]
    fn test_parse_metric_aliases() {
        assert_eq!(parse_thresholds("error<0.5").unwrap()[0].metric, Metric::Errors);
        assert_eq!(
            parse_thresholds("errorRate<0.5").unwrap()[0].metric,
            Metric::Errors
        );
        assert_eq!(parse_thresholds("rate>10").unwrap()[0].metric, Metric::Rps);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_thresholds("p95=200").is_err());
        assert!(parse_thresholds("p42<200").is_err());
        assert!(parse_thresholds("p95<abc").is_err());
    }

    #[test]
    fn test_format_parse_round_trip() {
        let original = parse_thresholds("p95<200ms,errors<0.001,rps>=99.5,max<=1500ms").unwrap();
        let formatted = format_thresholds(&original);
        let reparsed = parse_thresholds(&formatted).unwrap();
        assert_eq!(original, reparsed);
    }

    #[test]
    fn test_evaluate_pass_and_fail() {
        let thresholds = parse_thresholds("p95<200ms,errors<1%,rps>40").unwrap();
        let results = evaluate(&thresholds, &summary(150.0, 0.0, 50.0));
        assert!(results.iter().all(|r| r.passed));

        let results = evaluate(&thresholds, &summary(250.0, 0.05, 30.0));
        assert!(results.iter().all(|r| !r.passed));
        assert_eq!(results[0].name, "p95<200ms");
        assert!(results[0].actual.contains("250.0ms"));
        assert!(results[1].actual.contains("5.00%"));
    }
}
