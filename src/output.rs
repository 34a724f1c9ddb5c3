//! Machine-readable output and the scan verdict
//!
//! - JSON: the [`AnalysisReport`] as pretty-printed serde output
//! - SARIF 2.1.0: one result per violation, rules deduplicated by rule id
//! - [`ScanVerdict`]: the exit-code decision a CI caller needs, computed from
//!   the report alone

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Value, json};

use crate::report::{AnalysisReport, write_markdown};
use crate::violation::{Severity, Violation};

pub const SARIF_SCHEMA: &str = "https://json.schemastore.org/sarif-2.1.0.json";
const TOOL_NAME: &str = "connascence";
const INFORMATION_URI: &str = "https://github.com/nwiizo/connascence";
const MARKDOWN_TOP_N: usize = 10;

/// Process exit codes
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const BLOCKING: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const INVALID_ARGS: i32 = 3;
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Sarif,
    Markdown,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "sarif" => Ok(OutputFormat::Sarif),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!(
                "unknown format '{}' (expected json, sarif or markdown)",
                other
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Sarif => write!(f, "sarif"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// Render a report in the requested format
pub fn write_report<W: Write>(
    report: &AnalysisReport,
    format: OutputFormat,
    writer: &mut W,
) -> io::Result<()> {
    match format {
        OutputFormat::Json => write_json(report, writer),
        OutputFormat::Sarif => write_sarif(report, writer),
        OutputFormat::Markdown => write_markdown(report, MARKDOWN_TOP_N, writer),
    }
}

pub fn write_json<W: Write>(report: &AnalysisReport, writer: &mut W) -> io::Result<()> {
    let json = report.to_json().map_err(io::Error::other)?;
    writeln!(writer, "{}", json)?;
    Ok(())
}

pub fn write_sarif<W: Write>(report: &AnalysisReport, writer: &mut W) -> io::Result<()> {
    let json = serde_json::to_string_pretty(&sarif(report)).map_err(io::Error::other)?;
    writeln!(writer, "{}", json)?;
    Ok(())
}

/// SARIF level for a severity
pub fn sarif_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::High => "error",
        Severity::Medium => "warning",
        Severity::Low | Severity::Info => "note",
    }
}

/// Build the SARIF 2.1.0 log for a report
pub fn sarif(report: &AnalysisReport) -> Value {
    let mut rules: BTreeMap<&str, Value> = BTreeMap::new();
    for v in report.all_violations() {
        rules.entry(v.rule_id()).or_insert_with(|| sarif_rule(v));
    }
    let results: Vec<Value> = report.all_violations().map(sarif_result).collect();

    json!({
        "$schema": SARIF_SCHEMA,
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": TOOL_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                    "informationUri": INFORMATION_URI,
                    "rules": rules.into_values().collect::<Vec<_>>(),
                }
            },
            "results": results,
            "invocations": [{
                "executionSuccessful": !report.metadata.is_degraded(),
                "startTimeUtc": report.metadata.started_at.to_rfc3339(),
            }],
        }]
    })
}

fn sarif_rule(v: &Violation) -> Value {
    let description = match v.kind().connascence_type() {
        Some(t) => t.description().to_string(),
        None => v.kind().to_string(),
    };
    json!({
        "id": v.rule_id(),
        "name": v.kind().to_string(),
        "shortDescription": { "text": v.kind().to_string() },
        "fullDescription": { "text": description },
        "defaultConfiguration": { "level": sarif_level(v.severity()) },
    })
}

fn sarif_result(v: &Violation) -> Value {
    let uri = v.file().to_string_lossy().replace('\\', "/");
    let mut result = json!({
        "ruleId": v.rule_id(),
        "level": sarif_level(v.severity()),
        "message": { "text": v.description() },
        "locations": [{
            "physicalLocation": {
                "artifactLocation": { "uri": uri },
                "region": {
                    "startLine": v.line(),
                    "startColumn": v.column(),
                }
            }
        }],
        "partialFingerprints": { "connascence/v1": v.id() },
        "properties": {
            "severity": v.severity().as_str(),
            "weight": v.weight(),
        },
    });
    if let Some(cluster) = v.cluster() {
        result["properties"]["cluster"] = json!(cluster);
    }
    if !v.recommendation().is_empty() {
        result["properties"]["recommendation"] = json!(v.recommendation());
    }
    result
}

/// Pass/fail decision for one scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanVerdict {
    pub passed: bool,
    pub exit_code: i32,
    pub fail_on: Severity,
    pub blocking: usize,
    pub failures: Vec<String>,
}

impl ScanVerdict {
    /// Blocking when any violation is at or above `fail_on` or a budget is exceeded
    pub fn evaluate(report: &AnalysisReport, fail_on: Severity) -> Self {
        let blocking = report.count_at_least(fail_on);
        let mut failures = Vec::new();

        if blocking > 0 {
            failures.push(format!(
                "{} violation(s) at {} severity or higher",
                blocking, fail_on
            ));
        }
        for budget in report.exceeded_budgets() {
            failures.push(format!(
                "budget '{}' exceeded: {} (max {})",
                budget.key, budget.count, budget.limit
            ));
        }

        let passed = failures.is_empty();
        Self {
            passed,
            exit_code: if passed {
                exit_code::SUCCESS
            } else {
                exit_code::BLOCKING
            },
            fail_on,
            blocking,
            failures,
        }
    }
}

impl fmt::Display for ScanVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed {
            return write!(f, "✅ PASSED");
        }
        writeln!(f, "❌ FAILED")?;
        for failure in &self.failures {
            writeln!(f, "  - {}", failure)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::orchestrate;
    use crate::config::Policy;
    use crate::detectors::DetectorRegistry;
    use std::fs;
    use tempfile::TempDir;

    fn scan(code: &str, policy: &Policy) -> AnalysisReport {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("lib.rs"), code).unwrap();
        orchestrate(
            &[dir.path().to_path_buf()],
            policy,
            DetectorRegistry::standard(policy),
        )
        .unwrap()
    }

    const WIDE: &str =
        "pub fn wide(a: u8, b: u16, c: u32, d: u64, e: i8, f: i16, g: i32, h: i64) {}\n";

    #[test]
    fn test_sarif_shape() {
        let report = scan(WIDE, &Policy::default());
        let log = sarif(&report);
        assert_eq!(log["version"], "2.1.0");
        let results = log["runs"][0]["results"].as_array().unwrap();
        assert!(!results.is_empty());

        let position = results
            .iter()
            .find(|r| r["ruleId"] == "CONNASCENCE_POSITION")
            .unwrap();
        assert_eq!(position["level"], "error");
        assert_eq!(
            position["locations"][0]["physicalLocation"]["region"]["startLine"],
            1
        );

        let rules = log["runs"][0]["tool"]["driver"]["rules"].as_array().unwrap();
        let mut ids: Vec<_> = rules.iter().map(|r| r["id"].as_str().unwrap()).collect();
        let before = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn test_levels() {
        assert_eq!(sarif_level(Severity::Critical), "error");
        assert_eq!(sarif_level(Severity::Medium), "warning");
        assert_eq!(sarif_level(Severity::Info), "note");
    }

    #[test]
    fn test_verdict_blocks_on_severity() {
        let mut policy = Policy::default();
        policy.budgets.clear();
        let report = scan(WIDE, &policy);

        let verdict = ScanVerdict::evaluate(&report, Severity::High);
        assert!(!verdict.passed);
        assert_eq!(verdict.exit_code, exit_code::BLOCKING);

        let clean = scan("pub fn ok(a: u8) -> u8 { a }\n", &policy);
        let verdict = ScanVerdict::evaluate(&clean, Severity::High);
        assert!(verdict.passed, "{}", verdict);
        assert_eq!(verdict.exit_code, exit_code::SUCCESS);
    }

    #[test]
    fn test_verdict_blocks_on_budget() {
        let mut policy = Policy::default();
        policy.budgets.clear();
        policy.budgets.insert("position".to_string(), 0);
        let report = scan(WIDE, &policy);

        let verdict = ScanVerdict::evaluate(&report, Severity::Critical);
        assert!(verdict.failures.iter().any(|f| f.contains("budget 'position'")));
        assert_eq!(verdict.exit_code, exit_code::BLOCKING);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("SARIF".parse::<OutputFormat>(), Ok(OutputFormat::Sarif));
        assert_eq!("md".parse::<OutputFormat>(), Ok(OutputFormat::Markdown));
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
