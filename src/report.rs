//! Analysis report and Markdown rendering
//!
//! [`AnalysisReport`] is the single output of a run: violations partitioned
//! by category, duplication clusters, the metrics snapshot with its trend and
//! baseline comparison, and metadata describing how the run went (phase audit
//! trail, run-state history, file counts).

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheStats;
use crate::duplication::DuplicationCluster;
use crate::error::AuditIssue;
use crate::metrics::{BaselineComparison, HealthGrade, MetricsSnapshot, TrendLabel, TrendReport};
use crate::violation::{Category, Severity, Violation};

/// The five orchestrator phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    DiscoverAndParse,
    DetectorSweep,
    DuplicationClustering,
    Correlation,
    ReportAssembly,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::DiscoverAndParse,
        Phase::DetectorSweep,
        Phase::DuplicationClustering,
        Phase::Correlation,
        Phase::ReportAssembly,
    ];

    /// 1-based phase number
    pub fn number(&self) -> u8 {
        match self {
            Phase::DiscoverAndParse => 1,
            Phase::DetectorSweep => 2,
            Phase::DuplicationClustering => 3,
            Phase::Correlation => 4,
            Phase::ReportAssembly => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::DiscoverAndParse => "discover_and_parse",
            Phase::DetectorSweep => "detector_sweep",
            Phase::DuplicationClustering => "duplication_clustering",
            Phase::Correlation => "correlation",
            Phase::ReportAssembly => "report_assembly",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Ok,
    /// Finished, but some files or detectors were lost
    Degraded,
    /// The phase body errored or panicked; its output was discarded
    Failed,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Ok => write!(f, "ok"),
            PhaseStatus::Degraded => write!(f, "degraded"),
            PhaseStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: PhaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub issues: Vec<AuditIssue>,
}

/// Run-state machine: `Pending -> Running(p) -> [Degraded(p)] -> ... -> Completed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "phase", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running(Phase),
    Degraded(Phase),
    Completed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViolationsByCategory {
    pub connascence: Vec<Violation>,
    pub compliance: Vec<Violation>,
    pub duplication: Vec<Violation>,
}

impl ViolationsByCategory {
    /// Split by category; each list is sorted by file, position, rule and id
    pub fn partition(violations: Vec<Violation>) -> Self {
        let mut out = Self::default();
        for v in violations {
            match v.category() {
                Category::Connascence => out.connascence.push(v),
                Category::Compliance => out.compliance.push(v),
                Category::Duplication => out.duplication.push(v),
            }
        }
        for list in [&mut out.connascence, &mut out.compliance, &mut out.duplication] {
            list.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.connascence
            .iter()
            .chain(&self.compliance)
            .chain(&self.duplication)
    }

    pub fn len(&self) -> usize {
        self.connascence.len() + self.compliance.len() + self.duplication.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Usage of one configured violation budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetUsage {
    pub key: String,
    pub limit: usize,
    pub count: usize,
}

impl BudgetUsage {
    pub fn exceeded(&self) -> bool {
        self.count > self.limit
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
    pub audit_trail: Vec<PhaseRecord>,
    pub run_states: Vec<RunState>,
    pub started_at: DateTime<Utc>,
    pub files_analyzed: usize,
    pub files_failed: usize,
    /// Files never started because the hard memory ceiling was reached
    pub files_skipped: usize,
    pub waived: usize,
    pub policy: String,
    pub cache: CacheStats,
}

impl ReportMetadata {
    /// Whether any phase was degraded or failed
    pub fn is_degraded(&self) -> bool {
        self.audit_trail
            .iter()
            .any(|r| r.status != PhaseStatus::Ok)
    }

    pub fn issues(&self) -> impl Iterator<Item = &AuditIssue> {
        self.audit_trail.iter().flat_map(|r| r.issues.iter())
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseRecord> {
        self.audit_trail.iter().find(|r| r.phase == phase)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub violations: ViolationsByCategory,
    pub clusters: Vec<DuplicationCluster>,
    pub metrics: MetricsSnapshot,
    pub trend: TrendReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<BaselineComparison>,
    pub budgets: Vec<BudgetUsage>,
    pub metadata: ReportMetadata,
}

impl AnalysisReport {
    pub fn all_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter()
    }

    pub fn total_violations(&self) -> usize {
        self.violations.len()
    }

    /// Violations at or above `severity`
    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.all_violations()
            .filter(|v| v.severity() >= severity)
            .count()
    }

    pub fn exceeded_budgets(&self) -> impl Iterator<Item = &BudgetUsage> {
        self.budgets.iter().filter(|b| b.exceeded())
    }

    /// Heaviest violations first; ties keep report order
    pub fn top_violations(&self, n: usize) -> Vec<&Violation> {
        let mut ranked: Vec<&Violation> = self.all_violations().collect();
        ranked.sort_by(|a, b| {
            let impact = |v: &Violation| v.weight() * v.severity().weight();
            impact(b)
                .total_cmp(&impact(a))
                .then_with(|| a.sort_key().cmp(&b.sort_key()))
        });
        ranked.truncate(n);
        ranked
    }

    /// Counts per connascence type and compliance rule, keyed by rule id
    pub fn counts_by_rule(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for v in self.all_violations() {
            *counts.entry(v.rule_id()).or_insert(0) += 1;
        }
        counts
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Write the human summary
pub fn write_markdown<W: Write>(report: &AnalysisReport, top_n: usize, writer: &mut W) -> io::Result<()> {
    writeln!(writer, "# Connascence Analysis Report\n")?;

    write_summary(report, writer)?;
    write_severity_table(report, writer)?;
    write_top_violations(report, top_n, writer)?;
    write_top_clusters(report, top_n, writer)?;
    write_phase_table(report, writer)?;

    Ok(())
}

fn write_summary<W: Write>(report: &AnalysisReport, writer: &mut W) -> io::Result<()> {
    let metrics = &report.metrics;
    let grade_emoji = match metrics.grade {
        HealthGrade::A | HealthGrade::B => "🟢",
        HealthGrade::C => "🟡",
        HealthGrade::D => "🟠",
        HealthGrade::F => "🔴",
    };

    writeln!(writer, "## Summary\n")?;
    writeln!(
        writer,
        "**Quality Score**: {} {:.2}/1.00 ({})\n",
        grade_emoji, metrics.quality_score, metrics.grade
    )?;

    writeln!(writer, "| Metric | Value |")?;
    writeln!(writer, "|--------|-------|")?;
    writeln!(writer, "| Files Analyzed | {} |", report.metadata.files_analyzed)?;
    writeln!(writer, "| Files Failed | {} |", report.metadata.files_failed)?;
    writeln!(writer, "| Total Lines | {} |", metrics.total_lines)?;
    writeln!(writer, "| Violations | {} |", report.total_violations())?;
    writeln!(writer, "| Waived | {} |", report.metadata.waived)?;
    writeln!(writer, "| Coupling Index | {:.1} |", metrics.coupling_index)?;
    writeln!(writer, "| Coupling Score | {:.2} |", metrics.coupling_score)?;
    writeln!(writer, "| Compliance Score | {:.2} |", metrics.compliance_score)?;
    writeln!(writer, "| Duplication Score | {:.2} |", metrics.duplication_score)?;
    writeln!(writer)?;

    writeln!(writer, "**Trend**: {}\n", trend_line(&report.trend))?;
    if let Some(baseline) = &report.baseline {
        writeln!(
            writer,
            "**Baseline**: {:?} (quality {:+.3}, violations {:+})\n",
            baseline.status, baseline.quality_delta, baseline.violation_delta
        )?;
    }

    let exceeded: Vec<_> = report.exceeded_budgets().collect();
    if !exceeded.is_empty() {
        writeln!(writer, "**⚠️ Budgets exceeded**\n")?;
        for budget in exceeded {
            writeln!(writer, "- `{}`: {} (max {})", budget.key, budget.count, budget.limit)?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn trend_line(trend: &TrendReport) -> String {
    match trend.label {
        TrendLabel::NoData | TrendLabel::InsufficientData => {
            format!("{} ({} snapshot(s))", trend.label, trend.total_snapshots)
        }
        _ => format!(
            "{} (quality {:+.3}, violations {:+.1} over the last {} run(s))",
            trend.label, trend.quality_change, trend.violation_change, trend.recent_snapshots
        ),
    }
}

fn write_severity_table<W: Write>(report: &AnalysisReport, writer: &mut W) -> io::Result<()> {
    writeln!(writer, "## Violations by Severity\n")?;
    writeln!(writer, "| Severity | Connascence | Compliance | Duplication | Total |")?;
    writeln!(writer, "|----------|-------------|------------|-------------|-------|")?;

    let count = |list: &[Violation], severity: Severity| {
        list.iter().filter(|v| v.severity() == severity).count()
    };
    for severity in Severity::ALL {
        let c = count(&report.violations.connascence, severity);
        let r = count(&report.violations.compliance, severity);
        let d = count(&report.violations.duplication, severity);
        writeln!(
            writer,
            "| {} | {} | {} | {} | {} |",
            severity,
            c,
            r,
            d,
            c + r + d
        )?;
    }
    writeln!(writer)?;
    Ok(())
}

fn write_top_violations<W: Write>(
    report: &AnalysisReport,
    top_n: usize,
    writer: &mut W,
) -> io::Result<()> {
    let top = report.top_violations(top_n);
    if top.is_empty() {
        writeln!(writer, "**✅ No violations found.**\n")?;
        return Ok(());
    }

    writeln!(writer, "## Top Violations\n")?;
    for (i, v) in top.iter().enumerate() {
        let severity_icon = match v.severity() {
            Severity::Critical => "🔴",
            Severity::High => "🟠",
            Severity::Medium => "🟡",
            Severity::Low | Severity::Info => "⚪",
        };
        writeln!(
            writer,
            "**{}. {} {}** `{}:{}`\n",
            i + 1,
            severity_icon,
            v.kind(),
            v.file().display(),
            v.line()
        )?;
        writeln!(writer, "- **Issue**: {}", v.description())?;
        if !v.recommendation().is_empty() {
            writeln!(writer, "- **Action**: {}", v.recommendation())?;
        }
        if let Some(cluster) = v.cluster() {
            writeln!(writer, "- **Cluster**: `{}`", cluster)?;
        }
        writeln!(writer, "- **Weight**: {:.2}\n", v.weight())?;
    }
    Ok(())
}

fn write_top_clusters<W: Write>(
    report: &AnalysisReport,
    top_n: usize,
    writer: &mut W,
) -> io::Result<()> {
    if report.clusters.is_empty() {
        return Ok(());
    }

    writeln!(writer, "## Duplication Clusters\n")?;
    writeln!(writer, "| Cluster | Members | Lines | Similarity | Representative |")?;
    writeln!(writer, "|---------|---------|-------|------------|----------------|")?;
    for cluster in report.clusters.iter().take(top_n) {
        writeln!(
            writer,
            "| `{}` | {} | {} | {:.0}% | `{}` |",
            cluster.id,
            cluster.member_count,
            cluster.total_duplicated_lines,
            cluster.similarity * 100.0,
            truncate_label(&cluster.representative.label(), 50)
        )?;
    }
    if report.clusters.len() > top_n {
        writeln!(writer, "\n*...and {} more*", report.clusters.len() - top_n)?;
    }
    writeln!(writer)?;
    Ok(())
}

fn write_phase_table<W: Write>(report: &AnalysisReport, writer: &mut W) -> io::Result<()> {
    writeln!(writer, "## Run\n")?;
    writeln!(writer, "| Phase | Status | Duration | Issues |")?;
    writeln!(writer, "|-------|--------|----------|--------|")?;
    for record in &report.metadata.audit_trail {
        let millis = (record.ended_at - record.started_at).num_milliseconds();
        writeln!(
            writer,
            "| {}. {} | {} | {} ms | {} |",
            record.phase.number(),
            record.phase,
            record.status,
            millis,
            record.issues.len()
        )?;
    }
    writeln!(writer)?;

    let issues: Vec<_> = report.metadata.issues().collect();
    if !issues.is_empty() {
        writeln!(writer, "### Issues\n")?;
        for issue in issues.iter().take(20) {
            writeln!(writer, "- {}", issue)?;
        }
        if issues.len() > 20 {
            writeln!(writer, "- ...and {} more", issues.len() - 20)?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Shorten a long label, keeping its tail
fn truncate_label(label: &str, max_len: usize) -> String {
    let chars: Vec<char> = label.chars().collect();
    if chars.len() <= max_len {
        label.to_string()
    } else {
        let tail: String = chars[chars.len() - (max_len - 3)..].iter().collect();
        format!("...{}", tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricsHistory, RunTotals};
    use crate::violation::{ComplianceRule, ConnascenceType, ViolationKind};
    use crate::config::MetricsPolicy;

    fn violation(kind: ViolationKind, file: &str, line: usize, severity: Severity, weight: f64) -> Violation {
        Violation::builder(kind, file)
            .at(line, 1)
            .severity(severity)
            .weight(weight)
            .description(format!("{} at {}", kind, line))
            .recommendation("fix it")
            .build()
            .unwrap()
    }

    fn report(violations: Vec<Violation>) -> AnalysisReport {
        let now = Utc::now();
        let totals = RunTotals {
            files_analyzed: 2,
            total_lines: 200,
            opportunities: 20,
            duplicated_lines: 0,
        };
        let metrics = MetricsSnapshot::compute(&violations, totals, now);
        AnalysisReport {
            violations: ViolationsByCategory::partition(violations),
            clusters: Vec::new(),
            metrics,
            trend: MetricsHistory::new(20).trend(&MetricsPolicy::default()),
            baseline: None,
            budgets: vec![BudgetUsage {
                key: "total".to_string(),
                limit: 1,
                count: 3,
            }],
            metadata: ReportMetadata {
                audit_trail: vec![PhaseRecord {
                    phase: Phase::DiscoverAndParse,
                    started_at: now,
                    ended_at: now,
                    status: PhaseStatus::Ok,
                    error: None,
                    issues: Vec::new(),
                }],
                run_states: vec![RunState::Pending, RunState::Completed],
                started_at: now,
                files_analyzed: 2,
                files_failed: 0,
                files_skipped: 0,
                waived: 0,
                policy: "standard".to_string(),
                cache: CacheStats::default(),
            },
        }
    }

    fn sample() -> Vec<Violation> {
        let position = ViolationKind::Connascence(ConnascenceType::Position);
        let rule4 = ViolationKind::Compliance(ComplianceRule::new(4).unwrap());
        vec![
            violation(position, "src/b.rs", 9, Severity::Low, 1.0),
            violation(rule4, "src/a.rs", 3, Severity::High, 1.5),
            violation(position, "src/a.rs", 20, Severity::Critical, 2.5),
        ]
    }

    #[test]
    fn test_partition_sorts_each_category() {
        let by_category = ViolationsByCategory::partition(sample());
        assert_eq!(by_category.connascence.len(), 2);
        assert_eq!(by_category.compliance.len(), 1);
        assert!(by_category.duplication.is_empty());
        assert_eq!(by_category.connascence[0].file().to_str(), Some("src/a.rs"));
        assert_eq!(by_category.len(), 3);
    }

    #[test]
    fn test_top_violations_by_weight() {
        let report = report(sample());
        let top = report.top_violations(2);
        assert_eq!(top[0].line(), 20);
        assert_eq!(top[1].line(), 3);
        assert_eq!(report.count_at_least(Severity::High), 2);
        assert_eq!(report.counts_by_rule()["CONNASCENCE_POSITION"], 2);
    }

    #[test]
    fn test_json_field_order() {
        let json = report(sample()).to_json().unwrap();
        let positions: Vec<usize> = ["\"violations\"", "\"clusters\"", "\"metrics\"", "\"trend\"", "\"metadata\""]
            .iter()
            .map(|key| json.find(key).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(json.contains("\"audit_trail\""));
        assert!(json.contains("\"state\": \"pending\""));
    }

    #[test]
    fn test_markdown_sections() {
        let mut out = Vec::new();
        write_markdown(&report(sample()), 5, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("# Connascence Analysis Report"));
        assert!(text.contains("| Critical | 1 | 0 | 0 | 1 |"));
        assert!(text.contains("## Top Violations"));
        assert!(text.contains("**Trend**: no_data"));
        assert!(text.contains("Budgets exceeded"));
        assert!(text.contains("discover_and_parse"));
    }

    #[test]
    fn test_truncate_label() {
        assert_eq!(truncate_label("short", 10), "short");
        assert_eq!(truncate_label("src/very/long/path.rs:10", 10), "...h.rs:10");
    }
}
