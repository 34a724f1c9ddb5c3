//! Metrics and scoring
//!
//! Turns a run's violations into a [`MetricsSnapshot`]:
//!
//! - **Coupling index**: sum over connascence findings of
//!   `severity weight x type weight x locality multiplier x violation weight`
//! - **Coupling score**: `1 - index / (index + total_lines / 10)`
//! - **Compliance score**: `1 - sum(severity multiplier) / opportunities`
//! - **Duplication score**: `1 - duplicated_lines / total_lines`
//! - **Quality**: weighted mean of the three, with extra weight on the worst
//!   and on any dimension below 0.5
//!
//! Snapshots are kept in a bounded [`MetricsHistory`] used for trend
//! detection and baseline comparison.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::MetricsPolicy;
use crate::violation::{Category, Severity, Violation};

const BASE_WEIGHTS: [f64; 3] = [0.4, 0.3, 0.3];
const WORST_BOOST: f64 = 0.2;
const LOW_SCORE_BOOST: f64 = 0.1;
const LOW_SCORE: f64 = 0.5;
const LINES_PER_UNIT: f64 = 10.0;

/// Coupling index over the connascence category
pub fn coupling_index(violations: &[Violation]) -> f64 {
    violations
        .iter()
        .filter(|v| v.category() == Category::Connascence)
        .map(|v| {
            v.severity().weight() * v.kind().type_weight() * v.locality().multiplier() * v.weight()
        })
        .sum()
}

pub fn coupling_score(index: f64, total_lines: usize) -> f64 {
    let scale = total_lines as f64 / LINES_PER_UNIT;
    if index <= 0.0 {
        return 1.0;
    }
    (1.0 - index / (index + scale)).clamp(0.0, 1.0)
}

pub fn compliance_score(violations: &[Violation], opportunities: usize) -> f64 {
    let penalty: f64 = violations
        .iter()
        .filter(|v| v.category() == Category::Compliance)
        .map(|v| v.severity().compliance_multiplier())
        .sum();
    (1.0 - penalty / opportunities.max(1) as f64).clamp(0.0, 1.0)
}

pub fn duplication_score(duplicated_lines: usize, total_lines: usize) -> f64 {
    if total_lines == 0 {
        return 1.0;
    }
    (1.0 - duplicated_lines as f64 / total_lines as f64).clamp(0.0, 1.0)
}

/// Normalized dimension weights used for one quality score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityWeights {
    pub coupling: f64,
    pub compliance: f64,
    pub duplication: f64,
}

/// Composite quality in [0, 1] and the weights that produced it
pub fn quality_score(coupling: f64, compliance: f64, duplication: f64) -> (f64, QualityWeights) {
    let scores = [coupling, compliance, duplication].map(|s| s.clamp(0.0, 1.0));
    let mut weights = BASE_WEIGHTS;

    let worst = scores
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    weights[worst] += WORST_BOOST;
    for (weight, score) in weights.iter_mut().zip(scores) {
        if score < LOW_SCORE {
            *weight += LOW_SCORE_BOOST;
        }
    }

    let total: f64 = weights.iter().sum();
    let weights = weights.map(|w| w / total);
    let quality = weights.iter().zip(scores).map(|(w, s)| w * s).sum::<f64>();

    (
        quality.clamp(0.0, 1.0),
        QualityWeights {
            coupling: weights[0],
            compliance: weights[1],
            duplication: weights[2],
        },
    )
}

/// Letter grade for a quality score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthGrade {
    A,
    B,
    C,
    D,
    F,
}

impl HealthGrade {
    pub fn from_quality(quality: f64) -> Self {
        match quality {
            q if q >= 0.9 => HealthGrade::A,
            q if q >= 0.8 => HealthGrade::B,
            q if q >= 0.7 => HealthGrade::C,
            q if q >= 0.6 => HealthGrade::D,
            _ => HealthGrade::F,
        }
    }
}

impl fmt::Display for HealthGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthGrade::A => write!(f, "A (Excellent)"),
            HealthGrade::B => write!(f, "B (Good)"),
            HealthGrade::C => write!(f, "C (Acceptable)"),
            HealthGrade::D => write!(f, "D (Needs Improvement)"),
            HealthGrade::F => write!(f, "F (Critical Issues)"),
        }
    }
}

/// Run-level inputs the scores need besides the violations
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunTotals {
    pub files_analyzed: usize,
    pub total_lines: usize,
    pub opportunities: usize,
    pub duplicated_lines: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub severity_counts: BTreeMap<Severity, usize>,
    pub category_counts: BTreeMap<Category, usize>,
    pub total_violations: usize,
    pub coupling_index: f64,
    pub coupling_score: f64,
    pub compliance_score: f64,
    pub duplication_score: f64,
    pub quality_score: f64,
    pub quality_weights: QualityWeights,
    pub grade: HealthGrade,
    pub files_analyzed: usize,
    pub total_lines: usize,
}

impl MetricsSnapshot {
    pub fn compute(violations: &[Violation], totals: RunTotals, timestamp: DateTime<Utc>) -> Self {
        let mut severity_counts: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|&s| (s, 0)).collect();
        let mut category_counts: BTreeMap<Category, usize> = [
            Category::Connascence,
            Category::Compliance,
            Category::Duplication,
        ]
        .into_iter()
        .map(|c| (c, 0))
        .collect();
        for v in violations {
            *severity_counts.entry(v.severity()).or_default() += 1;
            *category_counts.entry(v.category()).or_default() += 1;
        }

        let index = coupling_index(violations);
        let coupling = coupling_score(index, totals.total_lines);
        let compliance = compliance_score(violations, totals.opportunities);
        let duplication = duplication_score(totals.duplicated_lines, totals.total_lines);
        let (quality, weights) = quality_score(coupling, compliance, duplication);

        Self {
            timestamp,
            severity_counts,
            category_counts,
            total_violations: violations.len(),
            coupling_index: index,
            coupling_score: coupling,
            compliance_score: compliance,
            duplication_score: duplication,
            quality_score: quality,
            quality_weights: weights,
            grade: HealthGrade::from_quality(quality),
            files_analyzed: totals.files_analyzed,
            total_lines: totals.total_lines,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.severity_counts.get(&severity).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Improving,
    Stable,
    Degrading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLabel {
    ExcellentProgress,
    Stable,
    NeedsAttention,
    Mixed,
    InsufficientData,
    NoData,
}

impl fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrendLabel::ExcellentProgress => "excellent_progress",
            TrendLabel::Stable => "stable",
            TrendLabel::NeedsAttention => "needs_attention",
            TrendLabel::Mixed => "mixed",
            TrendLabel::InsufficientData => "insufficient_data",
            TrendLabel::NoData => "no_data",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub label: TrendLabel,
    pub quality_direction: Direction,
    pub violation_direction: Direction,
    /// Mean quality of the recent window minus mean of the earlier snapshots
    pub quality_change: f64,
    pub violation_change: f64,
    pub recent_snapshots: usize,
    pub total_snapshots: usize,
}

impl TrendReport {
    fn without_data(label: TrendLabel, total: usize) -> Self {
        Self {
            label,
            quality_direction: Direction::Stable,
            violation_direction: Direction::Stable,
            quality_change: 0.0,
            violation_change: 0.0,
            recent_snapshots: total,
            total_snapshots: total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineStatus {
    SignificantlyImproved,
    Improved,
    Stable,
    Degraded,
    SignificantlyDegraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineComparison {
    pub quality_delta: f64,
    pub violation_delta: i64,
    pub compliance_delta: f64,
    pub duplication_delta: f64,
    pub status: BaselineStatus,
}

impl BaselineComparison {
    pub fn compare(current: &MetricsSnapshot, baseline: &MetricsSnapshot, policy: &MetricsPolicy) -> Self {
        let quality_delta = current.quality_score - baseline.quality_score;
        let status = match quality_delta {
            d if d > policy.baseline_significant => BaselineStatus::SignificantlyImproved,
            d if d > policy.baseline_minor => BaselineStatus::Improved,
            d if d > -policy.baseline_minor => BaselineStatus::Stable,
            d if d > -policy.baseline_significant => BaselineStatus::Degraded,
            _ => BaselineStatus::SignificantlyDegraded,
        };
        Self {
            quality_delta,
            violation_delta: current.total_violations as i64 - baseline.total_violations as i64,
            compliance_delta: current.compliance_score - baseline.compliance_score,
            duplication_delta: current.duplication_score - baseline.duplication_score,
            status,
        }
    }
}

/// Bounded ring of snapshots, oldest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsHistory {
    snapshots: VecDeque<MetricsSnapshot>,
    capacity: usize,
}

impl MetricsHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, snapshot: MetricsSnapshot) {
        while self.snapshots.len() >= self.capacity.max(1) {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn latest(&self) -> Option<&MetricsSnapshot> {
        self.snapshots.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricsSnapshot> {
        self.snapshots.iter()
    }

    /// Compare the recent window against the snapshots before it
    pub fn trend(&self, policy: &MetricsPolicy) -> TrendReport {
        let total = self.snapshots.len();
        match total {
            0 => return TrendReport::without_data(TrendLabel::NoData, 0),
            1 => return TrendReport::without_data(TrendLabel::InsufficientData, 1),
            _ => {}
        }

        let window = policy.trend_window.max(1);
        let split = if total > window { total - window } else { total - 1 };
        let (earlier, recent): (Vec<_>, Vec<_>) = self
            .snapshots
            .iter()
            .enumerate()
            .partition(|(i, _)| *i < split);

        let mean = |items: &[(usize, &MetricsSnapshot)], f: fn(&MetricsSnapshot) -> f64| {
            items.iter().map(|(_, s)| f(s)).sum::<f64>() / items.len().max(1) as f64
        };
        let quality_change = mean(&recent, |s| s.quality_score) - mean(&earlier, |s| s.quality_score);
        let violation_change = mean(&recent, |s| s.total_violations as f64)
            - mean(&earlier, |s| s.total_violations as f64);

        let quality_direction = match quality_change {
            d if d > policy.quality_trend_threshold => Direction::Improving,
            d if d < -policy.quality_trend_threshold => Direction::Degrading,
            _ => Direction::Stable,
        };
        let violation_direction = match violation_change {
            d if d < -policy.violation_trend_threshold => Direction::Improving,
            d if d > policy.violation_trend_threshold => Direction::Degrading,
            _ => Direction::Stable,
        };

        let label = match (quality_direction, violation_direction) {
            (Direction::Improving, Direction::Improving) => TrendLabel::ExcellentProgress,
            (Direction::Stable, Direction::Stable) => TrendLabel::Stable,
            (Direction::Degrading, _) | (_, Direction::Degrading) => TrendLabel::NeedsAttention,
            _ => TrendLabel::Mixed,
        };

        TrendReport {
            label,
            quality_direction,
            violation_direction,
            quality_change,
            violation_change,
            recent_snapshots: recent.len(),
            total_snapshots: total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violation::{ComplianceRule, ConnascenceType, Locality, ViolationKind};

    fn violation(kind: ViolationKind, severity: Severity, locality: Locality) -> Violation {
        Violation::builder(kind, "src/a.rs")
            .at(1, 1)
            .severity(severity)
            .locality(locality)
            .description("x")
            .build()
            .unwrap()
    }

    fn snapshot(quality: f64, violations: usize) -> MetricsSnapshot {
        let mut s = MetricsSnapshot::compute(&[], RunTotals::default(), Utc::now());
        s.quality_score = quality;
        s.total_violations = violations;
        s
    }

    #[test]
    fn test_coupling_index_formula() {
        let vs = vec![
            violation(
                ViolationKind::Connascence(ConnascenceType::Position),
                Severity::High,
                Locality::SameClass,
            ),
            violation(
                ViolationKind::Compliance(ComplianceRule::new(4).unwrap()),
                Severity::High,
                Locality::SameFunction,
            ),
        ];
        // 5 (high) x 1.6 (position) x 1.5 (same class) x 1.0
        assert!((coupling_index(&vs) - 12.0).abs() < 1e-9);
        assert!((coupling_score(12.0, 120) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_compliance_and_duplication_scores() {
        let vs = vec![violation(
            ViolationKind::Compliance(ComplianceRule::new(1).unwrap()),
            Severity::Critical,
            Locality::SameFunction,
        )];
        assert!((compliance_score(&vs, 20) - 0.9).abs() < 1e-9);
        assert_eq!(compliance_score(&vs, 0), 0.0);
        assert_eq!(duplication_score(25, 100), 0.75);
        assert_eq!(duplication_score(200, 100), 0.0);
        assert_eq!(duplication_score(0, 0), 1.0);
    }

    #[test]
    fn test_quality_weights_favor_worst_dimension() {
        let (quality, weights) = quality_score(1.0, 1.0, 1.0);
        assert!((quality - 1.0).abs() < 1e-9);
        let sum = weights.coupling + weights.compliance + weights.duplication;
        assert!((sum - 1.0).abs() < 1e-9);

        // Compliance is worst and below 0.5: 0.3 + 0.2 + 0.1 = 0.6 before normalizing
        let (quality, weights) = quality_score(0.9, 0.2, 0.8);
        assert!((weights.compliance - 0.6 / 1.3).abs() < 1e-9);
        assert!(quality < (0.9 + 0.2 + 0.8) / 3.0);
    }

    #[test]
    fn test_snapshot_counts() {
        let vs = vec![
            violation(
                ViolationKind::Connascence(ConnascenceType::Meaning),
                Severity::Low,
                Locality::SameFunction,
            ),
            violation(
                ViolationKind::Connascence(ConnascenceType::Meaning),
                Severity::Low,
                Locality::SameFunction,
            ),
        ];
        let totals = RunTotals {
            files_analyzed: 1,
            total_lines: 100,
            opportunities: 10,
            duplicated_lines: 0,
        };
        let s = MetricsSnapshot::compute(&vs, totals, Utc::now());
        assert_eq!(s.count(Severity::Low), 2);
        assert_eq!(s.count(Severity::Critical), 0);
        assert_eq!(s.category_counts[&Category::Connascence], 2);
        assert_eq!(s.compliance_score, 1.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = MetricsHistory::new(3);
        for i in 0..5 {
            history.push(snapshot(i as f64 / 10.0, i));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().next().unwrap().total_violations, 2);
    }

    #[test]
    fn test_trend_labels() {
        let policy = MetricsPolicy::default();
        let mut history = MetricsHistory::new(20);
        assert_eq!(history.trend(&policy).label, TrendLabel::NoData);
        history.push(snapshot(0.5, 40));
        assert_eq!(history.trend(&policy).label, TrendLabel::InsufficientData);

        history.push(snapshot(0.7, 20));
        let trend = history.trend(&policy);
        assert_eq!(trend.label, TrendLabel::ExcellentProgress);
        assert_eq!(trend.recent_snapshots, 1);

        let mut flat = MetricsHistory::new(20);
        for _ in 0..8 {
            flat.push(snapshot(0.8, 10));
        }
        assert_eq!(flat.trend(&policy).label, TrendLabel::Stable);

        let mut worse = MetricsHistory::new(20);
        for i in 0..8 {
            worse.push(snapshot(0.9 - i as f64 * 0.05, 10));
        }
        let trend = worse.trend(&policy);
        assert_eq!(trend.label, TrendLabel::NeedsAttention);
        assert_eq!(trend.recent_snapshots, 5);

        let mut mixed = MetricsHistory::new(20);
        mixed.push(snapshot(0.5, 10));
        mixed.push(snapshot(0.8, 12));
        assert_eq!(mixed.trend(&policy).label, TrendLabel::Mixed);
    }

    #[test]
    fn test_baseline_status() {
        let policy = MetricsPolicy::default();
        let base = snapshot(0.6, 10);
        let cases = [
            (0.75, BaselineStatus::SignificantlyImproved),
            (0.65, BaselineStatus::Improved),
            (0.61, BaselineStatus::Stable),
            (0.55, BaselineStatus::Degraded),
            (0.4, BaselineStatus::SignificantlyDegraded),
        ];
        for (quality, expected) in cases {
            let cmp = BaselineComparison::compare(&snapshot(quality, 7), &base, &policy);
            assert_eq!(cmp.status, expected, "quality {}", quality);
            assert_eq!(cmp.violation_delta, -3);
        }
    }

    #[test]
    fn test_health_grade() {
        assert_eq!(HealthGrade::from_quality(0.95), HealthGrade::A);
        assert_eq!(HealthGrade::from_quality(0.65), HealthGrade::D);
        assert_eq!(HealthGrade::from_quality(0.1), HealthGrade::F);
    }
}
