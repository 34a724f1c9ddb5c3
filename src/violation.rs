//! Violation model shared by every detector
//!
//! A [`Violation`] is a tagged union over the nine connascence types, the ten
//! compliance rules and the structural anomalies. All violations are built
//! through [`ViolationBuilder`], which validates the invariants (positive
//! weight, 1-based line) and derives the stable fingerprint id.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Issue severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational only
    Info,
    /// Minor issue, consider addressing
    Low,
    /// Should be addressed in regular maintenance
    Medium,
    /// Needs attention soon, potential source of bugs
    High,
    /// Must be fixed, actively causing problems
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// Weight used by the coupling index
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Critical => 10.0,
            Severity::High => 5.0,
            Severity::Medium => 2.0,
            Severity::Low => 1.0,
            Severity::Info => 0.5,
        }
    }

    /// Penalty multiplier used by the compliance score
    pub fn compliance_multiplier(&self) -> f64 {
        match self {
            Severity::Critical => 2.0,
            Severity::High => 1.5,
            Severity::Medium => 1.0,
            Severity::Low => 0.5,
            Severity::Info => 0.2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Parse a severity name (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }

    /// Lower of the two severities
    pub fn cap(self, ceiling: Severity) -> Severity {
        self.min(ceiling)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "Critical"),
            Severity::High => write!(f, "High"),
            Severity::Medium => write!(f, "Medium"),
            Severity::Low => write!(f, "Low"),
            Severity::Info => write!(f, "Info"),
        }
    }
}

/// The nine forms of connascence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnascenceType {
    Name,
    Type,
    Meaning,
    Position,
    Algorithm,
    Execution,
    Timing,
    Value,
    Identity,
}

impl ConnascenceType {
    pub const ALL: [ConnascenceType; 9] = [
        ConnascenceType::Name,
        ConnascenceType::Type,
        ConnascenceType::Meaning,
        ConnascenceType::Position,
        ConnascenceType::Algorithm,
        ConnascenceType::Execution,
        ConnascenceType::Timing,
        ConnascenceType::Value,
        ConnascenceType::Identity,
    ];

    /// Conventional abbreviation (CoN, CoT, ...)
    pub fn abbreviation(&self) -> &'static str {
        match self {
            ConnascenceType::Name => "CoN",
            ConnascenceType::Type => "CoT",
            ConnascenceType::Meaning => "CoM",
            ConnascenceType::Position => "CoP",
            ConnascenceType::Algorithm => "CoA",
            ConnascenceType::Execution => "CoE",
            ConnascenceType::Timing => "CoTi",
            ConnascenceType::Value => "CoV",
            ConnascenceType::Identity => "CoI",
        }
    }

    /// Type-specific weight used by the coupling index
    pub fn weight(&self) -> f64 {
        match self {
            ConnascenceType::Execution => 2.0,
            ConnascenceType::Timing => 1.8,
            ConnascenceType::Position => 1.6,
            ConnascenceType::Identity => 1.4,
            ConnascenceType::Algorithm => 1.2,
            ConnascenceType::Name => 1.0,
            ConnascenceType::Type => 1.0,
            ConnascenceType::Value => 1.0,
            ConnascenceType::Meaning => 0.8,
        }
    }

    /// Upper-case identifier used in rule ids
    pub fn id(&self) -> &'static str {
        match self {
            ConnascenceType::Name => "NAME",
            ConnascenceType::Type => "TYPE",
            ConnascenceType::Meaning => "MEANING",
            ConnascenceType::Position => "POSITION",
            ConnascenceType::Algorithm => "ALGORITHM",
            ConnascenceType::Execution => "EXECUTION",
            ConnascenceType::Timing => "TIMING",
            ConnascenceType::Value => "VALUE",
            ConnascenceType::Identity => "IDENTITY",
        }
    }

    /// Parse a type from its name, id or abbreviation
    pub fn parse(s: &str) -> Option<Self> {
        let needle = s.trim();
        Self::ALL.into_iter().find(|t| {
            t.id().eq_ignore_ascii_case(needle)
                || t.abbreviation().eq_ignore_ascii_case(needle)
                || format!("{}", t).eq_ignore_ascii_case(needle)
        })
    }

    /// What this form of coupling means
    pub fn description(&self) -> &'static str {
        match self {
            ConnascenceType::Name => {
                "Components must agree on the name of an entity. Hard-coded name references break silently on rename."
            }
            ConnascenceType::Type => {
                "Components must agree on the type of an entity. Weak or implicit contracts push that agreement to runtime."
            }
            ConnascenceType::Meaning => {
                "Components must agree on the meaning of particular values. Repeated magic literals hide that agreement."
            }
            ConnascenceType::Position => {
                "Components must agree on the order of values. Long positional parameter lists are easy to call wrongly."
            }
            ConnascenceType::Algorithm => {
                "Components must agree on a particular algorithm. Duplicated logic must change in lock-step."
            }
            ConnascenceType::Execution => {
                "The order of execution of components matters. Manually paired setup and teardown calls are fragile."
            }
            ConnascenceType::Timing => {
                "The timing of execution matters. Sleep-based synchronization encodes timing assumptions."
            }
            ConnascenceType::Value => {
                "Several values must change together. Shared mutable state couples every reader and writer."
            }
            ConnascenceType::Identity => {
                "Components must reference the same entity. Identity comparisons break when values are copied."
            }
        }
    }
}

impl fmt::Display for ConnascenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnascenceType::Name => write!(f, "Name"),
            ConnascenceType::Type => write!(f, "Type"),
            ConnascenceType::Meaning => write!(f, "Meaning"),
            ConnascenceType::Position => write!(f, "Position"),
            ConnascenceType::Algorithm => write!(f, "Algorithm"),
            ConnascenceType::Execution => write!(f, "Execution"),
            ConnascenceType::Timing => write!(f, "Timing"),
            ConnascenceType::Value => write!(f, "Value"),
            ConnascenceType::Identity => write!(f, "Identity"),
        }
    }
}

/// A numbered safety rule (1..=10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ComplianceRule(u8);

impl ComplianceRule {
    pub const COUNT: u8 = 10;

    pub fn new(number: u8) -> Result<Self, ViolationError> {
        if (1..=Self::COUNT).contains(&number) {
            Ok(Self(number))
        } else {
            Err(ViolationError::UnknownRule(number))
        }
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    /// Every rule in order
    pub fn all() -> impl Iterator<Item = ComplianceRule> {
        (1..=Self::COUNT).map(ComplianceRule)
    }

    pub fn title(&self) -> &'static str {
        match self.0 {
            1 => "Simple control flow",
            2 => "Bounded loops",
            3 => "No allocation in hot loops",
            4 => "Short functions",
            5 => "Assertion density",
            6 => "Narrowest scope",
            7 => "Checked return values",
            8 => "Limited metaprogramming",
            9 => "Restricted pointers",
            _ => "Warnings not suppressed",
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self.0 {
            1 | 2 => Severity::Critical,
            3 | 4 | 7 | 9 => Severity::High,
            5 | 8 | 10 => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

impl TryFrom<u8> for ComplianceRule {
    type Error = ViolationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ComplianceRule::new(value)
    }
}

impl From<ComplianceRule> for u8 {
    fn from(rule: ComplianceRule) -> Self {
        rule.0
    }
}

impl fmt::Display for ComplianceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule {}", self.0)
    }
}

/// Structural findings that are not one of the nine connascence forms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// A type with too many members
    GodObject,
    /// A cross-file cluster of structurally duplicated fragments
    DuplicateCluster,
}

/// Report category a violation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Connascence,
    Compliance,
    Duplication,
}

impl Category {
    pub fn id(&self) -> &'static str {
        match self {
            Category::Connascence => "CONNASCENCE",
            Category::Compliance => "COMPLIANCE",
            Category::Duplication => "DUPLICATION",
        }
    }
}

/// What kind of defect a violation reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "family", content = "type", rename_all = "snake_case")]
pub enum ViolationKind {
    Connascence(ConnascenceType),
    Compliance(ComplianceRule),
    StructuralAnomaly(AnomalyKind),
}

impl ViolationKind {
    pub fn category(&self) -> Category {
        match self {
            ViolationKind::Connascence(_) => Category::Connascence,
            ViolationKind::Compliance(_) => Category::Compliance,
            ViolationKind::StructuralAnomaly(AnomalyKind::GodObject) => Category::Connascence,
            ViolationKind::StructuralAnomaly(AnomalyKind::DuplicateCluster) => {
                Category::Duplication
            }
        }
    }

    /// Stable `<CATEGORY>_<TYPE>` rule id
    pub fn rule_id(&self) -> String {
        let suffix = match self {
            ViolationKind::Connascence(t) => t.id().to_string(),
            ViolationKind::Compliance(rule) => format!("RULE_{}", rule.number()),
            ViolationKind::StructuralAnomaly(AnomalyKind::GodObject) => "GOD_OBJECT".to_string(),
            ViolationKind::StructuralAnomaly(AnomalyKind::DuplicateCluster) => {
                "CLUSTER".to_string()
            }
        };
        format!("{}_{}", self.category().id(), suffix)
    }

    /// Type-specific weight used by the coupling index
    pub fn type_weight(&self) -> f64 {
        match self {
            ViolationKind::Connascence(t) => t.weight(),
            ViolationKind::Compliance(_) => 1.0,
            ViolationKind::StructuralAnomaly(_) => 1.5,
        }
    }

    pub fn connascence_type(&self) -> Option<ConnascenceType> {
        match self {
            ViolationKind::Connascence(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::Connascence(t) => write!(f, "Connascence of {}", t),
            ViolationKind::Compliance(rule) => write!(f, "{} ({})", rule, rule.title()),
            ViolationKind::StructuralAnomaly(AnomalyKind::GodObject) => write!(f, "God Object"),
            ViolationKind::StructuralAnomaly(AnomalyKind::DuplicateCluster) => {
                write!(f, "Duplicate Cluster")
            }
        }
    }
}

/// How far apart the coupled elements are
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Locality {
    SameFunction,
    SameClass,
    CrossModule,
}

impl Locality {
    /// Coupling index multiplier (farther = stronger penalty)
    pub fn multiplier(&self) -> f64 {
        match self {
            Locality::SameFunction => 1.0,
            Locality::SameClass => 1.5,
            Locality::CrossModule => 2.0,
        }
    }
}

/// Kind-specific payload recorded by the detector that produced a violation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    None,
    Parameters {
        function: String,
        count: usize,
        threshold: usize,
    },
    Literal {
        literal: String,
        occurrences: usize,
    },
    Members {
        type_name: String,
        count: usize,
        threshold: usize,
    },
    Signature {
        digest: String,
        peers: Vec<String>,
    },
    Lines {
        function: String,
        count: usize,
        limit: usize,
    },
    Assertions {
        function: String,
        count: usize,
        required: usize,
    },
    Cluster {
        cluster_id: String,
        members: usize,
        total_lines: usize,
        similarity: f64,
    },
    Pattern {
        pattern: String,
    },
}

/// Errors raised when a violation fails validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViolationError {
    #[error("Violation weight must be finite and > 0, got {0}")]
    InvalidWeight(f64),

    #[error("Violation line must be 1-based, got {0}")]
    InvalidLine(usize),

    #[error("Violation description must not be empty")]
    EmptyDescription,

    #[error("Unknown compliance rule: {0}")]
    UnknownRule(u8),
}

/// A single detected defect. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    id: String,
    rule_id: String,
    kind: ViolationKind,
    severity: Severity,
    locality: Locality,
    file: PathBuf,
    line: usize,
    column: usize,
    weight: f64,
    description: String,
    recommendation: String,
    evidence: Evidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster: Option<String>,
}

impl Violation {
    /// Start building a violation of the given kind in `file`
    pub fn builder(kind: ViolationKind, file: impl Into<PathBuf>) -> ViolationBuilder {
        ViolationBuilder {
            kind,
            file: file.into(),
            line: 1,
            column: 1,
            severity: Severity::Medium,
            locality: Locality::SameFunction,
            weight: 1.0,
            description: String::new(),
            recommendation: String::new(),
            evidence: Evidence::None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn locality(&self) -> Locality {
        self.locality
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn recommendation(&self) -> &str {
        &self.recommendation
    }

    pub fn evidence(&self) -> &Evidence {
        &self.evidence
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    /// A copy of this violation tagged with duplication-cluster membership.
    ///
    /// The fingerprint id is unchanged; cluster membership is correlation data.
    pub fn with_cluster(&self, cluster_id: &str) -> Violation {
        Violation {
            cluster: Some(cluster_id.to_string()),
            ..self.clone()
        }
    }

    /// Total ordering used to keep reports deterministic
    pub fn sort_key(&self) -> (&Path, usize, usize, &str, &str) {
        (&self.file, self.line, self.column, &self.rule_id, &self.id)
    }
}

/// Validating builder for [`Violation`]
#[derive(Debug, Clone)]
pub struct ViolationBuilder {
    kind: ViolationKind,
    file: PathBuf,
    line: usize,
    column: usize,
    severity: Severity,
    locality: Locality,
    weight: f64,
    description: String,
    recommendation: String,
    evidence: Evidence,
}

impl ViolationBuilder {
    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.line = line;
        self.column = column.max(1);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn locality(mut self, locality: Locality) -> Self {
        self.locality = locality;
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = recommendation.into();
        self
    }

    pub fn evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    pub fn current_severity(&self) -> Severity {
        self.severity
    }

    /// Validate and seal the violation
    pub fn build(self) -> Result<Violation, ViolationError> {
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(ViolationError::InvalidWeight(self.weight));
        }
        if self.line == 0 {
            return Err(ViolationError::InvalidLine(self.line));
        }
        if self.description.trim().is_empty() {
            return Err(ViolationError::EmptyDescription);
        }

        let rule_id = self.kind.rule_id();
        let id = fingerprint(&rule_id, &self.file, self.line, self.column, &self.description);

        Ok(Violation {
            id,
            rule_id,
            kind: self.kind,
            severity: self.severity,
            locality: self.locality,
            file: self.file,
            line: self.line,
            column: self.column,
            weight: self.weight,
            description: self.description,
            recommendation: self.recommendation,
            evidence: self.evidence,
            cluster: None,
        })
    }
}

fn fingerprint(rule_id: &str, file: &Path, line: usize, column: usize, description: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rule_id.as_bytes());
    hasher.update(b"|");
    hasher.update(file.to_string_lossy().as_bytes());
    hasher.update(b"|");
    hasher.update(line.to_le_bytes());
    hasher.update(column.to_le_bytes());
    hasher.update(description.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(file: &str) -> ViolationBuilder {
        Violation::builder(ViolationKind::Connascence(ConnascenceType::Position), file)
            .at(10, 5)
            .description("fn too many params")
    }

    #[test]
    fn test_builder_rejects_non_positive_weight() {
        let err = position("a.rs").weight(0.0).build().unwrap_err();
        assert_eq!(err, ViolationError::InvalidWeight(0.0));

        let err = position("a.rs").weight(f64::NAN).build().unwrap_err();
        assert!(matches!(err, ViolationError::InvalidWeight(_)));
    }

    #[test]
    fn test_builder_rejects_zero_line() {
        let err = position("a.rs").at(0, 1).build().unwrap_err();
        assert_eq!(err, ViolationError::InvalidLine(0));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = position("a.rs").build().unwrap();
        let b = position("a.rs").build().unwrap();
        let c = position("b.rs").build().unwrap();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(a.id().len(), 16);
    }

    #[test]
    fn test_rule_ids() {
        assert_eq!(
            ViolationKind::Connascence(ConnascenceType::Position).rule_id(),
            "CONNASCENCE_POSITION"
        );
        assert_eq!(
            ViolationKind::Compliance(ComplianceRule::new(4).unwrap()).rule_id(),
            "COMPLIANCE_RULE_4"
        );
        assert_eq!(
            ViolationKind::StructuralAnomaly(AnomalyKind::DuplicateCluster).rule_id(),
            "DUPLICATION_CLUSTER"
        );
    }

    #[test]
    fn test_compliance_rule_bounds() {
        assert!(ComplianceRule::new(0).is_err());
        assert!(ComplianceRule::new(11).is_err());
        assert_eq!(ComplianceRule::all().count(), 10);
    }

    #[test]
    fn test_with_cluster_keeps_id() {
        let v = position("a.rs").build().unwrap();
        let tagged = v.with_cluster("dup-1");
        assert_eq!(tagged.id(), v.id());
        assert_eq!(tagged.cluster(), Some("dup-1"));
        assert_eq!(v.cluster(), None);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(Severity::parse("HIGH"), Some(Severity::High));
        assert_eq!(ConnascenceType::parse("CoP"), Some(ConnascenceType::Position));
        assert_eq!(ConnascenceType::parse("meaning"), Some(ConnascenceType::Meaning));
        assert_eq!(ConnascenceType::parse("bogus"), None);
        assert!(Severity::Critical > Severity::Info);
    }
}
