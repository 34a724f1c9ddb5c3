//! # connascence - Coupling Analysis Engine
//!
//! A multi-pass static-analysis engine for Rust sources. It detects
//! connascence (coupling) defects, cross-file duplicate logic and
//! Power-of-Ten style safety-rule violations, and turns them into a
//! deterministic report with a composite quality score and a historical trend.
//!
//! ## Pipeline
//!
//! 1. **Discover and parse**: files are filtered and parsed through a
//!    content-addressed [`CacheManager`]
//! 2. **Detector sweep**: every [`Detector`] in the [`DetectorRegistry`] runs
//!    over every file, in parallel
//! 3. **Duplication clustering**: function fragments are clustered across
//!    files
//! 4. **Correlation**: findings are tagged with their cluster and filtered
//!    by waivers and severity floors
//! 5. **Report assembly**: metrics, trend and baseline comparison
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::PathBuf;
//! use connascence::{DetectorRegistry, Policy, orchestrate};
//!
//! let policy = Policy::default();
//! let report = orchestrate(
//!     &[PathBuf::from("./src")],
//!     &policy,
//!     DetectorRegistry::standard(&policy),
//! )?;
//! println!("quality: {:.2}", report.metrics.quality_score);
//! # Ok::<(), connascence::ConfigError>(())
//! ```

pub mod cache;
pub mod compliance;
pub mod config;
pub mod detectors;
pub mod duplication;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod output;
pub mod report;
pub mod source;
pub mod syntax;
pub mod telemetry;
pub mod violation;

pub use cache::{CacheEntry, CacheFault, CacheManager, CacheStats, FileHistory, PriorityFactors};
pub use compliance::ComplianceDetector;
pub use config::{
    AnalysisPolicy, CachePolicy, CompliancePolicy, ConfigError, DuplicationPolicy, FileFilter,
    MetricsPolicy, Policy, Thresholds, load_policy, load_policy_file,
};
pub use detectors::{
    Detector, DetectorError, DetectorRegistry, DetectorResult, DetectorStatus, Findings,
    run_detector,
};
pub use duplication::{
    ClusterError, DuplicationCluster, Fragment, MeceReport, cluster_fragments, verify_mece,
};
pub use error::{AuditIssue, IssueKind};
pub use metrics::{
    BaselineComparison, BaselineStatus, HealthGrade, MetricsHistory, MetricsSnapshot, TrendLabel,
    TrendReport,
};
pub use orchestrator::{MemoryProbe, Orchestrator, discover_files, orchestrate};
pub use output::{OutputFormat, ScanVerdict, exit_code, sarif, write_report};
pub use report::{
    AnalysisReport, Phase, PhaseRecord, PhaseStatus, ReportMetadata, RunState,
    ViolationsByCategory, write_markdown,
};
pub use source::{AnalysisContext, ParseError, SourceUnit};
pub use syntax::{StructuralSignature, SyntaxTree};
pub use violation::{
    AnomalyKind, Category, ComplianceRule, ConnascenceType, Evidence, Locality, Severity,
    Violation, ViolationBuilder, ViolationError, ViolationKind,
};
