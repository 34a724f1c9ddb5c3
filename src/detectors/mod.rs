//! Detector framework
//!
//! A [`Detector`] inspects one [`AnalysisContext`] and pushes violation
//! builders into [`Findings`]. [`run_detector`] wraps every call: it times the
//! detector, isolates panics, and turns the outcome into a [`DetectorResult`]
//! whose violations are in a deterministic order.
//!
//! Built-in detectors live in a flat [`DetectorRegistry`]; callers can
//! register their own alongside them.

mod algorithm;
mod execution;
mod god_object;
mod meaning;
mod name;
mod position;
mod value;

pub use algorithm::AlgorithmDetector;
pub use execution::{ExecutionDetector, TimingDetector};
pub use god_object::GodObjectDetector;
pub use meaning::MeaningDetector;
pub use name::{NameDetector, TypeDetector};
pub use position::PositionDetector;
pub use value::{IdentityDetector, ValueDetector};

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::compliance::ComplianceDetector;
use crate::config::Policy;
use crate::error::panic_message;
use crate::source::AnalysisContext;
use crate::violation::{Violation, ViolationBuilder, ViolationError};

/// Errors a detector may return for one file
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("{0}")]
    Failed(String),

    #[error("unsupported construct at line {line}: {what}")]
    Unsupported { line: usize, what: String },
}

/// Outcome status of one detector run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorStatus {
    Ok,
    /// Some violations were rejected by validation
    Partial,
    Failed,
}

/// Collected output of one detector
#[derive(Debug, Default)]
pub struct Findings {
    violations: Vec<Violation>,
    rejected: Vec<ViolationError>,
}

impl Findings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and record a violation; invalid ones are counted as rejected
    pub fn push(&mut self, builder: ViolationBuilder) {
        match builder.build() {
            Ok(v) => self.violations.push(v),
            Err(e) => self.rejected.push(e),
        }
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn rejected(&self) -> &[ViolationError] {
        &self.rejected
    }
}

/// Result of running one detector over one file
#[derive(Debug, Clone, Serialize)]
pub struct DetectorResult {
    pub detector_name: String,
    pub violations: Vec<Violation>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub status: DetectorStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// A per-file analysis pass
pub trait Detector: Send + Sync {
    /// Stable detector name used in results and the audit trail
    fn name(&self) -> &'static str;

    fn detect(&self, ctx: &AnalysisContext<'_>, out: &mut Findings) -> Result<(), DetectorError>;
}

/// Run one detector with timing and panic isolation
pub fn run_detector(detector: &dyn Detector, ctx: &AnalysisContext<'_>) -> DetectorResult {
    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut findings = Findings::new();
        detector.detect(ctx, &mut findings).map(|_| findings)
    }));
    let duration = start.elapsed();
    let detector_name = detector.name().to_string();

    match outcome {
        Ok(Ok(findings)) => {
            let Findings {
                mut violations,
                rejected,
            } = findings;
            sort_violations(&mut violations);
            let (status, error) = if rejected.is_empty() {
                (DetectorStatus::Ok, None)
            } else {
                let first = rejected
                    .first()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                (
                    DetectorStatus::Partial,
                    Some(format!("{} violation(s) rejected: {}", rejected.len(), first)),
                )
            };
            DetectorResult {
                detector_name,
                violations,
                duration,
                status,
                error,
            }
        }
        Ok(Err(e)) => DetectorResult {
            detector_name,
            violations: Vec::new(),
            duration,
            status: DetectorStatus::Failed,
            error: Some(e.to_string()),
        },
        Err(payload) => DetectorResult {
            detector_name,
            violations: Vec::new(),
            duration,
            status: DetectorStatus::Failed,
            error: Some(format!("panicked: {}", panic_message(payload.as_ref()))),
        },
    }
}

/// Deterministic per-file order: line, column, then fingerprint
pub fn sort_violations(violations: &mut [Violation]) {
    violations.sort_by(|a, b| {
        (a.line(), a.column(), a.id()).cmp(&(b.line(), b.column(), b.id()))
    });
}

/// Flat list of detectors run against every file
#[derive(Default)]
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in detector, plus the compliance checker when enabled
    pub fn standard(policy: &Policy) -> Self {
        let mut registry = Self::new();
        registry
            .register(PositionDetector)
            .register(MeaningDetector)
            .register(AlgorithmDetector)
            .register(GodObjectDetector)
            .register(ExecutionDetector)
            .register(TimingDetector)
            .register(ValueDetector)
            .register(IdentityDetector)
            .register(NameDetector)
            .register(TypeDetector);
        if policy.compliance.enabled {
            registry.register(ComplianceDetector);
        }
        registry
    }

    pub fn register(&mut self, detector: impl Detector + 'static) -> &mut Self {
        self.detectors.push(Box::new(detector));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Detector> {
        self.detectors.iter().map(|d| d.as_ref())
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }
}

impl std::fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorRegistry")
            .field("detectors", &self.names())
            .finish()
    }
}
