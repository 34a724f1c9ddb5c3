//! Connascence of Position: long positional parameter lists

use super::{Detector, DetectorError, Findings};
use crate::source::AnalysisContext;
use crate::violation::{ConnascenceType, Evidence, Locality, Severity, Violation, ViolationKind};

/// Flags functions whose non-`self` parameter count exceeds the threshold
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionDetector;

/// Severity for a given excess over the threshold
pub fn position_severity(excess: usize) -> Severity {
    match excess {
        e if e >= 6 => Severity::Critical,
        e if e >= 4 => Severity::High,
        e if e >= 2 => Severity::Medium,
        _ => Severity::Low,
    }
}

impl Detector for PositionDetector {
    fn name(&self) -> &'static str {
        "position"
    }

    fn detect(&self, ctx: &AnalysisContext<'_>, out: &mut Findings) -> Result<(), DetectorError> {
        let threshold = ctx.policy().thresholds.max_positional_params;

        for function in &ctx.index().functions {
            let count = function.params.len();
            if count <= threshold {
                continue;
            }
            let excess = count - threshold;

            out.push(
                Violation::builder(
                    ViolationKind::Connascence(ConnascenceType::Position),
                    ctx.path(),
                )
                .at(function.line, function.column)
                .severity(position_severity(excess))
                .locality(Locality::SameFunction)
                .weight(1.0 + 0.5 * excess as f64)
                .description(format!(
                    "Function '{}' takes {} positional parameters (threshold {})",
                    function.qualified_name, count, threshold
                ))
                .recommendation(
                    "Group related parameters into a struct, or use a builder so callers name each value",
                )
                .evidence(Evidence::Parameters {
                    function: function.qualified_name.clone(),
                    count,
                    threshold,
                }),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Policy;
    use crate::detectors::testing::{run_default, run_on};

    #[test]
    fn test_six_params_over_three() {
        let result = run_default(
            &PositionDetector,
            "fn connect(host: &str, port: u16, user: &str, pass: &str, db: &str, tls: bool) {}",
        );
        assert_eq!(result.violations.len(), 1);
        let v = &result.violations[0];
        assert_eq!(v.severity(), Severity::Medium);
        assert_eq!(v.weight(), 2.5);
        assert_eq!(
            v.evidence(),
            &Evidence::Parameters {
                function: "connect".to_string(),
                count: 6,
                threshold: 3
            }
        );
    }

    #[test]
    fn test_self_is_not_positional() {
        let result = run_default(
            &PositionDetector,
            "struct S; impl S { fn m(&self, a: u8, b: u8, c: u8) {} }",
        );
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_threshold_from_policy() {
        let policy = Policy::preset("strict").unwrap();
        let result = run_on(&PositionDetector, "fn f(a: u8, b: u8, c: u8) {}", &policy);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].severity(), Severity::Low);
    }

    #[test]
    fn test_severity_scale() {
        assert_eq!(position_severity(1), Severity::Low);
        assert_eq!(position_severity(2), Severity::Medium);
        assert_eq!(position_severity(4), Severity::High);
        assert_eq!(position_severity(9), Severity::Critical);
    }
}
