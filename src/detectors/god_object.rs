//! God objects: types with too many members

use super::{Detector, DetectorError, Findings};
use crate::source::AnalysisContext;
use crate::violation::{AnomalyKind, Evidence, Locality, Severity, Violation, ViolationKind};

/// Counts fields, variants and methods (over every impl block) per type
#[derive(Debug, Clone, Copy, Default)]
pub struct GodObjectDetector;

pub fn god_object_severity(excess: usize) -> Severity {
    match excess {
        e if e >= 20 => Severity::Critical,
        e if e >= 10 => Severity::High,
        e if e >= 5 => Severity::Medium,
        _ => Severity::Low,
    }
}

impl Detector for GodObjectDetector {
    fn name(&self) -> &'static str {
        "god_object"
    }

    fn detect(&self, ctx: &AnalysisContext<'_>, out: &mut Findings) -> Result<(), DetectorError> {
        let threshold = ctx.policy().thresholds.god_object_members;

        for info in &ctx.index().types {
            let count = info.member_count();
            if count <= threshold {
                continue;
            }
            let excess = count - threshold;

            out.push(
                Violation::builder(
                    ViolationKind::StructuralAnomaly(AnomalyKind::GodObject),
                    ctx.path(),
                )
                .at(info.line, info.column)
                .severity(god_object_severity(excess))
                .locality(Locality::SameClass)
                .weight(1.0 + excess as f64 / 10.0)
                .description(format!(
                    "Type '{}' has {} members ({} fields, {} variants, {} methods; threshold {})",
                    info.name,
                    count,
                    info.fields.len(),
                    info.variants.len(),
                    info.methods.len(),
                    threshold
                ))
                .recommendation(
                    "Split the type along its responsibilities and move related members together",
                )
                .evidence(Evidence::Members {
                    type_name: info.name.clone(),
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
    use crate::detectors::testing::run_on;

    fn type_with(fields: usize, methods: usize) -> String {
        let fields: String = (0..fields).map(|i| format!("f{}: u8,", i)).collect();
        let methods: String = (0..methods)
            .map(|i| format!("fn m{}(&self) {{}}\n", i))
            .collect();
        format!("struct Big {{ {} }}\nimpl Big {{\n{}}}\n", fields, methods)
    }

    #[test]
    fn test_members_over_threshold() {
        let mut policy = Policy::default();
        policy.thresholds.god_object_members = 10;
        let result = run_on(&GodObjectDetector, &type_with(6, 10), &policy);
        assert_eq!(result.violations.len(), 1);
        let v = &result.violations[0];
        assert_eq!(v.severity(), Severity::Medium);
        assert_eq!(v.line(), 1);
        assert_eq!(
            v.evidence(),
            &Evidence::Members {
                type_name: "Big".to_string(),
                count: 16,
                threshold: 10
            }
        );
    }

    #[test]
    fn test_at_threshold_is_fine() {
        let result = run_on(&GodObjectDetector, &type_with(10, 10), &Policy::default());
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_severity_scale() {
        assert_eq!(god_object_severity(4), Severity::Low);
        assert_eq!(god_object_severity(10), Severity::High);
        assert_eq!(god_object_severity(25), Severity::Critical);
    }
}
