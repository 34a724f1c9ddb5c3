//! Connascence of Algorithm: identical function bodies within one file

use std::collections::BTreeMap;

use super::{Detector, DetectorError, Findings};
use crate::source::AnalysisContext;
use crate::syntax::FunctionInfo;
use crate::violation::{ConnascenceType, Evidence, Locality, Severity, Violation, ViolationKind};

/// Groups same-file functions by structural digest
#[derive(Debug, Clone, Copy, Default)]
pub struct AlgorithmDetector;

impl Detector for AlgorithmDetector {
    fn name(&self) -> &'static str {
        "algorithm"
    }

    fn detect(&self, ctx: &AnalysisContext<'_>, out: &mut Findings) -> Result<(), DetectorError> {
        let min_lines = ctx.policy().duplication.min_lines;

        let mut by_digest: BTreeMap<&str, Vec<&FunctionInfo>> = BTreeMap::new();
        for function in &ctx.index().functions {
            if function.line_count() >= min_lines {
                by_digest
                    .entry(function.signature.digest.as_str())
                    .or_default()
                    .push(function);
            }
        }

        for (digest, group) in by_digest {
            if group.len() < 2 {
                continue;
            }
            for function in &group {
                let peers: Vec<String> = group
                    .iter()
                    .filter(|other| other.node != function.node)
                    .map(|other| format!("{} (line {})", other.qualified_name, other.line))
                    .collect();

                out.push(
                    Violation::builder(
                        ViolationKind::Connascence(ConnascenceType::Algorithm),
                        ctx.path(),
                    )
                    .at(function.line, function.column)
                    .severity(Severity::Medium)
                    .locality(Locality::SameClass)
                    .weight(1.0 + 0.5 * peers.len() as f64)
                    .description(format!(
                        "Function '{}' duplicates the algorithm of {}",
                        function.qualified_name,
                        peers.join(", ")
                    ))
                    .recommendation(
                        "Extract the shared algorithm into one function and call it from each site",
                    )
                    .evidence(Evidence::Signature {
                        digest: digest[..16].to_string(),
                        peers,
                    }),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::testing::run_default;

    #[test]
    fn test_same_file_duplicates() {
        let code = r#"
fn sum_even(xs: &[i64]) -> i64 {
    let mut total = 0;
    for x in xs {
        if x % 2 == 0 { total += x; }
    }
    total
}

fn sum_odd(values: &[i64]) -> i64 {
    let mut acc = 0;
    for v in values {
        if v % 2 == 0 { acc += v; }
    }
    acc
}

fn short(a: i64) -> i64 { a }
"#;
        let result = run_default(&AlgorithmDetector, code);
        assert_eq!(result.violations.len(), 2);
        assert!(result.violations[0].description().contains("sum_odd"));
        assert!(result.violations[1].description().contains("sum_even"));
    }

    #[test]
    fn test_short_functions_ignored() {
        let code = "fn a(x: u8) -> u8 { x + 1 }\nfn b(y: u8) -> u8 { y + 1 }\n";
        let result = run_default(&AlgorithmDetector, code);
        assert!(result.violations.is_empty());
    }
}
