//! Connascence of Meaning: repeated magic literals

use std::collections::{BTreeMap, BTreeSet};

use super::{Detector, DetectorError, Findings};
use crate::source::AnalysisContext;
use crate::syntax::{LitKind, NodeId, NodeKind, SyntaxTree};
use crate::violation::{ConnascenceType, Evidence, Locality, Severity, Violation, ViolationKind};

/// Counts non-trivial literals across the file and flags the repeated ones
#[derive(Debug, Clone, Copy, Default)]
pub struct MeaningDetector;

struct Occurrences {
    first: NodeId,
    count: usize,
    compared: bool,
    functions: BTreeSet<Option<NodeId>>,
}

impl Detector for MeaningDetector {
    fn name(&self) -> &'static str {
        "meaning"
    }

    fn detect(&self, ctx: &AnalysisContext<'_>, out: &mut Findings) -> Result<(), DetectorError> {
        let tree = ctx.tree();
        let thresholds = &ctx.policy().thresholds;
        let excluded: BTreeSet<&str> = thresholds
            .excluded_literals
            .iter()
            .map(String::as_str)
            .collect();

        // Keyed by (kind, text) so 42 and "42" stay distinct
        let mut seen: BTreeMap<(&'static str, &str), Occurrences> = BTreeMap::new();
        for (id, node) in tree.iter() {
            let NodeKind::Lit { kind, text } = &node.kind else {
                continue;
            };
            if !is_magic(*kind, text, &excluded) || tree.inside_const_item(id) {
                continue;
            }
            let entry = seen.entry((kind.as_str(), text)).or_insert(Occurrences {
                first: id,
                count: 0,
                compared: false,
                functions: BTreeSet::new(),
            });
            entry.count += 1;
            entry.compared |= in_comparison(tree, id);
            entry.functions.insert(tree.enclosing_function(id));
        }

        for ((kind, text), occ) in seen {
            if occ.count < thresholds.magic_literal_repeats {
                continue;
            }
            let literal = if kind == "str" {
                format!("\"{}\"", text)
            } else {
                text.to_string()
            };
            let span = tree.span(occ.first);
            let locality = if occ.functions.len() == 1 {
                Locality::SameFunction
            } else {
                Locality::SameClass
            };
            let severity = if occ.compared {
                Severity::Medium
            } else {
                Severity::Low
            };

            out.push(
                Violation::builder(
                    ViolationKind::Connascence(ConnascenceType::Meaning),
                    ctx.path(),
                )
                .at(span.line, span.column)
                .severity(severity)
                .locality(locality)
                .weight(0.5 + 0.25 * occ.count as f64)
                .description(format!(
                    "Magic literal {} appears {} times",
                    literal, occ.count
                ))
                .recommendation(format!(
                    "Replace {} with a named constant so every use shares one definition",
                    literal
                ))
                .evidence(Evidence::Literal {
                    literal,
                    occurrences: occ.count,
                }),
            );
        }
        Ok(())
    }
}

fn is_magic(kind: LitKind, text: &str, excluded: &BTreeSet<&str>) -> bool {
    match kind {
        LitKind::Int | LitKind::Float => !excluded.contains(text),
        LitKind::Str => {
            text.chars().count() > 2
                && !text.contains('{')
                && !excluded.contains(text)
        }
        LitKind::Char | LitKind::Bool | LitKind::Other => false,
    }
}

fn in_comparison(tree: &SyntaxTree, id: NodeId) -> bool {
    match tree.parent(id).map(|p| tree.kind(p)) {
        Some(NodeKind::Binary { op }) => {
            matches!(op.as_str(), "==" | "!=" | "<" | "<=" | ">" | ">=")
        }
        Some(NodeKind::Match) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::testing::run_default;

    #[test]
    fn test_literal_repeated_five_times() {
        let code = r#"
fn price(q: u32) -> u32 {
    let base = q * 42;
    let extra = 42 + base;
    if extra > 42 { return 42; }
    extra / 42
}
"#;
        let result = run_default(&MeaningDetector, code);
        assert_eq!(result.violations.len(), 1);
        let v = &result.violations[0];
        assert_eq!(
            v.evidence(),
            &Evidence::Literal {
                literal: "42".to_string(),
                occurrences: 5
            }
        );
        assert_eq!(v.line(), 3);
        assert_eq!(v.weight(), 0.5 + 0.25 * 5.0);
        assert_eq!(v.severity(), Severity::Medium);
        assert_eq!(v.locality(), Locality::SameFunction);
    }

    #[test]
    fn test_exclusions() {
        let code = r#"
const LIMIT: u32 = 77;
static NAME: &str = "some value";
fn f() {
    let a = [0, 0, 0, 1, 1, 1, -1, -1, -1, 2, 2, 2];
    let codes = [404, 404, 404, 500, 500, 500];
    let s = ["ab", "ab", "ab"];
    println!("{}", 9);
    println!("{}", 9);
    let t = (true, true, true);
}
fn g() -> u32 { 77 }
"#;
        let result = run_default(&MeaningDetector, code);
        assert!(result.violations.is_empty(), "{:?}", result.violations);
    }

    #[test]
    fn test_repeated_word_strings_are_magic() {
        let code = r#"
fn a(env: &str) -> bool { env == "production" }
fn b(env: &str) -> bool { env == "production" }
fn c(env: &str) -> bool { env != "production" }
fn d(env: &str) -> bool { env == "production" }
fn e() -> [&'static str; 3] { ["key", "key", "key"] }
"#;
        let result = run_default(&MeaningDetector, code);
        assert_eq!(result.violations.len(), 2, "{:?}", result.violations);
        assert!(result.violations.iter().any(|v| matches!(
            v.evidence(),
            Evidence::Literal { literal, occurrences: 4 } if literal == "\"production\""
        )));
        assert!(result.violations.iter().any(|v| v.description().contains("key")));
    }

    #[test]
    fn test_literals_in_macros_count() {
        let code = r#"
fn f() {
    assert_eq!(timeout(), 3600);
    log(3600);
    let t = vec![3600, 1];
}
fn g() { h("timed out after limit"); h("timed out after limit"); h("timed out after limit"); }
"#;
        let result = run_default(&MeaningDetector, code);
        assert_eq!(result.violations.len(), 2);
        assert!(result.violations.iter().any(|v| v.description().contains("3600")));
        assert!(
            result
                .violations
                .iter()
                .any(|v| v.description().contains("\"timed out after limit\""))
        );
    }
}
