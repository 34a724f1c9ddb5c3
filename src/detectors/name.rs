//! Connascence of Name and Type
//!
//! Name: string literals that spell out identifiers defined in the same file.
//! Type: boundaries whose parameter types carry no contract.

use std::collections::BTreeMap;

use super::{Detector, DetectorError, Findings};
use crate::source::AnalysisContext;
use crate::syntax::{LitKind, NodeKind};
use crate::violation::{ConnascenceType, Evidence, Locality, Severity, Violation, ViolationKind};

const MIN_NAME_LEN: usize = 4;

const PRIMITIVES: [&str; 18] = [
    "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128", "usize",
    "f32", "f64", "bool", "char", "str", "String",
];

const PRIMITIVE_OBSESSION: usize = 3;

/// Reflection-style references to defined names
#[derive(Debug, Clone, Copy, Default)]
pub struct NameDetector;

impl Detector for NameDetector {
    fn name(&self) -> &'static str {
        "name"
    }

    fn detect(&self, ctx: &AnalysisContext<'_>, out: &mut Findings) -> Result<(), DetectorError> {
        let defined = &ctx.index().defined_names;

        for (_, node) in ctx.tree().iter() {
            let NodeKind::Lit {
                kind: LitKind::Str,
                text,
            } = &node.kind
            else {
                continue;
            };
            if text.len() < MIN_NAME_LEN || !defined.contains(text) {
                continue;
            }
            out.push(
                Violation::builder(ViolationKind::Connascence(ConnascenceType::Name), ctx.path())
                    .at(node.span.line, node.span.column)
                    .severity(Severity::Low)
                    .locality(Locality::SameClass)
                    .weight(1.0)
                    .description(format!(
                        "String \"{}\" refers to a name defined in this file; renaming breaks it silently",
                        text
                    ))
                    .recommendation("Refer to the item directly, or derive the string from it")
                    .evidence(Evidence::Pattern {
                        pattern: text.clone(),
                    }),
            );
        }
        Ok(())
    }
}

/// `&mut serde_json::Value` -> `Value`
fn bare_type(ty: &str) -> &str {
    let ty = ty.trim_start_matches('&').trim_start_matches("mut ");
    match ty.find('<') {
        Some(open) => {
            let head = &ty[..open];
            let start = head.rfind("::").map(|i| i + 2).unwrap_or(0);
            &ty[start..]
        }
        None => ty.rsplit("::").next().unwrap_or(ty),
    }
}

fn is_weak_contract(ty: &str) -> bool {
    let bare = bare_type(ty);
    ty.contains("dyn Any")
        || bare == "Value"
        || bare.replace(' ', "") == "HashMap<String,String>"
}

/// Weakly typed public boundaries and primitive obsession
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeDetector;

impl Detector for TypeDetector {
    fn name(&self) -> &'static str {
        "type"
    }

    fn detect(&self, ctx: &AnalysisContext<'_>, out: &mut Findings) -> Result<(), DetectorError> {
        let kind = ViolationKind::Connascence(ConnascenceType::Type);

        for function in &ctx.index().functions {
            if function.is_pub {
                for param in function.params.iter().filter(|p| is_weak_contract(&p.ty)) {
                    out.push(
                        Violation::builder(kind, ctx.path())
                            .at(function.line, function.column)
                            .severity(Severity::Medium)
                            .locality(Locality::SameFunction)
                            .weight(1.5)
                            .description(format!(
                                "Public function '{}' takes '{}: {}', which leaves its contract to runtime checks",
                                function.qualified_name, param.name, param.ty
                            ))
                            .recommendation("Accept a dedicated type that states what the caller must provide")
                            .evidence(Evidence::Pattern {
                                pattern: param.ty.clone(),
                            }),
                    );
                }
            }

            let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
            for param in &function.params {
                let bare = bare_type(&param.ty);
                if PRIMITIVES.contains(&bare) {
                    *by_type.entry(bare).or_default() += 1;
                }
            }
            let Some((ty, count)) = by_type
                .into_iter()
                .filter(|(_, count)| *count >= PRIMITIVE_OBSESSION)
                .max_by_key(|(_, count)| *count)
            else {
                continue;
            };
            out.push(
                Violation::builder(kind, ctx.path())
                    .at(function.line, function.column)
                    .severity(Severity::Low)
                    .locality(Locality::SameFunction)
                    .weight(1.0)
                    .description(format!(
                        "Function '{}' takes {} parameters of type {}; callers can swap them unnoticed",
                        function.qualified_name, count, ty
                    ))
                    .recommendation("Wrap the values in newtypes or a parameter struct")
                    .evidence(Evidence::Pattern {
                        pattern: format!("{} x {}", count, ty),
                    }),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::testing::run_default;

    #[test]
    fn test_string_names_of_defined_items() {
        let code = r#"
struct Account { balance: u64 }
fn lookup(field: &str) -> bool {
    field == "balance" || field == "Account" || field == "id" || field == "missing"
}
"#;
        let result = run_default(&NameDetector, code);
        assert_eq!(result.violations.len(), 2);
        assert!(result.violations.iter().all(|v| v.severity() == Severity::Low));
    }

    #[test]
    fn test_weak_contracts_on_public_functions() {
        let code = r#"
pub fn handle(payload: &serde_json::Value, extra: &dyn Any) {}
pub fn settings(map: HashMap<String, String>) {}
fn private(payload: Value) {}
pub fn typed(config: &Config) {}
"#;
        let result = run_default(&TypeDetector, code);
        assert_eq!(result.violations.len(), 3);
        assert!(result.violations.iter().all(|v| v.severity() == Severity::Medium));
    }

    #[test]
    fn test_primitive_obsession() {
        let code = r#"
fn rect(x: u32, y: u32, w: u32, label: &str) {}
fn pair(a: u32, b: u32) {}
"#;
        let result = run_default(&TypeDetector, code);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].severity(), Severity::Low);
        assert!(result.violations[0].description().contains("3 parameters of type u32"));
    }

    #[test]
    fn test_bare_type() {
        assert_eq!(bare_type("&mut serde_json::Value"), "Value");
        assert_eq!(bare_type("std::collections::HashMap<String, String>"), "HashMap<String, String>");
        assert_eq!(bare_type("&str"), "str");
    }
}
