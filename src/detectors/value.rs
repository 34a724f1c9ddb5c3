//! Connascence of Value and Identity
//!
//! Value: shared mutable state several components must keep consistent.
//! Identity: code that depends on two handles pointing at the same object.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::{Detector, DetectorError, Findings};
use crate::source::AnalysisContext;
use crate::syntax::NodeKind;
use crate::violation::{ConnascenceType, Evidence, Locality, Severity, Violation, ViolationKind};

const INTERIOR_MUTABLE: [&str; 8] = [
    "Mutex", "RwLock", "RefCell", "Cell", "OnceCell", "OnceLock", "Lazy", "LazyLock",
];

const SHARED_INSTANCES: [&str; 3] = ["Rc<RefCell<", "Arc<Mutex<", "Arc<RwLock<"];

static PATH_PREFIX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\b\w+::").ok());

/// `std::sync::Arc<std::sync::Mutex<T>>` -> `Arc<Mutex<T>>`
fn strip_paths(ty: &str) -> String {
    match PATH_PREFIX.as_ref() {
        Some(re) => re.replace_all(ty, "").into_owned(),
        None => ty.to_string(),
    }
}

fn is_interior_mutable(ty: &str) -> bool {
    ty.split(|c: char| !c.is_alphanumeric() && c != '_')
        .any(|ident| INTERIOR_MUTABLE.contains(&ident) || ident.starts_with("Atomic"))
}

/// Module-level mutable state and shared mutable instances
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueDetector;

impl Detector for ValueDetector {
    fn name(&self) -> &'static str {
        "value"
    }

    fn detect(&self, ctx: &AnalysisContext<'_>, out: &mut Findings) -> Result<(), DetectorError> {
        let kind = ViolationKind::Connascence(ConnascenceType::Value);
        let index = ctx.index();

        for item in &index.statics {
            let (severity, weight, description) = if item.mutable {
                (
                    Severity::High,
                    2.0,
                    format!("'static mut {}' is global state every user must coordinate on", item.name),
                )
            } else if is_interior_mutable(&item.ty) {
                (
                    Severity::Medium,
                    1.5,
                    format!(
                        "static '{}' of type {} is mutable global state",
                        item.name, item.ty
                    ),
                )
            } else {
                continue;
            };
            out.push(
                Violation::builder(kind, ctx.path())
                    .at(item.line, item.column)
                    .severity(severity)
                    .locality(Locality::CrossModule)
                    .weight(weight)
                    .description(description)
                    .recommendation("Pass the state explicitly, or wrap it in a type that owns its invariants")
                    .evidence(Evidence::Pattern {
                        pattern: item.ty.clone(),
                    }),
            );
        }

        for singleton in &index.singletons {
            out.push(
                Violation::builder(kind, ctx.path())
                    .at(singleton.line, singleton.column)
                    .severity(Severity::Medium)
                    .locality(Locality::CrossModule)
                    .weight(1.5)
                    .description(format!(
                        "{}! declares a process-wide singleton",
                        singleton.macro_name
                    ))
                    .recommendation("Construct the value once and pass it to the code that needs it")
                    .evidence(Evidence::Pattern {
                        pattern: format!("{}!", singleton.macro_name),
                    }),
            );
        }

        for info in &index.types {
            for field in &info.fields {
                let normalized = strip_paths(&field.ty);
                if !SHARED_INSTANCES.iter().any(|p| normalized.contains(p)) {
                    continue;
                }
                let field_name = field.name.as_deref().unwrap_or("_");
                out.push(
                    Violation::builder(kind, ctx.path())
                        .at(field.line, field.column)
                        .severity(Severity::Low)
                        .locality(Locality::SameClass)
                        .weight(1.0)
                        .description(format!(
                            "Field '{}.{}' shares a mutable instance ({})",
                            info.name, field_name, normalized
                        ))
                        .recommendation(
                            "Prefer message passing or a single owner over shared interior mutability",
                        )
                        .evidence(Evidence::Pattern {
                            pattern: normalized,
                        }),
                );
            }
        }
        Ok(())
    }
}

/// Pointer-identity comparisons
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityDetector;

impl Detector for IdentityDetector {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn detect(&self, ctx: &AnalysisContext<'_>, out: &mut Findings) -> Result<(), DetectorError> {
        let kind = ViolationKind::Connascence(ConnascenceType::Identity);
        let tree = ctx.tree();

        for (id, node) in tree.iter() {
            let finding = match &node.kind {
                NodeKind::Call { path } if path == "ptr::eq" || path.ends_with("::ptr::eq") || path.ends_with("ptr_eq") => Some((
                    Severity::Low,
                    1.0,
                    format!("{}() compares object identity", path),
                    path.clone(),
                )),
                NodeKind::Binary { op } if op == "==" || op == "!=" => {
                    let raw = tree.children(id).iter().find_map(|&c| match tree.kind(c) {
                        NodeKind::Cast { ty } if ty.starts_with("*const") || ty.starts_with("*mut") => {
                            Some(ty.clone())
                        }
                        _ => None,
                    });
                    raw.map(|ty| {
                        (
                            Severity::Medium,
                            1.5,
                            format!("Comparison of values cast to {} compares addresses", ty),
                            ty,
                        )
                    })
                }
                _ => None,
            };

            if let Some((severity, weight, description, pattern)) = finding {
                out.push(
                    Violation::builder(kind, ctx.path())
                        .at(node.span.line, node.span.column)
                        .severity(severity)
                        .locality(Locality::SameFunction)
                        .weight(weight)
                        .description(description)
                        .recommendation("Compare by value or by an explicit id instead of by address")
                        .evidence(Evidence::Pattern { pattern }),
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
    fn test_module_state() {
        let code = r#"
static mut COUNTER: u32 = 0;
static CACHE: Mutex<Vec<u8>> = Mutex::new(Vec::new());
static HITS: AtomicUsize = AtomicUsize::new(0);
static NAME: &str = "fixed";
lazy_static! { static ref CONFIG: Config = Config::load(); }
"#;
        let result = run_default(&ValueDetector, code);
        let severities: Vec<_> = result.violations.iter().map(|v| v.severity()).collect();
        assert_eq!(
            severities,
            vec![Severity::High, Severity::Medium, Severity::Medium, Severity::Medium]
        );
    }

    #[test]
    fn test_shared_instance_fields() {
        let code = r#"
struct Service {
    state: std::sync::Arc<std::sync::Mutex<State>>,
    local: Rc<RefCell<Vec<u8>>>,
    name: String,
}
"#;
        let result = run_default(&ValueDetector, code);
        assert_eq!(result.violations.len(), 2);
        assert!(result.violations[0].description().contains("Arc<Mutex<State>>"));
    }

    #[test]
    fn test_identity_checks() {
        let code = r#"
fn same(a: &Rc<Node>, b: &Rc<Node>, x: &u8, y: &u8) -> bool {
    Rc::ptr_eq(a, b) || std::ptr::eq(x, y) || (x as *const u8) == (y as *const u8)
}
"#;
        let result = run_default(&IdentityDetector, code);
        let severities: Vec<_> = result.violations.iter().map(|v| v.severity()).collect();
        assert_eq!(severities.len(), 3);
        assert_eq!(
            severities.iter().filter(|s| **s == Severity::Medium).count(),
            1
        );
    }
}
