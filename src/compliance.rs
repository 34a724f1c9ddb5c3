//! Power-of-Ten style safety rules
//!
//! Ten rules adapted to Rust, checked per file against the same
//! [`AnalysisContext`] the connascence detectors see:
//!
//! | Rule | Check |
//! |------|-------|
//! | 1 | No direct recursion |
//! | 2 | `loop` / `while true` must have an exit |
//! | 3 | No allocation inside loop bodies |
//! | 4 | Function length limit |
//! | 5 | Assertion density in longer functions |
//! | 6 | Declare variables in the narrowest scope |
//! | 7 | Do not discard return values |
//! | 8 | Small `macro_rules!` definitions |
//! | 9 | No raw pointers or multi-level dereference |
//! | 10 | Do not silence warnings with `#[allow]` |

use crate::detectors::{Detector, DetectorError, Findings};
use crate::source::{AnalysisContext, SourceUnit};
use crate::syntax::{FunctionInfo, LoopKind, NodeId, NodeKind, Span, SyntaxTree};
use crate::violation::{ComplianceRule, Evidence, Locality, Violation, ViolationKind};

/// Checks per function that make up one compliance "opportunity" unit
const CHECKS_PER_FUNCTION: usize = 10;

const ALLOCATING_CALLS: [&str; 4] = ["Vec::new", "Box::new", "String::new", "with_capacity"];
const ALLOCATING_METHODS: [&str; 2] = ["to_vec", "to_string"];
const ALLOCATING_MACROS: [&str; 2] = ["vec", "format"];
const ASSERT_MACROS: [&str; 6] = [
    "assert",
    "assert_eq",
    "assert_ne",
    "debug_assert",
    "debug_assert_eq",
    "debug_assert_ne",
];

/// Number of rule checks a file offers, used as the compliance denominator
pub fn opportunities(unit: &SourceUnit) -> usize {
    unit.index().functions.len().max(1) * CHECKS_PER_FUNCTION
}

/// Runs all ten rules as a single detector
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplianceDetector;

impl Detector for ComplianceDetector {
    fn name(&self) -> &'static str {
        "compliance"
    }

    fn detect(&self, ctx: &AnalysisContext<'_>, out: &mut Findings) -> Result<(), DetectorError> {
        let mut check = Checker { ctx: *ctx, out };
        for function in &ctx.index().functions {
            check.recursion(function)?;
            check.allocation_in_loops(function)?;
            check.length(function)?;
            check.assertions(function)?;
            check.scope(function)?;
        }
        check.unbounded_loops()?;
        check.discarded_results()?;
        check.macros()?;
        check.raw_pointers()?;
        check.suppressed_warnings()?;
        Ok(())
    }
}

fn rule(number: u8) -> Result<ComplianceRule, DetectorError> {
    ComplianceRule::new(number).map_err(|e| DetectorError::Failed(e.to_string()))
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

fn is_raw_pointer(ty: &str) -> bool {
    ty.contains("*const ") || ty.contains("*mut ")
}

/// One rule breach, before it becomes a [`Violation`]
struct Finding {
    rule: u8,
    at: (usize, usize),
    locality: Locality,
    weight: f64,
    description: String,
    recommendation: &'static str,
    evidence: Evidence,
}

struct Checker<'c, 'a> {
    ctx: AnalysisContext<'a>,
    out: &'c mut Findings,
}

impl<'a> Checker<'_, 'a> {
    fn tree(&self) -> &'a SyntaxTree {
        self.ctx.tree()
    }

    fn flag(&mut self, finding: Finding) -> Result<(), DetectorError> {
        let rule = rule(finding.rule)?;
        self.out.push(
            Violation::builder(ViolationKind::Compliance(rule), self.ctx.path())
                .at(finding.at.0, finding.at.1)
                .severity(rule.default_severity())
                .locality(finding.locality)
                .weight(finding.weight)
                .description(finding.description)
                .recommendation(finding.recommendation)
                .evidence(finding.evidence),
        );
        Ok(())
    }

    /// Rule 1
    fn recursion(&mut self, function: &FunctionInfo) -> Result<(), DetectorError> {
        let tree = self.tree();
        let self_path = format!("Self::{}", function.name);
        let owner_path = function
            .owner
            .as_ref()
            .map(|o| format!("{}::{}", o, function.name));

        let recursive = tree.body_nodes(function.node).into_iter().find(|&id| match tree.kind(id) {
            NodeKind::Call { path } => match &function.owner {
                None => *path == function.name,
                Some(_) => *path == self_path || Some(path) == owner_path.as_ref(),
            },
            NodeKind::MethodCall {
                method, receiver, ..
            } => function.has_self && *method == function.name && receiver.as_deref() == Some("self"),
            _ => false,
        });
        let Some(call) = recursive else {
            return Ok(());
        };
        let span = tree.span(call);
        self.flag(Finding {
            rule: 1,
            at: (span.line, span.column),
            locality: Locality::SameFunction,
            weight: 1.0,
            description: format!("Function '{}' calls itself", function.qualified_name),
            recommendation: "Rewrite the recursion as a loop with an explicit bound or work stack",
            evidence: Evidence::Pattern {
                pattern: function.qualified_name.clone(),
            },
        })
    }

    /// Rule 3
    fn allocation_in_loops(&mut self, function: &FunctionInfo) -> Result<(), DetectorError> {
        let tree = self.tree();
        let hits: Vec<(Span, String)> = tree
            .body_nodes(function.node)
            .into_iter()
            .filter(|&id| tree.inside_loop(id))
            .filter_map(|id| {
                let what = match tree.kind(id) {
                    NodeKind::Call { path }
                        if ALLOCATING_CALLS
                            .iter()
                            .any(|c| path.as_str() == *c || path.ends_with(&format!("::{}", c))) =>
                    {
                        format!("{}()", path)
                    }
                    NodeKind::MethodCall { method, .. }
                        if ALLOCATING_METHODS.contains(&method.as_str()) =>
                    {
                        format!(".{}()", method)
                    }
                    NodeKind::MacroCall { path }
                        if ALLOCATING_MACROS.contains(&last_segment(path)) =>
                    {
                        format!("{}!", path)
                    }
                    _ => return None,
                };
                Some((tree.span(id), what))
            })
            .collect();

        for (span, what) in hits {
            self.flag(Finding {
                rule: 3,
                at: (span.line, span.column),
                locality: Locality::SameFunction,
                weight: 1.0,
                description: format!("{} allocates inside a loop in '{}'", what, function.qualified_name),
                recommendation: "Allocate once before the loop and reuse the buffer",
                evidence: Evidence::Pattern { pattern: what },
            })?;
        }
        Ok(())
    }

    /// Rule 4
    fn length(&mut self, function: &FunctionInfo) -> Result<(), DetectorError> {
        let limit = self.ctx.policy().compliance.max_function_lines;
        let count = function.line_count();
        if count <= limit {
            return Ok(());
        }
        self.flag(Finding {
            rule: 4,
            at: (function.line, function.column),
            locality: Locality::SameFunction,
            weight: count as f64 / limit.max(1) as f64,
            description: format!(
                "Function '{}' is {} lines long (limit {})",
                function.qualified_name, count, limit
            ),
            recommendation: "Extract helper functions so each one fits on a screen",
            evidence: Evidence::Lines {
                function: function.qualified_name.clone(),
                count,
                limit,
            },
        })
    }

    /// Rule 5
    fn assertions(&mut self, function: &FunctionInfo) -> Result<(), DetectorError> {
        let policy = &self.ctx.policy().compliance;
        let (min_lines, required) = (policy.assertion_min_lines, policy.min_assertions);
        if function.line_count() <= min_lines {
            return Ok(());
        }
        let tree = self.tree();
        let count = tree
            .body_nodes(function.node)
            .into_iter()
            .filter(|&id| {
                matches!(tree.kind(id), NodeKind::MacroCall { path } if ASSERT_MACROS.contains(&last_segment(path)))
            })
            .count();
        if count >= required {
            return Ok(());
        }
        self.flag(Finding {
            rule: 5,
            at: (function.line, function.column),
            locality: Locality::SameFunction,
            weight: 1.0,
            description: format!(
                "Function '{}' has {} assertion(s); at least {} expected",
                function.qualified_name, count, required
            ),
            recommendation: "Assert preconditions and invariants with debug_assert!",
            evidence: Evidence::Assertions {
                function: function.qualified_name.clone(),
                count,
                required,
            },
        })
    }

    /// Rule 6: a top-level `let` whose uses all sit in one nested block
    fn scope(&mut self, function: &FunctionInfo) -> Result<(), DetectorError> {
        let tree = self.tree();
        let Some(&body) = tree
            .children(function.node)
            .iter()
            .rev()
            .find(|&&c| matches!(tree.kind(c), NodeKind::Block))
        else {
            return Ok(());
        };

        let mut narrowable = Vec::new();
        for &stmt in tree.children(body) {
            let NodeKind::Let { bindings, .. } = tree.kind(stmt) else {
                continue;
            };
            let inside_let: Vec<NodeId> = tree.descendants(stmt);
            for binding in bindings {
                let uses: Vec<NodeId> = tree
                    .body_nodes(function.node)
                    .into_iter()
                    .filter(|id| !inside_let.contains(id))
                    .filter(|&id| matches!(tree.kind(id), NodeKind::Path { path } if path == binding))
                    .collect();
                if uses.is_empty() {
                    continue;
                }
                let scopes: Vec<Option<NodeId>> =
                    uses.iter().map(|&u| scope_block(tree, u, body)).collect();
                let Some(Some(block)) = scopes.first().copied() else {
                    continue;
                };
                let in_loop_body = tree
                    .parent(block)
                    .is_some_and(|p| tree.kind(p).is_loop());
                if !in_loop_body && scopes.iter().all(|s| *s == Some(block)) {
                    narrowable.push((tree.span(stmt), binding.clone(), tree.span(block).line));
                }
            }
        }

        for (span, binding, block_line) in narrowable {
            self.flag(Finding {
                rule: 6,
                at: (span.line, span.column),
                locality: Locality::SameFunction,
                weight: 1.0,
                description: format!(
                    "'{}' in '{}' is only used inside the block at line {}",
                    binding, function.qualified_name, block_line
                ),
                recommendation: "Move the declaration into the block that uses it",
                evidence: Evidence::Pattern { pattern: binding },
            })?;
        }
        Ok(())
    }

    /// Rule 2
    fn unbounded_loops(&mut self) -> Result<(), DetectorError> {
        let tree = self.tree();
        let unbounded: Vec<(Span, &'static str)> = tree
            .iter()
            .filter_map(|(id, node)| match &node.kind {
                NodeKind::Loop {
                    kind,
                    always_true: true,
                    ..
                } if !has_exit(tree, id) => Some((
                    node.span,
                    match kind {
                        LoopKind::While => "while true",
                        _ => "loop",
                    },
                )),
                _ => None,
            })
            .collect();

        for (span, form) in unbounded {
            self.flag(Finding {
                rule: 2,
                at: (span.line, span.column),
                locality: Locality::SameFunction,
                weight: 1.0,
                description: format!("'{}' at line {} has no break or return", form, span.line),
                recommendation: "Give the loop an explicit exit condition or iteration bound",
                evidence: Evidence::Pattern {
                    pattern: form.to_string(),
                },
            })?;
        }
        Ok(())
    }

    /// Rule 7
    fn discarded_results(&mut self) -> Result<(), DetectorError> {
        let tree = self.tree();
        let discarded: Vec<(Span, &'static str)> = tree
            .iter()
            .filter_map(|(id, node)| match &node.kind {
                NodeKind::Let { wildcard: true, .. }
                    if tree.children(id).iter().any(|&c| {
                        matches!(
                            tree.kind(c),
                            NodeKind::Call { .. } | NodeKind::MethodCall { .. } | NodeKind::Await
                        )
                    }) =>
                {
                    Some((node.span, "let _ ="))
                }
                NodeKind::MethodCall {
                    method,
                    discarded: true,
                    ..
                } if method == "ok" => Some((node.span, ".ok();")),
                _ => None,
            })
            .collect();

        for (span, form) in discarded {
            self.flag(Finding {
                rule: 7,
                at: (span.line, span.column),
                locality: Locality::SameFunction,
                weight: 1.0,
                description: format!("Result discarded with '{}' at line {}", form, span.line),
                recommendation: "Handle the error, propagate it with ?, or log why it is safe to ignore",
                evidence: Evidence::Pattern {
                    pattern: form.to_string(),
                },
            })?;
        }
        Ok(())
    }

    /// Rule 8
    fn macros(&mut self) -> Result<(), DetectorError> {
        let limit = self.ctx.policy().compliance.max_macro_arms;
        let index = self.ctx.index();
        for def in index.macros.iter().filter(|m| m.arms > limit) {
            self.flag(Finding {
                rule: 8,
                at: (def.line, def.column),
                locality: Locality::SameClass,
                weight: 1.0,
                description: format!(
                    "macro_rules! {} has {} arms (limit {})",
                    def.name, def.arms, limit
                ),
                recommendation: "Split the macro or replace it with generic functions",
                evidence: Evidence::Pattern {
                    pattern: format!("{}!", def.name),
                },
            })?;
        }
        Ok(())
    }

    /// Rule 9
    fn raw_pointers(&mut self) -> Result<(), DetectorError> {
        let tree = self.tree();
        let index = self.ctx.index();
        let mut found: Vec<((usize, usize), Locality, String)> = Vec::new();

        for function in &index.functions {
            for param in function.params.iter().filter(|p| is_raw_pointer(&p.ty)) {
                found.push((
                    (function.line, function.column),
                    Locality::SameFunction,
                    format!("parameter '{}: {}' of '{}'", param.name, param.ty, function.qualified_name),
                ));
            }
        }
        for info in &index.types {
            for field in info.fields.iter().filter(|f| is_raw_pointer(&f.ty)) {
                found.push((
                    (field.line, field.column),
                    Locality::SameClass,
                    format!("field of '{}' with type {}", info.name, field.ty),
                ));
            }
        }
        for item in index.statics.iter().filter(|s| is_raw_pointer(&s.ty)) {
            found.push((
                (item.line, item.column),
                Locality::SameClass,
                format!("static '{}' with type {}", item.name, item.ty),
            ));
        }
        for (id, node) in tree.iter() {
            let what = match &node.kind {
                NodeKind::Cast { ty } if is_raw_pointer(ty) => format!("cast to {}", ty),
                NodeKind::Let { ty: Some(ty), .. } if is_raw_pointer(ty) => {
                    format!("binding of type {}", ty)
                }
                NodeKind::Deref
                    if tree
                        .children(id)
                        .first()
                        .is_some_and(|&c| matches!(tree.kind(c), NodeKind::Deref)) =>
                {
                    "multi-level dereference".to_string()
                }
                _ => continue,
            };
            found.push(((node.span.line, node.span.column), Locality::SameFunction, what));
        }

        for (at, locality, what) in found {
            self.flag(Finding {
                rule: 9,
                at,
                locality,
                weight: 1.0,
                description: format!("Raw pointer use: {}", what),
                recommendation: "Use references, smart pointers or indices instead of raw pointers",
                evidence: Evidence::Pattern { pattern: what },
            })?;
        }
        Ok(())
    }

    /// Rule 10
    fn suppressed_warnings(&mut self) -> Result<(), DetectorError> {
        let allows: Vec<(Span, String)> = self
            .tree()
            .iter()
            .filter_map(|(_, node)| match &node.kind {
                NodeKind::Attribute { path, args } if path == "allow" => {
                    Some((node.span, args.clone()))
                }
                _ => None,
            })
            .collect();

        for (span, args) in allows {
            self.flag(Finding {
                rule: 10,
                at: (span.line, span.column),
                locality: Locality::SameClass,
                weight: 1.0,
                description: format!("#[allow({})] suppresses compiler warnings", args),
                recommendation: "Fix the underlying warning instead of silencing it",
                evidence: Evidence::Pattern {
                    pattern: format!("allow({})", args),
                },
            })?;
        }
        Ok(())
    }
}

/// The outermost block below `body` that contains `id`, if any
fn scope_block(tree: &SyntaxTree, id: NodeId, body: NodeId) -> Option<NodeId> {
    let mut outermost = None;
    for ancestor in tree.ancestors(id) {
        if ancestor == body {
            return outermost;
        }
        if matches!(tree.kind(ancestor), NodeKind::Block) {
            outermost = Some(ancestor);
        }
    }
    None
}

/// Whether a loop contains a `return` or a `break` that leaves it
fn has_exit(tree: &SyntaxTree, loop_id: NodeId) -> bool {
    let label = match tree.kind(loop_id) {
        NodeKind::Loop { label, .. } => label.clone(),
        _ => None,
    };
    tree.descendants(loop_id).into_iter().any(|id| match tree.kind(id) {
        NodeKind::Return => true,
        NodeKind::Break { label: Some(target) } => label.as_deref() == Some(target.as_str()),
        NodeKind::Break { label: None } => nearest_loop(tree, id) == Some(loop_id),
        _ => false,
    })
}

/// Innermost loop enclosing `id` within the same function or closure
fn nearest_loop(tree: &SyntaxTree, id: NodeId) -> Option<NodeId> {
    tree.ancestors(id)
        .take_while(|&a| !tree.kind(a).is_item_boundary() && !matches!(tree.kind(a), NodeKind::Closure))
        .find(|&a| tree.kind(a).is_loop())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Policy;
    use crate::detectors::testing::{run_default, run_on};

    fn rules(code: &str) -> Vec<u8> {
        run_default(&ComplianceDetector, code)
            .violations
            .iter()
            .filter_map(|v| match v.kind() {
                ViolationKind::Compliance(rule) => Some(rule.number()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_recursion() {
        assert_eq!(rules("fn fact(n: u64) -> u64 { if n == 0 { 1 } else { n * fact(n - 1) } }"), vec![1]);
        let method = r#"
struct Node;
impl Node {
    fn depth(&self) -> usize { self.depth() + 1 }
    fn size(&self) -> usize { Self::size(self) }
}
"#;
        assert_eq!(rules(method), vec![1, 1]);
    }

    #[test]
    fn test_unbounded_loops() {
        let code = r#"
fn serve() {
    loop {
        handle();
    }
}
fn poll() {
    'outer: loop {
        for x in items() {
            if x { break 'outer; }
        }
    }
}
fn spin() {
    while true {
        for x in items() { break; }
    }
}
fn drain() -> u8 {
    loop {
        if let Some(v) = next() { return v; }
    }
}
"#;
        let result = run_default(&ComplianceDetector, code);
        let lines: Vec<_> = result.violations.iter().map(|v| v.line()).collect();
        assert_eq!(lines, vec![3, 15]);
    }

    #[test]
    fn test_allocation_in_loop() {
        let code = r#"
fn build(xs: &[u8]) {
    let mut out = Vec::new();
    for x in xs {
        let s = x.to_string();
        let v = vec![*x];
        let label = format!("{}", x);
    }
}
"#;
        assert_eq!(rules(code), vec![3, 3, 3]);
    }

    #[test]
    fn test_function_length_and_assertions() {
        let body: String = (0..12).map(|i| format!("    let v{} = {};\n", i, i)).collect();
        let code = format!("fn long() {{\n{}}}\n", body);

        let mut policy = Policy::default();
        policy.compliance.max_function_lines = 10;
        let result = run_on(&ComplianceDetector, &code, &policy);
        let by_rule = |n: u8| {
            result
                .violations
                .iter()
                .find(|v| matches!(v.kind(), ViolationKind::Compliance(r) if r.number() == n))
                .unwrap()
        };
        assert_eq!(result.violations.len(), 2);
        assert!(by_rule(4).recommendation().contains("Extract helper functions"));
        assert_eq!(
            by_rule(5).evidence(),
            &Evidence::Assertions {
                function: "long".to_string(),
                count: 0,
                required: 2
            }
        );
    }

    #[test]
    fn test_narrow_scope() {
        let code = r#"
fn f(flag: bool) -> u8 {
    let limit = compute();
    let total = 0;
    if flag {
        check(limit);
        return total;
    }
    total
}
fn g(items: &[u8]) {
    let mut count = 0;
    for i in items {
        count += 1;
    }
}
"#;
        let result = run_default(&ComplianceDetector, code);
        assert_eq!(result.violations.len(), 1);
        assert!(result.violations[0].description().contains("'limit'"));
        assert_eq!(result.violations[0].line(), 3);
    }

    #[test]
    fn test_discarded_results() {
        let code = r#"
fn f(tx: &Sender) {
    let _ = tx.send(1);
    let _ = std::fs::remove_file("a.txt");
    tx.flush().ok();
    let _unused = 5;
}
"#;
        assert_eq!(rules(code), vec![7, 7, 7]);
    }

    #[test]
    fn test_module_level_rules() {
        let code = r#"
#[allow(dead_code)]
struct Raw { ptr: *const u8 }
macro_rules! many {
    (a) => {};
    (b) => {};
    (c) => {};
    (d) => {};
}
fn read(p: *mut u8, q: &&u8) -> u8 { let x = **q; x }
"#;
        let mut found = rules(code);
        found.sort();
        assert_eq!(found, vec![8, 9, 9, 9, 10]);
    }

    #[test]
    fn test_clean_code_passes() {
        let code = r#"
pub fn add(a: u32, b: u32) -> u32 {
    a.saturating_add(b)
}
"#;
        assert!(rules(code).is_empty());
    }

    #[test]
    fn test_opportunities() {
        let unit = SourceUnit::parse("a.rs", "fn a() {} fn b() {}".to_string()).unwrap();
        assert_eq!(opportunities(&unit), 20);
        let empty = SourceUnit::parse("b.rs", "struct S;".to_string()).unwrap();
        assert_eq!(opportunities(&empty), 10);
    }

    #[test]
    fn test_checker_source_suppresses_no_warnings() {
        let own = rules(include_str!("compliance.rs"));
        assert!(!own.contains(&10), "{:?}", own);
    }
}
