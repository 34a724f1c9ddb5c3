//! Connascence of Execution and Timing
//!
//! Execution: paired setup/teardown calls that must happen in order.
//! Timing: sleeps standing in for real synchronization.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::{Detector, DetectorError, Findings};
use crate::source::AnalysisContext;
use crate::syntax::NodeKind;
use crate::violation::{ConnascenceType, Evidence, Locality, Severity, Violation, ViolationKind};

static SETUP: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^(init|setup|open|start|connect|begin|acquire|lock)(?:_|$)").ok());

static TEARDOWN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^(teardown|close|stop|disconnect|end|finish|release|unlock|shutdown|cleanup)(?:_|$)",
    )
    .ok()
});

/// Teardown verbs that close each setup verb
fn closes(setup: &str, teardown: &str) -> bool {
    let partners: &[&str] = match setup {
        "init" => &["shutdown", "cleanup", "teardown"],
        "setup" => &["teardown", "cleanup"],
        "open" => &["close"],
        "start" => &["stop", "shutdown"],
        "connect" => &["disconnect", "close"],
        "begin" => &["end", "finish"],
        "acquire" => &["release"],
        "lock" => &["unlock"],
        _ => &[],
    };
    partners.contains(&teardown)
}

fn verb<'a>(re: &Option<Regex>, name: &'a str) -> Option<&'a str> {
    re.as_ref()?
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Setup/teardown method pairs without `Drop`, and in-body paired calls
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionDetector;

impl Detector for ExecutionDetector {
    fn name(&self) -> &'static str {
        "execution"
    }

    fn detect(&self, ctx: &AnalysisContext<'_>, out: &mut Findings) -> Result<(), DetectorError> {
        let kind = ViolationKind::Connascence(ConnascenceType::Execution);

        for info in &ctx.index().types {
            if info.has_drop() {
                continue;
            }
            for setup in &info.methods {
                let Some(setup_verb) = verb(&SETUP, setup) else {
                    continue;
                };
                let Some(teardown) = info.methods.iter().find(|m| {
                    verb(&TEARDOWN, m).is_some_and(|t| closes(setup_verb, t))
                }) else {
                    continue;
                };
                out.push(
                    Violation::builder(kind, ctx.path())
                        .at(info.line, info.column)
                        .severity(Severity::Low)
                        .locality(Locality::SameClass)
                        .weight(1.0)
                        .description(format!(
                            "Type '{}' requires '{}' to be followed by '{}' with no Drop guard",
                            info.name, setup, teardown
                        ))
                        .recommendation(
                            "Return a guard whose Drop impl performs the teardown, so the order is enforced",
                        )
                        .evidence(Evidence::Pattern {
                            pattern: format!("{}/{}", setup, teardown),
                        }),
                );
            }
        }

        let tree = ctx.tree();
        for function in &ctx.index().functions {
            let calls: Vec<_> = tree
                .body_nodes(function.node)
                .into_iter()
                .filter_map(|id| match tree.kind(id) {
                    NodeKind::MethodCall {
                        method,
                        receiver: Some(receiver),
                        ..
                    } => Some((id, method.as_str(), receiver.as_str())),
                    _ => None,
                })
                .collect();

            for (i, (id, method, receiver)) in calls.iter().enumerate() {
                let Some(setup_verb) = verb(&SETUP, method) else {
                    continue;
                };
                let closing = calls[i + 1..].iter().find(|(_, m, r)| {
                    r == receiver && verb(&TEARDOWN, m).is_some_and(|t| closes(setup_verb, t))
                });
                let Some((_, teardown, _)) = closing else {
                    continue;
                };
                let span = tree.span(*id);
                out.push(
                    Violation::builder(kind, ctx.path())
                        .at(span.line, span.column)
                        .severity(Severity::Medium)
                        .locality(Locality::SameFunction)
                        .weight(1.5)
                        .description(format!(
                            "'{}' calls {}.{}() and must later call {}.{}()",
                            function.qualified_name, receiver, method, receiver, teardown
                        ))
                        .recommendation(
                            "Use a scoped guard or a closure-taking helper so teardown cannot be skipped",
                        )
                        .evidence(Evidence::Pattern {
                            pattern: format!("{}.{}/{}", receiver, method, teardown),
                        }),
                );
            }
        }
        Ok(())
    }
}

/// Sleep-based synchronization
#[derive(Debug, Clone, Copy, Default)]
pub struct TimingDetector;

impl Detector for TimingDetector {
    fn name(&self) -> &'static str {
        "timing"
    }

    fn detect(&self, ctx: &AnalysisContext<'_>, out: &mut Findings) -> Result<(), DetectorError> {
        let tree = ctx.tree();
        for (id, node) in tree.iter() {
            let NodeKind::Call { path } = &node.kind else {
                continue;
            };
            if path.rsplit("::").next() != Some("sleep") {
                continue;
            }
            let polling = tree.inside_loop(id);
            let (severity, description) = if polling {
                (
                    Severity::Medium,
                    format!("{}() inside a loop polls for a condition", path),
                )
            } else {
                (
                    Severity::Low,
                    format!("{}() assumes another task finishes in time", path),
                )
            };
            out.push(
                Violation::builder(
                    ViolationKind::Connascence(ConnascenceType::Timing),
                    ctx.path(),
                )
                .at(node.span.line, node.span.column)
                .severity(severity)
                .locality(Locality::SameFunction)
                .weight(if polling { 1.5 } else { 1.0 })
                .description(description)
                .recommendation(
                    "Wait on a channel, condition variable or join handle instead of sleeping",
                )
                .evidence(Evidence::Pattern {
                    pattern: path.clone(),
                }),
            );
        }
        Ok(())
    }
}
