//! Structural signatures of function bodies
//!
//! A signature is the preorder skeleton of a body with identifiers erased and
//! literals reduced to their kind, so that two functions that differ only in
//! naming produce the same token stream.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{LoopKind, NodeId, NodeKind, SyntaxTree};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralSignature {
    /// Order-preserving skeleton tokens
    pub tokens: Vec<String>,
    /// Control-flow tokens only; used to bucket comparison candidates
    pub control_key: String,
    /// SHA-256 over the skeleton
    pub digest: String,
    pub line_count: usize,
}

impl StructuralSignature {
    pub fn short_digest(&self) -> &str {
        &self.digest[..self.digest.len().min(12)]
    }
}

/// Compute the signature of the function rooted at `function`
pub fn signature_of(tree: &SyntaxTree, function: NodeId) -> StructuralSignature {
    let mut tokens = Vec::new();
    let mut control = Vec::new();

    // (node, closing) pairs; closing entries emit the end marker
    let mut stack: Vec<(NodeId, bool)> = tree
        .children(function)
        .iter()
        .rev()
        .map(|&c| (c, false))
        .collect();

    while let Some((id, closing)) = stack.pop() {
        let kind = tree.kind(id);
        if closing {
            tokens.push(")".to_string());
            if is_control(kind) {
                control.push(")");
            }
            continue;
        }
        if kind.is_item_boundary() || matches!(kind, NodeKind::Attribute { .. }) {
            continue;
        }

        tokens.push(skeleton_token(kind));
        if is_control(kind) {
            control.push(control_token(kind));
        }

        let children = tree.children(id);
        if !children.is_empty() {
            stack.push((id, true));
            stack.extend(children.iter().rev().map(|&c| (c, false)));
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(tokens.join(" ").as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    StructuralSignature {
        tokens,
        control_key: control.join(" "),
        digest,
        line_count: tree.span(function).line_count(),
    }
}

fn is_control(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::If
            | NodeKind::Match
            | NodeKind::Loop { .. }
            | NodeKind::Break { .. }
            | NodeKind::Continue
            | NodeKind::Return
            | NodeKind::Try
    )
}

fn control_token(kind: &NodeKind) -> &'static str {
    match kind {
        NodeKind::If => "if",
        NodeKind::Match => "match",
        NodeKind::Loop {
            kind: LoopKind::Loop,
            ..
        } => "loop",
        NodeKind::Loop {
            kind: LoopKind::While,
            ..
        } => "while",
        NodeKind::Loop {
            kind: LoopKind::For,
            ..
        } => "for",
        NodeKind::Break { .. } => "break",
        NodeKind::Continue => "continue",
        NodeKind::Return => "return",
        NodeKind::Try => "?",
        _ => "",
    }
}

fn skeleton_token(kind: &NodeKind) -> String {
    let token = match kind {
        NodeKind::Block => "{",
        NodeKind::Let { wildcard: true, .. } => "let_",
        NodeKind::Let { .. } => "let",
        NodeKind::Await => "await",
        NodeKind::Call { .. } => "call",
        NodeKind::MethodCall { .. } => "mcall",
        NodeKind::MacroCall { .. } => "macro",
        NodeKind::Lit { kind, .. } => return format!("lit:{}", kind.as_str()),
        NodeKind::Path { .. } => "id",
        NodeKind::Field { .. } => "field",
        NodeKind::Index => "index",
        NodeKind::Cast { .. } => "cast",
        NodeKind::Deref => "deref",
        NodeKind::Unary { op } => return format!("un:{}", op),
        NodeKind::Binary { op } => return format!("bin:{}", op),
        NodeKind::Assign => "=",
        NodeKind::Reference { .. } => "&",
        NodeKind::Closure => "closure",
        NodeKind::StructLit => "struct",
        NodeKind::Tuple => "tuple",
        NodeKind::Array => "array",
        NodeKind::Range => "range",
        other if is_control(other) => control_token(other),
        _ => "expr",
    };
    token.to_string()
}
