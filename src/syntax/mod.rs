//! Owned syntax arena
//!
//! `syn` trees hold `proc_macro2` spans and are neither `Send` nor `Sync`, so a
//! parsed file is lowered once into a flat, serializable arena of [`Node`]s.
//! The arena is what the cache stores and what every detector walks.

mod index;
mod lower;
mod signature;

pub use index::{
    FieldInfo, FileIndex, FunctionInfo, MacroDefInfo, SingletonInfo, StaticInfo, TypeInfo,
    TypeKind,
};
pub use lower::lower_file;
pub use signature::{StructuralSignature, signature_of};

use serde::{Deserialize, Serialize};

/// Index of a node in its [`SyntaxTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// 1-based source position of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
}

impl Span {
    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.line) + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LitKind {
    Int,
    Float,
    Str,
    Char,
    Bool,
    Other,
}

impl LitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LitKind::Int => "int",
            LitKind::Float => "float",
            LitKind::Str => "str",
            LitKind::Char => "char",
            LitKind::Bool => "bool",
            LitKind::Other => "lit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    Loop,
    While,
    For,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FnDecl {
    pub name: String,
    /// Impl self type or trait name for associated functions
    pub owner: Option<String>,
    pub is_pub: bool,
    pub has_self: bool,
    /// Typed parameters, `self` excluded
    pub params: Vec<Param>,
}

impl FnDecl {
    pub fn qualified_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}::{}", owner, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: Option<String>,
    pub ty: String,
    pub line: usize,
    pub column: usize,
}

/// What a node is. Identifiers are kept; the signature pass erases them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Module { name: String },
    Function(FnDecl),
    Closure,
    Struct { name: String, fields: Vec<FieldDecl> },
    Enum { name: String, variants: Vec<String> },
    Trait { name: String },
    Impl { self_ty: String, trait_name: Option<String> },
    Static { name: String, ty: String, mutable: bool },
    Const { name: String },
    MacroRules { name: String, arms: usize },
    Use { paths: Vec<String> },
    Attribute { path: String, args: String },
    Block,
    Let { bindings: Vec<String>, wildcard: bool, ty: Option<String> },
    If,
    Match,
    Loop { kind: LoopKind, label: Option<String>, always_true: bool },
    Break { label: Option<String> },
    Continue,
    Return,
    Try,
    Await,
    Call { path: String },
    MethodCall { method: String, receiver: Option<String>, discarded: bool },
    MacroCall { path: String },
    Lit { kind: LitKind, text: String },
    Path { path: String },
    Field { member: String },
    Index,
    Cast { ty: String },
    Deref,
    Unary { op: String },
    Binary { op: String },
    Assign,
    Reference { mutable: bool },
    StructLit,
    Tuple,
    Array,
    Range,
    Other,
}

impl NodeKind {
    pub fn is_item_boundary(&self) -> bool {
        matches!(
            self,
            NodeKind::Function(_)
                | NodeKind::Struct { .. }
                | NodeKind::Enum { .. }
                | NodeKind::Trait { .. }
                | NodeKind::Impl { .. }
                | NodeKind::Module { .. }
                | NodeKind::MacroRules { .. }
        )
    }

    pub fn is_loop(&self) -> bool {
        matches!(self, NodeKind::Loop { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Flat arena of lowered nodes; node 0 is the file root
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyntaxTree {
    nodes: Vec<Node>,
}

impl SyntaxTree {
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.0].span
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    /// Preorder descendants, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.walk(id, |_| true)
    }

    /// Preorder descendants that belong to this function body: nested items
    /// (inner functions, impls, types) are skipped, closures are kept
    pub fn body_nodes(&self, function: NodeId) -> Vec<NodeId> {
        self.walk(function, |kind| !kind.is_item_boundary())
    }

    fn walk(&self, id: NodeId, descend: impl Fn(&NodeKind) -> bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            if !descend(self.kind(next)) {
                continue;
            }
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Nearest enclosing function node
    pub fn enclosing_function(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .find(|&a| matches!(self.kind(a), NodeKind::Function(_)))
    }

    /// Whether `id` sits inside a loop of its own function
    pub fn inside_loop(&self, id: NodeId) -> bool {
        self.ancestors(id)
            .take_while(|&a| !self.kind(a).is_item_boundary())
            .any(|a| self.kind(a).is_loop())
    }

    /// Whether any ancestor is a `const` or `static` item
    pub fn inside_const_item(&self, id: NodeId) -> bool {
        self.ancestors(id).any(|a| {
            matches!(
                self.kind(a),
                NodeKind::Const { .. } | NodeKind::Static { .. }
            )
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = (NodeId, &FnDecl)> {
        self.iter().filter_map(|(id, n)| match &n.kind {
            NodeKind::Function(decl) => Some((id, decl)),
            _ => None,
        })
    }

    fn push(&mut self, kind: NodeKind, span: Span, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            span,
            parent,
            children: Vec::new(),
        });
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        id
    }
}
