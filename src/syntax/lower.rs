//! Lowering from `syn` into the owned arena
//!
//! Uses `syn::visit::Visit`: every interesting syntax node opens an arena node,
//! the default visit fills in its children, and the node is closed again.

use proc_macro2::{Spacing, TokenStream, TokenTree};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::{
    BinOp, Expr, FnArg, GenericArgument, Lit, Pat, PathArguments, Signature, Stmt,
    Type, TypeParamBound, UnOp, UseTree,
};

use super::{FieldDecl, FnDecl, LitKind, LoopKind, NodeId, NodeKind, Param, Span, SyntaxTree};

/// Lower a parsed file into a [`SyntaxTree`]
pub fn lower_file(file: &syn::File) -> SyntaxTree {
    let mut lowerer = Lowerer::new();
    lowerer.visit_file(file);

    let last_line = lowerer
        .tree
        .iter()
        .map(|(_, n)| n.span.end_line)
        .max()
        .unwrap_or(1);
    let mut tree = lowerer.tree;
    if let Some(root) = tree.nodes.first_mut() {
        root.span.end_line = last_line;
    }
    tree
}

struct Lowerer {
    tree: SyntaxTree,
    stack: Vec<NodeId>,
    /// Self type (impl) or trait name for associated functions
    owner: Option<String>,
}

impl Lowerer {
    fn new() -> Self {
        let mut tree = SyntaxTree::default();
        let root = tree.push(
            NodeKind::File,
            Span {
                line: 1,
                column: 1,
                end_line: 1,
            },
            None,
        );
        Self {
            tree,
            stack: vec![root],
            owner: None,
        }
    }

    fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or(NodeId(0))
    }

    fn leaf(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let parent = self.current();
        self.tree.push(kind, span, Some(parent))
    }

    fn within(&mut self, kind: NodeKind, span: Span, f: impl FnOnce(&mut Self)) -> NodeId {
        let id = self.leaf(kind, span);
        self.stack.push(id);
        f(self);
        self.stack.pop();
        id
    }

    fn function(&mut self, sig: &Signature, is_pub: bool, close: proc_macro2::Span, body: impl FnOnce(&mut Self)) {
        let decl = fn_decl(sig, self.owner.clone(), is_pub);
        let span = span_between(sig.ident.span(), close);
        self.within(NodeKind::Function(decl), span, body);
    }

    fn method_call(&mut self, node: &syn::ExprMethodCall, discarded: bool) {
        let kind = NodeKind::MethodCall {
            method: node.method.to_string(),
            receiver: expr_name(&node.receiver),
            discarded,
        };
        self.within(kind, span_of(node.span()), |l| {
            visit::visit_expr_method_call(l, node)
        });
    }
}

impl<'ast> Visit<'ast> for Lowerer {
    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        let previous = self.owner.take();
        let is_pub = matches!(node.vis, syn::Visibility::Public(_));
        self.function(&node.sig, is_pub, node.block.brace_token.span.close(), |l| {
            visit::visit_item_fn(l, node)
        });
        self.owner = previous;
    }

    fn visit_impl_item_fn(&mut self, node: &'ast syn::ImplItemFn) {
        let is_pub = matches!(node.vis, syn::Visibility::Public(_));
        self.function(&node.sig, is_pub, node.block.brace_token.span.close(), |l| {
            visit::visit_impl_item_fn(l, node)
        });
    }

    fn visit_trait_item_fn(&mut self, node: &'ast syn::TraitItemFn) {
        match &node.default {
            Some(block) => {
                self.function(&node.sig, false, block.brace_token.span.close(), |l| {
                    visit::visit_trait_item_fn(l, node)
                });
            }
            None => visit::visit_trait_item_fn(self, node),
        }
    }

    fn visit_item_impl(&mut self, node: &'ast syn::ItemImpl) {
        let self_ty = type_base_name(&node.self_ty);
        let trait_name = node.trait_.as_ref().and_then(|(_, path, _)| {
            path.segments.last().map(|s| s.ident.to_string())
        });
        let span = span_between(node.impl_token.span, node.brace_token.span.close());
        let previous = self.owner.replace(self_ty.clone());
        self.within(NodeKind::Impl { self_ty, trait_name }, span, |l| {
            visit::visit_item_impl(l, node)
        });
        self.owner = previous;
    }

    fn visit_item_trait(&mut self, node: &'ast syn::ItemTrait) {
        let name = node.ident.to_string();
        let span = span_between(node.ident.span(), node.brace_token.span.close());
        let previous = self.owner.replace(name.clone());
        self.within(NodeKind::Trait { name }, span, |l| {
            visit::visit_item_trait(l, node)
        });
        self.owner = previous;
    }

    fn visit_item_struct(&mut self, node: &'ast syn::ItemStruct) {
        let fields = node
            .fields
            .iter()
            .map(|f| {
                let pos = span_of(f.span());
                FieldDecl {
                    name: f.ident.as_ref().map(|i| i.to_string()),
                    ty: render_type(&f.ty),
                    line: pos.line,
                    column: pos.column,
                }
            })
            .collect();
        let kind = NodeKind::Struct {
            name: node.ident.to_string(),
            fields,
        };
        self.within(kind, span_of(node.ident.span()), |l| {
            visit::visit_item_struct(l, node)
        });
    }

    fn visit_item_enum(&mut self, node: &'ast syn::ItemEnum) {
        let kind = NodeKind::Enum {
            name: node.ident.to_string(),
            variants: node.variants.iter().map(|v| v.ident.to_string()).collect(),
        };
        let span = span_between(node.ident.span(), node.brace_token.span.close());
        self.within(kind, span, |l| visit::visit_item_enum(l, node));
    }

    fn visit_item_static(&mut self, node: &'ast syn::ItemStatic) {
        let kind = NodeKind::Static {
            name: node.ident.to_string(),
            ty: render_type(&node.ty),
            mutable: matches!(node.mutability, syn::StaticMutability::Mut(_)),
        };
        self.within(kind, span_of(node.ident.span()), |l| {
            visit::visit_item_static(l, node)
        });
    }

    fn visit_item_const(&mut self, node: &'ast syn::ItemConst) {
        let kind = NodeKind::Const {
            name: node.ident.to_string(),
        };
        self.within(kind, span_of(node.ident.span()), |l| {
            visit::visit_item_const(l, node)
        });
    }

    fn visit_item_macro(&mut self, node: &'ast syn::ItemMacro) {
        if node.mac.path.is_ident("macro_rules") {
            let kind = NodeKind::MacroRules {
                name: node
                    .ident
                    .as_ref()
                    .map(|i| i.to_string())
                    .unwrap_or_default(),
                arms: count_macro_arms(&node.mac.tokens),
            };
            self.leaf(kind, span_of(node.mac.span()));
            return;
        }
        visit::visit_item_macro(self, node);
    }

    fn visit_item_use(&mut self, node: &'ast syn::ItemUse) {
        let mut paths = Vec::new();
        collect_use_paths(&node.tree, "", &mut paths);
        self.leaf(NodeKind::Use { paths }, span_of(node.use_token.span));
    }

    fn visit_item_mod(&mut self, node: &'ast syn::ItemMod) {
        let kind = NodeKind::Module {
            name: node.ident.to_string(),
        };
        self.within(kind, span_of(node.ident.span()), |l| {
            visit::visit_item_mod(l, node)
        });
    }

    fn visit_attribute(&mut self, node: &'ast syn::Attribute) {
        let args = match &node.meta {
            syn::Meta::List(list) => list.tokens.to_string(),
            _ => String::new(),
        };
        let kind = NodeKind::Attribute {
            path: path_text(node.path()),
            args,
        };
        self.leaf(kind, span_of(node.span()));
    }

    fn visit_block(&mut self, node: &'ast syn::Block) {
        let span = span_between(node.brace_token.span.open(), node.brace_token.span.close());
        self.within(NodeKind::Block, span, |l| visit::visit_block(l, node));
    }

    fn visit_stmt(&mut self, node: &'ast Stmt) {
        match node {
            Stmt::Expr(Expr::MethodCall(call), Some(_)) => self.method_call(call, true),
            _ => visit::visit_stmt(self, node),
        }
    }

    fn visit_local(&mut self, node: &'ast syn::Local) {
        let mut bindings = Vec::new();
        collect_bindings(&node.pat, &mut bindings);
        let (wildcard, ty) = match &node.pat {
            Pat::Wild(_) => (true, None),
            Pat::Type(pt) => (matches!(*pt.pat, Pat::Wild(_)), Some(render_type(&pt.ty))),
            _ => (false, None),
        };
        let kind = NodeKind::Let {
            bindings,
            wildcard,
            ty,
        };
        self.within(kind, span_of(node.span()), |l| visit::visit_local(l, node));
    }

    fn visit_expr_if(&mut self, node: &'ast syn::ExprIf) {
        self.within(NodeKind::If, span_of(node.span()), |l| {
            visit::visit_expr_if(l, node)
        });
    }

    fn visit_expr_match(&mut self, node: &'ast syn::ExprMatch) {
        self.within(NodeKind::Match, span_of(node.span()), |l| {
            visit::visit_expr_match(l, node)
        });
    }

    fn visit_expr_loop(&mut self, node: &'ast syn::ExprLoop) {
        let kind = NodeKind::Loop {
            kind: LoopKind::Loop,
            label: label_text(node.label.as_ref()),
            always_true: true,
        };
        self.within(kind, span_of(node.span()), |l| {
            visit::visit_expr_loop(l, node)
        });
    }

    fn visit_expr_while(&mut self, node: &'ast syn::ExprWhile) {
        let always_true = matches!(
            &*node.cond,
            Expr::Lit(syn::ExprLit { lit: Lit::Bool(b), .. }) if b.value
        );
        let kind = NodeKind::Loop {
            kind: LoopKind::While,
            label: label_text(node.label.as_ref()),
            always_true,
        };
        self.within(kind, span_of(node.span()), |l| {
            visit::visit_expr_while(l, node)
        });
    }

    fn visit_expr_for_loop(&mut self, node: &'ast syn::ExprForLoop) {
        let kind = NodeKind::Loop {
            kind: LoopKind::For,
            label: label_text(node.label.as_ref()),
            always_true: false,
        };
        self.within(kind, span_of(node.span()), |l| {
            visit::visit_expr_for_loop(l, node)
        });
    }

    fn visit_expr_break(&mut self, node: &'ast syn::ExprBreak) {
        let kind = NodeKind::Break {
            label: node.label.as_ref().map(|l| l.ident.to_string()),
        };
        self.within(kind, span_of(node.span()), |l| {
            visit::visit_expr_break(l, node)
        });
    }

    fn visit_expr_continue(&mut self, node: &'ast syn::ExprContinue) {
        self.leaf(NodeKind::Continue, span_of(node.span()));
    }

    fn visit_expr_return(&mut self, node: &'ast syn::ExprReturn) {
        self.within(NodeKind::Return, span_of(node.span()), |l| {
            visit::visit_expr_return(l, node)
        });
    }

    fn visit_expr_try(&mut self, node: &'ast syn::ExprTry) {
        self.within(NodeKind::Try, span_of(node.span()), |l| {
            visit::visit_expr_try(l, node)
        });
    }

    fn visit_expr_await(&mut self, node: &'ast syn::ExprAwait) {
        self.within(NodeKind::Await, span_of(node.span()), |l| {
            visit::visit_expr_await(l, node)
        });
    }

    fn visit_expr_call(&mut self, node: &'ast syn::ExprCall) {
        let path = match &*node.func {
            Expr::Path(p) => path_text(&p.path),
            _ => String::new(),
        };
        self.within(NodeKind::Call { path }, span_of(node.span()), |l| {
            visit::visit_expr_call(l, node)
        });
    }

    fn visit_expr_method_call(&mut self, node: &'ast syn::ExprMethodCall) {
        self.method_call(node, false);
    }

    fn visit_macro(&mut self, node: &'ast syn::Macro) {
        let kind = NodeKind::MacroCall {
            path: path_text(&node.path),
        };
        self.within(kind, span_of(node.span()), |l| {
            // Expression-like macro bodies (format!, assert!, vec![a, b]) are
            // lowered so their literals and calls are visible to detectors.
            if let Ok(args) =
                node.parse_body_with(Punctuated::<Expr, syn::Token![,]>::parse_terminated)
            {
                for arg in &args {
                    Visit::visit_expr(l, arg);
                }
            }
        });
    }

    fn visit_expr_lit(&mut self, node: &'ast syn::ExprLit) {
        let (kind, text) = lit_parts(&node.lit);
        self.leaf(NodeKind::Lit { kind, text }, span_of(node.span()));
    }

    fn visit_expr_unary(&mut self, node: &'ast syn::ExprUnary) {
        match (&node.op, &*node.expr) {
            (UnOp::Neg(_), Expr::Lit(lit)) if matches!(lit.lit, Lit::Int(_) | Lit::Float(_)) => {
                let (kind, text) = lit_parts(&lit.lit);
                let kind = NodeKind::Lit {
                    kind,
                    text: format!("-{}", text),
                };
                self.leaf(kind, span_of(node.span()));
            }
            (UnOp::Deref(_), _) => {
                self.within(NodeKind::Deref, span_of(node.span()), |l| {
                    visit::visit_expr_unary(l, node)
                });
            }
            (op, _) => {
                let op = match op {
                    UnOp::Not(_) => "!",
                    UnOp::Neg(_) => "-",
                    _ => "?",
                };
                let kind = NodeKind::Unary { op: op.to_string() };
                self.within(kind, span_of(node.span()), |l| {
                    visit::visit_expr_unary(l, node)
                });
            }
        }
    }

    fn visit_expr_path(&mut self, node: &'ast syn::ExprPath) {
        let kind = NodeKind::Path {
            path: path_text(&node.path),
        };
        self.leaf(kind, span_of(node.span()));
    }

    fn visit_expr_field(&mut self, node: &'ast syn::ExprField) {
        let member = match &node.member {
            syn::Member::Named(ident) => ident.to_string(),
            syn::Member::Unnamed(idx) => idx.index.to_string(),
        };
        self.within(NodeKind::Field { member }, span_of(node.span()), |l| {
            visit::visit_expr_field(l, node)
        });
    }

    fn visit_expr_index(&mut self, node: &'ast syn::ExprIndex) {
        self.within(NodeKind::Index, span_of(node.span()), |l| {
            visit::visit_expr_index(l, node)
        });
    }

    fn visit_expr_cast(&mut self, node: &'ast syn::ExprCast) {
        let kind = NodeKind::Cast {
            ty: render_type(&node.ty),
        };
        self.within(kind, span_of(node.span()), |l| {
            visit::visit_expr_cast(l, node)
        });
    }

    fn visit_expr_binary(&mut self, node: &'ast syn::ExprBinary) {
        let kind = NodeKind::Binary {
            op: binop_text(&node.op).to_string(),
        };
        self.within(kind, span_of(node.span()), |l| {
            visit::visit_expr_binary(l, node)
        });
    }

    fn visit_expr_assign(&mut self, node: &'ast syn::ExprAssign) {
        self.within(NodeKind::Assign, span_of(node.span()), |l| {
            visit::visit_expr_assign(l, node)
        });
    }

    fn visit_expr_reference(&mut self, node: &'ast syn::ExprReference) {
        let kind = NodeKind::Reference {
            mutable: node.mutability.is_some(),
        };
        self.within(kind, span_of(node.span()), |l| {
            visit::visit_expr_reference(l, node)
        });
    }

    fn visit_expr_closure(&mut self, node: &'ast syn::ExprClosure) {
        self.within(NodeKind::Closure, span_of(node.span()), |l| {
            visit::visit_expr_closure(l, node)
        });
    }

    fn visit_expr_struct(&mut self, node: &'ast syn::ExprStruct) {
        self.within(NodeKind::StructLit, span_of(node.span()), |l| {
            visit::visit_expr_struct(l, node)
        });
    }

    fn visit_expr_tuple(&mut self, node: &'ast syn::ExprTuple) {
        self.within(NodeKind::Tuple, span_of(node.span()), |l| {
            visit::visit_expr_tuple(l, node)
        });
    }

    fn visit_expr_array(&mut self, node: &'ast syn::ExprArray) {
        self.within(NodeKind::Array, span_of(node.span()), |l| {
            visit::visit_expr_array(l, node)
        });
    }

    fn visit_expr_range(&mut self, node: &'ast syn::ExprRange) {
        self.within(NodeKind::Range, span_of(node.span()), |l| {
            visit::visit_expr_range(l, node)
        });
    }
}

fn span_of(span: proc_macro2::Span) -> Span {
    span_between(span, span)
}

fn span_between(start: proc_macro2::Span, end: proc_macro2::Span) -> Span {
    let s = start.start();
    let e = end.end();
    let line = s.line.max(1);
    Span {
        line,
        column: s.column + 1,
        end_line: e.line.max(line),
    }
}

fn fn_decl(sig: &Signature, owner: Option<String>, is_pub: bool) -> FnDecl {
    let mut has_self = false;
    let mut params = Vec::new();
    for arg in &sig.inputs {
        match arg {
            FnArg::Receiver(_) => has_self = true,
            FnArg::Typed(pat_type) => {
                let mut names = Vec::new();
                collect_bindings(&pat_type.pat, &mut names);
                params.push(Param {
                    name: names.into_iter().next().unwrap_or_else(|| "_".to_string()),
                    ty: render_type(&pat_type.ty),
                });
            }
        }
    }
    FnDecl {
        name: sig.ident.to_string(),
        owner,
        is_pub,
        has_self,
        params,
    }
}

fn label_text(label: Option<&syn::Label>) -> Option<String> {
    label.map(|l| l.name.ident.to_string())
}

fn lit_parts(lit: &Lit) -> (LitKind, String) {
    match lit {
        Lit::Int(i) => (LitKind::Int, i.base10_digits().to_string()),
        Lit::Float(f) => (LitKind::Float, f.base10_digits().to_string()),
        Lit::Str(s) => (LitKind::Str, s.value()),
        Lit::Char(c) => (LitKind::Char, c.value().to_string()),
        Lit::Bool(b) => (LitKind::Bool, b.value.to_string()),
        _ => (LitKind::Other, String::new()),
    }
}

fn binop_text(op: &BinOp) -> &'static str {
    match op {
        BinOp::Add(_) => "+",
        BinOp::Sub(_) => "-",
        BinOp::Mul(_) => "*",
        BinOp::Div(_) => "/",
        BinOp::Rem(_) => "%",
        BinOp::And(_) => "&&",
        BinOp::Or(_) => "||",
        BinOp::BitXor(_) => "^",
        BinOp::BitAnd(_) => "&",
        BinOp::BitOr(_) => "|",
        BinOp::Shl(_) => "<<",
        BinOp::Shr(_) => ">>",
        BinOp::Eq(_) => "==",
        BinOp::Lt(_) => "<",
        BinOp::Le(_) => "<=",
        BinOp::Ne(_) => "!=",
        BinOp::Ge(_) => ">=",
        BinOp::Gt(_) => ">",
        BinOp::AddAssign(_) => "+=",
        BinOp::SubAssign(_) => "-=",
        BinOp::MulAssign(_) => "*=",
        BinOp::DivAssign(_) => "/=",
        _ => "op=",
    }
}

/// Name of a simple receiver expression (`x`, `self.conn`)
fn expr_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Path(p) => Some(path_text(&p.path)),
        Expr::Field(f) => {
            let base = expr_name(&f.base)?;
            let member = match &f.member {
                syn::Member::Named(ident) => ident.to_string(),
                syn::Member::Unnamed(idx) => idx.index.to_string(),
            };
            Some(format!("{}.{}", base, member))
        }
        Expr::Reference(r) => expr_name(&r.expr),
        Expr::Paren(p) => expr_name(&p.expr),
        _ => None,
    }
}

fn path_text(path: &syn::Path) -> String {
    path.segments
        .iter()
        .map(|s| s.ident.to_string())
        .collect::<Vec<_>>()
        .join("::")
}

fn path_with_generics(path: &syn::Path) -> String {
    path.segments
        .iter()
        .map(|seg| match &seg.arguments {
            PathArguments::AngleBracketed(args) => {
                let inner = args
                    .args
                    .iter()
                    .map(|arg| match arg {
                        GenericArgument::Type(ty) => render_type(ty),
                        GenericArgument::Lifetime(lt) => format!("'{}", lt.ident),
                        _ => "_".to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}<{}>", seg.ident, inner)
            }
            _ => seg.ident.to_string(),
        })
        .collect::<Vec<_>>()
        .join("::")
}

fn bound_text(bound: &TypeParamBound) -> String {
    match bound {
        TypeParamBound::Trait(t) => path_with_generics(&t.path),
        TypeParamBound::Lifetime(lt) => format!("'{}", lt.ident),
        _ => "_".to_string(),
    }
}

/// Normalized textual rendering of a type
pub(crate) fn render_type(ty: &Type) -> String {
    match ty {
        Type::Path(p) => path_with_generics(&p.path),
        Type::Reference(r) => {
            let mutability = if r.mutability.is_some() { "mut " } else { "" };
            format!("&{}{}", mutability, render_type(&r.elem))
        }
        Type::Ptr(p) => {
            let mutability = if p.mutability.is_some() { "mut" } else { "const" };
            format!("*{} {}", mutability, render_type(&p.elem))
        }
        Type::Slice(s) => format!("[{}]", render_type(&s.elem)),
        Type::Array(a) => format!("[{}; _]", render_type(&a.elem)),
        Type::Tuple(t) => format!(
            "({})",
            t.elems.iter().map(render_type).collect::<Vec<_>>().join(", ")
        ),
        Type::TraitObject(t) => format!(
            "dyn {}",
            t.bounds.iter().map(bound_text).collect::<Vec<_>>().join(" + ")
        ),
        Type::ImplTrait(t) => format!(
            "impl {}",
            t.bounds.iter().map(bound_text).collect::<Vec<_>>().join(" + ")
        ),
        Type::Paren(p) => render_type(&p.elem),
        Type::Group(g) => render_type(&g.elem),
        Type::Never(_) => "!".to_string(),
        _ => "_".to_string(),
    }
}

/// Last path segment of a type, without generics (`Vec<T>` -> `Vec`)
fn type_base_name(ty: &Type) -> String {
    match ty {
        Type::Path(p) => p
            .path
            .segments
            .last()
            .map(|s| s.ident.to_string())
            .unwrap_or_default(),
        Type::Reference(r) => type_base_name(&r.elem),
        Type::Paren(p) => type_base_name(&p.elem),
        Type::Group(g) => type_base_name(&g.elem),
        other => render_type(other),
    }
}

fn collect_bindings(pat: &Pat, out: &mut Vec<String>) {
    match pat {
        Pat::Ident(p) => {
            out.push(p.ident.to_string());
            if let Some((_, sub)) = &p.subpat {
                collect_bindings(sub, out);
            }
        }
        Pat::Type(p) => collect_bindings(&p.pat, out),
        Pat::Tuple(t) => t.elems.iter().for_each(|e| collect_bindings(e, out)),
        Pat::TupleStruct(t) => t.elems.iter().for_each(|e| collect_bindings(e, out)),
        Pat::Struct(s) => s.fields.iter().for_each(|f| collect_bindings(&f.pat, out)),
        Pat::Reference(r) => collect_bindings(&r.pat, out),
        Pat::Slice(s) => s.elems.iter().for_each(|e| collect_bindings(e, out)),
        Pat::Or(o) => {
            if let Some(first) = o.cases.first() {
                collect_bindings(first, out);
            }
        }
        Pat::Paren(p) => collect_bindings(&p.pat, out),
        _ => {}
    }
}

fn collect_use_paths(tree: &UseTree, prefix: &str, out: &mut Vec<String>) {
    let join = |name: &str| {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}::{}", prefix, name)
        }
    };
    match tree {
        UseTree::Path(p) => collect_use_paths(&p.tree, &join(&p.ident.to_string()), out),
        UseTree::Name(n) => out.push(join(&n.ident.to_string())),
        UseTree::Rename(r) => out.push(join(&r.ident.to_string())),
        UseTree::Glob(_) => out.push(join("*")),
        UseTree::Group(g) => g
            .items
            .iter()
            .for_each(|item| collect_use_paths(item, prefix, out)),
    }
}

/// Number of `=>` rules at the top level of a `macro_rules!` body
fn count_macro_arms(tokens: &TokenStream) -> usize {
    let mut arms = 0;
    let mut previous_eq_joint = false;
    for tt in tokens.clone() {
        match tt {
            TokenTree::Punct(p) if p.as_char() == '>' && previous_eq_joint => {
                arms += 1;
                previous_eq_joint = false;
            }
            TokenTree::Punct(p) => {
                previous_eq_joint = p.as_char() == '=' && p.spacing() == Spacing::Joint;
            }
            _ => previous_eq_joint = false,
        }
    }
    arms
}
