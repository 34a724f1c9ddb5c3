//! Per-file index derived from the syntax arena
//!
//! The index is computed once per [`SyntaxTree`] and cached alongside it, so
//! detectors can look up functions, types and module-level state directly.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::{NodeId, NodeKind, Param, StructuralSignature, SyntaxTree, signature_of};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub node: NodeId,
    pub name: String,
    pub owner: Option<String>,
    pub qualified_name: String,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub is_pub: bool,
    pub has_self: bool,
    pub params: Vec<Param>,
    pub signature: StructuralSignature,
}

impl FunctionInfo {
    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.line) + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Struct,
    Enum,
    Trait,
    /// Only impl blocks appear in this file
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: Option<String>,
    pub ty: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub name: String,
    pub kind: TypeKind,
    pub line: usize,
    pub column: usize,
    pub fields: Vec<FieldInfo>,
    pub variants: Vec<String>,
    /// Methods across every impl block for this type in the file
    pub methods: Vec<String>,
    pub trait_impls: Vec<String>,
}

impl TypeInfo {
    pub fn member_count(&self) -> usize {
        self.fields.len() + self.variants.len() + self.methods.len()
    }

    pub fn has_drop(&self) -> bool {
        self.trait_impls.iter().any(|t| t == "Drop")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticInfo {
    pub name: String,
    pub ty: String,
    pub mutable: bool,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroDefInfo {
    pub name: String,
    pub arms: usize,
    pub line: usize,
    pub column: usize,
}

/// A `lazy_static!` or `thread_local!` invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingletonInfo {
    pub macro_name: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileIndex {
    pub functions: Vec<FunctionInfo>,
    pub types: Vec<TypeInfo>,
    pub imports: Vec<String>,
    pub statics: Vec<StaticInfo>,
    pub macros: Vec<MacroDefInfo>,
    pub singletons: Vec<SingletonInfo>,
    /// Names of functions, types, fields and variants defined here
    pub defined_names: BTreeSet<String>,
}

impl FileIndex {
    pub fn build(tree: &SyntaxTree) -> Self {
        let mut index = FileIndex::default();
        let mut type_slots: HashMap<String, usize> = HashMap::new();

        for (id, node) in tree.iter() {
            let span = node.span;
            match &node.kind {
                NodeKind::Function(decl) => {
                    index.defined_names.insert(decl.name.clone());
                    index.functions.push(FunctionInfo {
                        node: id,
                        name: decl.name.clone(),
                        owner: decl.owner.clone(),
                        qualified_name: decl.qualified_name(),
                        line: span.line,
                        column: span.column,
                        end_line: span.end_line,
                        is_pub: decl.is_pub,
                        has_self: decl.has_self,
                        params: decl.params.clone(),
                        signature: signature_of(tree, id),
                    });
                }
                NodeKind::Struct { name, fields } => {
                    let slot = index.type_slot(&mut type_slots, name, TypeKind::Struct, span.line, span.column);
                    for field in fields {
                        if let Some(field_name) = &field.name {
                            index.defined_names.insert(field_name.clone());
                        }
                        index.types[slot].fields.push(FieldInfo {
                            name: field.name.clone(),
                            ty: field.ty.clone(),
                            line: field.line,
                            column: field.column,
                        });
                    }
                }
                NodeKind::Enum { name, variants } => {
                    let slot = index.type_slot(&mut type_slots, name, TypeKind::Enum, span.line, span.column);
                    index.defined_names.extend(variants.iter().cloned());
                    index.types[slot].variants.extend(variants.iter().cloned());
                }
                NodeKind::Trait { name } => {
                    index.type_slot(&mut type_slots, name, TypeKind::Trait, span.line, span.column);
                }
                NodeKind::Impl { self_ty, trait_name } => {
                    let slot = index.type_slot(&mut type_slots, self_ty, TypeKind::External, span.line, span.column);
                    if let Some(trait_name) = trait_name {
                        index.types[slot].trait_impls.push(trait_name.clone());
                    }
                    let methods = tree.children(id).iter().filter_map(|&c| match tree.kind(c) {
                        NodeKind::Function(decl) => Some(decl.name.clone()),
                        _ => None,
                    });
                    index.types[slot].methods.extend(methods);
                }
                NodeKind::Static { name, ty, mutable } => index.statics.push(StaticInfo {
                    name: name.clone(),
                    ty: ty.clone(),
                    mutable: *mutable,
                    line: span.line,
                    column: span.column,
                }),
                NodeKind::MacroRules { name, arms } => index.macros.push(MacroDefInfo {
                    name: name.clone(),
                    arms: *arms,
                    line: span.line,
                    column: span.column,
                }),
                NodeKind::MacroCall { path } => {
                    let last = path.rsplit("::").next().unwrap_or(path);
                    if last == "lazy_static" || last == "thread_local" {
                        index.singletons.push(SingletonInfo {
                            macro_name: last.to_string(),
                            line: span.line,
                            column: span.column,
                        });
                    }
                }
                NodeKind::Use { paths } => index.imports.extend(paths.iter().cloned()),
                _ => {}
            }
        }

        index
    }

    /// Slot for a type, creating it on first sight. A later definition
    /// replaces the location recorded by an earlier impl block.
    fn type_slot(
        &mut self,
        slots: &mut HashMap<String, usize>,
        name: &str,
        kind: TypeKind,
        line: usize,
        column: usize,
    ) -> usize {
        if let Some(&slot) = slots.get(name) {
            let info = &mut self.types[slot];
            if info.kind == TypeKind::External && kind != TypeKind::External {
                info.kind = kind;
                info.line = line;
                info.column = column;
            }
            return slot;
        }
        if kind != TypeKind::External {
            self.defined_names.insert(name.to_string());
        }
        self.types.push(TypeInfo {
            name: name.to_string(),
            kind,
            line,
            column,
            fields: Vec::new(),
            variants: Vec::new(),
            methods: Vec::new(),
            trait_impls: Vec::new(),
        });
        slots.insert(name.to_string(), self.types.len() - 1);
        self.types.len() - 1
    }

    pub fn type_named(&self, name: &str) -> Option<&TypeInfo> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn function_at(&self, node: NodeId) -> Option<&FunctionInfo> {
        self.functions.iter().find(|f| f.node == node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::lower_file;

    fn index(code: &str) -> FileIndex {
        FileIndex::build(&lower_file(&syn::parse_file(code).unwrap()))
    }

    #[test]
    fn test_members_span_impl_blocks() {
        let idx = index(
            r#"
impl Widget { fn a(&self) {} }
struct Widget { x: u32, y: u32 }
impl Widget { fn b(&self) {} fn c(&self) {} }
impl Drop for Widget { fn drop(&mut self) {} }
"#,
        );
        let widget = idx.type_named("Widget").unwrap();
        assert_eq!(widget.kind, TypeKind::Struct);
        assert_eq!(widget.line, 3);
        assert_eq!(widget.methods, vec!["a", "b", "c", "drop"]);
        assert_eq!(widget.member_count(), 6);
        assert!(widget.has_drop());
    }

    #[test]
    fn test_module_level_state() {
        let idx = index(
            r#"
use std::sync::Mutex;
static mut COUNT: u32 = 0;
static CACHE: Mutex<Vec<u8>> = Mutex::new(Vec::new());
thread_local! { static LOCAL: u32 = 0; }
macro_rules! m { () => {}; }
"#,
        );
        assert_eq!(idx.imports, vec!["std::sync::Mutex"]);
        assert_eq!(idx.statics.len(), 2);
        assert!(idx.statics[0].mutable);
        assert_eq!(idx.statics[1].ty, "Mutex<Vec<u8>>");
        assert_eq!(idx.singletons.len(), 1);
        assert_eq!(idx.macros[0].arms, 1);
    }

    #[test]
    fn test_defined_names() {
        let idx = index("struct Account { balance: u64 } enum Mode { Fast } fn transfer() {}");
        for name in ["Account", "balance", "Mode", "Fast", "transfer"] {
            assert!(idx.defined_names.contains(name), "missing {}", name);
        }
    }
}
