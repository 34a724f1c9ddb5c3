//! Source units and the per-detector analysis context

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::Policy;
use crate::syntax::{FileIndex, SyntaxTree, lower_file};

/// Errors that can occur while reading or parsing one file
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path} at line {line}: {message}")]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

impl ParseError {
    pub fn path(&self) -> &Path {
        match self {
            ParseError::Io { path, .. } | ParseError::Syntax { path, .. } => path,
        }
    }
}

/// SHA-256 of raw file bytes, lowercase hex
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// One parsed file. Immutable: a changed file produces a new unit.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    path: PathBuf,
    content_hash: String,
    text: String,
    tree: SyntaxTree,
    index: FileIndex,
}

impl SourceUnit {
    /// Parse `text` as the contents of `path`
    pub fn parse(path: impl Into<PathBuf>, text: String) -> Result<Self, ParseError> {
        let path = path.into();
        let file = syn::parse_file(&text).map_err(|e| ParseError::Syntax {
            path: path.clone(),
            line: e.span().start().line,
            message: e.to_string(),
        })?;
        let tree = lower_file(&file);
        let index = FileIndex::build(&tree);
        Ok(Self {
            content_hash: content_hash(text.as_bytes()),
            path,
            text,
            tree,
            index,
        })
    }

    /// Read and parse a file from disk
    pub fn read(path: &Path) -> Result<Self, ParseError> {
        let text = fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, text)
    }

    /// Reassemble a unit from a stored tree and index
    pub fn from_parts(
        path: PathBuf,
        text: String,
        content_hash: String,
        tree: SyntaxTree,
        index: FileIndex,
    ) -> Self {
        Self {
            path,
            content_hash,
            text,
            tree,
            index,
        }
    }

    /// The same parsed content seen under another path
    pub fn with_path(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tree(&self) -> &SyntaxTree {
        &self.tree
    }

    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    pub fn line_count(&self) -> usize {
        self.text.lines().count()
    }

    /// Approximate resident size used for cache accounting
    pub fn size_bytes(&self) -> usize {
        let nodes = self.tree.len() * std::mem::size_of::<crate::syntax::Node>();
        let signatures: usize = self
            .index
            .functions
            .iter()
            .map(|f| f.signature.tokens.len() * 8 + f.qualified_name.len())
            .sum();
        self.text.len() + nodes + signatures + self.path.as_os_str().len()
    }
}

/// Read-only view handed to every detector
#[derive(Debug, Clone, Copy)]
pub struct AnalysisContext<'a> {
    unit: &'a SourceUnit,
    policy: &'a Policy,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(unit: &'a SourceUnit, policy: &'a Policy) -> Self {
        Self { unit, policy }
    }

    pub fn unit(&self) -> &'a SourceUnit {
        self.unit
    }

    pub fn policy(&self) -> &'a Policy {
        self.policy
    }

    pub fn path(&self) -> &'a Path {
        self.unit.path()
    }

    pub fn tree(&self) -> &'a SyntaxTree {
        self.unit.tree()
    }

    pub fn index(&self) -> &'a FileIndex {
        self.unit.index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_computes_hash_and_index() {
        let unit = SourceUnit::parse("a.rs", "fn a() {}\nfn b() {}\n".to_string()).unwrap();
        assert_eq!(unit.content_hash().len(), 64);
        assert_eq!(unit.index().functions.len(), 2);
        assert_eq!(unit.line_count(), 2);
        assert!(unit.size_bytes() > unit.text().len());
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = SourceUnit::parse("bad.rs", "fn ok() {}\nfn broken( {\n".to_string()).unwrap_err();
        match err {
            ParseError::Syntax { path, line, .. } => {
                assert_eq!(path, PathBuf::from("bad.rs"));
                assert!(line >= 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_read_missing_file() {
        let err = SourceUnit::read(Path::new("/definitely/not/here.rs")).unwrap_err();
        assert!(matches!(err, ParseError::Io { .. }));
    }

    #[test]
    fn test_same_content_same_hash() {
        assert_eq!(content_hash(b"fn a() {}"), content_hash(b"fn a() {}"));
        assert_ne!(content_hash(b"fn a() {}"), content_hash(b"fn b() {}"));
    }
}
