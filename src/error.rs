//! Error taxonomy
//!
//! Each module owns its `thiserror` enum ([`ConfigError`], [`ParseError`],
//! [`DetectorError`], [`ClusterError`]). Only `ConfigError` ever escapes
//! `orchestrate`; everything else is recorded in the audit trail as an
//! [`AuditIssue`].

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

pub use crate::config::ConfigError;
pub use crate::detectors::DetectorError;
pub use crate::duplication::ClusterError;
pub use crate::source::ParseError;

/// Category of a non-fatal problem recorded during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    ParseError,
    PhaseError,
    Timeout,
    ResourceExhaustion,
    ConfigurationError,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::ParseError => write!(f, "parse error"),
            IssueKind::PhaseError => write!(f, "phase error"),
            IssueKind::Timeout => write!(f, "timeout"),
            IssueKind::ResourceExhaustion => write!(f, "resource exhaustion"),
            IssueKind::ConfigurationError => write!(f, "configuration error"),
        }
    }
}

/// One entry in a phase's issue list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditIssue {
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detector: Option<String>,
    pub message: String,
}

impl AuditIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            file: None,
            detector: None,
            message: message.into(),
        }
    }

    pub fn in_file(mut self, file: &Path) -> Self {
        self.file = Some(file.to_path_buf());
        self
    }

    pub fn from_detector(mut self, detector: &str) -> Self {
        self.detector = Some(detector.to_string());
        self
    }
}

impl fmt::Display for AuditIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(file) = &self.file {
            write!(f, " in {}", file.display())?;
        }
        if let Some(detector) = &self.detector {
            write!(f, " [{}]", detector)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Render a panic payload captured by `catch_unwind`
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_display() {
        let issue = AuditIssue::new(IssueKind::PhaseError, "boom")
            .in_file(Path::new("src/a.rs"))
            .from_detector("position");
        assert_eq!(issue.to_string(), "phase error in src/a.rs [position]: boom");
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("exploded")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "exploded");

        let payload = std::panic::catch_unwind(|| panic!("{} items", 3)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "3 items");
    }
}
