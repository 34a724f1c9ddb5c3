//! Policy configuration
//!
//! A [`Policy`] carries every tunable of a run: detector thresholds, the
//! duplication and compliance settings, file filtering, resource limits, cache
//! and metrics settings, plus budgets, waivers and severity floors.
//!
//! Policies come from a named preset or a `.connascence.toml` file. A file may
//! name a `preset` to start from; its tables are overlaid on that preset.
//!
//! ## Configuration File Format
//!
//! ```toml
//! # .connascence.toml
//! preset = "strict"
//!
//! [thresholds]
//! max_positional_params = 4
//! excluded_literals = ["0", "1", "-1", "2", "100"]
//!
//! [duplication]
//! min_lines = 6
//! similarity_threshold = 0.85
//!
//! [analysis]
//! exclude = ["src/generated/*"]
//! extra_excluded_dirs = ["vendor"]
//! workers = 4
//!
//! [budgets]
//! meaning = 8
//! total = 30
//!
//! [severity_thresholds]
//! name = "medium"
//!
//! waivers = ["3f1a9c0de4b27781"]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use glob::Pattern;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::violation::{AnomalyKind, ConnascenceType, Severity, ViolationKind};

/// Names searched (upward from the target) for a policy file
pub const CONFIG_FILE_NAMES: [&str; 2] = [".connascence.toml", "connascence.toml"];

/// Directory segments never descended into
pub const DEFAULT_EXCLUDED_DIRS: [&str; 15] = [
    "target",
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "venv",
    ".venv",
    "env",
    "__pycache__",
    "build",
    "dist",
    ".tox",
    ".cache",
    ".idea",
    ".vscode",
];

const TEST_DIR_SEGMENTS: [&str; 3] = ["tests", "test", "benches"];

/// Errors that can occur when loading or validating a policy
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read policy file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse policy file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid glob pattern: {0}")]
    PatternError(String),

    #[error("Unknown policy preset '{name}' (available: {available})")]
    UnknownPreset { name: String, available: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Detector thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Positional parameters allowed before Connascence of Position is flagged
    pub max_positional_params: usize,
    /// Members (fields + variants + methods) allowed per type
    pub god_object_members: usize,
    /// Occurrences of one literal before Connascence of Meaning is flagged
    pub magic_literal_repeats: usize,
    /// Literal spellings never treated as magic
    pub excluded_literals: Vec<String>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_positional_params: 3,
            god_object_members: 20,
            magic_literal_repeats: 3,
            excluded_literals: default_excluded_literals(),
        }
    }
}

fn default_excluded_literals() -> Vec<String> {
    [
        "0", "1", "-1", "2", "true", "false", "200", "201", "204", "301", "302", "400", "401",
        "403", "404", "500",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Duplication clustering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicationPolicy {
    /// Minimum fragment size in lines
    pub min_lines: usize,
    /// Pairwise similarity required to merge two fragments
    pub similarity_threshold: f64,
    /// Minimum members for a component to become a cluster
    pub min_cluster_size: usize,
}

impl Default for DuplicationPolicy {
    fn default() -> Self {
        Self {
            min_lines: 5,
            similarity_threshold: 0.8,
            min_cluster_size: 2,
        }
    }
}

/// Safety-rule settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompliancePolicy {
    pub enabled: bool,
    pub max_function_lines: usize,
    /// Functions at or below this length are exempt from the assertion rule
    pub assertion_min_lines: usize,
    pub min_assertions: usize,
    pub max_macro_arms: usize,
}

impl Default for CompliancePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_function_lines: 60,
            assertion_min_lines: 10,
            min_assertions: 2,
            max_macro_arms: 3,
        }
    }
}

/// File selection and resource limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisPolicy {
    /// Skip test directories and test-named files
    pub exclude_tests: bool,
    /// Glob patterns (relative to the scanned root) to skip
    pub exclude: Vec<String>,
    /// Directory segments to skip in addition to the built-in list
    pub extra_excluded_dirs: Vec<String>,
    /// Worker threads; defaults to available parallelism
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Soft per-file time budget
    pub file_timeout_ms: u64,
    /// Memory above which the cache is asked to evict
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft_memory_ceiling: Option<usize>,
    /// Memory above which un-started files are abandoned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hard_memory_ceiling: Option<usize>,
}

impl Default for AnalysisPolicy {
    fn default() -> Self {
        Self {
            exclude_tests: true,
            exclude: Vec::new(),
            extra_excluded_dirs: Vec::new(),
            workers: None,
            file_timeout_ms: 10_000,
            soft_memory_ceiling: None,
            hard_memory_ceiling: None,
        }
    }
}

impl AnalysisPolicy {
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Parse cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    /// Optional on-disk tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// In-memory ceiling in bytes
    pub memory_ceiling: usize,
    /// Files parsed ahead of a run when history exists
    pub warm_budget: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            directory: None,
            memory_ceiling: 256 * 1024 * 1024,
            warm_budget: 15,
        }
    }
}

/// History and trend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsPolicy {
    pub history_size: usize,
    pub trend_window: usize,
    pub quality_trend_threshold: f64,
    pub violation_trend_threshold: f64,
    pub baseline_significant: f64,
    pub baseline_minor: f64,
}

impl Default for MetricsPolicy {
    fn default() -> Self {
        Self {
            history_size: 20,
            trend_window: 5,
            quality_trend_threshold: 0.05,
            violation_trend_threshold: 5.0,
            baseline_significant: 0.1,
            baseline_minor: 0.02,
        }
    }
}

/// Complete policy for one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub name: String,
    pub thresholds: Thresholds,
    pub duplication: DuplicationPolicy,
    pub compliance: CompliancePolicy,
    pub analysis: AnalysisPolicy,
    pub cache: CachePolicy,
    pub metrics: MetricsPolicy,
    /// Maximum violations per type key (`meaning`, `position`, ..., `total`)
    pub budgets: BTreeMap<String, usize>,
    /// Violation ids removed from the report
    pub waivers: Vec<String>,
    /// Per-type minimum reported severity
    pub severity_thresholds: BTreeMap<String, Severity>,
}

impl Default for Policy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Canonical preset names
pub const PRESETS: [&str; 4] = ["standard", "strict", "nasa-compliance", "lenient"];

/// Resolve a preset name or legacy alias to its canonical name
pub fn resolve_preset_name(name: &str) -> Option<&'static str> {
    match name.trim().to_lowercase().replace('_', "-").as_str() {
        "standard" | "default" | "service-defaults" | "modern-general" => Some("standard"),
        "strict" | "strict-core" | "general-safety-strict" => Some("strict"),
        "nasa-compliance" | "nasa-jpl-pot10" | "safety-level-1" => Some("nasa-compliance"),
        "lenient" | "experimental" | "safety-level-3" => Some("lenient"),
        _ => None,
    }
}

impl Policy {
    fn standard() -> Self {
        Self {
            name: "standard".to_string(),
            thresholds: Thresholds::default(),
            duplication: DuplicationPolicy::default(),
            compliance: CompliancePolicy::default(),
            analysis: AnalysisPolicy::default(),
            cache: CachePolicy::default(),
            metrics: MetricsPolicy::default(),
            budgets: budgets(8, 5, 30),
            waivers: Vec::new(),
            severity_thresholds: BTreeMap::new(),
        }
    }

    /// Look up a named preset (legacy aliases accepted)
    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        let canonical = resolve_preset_name(name).ok_or_else(|| ConfigError::UnknownPreset {
            name: name.to_string(),
            available: PRESETS.join(", "),
        })?;

        let mut policy = Self::standard();
        policy.name = canonical.to_string();
        match canonical {
            "strict" | "nasa-compliance" => {
                policy.thresholds.max_positional_params = 2;
                policy.thresholds.god_object_members = 15;
                policy.budgets = budgets(3, 2, 10);
            }
            "lenient" => {
                policy.thresholds.max_positional_params = 4;
                policy.thresholds.god_object_members = 35;
                policy.budgets = budgets(15, 8, 50);
            }
            _ => {}
        }
        Ok(policy)
    }

    /// Parse a policy file, overlaying it on the preset it names
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let overlay: toml::Table = toml::from_str(content)?;
        let preset_name = match overlay.get("preset") {
            Some(toml::Value::String(name)) => name.clone(),
            Some(_) => return Err(ConfigError::invalid("preset", "must be a string")),
            None => "standard".to_string(),
        };
        let base = Self::preset(&preset_name)?;

        let mut merged = match toml::Value::try_from(&base) {
            Ok(toml::Value::Table(table)) => table,
            Ok(_) => return Err(ConfigError::invalid("preset", "did not serialize to a table")),
            Err(e) => return Err(ConfigError::invalid("preset", e.to_string())),
        };
        for (key, value) in overlay {
            if key == "preset" {
                continue;
            }
            merge_value(&mut merged, key, value);
        }

        let policy: Policy = toml::Value::Table(merged).try_into()?;
        Ok(policy)
    }

    /// Check every value before any analysis phase runs
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thresholds.max_positional_params == 0 {
            return Err(ConfigError::invalid(
                "thresholds.max_positional_params",
                "must be at least 1",
            ));
        }
        if self.thresholds.magic_literal_repeats < 2 {
            return Err(ConfigError::invalid(
                "thresholds.magic_literal_repeats",
                "must be at least 2",
            ));
        }
        let threshold = self.duplication.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::invalid(
                "duplication.similarity_threshold",
                format!("must be in (0, 1], got {}", threshold),
            ));
        }
        if self.duplication.min_cluster_size < 2 {
            return Err(ConfigError::invalid(
                "duplication.min_cluster_size",
                "must be at least 2",
            ));
        }
        if self.duplication.min_lines == 0 {
            return Err(ConfigError::invalid("duplication.min_lines", "must be at least 1"));
        }
        if self.compliance.max_function_lines == 0 {
            return Err(ConfigError::invalid(
                "compliance.max_function_lines",
                "must be at least 1",
            ));
        }
        if self.analysis.workers == Some(0) {
            return Err(ConfigError::invalid("analysis.workers", "must be at least 1"));
        }
        if self.analysis.file_timeout_ms == 0 {
            return Err(ConfigError::invalid("analysis.file_timeout_ms", "must be positive"));
        }
        if let (Some(soft), Some(hard)) = (
            self.analysis.soft_memory_ceiling,
            self.analysis.hard_memory_ceiling,
        ) && soft > hard
        {
            return Err(ConfigError::invalid(
                "analysis.soft_memory_ceiling",
                "must not exceed hard_memory_ceiling",
            ));
        }
        if self.cache.memory_ceiling == 0 {
            return Err(ConfigError::invalid("cache.memory_ceiling", "must be positive"));
        }
        if self.metrics.history_size == 0 || self.metrics.trend_window == 0 {
            return Err(ConfigError::invalid(
                "metrics",
                "history_size and trend_window must be positive",
            ));
        }
        if self.metrics.baseline_minor > self.metrics.baseline_significant {
            return Err(ConfigError::invalid(
                "metrics.baseline_minor",
                "must not exceed baseline_significant",
            ));
        }
        for key in self.budgets.keys() {
            if key != "total" && normalize_kind_key(key).is_none() {
                return Err(ConfigError::invalid("budgets", format!("unknown type '{}'", key)));
            }
        }
        for key in self.severity_thresholds.keys() {
            if normalize_kind_key(key).is_none() {
                return Err(ConfigError::invalid(
                    "severity_thresholds",
                    format!("unknown type '{}'", key),
                ));
            }
        }
        FileFilter::new(&self.analysis)?;
        Ok(())
    }

    /// Configured budget for a violation kind
    pub fn budget_for(&self, kind: ViolationKind) -> Option<usize> {
        let wanted = kind_key(kind);
        self.budgets
            .iter()
            .find(|(key, _)| normalize_kind_key(key).as_deref() == Some(wanted.as_str()))
            .map(|(_, limit)| *limit)
    }

    /// Minimum reported severity for a violation kind
    pub fn severity_floor(&self, kind: ViolationKind) -> Option<Severity> {
        let wanted = kind_key(kind);
        self.severity_thresholds
            .iter()
            .find(|(key, _)| normalize_kind_key(key).as_deref() == Some(wanted.as_str()))
            .map(|(_, floor)| *floor)
    }

    pub fn is_waived(&self, violation_id: &str) -> bool {
        self.waivers.iter().any(|w| w == violation_id)
    }
}

fn budgets(meaning: usize, position: usize, total: usize) -> BTreeMap<String, usize> {
    BTreeMap::from([
        ("meaning".to_string(), meaning),
        ("position".to_string(), position),
        ("total".to_string(), total),
    ])
}

fn merge_value(target: &mut toml::Table, key: String, value: toml::Value) {
    match (target.get_mut(&key), value) {
        (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
            for (k, v) in incoming {
                merge_value(existing, k, v);
            }
        }
        (_, value) => {
            target.insert(key, value);
        }
    }
}

/// Key used in `budgets` / `severity_thresholds` for a violation kind
pub fn kind_key(kind: ViolationKind) -> String {
    match kind {
        ViolationKind::Connascence(t) => t.id().to_lowercase(),
        ViolationKind::Compliance(_) => "compliance".to_string(),
        ViolationKind::StructuralAnomaly(AnomalyKind::GodObject) => "god_object".to_string(),
        ViolationKind::StructuralAnomaly(AnomalyKind::DuplicateCluster) => {
            "duplication".to_string()
        }
    }
}

/// Normalize a user-supplied type key (`CoM`, `Meaning`, `god-object`, ...)
pub fn normalize_kind_key(key: &str) -> Option<String> {
    if let Some(t) = ConnascenceType::parse(key) {
        return Some(t.id().to_lowercase());
    }
    match key.trim().to_lowercase().replace('-', "_").as_str() {
        "compliance" => Some("compliance".to_string()),
        "god_object" => Some("god_object".to_string()),
        "duplication" | "duplicate_cluster" => Some("duplication".to_string()),
        _ => None,
    }
}

/// Segment-anchored file filter compiled from [`AnalysisPolicy`]
#[derive(Debug, Clone)]
pub struct FileFilter {
    exclude_tests: bool,
    excluded_dirs: BTreeSet<String>,
    patterns: Vec<Pattern>,
}

impl FileFilter {
    pub fn new(analysis: &AnalysisPolicy) -> Result<Self, ConfigError> {
        let patterns = analysis
            .exclude
            .iter()
            .map(|p| Pattern::new(p).map_err(|e| ConfigError::PatternError(format!("{}: {}", p, e))))
            .collect::<Result<Vec<_>, _>>()?;

        let excluded_dirs = DEFAULT_EXCLUDED_DIRS
            .iter()
            .map(|s| s.to_string())
            .chain(analysis.extra_excluded_dirs.iter().cloned())
            .collect();

        Ok(Self {
            exclude_tests: analysis.exclude_tests,
            excluded_dirs,
            patterns,
        })
    }

    /// Whether a directory (relative to the scanned root) may be descended into
    pub fn allows_dir(&self, relative: &Path) -> bool {
        relative.components().all(|c| match c {
            Component::Normal(segment) => {
                let segment = segment.to_string_lossy();
                !self.excluded_dirs.contains(segment.as_ref())
                    && !(self.exclude_tests && TEST_DIR_SEGMENTS.contains(&segment.as_ref()))
            }
            _ => true,
        })
    }

    /// Whether a file (relative to the scanned root) should be analyzed
    pub fn allows_file(&self, relative: &Path) -> bool {
        if relative.extension().is_none_or(|ext| ext != "rs") {
            return false;
        }
        if let Some(parent) = relative.parent()
            && !self.allows_dir(parent)
        {
            return false;
        }
        if self.exclude_tests
            && let Some(name) = relative.file_name().map(|n| n.to_string_lossy())
            && is_test_file_name(&name)
        {
            return false;
        }
        let as_str = relative.to_string_lossy().replace('\\', "/");
        !self.patterns.iter().any(|p| p.matches(&as_str))
    }
}

fn is_test_file_name(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(".rs") else {
        return false;
    };
    stem == "tests" || stem.starts_with("test_") || stem.ends_with("_test") || stem.ends_with("_tests")
}

/// Load a policy from a preset name, an explicit file, or the nearest
/// `.connascence.toml` above `target`
pub fn load_policy(selector: Option<&str>, target: &Path) -> Result<Policy, ConfigError> {
    match selector {
        Some(sel) if Path::new(sel).is_file() => load_policy_file(Path::new(sel)),
        Some(sel) => Policy::preset(sel),
        None => match find_config_file(target) {
            Some(path) => load_policy_file(&path),
            None => Ok(Policy::default()),
        },
    }
}

pub fn load_policy_file(path: &Path) -> Result<Policy, ConfigError> {
    let content = fs::read_to_string(path)?;
    Policy::from_toml_str(&content)
}

/// Find the policy file by searching up the directory tree
fn find_config_file(start_path: &Path) -> Option<PathBuf> {
    let mut current = if start_path.is_file() {
        start_path.parent()?.to_path_buf()
    } else {
        start_path.to_path_buf()
    };

    loop {
        for name in &CONFIG_FILE_NAMES {
            let config_path = current.join(name);
            if config_path.exists() {
                return Some(config_path);
            }
        }

        if let Some(parent) = current.parent() {
            current = parent.to_path_buf();
        } else {
            break;
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violation::ComplianceRule;

    #[test]
    fn test_default_policy() {
        let policy = Policy::default();
        assert_eq!(policy.name, "standard");
        assert_eq!(policy.thresholds.max_positional_params, 3);
        assert_eq!(policy.thresholds.god_object_members, 20);
        assert_eq!(policy.duplication.similarity_threshold, 0.8);
        assert_eq!(policy.compliance.max_function_lines, 60);
        assert_eq!(policy.analysis.file_timeout_ms, 10_000);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_presets_and_aliases() {
        let strict = Policy::preset("strict-core").unwrap();
        assert_eq!(strict.name, "strict");
        assert_eq!(strict.thresholds.max_positional_params, 2);
        assert_eq!(strict.thresholds.god_object_members, 15);

        let lenient = Policy::preset("experimental").unwrap();
        assert_eq!(lenient.thresholds.max_positional_params, 4);
        assert_eq!(lenient.thresholds.god_object_members, 35);

        assert_eq!(Policy::preset("nasa_jpl_pot10").unwrap().name, "nasa-compliance");
        assert_eq!(Policy::preset("service-defaults").unwrap().name, "standard");
        assert!(matches!(
            Policy::preset("bogus"),
            Err(ConfigError::UnknownPreset { .. })
        ));
    }

    #[test]
    fn test_parse_overlay_on_preset() {
        let toml = r#"
            preset = "lenient"
            waivers = ["abc"]

            [thresholds]
            max_positional_params = 5

            [analysis]
            exclude = ["src/generated/*"]

            [severity_thresholds]
            CoN = "medium"
        "#;

        let policy = Policy::from_toml_str(toml).unwrap();
        assert_eq!(policy.name, "lenient");
        assert_eq!(policy.thresholds.max_positional_params, 5);
        // untouched preset value survives the overlay
        assert_eq!(policy.thresholds.god_object_members, 35);
        assert_eq!(policy.analysis.exclude, vec!["src/generated/*"]);
        assert!(policy.is_waived("abc"));
        assert_eq!(
            policy.severity_floor(ViolationKind::Connascence(ConnascenceType::Name)),
            Some(Severity::Medium)
        );
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut policy = Policy::default();
        policy.duplication.similarity_threshold = 1.5;
        assert!(matches!(policy.validate(), Err(ConfigError::InvalidValue { .. })));

        let mut policy = Policy::default();
        policy.analysis.exclude = vec!["[".to_string()];
        assert!(matches!(policy.validate(), Err(ConfigError::PatternError(_))));

        let mut policy = Policy::default();
        policy.budgets.insert("nonsense".to_string(), 3);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_budget_lookup_accepts_abbreviations() {
        let mut policy = Policy::default();
        policy.budgets.insert("CoT".to_string(), 4);
        assert_eq!(
            policy.budget_for(ViolationKind::Connascence(ConnascenceType::Type)),
            Some(4)
        );
        assert_eq!(
            policy.budget_for(ViolationKind::Connascence(ConnascenceType::Meaning)),
            Some(8)
        );
        assert_eq!(
            policy.budget_for(ViolationKind::Compliance(ComplianceRule::new(1).unwrap())),
            None
        );
    }

    #[test]
    fn test_filter_is_segment_anchored() {
        let filter = FileFilter::new(&AnalysisPolicy::default()).unwrap();

        assert!(filter.allows_file(Path::new("src/lib.rs")));
        assert!(filter.allows_file(Path::new("src/rebuild/mod.rs")));
        assert!(filter.allows_file(Path::new("src/contest.rs")));
        assert!(!filter.allows_file(Path::new("target/debug/build.rs")));
        assert!(!filter.allows_file(Path::new("src/build/gen.rs")));
        assert!(!filter.allows_file(Path::new("tests/integration.rs")));
        assert!(!filter.allows_file(Path::new("src/parser_tests.rs")));
        assert!(!filter.allows_file(Path::new("src/test_helpers.rs")));
        assert!(!filter.allows_file(Path::new("src/notes.txt")));
    }

    #[test]
    fn test_filter_patterns_and_test_toggle() {
        let analysis = AnalysisPolicy {
            exclude_tests: false,
            exclude: vec!["src/generated/*".to_string()],
            extra_excluded_dirs: vec!["vendor".to_string()],
            ..AnalysisPolicy::default()
        };
        let filter = FileFilter::new(&analysis).unwrap();

        assert!(filter.allows_file(Path::new("tests/integration.rs")));
        assert!(!filter.allows_file(Path::new("src/generated/api.rs")));
        assert!(!filter.allows_file(Path::new("vendor/dep/lib.rs")));
    }

    #[test]
    fn test_load_policy_searches_upward() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".connascence.toml"),
            "preset = \"strict\"\n",
        )
        .unwrap();
        let nested = dir.path().join("crate/src");
        fs::create_dir_all(&nested).unwrap();

        let policy = load_policy(None, &nested).unwrap();
        assert_eq!(policy.name, "strict");

        let preset = load_policy(Some("lenient"), &nested).unwrap();
        assert_eq!(preset.name, "lenient");
    }
}
