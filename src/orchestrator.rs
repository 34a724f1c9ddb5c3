//! Multi-phase analysis orchestrator
//!
//! A run moves through five phases:
//!
//! 1. `discover_and_parse`: walk the inputs, filter, parse through the cache
//! 2. `detector_sweep`: run every registered detector over every unit
//! 3. `duplication_clustering`: cluster fragments across all files (barrier)
//! 4. `correlation`: tag algorithm findings with their cluster, apply severity
//!    floors and waivers, feed results back into cache history
//! 5. `report_assembly`: metrics snapshot, trend, baseline and budgets
//!
//! Each phase body runs under `catch_unwind`. A panic or error fails that
//! phase only: its output is treated as empty and the run carries on, so a run
//! always ends `Completed` with an audit trail explaining what was lost.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache::CacheManager;
use crate::config::{ConfigError, FileFilter, Policy, kind_key, normalize_kind_key};
use crate::detectors::{DetectorRegistry, DetectorStatus, run_detector};
use crate::duplication::{
    DuplicationCluster, Fragment, cluster_fragments, cluster_violation, fragments_of, verify_mece,
};
use crate::error::{AuditIssue, IssueKind, panic_message};
use crate::metrics::{BaselineComparison, MetricsHistory, MetricsSnapshot, RunTotals, TrendReport};
use crate::report::{
    AnalysisReport, BudgetUsage, Phase, PhaseRecord, PhaseStatus, ReportMetadata, RunState,
    ViolationsByCategory,
};
use crate::source::{AnalysisContext, SourceUnit};
use crate::violation::{ConnascenceType, Violation, ViolationKind};

/// Source of the memory figure compared against the configured ceilings
pub trait MemoryProbe: Send + Sync {
    fn used_bytes(&self) -> usize;
}

/// Run analysis once with a fresh cache and history
pub fn orchestrate(
    paths: &[PathBuf],
    policy: &Policy,
    detectors: DetectorRegistry,
) -> Result<AnalysisReport, ConfigError> {
    let orchestrator = Orchestrator::new(policy.clone(), detectors)?;
    Ok(orchestrator.run(paths))
}

/// Long-lived analysis driver.
///
/// Keeps its cache, metrics history and optional baseline between runs.
pub struct Orchestrator {
    policy: Policy,
    detectors: DetectorRegistry,
    cache: Arc<CacheManager>,
    probe: Option<Box<dyn MemoryProbe>>,
    history: Mutex<MetricsHistory>,
    baseline: Mutex<Option<MetricsSnapshot>>,
    pool: rayon::ThreadPool,
}

/// Parsed unit plus the time its parse took
struct ParsedFile {
    unit: Arc<SourceUnit>,
    parse_time: Duration,
}

enum ParseOutcome {
    Parsed(ParsedFile),
    Failed(AuditIssue),
    Skipped,
}

#[derive(Default)]
struct Discovery {
    files: Vec<ParsedFile>,
    failed: usize,
    skipped: usize,
}

/// Detector output for one file that finished within its time budget
struct FileOutcome {
    unit: Arc<SourceUnit>,
    violations: Vec<Violation>,
    lines: usize,
    opportunities: usize,
}

#[derive(Default)]
struct Sweep {
    outcomes: Vec<FileOutcome>,
    timed_out: usize,
}

#[derive(Default)]
struct Correlated {
    violations: Vec<Violation>,
    waived: usize,
}

struct Assembly {
    metrics: MetricsSnapshot,
    trend: TrendReport,
    baseline: Option<BaselineComparison>,
    budgets: Vec<BudgetUsage>,
}

impl Orchestrator {
    /// Validate the policy and set up the worker pool and cache
    pub fn new(policy: Policy, detectors: DetectorRegistry) -> Result<Self, ConfigError> {
        policy.validate()?;
        let workers = policy.analysis.effective_workers();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("connascence-{}", i))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "analysis.workers".to_string(),
                reason: e.to_string(),
            })?;
        let cache = Arc::new(CacheManager::new(&policy.cache));
        let history = MetricsHistory::new(policy.metrics.history_size);

        Ok(Self {
            policy,
            detectors,
            cache,
            probe: None,
            history: Mutex::new(history),
            baseline: Mutex::new(None),
            pool,
        })
    }

    /// Share a cache across orchestrators
    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the default probe (cache used bytes)
    pub fn with_probe(mut self, probe: impl MemoryProbe + 'static) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn history(&self) -> MetricsHistory {
        self.history.lock().clone()
    }

    /// Snapshot later runs are compared against
    pub fn set_baseline(&self, snapshot: MetricsSnapshot) {
        *self.baseline.lock() = Some(snapshot);
    }

    fn memory_used(&self) -> usize {
        match &self.probe {
            Some(probe) => probe.used_bytes(),
            None => self.cache.used_bytes(),
        }
    }

    /// Analyze `paths` and assemble the report
    pub fn run(&self, paths: &[PathBuf]) -> AnalysisReport {
        let started_at = Utc::now();
        let mut tracker = RunTracker::new();
        info!(
            inputs = paths.len(),
            policy = %self.policy.name,
            detectors = self.detectors.len(),
            "analysis started"
        );

        let discovery = tracker
            .run(Phase::DiscoverAndParse, |issues| {
                Ok(self.discover_and_parse(paths, issues))
            })
            .unwrap_or_default();

        let sweep = tracker
            .run(Phase::DetectorSweep, |issues| {
                Ok(self.detector_sweep(&discovery.files, issues))
            })
            .unwrap_or_default();

        let clusters = tracker
            .run(Phase::DuplicationClustering, |issues| {
                self.duplication_clustering(&sweep.outcomes, issues)
            })
            .unwrap_or_default();

        let correlated = tracker
            .run(Phase::Correlation, |_| self.correlation(&sweep.outcomes, &clusters))
            .unwrap_or_default();

        let assembly = tracker.run(Phase::ReportAssembly, |_| {
            Ok(self.assemble(&sweep.outcomes, &clusters, &correlated.violations))
        });

        let (violations, clusters, assembly) =
            settle(assembly, correlated.violations, clusters, || {
                self.assemble(&[], &[], &[])
            });

        let files_failed = discovery.failed + sweep.timed_out;
        info!(
            files = sweep.outcomes.len(),
            failed = files_failed,
            violations = violations.len(),
            clusters = clusters.len(),
            quality = assembly.metrics.quality_score,
            "analysis completed"
        );

        let (audit_trail, run_states) = tracker.finish();
        AnalysisReport {
            violations: ViolationsByCategory::partition(violations),
            clusters,
            metrics: assembly.metrics,
            trend: assembly.trend,
            baseline: assembly.baseline,
            budgets: assembly.budgets,
            metadata: ReportMetadata {
                audit_trail,
                run_states,
                started_at,
                files_analyzed: sweep.outcomes.len(),
                files_failed,
                files_skipped: discovery.skipped,
                waived: correlated.waived,
                policy: self.policy.name.clone(),
                cache: self.cache.stats(),
            },
        }
    }

    fn discover_and_parse(&self, paths: &[PathBuf], issues: &mut Vec<AuditIssue>) -> Discovery {
        let filter = match FileFilter::new(&self.policy.analysis) {
            Ok(filter) => filter,
            Err(e) => {
                issues.push(AuditIssue::new(IssueKind::ConfigurationError, e.to_string()));
                return Discovery::default();
            }
        };
        let files = discover_files(paths, &filter, issues);
        debug!(files = files.len(), "discovered source files");

        if files.iter().any(|f| self.cache.history(f).is_some()) {
            self.cache.warm(&files, self.policy.cache.warm_budget);
            self.cache.evict_if_over_budget();
        }

        let exhausted = AtomicBool::new(false);
        let outcomes: Vec<ParseOutcome> = self.pool.install(|| {
            files
                .par_chunks(chunk_size(files.len()))
                .flat_map(|chunk| {
                    chunk
                        .iter()
                        .map(|path| self.parse_one(path, &exhausted))
                        .collect::<Vec<_>>()
                })
                .collect()
        });

        let mut discovery = Discovery::default();
        for outcome in outcomes {
            match outcome {
                ParseOutcome::Parsed(file) => discovery.files.push(file),
                ParseOutcome::Failed(issue) => {
                    discovery.failed += 1;
                    issues.push(issue);
                }
                ParseOutcome::Skipped => discovery.skipped += 1,
            }
        }
        if discovery.skipped > 0 {
            issues.push(AuditIssue::new(
                IssueKind::ResourceExhaustion,
                format!(
                    "hard memory ceiling of {} bytes reached; {} file(s) not analyzed",
                    self.policy.analysis.hard_memory_ceiling.unwrap_or_default(),
                    discovery.skipped
                ),
            ));
        }
        discovery
    }

    /// Consult the memory probe, then parse one file through the cache
    fn parse_one(&self, path: &Path, exhausted: &AtomicBool) -> ParseOutcome {
        if exhausted.load(Ordering::Acquire) {
            return ParseOutcome::Skipped;
        }
        let used = self.memory_used();
        if let Some(hard) = self.policy.analysis.hard_memory_ceiling
            && used > hard
        {
            if !exhausted.swap(true, Ordering::AcqRel) {
                warn!(used, hard, "hard memory ceiling reached, abandoning remaining files");
            }
            return ParseOutcome::Skipped;
        }
        if let Some(soft) = self.policy.analysis.soft_memory_ceiling
            && used > soft
        {
            self.cache.evict_down_to(soft);
        }

        let start = Instant::now();
        match self.cache.get_or_parse(path) {
            Ok(unit) => {
                let parse_time = start.elapsed();
                // The unit stays alive through its Arc even if it is evicted here
                self.cache.evict_if_over_budget();
                ParseOutcome::Parsed(ParsedFile { unit, parse_time })
            }
            Err(e) => {
                debug!("parse failed: {}", e);
                ParseOutcome::Failed(
                    AuditIssue::new(IssueKind::ParseError, e.to_string()).in_file(e.path()),
                )
            }
        }
    }

    fn detector_sweep(&self, files: &[ParsedFile], issues: &mut Vec<AuditIssue>) -> Sweep {
        let results: Vec<(Option<FileOutcome>, Vec<AuditIssue>)> = self.pool.install(|| {
            files
                .par_chunks(chunk_size(files.len()))
                .flat_map(|chunk| {
                    chunk
                        .iter()
                        .map(|file| self.sweep_file(file))
                        .collect::<Vec<_>>()
                })
                .collect()
        });

        let mut sweep = Sweep::default();
        for (outcome, file_issues) in results {
            issues.extend(file_issues);
            match outcome {
                Some(outcome) => sweep.outcomes.push(outcome),
                None => sweep.timed_out += 1,
            }
        }
        sweep
    }

    /// Run every detector over one unit, checking the time budget after each
    fn sweep_file(&self, file: &ParsedFile) -> (Option<FileOutcome>, Vec<AuditIssue>) {
        let unit = &file.unit;
        let ctx = AnalysisContext::new(unit, &self.policy);
        let budget = Duration::from_millis(self.policy.analysis.file_timeout_ms);
        let started = Instant::now();
        let mut violations = Vec::new();
        let mut issues = Vec::new();

        for detector in self.detectors.iter() {
            let result = run_detector(detector, &ctx);
            match result.status {
                DetectorStatus::Ok => {}
                DetectorStatus::Partial | DetectorStatus::Failed => {
                    let message = result
                        .error
                        .clone()
                        .unwrap_or_else(|| "detector did not complete".to_string());
                    issues.push(
                        AuditIssue::new(IssueKind::PhaseError, message)
                            .in_file(unit.path())
                            .from_detector(&result.detector_name),
                    );
                }
            }
            violations.extend(result.violations);

            let elapsed = file.parse_time + started.elapsed();
            if elapsed > budget {
                warn!(
                    file = %unit.path().display(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "file exceeded its time budget"
                );
                issues.push(
                    AuditIssue::new(
                        IssueKind::Timeout,
                        format!(
                            "exceeded {} ms after detector '{}'; results dropped",
                            budget.as_millis(),
                            detector.name()
                        ),
                    )
                    .in_file(unit.path()),
                );
                return (None, issues);
            }
        }

        let outcome = FileOutcome {
            lines: unit.line_count(),
            opportunities: crate::compliance::opportunities(unit),
            unit: Arc::clone(unit),
            violations,
        };
        (Some(outcome), issues)
    }

    fn duplication_clustering(
        &self,
        outcomes: &[FileOutcome],
        issues: &mut Vec<AuditIssue>,
    ) -> Result<Vec<DuplicationCluster>, String> {
        let policy = &self.policy.duplication;
        let fragments: Vec<Fragment> = outcomes
            .iter()
            .flat_map(|o| fragments_of(&o.unit, policy.min_lines))
            .collect();

        let clusters = cluster_fragments(&fragments, policy).map_err(|e| e.to_string())?;
        let mece = verify_mece(&clusters, &fragments, policy);
        if !mece.is_mece() {
            issues.push(AuditIssue::new(
                IssueKind::PhaseError,
                format!(
                    "clusters are not MECE: {} overlapping, {} missing, {} unexpected",
                    mece.overlapping.len(),
                    mece.missing.len(),
                    mece.unexpected.len()
                ),
            ));
        }
        debug!(
            fragments = fragments.len(),
            clusters = clusters.len(),
            "duplication clustering done"
        );
        Ok(clusters)
    }

    fn correlation(
        &self,
        outcomes: &[FileOutcome],
        clusters: &[DuplicationCluster],
    ) -> Result<Correlated, String> {
        let algorithm = ViolationKind::Connascence(ConnascenceType::Algorithm);
        let mut violations: Vec<Violation> = outcomes
            .iter()
            .flat_map(|o| o.violations.iter())
            .map(|v| {
                if v.kind() != algorithm {
                    return v.clone();
                }
                match clusters.iter().find(|c| c.contains(v.file(), v.line())) {
                    Some(cluster) => v.with_cluster(&cluster.id),
                    None => v.clone(),
                }
            })
            .collect();
        for cluster in clusters {
            violations.push(cluster_violation(cluster).map_err(|e| e.to_string())?);
        }

        violations.retain(|v| {
            self.policy
                .severity_floor(v.kind())
                .is_none_or(|floor| v.severity() >= floor)
        });
        let before = violations.len();
        violations.retain(|v| !self.policy.is_waived(v.id()));
        let waived = before - violations.len();

        let units: Vec<&SourceUnit> = outcomes.iter().map(|o| o.unit.as_ref()).collect();
        let degrees = in_degrees(&units);
        let mut per_file: BTreeMap<&Path, usize> = BTreeMap::new();
        for v in &violations {
            *per_file.entry(v.file()).or_default() += 1;
        }
        for outcome in outcomes {
            let path = outcome.unit.path();
            self.cache.record_outcome(
                path,
                per_file.get(path).copied().unwrap_or(0),
                outcome.lines,
                degrees.get(path).copied().unwrap_or(0),
            );
        }

        Ok(Correlated { violations, waived })
    }

    fn assemble(
        &self,
        outcomes: &[FileOutcome],
        clusters: &[DuplicationCluster],
        violations: &[Violation],
    ) -> Assembly {
        let totals = RunTotals {
            files_analyzed: outcomes.len(),
            total_lines: outcomes.iter().map(|o| o.lines).sum(),
            opportunities: outcomes.iter().map(|o| o.opportunities).sum(),
            duplicated_lines: clusters.iter().map(|c| c.total_duplicated_lines).sum(),
        };
        let metrics = MetricsSnapshot::compute(violations, totals, Utc::now());

        let mut history = self.history.lock();
        history.push(metrics.clone());
        let trend = history.trend(&self.policy.metrics);
        drop(history);

        let baseline = self
            .baseline
            .lock()
            .as_ref()
            .map(|base| BaselineComparison::compare(&metrics, base, &self.policy.metrics));

        Assembly {
            budgets: budget_usage(&self.policy, violations),
            metrics,
            trend,
            baseline,
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("policy", &self.policy.name)
            .field("detectors", &self.detectors)
            .field("cache", &self.cache)
            .field("workers", &self.pool.current_num_threads())
            .finish()
    }
}

/// Outputs that reach the report. A failed assembly leaves nothing but the
/// metrics of an empty run.
fn settle(
    assembly: Option<Assembly>,
    violations: Vec<Violation>,
    clusters: Vec<DuplicationCluster>,
    empty: impl FnOnce() -> Assembly,
) -> (Vec<Violation>, Vec<DuplicationCluster>, Assembly) {
    match assembly {
        Some(assembly) => (violations, clusters, assembly),
        None => (Vec::new(), Vec::new(), empty()),
    }
}

/// Phase bookkeeping: run-state history and the audit trail
struct RunTracker {
    states: Vec<RunState>,
    trail: Vec<PhaseRecord>,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            states: vec![RunState::Pending],
            trail: Vec::with_capacity(Phase::ALL.len()),
        }
    }

    /// Run one phase body in isolation. `None` means the phase failed.
    fn run<T>(
        &mut self,
        phase: Phase,
        body: impl FnOnce(&mut Vec<AuditIssue>) -> Result<T, String>,
    ) -> Option<T> {
        self.states.push(RunState::Running(phase));
        let started_at = Utc::now();
        debug!(phase = %phase, "phase started");

        let mut issues = Vec::new();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut issues)));
        let (output, error) = match outcome {
            Ok(Ok(output)) => (Some(output), None),
            Ok(Err(e)) => (None, Some(e)),
            Err(payload) => (
                None,
                Some(format!("panicked: {}", panic_message(payload.as_ref()))),
            ),
        };

        let status = match (&output, issues.is_empty()) {
            (None, _) => PhaseStatus::Failed,
            (Some(_), false) => PhaseStatus::Degraded,
            (Some(_), true) => PhaseStatus::Ok,
        };
        if let Some(e) = &error {
            warn!(phase = %phase, "phase failed: {}", e);
            issues.push(AuditIssue::new(IssueKind::PhaseError, e.clone()));
        }
        if status != PhaseStatus::Ok {
            self.states.push(RunState::Degraded(phase));
        }
        info!(phase = %phase, status = %status, issues = issues.len(), "phase finished");

        self.trail.push(PhaseRecord {
            phase,
            started_at,
            ended_at: Utc::now(),
            status,
            error,
            issues,
        });
        output
    }

    fn finish(mut self) -> (Vec<PhaseRecord>, Vec<RunState>) {
        self.states.push(RunState::Completed);
        (self.trail, self.states)
    }
}

/// Files per rayon task: one at a time for small inputs, about four chunks
/// per thread otherwise
fn chunk_size(file_count: usize) -> usize {
    let num_threads = rayon::current_num_threads();
    if file_count < num_threads * 2 {
        1
    } else {
        (file_count / (num_threads * 4)).max(1)
    }
}

/// Every `.rs` file under `paths` that passes the filter, sorted
pub fn discover_files(
    paths: &[PathBuf],
    filter: &FileFilter,
    issues: &mut Vec<AuditIssue>,
) -> Vec<PathBuf> {
    let mut files = BTreeSet::new();
    for root in paths {
        if root.is_file() {
            if root.extension().is_some_and(|ext| ext == "rs") {
                files.insert(root.clone());
            }
            continue;
        }
        if !root.is_dir() {
            issues.push(
                AuditIssue::new(IssueKind::ConfigurationError, "input path does not exist")
                    .in_file(root),
            );
            continue;
        }

        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            !entry.file_type().is_dir() || filter.allows_dir(relative)
        });
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                    if filter.allows_file(relative) {
                        files.insert(entry.into_path());
                    }
                }
                Ok(_) => {}
                Err(e) => debug!("skipping unreadable entry: {}", e),
            }
        }
    }
    files.into_iter().collect()
}

/// Module name a file is imported by: its stem, or its directory for
/// `mod.rs`/`lib.rs`/`main.rs`
fn module_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();
    match stem.as_ref() {
        "mod" | "lib" | "main" => path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned()),
        _ => Some(stem.into_owned()),
    }
}

/// How many other units import each unit's module
fn in_degrees<'u>(units: &[&'u SourceUnit]) -> BTreeMap<&'u Path, usize> {
    let mut degrees = BTreeMap::new();
    for unit in units {
        let Some(name) = module_name(unit.path()) else {
            continue;
        };
        let count = units
            .iter()
            .filter(|other| other.path() != unit.path())
            .filter(|other| {
                other
                    .index()
                    .imports
                    .iter()
                    .any(|import| import.split("::").any(|segment| segment == name))
            })
            .count();
        degrees.insert(unit.path(), count);
    }
    degrees
}

fn budget_usage(policy: &Policy, violations: &[Violation]) -> Vec<BudgetUsage> {
    policy
        .budgets
        .iter()
        .map(|(key, &limit)| {
            let count = if key == "total" {
                violations.len()
            } else {
                let wanted = normalize_kind_key(key);
                violations
                    .iter()
                    .filter(|v| wanted.as_deref() == Some(kind_key(v.kind()).as_str()))
                    .count()
            };
            BudgetUsage {
                key: key.clone(),
                limit,
                count,
            }
        })
        .collect()
}
