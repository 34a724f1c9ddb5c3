//! End-to-end behaviour of the analysis engine on small projects

use std::fs;
use std::path::PathBuf;

use connascence::{
    AnalysisContext, AnalysisReport, CacheManager, ComplianceDetector, ConnascenceType,
    DetectorRegistry, Evidence, IssueKind, Phase, PhaseStatus, Policy, Severity, SourceUnit,
    ViolationKind, orchestrate, run_detector,
};
use connascence::detectors::{MeaningDetector, PositionDetector};
use tempfile::TempDir;

fn project(files: &[(&str, String)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, code) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, code).unwrap();
    }
    dir
}

fn scan(dir: &TempDir, policy: &Policy) -> AnalysisReport {
    orchestrate(
        &[dir.path().to_path_buf()],
        policy,
        DetectorRegistry::standard(policy),
    )
    .unwrap()
}

fn with_workers(workers: usize) -> Policy {
    let mut policy = Policy::default();
    policy.analysis.workers = Some(workers);
    policy
}

#[test]
fn test_six_positional_parameters() {
    let unit = SourceUnit::parse(
        "src/net.rs",
        "pub fn connect(host: &str, port: u16, retries: u8, timeout: u64, tls: bool, verbose: bool) {}\n"
            .to_string(),
    )
    .unwrap();
    let policy = Policy::default();
    let result = run_detector(&PositionDetector, &AnalysisContext::new(&unit, &policy));

    assert_eq!(result.violations.len(), 1);
    let v = &result.violations[0];
    assert_eq!(v.kind(), ViolationKind::Connascence(ConnascenceType::Position));
    assert_eq!(v.severity(), Severity::Medium);
    assert!(matches!(
        v.evidence(),
        Evidence::Parameters { count: 6, threshold: 3, .. }
    ));
}

#[test]
fn test_repeated_magic_number() {
    let code = r#"
pub fn scale(x: u32) -> u32 {
    let a = x * 42;
    let b = a + 42;
    if b > 42 {
        return 42;
    }
    b - 42
}
"#;
    let unit = SourceUnit::parse("src/scale.rs", code.to_string()).unwrap();
    let policy = Policy::default();
    let result = run_detector(&MeaningDetector, &AnalysisContext::new(&unit, &policy));

    assert_eq!(result.violations.len(), 1);
    assert_eq!(
        result.violations[0].evidence(),
        &Evidence::Literal {
            literal: "42".to_string(),
            occurrences: 5
        }
    );
}

const TOTAL: &str = r#"
pub fn total(items: &[u32]) -> u32 {
    let mut sum = 0;
    for item in items {
        if *item > 10 {
            sum += item;
        }
    }
    sum
}
"#;

const WEIGHT: &str = r#"
pub fn weight(values: &[u32]) -> u32 {
    let mut acc = 0;
    for value in values {
        if *value > 10 {
            acc += value;
        }
    }
    acc
}
"#;

#[test]
fn test_renamed_copy_across_files_clusters() {
    let dir = project(&[
        ("orders.rs", TOTAL.to_string()),
        ("billing.rs", WEIGHT.to_string()),
    ]);
    let report = scan(&dir, &Policy::default());

    assert_eq!(report.clusters.len(), 1);
    let cluster = &report.clusters[0];
    assert_eq!(cluster.member_count, 2);
    assert_eq!(cluster.file_count(), 2);
    assert!(
        report
            .violations
            .duplication
            .iter()
            .any(|v| v.cluster() == Some(cluster.id.as_str()))
    );
}

#[test]
fn test_warm_cache_matches_historical_usage() {
    let dir = TempDir::new().unwrap();
    let paths: Vec<PathBuf> = (0..20)
        .map(|i| {
            let path = dir.path().join(format!("m{:02}.rs", i));
            fs::write(&path, format!("pub fn f{}(x: u32) -> u32 {{ x + {} }}\n", i, i)).unwrap();
            path
        })
        .collect();
    let (hot, cold) = paths.split_at(15);

    let cache = CacheManager::with_ceiling(1 << 20);
    for path in hot {
        for _ in 0..3 {
            cache.get_or_parse(path).unwrap();
        }
        cache.record_outcome(path, 4, 10, 3);
    }
    cache.clear();
    cache.reset_stats();

    assert_eq!(cache.warm(&paths, 15), 15);
    cache.reset_stats();
    for path in hot.iter().chain(cold.iter().take(2)) {
        cache.get_or_parse(path).unwrap();
    }

    let stats = cache.stats();
    assert!(stats.hit_rate >= 0.8, "hit rate {}", stats.hit_rate);
}

#[test]
fn test_long_function_breaks_length_rule() {
    let mut code = String::from("pub fn long_one(n: usize) {\n");
    code.push_str("    debug_assert!(n > 0);\n");
    code.push_str("    debug_assert!(n < 1000);\n");
    for i in 0..83 {
        code.push_str(&format!("    let v{} = {};\n", i, i));
    }
    code.push_str("}\n");
    let unit = SourceUnit::parse("src/long.rs", code).unwrap();
    assert_eq!(unit.index().functions[0].line_count(), 87);

    let policy = Policy::default();
    let result = run_detector(&ComplianceDetector, &AnalysisContext::new(&unit, &policy));
    assert_eq!(result.violations.len(), 1, "{:?}", result.violations);
    let v = &result.violations[0];
    assert!(matches!(v.kind(), ViolationKind::Compliance(r) if r.number() == 4));
    assert!(v.recommendation().contains("helper functions"));
}

fn fifty_files() -> TempDir {
    let files: Vec<(String, String)> = (0..50)
        .map(|i| {
            let params: Vec<String> = (0..(i % 7)).map(|p| format!("p{}: u32", p)).collect();
            let code = format!(
                "pub fn f{i}({}) -> u32 {{\n    let limit = {};\n    limit * {}\n}}\n",
                params.join(", "),
                100 + i % 4,
                100 + i % 4,
            );
            (format!("src/mod_{:02}.rs", i), code)
        })
        .collect();
    let borrowed: Vec<(&str, String)> = files
        .iter()
        .map(|(name, code)| (name.as_str(), code.clone()))
        .collect();
    project(&borrowed)
}

#[test]
fn test_worker_count_does_not_change_results() {
    let dir = fifty_files();
    let parallel = scan(&dir, &with_workers(4));
    let serial = scan(&dir, &with_workers(1));

    assert_eq!(parallel.metadata.files_analyzed, 50);
    assert_eq!(parallel.total_violations(), serial.total_violations());

    let ids = |r: &AnalysisReport| r.all_violations().map(|v| v.id().to_string()).collect::<Vec<_>>();
    assert_eq!(ids(&parallel), ids(&serial));
}

#[test]
fn test_repeat_runs_are_identical() {
    let dir = fifty_files();
    let policy = with_workers(3);
    let first = scan(&dir, &policy);
    let second = scan(&dir, &policy);

    assert_eq!(first.violations, second.violations);
    assert_eq!(first.clusters, second.clusters);
    assert_eq!(first.metrics.quality_score, second.metrics.quality_score);
}

#[test]
fn test_broken_file_does_not_stop_the_run() {
    let dir = project(&[
        ("good.rs", "pub fn ok(a: u8, b: u8, c: u8, d: u8, e: u8) {}\n".to_string()),
        ("broken.rs", "pub fn oops( {".to_string()),
    ]);
    let report = scan(&dir, &Policy::default());

    assert_eq!(report.metadata.files_analyzed, 1);
    assert_eq!(report.metadata.files_failed, 1);
    assert!(report.all_violations().any(|v| v.file().ends_with("good.rs")));

    let parse = report.metadata.phase(Phase::DiscoverAndParse).unwrap();
    assert_eq!(parse.status, PhaseStatus::Degraded);
    assert!(
        report
            .metadata
            .issues()
            .any(|i| i.kind == IssueKind::ParseError)
    );
    assert_eq!(
        report.metadata.phase(Phase::ReportAssembly).unwrap().status,
        PhaseStatus::Ok
    );
}
