//! Property tests for clustering, scoring and the cache bound

use std::fs;
use std::path::PathBuf;

use connascence::config::DuplicationPolicy;
use connascence::metrics::{coupling_score, duplication_score, quality_score};
use connascence::{CacheManager, Fragment, HealthGrade, cluster_fragments, verify_mece};
use proptest::prelude::*;
use tempfile::TempDir;

const TOKENS: [&str; 6] = ["let", "if", "for", "call", "ret", "match"];

fn fragment_strategy() -> impl Strategy<Value = (usize, usize, Vec<usize>)> {
    (0..4usize, 0..3usize, prop::collection::vec(0..TOKENS.len(), 3..10))
}

fn build_fragments(raw: Vec<(usize, usize, Vec<usize>)>) -> Vec<Fragment> {
    raw.into_iter()
        .enumerate()
        .map(|(i, (file, key, tokens))| Fragment {
            file: PathBuf::from(format!("src/f{}.rs", file)),
            function: format!("func_{}", i),
            line: i * 20 + 1,
            end_line: i * 20 + 10,
            line_count: 10,
            tokens: tokens.iter().map(|&t| TOKENS[t].to_string()).collect(),
            control_key: format!("k{}", key),
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_clusters_are_mece(
        raw in prop::collection::vec(fragment_strategy(), 0..25),
        threshold in 0.5f64..1.0,
    ) {
        let fragments = build_fragments(raw);
        let policy = DuplicationPolicy {
            similarity_threshold: threshold,
            ..DuplicationPolicy::default()
        };
        let clusters = cluster_fragments(&fragments, &policy).unwrap();
        let report = verify_mece(&clusters, &fragments, &policy);
        prop_assert!(report.is_mece(), "{:?}", report);

        for cluster in &clusters {
            prop_assert!(cluster.member_count >= 2);
            prop_assert!((0.0..=1.0).contains(&cluster.similarity));
        }
    }

    #[test]
    fn prop_clustering_ignores_input_order(
        raw in prop::collection::vec(fragment_strategy(), 0..15),
    ) {
        let fragments = build_fragments(raw);
        let mut reversed = fragments.clone();
        reversed.reverse();
        let policy = DuplicationPolicy::default();
        prop_assert_eq!(
            cluster_fragments(&fragments, &policy).unwrap(),
            cluster_fragments(&reversed, &policy).unwrap()
        );
    }

    #[test]
    fn prop_scores_stay_in_unit_range(
        index in 0.0f64..10_000.0,
        lines in 0usize..100_000,
        duplicated in 0usize..100_000,
    ) {
        let coupling = coupling_score(index, lines);
        let duplication = duplication_score(duplicated.min(lines), lines);
        prop_assert!((0.0..=1.0).contains(&coupling));
        prop_assert!((0.0..=1.0).contains(&duplication));
    }

    #[test]
    fn prop_quality_is_bounded(
        coupling in 0.0f64..=1.0,
        compliance in 0.0f64..=1.0,
        duplication in 0.0f64..=1.0,
    ) {
        let (quality, weights) = quality_score(coupling, compliance, duplication);
        prop_assert!((0.0..=1.0).contains(&quality));
        let sum = weights.coupling + weights.compliance + weights.duplication;
        prop_assert!((sum - 1.0).abs() < 1e-9);
        let _ = HealthGrade::from_quality(quality);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_cache_never_exceeds_ceiling_after_eviction(
        sizes in prop::collection::vec(1usize..40, 1..12),
        ceiling in 200usize..2_000,
    ) {
        let dir = TempDir::new().unwrap();
        let cache = CacheManager::with_ceiling(ceiling);
        for (i, lets) in sizes.iter().enumerate() {
            let body: String = (0..*lets).map(|n| format!("let v{} = {};", n, n)).collect();
            let path = dir.path().join(format!("c{}.rs", i));
            fs::write(&path, format!("fn c{}() {{ {} }}", i, body)).unwrap();
            cache.get_or_parse(&path).unwrap();
        }
        cache.evict_if_over_budget();
        prop_assert!(cache.used_bytes() <= ceiling);
    }
}
