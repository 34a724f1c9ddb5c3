//! Cross-file duplication clustering
//!
//! Fragments (function bodies with their structural signatures) from every
//! analyzed file are bucketed by control-flow key, compared pairwise inside a
//! bucket by token edit distance, and merged with a union-find. Components
//! become [`DuplicationCluster`]s. Every fragment with a qualifying partner ends
//! up in exactly one cluster; [`verify_mece`] checks that independently.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::DuplicationPolicy;
use crate::source::SourceUnit;
use crate::syntax::FunctionInfo;
use crate::violation::{
    AnomalyKind, Evidence, Locality, Severity, Violation, ViolationError, ViolationKind,
};

/// Errors from the clustering pass
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("union-find performed {merges} merges over {fragments} fragments (bound {bound})")]
    MergeBoundExceeded {
        merges: usize,
        fragments: usize,
        bound: usize,
    },

    #[error("find did not reach a root within {limit} steps")]
    IterationBoundExceeded { limit: usize },
}

/// One function body taking part in clustering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    pub file: PathBuf,
    pub function: String,
    pub line: usize,
    pub end_line: usize,
    pub line_count: usize,
    #[serde(skip)]
    pub tokens: Vec<String>,
    #[serde(skip)]
    pub control_key: String,
}

impl Fragment {
    pub fn from_function(file: &Path, function: &FunctionInfo) -> Self {
        Self {
            file: file.to_path_buf(),
            function: function.qualified_name.clone(),
            line: function.line,
            end_line: function.end_line,
            line_count: function.line_count(),
            tokens: function.signature.tokens.clone(),
            control_key: function.signature.control_key.clone(),
        }
    }

    /// Identity of a fragment: file and start line
    pub fn key(&self) -> (&Path, usize) {
        (&self.file, self.line)
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.file.display(), self.line)
    }
}

/// Fragments of one unit that are long enough to be considered
pub fn fragments_of(unit: &SourceUnit, min_lines: usize) -> Vec<Fragment> {
    unit.index()
        .functions
        .iter()
        .filter(|f| f.line_count() >= min_lines)
        .map(|f| Fragment::from_function(unit.path(), f))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicationCluster {
    pub id: String,
    pub members: Vec<Fragment>,
    /// Mean similarity of the matching pairs inside the cluster
    pub similarity: f64,
    /// Earliest member by (file, line)
    pub representative: Fragment,
    pub member_count: usize,
    pub total_duplicated_lines: usize,
}

impl DuplicationCluster {
    /// Remediation priority: duplicated lines times member count
    pub fn priority(&self) -> usize {
        self.total_duplicated_lines * self.member_count
    }

    pub fn file_count(&self) -> usize {
        self.members
            .iter()
            .map(|m| m.file.as_path())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn contains(&self, file: &Path, line: usize) -> bool {
        self.members.iter().any(|m| m.key() == (file, line))
    }
}

/// Token-level similarity: `1 - edit_distance / max_len`
pub fn similarity(a: &[String], b: &[String]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(a, b) as f64 / longest as f64
}

fn edit_distance(a: &[String], b: &[String]) -> usize {
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ta) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, tb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ta != tb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Whether two fragments can still reach `threshold`; the edit distance is
/// at least the length difference
fn within_length_ratio(a: usize, b: usize, threshold: f64) -> bool {
    let (short, long) = (a.min(b), a.max(b));
    long == 0 || short as f64 / long as f64 >= threshold
}

/// Union-find with path halving and an explicit merge budget
struct DisjointSets {
    parent: Vec<usize>,
    size: Vec<usize>,
    merges: usize,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
            merges: 0,
        }
    }

    fn find(&mut self, mut x: usize) -> Result<usize, ClusterError> {
        let limit = self.parent.len();
        for _ in 0..=limit {
            let parent = self.parent[x];
            if parent == x {
                return Ok(x);
            }
            let grandparent = self.parent[parent];
            self.parent[x] = grandparent;
            x = grandparent;
        }
        Err(ClusterError::IterationBoundExceeded { limit })
    }

    /// Merge the sets of `a` and `b`; false if already joined
    fn union(&mut self, a: usize, b: usize) -> Result<bool, ClusterError> {
        let (ra, rb) = (self.find(a)?, self.find(b)?);
        if ra == rb {
            return Ok(false);
        }
        let bound = self.parent.len().saturating_sub(1);
        self.merges += 1;
        if self.merges > bound {
            return Err(ClusterError::MergeBoundExceeded {
                merges: self.merges,
                fragments: self.parent.len(),
                bound,
            });
        }
        let (root, child) = if self.size[ra] >= self.size[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[child] = root;
        self.size[root] += self.size[child];
        Ok(true)
    }
}

/// Pairs `(i, j, similarity)` with `i < j` that meet the threshold.
/// Indices refer to `order`, the fragments sorted by key.
fn matching_pairs(fragments: &[&Fragment], threshold: f64) -> Vec<(usize, usize, f64)> {
    let mut buckets: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, fragment) in fragments.iter().enumerate() {
        buckets.entry(fragment.control_key.as_str()).or_default().push(i);
    }

    let mut pairs = Vec::new();
    for members in buckets.values() {
        for (pos, &i) in members.iter().enumerate() {
            for &j in &members[pos + 1..] {
                let (a, b) = (&fragments[i].tokens, &fragments[j].tokens);
                if !within_length_ratio(a.len(), b.len(), threshold) {
                    continue;
                }
                let score = similarity(a, b);
                if score >= threshold {
                    pairs.push((i, j, score));
                }
            }
        }
    }
    pairs
}

fn sorted_fragments(fragments: &[Fragment]) -> Vec<&Fragment> {
    let mut ordered: Vec<&Fragment> = fragments.iter().collect();
    ordered.sort_by(|a, b| a.key().cmp(&b.key()));
    ordered.dedup_by(|a, b| a.key() == b.key());
    ordered
}

fn cluster_id(members: &[Fragment]) -> String {
    let mut hasher = Sha256::new();
    for member in members {
        hasher.update(member.label().as_bytes());
        hasher.update(b"\n");
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("dup-{}", &digest[..12])
}

/// Group fragments into clusters, ranked by priority then id
pub fn cluster_fragments(
    fragments: &[Fragment],
    policy: &DuplicationPolicy,
) -> Result<Vec<DuplicationCluster>, ClusterError> {
    let ordered = sorted_fragments(fragments);
    let pairs = matching_pairs(&ordered, policy.similarity_threshold);

    let mut sets = DisjointSets::new(ordered.len());
    for &(i, j, _) in &pairs {
        sets.union(i, j)?;
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..ordered.len() {
        components.entry(sets.find(i)?).or_default().push(i);
    }
    let mut scores: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
    for &(i, _, score) in &pairs {
        scores.entry(sets.find(i)?).or_default().push(score);
    }

    let min_size = policy.min_cluster_size.max(2);
    let mut clusters: Vec<DuplicationCluster> = components
        .into_iter()
        .filter(|(_, members)| members.len() >= min_size)
        .filter_map(|(root, indices)| {
            let members: Vec<Fragment> = indices.iter().map(|&i| ordered[i].clone()).collect();
            let representative = members.first()?.clone();
            let pair_scores = scores.get(&root).map(Vec::as_slice).unwrap_or(&[]);
            let similarity = if pair_scores.is_empty() {
                1.0
            } else {
                pair_scores.iter().sum::<f64>() / pair_scores.len() as f64
            };
            Some(DuplicationCluster {
                id: cluster_id(&members),
                member_count: members.len(),
                total_duplicated_lines: members.iter().map(|m| m.line_count).sum(),
                similarity: similarity.clamp(0.0, 1.0),
                representative,
                members,
            })
        })
        .collect();

    clusters.sort_by(|a, b| {
        b.priority()
            .cmp(&a.priority())
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(clusters)
}

/// Outcome of a MECE check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MeceReport {
    /// Fragments found in more than one cluster
    pub overlapping: Vec<String>,
    /// Qualifying fragments not placed in any cluster
    pub missing: Vec<String>,
    /// Cluster members that do not qualify
    pub unexpected: Vec<String>,
}

impl MeceReport {
    pub fn is_mece(&self) -> bool {
        self.overlapping.is_empty() && self.missing.is_empty() && self.unexpected.is_empty()
    }
}

/// Check that clusters are disjoint and cover exactly the qualifying fragments.
///
/// Qualifying fragments are recomputed with a breadth-first walk over the
/// match graph, independent of the union-find.
pub fn verify_mece(
    clusters: &[DuplicationCluster],
    fragments: &[Fragment],
    policy: &DuplicationPolicy,
) -> MeceReport {
    let ordered = sorted_fragments(fragments);
    let pairs = matching_pairs(&ordered, policy.similarity_threshold);

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); ordered.len()];
    for &(i, j, _) in &pairs {
        adjacency[i].push(j);
        adjacency[j].push(i);
    }

    let min_size = policy.min_cluster_size.max(2);
    let mut visited = vec![false; ordered.len()];
    let mut expected: BTreeSet<String> = BTreeSet::new();
    for start in 0..ordered.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut component = vec![start];
        let mut cursor = 0;
        while cursor < component.len() {
            let current = component[cursor];
            cursor += 1;
            for &next in &adjacency[current] {
                if !visited[next] {
                    visited[next] = true;
                    component.push(next);
                }
            }
        }
        if component.len() >= min_size {
            expected.extend(component.iter().map(|&i| ordered[i].label()));
        }
    }

    let mut report = MeceReport::default();
    let mut placed: BTreeSet<String> = BTreeSet::new();
    for cluster in clusters {
        for member in &cluster.members {
            let label = member.label();
            if !placed.insert(label.clone()) {
                report.overlapping.push(label.clone());
            }
            if !expected.contains(&label) {
                report.unexpected.push(label);
            }
        }
    }
    report.missing = expected.difference(&placed).cloned().collect();
    report
}

pub fn cluster_severity(cluster: &DuplicationCluster) -> Severity {
    match cluster.priority() {
        p if p >= 400 => Severity::High,
        p if p >= 60 => Severity::Medium,
        _ => Severity::Low,
    }
}

/// The DUPLICATION_CLUSTER violation reported at a cluster's representative
pub fn cluster_violation(cluster: &DuplicationCluster) -> Result<Violation, ViolationError> {
    let locality = if cluster.file_count() > 1 {
        Locality::CrossModule
    } else {
        Locality::SameClass
    };
    let members: Vec<String> = cluster
        .members
        .iter()
        .map(|m| format!("{} ({})", m.function, m.label()))
        .collect();
    Violation::builder(
        ViolationKind::StructuralAnomaly(AnomalyKind::DuplicateCluster),
        cluster.representative.file.clone(),
    )
    .at(cluster.representative.line, 1)
    .severity(cluster_severity(cluster))
    .locality(locality)
    .weight(1.0 + (cluster.member_count as f64 - 1.0) * cluster.similarity)
    .description(format!(
        "{} structurally similar fragments ({:.0}% similar, {} lines): {}",
        cluster.member_count,
        cluster.similarity * 100.0,
        cluster.total_duplicated_lines,
        members.join(", ")
    ))
    .recommendation("Extract the shared logic into one function and reuse it from every member")
    .evidence(Evidence::Cluster {
        cluster_id: cluster.id.clone(),
        members: cluster.member_count,
        total_lines: cluster.total_duplicated_lines,
        similarity: cluster.similarity,
    })
    .build()
    .map(|v| v.with_cluster(&cluster.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUM_EVEN: &str = r#"
fn sum_even(xs: &[i64]) -> i64 {
    let mut total = 0;
    for x in xs {
        if x % 2 == 0 { total += x; }
    }
    total
}
"#;

    const ADD_EVEN: &str = r#"
fn add_evens(values: &[i64]) -> i64 {
    let mut acc = 0;
    for v in values {
        if v % 2 == 0 { acc += v; }
    }
    acc
}
"#;

    const WITH_LOG: &str = r#"
fn add_logged(values: &[i64]) -> i64 {
    let mut acc = 0;
    for v in values {
        if v % 2 == 0 { acc += v; }
    }
    log(acc);
    acc
}
"#;

    const MATCHER: &str = r#"
fn classify(n: i64) -> &'static str {
    match n {
        0 => "zero",
        _ => "other",
    }
}
"#;

    fn fragments(files: &[(&str, &str)]) -> Vec<Fragment> {
        files
            .iter()
            .flat_map(|(path, code)| {
                let unit = SourceUnit::parse(*path, code.to_string()).unwrap();
                fragments_of(&unit, 5)
            })
            .collect()
    }

    #[test]
    fn test_renamed_copies_cluster_across_files() {
        let frags = fragments(&[("src/a.rs", SUM_EVEN), ("src/b.rs", ADD_EVEN)]);
        let clusters = cluster_fragments(&frags, &DuplicationPolicy::default()).unwrap();
        assert_eq!(clusters.len(), 1);
        let cluster = &clusters[0];
        assert_eq!(cluster.member_count, 2);
        assert_eq!(cluster.similarity, 1.0);
        assert_eq!(cluster.representative.file, PathBuf::from("src/a.rs"));
        assert_eq!(cluster.file_count(), 2);
        assert!(cluster.id.starts_with("dup-"));
    }

    #[test]
    fn test_near_match_joins_cluster() {
        let frags = fragments(&[
            ("src/a.rs", SUM_EVEN),
            ("src/b.rs", ADD_EVEN),
            ("src/c.rs", WITH_LOG),
            ("src/d.rs", MATCHER),
        ]);
        let policy = DuplicationPolicy::default();
        let clusters = cluster_fragments(&frags, &policy).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_count, 3);
        assert!(clusters[0].similarity < 1.0);
        assert!(verify_mece(&clusters, &frags, &policy).is_mece());
    }

    #[test]
    fn test_min_cluster_size() {
        let frags = fragments(&[("src/a.rs", SUM_EVEN), ("src/b.rs", ADD_EVEN)]);
        let policy = DuplicationPolicy {
            min_cluster_size: 3,
            ..DuplicationPolicy::default()
        };
        let clusters = cluster_fragments(&frags, &policy).unwrap();
        assert!(clusters.is_empty());
        assert!(verify_mece(&clusters, &frags, &policy).is_mece());
    }

    #[test]
    fn test_verify_mece_detects_overlap_and_gaps() {
        let frags = fragments(&[("src/a.rs", SUM_EVEN), ("src/b.rs", ADD_EVEN)]);
        let policy = DuplicationPolicy::default();
        let clusters = cluster_fragments(&frags, &policy).unwrap();

        let doubled = vec![clusters[0].clone(), clusters[0].clone()];
        let report = verify_mece(&doubled, &frags, &policy);
        assert_eq!(report.overlapping.len(), 2);

        let report = verify_mece(&[], &frags, &policy);
        assert_eq!(report.missing.len(), 2);
    }

    #[test]
    fn test_similarity_bounds() {
        let a: Vec<String> = ["if", "call", ")"].iter().map(|s| s.to_string()).collect();
        let b: Vec<String> = ["if", "lit", ")"].iter().map(|s| s.to_string()).collect();
        assert_eq!(similarity(&a, &a), 1.0);
        assert!((similarity(&a, &b) - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(similarity(&[], &[]), 1.0);
        assert!(!within_length_ratio(2, 10, 0.8));
    }

    #[test]
    fn test_union_find_merge_bound() {
        let mut sets = DisjointSets::new(3);
        assert!(sets.union(0, 1).unwrap());
        assert!(!sets.union(1, 0).unwrap());
        assert!(sets.union(1, 2).unwrap());
        assert_eq!(sets.merges, 2);
        assert_eq!(sets.find(2).unwrap(), sets.find(0).unwrap());
    }

    #[test]
    fn test_cluster_violation() {
        let frags = fragments(&[("src/a.rs", SUM_EVEN), ("src/b.rs", ADD_EVEN)]);
        let clusters = cluster_fragments(&frags, &DuplicationPolicy::default()).unwrap();
        let v = cluster_violation(&clusters[0]).unwrap();
        assert_eq!(v.rule_id(), "DUPLICATION_CLUSTER");
        assert_eq!(v.locality(), Locality::CrossModule);
        assert_eq!(v.cluster(), Some(clusters[0].id.as_str()));
    }
}
