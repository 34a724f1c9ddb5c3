use std::fs;
use std::hint::black_box;
use std::path::PathBuf;

use criterion::{Criterion, criterion_group, criterion_main};
use tempfile::TempDir;

use connascence::{
    CacheManager, DetectorRegistry, Fragment, Policy, SourceUnit, cluster_fragments,
    duplication::fragments_of, orchestrate,
};

fn sample_source(i: usize) -> String {
    format!(
        r#"
pub struct Store{i} {{
    items: Vec<u32>,
    limit: usize,
}}

impl Store{i} {{
    pub fn add(&mut self, a: u32, b: u32, c: u32, d: u32, e: u32) {{
        for x in [a, b, c, d, e] {{
            if self.items.len() < self.limit {{
                self.items.push(x * 42);
            }}
        }}
    }}

    pub fn total(&self) -> u32 {{
        let mut sum = 0;
        for item in &self.items {{
            if *item > 42 {{
                sum += item;
            }}
        }}
        sum
    }}
}}
"#
    )
}

fn project(files: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    for i in 0..files {
        fs::write(dir.path().join(format!("store_{}.rs", i)), sample_source(i)).unwrap();
    }
    dir
}

fn bench_parse(c: &mut Criterion) {
    let code = sample_source(0);
    c.bench_function("parse_source_unit", |b| {
        b.iter(|| SourceUnit::parse("src/store.rs", black_box(code.clone())).unwrap())
    });
}

fn bench_cache(c: &mut Criterion) {
    let dir = project(20);
    let paths: Vec<PathBuf> = (0..20)
        .map(|i| dir.path().join(format!("store_{}.rs", i)))
        .collect();
    let cache = CacheManager::with_ceiling(64 << 20);
    cache.warm(&paths, paths.len());

    c.bench_function("cache_hits_20_files", |b| {
        b.iter(|| {
            for path in &paths {
                black_box(cache.get_or_parse(path).unwrap());
            }
        })
    });
}

fn bench_clustering(c: &mut Criterion) {
    let fragments: Vec<Fragment> = (0..50)
        .flat_map(|i| {
            let unit = SourceUnit::parse(format!("src/store_{}.rs", i), sample_source(i)).unwrap();
            fragments_of(&unit, 5)
        })
        .collect();
    let policy = Policy::default();

    c.bench_function("cluster_100_fragments", |b| {
        b.iter(|| cluster_fragments(black_box(&fragments), &policy.duplication).unwrap())
    });
}

fn bench_full_run(c: &mut Criterion) {
    let dir = project(50);
    let policy = Policy::default();
    let mut group = c.benchmark_group("orchestrate");
    group.sample_size(10);
    group.bench_function("50_files", |b| {
        b.iter(|| {
            orchestrate(
                &[dir.path().to_path_buf()],
                &policy,
                DetectorRegistry::standard(&policy),
            )
            .unwrap()
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_cache,
    bench_clustering,
    bench_full_run
);
criterion_main!(benches);
