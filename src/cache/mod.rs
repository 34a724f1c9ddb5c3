//! Content-addressed cache of parsed source units
//!
//! Entries are keyed by the SHA-256 of the file bytes, so a changed file can
//! never be served from a stale entry. Concurrent misses on one hash share a
//! single parse through a per-hash [`OnceCell`]. Eviction and warming are
//! ordered by [`PriorityFactors`].

mod disk;
mod priority;

pub use disk::{CacheFault, DiskTier};
pub use priority::{FileHistory, PriorityFactors};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::SystemTime;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CachePolicy;
use crate::source::{ParseError, SourceUnit, content_hash};

#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Content hash
    pub key: String,
    pub unit: Arc<SourceUnit>,
    pub size: usize,
    /// Logical clock value of the latest access
    pub last_access: u64,
    pub access_count: u64,
    pub priority: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub warmed: usize,
    pub evictions: usize,
    pub hit_rate: f64,
    pub used_bytes: usize,
    pub entries: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    warmed: usize,
    evictions: usize,
}

pub struct CacheManager {
    entries: DashMap<String, CacheEntry>,
    /// Current content hash of every path seen
    paths: DashMap<PathBuf, String>,
    pending: DashMap<String, Arc<OnceCell<Arc<SourceUnit>>>>,
    history: DashMap<PathBuf, FileHistory>,
    counters: Mutex<Counters>,
    used_bytes: AtomicUsize,
    clock: AtomicU64,
    ceiling: usize,
    disk: Option<DiskTier>,
}

impl CacheManager {
    pub fn new(policy: &CachePolicy) -> Self {
        let disk = policy
            .directory
            .as_deref()
            .and_then(|dir| match DiskTier::open(dir) {
                Ok(tier) => Some(tier),
                Err(e) => {
                    warn!("disk cache disabled, cannot open {}: {}", dir.display(), e);
                    None
                }
            });
        Self {
            disk,
            ..Self::with_ceiling(policy.memory_ceiling)
        }
    }

    /// Memory-only cache with the given byte ceiling
    pub fn with_ceiling(ceiling: usize) -> Self {
        Self {
            entries: DashMap::new(),
            paths: DashMap::new(),
            pending: DashMap::new(),
            history: DashMap::new(),
            counters: Mutex::new(Counters::default()),
            used_bytes: AtomicUsize::new(0),
            clock: AtomicU64::new(0),
            ceiling,
            disk: None,
        }
    }

    /// Parsed unit for `path`, parsing only when its content is not cached
    pub fn get_or_parse(&self, path: &Path) -> Result<Arc<SourceUnit>, ParseError> {
        let bytes = fs::read(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let hash = content_hash(&bytes);
        self.history.entry(path.to_path_buf()).or_default().accesses += 1;
        self.bind_path(path, &hash);

        if let Some(unit) = self.lookup(&hash, path) {
            self.counters.lock().hits += 1;
            return Ok(unit);
        }

        let cell = self.pending.entry(hash.clone()).or_default().clone();
        // A concurrent parse may have finished between the lookup and here
        if let Some(unit) = self.lookup(&hash, path) {
            self.counters.lock().hits += 1;
            return Ok(unit);
        }

        let mut parsed = false;
        let result = cell.get_or_try_init(|| {
            parsed = true;
            self.load_or_parse(path, &hash, bytes)
        });
        let unit = match result {
            Ok(unit) => Arc::clone(unit),
            Err(e) => {
                self.pending.remove(&hash);
                return Err(e);
            }
        };

        if parsed {
            self.counters.lock().misses += 1;
            self.insert(&hash, Arc::clone(&unit));
            self.pending.remove(&hash);
        } else {
            self.counters.lock().hits += 1;
        }
        Ok(rebind(unit, path))
    }

    fn load_or_parse(
        &self,
        path: &Path,
        hash: &str,
        bytes: Vec<u8>,
    ) -> Result<Arc<SourceUnit>, ParseError> {
        let text = String::from_utf8(bytes).map_err(|e| ParseError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        if let Some(disk) = &self.disk
            && let Some(unit) = disk.load(hash, path, &text)
        {
            debug!("disk cache hit for {}", path.display());
            return Ok(Arc::new(unit));
        }
        let unit = SourceUnit::parse(path, text)?;
        if let Some(disk) = &self.disk {
            disk.store(&unit);
        }
        Ok(Arc::new(unit))
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lookup(&self, hash: &str, path: &Path) -> Option<Arc<SourceUnit>> {
        let mut entry = self.entries.get_mut(hash)?;
        entry.last_access = self.tick();
        entry.access_count += 1;
        Some(rebind(Arc::clone(&entry.unit), path))
    }

    fn insert(&self, hash: &str, unit: Arc<SourceUnit>) {
        let size = unit.size_bytes();
        let priority = self.priority_of(unit.path(), size as u64);
        let entry = CacheEntry {
            key: hash.to_string(),
            unit,
            size,
            last_access: self.tick(),
            access_count: 1,
            priority,
        };
        if let Some(previous) = self.entries.insert(hash.to_string(), entry) {
            self.used_bytes.fetch_sub(previous.size, Ordering::Relaxed);
        }
        self.used_bytes.fetch_add(size, Ordering::Relaxed);
    }

    /// Point `path` at `hash`, dropping the entry of its previous content
    fn bind_path(&self, path: &Path, hash: &str) {
        let previous = self.paths.insert(path.to_path_buf(), hash.to_string());
        if let Some(previous) = previous
            && previous != hash
            && !self.paths.iter().any(|p| *p.value() == previous)
        {
            debug!("{} changed; dropping superseded entry", path.display());
            self.drop_entry(&previous);
        }
    }

    fn drop_entry(&self, hash: &str) -> bool {
        match self.entries.remove(hash) {
            Some((_, entry)) => {
                self.used_bytes.fetch_sub(entry.size, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    fn priority_of(&self, path: &Path, size: u64) -> f64 {
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
        let history = self.history.get(path);
        PriorityFactors::compute(modified, SystemTime::now(), size, history.as_deref()).score()
    }

    /// Current priority of `path` from its size on disk and its history
    pub fn priority(&self, path: &Path) -> f64 {
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        self.priority_of(path, size)
    }

    /// Parse up to `budget` of `paths`, highest priority first
    pub fn warm(&self, paths: &[PathBuf], budget: usize) -> usize {
        let mut ranked: Vec<(f64, &PathBuf)> =
            paths.iter().map(|p| (self.priority(p), p)).collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        let mut warmed = 0;
        for (_, path) in ranked.into_iter().take(budget) {
            match self.get_or_parse(path) {
                Ok(_) => warmed += 1,
                Err(e) => debug!("warm skipped {}: {}", path.display(), e),
            }
        }
        self.counters.lock().warmed += warmed;
        debug!(warmed, budget, "cache warmed");
        warmed
    }

    /// Evict lowest-priority entries (oldest access first on ties) until the
    /// cache fits its ceiling. Returns the number evicted.
    pub fn evict_if_over_budget(&self) -> usize {
        self.evict_down_to(self.ceiling)
    }

    /// Evict in priority order until used bytes are at or below `limit`
    pub fn evict_down_to(&self, limit: usize) -> usize {
        if self.used_bytes() <= limit {
            return 0;
        }

        let snapshot: Vec<(String, PathBuf, usize, u64)> = self
            .entries
            .iter()
            .map(|e| (e.key.clone(), e.unit.path().to_path_buf(), e.size, e.last_access))
            .collect();
        let mut candidates: Vec<(f64, u64, String)> = snapshot
            .into_iter()
            .map(|(key, path, size, last_access)| {
                (self.priority_of(&path, size as u64), last_access, key)
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        let mut evicted = 0;
        for (_, _, key) in candidates {
            if self.used_bytes() <= limit {
                break;
            }
            if self.drop_entry(&key) {
                evicted += 1;
            }
        }
        self.counters.lock().evictions += evicted;
        info!(
            evicted,
            used_bytes = self.used_bytes(),
            limit,
            "cache eviction"
        );
        evicted
    }

    /// Feed analysis results back into the priority history
    pub fn record_outcome(&self, path: &Path, violations: usize, lines: usize, in_degree: usize) {
        let mut history = self.history.entry(path.to_path_buf()).or_default();
        history.violations = violations;
        history.lines = lines;
        history.in_degree = in_degree;
    }

    pub fn history(&self, path: &Path) -> Option<FileHistory> {
        self.history.get(path).map(|h| h.clone())
    }

    /// Drop every entry; priority history is kept
    pub fn clear(&self) {
        self.entries.clear();
        self.paths.clear();
        self.pending.clear();
        self.used_bytes.store(0, Ordering::Relaxed);
    }

    pub fn reset_stats(&self) {
        *self.counters.lock() = Counters::default();
    }

    pub fn stats(&self) -> CacheStats {
        let counters = self.counters.lock();
        let lookups = counters.hits + counters.misses;
        CacheStats {
            hits: counters.hits,
            misses: counters.misses,
            warmed: counters.warmed,
            evictions: counters.evictions,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                counters.hits as f64 / lookups as f64
            },
            used_bytes: self.used_bytes(),
            entries: self.entries.len(),
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes.load(Ordering::Relaxed)
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, hash: &str) -> Option<CacheEntry> {
        self.entries.get(hash).map(|e| e.clone())
    }

    pub fn disk(&self) -> Option<&DiskTier> {
        self.disk.as_ref()
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("entries", &self.entries.len())
            .field("used_bytes", &self.used_bytes())
            .field("ceiling", &self.ceiling)
            .field("disk", &self.disk.as_ref().map(|d| d.directory()))
            .finish()
    }
}

/// Identical content seen under another path keeps its own path
fn rebind(unit: Arc<SourceUnit>, path: &Path) -> Arc<SourceUnit> {
    if unit.path() == path {
        unit
    } else {
        Arc::new(unit.with_path(path))
    }
}
