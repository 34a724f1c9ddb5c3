//! Optional on-disk tier
//!
//! One `<content-hash>.json` file per unit holding the lowered tree and index.
//! Anything wrong with a stored entry is a [`CacheFault`]: it is logged,
//! the file is removed, and the caller parses from source instead.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::source::SourceUnit;
use crate::syntax::{FileIndex, SyntaxTree};

const FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheFault {
    #[error("cannot read cache entry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt cache entry {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache entry {path} is stale (format {found}, content {hash})")]
    Stale {
        path: PathBuf,
        found: u32,
        hash: String,
    },
}

#[derive(Serialize, Deserialize)]
struct StoredUnit {
    version: u32,
    content_hash: String,
    tree: SyntaxTree,
    index: FileIndex,
}

#[derive(Debug, Clone)]
pub struct DiskTier {
    directory: PathBuf,
}

impl DiskTier {
    /// Open (creating if needed) a cache directory
    pub fn open(directory: &Path) -> io::Result<Self> {
        fs::create_dir_all(directory)?;
        Ok(Self {
            directory: directory.to_path_buf(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, hash: &str) -> PathBuf {
        self.directory.join(format!("{}.json", hash))
    }

    /// Load a unit for `path` whose text hashes to `hash`. Faults become misses.
    pub fn load(&self, hash: &str, path: &Path, text: &str) -> Option<SourceUnit> {
        match self.try_load(hash) {
            Ok(Some(stored)) => Some(SourceUnit::from_parts(
                path.to_path_buf(),
                text.to_string(),
                stored.content_hash,
                stored.tree,
                stored.index,
            )),
            Ok(None) => None,
            Err(fault) => {
                warn!("{}; treating as a miss", fault);
                self.remove(hash);
                None
            }
        }
    }

    fn try_load(&self, hash: &str) -> Result<Option<StoredUnit>, CacheFault> {
        let entry = self.entry_path(hash);
        let bytes = match fs::read(&entry) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheFault::Io { path: entry, source }),
        };
        let stored: StoredUnit = serde_json::from_slice(&bytes).map_err(|source| {
            CacheFault::Corrupt {
                path: entry.clone(),
                source,
            }
        })?;
        if stored.version != FORMAT_VERSION || stored.content_hash != hash {
            return Err(CacheFault::Stale {
                path: entry,
                found: stored.version,
                hash: stored.content_hash,
            });
        }
        Ok(Some(stored))
    }

    /// Persist a unit. Write failures are logged and otherwise ignored.
    pub fn store(&self, unit: &SourceUnit) {
        let stored = StoredUnit {
            version: FORMAT_VERSION,
            content_hash: unit.content_hash().to_string(),
            tree: unit.tree().clone(),
            index: unit.index().clone(),
        };
        let entry = self.entry_path(unit.content_hash());
        let result = serde_json::to_vec(&stored)
            .map_err(io::Error::other)
            .and_then(|bytes| fs::write(&entry, bytes));
        if let Err(e) = result {
            warn!("failed to write cache entry {}: {}", entry.display(), e);
        }
    }

    pub fn remove(&self, hash: &str) {
        let entry = self.entry_path(hash);
        if let Err(e) = fs::remove_file(&entry)
            && e.kind() != io::ErrorKind::NotFound
        {
            debug!("could not remove {}: {}", entry.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit() -> SourceUnit {
        SourceUnit::parse("src/lib.rs", "fn a(x: u8) -> u8 { x + 1 }".to_string()).unwrap()
    }

    #[test]
    fn test_store_then_load() {
        let dir = TempDir::new().unwrap();
        let tier = DiskTier::open(dir.path()).unwrap();
        let original = unit();
        tier.store(&original);

        let loaded = tier
            .load(original.content_hash(), original.path(), original.text())
            .unwrap();
        assert_eq!(loaded.tree(), original.tree());
        assert_eq!(loaded.index(), original.index());
    }

    #[test]
    fn test_corrupt_entry_is_removed() {
        let dir = TempDir::new().unwrap();
        let tier = DiskTier::open(dir.path()).unwrap();
        let original = unit();
        let entry = dir.path().join(format!("{}.json", original.content_hash()));
        fs::write(&entry, b"{ not json").unwrap();

        assert!(
            tier.load(original.content_hash(), original.path(), original.text())
                .is_none()
        );
        assert!(!entry.exists());
    }

    #[test]
    fn test_missing_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let tier = DiskTier::open(dir.path()).unwrap();
        assert!(tier.load("abc", Path::new("x.rs"), "").is_none());
    }
}
