//! Transform result cache.
//!
//! Keyed by absolute source path and validated by content: a hit requires
//! the source bytes and every composed dependency to be byte-identical to
//! what was cached, so stale results can never be served after an edit.
//! Memory pressure is handled with a coarse valve rather than per-entry
//! accounting: when the process's resident size crosses the configured
//! limit, the whole cache is dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use sysinfo::{get_current_pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, warn};

use crate::transform::TransformResult;

#[derive(Debug)]
struct CacheEntry {
    content_hash: blake3::Hash,
    /// Composed dependencies and their content hashes at transform time.
    deps: Vec<(PathBuf, blake3::Hash)>,
    result: Arc<TransformResult>,
}

#[derive(Debug)]
pub(crate) struct ResultCache {
    entries: DashMap<PathBuf, CacheEntry>,
    memory_limit: Option<u64>,
    system: Mutex<System>,
}

impl ResultCache {
    pub fn new(memory_limit: Option<u64>) -> Self {
        ResultCache {
            entries: DashMap::new(),
            memory_limit,
            system: Mutex::new(System::new()),
        }
    }

    /// Cached result for `path`, if `source` and every recorded dependency
    /// still match their transform-time content. Stale entries stay in the
    /// map; the next insert for the key supersedes them.
    pub fn get(&self, path: &Path, source: &[u8]) -> Option<Arc<TransformResult>> {
        let entry = self.entries.get(path)?;
        if blake3::hash(source) != entry.content_hash {
            debug!(path = %path.display(), "cache miss: source changed");
            return None;
        }
        for (dep, hash) in &entry.deps {
            let Ok(bytes) = std::fs::read(dep) else {
                debug!(path = %path.display(), dep = %dep.display(), "cache miss: dependency unreadable");
                return None;
            };
            if blake3::hash(&bytes) != *hash {
                debug!(path = %path.display(), dep = %dep.display(), "cache miss: dependency changed");
                return None;
            }
        }
        Some(Arc::clone(&entry.result))
    }

    pub fn insert(
        &self,
        path: PathBuf,
        source: &[u8],
        deps: Vec<(PathBuf, blake3::Hash)>,
        result: Arc<TransformResult>,
    ) {
        self.evict_if_over_limit();
        self.entries.insert(
            path,
            CacheEntry { content_hash: blake3::hash(source), deps, result },
        );
    }

    pub fn invalidate(&self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_if_over_limit(&self) {
        let Some(limit) = self.memory_limit else {
            return;
        };
        let Some(resident) = self.resident_memory() else {
            return;
        };
        if resident > limit && !self.entries.is_empty() {
            warn!(
                resident,
                limit,
                entries = self.entries.len(),
                "resident memory over limit, clearing result cache"
            );
            self.entries.clear();
        }
    }

    /// Resident set size of the current process in bytes.
    fn resident_memory(&self) -> Option<u64> {
        let pid = get_current_pid().ok()?;
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        Some(system.process(pid)?.memory())
    }
}
