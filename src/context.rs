//! Indexing contexts: one local mirror of one remote repository.
//!
//! An [`IndexingContext`] binds a repository to an index directory and a
//! cache directory, owns the extractor set, and holds exactly one current
//! [`IndexGeneration`]. Readers take a cheap [`Arc`] of the current
//! generation and never block; the updater builds a new generation off to
//! the side and publishes it with a single atomic pointer store.
//!
//! # On-disk layout
//!
//! ```text
//! index_dir/
//!   .aidx.lock             owner of this directory (context + repository id)
//!   index-snapshot.json    records in document order + index timestamp
//! cache_dir/
//!   <chunk name>           downloaded chunk payloads, reused by sha256
//! ```
//!
//! A lock held by a context for a *different* repository makes
//! [`open`](IndexingContext::open) fail; a lock left behind for the same
//! repository is taken over. A context only removes the lock file while it
//! still holds the lock it wrote, and hands the lock back to the holder it
//! displaced when that holder is another live process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use artifact_index_core::extractor::ExtractorSet;
use artifact_index_core::manifest::{decode, encode, sha256_hex, IndexSnapshot};
use artifact_index_core::search::{
    self, FlatSearchRequest, FlatSearchResponse, GroupedSearchRequest, GroupedSearchResponse,
};
use artifact_index_core::store::FieldIndexStore;
use artifact_index_core::sync::build_from_snapshot;
use artifact_index_core::{Field, IndexError, Result, Timestamp};

use crate::config::Config;

pub const LOCK_FILE: &str = ".aidx.lock";
pub const SNAPSHOT_FILE: &str = "index-snapshot.json";

/// An immutable store paired with the timestamp it reflects.
#[derive(Debug)]
pub struct IndexGeneration {
    pub store: FieldIndexStore,
    /// `None` until the first successful update.
    pub timestamp: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockInfo {
    context_id: String,
    repository_id: String,
    pid: u32,
    acquired: Timestamp,
}

/// The lock this context wrote, plus the one it replaced.
#[derive(Debug)]
struct HeldLock {
    info: LockInfo,
    displaced: Option<LockInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStats {
    pub id: String,
    pub repository_id: String,
    pub repository_url: String,
    pub timestamp: Option<Timestamp>,
    pub documents: usize,
    pub terms: BTreeMap<Field, usize>,
    pub extractors: Vec<String>,
}

pub struct IndexingContext {
    id: String,
    repository_id: String,
    repository_url: String,
    cache_dir: PathBuf,
    index_dir: PathBuf,
    extractors: ExtractorSet,
    current: ArcSwap<IndexGeneration>,
    update_lock: tokio::sync::Mutex<()>,
    lock: HeldLock,
    closed: AtomicBool,
}

impl IndexingContext {
    /// Open (or create) a context over `index_dir`.
    ///
    /// Loads the persisted snapshot when one exists. An unreadable snapshot
    /// is logged and the context starts with no local index.
    pub fn open(
        id: &str,
        repository_id: &str,
        repository_url: &str,
        cache_dir: impl Into<PathBuf>,
        index_dir: impl Into<PathBuf>,
        extractors: ExtractorSet,
    ) -> Result<Self> {
        let cache_dir = cache_dir.into();
        let index_dir = index_dir.into();
        if extractors.is_empty() {
            return Err(IndexError::Config(format!(
                "context '{}' has no extractors",
                id
            )));
        }
        for dir in [&index_dir, &cache_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                IndexError::Config(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }

        let lock = acquire_lock(&index_dir, id, repository_id)?;

        let generation = match load_snapshot(&index_dir, &extractors) {
            Ok(Some(generation)) => generation,
            Ok(None) => IndexGeneration {
                store: FieldIndexStore::new(extractors.clone()),
                timestamp: None,
            },
            Err(e) => {
                warn!("ignoring unreadable snapshot in {}: {}", index_dir.display(), e);
                IndexGeneration {
                    store: FieldIndexStore::new(extractors.clone()),
                    timestamp: None,
                }
            }
        };
        info!(
            "opened context '{}' for repository '{}' ({} documents)",
            id,
            repository_id,
            generation.store.len()
        );

        Ok(Self {
            id: id.to_string(),
            repository_id: repository_id.to_string(),
            repository_url: repository_url.to_string(),
            cache_dir,
            index_dir,
            extractors,
            current: ArcSwap::from_pointee(generation),
            update_lock: tokio::sync::Mutex::new(()),
            lock,
            closed: AtomicBool::new(false),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let ctx = &config.context;
        let extractors = ExtractorSet::from_ids(&ctx.extractors)?;
        Self::open(
            &ctx.id,
            &ctx.repository_id,
            &ctx.repository_url,
            &ctx.cache_dir,
            &ctx.index_dir,
            extractors,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    pub fn repository_url(&self) -> &str {
        &self.repository_url
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn extractors(&self) -> &ExtractorSet {
        &self.extractors
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(IndexError::Config(format!("context '{}' is closed", self.id)));
        }
        Ok(())
    }

    /// The generation readers currently see.
    pub fn generation(&self) -> Arc<IndexGeneration> {
        self.current.load_full()
    }

    pub fn current_timestamp(&self) -> Option<Timestamp> {
        self.current.load().timestamp
    }

    pub fn search_flat(&self, request: &FlatSearchRequest) -> Result<FlatSearchResponse> {
        self.ensure_open()?;
        let generation = self.generation();
        search::search_flat(&generation.store, request)
    }

    pub fn search_grouped(&self, request: &GroupedSearchRequest) -> Result<GroupedSearchResponse> {
        self.ensure_open()?;
        let generation = self.generation();
        search::search_grouped(&generation.store, request)
    }

    pub fn stats(&self) -> ContextStats {
        let generation = self.generation();
        let terms = self
            .extractors
            .fields()
            .into_iter()
            .map(|f| (f, generation.store.term_count(f)))
            .collect();
        ContextStats {
            id: self.id.clone(),
            repository_id: self.repository_id.clone(),
            repository_url: self.repository_url.clone(),
            timestamp: generation.timestamp,
            documents: generation.store.len(),
            terms,
            extractors: self.extractors.ids().iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Serializes updates on this context.
    pub(crate) fn update_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.update_lock
    }

    /// Persist `store` as the snapshot at `timestamp`, then make it current.
    ///
    /// If persisting fails nothing is swapped and readers keep the previous
    /// generation.
    pub(crate) fn publish(&self, store: FieldIndexStore, timestamp: Timestamp) -> Result<()> {
        self.ensure_open()?;
        let snapshot = IndexSnapshot {
            timestamp,
            records: store.records().map(|(_, r)| (**r).clone()).collect(),
        };
        let bytes = encode(SNAPSHOT_FILE, &snapshot)?;
        write_atomic(&self.index_dir.join(SNAPSHOT_FILE), &bytes)?;
        self.current.store(Arc::new(IndexGeneration {
            store,
            timestamp: Some(timestamp),
        }));
        debug!("published generation at {}", timestamp);
        Ok(())
    }

    /// Cached payload for `name`, if present and matching `sha256`.
    pub(crate) fn read_cached(&self, name: &str, sha256: &str) -> Option<Vec<u8>> {
        let bytes = std::fs::read(self.cache_dir.join(name)).ok()?;
        if sha256_hex(&bytes).eq_ignore_ascii_case(sha256) {
            Some(bytes)
        } else {
            debug!("stale cache entry for {}", name);
            None
        }
    }

    /// Store a payload in the cache. Failures are logged, never returned.
    pub(crate) fn write_cache(&self, name: &str, bytes: &[u8]) {
        if let Err(e) = write_atomic(&self.cache_dir.join(name), bytes) {
            warn!("failed to cache {}: {}", name, e);
        }
    }

    /// Release the directory lock, optionally deleting index and cache files.
    /// Closing twice is a no-op.
    pub fn close(&self, delete_files: bool) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        release_lock(&self.index_dir, &self.lock);
        if delete_files {
            for dir in [&self.index_dir, &self.cache_dir] {
                match std::fs::remove_dir_all(dir) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        info!("closed context '{}'", self.id);
        Ok(())
    }
}

impl Drop for IndexingContext {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            release_lock(&self.index_dir, &self.lock);
        }
    }
}

impl std::fmt::Debug for IndexingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexingContext")
            .field("id", &self.id)
            .field("repository_id", &self.repository_id)
            .field("index_dir", &self.index_dir)
            .field("timestamp", &self.current_timestamp())
            .finish()
    }
}

fn acquire_lock(index_dir: &Path, id: &str, repository_id: &str) -> Result<HeldLock> {
    let path = index_dir.join(LOCK_FILE);
    let displaced = match std::fs::read(&path) {
        Ok(bytes) => {
            let held: LockInfo = serde_json::from_slice(&bytes).map_err(|e| {
                IndexError::Config(format!("unreadable lock file {}: {}", path.display(), e))
            })?;
            if held.repository_id != repository_id {
                return Err(IndexError::Config(format!(
                    "{} is locked by context '{}' for repository '{}'",
                    index_dir.display(),
                    held.context_id,
                    held.repository_id
                )));
            }
            warn!(
                "taking over lock held by context '{}' (pid {}) for repository '{}'",
                held.context_id, held.pid, repository_id
            );
            Some(held)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            return Err(IndexError::Config(format!(
                "cannot read {}: {}",
                path.display(),
                e
            )))
        }
    };

    let info = LockInfo {
        context_id: id.to_string(),
        repository_id: repository_id.to_string(),
        pid: std::process::id(),
        acquired: Utc::now(),
    };
    let bytes = serde_json::to_vec_pretty(&info)
        .map_err(|e| IndexError::Config(format!("cannot encode lock: {}", e)))?;
    std::fs::write(&path, bytes).map_err(|e| {
        IndexError::Config(format!("{} is not writable: {}", index_dir.display(), e))
    })?;
    Ok(HeldLock { info, displaced })
}

/// Give up the lock, unless another context has since taken it over.
fn release_lock(index_dir: &Path, lock: &HeldLock) {
    let path = index_dir.join(LOCK_FILE);
    let current: Option<LockInfo> = match std::fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes).ok(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            warn!("failed to read lock in {}: {}", index_dir.display(), e);
            return;
        }
    };
    if current.as_ref() != Some(&lock.info) {
        debug!(
            "lock in {} was taken over, leaving it in place",
            index_dir.display()
        );
        return;
    }

    if let Some(previous) = lock
        .displaced
        .as_ref()
        .filter(|p| p.pid != lock.info.pid && process_alive(p.pid))
    {
        debug!(
            "handing lock in {} back to context '{}' (pid {})",
            index_dir.display(),
            previous.context_id,
            previous.pid
        );
        match serde_json::to_vec_pretty(previous) {
            Ok(bytes) => match std::fs::write(&path, bytes) {
                Ok(()) => return,
                Err(e) => warn!("failed to restore lock in {}: {}", index_dir.display(), e),
            },
            Err(e) => warn!("cannot encode lock: {}", e),
        }
    }

    match std::fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to release lock in {}: {}", index_dir.display(), e),
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

// Without a cheap liveness check a displaced holder is treated as gone.
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    false
}

fn load_snapshot(index_dir: &Path, extractors: &ExtractorSet) -> Result<Option<IndexGeneration>> {
    let path = index_dir.join(SNAPSHOT_FILE);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let snapshot: IndexSnapshot = decode(SNAPSHOT_FILE, &bytes)?;
    let timestamp = snapshot.timestamp;
    let (store, stats) = build_from_snapshot(extractors.clone(), snapshot);
    if stats.skipped > 0 {
        warn!("{} persisted records were rejected on load", stats.skipped);
    }
    Ok(Some(IndexGeneration {
        store,
        timestamp: Some(timestamp),
    }))
}

/// Write via a sibling temp file and rename, so readers never see a
/// partial file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| IndexError::Config(format!("invalid path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
