//! Update synchronizer: brings a context up to the remote head.
//!
//! # Pipeline
//!
//! ```text
//! fetch index-manifest.json
//!         │
//!         ▼
//!    plan_update(local, manifest)
//!         │
//!   ┌─────┼──────────────────────┬──────────────────────┐
//!   ▼     ▼                      ▼                      │
//! UpToDate  Incremental{chunks}  Full{reason}           │
//!   │     │  clone current store │ fetch snapshot       │
//!   │     │  fetch + verify each │ verify + decode      │
//!   │     │  apply in ts order   │ rebuild store        │
//!   │     │  ── gap? ────────────┼──────────────────────┘
//!   │     ▼                      ▼
//!   │   publish (persist snapshot, atomic swap)
//!   ▼
//! NoUpdate
//! ```
//!
//! Any failure before publishing leaves the current generation and its
//! timestamp untouched. Updates on one context are serialized; a caller
//! timeout drops the in-flight work.

use std::time::Duration;

use anyhow::Context as _;
use chrono::Utc;
use tracing::{debug, info, warn};

use artifact_index_core::manifest::{
    decode, verify_digest, ChunkDescriptor, IndexChunk, IndexSnapshot, UpdateManifest,
    MANIFEST_RESOURCE,
};
use artifact_index_core::store::FieldIndexStore;
use artifact_index_core::sync::{
    apply_chunk, build_from_snapshot, check_chunk, plan_update, ApplyStats, FullUpdateReason,
    UpdatePlan,
};
use artifact_index_core::{IndexError, Result, Timestamp};

use crate::config::Config;
use crate::context::IndexingContext;
use crate::fetcher::{fetcher_for_url, ResourceFetcher};
use crate::progress::ProgressMode;

/// Parameters of one update run.
pub struct IndexUpdateRequest<'a> {
    pub context: &'a IndexingContext,
    pub fetcher: &'a dyn ResourceFetcher,
    /// Bound on the whole run, including waiting for a concurrent update.
    pub timeout: Option<Duration>,
    /// Skip planning and download the full snapshot.
    pub force_full: bool,
    /// Reuse and populate the chunk cache.
    pub use_cache: bool,
}

impl<'a> IndexUpdateRequest<'a> {
    pub fn new(context: &'a IndexingContext, fetcher: &'a dyn ResourceFetcher) -> Self {
        Self {
            context,
            fetcher,
            timeout: None,
            force_full: false,
            use_cache: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn force_full(mut self, force_full: bool) -> Self {
        self.force_full = force_full;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    FullUpdate { timestamp: Timestamp },
    IncrementalUpdate { from: Timestamp, to: Timestamp },
    NoUpdate { timestamp: Timestamp },
}

impl UpdateOutcome {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            UpdateOutcome::FullUpdate { timestamp } | UpdateOutcome::NoUpdate { timestamp } => {
                *timestamp
            }
            UpdateOutcome::IncrementalUpdate { to, .. } => *to,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexUpdateResult {
    pub outcome: UpdateOutcome,
    pub stats: ApplyStats,
    pub chunks_applied: usize,
    /// Resources read through the fetcher (cache hits excluded).
    pub resources_fetched: usize,
}

/// Run one update against `request.context`.
pub async fn fetch_and_update_index(request: &IndexUpdateRequest<'_>) -> Result<IndexUpdateResult> {
    request.context.ensure_open()?;
    let work = async {
        let _guard = request.context.update_lock().lock().await;
        run(request).await
    };
    match request.timeout {
        Some(limit) => match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!("update of '{}' timed out after {:?}", request.context.id(), limit);
                Err(IndexError::Timeout(limit))
            }
        },
        None => work.await,
    }
}

struct Run<'r, 'a> {
    request: &'r IndexUpdateRequest<'a>,
    fetched: usize,
}

impl Run<'_, '_> {
    async fn fetch(&mut self, resource: &str) -> Result<Vec<u8>> {
        let bytes = self.request.fetcher.fetch(resource).await?;
        self.fetched += 1;
        Ok(bytes)
    }
}

async fn run(request: &IndexUpdateRequest<'_>) -> Result<IndexUpdateResult> {
    let ctx = request.context;
    let mut state = Run {
        request,
        fetched: 0,
    };

    let manifest_bytes = state.fetch(MANIFEST_RESOURCE).await?;
    let manifest: UpdateManifest = decode(MANIFEST_RESOURCE, &manifest_bytes)?;
    manifest.validate()?;

    let local = ctx.current_timestamp();
    let plan = if request.force_full {
        UpdatePlan::Full {
            reason: FullUpdateReason::Forced,
        }
    } else {
        plan_update(local, &manifest)
    };
    debug!("update plan for '{}': {:?}", ctx.id(), plan);

    let reason = match plan {
        UpdatePlan::UpToDate => {
            info!("'{}' is up to date at {}", ctx.id(), manifest.timestamp);
            return Ok(IndexUpdateResult {
                outcome: UpdateOutcome::NoUpdate {
                    timestamp: manifest.timestamp,
                },
                stats: ApplyStats::default(),
                chunks_applied: 0,
                resources_fetched: state.fetched,
            });
        }
        UpdatePlan::Incremental { chunks } => {
            // The planner only yields chunks when a local index exists.
            let from = local.ok_or(IndexError::ManifestGap {
                local: manifest.timestamp,
                head: manifest.timestamp,
            })?;
            match incremental(&mut state, &chunks).await {
                Ok((store, stats)) => {
                    ctx.publish(store, manifest.timestamp)?;
                    info!(
                        "incremental update of '{}' {} -> {}: {} chunks, {} added, {} deleted",
                        ctx.id(),
                        from,
                        manifest.timestamp,
                        chunks.len(),
                        stats.added,
                        stats.deleted
                    );
                    return Ok(IndexUpdateResult {
                        outcome: UpdateOutcome::IncrementalUpdate {
                            from,
                            to: manifest.timestamp,
                        },
                        stats,
                        chunks_applied: chunks.len(),
                        resources_fetched: state.fetched,
                    });
                }
                Err(IndexError::ManifestGap { .. }) => {
                    warn!("chunk payloads disagree with the manifest, falling back to a full update");
                    FullUpdateReason::ManifestGap
                }
                Err(e) => return Err(e),
            }
        }
        UpdatePlan::Full { reason } => reason,
    };

    info!("full update of '{}': {}", ctx.id(), reason);
    let snapshot_ref = &manifest.snapshot;
    let bytes = state.fetch(&snapshot_ref.name).await?;
    verify_digest(&snapshot_ref.name, &bytes, snapshot_ref.sha256.as_deref())?;
    let snapshot: IndexSnapshot = decode(&snapshot_ref.name, &bytes)?;
    drop(bytes);
    if snapshot.timestamp != manifest.timestamp {
        return Err(IndexError::format(
            &snapshot_ref.name,
            format!(
                "snapshot timestamp {} differs from manifest head {}",
                snapshot.timestamp, manifest.timestamp
            ),
        ));
    }
    let timestamp = manifest.timestamp;
    let (store, stats) = build_from_snapshot(ctx.extractors().clone(), snapshot);
    ctx.publish(store, timestamp)?;
    info!(
        "full update of '{}' at {}: {} records, {} skipped",
        ctx.id(),
        timestamp,
        stats.added,
        stats.skipped
    );
    Ok(IndexUpdateResult {
        outcome: UpdateOutcome::FullUpdate { timestamp },
        stats,
        chunks_applied: 0,
        resources_fetched: state.fetched,
    })
}

async fn incremental(
    state: &mut Run<'_, '_>,
    chunks: &[ChunkDescriptor],
) -> Result<(FieldIndexStore, ApplyStats)> {
    let ctx = state.request.context;
    let mut working = ctx.generation().store.clone();
    let mut stats = ApplyStats::default();

    for descriptor in chunks {
        let bytes = load_chunk(state, descriptor).await?;
        let chunk: IndexChunk = decode(&descriptor.name, &bytes)?;
        check_chunk(descriptor, &chunk)?;
        let applied = apply_chunk(&mut working, &chunk);
        debug!(
            "chunk {}: {} added, {} deleted, {} skipped",
            descriptor.name, applied.added, applied.deleted, applied.skipped
        );
        stats.merge(applied);
    }
    Ok((working, stats))
}

async fn load_chunk(state: &mut Run<'_, '_>, descriptor: &ChunkDescriptor) -> Result<Vec<u8>> {
    let ctx = state.request.context;
    let use_cache = state.request.use_cache;
    if use_cache {
        if let Some(sha) = descriptor.sha256.as_deref() {
            if let Some(bytes) = ctx.read_cached(&descriptor.name, sha) {
                debug!("using cached {}", descriptor.name);
                return Ok(bytes);
            }
        }
    }
    let bytes = state.fetch(&descriptor.name).await?;
    verify_digest(&descriptor.name, &bytes, descriptor.sha256.as_deref())?;
    if use_cache {
        ctx.write_cache(&descriptor.name, &bytes);
    }
    Ok(bytes)
}

/// `aidx update`: apply the configured policy, then update.
pub async fn run_update(
    config: &Config,
    full: bool,
    force: bool,
    progress: ProgressMode,
) -> anyhow::Result<()> {
    let ctx = IndexingContext::from_config(config)?;
    let local = ctx.current_timestamp();
    if !config.update.should_update(local, Utc::now(), force || full) {
        println!("update {}", ctx.id());
        println!(
            "  skipped: policy '{:?}' does not require an update yet",
            config.update.policy
        );
        ctx.close(false)?;
        return Ok(());
    }

    let fetcher = fetcher_for_url(
        ctx.repository_url(),
        config.update.request_timeout(),
        progress.listener(),
    )?;
    let mut request = IndexUpdateRequest::new(&ctx, fetcher.as_ref())
        .force_full(full)
        .use_cache(config.update.use_cache);
    if let Some(timeout) = config.update.timeout() {
        request = request.with_timeout(timeout);
    }

    let result = fetch_and_update_index(&request)
        .await
        .with_context(|| format!("update of '{}' from {} failed", ctx.id(), fetcher.describe()))?;

    println!("update {}", ctx.id());
    match &result.outcome {
        UpdateOutcome::FullUpdate { timestamp } => {
            println!("  outcome: full update");
            println!("  timestamp: {}", timestamp);
        }
        UpdateOutcome::IncrementalUpdate { from, to } => {
            println!("  outcome: incremental update");
            println!("  from: {}", from);
            println!("  to: {}", to);
            println!("  chunks applied: {}", result.chunks_applied);
        }
        UpdateOutcome::NoUpdate { timestamp } => {
            println!("  outcome: no update");
            println!("  timestamp: {}", timestamp);
        }
    }
    println!("  added: {}", result.stats.added);
    println!("  deleted: {}", result.stats.deleted);
    if result.stats.skipped > 0 {
        println!("  skipped: {}", result.stats.skipped);
    }
    println!("  resources fetched: {}", result.resources_fetched);
    println!("ok");

    ctx.close(false)?;
    Ok(())
}
