//! Index packer: the publishing side of the update protocol.
//!
//! Given the complete record set of a repository at a timestamp, the packer
//! writes a new snapshot, a chunk holding the difference from the previously
//! published snapshot, and a manifest listing both. Directory layout after
//! three publications:
//!
//! ```text
//! out/
//!   index-manifest.json
//!   snapshot-1709856000000.json
//!   chunk-1709251200000-1709510400000.json
//!   chunk-1709510400000-1709856000000.json
//! ```
//!
//! Only the newest snapshot is kept. Chunks beyond `max_chunks` are pruned
//! oldest-first; clients older than the oldest chunk fall back to a full
//! update.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use artifact_index_core::manifest::{
    decode, encode, sha256_hex, ChunkDescriptor, ChunkOperation, IndexChunk, IndexSnapshot,
    ResourceRef, UpdateManifest, MANIFEST_RESOURCE,
};
use artifact_index_core::{ArtifactKey, ArtifactRecord, IndexError, Result, Timestamp};

use crate::context::write_atomic;

pub const DEFAULT_MAX_CHUNKS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSummary {
    pub timestamp: Timestamp,
    pub snapshot: String,
    /// `None` on the first publication.
    pub chunk: Option<String>,
    pub records: usize,
    pub added: usize,
    pub deleted: usize,
    pub pruned: usize,
}

fn snapshot_name(ts: Timestamp) -> String {
    format!("snapshot-{}.json", ts.timestamp_millis())
}

fn chunk_name(from: Timestamp, to: Timestamp) -> String {
    format!("chunk-{}-{}.json", from.timestamp_millis(), to.timestamp_millis())
}

fn read_resource<T: serde::de::DeserializeOwned>(dir: &Path, name: &str) -> Result<Option<T>> {
    match std::fs::read(dir.join(name)) {
        Ok(bytes) => decode(name, &bytes).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_resource<T: serde::Serialize>(dir: &Path, name: &str, value: &T) -> Result<String> {
    let bytes = encode(name, value)?;
    write_atomic(&dir.join(name), &bytes)?;
    Ok(sha256_hex(&bytes))
}

/// Publish `records` as the state of the repository at `timestamp`.
pub fn pack(
    out_dir: &Path,
    records: Vec<ArtifactRecord>,
    timestamp: Timestamp,
    max_chunks: usize,
) -> Result<PackSummary> {
    if max_chunks == 0 {
        return Err(IndexError::Config("max_chunks must be >= 1".to_string()));
    }
    std::fs::create_dir_all(out_dir)?;

    let previous: Option<UpdateManifest> = read_resource(out_dir, MANIFEST_RESOURCE)?;
    if let Some(prev) = &previous {
        if timestamp <= prev.timestamp {
            return Err(IndexError::Config(format!(
                "timestamp {} is not after the published head {}",
                timestamp, prev.timestamp
            )));
        }
    }

    // Last occurrence of a key wins.
    let current: BTreeMap<ArtifactKey, ArtifactRecord> =
        records.into_iter().map(|r| (r.key(), r)).collect();

    let mut chunks = previous
        .as_ref()
        .map(|m| m.chunks.clone())
        .unwrap_or_default();
    let mut chunk_written = None;
    let (mut added, mut deleted) = (current.len(), 0);

    if let Some(prev) = &previous {
        let prev_snapshot: IndexSnapshot = read_resource(out_dir, &prev.snapshot.name)?
            .ok_or_else(|| {
                IndexError::format(&prev.snapshot.name, "published snapshot is missing")
            })?;
        let before: BTreeMap<ArtifactKey, ArtifactRecord> = prev_snapshot
            .records
            .into_iter()
            .map(|r| (r.key(), r))
            .collect();

        let mut operations = Vec::new();
        for (key, old) in &before {
            if !current.contains_key(key) {
                operations.push(ChunkOperation::Delete {
                    timestamp,
                    key: old.key(),
                });
            }
        }
        deleted = operations.len();
        for (key, record) in &current {
            if before.get(key) != Some(record) {
                operations.push(ChunkOperation::Add {
                    timestamp,
                    record: record.clone(),
                });
            }
        }
        added = operations.len() - deleted;

        let name = chunk_name(prev.timestamp, timestamp);
        let chunk = IndexChunk {
            from: prev.timestamp,
            to: timestamp,
            operations,
        };
        let sha256 = write_resource(out_dir, &name, &chunk)?;
        debug!("wrote {} ({} added, {} deleted)", name, added, deleted);
        chunks.push(ChunkDescriptor {
            name: name.clone(),
            from: prev.timestamp,
            to: timestamp,
            sha256: Some(sha256),
        });
        chunk_written = Some(name);
    }

    let mut pruned = Vec::new();
    if chunks.len() > max_chunks {
        pruned = chunks.drain(..chunks.len() - max_chunks).collect();
    }

    let snapshot = IndexSnapshot {
        timestamp,
        records: current.into_values().collect(),
    };
    let record_count = snapshot.records.len();
    let snapshot_file = snapshot_name(timestamp);
    let snapshot_sha = write_resource(out_dir, &snapshot_file, &snapshot)?;

    let manifest = UpdateManifest {
        timestamp,
        snapshot: ResourceRef {
            name: snapshot_file.clone(),
            sha256: Some(snapshot_sha),
        },
        chunks,
    };
    write_resource(out_dir, MANIFEST_RESOURCE, &manifest)?;

    // Superseded files go only after the new manifest is in place.
    let mut stale: Vec<PathBuf> = pruned.iter().map(|c| out_dir.join(&c.name)).collect();
    if let Some(prev) = &previous {
        if prev.snapshot.name != snapshot_file {
            stale.push(out_dir.join(&prev.snapshot.name));
        }
    }
    for path in stale {
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("failed to remove {}: {}", path.display(), e);
        }
    }

    info!(
        "packed {} records at {} into {}",
        record_count,
        timestamp,
        out_dir.display()
    );
    Ok(PackSummary {
        timestamp,
        snapshot: snapshot_file,
        chunk: chunk_written,
        records: record_count,
        added,
        deleted,
        pruned: pruned.len(),
    })
}

/// `aidx pack`: publish a JSON array of records.
pub fn run_pack(
    records_path: &Path,
    out_dir: &Path,
    timestamp: Option<&str>,
    max_chunks: usize,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(records_path)
        .with_context(|| format!("Failed to read records file: {}", records_path.display()))?;
    let records: Vec<ArtifactRecord> =
        serde_json::from_str(&content).with_context(|| "Failed to parse records file")?;
    let timestamp = match timestamp {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Invalid --timestamp '{}'. Use RFC 3339.", raw))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let summary = pack(out_dir, records, timestamp, max_chunks)?;
    println!("pack {}", out_dir.display());
    println!("  timestamp: {}", summary.timestamp);
    println!("  records: {}", summary.records);
    println!("  snapshot: {}", summary.snapshot);
    if let Some(chunk) = &summary.chunk {
        println!("  chunk: {} (+{} / -{})", chunk, summary.added, summary.deleted);
    }
    if summary.pruned > 0 {
        println!("  pruned chunks: {}", summary.pruned);
    }
    println!("ok");
    Ok(())
}
