//! Update planning and chunk application.
//!
//! The planner compares the local index timestamp with a fetched
//! [`UpdateManifest`] and decides what to download:
//!
//! | Local | Manifest | Plan |
//! |-------|----------|------|
//! | none | any | [`UpdatePlan::Full`] (`NoLocalIndex`) |
//! | `== head` | any | [`UpdatePlan::UpToDate`] |
//! | `< head`, contiguous chain | chunks | [`UpdatePlan::Incremental`] |
//! | otherwise | | [`UpdatePlan::Full`] (`ManifestGap`) |
//!
//! Applying chunks mutates a working copy of the store; publishing it is the
//! caller's job. Nothing here performs I/O.

use std::fmt;

use tracing::{debug, warn};

use crate::error::{IndexError, Result};
use crate::extractor::ExtractorSet;
use crate::manifest::{ChunkDescriptor, ChunkOperation, IndexChunk, IndexSnapshot, UpdateManifest};
use crate::models::Timestamp;
use crate::store::FieldIndexStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullUpdateReason {
    NoLocalIndex,
    ManifestGap,
    /// Requested by the caller.
    Forced,
}

impl fmt::Display for FullUpdateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FullUpdateReason::NoLocalIndex => write!(f, "no local index"),
            FullUpdateReason::ManifestGap => write!(f, "chunk history does not reach the local index"),
            FullUpdateReason::Forced => write!(f, "full update requested"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePlan {
    UpToDate,
    Full { reason: FullUpdateReason },
    Incremental { chunks: Vec<ChunkDescriptor> },
}

pub fn plan_update(local: Option<Timestamp>, manifest: &UpdateManifest) -> UpdatePlan {
    let Some(local) = local else {
        return UpdatePlan::Full {
            reason: FullUpdateReason::NoLocalIndex,
        };
    };
    if local == manifest.timestamp {
        return UpdatePlan::UpToDate;
    }
    match chunk_chain(local, manifest) {
        Ok(chunks) => UpdatePlan::Incremental { chunks },
        Err(e) => {
            debug!("{}", e);
            UpdatePlan::Full {
                reason: FullUpdateReason::ManifestGap,
            }
        }
    }
}

/// The contiguous chunks leading from `local` to the manifest head.
///
/// Fails with [`IndexError::ManifestGap`] when a link is missing, a chunk
/// overshoots the head, or `local` is ahead of the head.
pub fn chunk_chain(local: Timestamp, manifest: &UpdateManifest) -> Result<Vec<ChunkDescriptor>> {
    let head = manifest.timestamp;
    let gap = || IndexError::ManifestGap { local, head };
    if local > head {
        return Err(gap());
    }

    let mut chain = Vec::new();
    let mut cursor = local;
    while cursor < head {
        let next = manifest
            .chunks
            .iter()
            .find(|c| c.from == cursor)
            .ok_or_else(gap)?;
        if next.to <= cursor || next.to > head {
            return Err(gap());
        }
        chain.push(next.clone());
        cursor = next.to;
    }
    Ok(chain)
}

/// Reject a chunk payload whose range disagrees with its descriptor.
pub fn check_chunk(descriptor: &ChunkDescriptor, chunk: &IndexChunk) -> Result<()> {
    if chunk.from != descriptor.from || chunk.to != descriptor.to {
        warn!(
            "chunk '{}' covers {}..{} but the manifest says {}..{}",
            descriptor.name, chunk.from, chunk.to, descriptor.from, descriptor.to
        );
        return Err(IndexError::ManifestGap {
            local: descriptor.from,
            head: descriptor.to,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub added: usize,
    pub deleted: usize,
    /// Records rejected by an extractor, and deletes of absent keys.
    pub skipped: usize,
}

impl ApplyStats {
    pub fn merge(&mut self, other: ApplyStats) {
        self.added += other.added;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
    }
}

/// Apply one chunk to a working store, in operation-timestamp order.
///
/// The sort is stable, so operations sharing a timestamp keep their
/// order within the chunk.
pub fn apply_chunk(store: &mut FieldIndexStore, chunk: &IndexChunk) -> ApplyStats {
    let mut ops: Vec<&ChunkOperation> = chunk.operations.iter().collect();
    ops.sort_by_key(|op| op.timestamp());

    let mut stats = ApplyStats::default();
    for op in ops {
        match op {
            ChunkOperation::Add { record, .. } => match store.add(record.clone()) {
                Ok(_) => stats.added += 1,
                Err(e) => {
                    // A rejected replacement leaves the key absent, as a
                    // snapshot rebuild would.
                    warn!("skipping record: {}", e);
                    if store.remove_key(&record.key()).is_some() {
                        debug!("dropped previous version of {}", record.key());
                    }
                    stats.skipped += 1;
                }
            },
            ChunkOperation::Delete { key, .. } => {
                if store.remove_key(key).is_some() {
                    stats.deleted += 1;
                } else {
                    debug!("delete of absent artifact {}", key);
                    stats.skipped += 1;
                }
            }
        }
    }
    debug!(
        "applied chunk {}..{}: {} added, {} deleted, {} skipped",
        chunk.from, chunk.to, stats.added, stats.deleted, stats.skipped
    );
    stats
}

/// Rebuild a store from a full snapshot.
pub fn build_from_snapshot(extractors: ExtractorSet, snapshot: IndexSnapshot) -> (FieldIndexStore, ApplyStats) {
    let total = snapshot.records.len();
    let (store, rejected) = FieldIndexStore::from_records(extractors, snapshot.records);
    let stats = ApplyStats {
        added: total - rejected.len(),
        deleted: 0,
        skipped: rejected.len(),
    };
    (store, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Field;
    use crate::manifest::ResourceRef;
    use crate::models::ArtifactRecord;
    use crate::query::SearchPredicate;
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()
    }

    fn desc(from: u32, to: u32) -> ChunkDescriptor {
        ChunkDescriptor {
            name: format!("chunk-{}-{}.json", from, to),
            from: day(from),
            to: day(to),
            sha256: None,
        }
    }

    fn manifest(head: u32, chunks: Vec<ChunkDescriptor>) -> UpdateManifest {
        UpdateManifest {
            timestamp: day(head),
            snapshot: ResourceRef {
                name: "snapshot.json".into(),
                sha256: None,
            },
            chunks,
        }
    }

    fn rec(a: &str, v: &str) -> ArtifactRecord {
        ArtifactRecord::new("g", a, v, day(1))
    }

    #[test]
    fn plan_without_local_is_full() {
        let plan = plan_update(None, &manifest(3, vec![]));
        assert_eq!(
            plan,
            UpdatePlan::Full {
                reason: FullUpdateReason::NoLocalIndex
            }
        );
    }

    #[test]
    fn plan_at_head_is_up_to_date() {
        assert_eq!(
            plan_update(Some(day(3)), &manifest(3, vec![desc(2, 3)])),
            UpdatePlan::UpToDate
        );
    }

    #[test]
    fn plan_builds_contiguous_chain() {
        let m = manifest(5, vec![desc(1, 2), desc(2, 3), desc(3, 5)]);
        match plan_update(Some(day(2)), &m) {
            UpdatePlan::Incremental { chunks } => {
                let names: Vec<_> = chunks.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["chunk-2-3.json", "chunk-3-5.json"]);
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn missing_link_is_gap() {
        let m = manifest(5, vec![desc(1, 2), desc(3, 5)]);
        assert!(matches!(
            chunk_chain(day(2), &m),
            Err(IndexError::ManifestGap { .. })
        ));
        assert_eq!(
            plan_update(Some(day(2)), &m),
            UpdatePlan::Full {
                reason: FullUpdateReason::ManifestGap
            }
        );
    }

    #[test]
    fn local_ahead_of_head_is_gap() {
        let m = manifest(3, vec![desc(2, 3)]);
        assert!(chunk_chain(day(4), &m).is_err());
    }

    #[test]
    fn pruned_history_is_gap() {
        let m = manifest(5, vec![desc(4, 5)]);
        assert!(chunk_chain(day(1), &m).is_err());
    }

    #[test]
    fn payload_range_mismatch_is_gap() {
        let chunk = IndexChunk {
            from: day(1),
            to: day(3),
            operations: vec![],
        };
        assert!(check_chunk(&desc(1, 3), &chunk).is_ok());
        assert!(matches!(
            check_chunk(&desc(1, 2), &chunk),
            Err(IndexError::ManifestGap { .. })
        ));
    }

    #[test]
    fn apply_orders_by_operation_timestamp() {
        let mut store = FieldIndexStore::new(ExtractorSet::standard());
        store.add(rec("old", "1.0")).unwrap();

        // Delete listed first but timestamped after the re-add.
        let chunk = IndexChunk {
            from: day(1),
            to: day(3),
            operations: vec![
                ChunkOperation::Delete {
                    timestamp: day(3),
                    key: rec("a", "1.0").key(),
                },
                ChunkOperation::Add {
                    timestamp: day(2),
                    record: rec("a", "1.0"),
                },
                ChunkOperation::Delete {
                    timestamp: day(2),
                    key: rec("old", "1.0").key(),
                },
            ],
        };
        let stats = apply_chunk(&mut store, &chunk);
        assert_eq!(
            stats,
            ApplyStats {
                added: 1,
                deleted: 2,
                skipped: 0
            }
        );
        assert!(store.is_empty());
        store.verify().unwrap();
    }

    #[test]
    fn apply_skips_rejected_records() {
        let mut store = FieldIndexStore::new(ExtractorSet::standard());
        let mut bad = rec("bad", "1.0");
        bad.sha1 = Some("zz".into());
        let chunk = IndexChunk {
            from: day(1),
            to: day(2),
            operations: vec![
                ChunkOperation::Add {
                    timestamp: day(2),
                    record: bad,
                },
                ChunkOperation::Add {
                    timestamp: day(2),
                    record: rec("good", "1.0"),
                },
            ],
        };
        let stats = apply_chunk(&mut store, &chunk);
        assert_eq!(stats.added, 1);
        assert_eq!(stats.skipped, 1);
        let hits = store
            .query(&SearchPredicate::exact(Field::ArtifactId, "good"))
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn rejected_replacement_removes_previous_version() {
        let mut store = FieldIndexStore::new(ExtractorSet::standard());
        store.add(rec("a", "1.0")).unwrap();
        let mut bad = rec("a", "1.0");
        bad.sha1 = Some("nothex".into());
        let chunk = IndexChunk {
            from: day(1),
            to: day(2),
            operations: vec![ChunkOperation::Add {
                timestamp: day(2),
                record: bad.clone(),
            }],
        };
        let stats = apply_chunk(&mut store, &chunk);
        assert_eq!(stats.skipped, 1);
        store.verify().unwrap();

        let (full, _) = build_from_snapshot(
            ExtractorSet::standard(),
            IndexSnapshot {
                timestamp: day(2),
                records: vec![bad],
            },
        );
        assert_eq!(store.len(), full.len());
        assert!(store
            .query(&SearchPredicate::exact(Field::ArtifactId, "a"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn snapshot_rebuild_counts_rejections() {
        let mut bad = rec("bad", "1.0");
        bad.group_id = String::new();
        let snapshot = IndexSnapshot {
            timestamp: day(2),
            records: vec![rec("a", "1.0"), bad],
        };
        let (store, stats) = build_from_snapshot(ExtractorSet::standard(), snapshot);
        assert_eq!(store.len(), 1);
        assert_eq!(stats.added, 1);
        assert_eq!(stats.skipped, 1);
    }
}
