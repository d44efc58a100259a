//! Wire types of the update protocol.
//!
//! A published repository exposes one manifest resource plus the snapshot
//! and chunk resources it names:
//!
//! ```text
//! index-manifest.json
//! {
//!   "timestamp": "2024-03-08T00:00:00Z",          head timestamp
//!   "snapshot":  { "name": "...", "sha256": "..." },  full record set at head
//!   "chunks": [                                   ascending, contiguous
//!     { "name": "...", "from": T0, "to": T1, "sha256": "..." },
//!     { "name": "...", "from": T1, "to": T2, "sha256": "..." }
//!   ]
//! }
//! ```
//!
//! All resources are JSON. Chunk operations name records by
//! [`ArtifactKey`]; document ids never leave a store.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{IndexError, Result};
use crate::models::{ArtifactKey, ArtifactRecord, Timestamp};

pub const MANIFEST_RESOURCE: &str = "index-manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// One incremental chunk covering `(from, to]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    pub name: String,
    pub from: Timestamp,
    pub to: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateManifest {
    /// Head timestamp of the published index.
    pub timestamp: Timestamp,
    pub snapshot: ResourceRef,
    #[serde(default)]
    pub chunks: Vec<ChunkDescriptor>,
}

impl UpdateManifest {
    /// Structural checks: snapshot at head, chunks ordered with `from < to`,
    /// no chunk past head.
    pub fn validate(&self) -> Result<()> {
        check_resource_name(&self.snapshot.name)?;
        let mut previous: Option<&ChunkDescriptor> = None;
        for chunk in &self.chunks {
            check_resource_name(&chunk.name)?;
            if chunk.from >= chunk.to {
                return Err(IndexError::format(
                    MANIFEST_RESOURCE,
                    format!("chunk '{}' has from >= to", chunk.name),
                ));
            }
            if chunk.to > self.timestamp {
                return Err(IndexError::format(
                    MANIFEST_RESOURCE,
                    format!("chunk '{}' ends after the head timestamp", chunk.name),
                ));
            }
            if let Some(prev) = previous {
                if chunk.from < prev.from {
                    return Err(IndexError::format(
                        MANIFEST_RESOURCE,
                        "chunks are not in ascending order",
                    ));
                }
            }
            previous = Some(chunk);
        }
        Ok(())
    }
}

/// The full record set at a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub timestamp: Timestamp,
    pub records: Vec<ArtifactRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "UPPERCASE")]
pub enum ChunkOperation {
    Add {
        timestamp: Timestamp,
        record: ArtifactRecord,
    },
    Delete {
        timestamp: Timestamp,
        key: ArtifactKey,
    },
}

impl ChunkOperation {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            ChunkOperation::Add { timestamp, .. } | ChunkOperation::Delete { timestamp, .. } => {
                *timestamp
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexChunk {
    pub from: Timestamp,
    pub to: Timestamp,
    #[serde(default)]
    pub operations: Vec<ChunkOperation>,
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Compare `bytes` against an expected digest. A missing expectation passes.
pub fn verify_digest(resource: &str, bytes: &[u8], expected: Option<&str>) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let actual = sha256_hex(bytes);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(IndexError::format(
            resource,
            format!("sha256 mismatch: expected {}, got {}", expected, actual),
        ))
    }
}

/// Resource names are flat: no path separators, no `..`.
pub fn check_resource_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(IndexError::format(
            MANIFEST_RESOURCE,
            format!("invalid resource name '{}'", name),
        ));
    }
    Ok(())
}

/// Deserialize a JSON resource, mapping failures to [`IndexError::Format`].
pub fn decode<T: DeserializeOwned>(resource: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| IndexError::format(resource, e.to_string()))
}

/// Serialize a resource as pretty JSON.
pub fn encode<T: Serialize>(resource: &str, value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| IndexError::format(resource, e.to_string()))
}
