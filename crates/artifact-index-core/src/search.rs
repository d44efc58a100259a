//! Flat and grouped search over a [`FieldIndexStore`].
//!
//! ```text
//! predicate ──► store.query() ──► hits (doc order)
//!                                   │
//!                   ┌───────────────┴───────────────┐
//!                   ▼                               ▼
//!            search_flat                     search_grouped
//!     exact-only: doc id asc          group_key(record) → members
//!     otherwise: score desc, id asc   representative first
//!     truncate to limit               total_hits = matches
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::grouping::Grouping;
use crate::models::ArtifactRecord;
use crate::query::SearchPredicate;
use crate::store::{DocId, FieldIndexStore, Hit};

#[derive(Debug, Clone)]
pub struct FlatSearchRequest {
    pub predicate: SearchPredicate,
    /// Maximum number of results returned. `None` returns every match.
    pub limit: Option<usize>,
}

impl FlatSearchRequest {
    pub fn new(predicate: SearchPredicate) -> Self {
        Self {
            predicate,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredArtifact {
    #[serde(skip)]
    pub doc: DocId,
    pub score: f32,
    pub record: Arc<ArtifactRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatSearchResponse {
    pub results: Vec<ScoredArtifact>,
    /// Matches before `limit` was applied.
    pub total_hits: usize,
}

#[derive(Debug, Clone)]
pub struct GroupedSearchRequest {
    pub predicate: SearchPredicate,
    pub grouping: Grouping,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactGroup {
    pub key: String,
    /// Members ordered representative-first.
    pub artifacts: Vec<Arc<ArtifactRecord>>,
}

impl ArtifactGroup {
    pub fn representative(&self) -> Option<&Arc<ArtifactRecord>> {
        self.artifacts.first()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedSearchResponse {
    pub groups: BTreeMap<String, ArtifactGroup>,
    /// Matched records before grouping; always `>= groups.len()`.
    pub total_hits: usize,
}

fn resolve(store: &FieldIndexStore, hits: Vec<Hit>) -> Vec<ScoredArtifact> {
    hits.into_iter()
        .filter_map(|hit| {
            store.get(hit.doc).map(|record| ScoredArtifact {
                doc: hit.doc,
                score: hit.score,
                record: Arc::clone(record),
            })
        })
        .collect()
}

pub fn search_flat(store: &FieldIndexStore, request: &FlatSearchRequest) -> Result<FlatSearchResponse> {
    let mut hits = store.query(&request.predicate)?;
    if !request.predicate.is_exact_only() {
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc.cmp(&b.doc)));
    }
    let total_hits = hits.len();
    if let Some(limit) = request.limit {
        hits.truncate(limit);
    }
    Ok(FlatSearchResponse {
        results: resolve(store, hits),
        total_hits,
    })
}

pub fn search_grouped(
    store: &FieldIndexStore,
    request: &GroupedSearchRequest,
) -> Result<GroupedSearchResponse> {
    let matches = resolve(store, store.query(&request.predicate)?);
    let total_hits = matches.len();

    let mut buckets: BTreeMap<String, Vec<ScoredArtifact>> = BTreeMap::new();
    for m in matches {
        buckets
            .entry(request.grouping.group_key(&m.record))
            .or_default()
            .push(m);
    }

    let groups = buckets
        .into_iter()
        .map(|(key, mut members)| {
            members.sort_by(|a, b| {
                request
                    .grouping
                    .compare((a.doc, &a.record), (b.doc, &b.record))
            });
            let group = ArtifactGroup {
                key: key.clone(),
                artifacts: members.into_iter().map(|m| m.record).collect(),
            };
            (key, group)
        })
        .collect();

    Ok(GroupedSearchResponse { groups, total_hits })
}
