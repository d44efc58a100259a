//! Columnar inverted index over artifact fields.
//!
//! [`FieldIndexStore`] maps `field → term → postings` where each postings
//! list is a sorted, deduplicated vector of [`DocId`]s, and keeps exactly
//! one stored [`ArtifactRecord`] per document id.
//!
//! # Removal
//!
//! Each stored document retains the `(field, term)` pairs it was indexed
//! under, so [`remove`](FieldIndexStore::remove) scrubs the id from exactly
//! the postings it touched. Removal is eager: there are no tombstones, and
//! terms whose postings become empty are dropped from the dictionary.
//!
//! # Generations
//!
//! The store is a plain value. Updaters clone it into a working copy, patch
//! the copy, and publish it as a new generation; readers keep using the
//! generation they already hold.

mod postings;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use tracing::warn;

use crate::error::{ExtractorError, IndexError};
use crate::extractor::{ExtractorSet, FieldTerm};
use crate::fields::Field;
use crate::models::{ArtifactKey, ArtifactRecord};
use crate::query::{MatchMode, Occur, SearchPredicate, TermQuery};

use postings::{insert_sorted, is_strictly_sorted, remove_sorted};

/// Internal document identifier. Assigned in insertion order, never reused
/// within one store lineage.
pub type DocId = u64;

/// A matching document and its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub doc: DocId,
    pub score: f32,
}

type Scores = BTreeMap<DocId, f32>;

#[derive(Debug, Clone)]
struct StoredDoc {
    record: Arc<ArtifactRecord>,
    terms: Vec<FieldTerm>,
}

#[derive(Debug, Clone)]
pub struct FieldIndexStore {
    extractors: ExtractorSet,
    docs: BTreeMap<DocId, StoredDoc>,
    postings: HashMap<Field, BTreeMap<String, Vec<DocId>>>,
    keys: HashMap<ArtifactKey, DocId>,
    next_doc: DocId,
}

impl FieldIndexStore {
    pub fn new(extractors: ExtractorSet) -> Self {
        Self {
            extractors,
            docs: BTreeMap::new(),
            postings: HashMap::new(),
            keys: HashMap::new(),
            next_doc: 0,
        }
    }

    /// Full rebuild from a record set. Records rejected by an extractor are
    /// logged, skipped, and returned.
    pub fn from_records<I>(extractors: ExtractorSet, records: I) -> (Self, Vec<ExtractorError>)
    where
        I: IntoIterator<Item = ArtifactRecord>,
    {
        let mut store = Self::new(extractors);
        let mut rejected = Vec::new();
        for record in records {
            if let Err(e) = store.add(record) {
                warn!("skipping record: {}", e);
                rejected.push(e);
            }
        }
        (store, rejected)
    }

    pub fn extractors(&self) -> &ExtractorSet {
        &self.extractors
    }

    /// Fields the configured extractors populate; the only fields queries
    /// may reference.
    pub fn indexed_fields(&self) -> BTreeSet<Field> {
        self.extractors.fields()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn get(&self, doc: DocId) -> Option<&Arc<ArtifactRecord>> {
        self.docs.get(&doc).map(|d| &d.record)
    }

    pub fn doc_for_key(&self, key: &ArtifactKey) -> Option<DocId> {
        self.keys.get(key).copied()
    }

    /// Stored records in document-id order.
    pub fn records(&self) -> impl Iterator<Item = (DocId, &Arc<ArtifactRecord>)> {
        self.docs.iter().map(|(id, d)| (*id, &d.record))
    }

    pub fn postings(&self, field: Field, term: &str) -> Option<&[DocId]> {
        self.postings
            .get(&field)
            .and_then(|dict| dict.get(term))
            .map(|v| v.as_slice())
    }

    /// Distinct terms of a field, in sorted order.
    pub fn terms(&self, field: Field) -> impl Iterator<Item = &str> {
        self.postings
            .get(&field)
            .into_iter()
            .flat_map(|dict| dict.keys().map(|k| k.as_str()))
    }

    pub fn term_count(&self, field: Field) -> usize {
        self.postings.get(&field).map_or(0, |d| d.len())
    }

    /// Index a record. A record with the same [`ArtifactKey`] is replaced.
    ///
    /// Terms are extracted before any mutation, so a rejected record leaves
    /// the store untouched.
    pub fn add(&mut self, record: ArtifactRecord) -> Result<DocId, ExtractorError> {
        let terms = self.extractors.extract(&record)?;
        let key = record.key();
        if let Some(previous) = self.keys.get(&key).copied() {
            self.remove(previous);
        }

        let doc = self.next_doc;
        self.next_doc += 1;
        for (field, term) in &terms {
            let list = self
                .postings
                .entry(*field)
                .or_default()
                .entry(term.clone())
                .or_default();
            insert_sorted(list, doc);
        }
        self.keys.insert(key, doc);
        self.docs.insert(
            doc,
            StoredDoc {
                record: Arc::new(record),
                terms,
            },
        );
        Ok(doc)
    }

    /// Remove a document and scrub it from every postings list it was in.
    pub fn remove(&mut self, doc: DocId) -> Option<Arc<ArtifactRecord>> {
        let stored = self.docs.remove(&doc)?;
        for (field, term) in &stored.terms {
            let Some(dict) = self.postings.get_mut(field) else {
                continue;
            };
            if let Some(list) = dict.get_mut(term) {
                remove_sorted(list, doc);
                if list.is_empty() {
                    dict.remove(term);
                }
            }
            if dict.is_empty() {
                self.postings.remove(field);
            }
        }
        self.keys.remove(&stored.record.key());
        Some(stored.record)
    }

    pub fn remove_key(&mut self, key: &ArtifactKey) -> Option<Arc<ArtifactRecord>> {
        let doc = self.keys.get(key).copied()?;
        self.remove(doc)
    }

    /// Evaluate a predicate, returning hits in document-id order.
    ///
    /// Fails with [`IndexError::InvalidQuery`] when the predicate is
    /// structurally empty or references a field no extractor populates.
    pub fn query(&self, predicate: &SearchPredicate) -> Result<Vec<Hit>, IndexError> {
        predicate.validate()?;
        let indexed = self.indexed_fields();
        if let Some(field) = predicate.fields().into_iter().find(|f| !indexed.contains(f)) {
            return Err(IndexError::InvalidQuery(format!(
                "field '{}' is not populated by the configured extractors {:?}",
                field,
                self.extractors.ids()
            )));
        }
        Ok(self
            .eval(predicate)
            .into_iter()
            .map(|(doc, score)| Hit { doc, score })
            .collect())
    }

    fn eval(&self, predicate: &SearchPredicate) -> Scores {
        match predicate {
            SearchPredicate::Term(t) => self.eval_term(t),
            SearchPredicate::Boolean(clauses) => self.eval_boolean(clauses),
        }
    }

    fn eval_term(&self, t: &TermQuery) -> Scores {
        let mut out = Scores::new();
        let Some(dict) = self.postings.get(&t.field) else {
            return out;
        };

        if t.is_wildcard() {
            for docs in dict.values() {
                merge_max(&mut out, docs, 1.0);
            }
            return out;
        }

        let needle = t.normalized();
        match t.mode {
            MatchMode::Exact => {
                if let Some(docs) = dict.get(&needle) {
                    merge_max(&mut out, docs, 1.0);
                }
            }
            MatchMode::Partial => {
                let range = dict
                    .range::<str, _>((Bound::Included(needle.as_str()), Bound::Unbounded))
                    .take_while(|(term, _)| term.starts_with(needle.as_str()));
                for (term, docs) in range {
                    if let Some(score) = t.match_term(&needle, term) {
                        merge_max(&mut out, docs, score);
                    }
                }
            }
            MatchMode::Scored => {
                for (term, docs) in dict {
                    if let Some(score) = t.match_term(&needle, term) {
                        merge_max(&mut out, docs, score);
                    }
                }
            }
        }
        out
    }

    fn eval_boolean(&self, clauses: &[crate::query::Clause]) -> Scores {
        let mut must: Option<Scores> = None;
        let mut should: Vec<Scores> = Vec::new();
        let mut excluded: BTreeSet<DocId> = BTreeSet::new();

        for clause in clauses {
            let scores = self.eval(&clause.predicate);
            match clause.occur {
                Occur::Must => {
                    must = Some(match must {
                        None => scores,
                        Some(acc) => intersect_sum(acc, &scores),
                    });
                }
                Occur::Should => should.push(scores),
                Occur::MustNot => excluded.extend(scores.keys().copied()),
            }
        }

        let mut acc = match must {
            Some(mut acc) => {
                for s in &should {
                    for (doc, score) in s {
                        if let Some(total) = acc.get_mut(doc) {
                            *total += score;
                        }
                    }
                }
                acc
            }
            None if !should.is_empty() => {
                let mut acc = Scores::new();
                for s in &should {
                    for (doc, score) in s {
                        *acc.entry(*doc).or_insert(0.0) += score;
                    }
                }
                acc
            }
            // Purely negative: everything not excluded.
            None => self.docs.keys().map(|d| (*d, 1.0)).collect(),
        };
        acc.retain(|doc, _| !excluded.contains(doc));
        acc
    }

    /// Check the store's structural invariants, describing the first violation.
    pub fn verify(&self) -> Result<(), String> {
        for (field, dict) in &self.postings {
            for (term, list) in dict {
                if list.is_empty() {
                    return Err(format!("empty postings for {}:{}", field, term));
                }
                if !is_strictly_sorted(list) {
                    return Err(format!("unsorted postings for {}:{}", field, term));
                }
                if let Some(doc) = list.iter().find(|d| !self.docs.contains_key(*d)) {
                    return Err(format!("dangling doc {} in {}:{}", doc, field, term));
                }
            }
        }
        for (doc, stored) in &self.docs {
            for (field, term) in &stored.terms {
                let present = self
                    .postings(*field, term)
                    .is_some_and(|list| list.binary_search(doc).is_ok());
                if !present {
                    return Err(format!("doc {} missing from {}:{}", doc, field, term));
                }
            }
            if self.keys.get(&stored.record.key()) != Some(doc) {
                return Err(format!("key index out of sync for doc {}", doc));
            }
        }
        if self.keys.len() != self.docs.len() {
            return Err("key index size differs from document count".to_string());
        }
        Ok(())
    }
}

fn merge_max(out: &mut Scores, docs: &[DocId], score: f32) {
    for doc in docs {
        let entry = out.entry(*doc).or_insert(score);
        if score > *entry {
            *entry = score;
        }
    }
}

fn intersect_sum(acc: Scores, other: &Scores) -> Scores {
    acc.into_iter()
        .filter_map(|(doc, score)| other.get(&doc).map(|s| (doc, score + s)))
        .collect()
}
