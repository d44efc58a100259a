//! Structured search predicates.
//!
//! A [`SearchPredicate`] is a tree of [`TermQuery`] leaves joined by
//! boolean clauses, mirroring how the remote index is queried field by
//! field:
//!
//! ```rust
//! use artifact_index_core::fields::Field;
//! use artifact_index_core::query::{BooleanQuery, MatchMode, SearchPredicate};
//!
//! let main_artifacts = BooleanQuery::new()
//!     .must(SearchPredicate::exact(Field::GroupId, "org.apache.maven.indexer"))
//!     .must(SearchPredicate::exact(Field::ArtifactId, "indexer-artifact"))
//!     .must_not(SearchPredicate::exact(Field::Classifier, "*"))
//!     .build();
//! assert!(main_artifacts.is_exact_only());
//!
//! let partial_hash = SearchPredicate::term(Field::Sha1, "7ab67e6b20", MatchMode::Scored);
//! assert!(!partial_hash.is_exact_only());
//! ```
//!
//! # Match modes
//!
//! | Mode | Leaf semantics | Score |
//! |------|----------------|-------|
//! | `Exact` | postings lookup; `*` matches any term of the field | 1.0 |
//! | `Partial` | prefix scan over the field's term dictionary | matched / term length |
//! | `Scored` | prefix, substring, or bounded edit distance | see [`scored_similarity`] |

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::IndexError;
use crate::extractor::normalize_term;
use crate::fields::Field;

/// Value that matches every term of a field in `Exact` mode.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchMode {
    Exact,
    Scored,
    Partial,
}

impl FromStr for MatchMode {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(MatchMode::Exact),
            "scored" => Ok(MatchMode::Scored),
            "partial" => Ok(MatchMode::Partial),
            other => Err(IndexError::InvalidQuery(format!(
                "unknown match mode '{}'. Use exact, scored, or partial.",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occur {
    Must,
    MustNot,
    Should,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermQuery {
    pub field: Field,
    pub value: String,
    pub mode: MatchMode,
}

impl TermQuery {
    /// Normalized lookup value.
    pub fn normalized(&self) -> String {
        normalize_term(&self.value)
    }

    pub fn is_wildcard(&self) -> bool {
        self.value.trim() == WILDCARD
    }

    /// Score a dictionary term against this leaf, `None` if it does not match.
    ///
    /// `needle` is the normalized query value.
    pub fn match_term(&self, needle: &str, term: &str) -> Option<f32> {
        match self.mode {
            MatchMode::Exact => (needle == term).then_some(1.0),
            MatchMode::Partial => {
                term.starts_with(needle).then(|| ratio(needle, term))
            }
            MatchMode::Scored => scored_similarity(needle, term),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub occur: Occur,
    pub predicate: SearchPredicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchPredicate {
    Term(TermQuery),
    Boolean(Vec<Clause>),
}

impl SearchPredicate {
    pub fn term(field: Field, value: impl Into<String>, mode: MatchMode) -> Self {
        SearchPredicate::Term(TermQuery {
            field,
            value: value.into(),
            mode,
        })
    }

    pub fn exact(field: Field, value: impl Into<String>) -> Self {
        Self::term(field, value, MatchMode::Exact)
    }

    pub fn scored(field: Field, value: impl Into<String>) -> Self {
        Self::term(field, value, MatchMode::Scored)
    }

    pub fn partial(field: Field, value: impl Into<String>) -> Self {
        Self::term(field, value, MatchMode::Partial)
    }

    /// Every field referenced anywhere in the tree.
    pub fn fields(&self) -> BTreeSet<Field> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut BTreeSet<Field>) {
        match self {
            SearchPredicate::Term(t) => {
                out.insert(t.field);
            }
            SearchPredicate::Boolean(clauses) => {
                for c in clauses {
                    c.predicate.collect_fields(out);
                }
            }
        }
    }

    /// True when every leaf uses [`MatchMode::Exact`].
    pub fn is_exact_only(&self) -> bool {
        match self {
            SearchPredicate::Term(t) => t.mode == MatchMode::Exact,
            SearchPredicate::Boolean(clauses) => {
                clauses.iter().all(|c| c.predicate.is_exact_only())
            }
        }
    }

    /// Structural checks independent of any store: non-empty values and
    /// non-empty boolean nodes.
    pub fn validate(&self) -> Result<(), IndexError> {
        match self {
            SearchPredicate::Term(t) => {
                if t.value.trim().is_empty() {
                    return Err(IndexError::InvalidQuery(format!(
                        "empty value for field '{}'",
                        t.field
                    )));
                }
                Ok(())
            }
            SearchPredicate::Boolean(clauses) => {
                if clauses.is_empty() {
                    return Err(IndexError::InvalidQuery(
                        "boolean predicate has no clauses".to_string(),
                    ));
                }
                clauses.iter().try_for_each(|c| c.predicate.validate())
            }
        }
    }
}

impl fmt::Display for SearchPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchPredicate::Term(t) => {
                let sep = match t.mode {
                    MatchMode::Exact => ':',
                    MatchMode::Scored => '~',
                    MatchMode::Partial => '^',
                };
                write!(f, "{}{}{}", t.field, sep, t.value)
            }
            SearchPredicate::Boolean(clauses) => {
                let parts: Vec<String> = clauses
                    .iter()
                    .map(|c| {
                        let prefix = match c.occur {
                            Occur::Must => "+",
                            Occur::MustNot => "-",
                            Occur::Should => "",
                        };
                        match &c.predicate {
                            SearchPredicate::Term(_) => format!("{}{}", prefix, c.predicate),
                            SearchPredicate::Boolean(_) => format!("{}({})", prefix, c.predicate),
                        }
                    })
                    .collect();
                f.write_str(&parts.join(" "))
            }
        }
    }
}

/// Builder for boolean predicates.
#[derive(Debug, Default)]
pub struct BooleanQuery {
    clauses: Vec<Clause>,
}

impl BooleanQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, predicate: SearchPredicate, occur: Occur) -> Self {
        self.clauses.push(Clause { occur, predicate });
        self
    }

    pub fn must(self, predicate: SearchPredicate) -> Self {
        self.add(predicate, Occur::Must)
    }

    pub fn must_not(self, predicate: SearchPredicate) -> Self {
        self.add(predicate, Occur::MustNot)
    }

    pub fn should(self, predicate: SearchPredicate) -> Self {
        self.add(predicate, Occur::Should)
    }

    pub fn build(self) -> SearchPredicate {
        SearchPredicate::Boolean(self.clauses)
    }
}

fn ratio(needle: &str, term: &str) -> f32 {
    let t = term.chars().count().max(1) as f32;
    needle.chars().count() as f32 / t
}

/// Similarity used by [`MatchMode::Scored`] leaves, in `(0.0, 1.0]`.
///
/// - identical: `1.0`
/// - prefix: `0.5 + 0.5 × ratio`
/// - substring: `0.25 + 0.25 × ratio`
/// - edit distance `d ≤ max(1, len/4)` (needles of 4+ chars): `0.2 × (1 - d/len)`
pub fn scored_similarity(needle: &str, term: &str) -> Option<f32> {
    if needle.is_empty() {
        return None;
    }
    if needle == term {
        return Some(1.0);
    }
    if term.starts_with(needle) {
        return Some(0.5 + 0.5 * ratio(needle, term));
    }
    if term.contains(needle) {
        return Some(0.25 + 0.25 * ratio(needle, term));
    }
    let len = needle.chars().count();
    if len < 4 {
        return None;
    }
    let term_len = term.chars().count();
    let max_distance = (len / 4).max(1);
    if term_len.abs_diff(len) > max_distance {
        return None;
    }
    let d = levenshtein(needle, term);
    if d <= max_distance {
        Some(0.2 * (1.0 - d as f32 / len.max(term_len) as f32))
    } else {
        None
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Parse the textual predicate syntax used by the CLI.
///
/// Clauses are whitespace separated: `[+|-]field(:|~|^)value`. `+` is
/// MUST, `-` MUST_NOT, no prefix SHOULD; `:` is exact, `~` scored, `^`
/// partial. A single clause without a prefix is returned as a bare term.
///
/// ```rust
/// use artifact_index_core::query::parse_predicate;
///
/// let q = parse_predicate("+groupId:org.apache.maven.plugins +packaging:maven-plugin").unwrap();
/// assert_eq!(q.to_string(), "+groupId:org.apache.maven.plugins +packaging:maven-plugin");
/// ```
pub fn parse_predicate(input: &str) -> Result<SearchPredicate, IndexError> {
    let tokens: Vec<&str> = input.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(IndexError::InvalidQuery("empty query".to_string()));
    }

    let mut clauses = Vec::with_capacity(tokens.len());
    for token in &tokens {
        let (occur, rest) = if let Some(r) = token.strip_prefix('+') {
            (Occur::Must, r)
        } else if let Some(r) = token.strip_prefix('-') {
            (Occur::MustNot, r)
        } else {
            (Occur::Should, *token)
        };

        let (idx, sep) = rest
            .char_indices()
            .find(|(_, c)| matches!(c, ':' | '~' | '^'))
            .ok_or_else(|| {
                IndexError::InvalidQuery(format!(
                    "clause '{}' must look like field:value, field~value, or field^value",
                    token
                ))
            })?;
        let field: Field = rest[..idx].parse()?;
        let value = &rest[idx + sep.len_utf8()..];
        let mode = match sep {
            ':' => MatchMode::Exact,
            '~' => MatchMode::Scored,
            _ => MatchMode::Partial,
        };
        let predicate = SearchPredicate::term(field, value, mode);
        predicate.validate()?;
        clauses.push(Clause { occur, predicate });
    }

    if clauses.len() == 1 && clauses[0].occur == Occur::Should {
        return Ok(clauses.remove(0).predicate);
    }
    Ok(SearchPredicate::Boolean(clauses))
}
