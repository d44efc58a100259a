//! Pluggable field extractors.
//!
//! An extractor turns an [`ArtifactRecord`] into the `(field, term)` pairs
//! the store indexes. A context holds an ordered [`ExtractorSet`]; the
//! fields it contributes are the only fields queries may reference.
//!
//! | Id | Extractor | Fields |
//! |----|-----------|--------|
//! | `min` | [`MinimalExtractor`] | coordinates, sha1, description, lastModified, size |
//! | `jarContent` | [`JarContentExtractor`] | classNames |
//! | `maven-plugin` | [`MavenPluginExtractor`] | pluginPrefix, pluginGoals |

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{ExtractorError, IndexError};
use crate::fields::Field;
use crate::models::ArtifactRecord;

/// A single indexed `(field, term)` pair.
pub type FieldTerm = (Field, String);

/// Normalize a stored term or a query value: trimmed, lowercase.
pub fn normalize_term(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Produces indexable terms for a record.
pub trait FieldExtractor: Send + Sync {
    /// Stable identifier used in configuration (e.g. `"min"`).
    fn id(&self) -> &str;

    /// Fields this extractor may populate.
    fn contributes_fields(&self) -> &[Field];

    /// Extract terms for `record`. Terms must already be normalized.
    fn extract(&self, record: &ArtifactRecord) -> Result<Vec<FieldTerm>, ExtractorError>;
}

/// Coordinates, checksum, description words, timestamp, and size.
pub struct MinimalExtractor;

const MIN_FIELDS: [Field; 9] = [
    Field::GroupId,
    Field::ArtifactId,
    Field::Version,
    Field::Classifier,
    Field::Packaging,
    Field::Sha1,
    Field::Description,
    Field::LastModified,
    Field::Size,
];

impl FieldExtractor for MinimalExtractor {
    fn id(&self) -> &str {
        "min"
    }

    fn contributes_fields(&self) -> &[Field] {
        &MIN_FIELDS
    }

    fn extract(&self, record: &ArtifactRecord) -> Result<Vec<FieldTerm>, ExtractorError> {
        let reject = |reason: &str| ExtractorError::new(self.id(), record.to_string(), reason);

        let mut terms = Vec::new();
        for (field, value) in [
            (Field::GroupId, &record.group_id),
            (Field::ArtifactId, &record.artifact_id),
            (Field::Version, &record.version),
            (Field::Packaging, &record.packaging),
        ] {
            let term = normalize_term(value);
            if term.is_empty() {
                return Err(reject(&format!("empty {}", field)));
            }
            terms.push((field, term));
        }

        if let Some(classifier) = &record.classifier {
            let term = normalize_term(classifier);
            if term.is_empty() {
                return Err(reject("empty classifier"));
            }
            terms.push((Field::Classifier, term));
        }

        if let Some(sha1) = &record.sha1 {
            let term = normalize_term(sha1);
            if term.len() != 40 || !term.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(reject("sha1 is not a 40 character hex digest"));
            }
            terms.push((Field::Sha1, term));
        }

        if let Some(description) = &record.description {
            terms.extend(
                description
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                    .map(|w| (Field::Description, w.to_lowercase())),
            );
        }

        terms.push((
            Field::LastModified,
            record.last_modified.timestamp_millis().to_string(),
        ));
        terms.push((Field::Size, record.size.to_string()));

        Ok(terms)
    }
}

/// Class names listed in the artifact: the full dotted name and the simple name.
pub struct JarContentExtractor;

impl FieldExtractor for JarContentExtractor {
    fn id(&self) -> &str {
        "jarContent"
    }

    fn contributes_fields(&self) -> &[Field] {
        &[Field::ClassNames]
    }

    fn extract(&self, record: &ArtifactRecord) -> Result<Vec<FieldTerm>, ExtractorError> {
        let mut terms = Vec::with_capacity(record.class_names.len() * 2);
        for raw in &record.class_names {
            let dotted = raw.trim().trim_end_matches(".class").replace('/', ".");
            let dotted = dotted.trim_matches('.');
            if dotted.is_empty() || dotted.contains(char::is_whitespace) {
                return Err(ExtractorError::new(
                    self.id(),
                    record.to_string(),
                    format!("malformed class name '{}'", raw),
                ));
            }
            let full = dotted.to_lowercase();
            let simple = full.rsplit('.').next().unwrap_or(&full).to_string();
            if simple != full {
                terms.push((Field::ClassNames, simple));
            }
            terms.push((Field::ClassNames, full));
        }
        Ok(terms)
    }
}

/// Goal prefix and goals of `maven-plugin` artifacts.
pub struct MavenPluginExtractor;

impl FieldExtractor for MavenPluginExtractor {
    fn id(&self) -> &str {
        "maven-plugin"
    }

    fn contributes_fields(&self) -> &[Field] {
        &[Field::PluginPrefix, Field::PluginGoals]
    }

    fn extract(&self, record: &ArtifactRecord) -> Result<Vec<FieldTerm>, ExtractorError> {
        if normalize_term(&record.packaging) != "maven-plugin" {
            return Ok(Vec::new());
        }
        let mut terms = Vec::new();
        match &record.plugin_prefix {
            Some(prefix) => terms.push((Field::PluginPrefix, normalize_term(prefix))),
            None if !record.plugin_goals.is_empty() => {
                return Err(ExtractorError::new(
                    self.id(),
                    record.to_string(),
                    "plugin goals without a goal prefix",
                ));
            }
            None => {}
        }
        terms.extend(
            record
                .plugin_goals
                .iter()
                .map(|g| normalize_term(g))
                .filter(|g| !g.is_empty())
                .map(|g| (Field::PluginGoals, g)),
        );
        Ok(terms)
    }
}

/// Look up a built-in extractor by its configuration id.
pub fn extractor_by_id(id: &str) -> Option<Arc<dyn FieldExtractor>> {
    match id {
        "min" => Some(Arc::new(MinimalExtractor)),
        "jarContent" => Some(Arc::new(JarContentExtractor)),
        "maven-plugin" => Some(Arc::new(MavenPluginExtractor)),
        _ => None,
    }
}

/// Ordered set of extractors bound to a context.
#[derive(Clone, Default)]
pub struct ExtractorSet {
    extractors: Vec<Arc<dyn FieldExtractor>>,
}

impl ExtractorSet {
    pub fn new(extractors: Vec<Arc<dyn FieldExtractor>>) -> Self {
        Self { extractors }
    }

    /// `min`, `jarContent`, and `maven-plugin`, in that order.
    pub fn standard() -> Self {
        Self::new(vec![
            Arc::new(MinimalExtractor),
            Arc::new(JarContentExtractor),
            Arc::new(MavenPluginExtractor),
        ])
    }

    /// Resolve built-in extractors by id, preserving order.
    pub fn from_ids<S: AsRef<str>>(ids: &[S]) -> Result<Self, IndexError> {
        let mut extractors = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.as_ref();
            let extractor = extractor_by_id(id).ok_or_else(|| {
                IndexError::Config(format!(
                    "unknown extractor '{}'. Available: min, jarContent, maven-plugin",
                    id
                ))
            })?;
            extractors.push(extractor);
        }
        Ok(Self::new(extractors))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.id()).collect()
    }

    /// Union of all contributed fields.
    pub fn fields(&self) -> BTreeSet<Field> {
        self.extractors
            .iter()
            .flat_map(|e| e.contributes_fields().iter().copied())
            .collect()
    }

    pub fn contributes(&self, field: Field) -> bool {
        self.extractors
            .iter()
            .any(|e| e.contributes_fields().contains(&field))
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Run every extractor in order. The first failure rejects the record.
    ///
    /// Returned terms are sorted and deduplicated.
    pub fn extract(&self, record: &ArtifactRecord) -> Result<Vec<FieldTerm>, ExtractorError> {
        let mut terms = Vec::new();
        for extractor in &self.extractors {
            terms.extend(extractor.extract(record)?);
        }
        terms.sort();
        terms.dedup();
        Ok(terms)
    }
}

impl fmt::Debug for ExtractorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record() -> ArtifactRecord {
        let mut rec = ArtifactRecord::new(
            "org.apache.maven.indexer",
            "indexer-core",
            "6.0.0",
            Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap(),
        );
        rec.sha1 = Some("7AB67E6B20E5332A7FB4FDF2F019AEC4275846C2".to_string());
        rec.description = Some("Maven Indexer: core".to_string());
        rec.class_names = vec!["org/apache/maven/index/DefaultNexusIndexer".to_string()];
        rec.size = 1024;
        rec
    }

    #[test]
    fn minimal_extracts_normalized_coordinates() {
        let terms = MinimalExtractor.extract(&record()).unwrap();
        assert!(terms.contains(&(Field::GroupId, "org.apache.maven.indexer".into())));
        assert!(terms.contains(&(Field::Sha1, "7ab67e6b20e5332a7fb4fdf2f019aec4275846c2".into())));
        assert!(terms.contains(&(Field::Description, "indexer".into())));
        assert!(terms.contains(&(Field::Size, "1024".into())));
        assert!(!terms.iter().any(|(f, _)| *f == Field::Classifier));
    }

    #[test]
    fn minimal_rejects_bad_sha1() {
        let mut rec = record();
        rec.sha1 = Some("xyz".to_string());
        let err = MinimalExtractor.extract(&rec).unwrap_err();
        assert_eq!(err.extractor, "min");
    }

    #[test]
    fn minimal_rejects_empty_group() {
        let mut rec = record();
        rec.group_id = "  ".to_string();
        assert!(MinimalExtractor.extract(&rec).is_err());
    }

    #[test]
    fn jar_content_indexes_full_and_simple_names() {
        let terms = JarContentExtractor.extract(&record()).unwrap();
        assert_eq!(
            terms,
            vec![
                (Field::ClassNames, "defaultnexusindexer".to_string()),
                (
                    Field::ClassNames,
                    "org.apache.maven.index.defaultnexusindexer".to_string()
                ),
            ]
        );
    }

    #[test]
    fn plugin_extractor_ignores_other_packaging() {
        let mut rec = record();
        rec.plugin_prefix = Some("compiler".into());
        assert!(MavenPluginExtractor.extract(&rec).unwrap().is_empty());

        rec.packaging = "maven-plugin".into();
        rec.plugin_goals = vec!["compile".into(), "testCompile".into()];
        let terms = MavenPluginExtractor.extract(&rec).unwrap();
        assert!(terms.contains(&(Field::PluginPrefix, "compiler".into())));
        assert!(terms.contains(&(Field::PluginGoals, "testcompile".into())));
    }

    #[test]
    fn plugin_packaging_is_case_insensitive() {
        let mut rec = record();
        rec.packaging = "Maven-Plugin".into();
        rec.plugin_prefix = Some("compiler".into());
        let terms = MavenPluginExtractor.extract(&rec).unwrap();
        assert_eq!(terms, vec![(Field::PluginPrefix, "compiler".to_string())]);
    }

    #[test]
    fn from_ids_rejects_unknown() {
        let err = ExtractorSet::from_ids(&["min", "bogus"]).unwrap_err();
        assert!(matches!(err, IndexError::Config(_)));
    }

    #[test]
    fn set_fields_are_union() {
        let set = ExtractorSet::from_ids(&["min"]).unwrap();
        assert!(set.contributes(Field::Sha1));
        assert!(!set.contributes(Field::ClassNames));
        assert_eq!(ExtractorSet::standard().fields().len(), Field::ALL.len());
    }
}
