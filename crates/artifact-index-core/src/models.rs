//! Core data models for indexed artifacts.
//!
//! An [`ArtifactRecord`] is the unit stored in the field index: the
//! coordinates of one published file plus the metadata gathered from its
//! descriptor (checksum, class listing, plugin details). Records are
//! immutable once stored; an update replaces a record wholesale.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Index and record timestamps are always UTC.
pub type Timestamp = DateTime<Utc>;

/// Identity of an artifact: `(groupId, artifactId, version, classifier, packaging)`.
///
/// Two records with the same key describe the same file; adding the second
/// replaces the first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactKey {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    pub packaging: String,
}

impl fmt::Display for ArtifactKey {
    /// Maven coordinate notation: `g:a:packaging[:classifier]:v`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.packaging)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        write!(f, ":{}", self.version)
    }
}

/// One indexed artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    pub packaging: String,
    /// Lowercase hex SHA-1 of the artifact file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    /// Fully-qualified class names contained in the artifact.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub class_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub last_modified: Timestamp,
    #[serde(default)]
    pub size: u64,
    /// Goal prefix of a `maven-plugin` artifact (e.g. `compiler`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugin_goals: Vec<String>,
}

impl ArtifactRecord {
    /// Minimal record with the given coordinates and `jar` packaging.
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
        last_modified: Timestamp,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: None,
            packaging: "jar".to_string(),
            sha1: None,
            class_names: Vec::new(),
            description: None,
            last_modified,
            size: 0,
            plugin_prefix: None,
            plugin_goals: Vec::new(),
        }
    }

    pub fn key(&self) -> ArtifactKey {
        ArtifactKey {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            version: self.version.clone(),
            classifier: self.classifier.clone(),
            packaging: self.packaging.clone(),
        }
    }

    /// `groupId:artifactId`
    pub fn ga(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }

    /// `groupId:artifactId:version`
    pub fn gav(&self) -> String {
        format!("{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }

    /// True for the main artifact of a GAV (no classifier).
    pub fn is_main(&self) -> bool {
        self.classifier.is_none()
    }
}

impl fmt::Display for ArtifactRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.group_id,
            self.artifact_id,
            self.version,
            self.classifier.as_deref().unwrap_or("NA"),
            self.packaging
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn key_display_uses_maven_coordinates() {
        let mut rec = ArtifactRecord::new("org.example", "lib", "1.0", ts());
        assert_eq!(rec.key().to_string(), "org.example:lib:jar:1.0");
        rec.classifier = Some("sources".to_string());
        assert_eq!(rec.key().to_string(), "org.example:lib:jar:sources:1.0");
    }

    #[test]
    fn record_json_uses_camel_case_and_omits_empty() {
        let rec = ArtifactRecord::new("org.example", "lib", "1.0", ts());
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["groupId"], "org.example");
        assert!(json.get("classNames").is_none());
        assert!(json.get("classifier").is_none());

        let back: ArtifactRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn ga_and_gav() {
        let rec = ArtifactRecord::new("g", "a", "2.0", ts());
        assert_eq!(rec.ga(), "g:a");
        assert_eq!(rec.gav(), "g:a:2.0");
        assert!(rec.is_main());
    }
}
