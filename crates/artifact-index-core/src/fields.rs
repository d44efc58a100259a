//! The fixed schema of indexable artifact fields.
//!
//! Field names match the camelCase keys of the remote index format so the
//! same spelling works in queries, configuration, and payloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    GroupId,
    ArtifactId,
    Version,
    Classifier,
    Packaging,
    Sha1,
    ClassNames,
    Description,
    LastModified,
    Size,
    PluginPrefix,
    PluginGoals,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::GroupId,
        Field::ArtifactId,
        Field::Version,
        Field::Classifier,
        Field::Packaging,
        Field::Sha1,
        Field::ClassNames,
        Field::Description,
        Field::LastModified,
        Field::Size,
        Field::PluginPrefix,
        Field::PluginGoals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::GroupId => "groupId",
            Field::ArtifactId => "artifactId",
            Field::Version => "version",
            Field::Classifier => "classifier",
            Field::Packaging => "packaging",
            Field::Sha1 => "sha1",
            Field::ClassNames => "classNames",
            Field::Description => "description",
            Field::LastModified => "lastModified",
            Field::Size => "size",
            Field::PluginPrefix => "pluginPrefix",
            Field::PluginGoals => "pluginGoals",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = IndexError;

    /// Accepts the canonical camelCase name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| IndexError::InvalidQuery(format!("unknown field '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("groupId".parse::<Field>().unwrap(), Field::GroupId);
        assert_eq!("SHA1".parse::<Field>().unwrap(), Field::Sha1);
        assert_eq!("classnames".parse::<Field>().unwrap(), Field::ClassNames);
    }

    #[test]
    fn unknown_field_is_invalid_query() {
        let err = "checksum".parse::<Field>().unwrap_err();
        assert!(matches!(err, IndexError::InvalidQuery(_)));
    }

    #[test]
    fn serde_name_matches_as_str() {
        for field in Field::ALL {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{}\"", field.as_str()));
        }
    }
}
