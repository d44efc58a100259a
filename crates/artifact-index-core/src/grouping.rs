//! Grouping strategies for grouped search.
//!
//! A [`Grouping`] maps each matching record to a group key and orders the
//! members of a group so the first one is the group's representative.
//! The built-in strategies collapse by `groupId:artifactId` ([`Grouping::Ga`])
//! or by `groupId:artifactId:version` ([`Grouping::Gav`]); [`Grouping::Custom`]
//! takes caller-supplied key and ordering functions.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::IndexError;
use crate::models::ArtifactRecord;
use crate::store::DocId;
use crate::version::compare_versions;

/// Derives the group key of a record.
pub type KeyFn = Arc<dyn Fn(&ArtifactRecord) -> String + Send + Sync>;

/// Orders two members of the same group; `Less` means "better representative".
pub type OrderFn = Arc<dyn Fn(&ArtifactRecord, &ArtifactRecord) -> Ordering + Send + Sync>;

#[derive(Clone)]
pub enum Grouping {
    /// One group per `groupId:artifactId`.
    Ga,
    /// One group per `groupId:artifactId:version`.
    Gav,
    Custom {
        name: String,
        key: KeyFn,
        /// Member ordering. `None` uses the default representative order.
        order: Option<OrderFn>,
    },
}

impl Grouping {
    pub fn custom<K>(name: impl Into<String>, key: K) -> Self
    where
        K: Fn(&ArtifactRecord) -> String + Send + Sync + 'static,
    {
        Grouping::Custom {
            name: name.into(),
            key: Arc::new(key),
            order: None,
        }
    }

    /// Replace the member ordering of a custom grouping. No-op for built-ins.
    pub fn with_order<O>(self, order: O) -> Self
    where
        O: Fn(&ArtifactRecord, &ArtifactRecord) -> Ordering + Send + Sync + 'static,
    {
        match self {
            Grouping::Custom { name, key, .. } => Grouping::Custom {
                name,
                key,
                order: Some(Arc::new(order)),
            },
            other => other,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Grouping::Ga => "ga",
            Grouping::Gav => "gav",
            Grouping::Custom { name, .. } => name,
        }
    }

    pub fn group_key(&self, record: &ArtifactRecord) -> String {
        match self {
            Grouping::Ga => record.ga(),
            Grouping::Gav => record.gav(),
            Grouping::Custom { key, .. } => key(record),
        }
    }

    /// Order two group members; the document id is the final tie-break so
    /// the result is total and deterministic.
    pub fn compare(
        &self,
        a: (DocId, &ArtifactRecord),
        b: (DocId, &ArtifactRecord),
    ) -> Ordering {
        let primary = match self {
            Grouping::Custom {
                order: Some(order), ..
            } => order(a.1, b.1),
            _ => representative_order(a.1, b.1),
        };
        primary.then_with(|| a.0.cmp(&b.0))
    }
}

/// Highest version first, then most recently modified.
pub fn representative_order(a: &ArtifactRecord, b: &ArtifactRecord) -> Ordering {
    compare_versions(&b.version, &a.version).then_with(|| b.last_modified.cmp(&a.last_modified))
}

impl fmt::Debug for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grouping::Ga => f.write_str("Ga"),
            Grouping::Gav => f.write_str("Gav"),
            Grouping::Custom { name, order, .. } => f
                .debug_struct("Custom")
                .field("name", name)
                .field("custom_order", &order.is_some())
                .finish(),
        }
    }
}

impl FromStr for Grouping {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ga" => Ok(Grouping::Ga),
            "gav" => Ok(Grouping::Gav),
            other => Err(IndexError::InvalidQuery(format!(
                "unknown grouping '{}'. Expected 'ga' or 'gav'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn rec(v: &str, day: u32) -> ArtifactRecord {
        ArtifactRecord::new(
            "org.example",
            "lib",
            v,
            Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn builtin_keys() {
        let r = rec("1.0", 1);
        assert_eq!(Grouping::Ga.group_key(&r), "org.example:lib");
        assert_eq!(Grouping::Gav.group_key(&r), "org.example:lib:1.0");
    }

    #[test]
    fn representative_prefers_highest_version() {
        let old = rec("1.10", 9);
        let new = rec("2.0", 1);
        assert_eq!(Grouping::Ga.compare((0, &new), (1, &old)), Ordering::Less);
    }

    #[test]
    fn same_version_prefers_recent_then_doc_id() {
        let early = rec("1.0", 1);
        let late = rec("1.0", 2);
        assert_eq!(Grouping::Gav.compare((5, &late), (1, &early)), Ordering::Less);
        assert_eq!(Grouping::Gav.compare((1, &early), (2, &early)), Ordering::Less);
    }

    #[test]
    fn custom_key_and_order() {
        let g = Grouping::custom("by-packaging", |r: &ArtifactRecord| r.packaging.clone())
            .with_order(|a: &ArtifactRecord, b: &ArtifactRecord| a.version.cmp(&b.version));
        let a = rec("1.0", 1);
        let b = rec("2.0", 1);
        assert_eq!(g.group_key(&a), "jar");
        assert_eq!(g.compare((1, &a), (0, &b)), Ordering::Less);
        assert_eq!(g.name(), "by-packaging");
    }

    #[test]
    fn parse_names() {
        assert!(matches!("GA".parse::<Grouping>(), Ok(Grouping::Ga)));
        assert!(matches!("gav".parse::<Grouping>(), Ok(Grouping::Gav)));
        assert!("artifact".parse::<Grouping>().is_err());
    }
}
