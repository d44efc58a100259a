//! # Artifact Index Core
//!
//! Shared, WASM-safe logic for Artifact Index: artifact models, the
//! columnar field index store, field extractors, search predicates, flat and
//! grouped search, and the incremental update planner.
//!
//! This crate contains no tokio, network, or filesystem I/O. Fetching remote
//! resources, persisting snapshots, and publishing new store generations are
//! the job of the `artifact-index` application crate.

pub mod error;
pub mod extractor;
pub mod fields;
pub mod grouping;
pub mod manifest;
pub mod models;
pub mod query;
pub mod search;
pub mod store;
pub mod sync;
pub mod version;

pub use error::{ExtractorError, FetchErrorKind, IndexError, Result};
pub use fields::Field;
pub use models::{ArtifactKey, ArtifactRecord, Timestamp};
