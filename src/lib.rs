//! # Artifact Index
//!
//! A local, searchable mirror of a remote artifact repository's metadata
//! index, kept current through a timestamp-negotiated update protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  manifest   ┌──────────────┐  new generation  ┌──────────────┐
//! │  Repository  │────────────▶│   Updater    │─────────────────▶│   Indexing   │
//! │ HTTP / file  │  snapshot   │ plan + apply │   atomic swap    │   Context    │
//! └──────────────┘  chunks     └──────────────┘                  └──────┬───────┘
//!        ▲                                                              │
//!        │ aidx pack                                    search_flat / search_grouped
//!   ┌────┴─────┐                                                        ▼
//!   │  Packer  │                                                 ┌──────────────┐
//!   └──────────┘                                                 │  CLI (aidx)  │
//!                                                                └──────────────┘
//! ```
//!
//! The store, predicates, grouping and update planner live in
//! [`artifact_index_core`]; this crate adds everything that touches the
//! filesystem, the network, or the terminal.
//!
//! ## Quick Start
//!
//! ```bash
//! aidx pack --records records.json --out ./published   # publish a repository
//! aidx update                                         # sync the local index
//! aidx search 'classNames~DefaultNexusIndexer'
//! aidx grouped 'packaging:maven-plugin' --by ga
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and update policy |
//! | [`context`] | Indexing context: lock, persisted snapshot, current generation |
//! | [`fetcher`] | HTTP and directory resource fetchers |
//! | [`progress`] | Transfer progress listeners |
//! | [`updater`] | Full / incremental update runner |
//! | [`packer`] | Snapshot, chunk and manifest publisher |
//! | [`search`] | CLI search output |

pub mod config;
pub mod context;
pub mod fetcher;
pub mod packer;
pub mod progress;
pub mod search;
pub mod updater;
