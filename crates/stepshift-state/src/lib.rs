//! Embedded registry backend for stepshift.
//!
//! Backed by [redb](https://docs.rs/redb), implements both collaborator
//! contracts from `stepshift-core`: `VersionRegistry` (definitions,
//! published versions, alias routing) and `AlarmProvider` (named alarm
//! conditions and whether they are firing).
//!
//! # Architecture
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns.
//! Versions are keyed by their version id and carry the resource they
//! belong to plus a per-resource sequence number, so the newest-first
//! listing survives deletions.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be handed to the orchestrator and the CLI at the same time.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
