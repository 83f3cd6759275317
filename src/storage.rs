//! Storage subsystem
//!
//! This module provides abstractions and implementations for the two places a
//! finished capture ends up.
//!
//! Components:
//! - `storage_trait`: the [`ArtifactStore`] and [`ResultLedger`] traits.
//! - `types`: result records as written to the ledger.
//! - `file_artifact_store`: filesystem-backed blob store with URL resolution.
//! - `file_ledger`: filesystem-backed append-only result collection.

pub mod file_artifact_store;
pub mod file_ledger;
pub mod storage_trait;
pub mod types;

pub use file_artifact_store::FileArtifactStore;
pub use file_ledger::FileResultLedger;
pub use storage_trait::{ArtifactStore, ResultLedger};
