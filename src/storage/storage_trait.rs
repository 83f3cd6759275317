//! Storage Traits
//!
//! Interfaces for the two remote stores a capture cycle writes to:
//! - [`ArtifactStore`]: durable blob storage that resolves a URL per object.
//! - [`ResultLedger`]: append-only collection of capture results.
//!
//! Implementations are injected into the cycle so tests and alternative
//! backends can stand in for the device's real stores.

use async_trait::async_trait;

use crate::error_handling::types::{PersistenceError, TransferError};
use crate::storage::types::NewResult;

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores `bytes` under `path` (`<prefix>/<artifact name>`) and returns
    /// the URL downstream viewers use to fetch it.
    async fn upload(&self, bytes: Vec<u8>, path: &str) -> Result<String, TransferError>;
}

#[async_trait]
pub trait ResultLedger: Send + Sync {
    /// Appends one record and returns its identifier. The record timestamp is
    /// assigned by the ledger.
    async fn add(&self, result: &NewResult) -> Result<String, PersistenceError>;
}
