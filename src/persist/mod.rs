//! Persistence layer for graph documents.
//!
//! Provides the gateway contract the editor saves through, an in-memory
//! implementation and the debounced autosave worker:
//! - `MemStore`: in-memory storage keyed by document id
//! - `Autosave`: coalesces snapshots and saves them in order, with retry

mod autosave;
mod mem;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::{Result, model::GraphDocument};

pub use autosave::{Autosave, SaveState, SaveStatus};
pub use mem::{MemStore, StoredDocument};

/// Backing store for graph documents.
///
/// Implementations must keep the newest version: a save whose `updatedAt` is
/// older than the stored one is discarded and reported as `Ok(false)`.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Stores a full snapshot of the document.
    ///
    /// # Arguments
    ///
    /// * `document` - The snapshot to store.
    ///
    /// # Returns
    ///
    /// Returns `Ok(true)` when stored, `Ok(false)` when discarded as stale.
    async fn save(
        &self,
        document: &GraphDocument,
    ) -> Result<bool>;

    /// Loads a document by id. Fails with `NotFound` when it does not exist.
    async fn load(
        &self,
        id: &str,
    ) -> Result<GraphDocument>;

    /// Checks if a document with the given id exists.
    async fn exists(
        &self,
        id: &str,
    ) -> Result<bool>;
}
