//! Container inventory contract and in-memory implementation.
//!
//! The replicator's whole contract with the inventory is "does an entry
//! already exist" (idempotency) and "register a newly imported entry"
//! (commit). Registration is first-writer-wins: a duplicate register is a
//! conflict, which is what keeps concurrent tasks for the same container from
//! ever double-importing.

use std::path::PathBuf;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use packfs_volume::VolumeId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ReplicationError, ReplicationResult};
use crate::task::ContainerId;

/// Metadata recorded when a container is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    /// Volume the container lives on.
    pub volume: VolumeId,
    /// Payload size in bytes.
    pub bytes: u64,
    /// Permanent container directory.
    pub path: PathBuf,
    /// CRC32 of the container payload, computed at import.
    pub checksum: u32,
}

/// Lookup and registration surface of the node's container registry.
pub trait ContainerInventory: Send + Sync {
    /// Whether `id` is already registered.
    fn exists(&self, id: ContainerId) -> bool;

    /// Registers a newly imported container.
    ///
    /// Fails with [`ReplicationError::AlreadyRegistered`] if `id` is present;
    /// the existing entry is left untouched.
    fn register(&self, id: ContainerId, metadata: ContainerMetadata) -> ReplicationResult<()>;

    /// Returns the metadata for `id`, if registered.
    fn get(&self, id: ContainerId) -> Option<ContainerMetadata>;

    /// Number of registered containers.
    fn len(&self) -> usize;

    /// Whether no containers are registered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory inventory backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryInventory {
    entries: DashMap<ContainerId, ContainerMetadata>,
}

impl InMemoryInventory {
    /// Creates an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContainerInventory for InMemoryInventory {
    fn exists(&self, id: ContainerId) -> bool {
        self.entries.contains_key(&id)
    }

    fn register(&self, id: ContainerId, metadata: ContainerMetadata) -> ReplicationResult<()> {
        match self.entries.entry(id) {
            Entry::Occupied(_) => Err(ReplicationError::AlreadyRegistered {
                container_id: id.0,
            }),
            Entry::Vacant(slot) => {
                debug!(
                    container = %id,
                    volume = %metadata.volume,
                    bytes = metadata.bytes,
                    "registered container"
                );
                slot.insert(metadata);
                Ok(())
            }
        }
    }

    fn get(&self, id: ContainerId) -> Option<ContainerMetadata> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
