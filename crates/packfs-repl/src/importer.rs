//! Container importer: volume selection and the commit half of replication.
//!
//! Importing is atomic from the inventory's point of view: the payload is
//! unpacked into a hidden temp directory on the target volume, renamed into
//! the permanent container tree in one step, and only then registered. A
//! crash mid-import leaves at most an orphaned temp directory, never a
//! partially visible container.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use packfs_volume::{ChoosingPolicy, Volume, VolumeChooser};
use tracing::{debug, info, warn};

use crate::compression::CopyCompression;
use crate::error::{ReplicationError, ReplicationResult};
use crate::inventory::{ContainerInventory, ContainerMetadata};
use crate::task::ContainerId;

/// Per-volume scratch directory for in-progress transfers.
const STAGING_DIR: &str = "staging";
/// Per-volume root of the permanent container tree.
const CONTAINER_DIR: &str = "containers";
/// Unpacked payload file inside a container directory.
const PAYLOAD_FILE: &str = "container.dat";

/// Chooses target volumes and commits staged containers into the inventory.
pub struct ContainerImporter {
    volumes: Vec<Arc<Volume>>,
    chooser: VolumeChooser,
    inventory: Arc<dyn ContainerInventory>,
}

impl ContainerImporter {
    /// Creates an importer over the node's volumes.
    pub fn new(
        volumes: Vec<Arc<Volume>>,
        policy: ChoosingPolicy,
        inventory: Arc<dyn ContainerInventory>,
    ) -> Self {
        Self {
            volumes,
            chooser: VolumeChooser::new(policy),
            inventory,
        }
    }

    /// The volumes this importer places containers on.
    pub fn volumes(&self) -> &[Arc<Volume>] {
        &self.volumes
    }

    /// Chooses a target volume with `required_space` beyond its margin.
    pub fn choose_next_volume(&self, required_space: u64) -> ReplicationResult<Arc<Volume>> {
        Ok(self.chooser.choose(&self.volumes, required_space)?)
    }

    /// Deterministic per-volume scratch location for in-progress transfers.
    pub fn staging_dir(volume: &Volume) -> PathBuf {
        volume.root().join(STAGING_DIR)
    }

    /// Creates the staging directory if needed and returns it.
    pub fn ensure_staging_dir(volume: &Volume) -> std::io::Result<PathBuf> {
        let dir = Self::staging_dir(volume);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Permanent directory for a container on a volume.
    pub fn container_dir(volume: &Volume, container_id: ContainerId) -> PathBuf {
        volume
            .root()
            .join(CONTAINER_DIR)
            .join(container_id.to_string())
    }

    /// Commits a staged archive into the permanent container tree.
    ///
    /// Validates and decodes the archive, writes the payload into a temp
    /// directory beside the final location, renames it into place (the commit
    /// point), and registers the container. The staged archive is removed
    /// after a successful commit.
    pub fn import_container(
        &self,
        container_id: ContainerId,
        staged_path: &std::path::Path,
        volume: &Arc<Volume>,
        compression: CopyCompression,
    ) -> ReplicationResult<()> {
        if self.inventory.exists(container_id) {
            return Err(ReplicationError::AlreadyRegistered {
                container_id: container_id.0,
            });
        }

        let raw = fs::read(staged_path)?;
        if raw.is_empty() {
            return Err(ReplicationError::ImportFailed {
                container_id: container_id.0,
                reason: format!("empty staged archive at {}", staged_path.display()),
            });
        }
        let payload = compression.decompress(&raw)?;
        let checksum = crc32fast::hash(&payload);

        let final_dir = Self::container_dir(volume, container_id);
        let container_root = volume.root().join(CONTAINER_DIR);
        let tmp_dir = container_root.join(format!(
            ".import-{}-{:08x}",
            container_id,
            rand::random::<u32>()
        ));

        fs::create_dir_all(&tmp_dir)?;
        let result = self.commit(container_id, &payload, checksum, &tmp_dir, &final_dir, volume);
        if result.is_err() {
            // Leave nothing behind on the failure path.
            if let Err(err) = fs::remove_dir_all(&tmp_dir) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        container = %container_id,
                        path = %tmp_dir.display(),
                        error = %err,
                        "failed to clean up import temp directory"
                    );
                }
            }
            return result;
        }

        if let Err(err) = fs::remove_file(staged_path) {
            warn!(
                container = %container_id,
                path = %staged_path.display(),
                error = %err,
                "failed to remove staged archive after import"
            );
        }

        info!(
            container = %container_id,
            volume = %volume.id(),
            bytes = payload.len(),
            "imported container"
        );
        Ok(())
    }

    fn commit(
        &self,
        container_id: ContainerId,
        payload: &[u8],
        checksum: u32,
        tmp_dir: &std::path::Path,
        final_dir: &std::path::Path,
        volume: &Arc<Volume>,
    ) -> ReplicationResult<()> {
        fs::write(tmp_dir.join(PAYLOAD_FILE), payload)?;

        // Commit point: rename fails if another task already imported this id.
        fs::rename(tmp_dir, final_dir).map_err(|err| ReplicationError::ImportFailed {
            container_id: container_id.0,
            reason: format!("rename into {} failed: {err}", final_dir.display()),
        })?;
        debug!(
            container = %container_id,
            path = %final_dir.display(),
            "container directory committed"
        );

        let metadata = ContainerMetadata {
            volume: volume.id().clone(),
            bytes: payload.len() as u64,
            path: final_dir.to_path_buf(),
            checksum,
        };
        if let Err(err) = self.inventory.register(container_id, metadata) {
            // Lost an inventory race after the rename; withdraw our copy.
            if let Err(cleanup) = fs::remove_dir_all(final_dir) {
                warn!(
                    container = %container_id,
                    path = %final_dir.display(),
                    error = %cleanup,
                    "failed to remove container directory after register conflict"
                );
            }
            return Err(err);
        }
        Ok(())
    }
}
