//! Download-and-import replication orchestrator.
//!
//! Drives one replication task end to end: idempotency check, speculative
//! space reservation, admission re-validation, download, and commit. Every
//! failure resolves into the task's terminal status; the reservation guard
//! releases the committed bytes on every exit path, including timeouts and
//! errors, so a failed task never leaves a volume looking fuller than it is.

use std::sync::Arc;
use std::time::Duration;

use packfs_volume::AvailableSpaceFilter;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::compression::CopyCompression;
use crate::downloader::ContainerDownloader;
use crate::error::{ReplicationError, ReplicationResult};
use crate::importer::ContainerImporter;
use crate::inventory::ContainerInventory;
use crate::task::{ReplicationTask, TaskStatus};

/// Configuration consumed by the replicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Configured maximum container size in bytes. Default: 5 GiB.
    pub max_container_size: u64,
    /// Safety multiple applied when reserving space for an incoming
    /// container: the reservation covers both the in-flight download and the
    /// durable write. Default: 2.
    pub reservation_multiplier: u64,
    /// Upper bound on one transfer; a stuck download fails the task with its
    /// reservation released. Default: 1800 s.
    pub transfer_timeout_secs: u64,
    /// Compression scheme negotiated with source nodes.
    pub compression: CopyCompression,
    /// Size of the replication worker pool; the sole admission control on
    /// concurrent transfers.
    pub worker_count: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_container_size: 5 << 30,
            reservation_multiplier: 2,
            transfer_timeout_secs: 1800,
            compression: CopyCompression::default(),
            worker_count: 10,
        }
    }
}

impl ReplicationConfig {
    /// Bytes reserved per in-flight replication.
    pub fn reservation_bytes(&self) -> u64 {
        self.max_container_size
            .saturating_mul(self.reservation_multiplier)
    }

    /// Transfer timeout as a [`Duration`].
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}

/// Default replication implementation: downloads the container from a source
/// replica and imports it into the container inventory.
pub struct DownloadAndImportReplicator {
    config: ReplicationConfig,
    importer: Arc<ContainerImporter>,
    downloader: Arc<dyn ContainerDownloader>,
    inventory: Arc<dyn ContainerInventory>,
}

impl DownloadAndImportReplicator {
    /// Creates a replicator.
    pub fn new(
        config: ReplicationConfig,
        importer: Arc<ContainerImporter>,
        downloader: Arc<dyn ContainerDownloader>,
        inventory: Arc<dyn ContainerInventory>,
    ) -> Self {
        Self {
            config,
            importer,
            downloader,
            inventory,
        }
    }

    /// The replicator's configuration.
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Replicates one container, resolving the outcome into `task`'s status.
    ///
    /// Never returns an error: already-present, no-space, no-source and
    /// import failures all end as a terminal task status plus a log line.
    pub async fn replicate(&self, task: &mut ReplicationTask) {
        let container_id = task.container_id();

        if let Err(err) = self.try_replicate(task).await {
            match err {
                ReplicationError::ImportFailed { .. }
                | ReplicationError::AlreadyRegistered { .. }
                | ReplicationError::Compression { .. }
                | ReplicationError::Io(_) => {
                    error!(container = %container_id, error = %err, "container replication failed");
                }
                _ => {
                    warn!(container = %container_id, error = %err, "container replication failed");
                }
            }
            task.set_status(TaskStatus::Failed);
        }
    }

    /// The fallible replication path. Terminal success states (`Skipped`,
    /// `Done`) are set here; every error maps to `Failed` in [`replicate`].
    async fn try_replicate(&self, task: &mut ReplicationTask) -> ReplicationResult<()> {
        let container_id = task.container_id();

        if self.inventory.exists(container_id) {
            debug!(container = %container_id, "container already present, skipping");
            task.set_status(TaskStatus::Skipped);
            return Ok(());
        }

        info!(
            container = %container_id,
            sources = ?task.sources(),
            compression = ?self.config.compression,
            "starting container replication"
        );

        let volume = self.importer.choose_next_volume(0)?;
        task.set_target_volume(volume.id().clone());

        // The guard releases the committed bytes when it goes out of scope,
        // which covers every return below.
        let _reservation = volume.reserve(self.config.reservation_bytes());

        // The reservation was applied optimistically; re-check that the
        // volume still clears its margin with the liability in place.
        let mut filter = AvailableSpaceFilter::new(0);
        if !filter.test(&volume) {
            return Err(ReplicationError::InsufficientSpace {
                volume: volume.id().to_string(),
                filter: filter.to_string(),
            });
        }

        task.set_status(TaskStatus::Running);

        let staging_dir = ContainerImporter::ensure_staging_dir(&volume)?;

        let fetch = self.downloader.fetch(
            container_id,
            task.sources(),
            &staging_dir,
            self.config.compression,
        );
        let staged_path = match tokio::time::timeout(self.config.transfer_timeout(), fetch).await {
            Err(_) => {
                return Err(ReplicationError::TransferTimeout {
                    container_id: container_id.0,
                    timeout_secs: self.config.transfer_timeout_secs,
                });
            }
            Ok(Err(err)) => return Err(err),
            Ok(Ok(None)) => {
                return Err(ReplicationError::TransferFailed {
                    container_id: container_id.0,
                });
            }
            Ok(Ok(Some(path))) => path,
        };

        // Disk work happens off the async workers so a slow volume cannot
        // stall unrelated runtime tasks.
        let transferred = {
            let staged = staged_path.clone();
            tokio::task::spawn_blocking(move || std::fs::metadata(&staged).map(|m| m.len()))
                .await
                .map_err(|err| ReplicationError::ImportFailed {
                    container_id: container_id.0,
                    reason: format!("staging size worker panicked: {err}"),
                })??
        };
        task.set_transferred_bytes(transferred);
        info!(
            container = %container_id,
            bytes = transferred,
            "container downloaded, starting import"
        );

        let importer = Arc::clone(&self.importer);
        let target = Arc::clone(&volume);
        let compression = self.config.compression;
        tokio::task::spawn_blocking(move || {
            importer.import_container(container_id, &staged_path, &target, compression)
        })
        .await
        .map_err(|err| ReplicationError::ImportFailed {
            container_id: container_id.0,
            reason: format!("import worker panicked: {err}"),
        })??;

        info!(
            container = %container_id,
            volume = %volume.id(),
            bytes = transferred,
            "container replicated successfully"
        );
        task.set_status(TaskStatus::Done);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::staged_file_name;
    use crate::inventory::InMemoryInventory;
    use crate::task::{ContainerId, NodeId};
    use async_trait::async_trait;
    use packfs_volume::{ChoosingPolicy, UsageSnapshot, Volume, VolumeId, VolumeSpareConfig};
    use std::path::{Path, PathBuf};

    const GIB: u64 = 1 << 30;

    struct DeliveringDownloader {
        payload: Vec<u8>,
    }

    #[async_trait]
    impl ContainerDownloader for DeliveringDownloader {
        async fn fetch(
            &self,
            container_id: ContainerId,
            _sources: &[NodeId],
            staging_dir: &Path,
            compression: CopyCompression,
        ) -> ReplicationResult<Option<PathBuf>> {
            let path = staging_dir.join(staged_file_name(container_id, compression));
            std::fs::write(&path, compression.compress(&self.payload)?)?;
            Ok(Some(path))
        }
    }

    struct StalledDownloader;

    #[async_trait]
    impl ContainerDownloader for StalledDownloader {
        async fn fetch(
            &self,
            _container_id: ContainerId,
            _sources: &[NodeId],
            _staging_dir: &Path,
            _compression: CopyCompression,
        ) -> ReplicationResult<Option<PathBuf>> {
            tokio::time::sleep(Duration::from_secs(86_400)).await;
            Ok(None)
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        volume: Arc<Volume>,
        replicator: DownloadAndImportReplicator,
    }

    fn fixture(
        available: u64,
        spare_bytes: u64,
        config: ReplicationConfig,
        downloader: Arc<dyn ContainerDownloader>,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let spare = VolumeSpareConfig {
            spare_percent: 0.0,
            spare_floor_bytes: spare_bytes,
            spare_ceiling_bytes: spare_bytes,
        };
        let volume = Arc::new(Volume::new(VolumeId::new("disk1"), dir.path(), spare).unwrap());
        volume.refresh_usage(UsageSnapshot::new(100 * GIB, available));

        let inventory = Arc::new(InMemoryInventory::new());
        let importer = Arc::new(ContainerImporter::new(
            vec![Arc::clone(&volume)],
            ChoosingPolicy::RoundRobin,
            Arc::clone(&inventory) as Arc<dyn ContainerInventory>,
        ));
        let replicator = DownloadAndImportReplicator::new(
            config,
            importer,
            downloader,
            inventory as Arc<dyn ContainerInventory>,
        );

        Fixture {
            _dir: dir,
            volume,
            replicator,
        }
    }

    fn task_for(id: u64) -> ReplicationTask {
        ReplicationTask::new(ContainerId(id), vec![NodeId::new("dn-1")])
    }

    #[test]
    fn test_config_defaults() {
        let config = ReplicationConfig::default();
        assert_eq!(config.max_container_size, 5 << 30);
        assert_eq!(config.reservation_multiplier, 2);
        assert_eq!(config.reservation_bytes(), 10 << 30);
        assert_eq!(config.transfer_timeout(), Duration::from_secs(1800));
        assert_eq!(config.worker_count, 10);
    }

    #[test]
    fn test_reservation_bytes_saturates() {
        let config = ReplicationConfig {
            max_container_size: u64::MAX,
            reservation_multiplier: 2,
            ..ReplicationConfig::default()
        };
        assert_eq!(config.reservation_bytes(), u64::MAX);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = ReplicationConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ReplicationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_container_size, config.max_container_size);
        assert_eq!(back.compression, config.compression);
    }

    #[tokio::test]
    async fn test_reservation_past_margin_is_insufficient_space() {
        // 20 GiB free, 10 GiB reservation, 11 GiB margin: the re-check after
        // reserving must surface the typed no-space error.
        let config = ReplicationConfig {
            max_container_size: 5 * GIB,
            reservation_multiplier: 2,
            ..ReplicationConfig::default()
        };
        let fixture = fixture(
            20 * GIB,
            11 * GIB,
            config,
            Arc::new(DeliveringDownloader {
                payload: vec![1u8; 64],
            }),
        );

        let mut task = task_for(21);
        let err = fixture.replicator.try_replicate(&mut task).await.unwrap_err();
        match err {
            ReplicationError::InsufficientSpace { volume, filter } => {
                assert_eq!(volume, "disk1");
                assert!(filter.contains("disk1"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fixture.volume.committed_bytes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_transfer_is_typed_timeout() {
        let config = ReplicationConfig {
            max_container_size: 1024,
            transfer_timeout_secs: 30,
            ..ReplicationConfig::default()
        };
        let fixture = fixture(50 * GIB, 0, config, Arc::new(StalledDownloader));

        let mut task = task_for(22);
        let err = fixture.replicator.try_replicate(&mut task).await.unwrap_err();
        assert!(matches!(
            err,
            ReplicationError::TransferTimeout {
                container_id: 22,
                timeout_secs: 30,
            }
        ));
        assert_eq!(fixture.volume.committed_bytes(), 0);
    }

    #[tokio::test]
    async fn test_failure_errors_resolve_to_failed_status() {
        let config = ReplicationConfig {
            max_container_size: 5 * GIB,
            reservation_multiplier: 2,
            ..ReplicationConfig::default()
        };
        let fixture = fixture(
            20 * GIB,
            11 * GIB,
            config,
            Arc::new(DeliveringDownloader {
                payload: vec![1u8; 64],
            }),
        );

        let mut task = task_for(23);
        fixture.replicator.replicate(&mut task).await;
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(fixture.volume.committed_bytes(), 0);
    }
}
