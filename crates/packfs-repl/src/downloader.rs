//! Download contract for fetching container data from peer replicas.
//!
//! The wire protocol lives behind this trait; the replicator only depends on
//! the contract: try the candidate sources in order, stage the archive under
//! the given directory, and report either a staged path or a definitive "no
//! source succeeded".

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::compression::CopyCompression;
use crate::error::ReplicationResult;
use crate::task::{ContainerId, NodeId};

/// Fetches container data from candidate source replicas.
#[async_trait]
pub trait ContainerDownloader: Send + Sync {
    /// Downloads `container_id` from the first source that succeeds.
    ///
    /// The staged archive is written under `staging_dir` using the negotiated
    /// `compression`. Returns `Ok(None)` when every candidate source failed —
    /// that is a definitive outcome, not a transport error. This call may
    /// block for the full transfer; concurrency is bounded by the caller's
    /// worker pool.
    async fn fetch(
        &self,
        container_id: ContainerId,
        sources: &[NodeId],
        staging_dir: &Path,
        compression: CopyCompression,
    ) -> ReplicationResult<Option<PathBuf>>;
}

/// Staged archive file name for a container.
///
/// Deterministic per container identifier, so concurrent tasks for different
/// containers never collide inside a shared staging directory.
pub fn staged_file_name(container_id: ContainerId, compression: CopyCompression) -> String {
    format!(
        "container-{}.{}",
        container_id,
        compression.file_extension()
    )
}
