//! Error types for the replication subsystem.

use thiserror::Error;

use packfs_volume::VolumeError;

/// Result type alias for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Errors raised while replicating a container onto this node.
///
/// All of these resolve into the task's terminal status inside the
/// replicator; none cross the `replicate` boundary.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// No disk passed baseline space admission.
    #[error("no eligible target volume: {details}")]
    NoVolumeAvailable {
        /// Diagnostic rendering of the admission filter.
        details: String,
    },

    /// The speculative reservation pushed the chosen volume past its margin.
    #[error("insufficient space on volume {volume}: {filter}")]
    InsufficientSpace {
        /// The volume that failed re-validation.
        volume: String,
        /// Diagnostic rendering of the re-validation filter.
        filter: String,
    },

    /// No candidate source yielded container data.
    #[error("no source replica yielded container {container_id}")]
    TransferFailed {
        /// The container that could not be fetched.
        container_id: u64,
    },

    /// The transfer did not complete within the configured timeout.
    #[error("transfer of container {container_id} timed out after {timeout_secs}s")]
    TransferTimeout {
        /// The container whose transfer timed out.
        container_id: u64,
        /// The configured timeout in seconds.
        timeout_secs: u64,
    },

    /// Staged data could not be committed into the inventory.
    #[error("import of container {container_id} failed: {reason}")]
    ImportFailed {
        /// The container whose import failed.
        container_id: u64,
        /// Description of the failure.
        reason: String,
    },

    /// The container is already registered in the inventory.
    #[error("container {container_id} is already registered")]
    AlreadyRegistered {
        /// The conflicting container identifier.
        container_id: u64,
    },

    /// Staged archive could not be decompressed.
    #[error("decompression failed: {msg}")]
    Compression {
        /// Description of the codec failure.
        msg: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VolumeError> for ReplicationError {
    fn from(err: VolumeError) -> Self {
        match err {
            VolumeError::NoVolumeAvailable { filter } => {
                ReplicationError::NoVolumeAvailable { details: filter }
            }
            other => ReplicationError::NoVolumeAvailable {
                details: other.to_string(),
            },
        }
    }
}
