//! Error types for the volume subsystem.

use thiserror::Error;

/// Result type alias for volume operations.
pub type VolumeResult<T> = Result<T, VolumeError>;

/// Error variants for volume operations.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// No volume passed the space admission filter.
    #[error("no volume available: {filter}")]
    NoVolumeAvailable {
        /// Diagnostic rendering of the filter that rejected every volume.
        filter: String,
    },

    /// A spare-space configuration was rejected.
    #[error("invalid spare config: {reason}")]
    InvalidSpareConfig {
        /// Description of the problem.
        reason: String,
    },
}
