//! Replication task model and status state machine.
//!
//! One task drives one container onto this node. Status transitions follow
//! `Created → {Skipped | Running | Failed}` and `Running → {Done | Failed}`;
//! `Skipped`, `Done` and `Failed` are absorbing, making a finished task
//! immutable.

use std::fmt;

use packfs_volume::VolumeId;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Cluster-wide container identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ContainerId(
    /// Raw cluster-assigned identifier.
    pub u64,
);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a peer node that may hold a source replica.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a replication task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TaskStatus {
    /// Accepted but not yet started.
    #[default]
    Created,
    /// The container was already present; nothing was done.
    Skipped,
    /// Transfer in progress.
    Running,
    /// Container replicated and registered.
    Done,
    /// Replication failed; the scheduler may submit a fresh task.
    Failed,
}

impl TaskStatus {
    /// Whether this status permits no further transitions.
    pub fn is_absorbing(&self) -> bool {
        matches!(self, Self::Skipped | Self::Done | Self::Failed)
    }

    fn can_transition_to(&self, next: TaskStatus) -> bool {
        match self {
            Self::Created => matches!(
                next,
                Self::Skipped | Self::Running | Self::Failed
            ),
            Self::Running => matches!(next, Self::Done | Self::Failed),
            Self::Skipped | Self::Done | Self::Failed => false,
        }
    }
}

/// One request to materialize a container locally.
#[derive(Debug, Clone)]
pub struct ReplicationTask {
    container_id: ContainerId,
    sources: Vec<NodeId>,
    status: TaskStatus,
    transferred_bytes: Option<u64>,
    target_volume: Option<VolumeId>,
}

impl ReplicationTask {
    /// Creates a task for `container_id` with candidate source nodes.
    pub fn new(container_id: ContainerId, sources: Vec<NodeId>) -> Self {
        Self {
            container_id,
            sources,
            status: TaskStatus::Created,
            transferred_bytes: None,
            target_volume: None,
        }
    }

    /// The container this task replicates.
    pub fn container_id(&self) -> ContainerId {
        self.container_id
    }

    /// Candidate source nodes in preference order.
    pub fn sources(&self) -> &[NodeId] {
        &self.sources
    }

    /// Current task status.
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Bytes actually transferred, once known.
    pub fn transferred_bytes(&self) -> Option<u64> {
        self.transferred_bytes
    }

    /// Target volume, once chosen.
    pub fn target_volume(&self) -> Option<&VolumeId> {
        self.target_volume.as_ref()
    }

    /// Transitions the task to `next`.
    ///
    /// Transitions out of an absorbing status are ignored with a warning; a
    /// finished task never changes again.
    pub fn set_status(&mut self, next: TaskStatus) {
        if self.status.can_transition_to(next) {
            self.status = next;
        } else {
            warn!(
                container = %self.container_id,
                from = ?self.status,
                to = ?next,
                "ignoring invalid task status transition"
            );
        }
    }

    /// Records the transferred byte count. Only the first value sticks.
    pub fn set_transferred_bytes(&mut self, bytes: u64) {
        if self.transferred_bytes.is_none() {
            self.transferred_bytes = Some(bytes);
        }
    }

    /// Records the chosen target volume. Only the first value sticks.
    pub fn set_target_volume(&mut self, volume: VolumeId) {
        if self.target_volume.is_none() {
            self.target_volume = Some(volume);
        }
    }
}
