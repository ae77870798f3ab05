#![warn(missing_docs)]

//! PackFS container replication subsystem.
//!
//! Materializes missing containers on this node: pick a target volume under
//! capacity constraints, speculatively reserve space, download from a peer
//! replica, and atomically commit the staged data into the container
//! inventory. Reservations are released on every exit path; failures resolve
//! into the task's terminal status rather than propagating to the caller.

pub mod compression;
pub mod downloader;
pub mod error;
pub mod importer;
pub mod inventory;
pub mod replicator;
pub mod supervisor;
pub mod task;

pub use compression::CopyCompression;
pub use downloader::ContainerDownloader;
pub use error::{ReplicationError, ReplicationResult};
pub use importer::ContainerImporter;
pub use inventory::{ContainerInventory, ContainerMetadata, InMemoryInventory};
pub use replicator::{DownloadAndImportReplicator, ReplicationConfig};
pub use supervisor::{ReplicationSupervisor, SupervisorStats};
pub use task::{ContainerId, NodeId, ReplicationTask, TaskStatus};
