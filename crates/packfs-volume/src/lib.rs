#![warn(missing_docs)]

//! PackFS volume subsystem: volume model, cached usage snapshots,
//! committed-bytes reservations, space admission.
//!
//! This crate provides the disk-side half of container replication: each
//! managed volume tracks a cached usage snapshot and an atomic counter of
//! speculatively committed bytes, and the admission filter decides whether a
//! volume can accept additional data without eating into its spare margin.

pub mod error;
pub mod filter;
pub mod selector;
pub mod usage;
pub mod volume;

pub use error::{VolumeError, VolumeResult};
pub use filter::AvailableSpaceFilter;
pub use selector::{ChoosingPolicy, VolumeChooser};
pub use usage::{CachedUsage, UsageSnapshot};
pub use volume::{SpaceReservation, Volume, VolumeId, VolumeSpareConfig};
