//! Volume model and committed-bytes reservation accounting.
//!
//! The committed-bytes counter is the single shared mutable point of
//! coordination between concurrent replication tasks: every speculative
//! reservation increments it atomically and the paired release decrements it,
//! so admission checks always see in-flight liabilities. Reservations are
//! RAII guards; the release fires exactly once no matter which control path a
//! task takes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{VolumeError, VolumeResult};
use crate::usage::{CachedUsage, UsageSnapshot};

/// Unique identifier for a managed volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VolumeId(String);

impl VolumeId {
    /// Creates a volume identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Policy for the free space a volume must always keep to spare.
///
/// The margin scales with capacity (a percentage) but is clamped between a
/// floor and a ceiling so tiny volumes still keep a usable minimum and huge
/// volumes do not strand hundreds of gigabytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSpareConfig {
    /// Percentage of capacity to keep free (0–100).
    pub spare_percent: f64,
    /// Minimum spare bytes regardless of capacity. Default: 1 GiB.
    pub spare_floor_bytes: u64,
    /// Maximum spare bytes regardless of capacity. Default: 100 GiB.
    pub spare_ceiling_bytes: u64,
}

impl Default for VolumeSpareConfig {
    fn default() -> Self {
        Self {
            spare_percent: 5.0,
            spare_floor_bytes: 1 << 30,
            spare_ceiling_bytes: 100 << 30,
        }
    }
}

impl VolumeSpareConfig {
    /// Validates the config, rejecting out-of-range percentages and an
    /// inverted floor/ceiling pair.
    pub fn validate(&self) -> VolumeResult<()> {
        if !(0.0..=100.0).contains(&self.spare_percent) || !self.spare_percent.is_finite() {
            return Err(VolumeError::InvalidSpareConfig {
                reason: format!("spare_percent {} not in 0..=100", self.spare_percent),
            });
        }
        if self.spare_floor_bytes > self.spare_ceiling_bytes {
            return Err(VolumeError::InvalidSpareConfig {
                reason: format!(
                    "floor {} exceeds ceiling {}",
                    self.spare_floor_bytes, self.spare_ceiling_bytes
                ),
            });
        }
        Ok(())
    }

    /// Computes the spare margin for a volume of the given capacity.
    pub fn spare_for(&self, capacity: u64) -> u64 {
        let scaled = (capacity as f64 * self.spare_percent / 100.0) as u64;
        scaled.clamp(self.spare_floor_bytes, self.spare_ceiling_bytes)
    }

    /// Config with a zero margin: every byte of free space is admissible.
    pub fn none() -> Self {
        Self {
            spare_percent: 0.0,
            spare_floor_bytes: 0,
            spare_ceiling_bytes: 0,
        }
    }
}

/// A managed local disk/mount holding zero or more containers.
#[derive(Debug)]
pub struct Volume {
    id: VolumeId,
    root: PathBuf,
    usage: CachedUsage,
    committed_bytes: AtomicU64,
    spare: VolumeSpareConfig,
}

impl Volume {
    /// Creates a volume rooted at `root` with the given spare policy.
    ///
    /// The usage cache starts empty; a refresher must push a snapshot before
    /// the volume can pass admission.
    pub fn new(id: VolumeId, root: impl Into<PathBuf>, spare: VolumeSpareConfig) -> VolumeResult<Self> {
        spare.validate()?;
        Ok(Self {
            id,
            root: root.into(),
            usage: CachedUsage::new(),
            committed_bytes: AtomicU64::new(0),
            spare,
        })
    }

    /// Returns the volume identifier.
    pub fn id(&self) -> &VolumeId {
        &self.id
    }

    /// Returns the volume's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pushes a fresh usage snapshot into the cache.
    pub fn refresh_usage(&self, snapshot: UsageSnapshot) {
        self.usage.refresh(snapshot);
    }

    /// Returns the last usage snapshot, or `None` if never refreshed.
    pub fn current_usage(&self) -> Option<UsageSnapshot> {
        self.usage.current()
    }

    /// Bytes speculatively reserved against this volume right now.
    pub fn committed_bytes(&self) -> u64 {
        self.committed_bytes.load(Ordering::SeqCst)
    }

    /// Spare margin this volume must retain, derived from its capacity.
    pub fn free_space_to_spare(&self, capacity: u64) -> u64 {
        self.spare.spare_for(capacity)
    }

    /// Atomically reserves `bytes` against this volume.
    ///
    /// The returned guard releases the same amount exactly once, either via
    /// [`SpaceReservation::release`] or on drop.
    pub fn reserve(self: &Arc<Self>, bytes: u64) -> SpaceReservation {
        let before = self.committed_bytes.fetch_add(bytes, Ordering::SeqCst);
        debug!(
            volume = %self.id,
            bytes,
            committed = before + bytes,
            "reserved speculative space"
        );
        SpaceReservation {
            volume: Arc::clone(self),
            bytes,
            released: false,
        }
    }
}

/// RAII guard for a speculative space reservation on one volume.
///
/// Holding the guard keeps the reserved bytes counted against the volume;
/// dropping it (or calling [`release`](Self::release)) returns the counter to
/// its pre-reservation value. Release is idempotent and fires exactly once.
#[derive(Debug)]
pub struct SpaceReservation {
    volume: Arc<Volume>,
    bytes: u64,
    released: bool,
}

impl SpaceReservation {
    /// Bytes held by this reservation.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// The volume the reservation was taken on.
    pub fn volume(&self) -> &Arc<Volume> {
        &self.volume
    }

    /// Releases the reservation eagerly instead of waiting for drop.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let before = self.volume.committed_bytes.fetch_sub(self.bytes, Ordering::SeqCst);
        debug!(
            volume = %self.volume.id,
            bytes = self.bytes,
            committed = before - self.bytes,
            "released speculative space"
        );
    }
}

impl Drop for SpaceReservation {
    fn drop(&mut self) {
        self.release_once();
    }
}
