//! Space admission filter for selecting volumes with enough room for a new
//! container.
//!
//! A filter instance is single-use per selection pass: it tests volumes one by
//! one, remembers which ones it rejected and their free/committed readings at
//! rejection time, and tracks the best effective availability it saw. The
//! rejected-volume bookkeeping feeds operator diagnostics only; decisions are
//! made per test call.

use std::fmt;

use crate::volume::{Volume, VolumeId};

/// Free/committed reading captured when a volume is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectedSpace {
    /// Free bytes at rejection time.
    pub free: u64,
    /// Committed bytes at rejection time.
    pub committed: u64,
}

impl fmt::Display for RejectedSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "free: {}, committed: {}", self.free, self.committed)
    }
}

/// Space-eligibility predicate over volumes.
///
/// A volume is eligible iff its effective availability (free minus committed)
/// covers the required space on top of the volume's spare margin, and its
/// usage readings are present and internally consistent. Degraded volumes
/// (no snapshot, inconsistent readings) are skipped, never a panic.
#[derive(Debug)]
pub struct AvailableSpaceFilter {
    required_space: u64,
    full_volumes: Vec<(VolumeId, RejectedSpace)>,
    most_available: i128,
}

impl AvailableSpaceFilter {
    /// Creates a filter requiring `required_space` bytes beyond the margin.
    pub fn new(required_space: u64) -> Self {
        Self {
            required_space,
            full_volumes: Vec::new(),
            most_available: i128::MIN,
        }
    }

    /// Tests whether `volume` currently has enough space.
    ///
    /// Reads the cached usage snapshot and the live committed-bytes counter;
    /// never mutates volume state.
    pub fn test(&mut self, volume: &Volume) -> bool {
        let committed = volume.committed_bytes();

        let Some(usage) = volume.current_usage() else {
            self.full_volumes.push((
                volume.id().clone(),
                RejectedSpace { free: 0, committed },
            ));
            return false;
        };

        let free = usage.available;
        let available = free as i128 - committed as i128;
        self.most_available = self.most_available.max(available);

        let spare = volume.free_space_to_spare(usage.capacity);
        let eligible = usage.is_consistent()
            && available >= 0
            && available - self.required_space as i128 >= spare as i128;

        if !eligible {
            self.full_volumes
                .push((volume.id().clone(), RejectedSpace { free, committed }));
        }

        eligible
    }

    /// The threshold this filter was built with.
    pub fn required_space(&self) -> u64 {
        self.required_space
    }

    /// Whether at least one tested volume was rejected.
    pub fn found_full_volumes(&self) -> bool {
        !self.full_volumes.is_empty()
    }

    /// Running maximum of effective availability across all tested volumes.
    ///
    /// `i128::MIN` until the first volume with a usage snapshot is tested.
    pub fn most_available_space(&self) -> i128 {
        self.most_available
    }

    /// Rejected volumes with their readings at rejection time.
    pub fn full_volumes(&self) -> &[(VolumeId, RejectedSpace)] {
        &self.full_volumes
    }
}

impl fmt::Display for AvailableSpaceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "required space: {}, volumes: [", self.required_space)?;
        for (i, (id, space)) in self.full_volumes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {{{}}}", id, space)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::UsageSnapshot;
    use crate::volume::VolumeSpareConfig;
    use std::sync::Arc;

    fn volume_with(
        id: &str,
        capacity: u64,
        available: u64,
        spare: VolumeSpareConfig,
    ) -> Arc<Volume> {
        let volume = Arc::new(Volume::new(VolumeId::new(id), "/data/test", spare).unwrap());
        volume.refresh_usage(UsageSnapshot::new(capacity, available));
        volume
    }

    fn fixed_spare(bytes: u64) -> VolumeSpareConfig {
        VolumeSpareConfig {
            spare_percent: 0.0,
            spare_floor_bytes: bytes,
            spare_ceiling_bytes: bytes,
        }
    }

    #[test]
    fn test_eligible_volume_passes() {
        let volume = volume_with("disk1", 1000, 800, fixed_spare(100));
        let mut filter = AvailableSpaceFilter::new(200);
        assert!(filter.test(&volume));
        assert!(!filter.found_full_volumes());
    }

    #[test]
    fn test_boundary_equality_is_eligible() {
        // available - required == spare exactly.
        let volume = volume_with("disk1", 1000, 300, fixed_spare(100));
        let mut filter = AvailableSpaceFilter::new(200);
        assert!(filter.test(&volume));
    }

    #[test]
    fn test_one_byte_short_is_rejected() {
        let volume = volume_with("disk1", 1000, 299, fixed_spare(100));
        let mut filter = AvailableSpaceFilter::new(200);
        assert!(!filter.test(&volume));
        assert!(filter.found_full_volumes());
    }

    #[test]
    fn test_committed_bytes_reduce_availability() {
        let volume = volume_with("disk1", 1000, 800, fixed_spare(100));
        let reservation = volume.reserve(600);
        let mut filter = AvailableSpaceFilter::new(200);
        // 800 free - 600 committed = 200 effective; 200 - 200 < 100 spare.
        assert!(!filter.test(&volume));
        reservation.release();

        let mut filter = AvailableSpaceFilter::new(200);
        assert!(filter.test(&volume));
    }

    #[test]
    fn test_missing_usage_is_rejected_not_fatal() {
        let volume = Arc::new(
            Volume::new(VolumeId::new("disk1"), "/data/test", fixed_spare(0)).unwrap(),
        );
        let mut filter = AvailableSpaceFilter::new(0);
        assert!(!filter.test(&volume));
        assert!(filter.found_full_volumes());
        // No snapshot means the running max is untouched.
        assert_eq!(filter.most_available_space(), i128::MIN);
    }

    #[test]
    fn test_inconsistent_usage_is_rejected() {
        let volume = volume_with("disk1", 100, 500, fixed_spare(0));
        let mut filter = AvailableSpaceFilter::new(0);
        assert!(!filter.test(&volume));
    }

    #[test]
    fn test_negative_effective_available_is_rejected() {
        let volume = volume_with("disk1", 1000, 100, fixed_spare(0));
        let _reservation = volume.reserve(500);
        let mut filter = AvailableSpaceFilter::new(0);
        assert!(!filter.test(&volume));
        assert_eq!(filter.most_available_space(), -400);
    }

    #[test]
    fn test_running_max_across_volumes() {
        let small = volume_with("small", 1000, 100, fixed_spare(0));
        let big = volume_with("big", 1000, 900, fixed_spare(0));
        let mut filter = AvailableSpaceFilter::new(0);
        filter.test(&small);
        filter.test(&big);
        assert_eq!(filter.most_available_space(), 900);
    }

    #[test]
    fn test_rejection_records_snapshot() {
        let volume = volume_with("disk1", 1000, 50, fixed_spare(100));
        let _reservation = volume.reserve(30);
        let mut filter = AvailableSpaceFilter::new(0);
        assert!(!filter.test(&volume));

        let rejected = filter.full_volumes();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0, VolumeId::new("disk1"));
        assert_eq!(
            rejected[0].1,
            RejectedSpace {
                free: 50,
                committed: 30
            }
        );
    }

    #[test]
    fn test_display_lists_rejected_volumes() {
        let volume = volume_with("disk1", 1000, 50, fixed_spare(100));
        let mut filter = AvailableSpaceFilter::new(25);
        filter.test(&volume);
        let rendered = format!("{}", filter);
        assert!(rendered.contains("required space: 25"));
        assert!(rendered.contains("disk1"));
        assert!(rendered.contains("free: 50"));
        assert!(rendered.contains("committed: 0"));
    }

    #[test]
    fn test_zero_threshold_filter_accepts_non_full_volume() {
        let volume = volume_with("disk1", 1000, 500, fixed_spare(100));
        let mut filter = AvailableSpaceFilter::new(0);
        assert!(filter.test(&volume));
    }
}
