//! Volume choosing policies for placing an incoming container.
//!
//! Both policies only consider volumes that independently pass a baseline
//! [`AvailableSpaceFilter`]; when none qualify the caller gets a
//! [`VolumeError::NoVolumeAvailable`] carrying the filter's diagnostic
//! rendering, never a silent default.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{VolumeError, VolumeResult};
use crate::filter::AvailableSpaceFilter;
use crate::volume::Volume;

/// Load-balancing policy for choosing a target volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ChoosingPolicy {
    /// Rotate through eligible volumes in order.
    #[default]
    RoundRobin,
    /// Pick the eligible volume with the most effective free space.
    MostAvailable,
}

/// Chooses a single target volume from a set of eligible candidates.
#[derive(Debug)]
pub struct VolumeChooser {
    policy: ChoosingPolicy,
    cursor: AtomicUsize,
}

impl VolumeChooser {
    /// Creates a chooser with the given policy.
    pub fn new(policy: ChoosingPolicy) -> Self {
        Self {
            policy,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Returns the configured policy.
    pub fn policy(&self) -> ChoosingPolicy {
        self.policy
    }

    /// Chooses a volume with at least `required_space` beyond its margin.
    ///
    /// Fails with [`VolumeError::NoVolumeAvailable`] when no volume passes the
    /// admission filter.
    pub fn choose(
        &self,
        volumes: &[Arc<Volume>],
        required_space: u64,
    ) -> VolumeResult<Arc<Volume>> {
        let mut filter = AvailableSpaceFilter::new(required_space);
        let eligible: Vec<&Arc<Volume>> =
            volumes.iter().filter(|v| filter.test(v)).collect();

        if eligible.is_empty() {
            warn!(
                required_space,
                volumes = volumes.len(),
                filter = %filter,
                "no volume passed space admission"
            );
            return Err(VolumeError::NoVolumeAvailable {
                filter: filter.to_string(),
            });
        }

        let chosen = match self.policy {
            ChoosingPolicy::RoundRobin => {
                let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % eligible.len();
                eligible[idx]
            }
            ChoosingPolicy::MostAvailable => eligible
                .iter()
                .copied()
                .max_by_key(|v| effective_available(v.as_ref()))
                .unwrap_or(eligible[0]),
        };

        debug!(
            volume = %chosen.id(),
            policy = ?self.policy,
            required_space,
            eligible = eligible.len(),
            "chose target volume"
        );
        Ok(Arc::clone(chosen))
    }
}

/// Effective availability of a volume: free minus committed.
fn effective_available(volume: &Volume) -> i128 {
    match volume.current_usage() {
        Some(usage) => usage.available as i128 - volume.committed_bytes() as i128,
        None => i128::MIN,
    }
}
