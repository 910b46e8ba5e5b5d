// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tunables for the FIB core, with documented defaults for everything spec'd as
//! "default N, configurable".

use derive_builder::Builder;
use std::time::Duration;

/// Whether an [`crate::store::object::FrrProtected`] / PIC-Edge pair reverts to its
/// primary automatically once the primary recovers, and if so after what delay.
///
/// Spec §9 Open Question 3 leaves this unprescribed beyond "must be explicit"; this
/// crate resolves it as a per-group configuration value rather than a single
/// process-wide default (see `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertivePolicy {
    /// Flip back to the primary the instant it is observed healthy again.
    Immediate,
    /// Flip back to the primary only after it has been healthy continuously for the
    /// given duration.
    WaitToRestore(Duration),
    /// Never revert automatically; the backup remains active until an explicit
    /// orchestration call flips it back.
    NonRevertive,
}

/// Tunables for a [`crate::FibCore`] instance.
#[derive(Builder, Debug, Clone)]
#[builder(pattern = "owned", build_fn(error = "derive_builder::UninitializedFieldError"))]
pub struct FibCoreConfig {
    /// Maximum `RecursiveNextHop` resolution depth before `RecursionExceeded` (spec §4.7).
    #[builder(default = "5")]
    pub max_recursion_depth: u8,

    /// Maximum forward-walk depth before `WalkDepthExceeded` (spec §4.3).
    #[builder(default = "10")]
    pub max_walk_depth: u8,

    /// Multiplier applied to an ECMP group's max member count to size its resilient
    /// hashing table (spec §4.5: "smallest power of two ≥ 64x max member count").
    #[builder(default = "64")]
    pub resilient_table_multiplier: u32,

    /// High-water mark for the orchestration input queue (spec §5). Producers are
    /// expected to coalesce once this is exceeded; the core itself never drops events.
    #[builder(default = "4096")]
    pub queue_high_water_mark: usize,

    /// How long a make-before-break update waits for the HAL's drain acknowledgement
    /// before the operation is surfaced as `PartiallyApplied` (spec §5).
    #[builder(default = "Duration::from_millis(250)")]
    pub hal_drain_timeout: Duration,

    /// Default revertive policy for newly created `FrrProtected` objects that do not
    /// specify their own (spec §9 Open Question 3).
    #[builder(default = "RevertivePolicy::WaitToRestore(Duration::from_secs(30))")]
    pub default_revertive_policy: RevertivePolicy,

    /// Maximum number of resolution objects the node store will hold at once.
    #[builder(default = "1_000_000")]
    pub max_store_capacity: u32,
}

impl Default for FibCoreConfig {
    fn default() -> Self {
        FibCoreConfigBuilder::default()
            .build()
            .expect("all fields have defaults")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_defaults() {
        let cfg = FibCoreConfig::default();
        assert_eq!(cfg.max_recursion_depth, 5);
        assert_eq!(cfg.max_walk_depth, 10);
        assert_eq!(cfg.resilient_table_multiplier, 64);
    }

    #[test]
    fn builder_allows_partial_overrides() {
        let cfg = FibCoreConfigBuilder::default()
            .max_recursion_depth(3)
            .build()
            .unwrap();
        assert_eq!(cfg.max_recursion_depth, 3);
        assert_eq!(cfg.max_walk_depth, 10);
    }
}
