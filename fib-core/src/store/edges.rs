// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Reverse (dependent) edges, maintained symmetrically with the forward edges
//! installed by [`crate::store::NodeStore::insert`] (spec §3).

use crate::handle::{Handle, Kind};

/// A reverse pointer recorded on an object B for every forward edge A→B.
///
/// `requires_hw_update` is set when the referencing object (A) would need its own
/// hardware state reprogrammed if B changes — used by the dependent walk's
/// `Conditional` strategy (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependentEdge {
    pub dependent_kind: Kind,
    pub dependent_handle: Handle,
    pub requires_hw_update: bool,
}

impl DependentEdge {
    #[must_use]
    pub fn new(dependent_handle: Handle, requires_hw_update: bool) -> Self {
        DependentEdge {
            dependent_kind: dependent_handle.kind(),
            dependent_handle,
            requires_hw_update,
        }
    }
}
