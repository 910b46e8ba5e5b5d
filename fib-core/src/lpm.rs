// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The external LPM route-table interface (spec §4.2, §6).
//!
//! This core never implements longest-prefix-match itself; it consults whatever the
//! embedder plugs in here, the same way `routing`'s FIB code consults an external
//! RIB rather than owning prefix storage.

use crate::handle::Handle;
use crate::store::object::{AddressFamily, RouteId};
use std::net::IpAddr;

/// What changed about a route the core had previously asked about, reported through
/// [`crate::event::EventSink`]'s `on_route_change` callback (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Added,
    Modified,
    Withdrawn,
}

/// Read-interface onto the external routing table, consulted by `RecursiveNextHop`
/// resolution (spec §4.7).
///
/// Implementations own their own storage and locking discipline; the core never
/// calls this trait concurrently with itself (spec §5), but makes no assumption
/// about how the implementation is shared with the protocols that populate it.
pub trait LpmRouteTable {
    /// Longest-prefix match for `address` in `family`, no longer than `max_prefix_len`.
    /// Returns the matched prefix length, the resolution handle the matching route's
    /// own chain resolves to, and the route's external identity.
    fn lookup(&self, family: AddressFamily, address: IpAddr, max_prefix_len: u8) -> Option<(u8, Handle, RouteId)>;

    /// Register interest in changes covering `address_prefix`. The core calls this
    /// once per `RecursiveNextHop` it resolves so that subsequent LPM changes reach
    /// it via `on_route_change` (spec §4.2) instead of requiring active polling.
    fn subscribe(&self, family: AddressFamily, address_prefix: IpAddr);
}
