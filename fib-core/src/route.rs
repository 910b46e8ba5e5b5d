// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Route identity and the routes this core tracks (spec §3 "Route", §6).

use crate::handle::Handle;
use net::Prefix;

/// Which routing protocol installed a route, carried for administrative preference
/// comparisons the embedder may apply before a route ever reaches this core. The
/// core itself does not arbitrate between protocols; it only stores the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolId {
    Static,
    Bgp,
    Ospf,
    IsIs,
    Connected,
    /// An opaque protocol identifier not otherwise enumerated here.
    Other(u16),
}

/// Route identity: address family + prefix + protocol + administrative preference
/// (spec §3, §6). Ordered so it can key a `BTreeMap` directly — [`Prefix`] has a
/// hand-written `Ord` but deliberately no `Hash`, so routes live in a `BTreeMap`
/// rather than a `HashMap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RouteKey {
    pub prefix: Prefix,
    pub protocol: ProtocolId,
    /// Lower is more preferred, matching common routing-protocol convention.
    pub admin_preference: u8,
}

impl RouteKey {
    #[must_use]
    pub fn new(prefix: Prefix, protocol: ProtocolId, admin_preference: u8) -> Self {
        RouteKey { prefix, protocol, admin_preference }
    }
}

/// A route as tracked by this core: a key, the resolution-object handle it points
/// to, and whether it currently has a resolved, programmed path (spec §3).
///
/// A `Route` never stores forwarding bytes directly; the hardware handle, when
/// present, is whatever [`crate::hal::HwBinding::fec`] the core recorded against
/// `root` the last time it programmed this route's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub root: Handle,
    pub active: bool,
}
