// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The resolution object types: the tagged variant at the heart of the data model
//! (spec §3).

use crate::config::RevertivePolicy;
use crate::handle::Handle;
use id::Id;
use net::{Mac, Vlan};
use std::net::IpAddr;

/// Opaque identifier for an external route, as reported by the LPM route table
/// (spec §4.2). Distinct from [`Handle`]: a `RouteId` names an LPM-side route, a
/// `Handle` names a resolution object in this core's own store.
pub type RouteId = Id<RouteIdTag>;
#[doc(hidden)]
pub enum RouteIdTag {}

/// A hardware egress port identifier, opaque to the core beyond equality.
pub type PortId = u32;

/// A single MPLS label entry within a [`LabelOperation`] stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    /// 20-bit label value.
    pub label_value: u32,
    /// 3-bit traffic class.
    pub tc: u8,
    /// 8-bit time-to-live.
    pub ttl: u8,
}

impl Label {
    /// Maximum legal 20-bit label value.
    pub const MAX_VALUE: u32 = (1 << 20) - 1;
    /// Maximum legal 3-bit traffic class.
    pub const MAX_TC: u8 = (1 << 3) - 1;

    /// Build a label, masking `label_value` and `tc` down to their legal bit widths
    /// rather than failing — mirrors how the terminal hardware registers behave.
    #[must_use]
    pub fn new(label_value: u32, tc: u8, ttl: u8) -> Self {
        Label {
            label_value: label_value & Self::MAX_VALUE,
            tc: tc & Self::MAX_TC,
            ttl,
        }
    }
}

/// The operation a [`LabelOperation`] object performs on the label stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelOp {
    Push,
    Swap,
    Pop,
    PopAndForward,
    SwapAndPush,
}

/// IP address family, used by [`RecursiveNextHop`] and by the [`crate::lpm::LpmRouteTable`]
/// trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    #[must_use]
    pub fn of(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }
}

/// ECMP hash policy (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMode {
    /// Source + destination IP.
    L3,
    /// L3 plus ports and protocol.
    L3L4,
    /// IPv6 flow label.
    FlowLabel,
    /// MPLS label stack.
    MplsLabel,
}

/// FRR protection scope (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionKind {
    Link,
    Node,
    Srlg,
    Path,
}

/// Current active branch of an [`FrrProtected`] object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrrState {
    UsingPrimary,
    UsingBackup,
    BothFailed,
}

/// Terminal resolution object: an L2 rewrite plus egress port (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectNextHop {
    pub dst_mac: Mac,
    pub src_mac: Mac,
    pub vlan: Vlan,
    pub egress_port: PortId,
    pub reachable: bool,
}

/// A label push/swap/pop, chaining to another resolution object (spec §3, §4.6).
///
/// Multi-label pushes store labels in stack order: index 0 is the label closest to
/// the payload (becomes the new top-of-stack after this push); `next`'s own top
/// label, if any, ends up beneath all of these. Edits to a `LabelOperation` are
/// never in-place mutations (spec §4.6): producing a modified stack means inserting
/// a new object, redirecting referrers, and releasing the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelOperation {
    pub op: LabelOp,
    pub labels: Vec<Label>,
    pub next: Option<Handle>,
}

/// An IP address resolved indirectly through the external LPM route table
/// (spec §3, §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursiveNextHop {
    pub family: AddressFamily,
    pub address: IpAddr,
    pub resolved_to: Option<Handle>,
    pub recursion_depth: u8,
    pub resolving_route_id: Option<RouteId>,
}

/// An ordered set of member resolution objects sharing load by hash, with per-member
/// liveness and a resilient hashing table (spec §3, §4.5).
///
/// Member order is significant: members are identified by position, and per
/// spec §9 Open Question 2, positions are never compacted on removal — a removed
/// member leaves a hole (`members[pos]` tombstoned) rather than shifting later
/// members down. This keeps the resilient table's position references valid across
/// membership changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcmpGroup {
    pub members: Vec<Option<Handle>>,
    pub member_live: Vec<bool>,
    pub hash_mode: HashMode,
    pub resilient_table: Option<Vec<u32>>,
    pub max_members: usize,
}

/// A primary/backup pair with sub-50ms hardware-driven failover (spec §3, §4.9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrrProtected {
    pub primary: Handle,
    pub backup: Handle,
    pub protection: ProtectionKind,
    pub state: FrrState,
    pub detection_ms: u16,
    pub revertive: RevertivePolicy,
}

/// The tagged variant of all resolution object kinds (spec §3).
///
/// Dispatch over this type in the forward and dependent walks is a `match`, never a
/// virtual call (spec §9): the object kinds are closed and known at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionObject {
    DirectNextHop(DirectNextHop),
    LabelOperation(LabelOperation),
    RecursiveNextHop(RecursiveNextHop),
    EcmpGroup(EcmpGroup),
    FrrProtected(FrrProtected),
}

impl ResolutionObject {
    /// The handles this object forwards to, in traversal order. Used by the node
    /// store to install forward edges and by cycle detection.
    #[must_use]
    pub fn forward_edges(&self) -> Vec<Handle> {
        match self {
            ResolutionObject::DirectNextHop(_) => Vec::new(),
            ResolutionObject::LabelOperation(l) => l.next.into_iter().collect(),
            ResolutionObject::RecursiveNextHop(r) => r.resolved_to.into_iter().collect(),
            ResolutionObject::EcmpGroup(e) => e.members.iter().filter_map(|m| *m).collect(),
            ResolutionObject::FrrProtected(f) => vec![f.primary, f.backup],
        }
    }

    #[must_use]
    pub fn kind(&self) -> crate::handle::Kind {
        match self {
            ResolutionObject::DirectNextHop(_) => crate::handle::Kind::DirectNextHop,
            ResolutionObject::LabelOperation(_) => crate::handle::Kind::LabelOperation,
            ResolutionObject::RecursiveNextHop(_) => crate::handle::Kind::RecursiveNextHop,
            ResolutionObject::EcmpGroup(_) => crate::handle::Kind::EcmpGroup,
            ResolutionObject::FrrProtected(_) => crate::handle::Kind::FrrProtected,
        }
    }
}
