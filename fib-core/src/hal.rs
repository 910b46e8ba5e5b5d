// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The Hardware Abstraction Layer contract (spec §4.10, §6).
//!
//! `fib-core` calls this trait; it never assumes anything about a specific ASIC's
//! capability set beyond what [`Capabilities`] reports. Implementations live outside
//! this crate. See [`crate::testing::mock_hal`] for the reference implementation used
//! by this crate's own tests.

use net::{Mac, Vlan};

/// Opaque hardware FEC (Forward Equivalence Class) identifier, owned by the HAL.
pub type HwFecId = u32;
/// Opaque hardware EEDB (Egress Encapsulation Database) identifier, owned by the HAL.
pub type HwEedbId = u32;
/// Opaque hardware ECMP group identifier, owned by the HAL.
pub type HwEcmpId = u32;

/// Which branch of a protected FEC is currently forwarding traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Active {
    Primary,
    Backup,
}

/// The fields programmed into an L2-rewrite EEDB entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2Rewrite {
    pub dst_mac: Mac,
    pub src_mac: Mac,
    pub vlan: Vlan,
    pub port: u32,
}

/// The fields programmed into a label-push EEDB entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelEntry {
    pub label: u32,
    pub tc: u8,
    pub ttl: u8,
}

/// What the HAL implementation supports (spec §4.10). The core consults this to
/// decide, e.g., whether to collapse a label chain into one EEDB or chain several.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub max_fec: u32,
    pub max_eedb: u32,
    pub max_ecmp: u32,
    pub max_members_per_ecmp: u32,
    pub max_label_stack_depth: u8,
    pub supports_backup_fec: bool,
    pub supports_eedb_chaining: bool,
}

/// The hardware a [`crate::FibCore`] programs.
///
/// Bottom-up programming is the core's obligation, not the HAL's: callers of this
/// trait from within `fib-core` always allocate and program the L2-rewrite EEDB
/// first, then the label-EEDB chain deepest-label-first, then the FEC (spec §4.10).
/// The HAL itself is only required to perform each individual operation atomically
/// and to support the make-before-break sequence: allocate + program new fully,
/// then (the core) swaps the route's hardware handle, then calls [`HardwareAbstraction::drain`],
/// then frees the old resources.
pub trait HardwareAbstraction {
    fn alloc_fec(&mut self) -> Option<HwFecId>;
    fn free_fec(&mut self, fec: HwFecId);

    fn alloc_eedb(&mut self) -> Option<HwEedbId>;
    fn free_eedb(&mut self, eedb: HwEedbId);

    fn alloc_ecmp(&mut self, max_members: u32) -> Option<HwEcmpId>;
    fn free_ecmp(&mut self, ecmp: HwEcmpId);

    fn program_l2_rewrite(&mut self, eedb: HwEedbId, rewrite: L2Rewrite);
    fn program_label_eedb(&mut self, eedb: HwEedbId, entry: LabelEntry, next_eedb: HwEedbId);
    fn program_fec_simple(&mut self, fec: HwFecId, eedb: HwEedbId, port: u32);
    fn program_fec_ecmp(&mut self, fec: HwFecId, ecmp_group: HwEcmpId);
    fn program_fec_protected(&mut self, fec: HwFecId, primary_fec: HwFecId, backup_fec: HwFecId);

    fn update_ecmp_members(&mut self, ecmp_group: HwEcmpId, live_bitmap: &[bool], resilient_table: &[u32]);

    fn link_backup(&mut self, primary_fec: HwFecId, backup_fec: HwFecId);
    fn set_active(&mut self, protected_fec: HwFecId, active: Active);

    /// Block until all hardware writes issued so far have drained, i.e. are safe to
    /// assume visible to the forwarding plane. Returns `false` on timeout.
    fn drain(&mut self, timeout: std::time::Duration) -> bool;

    fn capabilities(&self) -> Capabilities;
}

/// The hardware resource(s) backing a single resolution object, recorded by the
/// orchestration layer once the HAL has successfully programmed it.
///
/// A handle can carry more than one binding at once: a `LabelOperation`/`DirectNextHop`
/// chain owns an EEDB entry (plus the egress port it ultimately resolves to) and,
/// if it is itself a route's root (or an ECMP/FRR member), a wrapping FEC; an
/// `EcmpGroup` owns both its hardware group id and the FEC that makes it
/// route-visible. Freeing a destroyed handle's hardware means freeing whichever of
/// these fields is set, FEC first (spec §4.10 bottom-up programming, reversed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HwBinding {
    /// This handle's own EEDB entry (L2 rewrite, or a label push/swap).
    pub eedb: Option<HwEedbId>,
    /// The egress port the EEDB chain ultimately resolves to, cached alongside
    /// `eedb` so callers don't have to re-walk the chain to find it.
    pub port: Option<u32>,
    /// An `EcmpGroup`'s hardware group id.
    pub ecmp: Option<HwEcmpId>,
    /// The FEC making this handle directly route/member/branch-visible: used by
    /// `DirectNextHop`/`LabelOperation` chains that are a route's root, by
    /// `EcmpGroup` and `FrrProtected` objects (always FEC-wrapped), and by
    /// `RecursiveNextHop`s (which simply mirror their resolution target's FEC).
    pub fec: Option<HwFecId>,
}
