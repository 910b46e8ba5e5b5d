// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Mock implementations of the three external collaborators (spec §6): a
//! [`MockHal`], a [`MockLpm`], and a [`MockEventSink`], used by this crate's own
//! integration tests under `tests/` and exported behind the `testing` feature for
//! downstream embedders to build their own harnesses against the same contract.

use crate::event::{EventSink, FibEvent};
use crate::hal::{Active, Capabilities, HardwareAbstraction, HwEcmpId, HwEedbId, HwFecId, L2Rewrite, LabelEntry};
use crate::lpm::LpmRouteTable;
use crate::store::object::{AddressFamily, RouteId};
use crate::Handle;
use rand::Rng;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::time::Duration;

/// One call the orchestration layer made against a [`MockHal`], recorded in
/// invocation order so a test can assert both the call *sequence* (S1) and the
/// call *count* (S2, S3's "exactly one ... call, zero per-route calls").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HalCall {
    AllocFec(HwFecId),
    FreeFec(HwFecId),
    AllocEedb(HwEedbId),
    FreeEedb(HwEedbId),
    AllocEcmp(HwEcmpId, u32),
    FreeEcmp(HwEcmpId),
    ProgramL2Rewrite(HwEedbId, L2Rewrite),
    ProgramLabelEedb(HwEedbId, LabelEntry, HwEedbId),
    ProgramFecSimple(HwFecId, HwEedbId, u32),
    ProgramFecEcmp(HwFecId, HwEcmpId),
    ProgramFecProtected(HwFecId, HwFecId, HwFecId),
    UpdateEcmpMembers(HwEcmpId, Vec<bool>, Vec<u32>),
    LinkBackup(HwFecId, HwFecId),
    SetActive(HwFecId, Active),
    Drain,
}

/// A HAL double over in-memory counters, with every call recorded for assertions
/// and optional, seedable random allocation failure for exercising the
/// `HwResourceExhausted`/`PartiallyApplied` paths (spec §7).
///
/// Capacity limits (`max_fec` etc in [`Capabilities`]) are enforced: allocation
/// past the configured maximum returns `None`, the same as a real ASIC's table
/// being full, exercising `HwResourceExhausted` without needing a chaos mode for
/// that case specifically.
pub struct MockHal {
    capabilities: Capabilities,
    next_fec: HwFecId,
    next_eedb: HwEedbId,
    next_ecmp: HwEcmpId,
    live_fecs: HashSet<HwFecId>,
    live_eedbs: HashSet<HwEedbId>,
    live_ecmps: HashSet<HwEcmpId>,
    calls: Vec<HalCall>,
    drain_always_succeeds: bool,
    chaos: Option<(rand::rngs::StdRng, f64)>,
}

impl MockHal {
    /// A HAL with effectively unbounded capacity and no injected failures, matching
    /// the tables' sizes used across S1-S6.
    #[must_use]
    pub fn new() -> Self {
        MockHal::with_capabilities(Capabilities {
            max_fec: 1_000_000,
            max_eedb: 1_000_000,
            max_ecmp: 1_000_000,
            max_members_per_ecmp: 64,
            max_label_stack_depth: 8,
            supports_backup_fec: true,
            supports_eedb_chaining: true,
        })
    }

    #[must_use]
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        MockHal {
            capabilities,
            next_fec: 1,
            next_eedb: 1,
            next_ecmp: 1,
            live_fecs: HashSet::new(),
            live_eedbs: HashSet::new(),
            live_ecmps: HashSet::new(),
            calls: Vec::new(),
            drain_always_succeeds: true,
            chaos: None,
        }
    }

    /// Randomly fail `alloc_*` calls with probability `probability`, seeded for
    /// reproducibility. Used to exercise `install_route`/`update_route`'s
    /// no-op-on-failure and `PartiallyApplied` handling under fuzzing.
    #[must_use]
    pub fn with_chaos(mut self, probability: f64, seed: u64) -> Self {
        use rand::SeedableRng;
        self.chaos = Some((rand::rngs::StdRng::seed_from_u64(seed), probability));
        self
    }

    /// Make the next [`HardwareAbstraction::drain`] call report a timeout, simulating
    /// the HAL not acknowledging drain within its deadline (spec §5, §7).
    pub fn fail_next_drain(&mut self) {
        self.drain_always_succeeds = false;
    }

    #[must_use]
    pub fn calls(&self) -> &[HalCall] {
        &self.calls
    }

    #[must_use]
    pub fn call_count(&self, matches: impl Fn(&HalCall) -> bool) -> usize {
        self.calls.iter().filter(|c| matches(c)).count()
    }

    fn roll_chaos_failure(&mut self) -> bool {
        match &mut self.chaos {
            Some((rng, p)) => rng.random_bool(*p),
            None => false,
        }
    }
}

impl Default for MockHal {
    fn default() -> Self {
        MockHal::new()
    }
}

impl HardwareAbstraction for MockHal {
    fn alloc_fec(&mut self) -> Option<HwFecId> {
        if self.roll_chaos_failure() || self.live_fecs.len() as u32 >= self.capabilities.max_fec {
            return None;
        }
        let id = self.next_fec;
        self.next_fec += 1;
        self.live_fecs.insert(id);
        self.calls.push(HalCall::AllocFec(id));
        Some(id)
    }

    fn free_fec(&mut self, fec: HwFecId) {
        self.live_fecs.remove(&fec);
        self.calls.push(HalCall::FreeFec(fec));
    }

    fn alloc_eedb(&mut self) -> Option<HwEedbId> {
        if self.roll_chaos_failure() || self.live_eedbs.len() as u32 >= self.capabilities.max_eedb {
            return None;
        }
        let id = self.next_eedb;
        self.next_eedb += 1;
        self.live_eedbs.insert(id);
        self.calls.push(HalCall::AllocEedb(id));
        Some(id)
    }

    fn free_eedb(&mut self, eedb: HwEedbId) {
        self.live_eedbs.remove(&eedb);
        self.calls.push(HalCall::FreeEedb(eedb));
    }

    fn alloc_ecmp(&mut self, max_members: u32) -> Option<HwEcmpId> {
        if self.roll_chaos_failure()
            || self.live_ecmps.len() as u32 >= self.capabilities.max_ecmp
            || max_members > self.capabilities.max_members_per_ecmp
        {
            return None;
        }
        let id = self.next_ecmp;
        self.next_ecmp += 1;
        self.live_ecmps.insert(id);
        self.calls.push(HalCall::AllocEcmp(id, max_members));
        Some(id)
    }

    fn free_ecmp(&mut self, ecmp: HwEcmpId) {
        self.live_ecmps.remove(&ecmp);
        self.calls.push(HalCall::FreeEcmp(ecmp));
    }

    fn program_l2_rewrite(&mut self, eedb: HwEedbId, rewrite: L2Rewrite) {
        self.calls.push(HalCall::ProgramL2Rewrite(eedb, rewrite));
    }

    fn program_label_eedb(&mut self, eedb: HwEedbId, entry: LabelEntry, next_eedb: HwEedbId) {
        self.calls.push(HalCall::ProgramLabelEedb(eedb, entry, next_eedb));
    }

    fn program_fec_simple(&mut self, fec: HwFecId, eedb: HwEedbId, port: u32) {
        self.calls.push(HalCall::ProgramFecSimple(fec, eedb, port));
    }

    fn program_fec_ecmp(&mut self, fec: HwFecId, ecmp_group: HwEcmpId) {
        self.calls.push(HalCall::ProgramFecEcmp(fec, ecmp_group));
    }

    fn program_fec_protected(&mut self, fec: HwFecId, primary_fec: HwFecId, backup_fec: HwFecId) {
        self.calls.push(HalCall::ProgramFecProtected(fec, primary_fec, backup_fec));
    }

    fn update_ecmp_members(&mut self, ecmp_group: HwEcmpId, live_bitmap: &[bool], resilient_table: &[u32]) {
        self.calls.push(HalCall::UpdateEcmpMembers(ecmp_group, live_bitmap.to_vec(), resilient_table.to_vec()));
    }

    fn link_backup(&mut self, primary_fec: HwFecId, backup_fec: HwFecId) {
        self.calls.push(HalCall::LinkBackup(primary_fec, backup_fec));
    }

    fn set_active(&mut self, protected_fec: HwFecId, active: Active) {
        self.calls.push(HalCall::SetActive(protected_fec, active));
    }

    fn drain(&mut self, _timeout: Duration) -> bool {
        self.calls.push(HalCall::Drain);
        if self.drain_always_succeeds {
            true
        } else {
            self.drain_always_succeeds = true;
            false
        }
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

/// An in-memory [`LpmRouteTable`] double: exact-match on address (no real trie),
/// sufficient for driving [`crate::recursive::resolve`] through a known answer.
#[derive(Default)]
pub struct MockLpm {
    routes: RefCell<HashMap<IpAddr, (u8, Handle, RouteId)>>,
    subscriptions: RefCell<HashSet<IpAddr>>,
}

impl MockLpm {
    #[must_use]
    pub fn new() -> Self {
        MockLpm::default()
    }

    /// Install (or replace) the LPM answer for `address`.
    pub fn set_route(&self, address: IpAddr, prefix_len: u8, target: Handle, route_id: RouteId) {
        self.routes.borrow_mut().insert(address, (prefix_len, target, route_id));
    }

    /// Remove the LPM answer for `address`, as if the covering route were withdrawn.
    pub fn withdraw_route(&self, address: IpAddr) {
        self.routes.borrow_mut().remove(&address);
    }

    /// Every address a `RecursiveNextHop` has subscribed to so far.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<IpAddr> {
        self.subscriptions.borrow().iter().copied().collect()
    }
}

impl LpmRouteTable for MockLpm {
    fn lookup(&self, _family: AddressFamily, address: IpAddr, _max_prefix_len: u8) -> Option<(u8, Handle, RouteId)> {
        self.routes.borrow().get(&address).copied()
    }

    fn subscribe(&self, _family: AddressFamily, address_prefix: IpAddr) {
        self.subscriptions.borrow_mut().insert(address_prefix);
    }
}

/// An [`EventSink`] double that just records every notification in order.
#[derive(Debug, Default)]
pub struct MockEventSink {
    pub events: Vec<FibEvent>,
}

impl MockEventSink {
    #[must_use]
    pub fn new() -> Self {
        MockEventSink::default()
    }

    #[must_use]
    pub fn count(&self, matches: impl Fn(&FibEvent) -> bool) -> usize {
        self.events.iter().filter(|e| matches(e)).count()
    }
}

impl EventSink for MockEventSink {
    fn notify(&mut self, event: FibEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_hal_enforces_capacity() {
        let mut hal = MockHal::with_capabilities(Capabilities {
            max_fec: 1,
            max_eedb: 1,
            max_ecmp: 1,
            max_members_per_ecmp: 4,
            max_label_stack_depth: 4,
            supports_backup_fec: true,
            supports_eedb_chaining: true,
        });
        assert!(hal.alloc_fec().is_some());
        assert!(hal.alloc_fec().is_none());
    }

    #[test]
    fn mock_hal_records_calls_in_order() {
        let mut hal = MockHal::new();
        let eedb = hal.alloc_eedb().unwrap();
        let fec = hal.alloc_fec().unwrap();
        hal.program_fec_simple(fec, eedb, 10);
        assert_eq!(
            hal.calls(),
            &[HalCall::AllocEedb(eedb), HalCall::AllocFec(fec), HalCall::ProgramFecSimple(fec, eedb, 10)]
        );
    }

    #[test]
    fn mock_lpm_round_trips_an_answer() {
        use crate::handle::Kind;
        use std::net::Ipv4Addr;
        let lpm = MockLpm::new();
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let target = Handle::new(Kind::DirectNextHop, 0, 1);
        let route_id = RouteId::new_static("mock_lpm_round_trips_an_answer");
        lpm.set_route(addr, 32, target, route_id);
        assert_eq!(lpm.lookup(AddressFamily::Ipv4, addr, 32), Some((32, target, route_id)));
        lpm.withdraw_route(addr);
        assert_eq!(lpm.lookup(AddressFamily::Ipv4, addr, 32), None);
    }
}
