// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The ECMP engine: membership, resilient hashing, and minimal-disruption
//! redistribution on member failure (spec §4.5).

use crate::config::FibCoreConfig;
use crate::error::FibError;
use crate::handle::Handle;
use crate::hal::HwBinding;
use crate::store::object::{EcmpGroup, HashMode, ResolutionObject};
use crate::store::{EcmpCapability, NodeStore};
use ahash::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::net::IpAddr;
use tracectl::trace_target;
use tracing::debug;

trace_target!("fib-core::ecmp", tracing::Level::DEBUG, &["fib-core", "ecmp"]);

/// Forwarding state of a group derived from its live member count (spec §4.5 state
/// machine: `Healthy(n) <-> Degraded(k<n) -> Empty`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Healthy(usize),
    Degraded(usize),
    Empty,
}

#[must_use]
pub fn group_state(group: &EcmpGroup) -> GroupState {
    let live = group.member_live.iter().filter(|&&l| l).count();
    let total = group.members.iter().filter(|m| m.is_some()).count();
    if live == 0 {
        GroupState::Empty
    } else if live == total {
        GroupState::Healthy(live)
    } else {
        GroupState::Degraded(live)
    }
}

fn resilient_table_size(max_members: usize, multiplier: u32) -> usize {
    let want = (max_members as u64) * u64::from(multiplier);
    want.next_power_of_two().max(1) as usize
}

/// Build a resilient table from scratch, cycling round-robin through currently live
/// members (spec §4.5). Used at group creation and whenever membership itself
/// changes (add/remove); member-down uses [`mark_member_down`]'s targeted
/// redistribution instead, to satisfy I5.
#[must_use]
pub fn rebuild_resilient_table(group: &EcmpGroup, multiplier: u32) -> Vec<u32> {
    let live_positions: Vec<u32> =
        group.member_live.iter().enumerate().filter(|(_, &l)| l).map(|(i, _)| i as u32).collect();
    let size = resilient_table_size(group.max_members, multiplier);
    if live_positions.is_empty() {
        return vec![0; size];
    }
    (0..size).map(|i| live_positions[i % live_positions.len()]).collect()
}

fn as_group(object: &ResolutionObject) -> Result<&EcmpGroup, FibError> {
    match object {
        ResolutionObject::EcmpGroup(g) => Ok(g),
        _ => Err(FibError::InvalidArgument("handle does not refer to an EcmpGroup")),
    }
}

/// Append a new member at the first tombstoned (or new) position (spec §4.5).
///
/// Changes the group's forward-edge set, so this goes through
/// [`NodeStore::replace`] rather than the capability-gated in-place accessor — the
/// member's refcount must be retained.
///
/// # Errors
///
/// `EcmpFull` if the group is already at `max_members` with no tombstoned slot.
pub fn add_member(
    store: &mut NodeStore,
    config: &FibCoreConfig,
    group_handle: Handle,
    member: Handle,
) -> Result<usize, FibError> {
    let mut g = as_group(store.get(group_handle)?)?.clone();
    let pos = match g.members.iter().position(Option::is_none) {
        Some(p) => p,
        None if g.members.len() < g.max_members => {
            g.members.push(None);
            g.member_live.push(false);
            g.members.len() - 1
        }
        None => return Err(FibError::EcmpFull),
    };
    g.members[pos] = Some(member);
    while g.member_live.len() <= pos {
        g.member_live.push(false);
    }
    g.member_live[pos] = true;
    g.resilient_table = Some(rebuild_resilient_table(&g, config.resilient_table_multiplier));
    store.replace(group_handle, ResolutionObject::EcmpGroup(g))?;
    debug!(target: "fib-core::ecmp", group = %group_handle, pos, "member added");
    Ok(pos)
}

/// Tombstone the member at `pos` without compacting positions (spec §9 Open
/// Question 2: compaction is forbidden so the resilient table's position references
/// stay valid).
///
/// A member removed this way may have been referenced only by this group; if so,
/// dropping the group's edge to it tears it down. Returns any such destroyed handle
/// together with its last-known hardware binding, so the caller can free the
/// corresponding HAL resources (mirrors [`crate::store::NodeStore::release`]).
///
/// # Errors
///
/// `InvalidArgument` if `pos` is out of range or already empty.
pub fn remove_member(
    store: &mut NodeStore,
    config: &FibCoreConfig,
    group_handle: Handle,
    pos: usize,
) -> Result<Vec<(Handle, Option<HwBinding>)>, FibError> {
    let mut g = as_group(store.get(group_handle)?)?.clone();
    if g.members.get(pos).copied().flatten().is_none() {
        return Err(FibError::InvalidArgument("ecmp member position is already empty"));
    }
    g.members[pos] = None;
    if let Some(live) = g.member_live.get_mut(pos) {
        *live = false;
    }
    g.resilient_table = Some(rebuild_resilient_table(&g, config.resilient_table_multiplier));
    let destroyed = store.replace(group_handle, ResolutionObject::EcmpGroup(g))?;
    debug!(target: "fib-core::ecmp", group = %group_handle, pos, "member removed");
    Ok(destroyed)
}

/// Flip `pos` to down and redistribute only the resilient-table entries that
/// pointed to it, cycling round-robin through the remaining live members (spec
/// §4.5, invariant I5). A no-op if the member is already down.
///
/// # Errors
///
/// `InvalidArgument` if `pos` has no member.
pub fn mark_member_down(
    store: &mut NodeStore,
    group_handle: Handle,
    pos: usize,
    cap: &EcmpCapability,
) -> Result<(), FibError> {
    let g = store.get_ecmp_mut(group_handle, cap)?;
    if g.members.get(pos).copied().flatten().is_none() {
        return Err(FibError::InvalidArgument("ecmp member position has no member"));
    }
    if !g.member_live.get(pos).copied().unwrap_or(false) {
        return Ok(());
    }
    g.member_live[pos] = false;
    redistribute_on_down(g, pos as u32);
    debug!(target: "fib-core::ecmp", group = %group_handle, pos, "member marked down");
    Ok(())
}

fn redistribute_on_down(group: &mut EcmpGroup, failed_pos: u32) {
    let live_positions: Vec<u32> =
        group.member_live.iter().enumerate().filter(|(_, &l)| l).map(|(i, _)| i as u32).collect();
    let Some(table) = group.resilient_table.as_mut() else { return };
    if live_positions.is_empty() {
        for slot in table.iter_mut() {
            *slot = 0;
        }
        return;
    }
    let mut next = 0usize;
    for slot in table.iter_mut() {
        if *slot == failed_pos {
            *slot = live_positions[next % live_positions.len()];
            next += 1;
        }
    }
}

/// Flip `pos` back to live. Recovery rebuilds the whole resilient table (spec §4.5
/// only prescribes minimal-disruption behavior for the down case); a no-op if the
/// member is already live.
///
/// # Errors
///
/// `InvalidArgument` if `pos` has no member.
pub fn mark_member_up(
    store: &mut NodeStore,
    config: &FibCoreConfig,
    group_handle: Handle,
    pos: usize,
    cap: &EcmpCapability,
) -> Result<(), FibError> {
    let g = store.get_ecmp_mut(group_handle, cap)?;
    if g.members.get(pos).copied().flatten().is_none() {
        return Err(FibError::InvalidArgument("ecmp member position has no member"));
    }
    if g.member_live.get(pos).copied().unwrap_or(false) {
        return Ok(());
    }
    g.member_live[pos] = true;
    g.resilient_table = Some(rebuild_resilient_table(g, config.resilient_table_multiplier));
    debug!(target: "fib-core::ecmp", group = %group_handle, pos, "member marked up");
    Ok(())
}

/// The packet fields an ECMP hash policy may consult (spec §4.5). Not used for
/// software packet forwarding (explicit non-goal) — this exists so the
/// deterministic-selection property (part of I4's spirit) and the resilient table's
/// redistribution behavior can be exercised directly in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub flow_label: u32,
    pub top_label: u32,
}

/// Deterministic member selection given (policy, packet fields, resilient-table
/// snapshot) (spec §4.5).
#[must_use]
pub fn select_member(hash_mode: HashMode, flow: &FlowKey, resilient_table: &[u32]) -> Option<u32> {
    if resilient_table.is_empty() {
        return None;
    }
    let hasher = RandomState::with_seeds(0, 0, 0, 0);
    let mut h = hasher.build_hasher();
    match hash_mode {
        HashMode::L3 => {
            flow.src.hash(&mut h);
            flow.dst.hash(&mut h);
        }
        HashMode::L3L4 => {
            flow.src.hash(&mut h);
            flow.dst.hash(&mut h);
            flow.src_port.hash(&mut h);
            flow.dst_port.hash(&mut h);
            flow.protocol.hash(&mut h);
        }
        HashMode::FlowLabel => flow.flow_label.hash(&mut h),
        HashMode::MplsLabel => flow.top_label.hash(&mut h),
    }
    let idx = (h.finish() as usize) % resilient_table.len();
    Some(resilient_table[idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::object::{DirectNextHop, HashMode};
    use net::{Mac, Vlan};

    fn dnh(port: u32) -> ResolutionObject {
        ResolutionObject::DirectNextHop(DirectNextHop {
            dst_mac: Mac([0, 0, 0, 0, 0, port as u8]),
            src_mac: Mac([0, 0, 0, 0, 0, 1]),
            vlan: Vlan::Untagged,
            egress_port: port,
            reachable: true,
        })
    }

    fn group_of(members: &[Handle]) -> ResolutionObject {
        ResolutionObject::EcmpGroup(EcmpGroup {
            members: members.iter().map(|&h| Some(h)).collect(),
            member_live: vec![true; members.len()],
            hash_mode: HashMode::L3,
            resilient_table: None,
            max_members: members.len(),
        })
    }

    #[test]
    fn minimal_disruption_on_member_down() {
        let mut store = NodeStore::new(1024);
        let members: Vec<Handle> = (0..4).map(|i| store.insert(dnh(i)).unwrap()).collect();
        let mut g = group_of(&members);
        if let ResolutionObject::EcmpGroup(ref mut inner) = g {
            inner.resilient_table = Some(rebuild_resilient_table(inner, 64));
        }
        let group_handle = store.insert(g).unwrap();

        let before = as_group(store.get(group_handle).unwrap()).unwrap().resilient_table.clone().unwrap();
        let pointing_to_0 = before.iter().filter(|&&p| p == 0).count();

        let cap = EcmpCapability::new();
        mark_member_down(&mut store, group_handle, 0, &cap).unwrap();

        let after = as_group(store.get(group_handle).unwrap()).unwrap().resilient_table.clone().unwrap();
        let changed = before.iter().zip(after.iter()).filter(|(a, b)| a != b).count();
        assert_eq!(changed, pointing_to_0);
        assert!(after.iter().all(|&p| p != 0));
    }

    #[test]
    fn remove_member_does_not_compact_positions() {
        let mut store = NodeStore::new(1024);
        let members: Vec<Handle> = (0..3).map(|i| store.insert(dnh(i)).unwrap()).collect();
        let group_handle = store.insert(group_of(&members)).unwrap();
        let config = FibCoreConfig::default();

        remove_member(&mut store, &config, group_handle, 1).unwrap();
        let g = as_group(store.get(group_handle).unwrap()).unwrap();
        assert!(g.members[1].is_none());
        assert_eq!(g.members[2], Some(members[2]));
    }

    #[test]
    fn remove_member_destroys_sole_referent_and_reports_its_hw_binding() {
        let mut store = NodeStore::new(1024);
        let members: Vec<Handle> = (0..3).map(|i| store.insert(dnh(i)).unwrap()).collect();
        let group_handle = store.insert(group_of(&members)).unwrap();
        let config = FibCoreConfig::default();

        store
            .set_hw_binding(members[1], Some(crate::hal::HwBinding { fec: Some(42), ..Default::default() }))
            .unwrap();
        assert_eq!(store.refcount(members[1]).unwrap(), 1);

        let destroyed = remove_member(&mut store, &config, group_handle, 1).unwrap();
        assert_eq!(destroyed.len(), 1);
        assert_eq!(destroyed[0].0, members[1]);
        assert_eq!(destroyed[0].1, Some(crate::hal::HwBinding { fec: Some(42), ..Default::default() }));
        assert!(matches!(store.get(members[1]), Err(FibError::UnknownHandle(_))));

        // The still-referenced member is untouched and carries no spurious entry.
        assert!(store.get(members[2]).is_ok());
    }

    #[test]
    fn group_state_reflects_liveness() {
        let mut store = NodeStore::new(1024);
        let members: Vec<Handle> = (0..2).map(|i| store.insert(dnh(i)).unwrap()).collect();
        let group_handle = store.insert(group_of(&members)).unwrap();
        let cap = EcmpCapability::new();

        assert_eq!(
            group_state(as_group(store.get(group_handle).unwrap()).unwrap()),
            GroupState::Healthy(2)
        );
        mark_member_down(&mut store, group_handle, 0, &cap).unwrap();
        assert_eq!(
            group_state(as_group(store.get(group_handle).unwrap()).unwrap()),
            GroupState::Degraded(1)
        );
        mark_member_down(&mut store, group_handle, 1, &cap).unwrap();
        assert_eq!(group_state(as_group(store.get(group_handle).unwrap()).unwrap()), GroupState::Empty);
    }
}
