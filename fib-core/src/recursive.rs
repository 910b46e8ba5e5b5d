// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Recursive next-hop resolution against the external LPM route table (spec §4.7).

use crate::config::FibCoreConfig;
use crate::error::FibError;
use crate::hal::HwBinding;
use crate::handle::Handle;
use crate::lpm::LpmRouteTable;
use crate::store::object::{AddressFamily, RecursiveNextHop, ResolutionObject, RouteId};
use crate::store::NodeStore;
use crate::walk::dependent::{dependent_walk, ChangeKind, Strategy};
use std::collections::{HashMap, HashSet};
use tracectl::trace_target;
use tracing::debug;

trace_target!("fib-core::recursive", tracing::Level::DEBUG, &["fib-core", "recursive"]);

/// Outcome of resolving (or re-resolving) a `RecursiveNextHop` (spec §4.7, I8).
///
/// `changed` is false when the newly discovered answer is identical to what the
/// object already held — per I8, idempotent re-resolution must not trigger a
/// dependent walk or event, and callers use this flag to decide whether to do either.
///
/// `stale` carries every hardware binding invalidated by a changed re-resolution:
/// the object's own cached FEC (which mirrored the old target) together with every
/// ancestor whose own programming chained through it. Empty whenever `changed` is
/// false. The caller is responsible for freeing these via the HAL before the next
/// programming pass recreates them against the new target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved { handle: Handle, changed: bool, stale: Vec<(Handle, Option<HwBinding>)> },
    Unresolved { changed: bool, stale: Vec<(Handle, Option<HwBinding>)> },
}

/// Resolve (or re-resolve) the `RecursiveNextHop` at `handle` against `lpm`.
///
/// Subscribes to future changes covering the resolved address so the caller's
/// `EventSink::on_route_change` receives updates without polling. If the matched
/// route's own target is itself an unresolved `RecursiveNextHop`, that nested
/// object is resolved first, one recursion level deeper.
///
/// # Errors
///
/// `InvalidArgument` if `handle` does not refer to a `RecursiveNextHop`.
/// `RecursionExceeded` if resolving nested recursive next-hops exceeds
/// `config.max_recursion_depth`. `UnknownHandle`/`CycleDetected` if the store
/// rejects the updated object.
pub fn resolve<L: LpmRouteTable>(
    store: &mut NodeStore,
    lpm: &L,
    handle: Handle,
    config: &FibCoreConfig,
) -> Result<Resolution, FibError> {
    resolve_depth(store, lpm, handle, config, 0)
}

fn max_prefix_len(family: AddressFamily) -> u8 {
    match family {
        AddressFamily::Ipv4 => 32,
        AddressFamily::Ipv6 => 128,
    }
}

fn resolve_depth<L: LpmRouteTable>(
    store: &mut NodeStore,
    lpm: &L,
    handle: Handle,
    config: &FibCoreConfig,
    depth: u8,
) -> Result<Resolution, FibError> {
    if depth >= config.max_recursion_depth {
        return Err(FibError::RecursionExceeded(config.max_recursion_depth));
    }

    let rnh = match store.get(handle)? {
        ResolutionObject::RecursiveNextHop(r) => r.clone(),
        _ => return Err(FibError::InvalidArgument("handle does not refer to a RecursiveNextHop")),
    };

    lpm.subscribe(rnh.family, rnh.address);
    let found = lpm.lookup(rnh.family, rnh.address, max_prefix_len(rnh.family));
    let (new_target, new_route_id) = match found {
        Some((_prefix_len, target, route_id)) => (Some(target), Some(route_id)),
        None => (None, None),
    };

    if new_target == rnh.resolved_to && new_route_id == rnh.resolving_route_id {
        debug!(target: "fib-core::recursive", %handle, resolved = ?new_target, "idempotent re-resolution, no change");
        return Ok(match new_target {
            Some(h) => Resolution::Resolved { handle: h, changed: false, stale: Vec::new() },
            None => Resolution::Unresolved { changed: false, stale: Vec::new() },
        });
    }

    let mut inner_stale = Vec::new();
    if let Some(target) = new_target {
        let needs_inner_resolve = matches!(
            store.get(target)?,
            ResolutionObject::RecursiveNextHop(inner) if inner.resolved_to.is_none()
        );
        if needs_inner_resolve {
            inner_stale = match resolve_depth(store, lpm, target, config, depth + 1)? {
                Resolution::Resolved { stale, .. } | Resolution::Unresolved { stale, .. } => stale,
            };
        }
    }

    let updated = RecursiveNextHop {
        resolved_to: new_target,
        resolving_route_id: new_route_id,
        recursion_depth: depth,
        ..rnh
    };
    // The old `resolved_to` (if any) is dropped as a forward edge here, which may
    // cascade-destroy it; the chain that mirrored it — this handle's own cached FEC
    // and every ancestor's, transitively — is now stale either way and must be
    // cleared so the next programming pass rebuilds it against the new target
    // instead of returning what `program_fec_for`/`program_link` have cached.
    let mut stale = store.replace(handle, ResolutionObject::RecursiveNextHop(updated))?;
    stale.extend(inner_stale);
    stale.extend(invalidate_stale_hw(store, config, handle)?);
    debug!(target: "fib-core::recursive", %handle, resolved = ?new_target, "re-resolved");

    Ok(match new_target {
        Some(h) => Resolution::Resolved { handle: h, changed: true, stale },
        None => Resolution::Unresolved { changed: true, stale },
    })
}

/// Clear the cached hardware binding for `handle` and every transitive dependent
/// (the ancestors whose own programming chained through it), returning whichever
/// of those actually held a binding so the caller can free it.
fn invalidate_stale_hw(store: &mut NodeStore, config: &FibCoreConfig, handle: Handle) -> Result<Vec<(Handle, Option<HwBinding>)>, FibError> {
    let max_levels = u32::from(config.max_walk_depth);
    let mut to_clear = vec![handle];
    to_clear.extend(dependent_walk(store, handle, ChangeKind::Modified, Strategy::Full, max_levels)?.into_iter().map(|n| n.handle));

    let mut stale = Vec::new();
    for h in to_clear {
        if let Some(hw) = store.hw_binding(h)? {
            stale.push((h, Some(hw)));
            store.set_hw_binding(h, None)?;
        }
    }
    Ok(stale)
}

/// Secondary index from an external route's identity to every `RecursiveNextHop`
/// handle whose resolution currently depends on it (spec §4.2, §4.7).
///
/// Populated by the orchestration layer every time [`resolve`] records a
/// `resolving_route_id`, and consulted when `EventSink::on_route_change` reports a
/// change on that `RouteId` so only the affected recursive next-hops are re-resolved,
/// rather than the whole store.
#[derive(Debug, Default)]
pub struct RecursiveIndex {
    by_route: HashMap<RouteId, HashSet<Handle>>,
}

impl RecursiveIndex {
    #[must_use]
    pub fn new() -> Self {
        RecursiveIndex::default()
    }

    pub fn record(&mut self, route_id: RouteId, handle: Handle) {
        self.by_route.entry(route_id).or_default().insert(handle);
    }

    pub fn forget(&mut self, route_id: RouteId, handle: Handle) {
        if let Some(set) = self.by_route.get_mut(&route_id) {
            set.remove(&handle);
            if set.is_empty() {
                self.by_route.remove(&route_id);
            }
        }
    }

    /// Every `RecursiveNextHop` handle currently keyed to `route_id`, in unspecified
    /// order.
    pub fn dependents_of(&self, route_id: RouteId) -> impl Iterator<Item = Handle> + '_ {
        self.by_route.get(&route_id).into_iter().flatten().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::object::{DirectNextHop, RouteId};
    use net::{Mac, Vlan};
    use std::cell::RefCell;
    use std::net::{IpAddr, Ipv4Addr};

    struct StubLpm {
        answer: RefCell<Option<(u8, Handle, RouteId)>>,
    }

    impl LpmRouteTable for StubLpm {
        fn lookup(&self, _family: AddressFamily, _address: IpAddr, _max_prefix_len: u8) -> Option<(u8, Handle, RouteId)> {
            *self.answer.borrow()
        }
        fn subscribe(&self, _family: AddressFamily, _address_prefix: IpAddr) {}
    }

    fn dnh(port: u32) -> ResolutionObject {
        ResolutionObject::DirectNextHop(DirectNextHop {
            dst_mac: Mac([0, 0, 0, 0, 0, port as u8]),
            src_mac: Mac([0, 0, 0, 0, 0, 1]),
            vlan: Vlan::Untagged,
            egress_port: port,
            reachable: true,
        })
    }

    fn rnh() -> ResolutionObject {
        ResolutionObject::RecursiveNextHop(RecursiveNextHop {
            family: AddressFamily::Ipv4,
            address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            resolved_to: None,
            recursion_depth: 0,
            resolving_route_id: None,
        })
    }

    #[test]
    fn resolves_against_lpm_answer() {
        let mut store = NodeStore::new(1024);
        let target = store.insert(dnh(1)).unwrap();
        let h = store.insert(rnh()).unwrap();
        let route_id = RouteId::new_static("resolves_against_lpm_answer");
        let lpm = StubLpm { answer: RefCell::new(Some((24, target, route_id))) };
        let config = FibCoreConfig::default();

        let result = resolve(&mut store, &lpm, h, &config).unwrap();
        assert_eq!(result, Resolution::Resolved { handle: target, changed: true, stale: Vec::new() });
        match store.get(h).unwrap() {
            ResolutionObject::RecursiveNextHop(r) => assert_eq!(r.resolved_to, Some(target)),
            _ => panic!("expected RecursiveNextHop"),
        }
    }

    #[test]
    fn idempotent_reresolution_reports_unchanged() {
        let mut store = NodeStore::new(1024);
        let target = store.insert(dnh(1)).unwrap();
        let h = store.insert(rnh()).unwrap();
        let route_id = RouteId::new_static("idempotent_reresolution_reports_unchanged");
        let lpm = StubLpm { answer: RefCell::new(Some((24, target, route_id))) };
        let config = FibCoreConfig::default();

        resolve(&mut store, &lpm, h, &config).unwrap();
        let second = resolve(&mut store, &lpm, h, &config).unwrap();
        assert_eq!(second, Resolution::Resolved { handle: target, changed: false, stale: Vec::new() });
    }

    #[test]
    fn no_covering_route_is_unresolved() {
        let mut store = NodeStore::new(1024);
        let h = store.insert(rnh()).unwrap();
        let lpm = StubLpm { answer: RefCell::new(None) };
        let config = FibCoreConfig::default();

        let result = resolve(&mut store, &lpm, h, &config).unwrap();
        assert_eq!(result, Resolution::Unresolved { changed: true, stale: Vec::new() });
    }

    #[test]
    fn changed_reresolution_invalidates_stale_hw_up_to_the_referring_chain() {
        let mut store = NodeStore::new(1024);
        let old_target = store.insert(dnh(1)).unwrap();
        let old_route_id = RouteId::new_static("changed_reresolution_invalidates_stale_hw_up_to_the_referring_chain/old");
        let h = store
            .insert(ResolutionObject::RecursiveNextHop(RecursiveNextHop {
                family: AddressFamily::Ipv4,
                address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                resolved_to: Some(old_target),
                recursion_depth: 0,
                resolving_route_id: Some(old_route_id),
            }))
            .unwrap();
        let wrapper = store
            .insert(ResolutionObject::LabelOperation(crate::store::object::LabelOperation {
                op: crate::store::object::LabelOp::Push,
                labels: vec![crate::store::object::Label::new(100, 0, 255)],
                next: Some(h),
            }))
            .unwrap();
        store.retain(wrapper).unwrap(); // simulate a route rooted at `wrapper`

        // Simulate prior programming: the RNH mirrors its (old) target's FEC, and the
        // wrapping label operation has its own EEDB chained through it.
        store.set_hw_binding(h, Some(crate::hal::HwBinding { fec: Some(7), ..Default::default() })).unwrap();
        store
            .set_hw_binding(wrapper, Some(crate::hal::HwBinding { eedb: Some(9), port: Some(1), ..Default::default() }))
            .unwrap();

        let new_target = store.insert(dnh(2)).unwrap();
        let route_id = RouteId::new_static("changed_reresolution_invalidates_stale_hw_up_to_the_referring_chain/new");
        let lpm = StubLpm { answer: RefCell::new(Some((24, new_target, route_id))) };
        let config = FibCoreConfig::default();

        let result = resolve(&mut store, &lpm, h, &config).unwrap();
        match result {
            Resolution::Resolved { handle, changed, stale } => {
                assert_eq!(handle, new_target);
                assert!(changed);
                let stale_handles: Vec<Handle> = stale.iter().map(|(handle, _)| *handle).collect();
                assert!(stale_handles.contains(&h));
                assert!(stale_handles.contains(&wrapper));
            }
            Resolution::Unresolved { .. } => panic!("expected a resolved answer"),
        }
        assert!(store.hw_binding(h).unwrap().is_none());
        assert!(store.hw_binding(wrapper).unwrap().is_none());
    }

    #[test]
    fn recursive_index_tracks_and_forgets() {
        let mut index = RecursiveIndex::new();
        let route_id = RouteId::new_static("recursive_index_tracks_and_forgets");
        let h = Handle::new(crate::handle::Kind::RecursiveNextHop, 0, 3);
        index.record(route_id, h);
        assert_eq!(index.dependents_of(route_id).collect::<Vec<_>>(), vec![h]);
        index.forget(route_id, h);
        assert_eq!(index.dependents_of(route_id).count(), 0);
    }
}
