// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The orchestration API: the core's public surface, sequencing resolution, the two
//! walks, and the HAL (spec §4.11).

use crate::config::FibCoreConfig;
use crate::ecmp;
use crate::error::FibError;
use crate::event::{EventSink, FibEvent};
use crate::frr::{self, Branch, FrrEvent};
use crate::hal::{Active, HardwareAbstraction, HwBinding, HwEedbId, HwFecId, L2Rewrite, LabelEntry};
use crate::handle::{Handle, Kind};
use crate::lpm::{Change, LpmRouteTable};
use crate::recursive::{self, RecursiveIndex};
use crate::route::{Route, RouteKey};
use crate::store::object::{LabelOp, LabelOperation, PortId, ResolutionObject, RouteId};
use crate::store::{EcmpCapability, FrrCapability, InterfaceCapability, NodeStore};
use crate::walk::dependent::{dependent_walk, ChangeKind, Strategy};
use crate::walk::forward::forward_walk;
use std::collections::BTreeMap;
use tracectl::trace_target;
use tracing::{info, warn};

trace_target!("fib-core::orchestrate", tracing::Level::DEBUG, &["fib-core", "orchestrate"]);

/// Which branch of which link-protected object a link-state event concerns (spec
/// §4.11's `on_link_event(link_id, up|down)`).
///
/// The spec leaves the mapping from an opaque `link_id` to the handle it protects as
/// an embedder responsibility; this crate makes that mapping a caller-supplied
/// argument rather than owning a `link_id -> Handle` table of its own (see
/// `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    /// `position` in `group`'s member list went up or down.
    EcmpMember { group: Handle, position: usize },
    FrrPrimary(Handle),
    FrrBackup(Handle),
}

/// The FIB core: owns the node store, the routes it tracks, and the external
/// collaborators it calls into (spec §4.11, §5).
///
/// Generic (monomorphized) rather than trait-object-based over its three
/// collaborators, per spec §9's "let the compiler enforce the contract" — there is
/// exactly one `HardwareAbstraction`/`LpmRouteTable`/`EventSink` per running core, so
/// there is nothing to gain from dynamic dispatch.
pub struct FibCore<H: HardwareAbstraction, L: LpmRouteTable, S: EventSink> {
    store: NodeStore,
    config: FibCoreConfig,
    hal: H,
    lpm: L,
    sink: S,
    routes: BTreeMap<RouteKey, Route>,
    recursive_index: RecursiveIndex,
}

impl<H: HardwareAbstraction, L: LpmRouteTable, S: EventSink> FibCore<H, L, S> {
    pub fn new(config: FibCoreConfig, hal: H, lpm: L, sink: S) -> Self {
        let store = NodeStore::new(config.max_store_capacity);
        FibCore { store, config, hal, lpm, sink, routes: BTreeMap::new(), recursive_index: RecursiveIndex::new() }
    }

    #[must_use]
    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut NodeStore {
        &mut self.store
    }

    #[must_use]
    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    #[must_use]
    pub fn lpm(&self) -> &L {
        &self.lpm
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    #[must_use]
    pub fn route(&self, key: &RouteKey) -> Option<&Route> {
        self.routes.get(key)
    }

    /// Install a new route whose resolution-object subgraph already has `root` as
    /// its handle (spec §4.11). Resolves any reachable `RecursiveNextHop`s,
    /// forward-walks, and programs hardware if the walk is fully resolved.
    ///
    /// Per S5: a `RecursionExceeded` reached while resolving a nested recursive
    /// next-hop does not fail this call — the route is installed, left inactive, and
    /// `EventSink::notify` receives `RecursionExceeded` for diagnosis.
    ///
    /// # Errors
    ///
    /// Structural/capacity errors encountered outside recursive resolution
    /// (`CycleDetected`, `UnknownHandle`, `WalkDepthExceeded`, `HwResourceExhausted`)
    /// fail synchronously with no visible state change.
    pub fn install_route(&mut self, key: RouteKey, root: Handle) -> Result<(), FibError> {
        self.store.retain(root)?;
        match self.program_and_activate(key, root) {
            Ok(active) => {
                self.routes.insert(key, Route { root, active });
                self.sink.notify(if active { FibEvent::RouteActivated(key) } else { FibEvent::RouteDeactivated(key) });
                info!(target: "fib-core::orchestrate", ?key, active, "route installed");
                Ok(())
            }
            Err(e) => {
                if e.is_no_op_failure() {
                    let destroyed = self.store.release(root).unwrap_or_default();
                    self.free_destroyed(destroyed);
                }
                self.notify_failure(key, root, &e);
                Err(e)
            }
        }
    }

    /// Update an installed route to a new resolution-object chain, make-before-break
    /// (spec §4.4, §4.10, §5, invariant I7): the new chain is fully resolved and
    /// programmed before the route's root is swapped; only after the HAL
    /// acknowledges drain is the old chain released and its hardware freed.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `key` names no installed route. `HwDrainTimeout` if the
    /// HAL does not acknowledge drain within `config.hal_drain_timeout` — the new
    /// chain is already live and swapped in at that point (spec §5: "no automatic
    /// rollback").
    pub fn update_route(&mut self, key: RouteKey, new_root: Handle) -> Result<(), FibError> {
        let old = *self.routes.get(&key).ok_or(FibError::InvalidArgument("no such route"))?;
        self.store.retain(new_root)?;
        match self.program_and_activate(key, new_root) {
            Ok(active) => {
                self.routes.insert(key, Route { root: new_root, active });
                if !self.hal.drain(self.config.hal_drain_timeout) {
                    self.sink.notify(FibEvent::PartiallyApplied(key, new_root));
                    warn!(target: "fib-core::orchestrate", ?key, "hal drain timed out mid update");
                    return Err(FibError::HwDrainTimeout);
                }
                self.free_if_unreferenced(old.root);
                self.sink.notify(if active { FibEvent::RouteActivated(key) } else { FibEvent::RouteDeactivated(key) });
                Ok(())
            }
            Err(e) => {
                if e.is_no_op_failure() {
                    let destroyed = self.store.release(new_root).unwrap_or_default();
                    self.free_destroyed(destroyed);
                }
                self.notify_failure(key, new_root, &e);
                Err(e)
            }
        }
    }

    fn notify_failure(&mut self, key: RouteKey, handle: Handle, err: &FibError) {
        let event = match err {
            FibError::HwResourceExhausted => FibEvent::HwResourceExhausted(key, handle),
            FibError::CycleDetected => FibEvent::CycleDetected(key),
            FibError::PartiallyApplied | FibError::HwDrainTimeout => FibEvent::PartiallyApplied(key, handle),
            other => FibEvent::OperationFailed(key, other.clone()),
        };
        self.sink.notify(event);
    }

    /// Withdraw a route: release its root handle, freeing hardware for anything that
    /// was uniquely referenced by this route (spec §4.11, S6).
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `key` names no installed route.
    pub fn withdraw_route(&mut self, key: RouteKey) -> Result<(), FibError> {
        let route = self.routes.remove(&key).ok_or(FibError::InvalidArgument("no such route"))?;
        self.free_if_unreferenced(route.root);
        self.sink.notify(FibEvent::RouteDeactivated(key));
        Ok(())
    }

    /// Flip every `DirectNextHop` on `port` to unreachable and resync every route
    /// (spec §4.11). Interface events are not claimed O(1) in route count — only
    /// ECMP/FRR link events are (spec §4.8, §4.9, I6); this is a full rescan.
    pub fn on_interface_down(&mut self, port: PortId) -> Result<(), FibError> {
        self.set_interface_reachability(port, false)
    }

    pub fn on_interface_up(&mut self, port: PortId) -> Result<(), FibError> {
        self.set_interface_reachability(port, true)
    }

    fn set_interface_reachability(&mut self, port: PortId, reachable: bool) -> Result<(), FibError> {
        let cap = InterfaceCapability::new();
        let candidates: Vec<Handle> = self.store.handles_of_kind(Kind::DirectNextHop).collect();
        let mut touched = false;
        for handle in candidates {
            let on_port = matches!(self.store.get(handle)?, ResolutionObject::DirectNextHop(d) if d.egress_port == port);
            if !on_port {
                continue;
            }
            let d = self.store.get_direct_next_hop_mut(handle, &cap)?;
            if d.reachable == reachable {
                continue;
            }
            d.reachable = reachable;
            touched = true;
        }
        if touched {
            self.resync_all_routes()?;
        }
        Ok(())
    }

    /// Handle a link-state change affecting an ECMP member or an FRR branch (spec
    /// §4.8, §4.9, §4.11). Drives a single `update_ecmp_members`/`set_active` HAL
    /// call and a `HardwareOnly` dependent walk — no per-route work, satisfying I6.
    ///
    /// # Errors
    ///
    /// `UnknownHandle`/`InvalidArgument` if `target` names a handle of the wrong
    /// kind or with no member at the given position.
    pub fn on_link_event(&mut self, target: LinkTarget, up: bool) -> Result<(), FibError> {
        match target {
            LinkTarget::EcmpMember { group, position } => self.apply_ecmp_link_event(group, position, up),
            LinkTarget::FrrPrimary(handle) => self.apply_frr_link_event(handle, Branch::Primary, up),
            LinkTarget::FrrBackup(handle) => self.apply_frr_link_event(handle, Branch::Backup, up),
        }
    }

    /// BFD session-down/up notification for one branch of an `FrrProtected` pair
    /// (spec §4.9, §4.11, §6). The spec's `on_bfd_down(session_id)` names a session;
    /// resolving a session id to a handle/branch is the embedder's job (see
    /// `DESIGN.md`), so both are taken directly here.
    pub fn on_bfd_down(&mut self, handle: Handle, branch: Branch) -> Result<(), FibError> {
        self.apply_frr_link_event(handle, branch, false)
    }

    pub fn on_bfd_up(&mut self, handle: Handle, branch: Branch) -> Result<(), FibError> {
        self.apply_frr_link_event(handle, branch, true)
    }

    fn apply_ecmp_link_event(&mut self, group: Handle, position: usize, up: bool) -> Result<(), FibError> {
        let cap = EcmpCapability::new();
        if up {
            ecmp::mark_member_up(&mut self.store, &self.config, group, position, &cap)?;
        } else {
            ecmp::mark_member_down(&mut self.store, group, position, &cap)?;
        }
        let (live_bitmap, table) = match self.store.get(group)? {
            ResolutionObject::EcmpGroup(g) => (g.member_live.clone(), g.resilient_table.clone().unwrap_or_default()),
            _ => return Err(FibError::InvalidArgument("handle does not refer to an EcmpGroup")),
        };
        if let Some(hw) = self.store.hw_binding(group)? {
            if let Some(ecmp_id) = hw.ecmp {
                self.hal.update_ecmp_members(ecmp_id, &live_bitmap, &table);
            }
        }
        let change = if up { ChangeKind::InterfaceUp } else { ChangeKind::InterfaceDown };
        let max_levels = u32::from(self.config.max_walk_depth);
        let _ = dependent_walk(&self.store, group, change, Strategy::HardwareOnly, max_levels)?;
        Ok(())
    }

    fn apply_frr_link_event(&mut self, handle: Handle, branch: Branch, up: bool) -> Result<(), FibError> {
        let cap = FrrCapability::new();
        let event = if up { FrrEvent::Up(branch) } else { FrrEvent::Down(branch) };
        let outcome = frr::apply_event(&mut self.store, handle, event, &cap)?;
        if outcome.changed {
            if let Some(fec) = self.store.hw_binding(handle)?.and_then(|hw| hw.fec) {
                let active = active_branch(outcome.state);
                self.hal.set_active(fec, active);
            }
            let max_levels = u32::from(self.config.max_walk_depth);
            let _ = dependent_walk(&self.store, handle, ChangeKind::Modified, Strategy::HardwareOnly, max_levels)?;
        }
        Ok(())
    }

    /// The LPM callback for a change on a previously consulted route (spec §4.2,
    /// §4.11). Re-resolves exactly the `RecursiveNextHop`s that depend on
    /// `route_id`, then resyncs every route — this path is not claimed O(1) (spec
    /// §4.8/§4.9's PIC guarantee is specifically for link/BFD events).
    ///
    /// # Errors
    ///
    /// Propagates structural errors from re-resolution other than `RecursionExceeded`,
    /// which is instead surfaced through `EventSink`.
    pub fn on_route_change(&mut self, route_id: RouteId, _change: Change) -> Result<(), FibError> {
        let affected: Vec<Handle> = self.recursive_index.dependents_of(route_id).collect();
        for handle in affected {
            match recursive::resolve(&mut self.store, &self.lpm, handle, &self.config) {
                Ok(resolution) => {
                    self.refresh_recursive_index(handle);
                    let (changed, stale) = match resolution {
                        recursive::Resolution::Resolved { changed, stale, .. } => (changed, stale),
                        recursive::Resolution::Unresolved { changed, stale } => (changed, stale),
                    };
                    if changed {
                        self.free_destroyed(stale);
                    }
                }
                Err(FibError::RecursionExceeded(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.resync_all_routes()
    }

    fn refresh_recursive_index(&mut self, handle: Handle) {
        if let Ok(ResolutionObject::RecursiveNextHop(r)) = self.store.get(handle) {
            if let Some(route_id) = r.resolving_route_id {
                self.recursive_index.record(route_id, handle);
            }
        }
    }

    fn resync_all_routes(&mut self) -> Result<(), FibError> {
        let keys: Vec<RouteKey> = self.routes.keys().copied().collect();
        for key in keys {
            self.resync_route(key)?;
        }
        Ok(())
    }

    fn resync_route(&mut self, key: RouteKey) -> Result<(), FibError> {
        let route = self.routes[&key];
        let assembly = forward_walk(&self.store, route.root, self.config.max_walk_depth)?;
        let should_be_active = !assembly.unresolved;
        if should_be_active {
            program_fec_for(&mut self.store, &mut self.hal, &self.config, route.root)?;
        }
        if should_be_active != route.active {
            self.routes.get_mut(&key).expect("key checked above").active = should_be_active;
            self.sink.notify(if should_be_active {
                FibEvent::RouteActivated(key)
            } else {
                FibEvent::RouteDeactivated(key)
            });
        }
        Ok(())
    }

    /// Resolve every reachable `RecursiveNextHop`, forward-walk, and — if fully
    /// resolved — program hardware bottom-up for `root`. Returns whether the route
    /// ends up active.
    fn program_and_activate(&mut self, key: RouteKey, root: Handle) -> Result<bool, FibError> {
        self.resolve_recursive_chain(key, root)?;
        let assembly = forward_walk(&self.store, root, self.config.max_walk_depth)?;
        if assembly.unresolved {
            return Ok(false);
        }
        program_fec_for(&mut self.store, &mut self.hal, &self.config, root)?;
        Ok(true)
    }

    fn resolve_recursive_chain(&mut self, key: RouteKey, handle: Handle) -> Result<(), FibError> {
        let object = self.store.get(handle)?.clone();
        match object {
            ResolutionObject::RecursiveNextHop(_) => {
                match recursive::resolve(&mut self.store, &self.lpm, handle, &self.config) {
                    Ok(recursive::Resolution::Resolved { handle: target, changed, stale }) => {
                        if changed {
                            self.refresh_recursive_index(handle);
                            self.free_destroyed(stale);
                        }
                        self.resolve_recursive_chain(key, target)
                    }
                    Ok(recursive::Resolution::Unresolved { changed, stale }) => {
                        if changed {
                            self.free_destroyed(stale);
                        }
                        Ok(())
                    }
                    Err(FibError::RecursionExceeded(depth)) => {
                        self.sink.notify(FibEvent::RecursionExceeded(key, handle));
                        warn!(target: "fib-core::orchestrate", ?key, %handle, depth, "recursion depth exceeded");
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            ResolutionObject::LabelOperation(l) => match l.next {
                Some(next) => self.resolve_recursive_chain(key, next),
                None => Ok(()),
            },
            ResolutionObject::EcmpGroup(g) => {
                for member in g.members.into_iter().flatten() {
                    self.resolve_recursive_chain(key, member)?;
                }
                Ok(())
            }
            ResolutionObject::FrrProtected(f) => {
                self.resolve_recursive_chain(key, f.primary)?;
                self.resolve_recursive_chain(key, f.backup)
            }
            ResolutionObject::DirectNextHop(_) => Ok(()),
        }
    }

    fn free_if_unreferenced(&mut self, handle: Handle) {
        let destroyed = self.store.release(handle).unwrap_or_default();
        self.free_destroyed(destroyed);
    }

    /// Free every hardware resource named in `destroyed`. A resource id can appear
    /// more than once here — a `RecursiveNextHop` mirrors its target's FEC rather
    /// than allocating its own, so the same id surfaces once for the destroyed
    /// target and once for the RNH's own invalidated cache — so ids already freed
    /// in this batch are skipped rather than handed to the HAL twice.
    fn free_destroyed(&mut self, destroyed: Vec<(Handle, Option<HwBinding>)>) {
        let mut freed_fecs = std::collections::HashSet::new();
        let mut freed_ecmps = std::collections::HashSet::new();
        let mut freed_eedbs = std::collections::HashSet::new();
        for (handle, hw) in destroyed {
            let Some(hw) = hw else { continue };
            if let Some(fec) = hw.fec {
                if freed_fecs.insert(fec) {
                    self.hal.free_fec(fec);
                }
            }
            if let Some(ecmp) = hw.ecmp {
                if freed_ecmps.insert(ecmp) {
                    self.hal.free_ecmp(ecmp);
                }
            }
            if let Some(eedb) = hw.eedb {
                if freed_eedbs.insert(eedb) {
                    self.hal.free_eedb(eedb);
                }
            }
            tracing::debug!(target: "fib-core::orchestrate", %handle, "freed hardware for destroyed handle");
        }
    }
}

fn active_branch(state: crate::store::object::FrrState) -> Active {
    use crate::store::object::FrrState;
    match state {
        FrrState::UsingPrimary | FrrState::BothFailed => Active::Primary,
        FrrState::UsingBackup => Active::Backup,
    }
}

/// One step of a `DirectNextHop`/`LabelOperation` EEDB chain, or the FEC a nested
/// `EcmpGroup`/`FrrProtected` already terminates in (spec §4.10 bottom-up
/// programming).
#[derive(Debug, Clone, Copy)]
enum Link {
    Eedb(HwEedbId, PortId),
    Fec(HwFecId),
}

/// Program (or reuse the already-programmed) EEDB chain for `handle`, recursing
/// toward the terminal `DirectNextHop` (spec §4.10).
fn program_link<H: HardwareAbstraction>(
    store: &mut NodeStore,
    hal: &mut H,
    config: &FibCoreConfig,
    handle: Handle,
) -> Result<Link, FibError> {
    if let Some(existing) = store.hw_binding(handle)? {
        if let Some(eedb) = existing.eedb {
            return Ok(Link::Eedb(eedb, existing.port.unwrap_or_default()));
        }
        if existing.eedb.is_none() {
            if let Some(fec) = existing.fec {
                return Ok(Link::Fec(fec));
            }
        }
    }

    let object = store.get(handle)?.clone();
    match object {
        ResolutionObject::DirectNextHop(d) => {
            if !d.reachable {
                return Err(FibError::InvalidArgument("direct next hop is unreachable"));
            }
            let eedb = hal.alloc_eedb().ok_or(FibError::HwResourceExhausted)?;
            hal.program_l2_rewrite(eedb, L2Rewrite { dst_mac: d.dst_mac, src_mac: d.src_mac, vlan: d.vlan, port: d.egress_port });
            store.set_hw_binding(handle, Some(HwBinding { eedb: Some(eedb), port: Some(d.egress_port), ..Default::default() }))?;
            Ok(Link::Eedb(eedb, d.egress_port))
        }
        ResolutionObject::LabelOperation(l) => program_label_op(store, hal, config, handle, &l),
        ResolutionObject::RecursiveNextHop(r) => {
            let target = r.resolved_to.ok_or(FibError::InvalidArgument("cannot program an unresolved recursive next hop"))?;
            let link = program_link(store, hal, config, target)?;
            let hw = match link {
                Link::Eedb(eedb, port) => HwBinding { eedb: Some(eedb), port: Some(port), ..Default::default() },
                Link::Fec(fec) => HwBinding { fec: Some(fec), ..Default::default() },
            };
            store.set_hw_binding(handle, Some(hw))?;
            Ok(link)
        }
        ResolutionObject::EcmpGroup(g) => Ok(Link::Fec(program_ecmp_group(store, hal, config, handle, &g)?)),
        ResolutionObject::FrrProtected(f) => Ok(Link::Fec(program_frr_pair(store, hal, config, handle, &f)?)),
    }
}

/// Per spec §4.10's two modes: if the HAL supports EEDB chaining, program one EEDB
/// per label deepest-first, each pointing at the next; otherwise collapse the whole
/// stack into a single EEDB entry (format is HAL-internal — this core represents the
/// collapsed entry with the stack's own top label, per `DESIGN.md`).
///
/// `Pop`/`PopAndForward` program no EEDB of their own: they describe incoming-label
/// handling, out of scope for this (egress) HAL surface, so this step simply mirrors
/// whatever `next` already resolved to.
fn program_label_op<H: HardwareAbstraction>(
    store: &mut NodeStore,
    hal: &mut H,
    config: &FibCoreConfig,
    handle: Handle,
    l: &LabelOperation,
) -> Result<Link, FibError> {
    let next = l.next.ok_or(FibError::InvalidArgument("label operation has no next hop to chain to"))?;
    let next_link = program_link(store, hal, config, next)?;

    match l.op {
        LabelOp::Pop | LabelOp::PopAndForward => {
            let hw = match next_link {
                Link::Eedb(eedb, port) => HwBinding { eedb: Some(eedb), port: Some(port), ..Default::default() },
                Link::Fec(fec) => HwBinding { fec: Some(fec), ..Default::default() },
            };
            store.set_hw_binding(handle, Some(hw))?;
            Ok(next_link)
        }
        LabelOp::Push | LabelOp::Swap | LabelOp::SwapAndPush => {
            let (next_eedb, port): (HwEedbId, PortId) = match next_link {
                Link::Eedb(eedb, port) => (eedb, port),
                // The next hop is a branch point (ECMP/FRR) rather than an EEDB chain. `HwEedbId`
                // and `HwFecId` are both plain u32s, so the FEC id is passed through the same
                // `next_eedb` parameter; the HAL is expected to recognize it refers to a FEC, not
                // an EEDB (spec §4.10: "format is HAL-internal").
                Link::Fec(fec) => (fec, 0),
            };
            let chaining = hal.capabilities().supports_eedb_chaining;
            let eedb = if chaining {
                let mut chain_next = next_eedb;
                for label in l.labels.iter().rev() {
                    let e = hal.alloc_eedb().ok_or(FibError::HwResourceExhausted)?;
                    hal.program_label_eedb(e, LabelEntry { label: label.label_value, tc: label.tc, ttl: label.ttl }, chain_next);
                    chain_next = e;
                }
                chain_next
            } else {
                let e = hal.alloc_eedb().ok_or(FibError::HwResourceExhausted)?;
                let top = l.labels.first().copied();
                let entry = top.map_or(LabelEntry { label: 0, tc: 0, ttl: 0 }, |t| LabelEntry { label: t.label_value, tc: t.tc, ttl: t.ttl });
                hal.program_label_eedb(e, entry, next_eedb);
                e
            };
            store.set_hw_binding(handle, Some(HwBinding { eedb: Some(eedb), port: Some(port), ..Default::default() }))?;
            Ok(Link::Eedb(eedb, port))
        }
    }
}

fn program_ecmp_group<H: HardwareAbstraction>(
    store: &mut NodeStore,
    hal: &mut H,
    config: &FibCoreConfig,
    handle: Handle,
    g: &crate::store::object::EcmpGroup,
) -> Result<HwFecId, FibError> {
    if let Some(fec) = store.hw_binding(handle)?.and_then(|hw| hw.fec) {
        return Ok(fec);
    }
    let ecmp_id = hal.alloc_ecmp(g.max_members as u32).ok_or(FibError::HwResourceExhausted)?;
    for (pos, member) in g.members.iter().enumerate() {
        let live = g.member_live.get(pos).copied().unwrap_or(false);
        if let (true, Some(m)) = (live, member) {
            program_fec_for(store, hal, config, *m)?;
        }
    }
    let table = g.resilient_table.clone().unwrap_or_else(|| ecmp::rebuild_resilient_table(g, config.resilient_table_multiplier));
    hal.update_ecmp_members(ecmp_id, &g.member_live, &table);
    let fec = hal.alloc_fec().ok_or(FibError::HwResourceExhausted)?;
    hal.program_fec_ecmp(fec, ecmp_id);
    store.set_hw_binding(handle, Some(HwBinding { ecmp: Some(ecmp_id), fec: Some(fec), ..Default::default() }))?;
    Ok(fec)
}

fn program_frr_pair<H: HardwareAbstraction>(
    store: &mut NodeStore,
    hal: &mut H,
    config: &FibCoreConfig,
    handle: Handle,
    f: &crate::store::object::FrrProtected,
) -> Result<HwFecId, FibError> {
    if let Some(fec) = store.hw_binding(handle)?.and_then(|hw| hw.fec) {
        return Ok(fec);
    }
    let primary_fec = program_fec_for(store, hal, config, f.primary)?;
    let backup_fec = program_fec_for(store, hal, config, f.backup)?;
    hal.link_backup(primary_fec, backup_fec);
    let fec = hal.alloc_fec().ok_or(FibError::HwResourceExhausted)?;
    hal.program_fec_protected(fec, primary_fec, backup_fec);
    hal.set_active(fec, active_branch(f.state));
    store.set_hw_binding(handle, Some(HwBinding { fec: Some(fec), ..Default::default() }))?;
    Ok(fec)
}

/// Ensure `handle` has a FEC, the resource that makes it directly route/member/
/// branch-visible (spec §4.10). Used for a route's root and for each live ECMP
/// member / FRR branch, never for an intermediate link in a label chain.
fn program_fec_for<H: HardwareAbstraction>(
    store: &mut NodeStore,
    hal: &mut H,
    config: &FibCoreConfig,
    handle: Handle,
) -> Result<HwFecId, FibError> {
    if let Some(fec) = store.hw_binding(handle)?.and_then(|hw| hw.fec) {
        return Ok(fec);
    }
    let object = store.get(handle)?.clone();
    match object {
        ResolutionObject::EcmpGroup(g) => program_ecmp_group(store, hal, config, handle, &g),
        ResolutionObject::FrrProtected(f) => program_frr_pair(store, hal, config, handle, &f),
        ResolutionObject::RecursiveNextHop(r) => {
            let target = r.resolved_to.ok_or(FibError::InvalidArgument("cannot program an unresolved recursive next hop"))?;
            let fec = program_fec_for(store, hal, config, target)?;
            store.set_hw_binding(handle, Some(HwBinding { fec: Some(fec), ..Default::default() }))?;
            Ok(fec)
        }
        ResolutionObject::DirectNextHop(_) | ResolutionObject::LabelOperation(_) => match program_link(store, hal, config, handle)? {
            Link::Fec(fec) => Ok(fec),
            Link::Eedb(eedb, port) => {
                let fec = hal.alloc_fec().ok_or(FibError::HwResourceExhausted)?;
                hal.program_fec_simple(fec, eedb, port);
                let mut hw = store.hw_binding(handle)?.unwrap_or_default();
                hw.fec = Some(fec);
                store.set_hw_binding(handle, Some(hw))?;
                Ok(fec)
            }
        },
    }
}
