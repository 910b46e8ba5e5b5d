// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The node store: arena allocation, uniqueness, refcounting, and acyclicity for
//! every resolution object (spec §4.1).

pub mod edges;
pub mod object;

use crate::error::FibError;
use crate::hal::HwBinding;
use crate::handle::Handle;
use edges::DependentEdge;
use object::ResolutionObject;
use tracectl::trace_target;
use tracing::{debug, trace, warn};

trace_target!("fib-core::nodestore", tracing::Level::DEBUG, &["fib-core", "nodestore"]);

struct Slot {
    object: ResolutionObject,
    generation: u32,
    refcount: u32,
    dependents: Vec<DependentEdge>,
    hw: Option<HwBinding>,
}

enum Entry {
    Occupied(Slot),
    Free { next_generation: u32 },
}

/// The arena owning every live [`ResolutionObject`].
///
/// Enforces the invariants in spec §3: acyclicity at every insertion, bottom-up
/// validity (every forward edge names a handle already in the store), and refcount
/// conservation. Mutation beyond simple refcounting goes through [`NodeStore::replace`],
/// which re-runs acyclicity and validity checks because the new object's forward
/// edges are not known to be safe in advance.
pub struct NodeStore {
    entries: Vec<Entry>,
    free_list: Vec<u32>,
    max_capacity: u32,
    max_cycle_check_depth: usize,
}

impl NodeStore {
    #[must_use]
    pub fn new(max_capacity: u32) -> Self {
        NodeStore {
            entries: Vec::new(),
            free_list: Vec::new(),
            max_capacity,
            max_cycle_check_depth: 4096,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Occupied(_)))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, handle: Handle) -> Result<&Slot, FibError> {
        match self.entries.get(handle.index() as usize) {
            Some(Entry::Occupied(slot)) if slot.generation == handle.generation() => Ok(slot),
            _ => Err(FibError::UnknownHandle(handle)),
        }
    }

    fn slot_mut(&mut self, handle: Handle) -> Result<&mut Slot, FibError> {
        match self.entries.get_mut(handle.index() as usize) {
            Some(Entry::Occupied(slot)) if slot.generation == handle.generation() => Ok(slot),
            _ => Err(FibError::UnknownHandle(handle)),
        }
    }

    /// Fetch a resolution object by handle.
    pub fn get(&self, handle: Handle) -> Result<&ResolutionObject, FibError> {
        self.slot(handle).map(|s| &s.object)
    }

    /// Fetch this handle's recorded hardware binding, if any.
    pub fn hw_binding(&self, handle: Handle) -> Result<Option<HwBinding>, FibError> {
        self.slot(handle).map(|s| s.hw)
    }

    /// Record (or clear) the hardware binding for a handle. Called by the
    /// orchestration layer once the HAL has programmed (or freed) the corresponding
    /// resource.
    pub fn set_hw_binding(&mut self, handle: Handle, hw: Option<HwBinding>) -> Result<(), FibError> {
        self.slot_mut(handle)?.hw = hw;
        Ok(())
    }

    /// Current refcount for a handle: the number of routes pointing to it directly
    /// plus the number of other live objects with a forward edge to it (spec I2).
    pub fn refcount(&self, handle: Handle) -> Result<u32, FibError> {
        self.slot(handle).map(|s| s.refcount)
    }

    pub fn dependents(&self, handle: Handle) -> Result<&[DependentEdge], FibError> {
        self.slot(handle).map(|s| s.dependents.as_slice())
    }

    fn would_cycle(&self, from: Handle, new_edges: &[Handle]) -> bool {
        let mut stack: Vec<Handle> = new_edges.to_vec();
        let mut visited = std::collections::HashSet::new();
        let mut depth = 0;
        while let Some(h) = stack.pop() {
            depth += 1;
            if depth > self.max_cycle_check_depth {
                // Pathological depth is itself treated as a cycle: a legitimate,
                // acyclic graph is bounded by the store's capacity, so exceeding the
                // check depth means something is already wrong.
                return true;
            }
            if h == from {
                return true;
            }
            if !visited.insert(h) {
                continue;
            }
            if let Ok(obj) = self.get(h) {
                stack.extend(obj.forward_edges());
            }
        }
        false
    }

    fn retain_edges(&mut self, owner: Handle, targets: &[Handle], requires_hw_update: bool) -> Result<(), FibError> {
        for &t in targets {
            let slot = self.slot_mut(t)?;
            slot.refcount += 1;
            slot.dependents.push(DependentEdge::new(owner, requires_hw_update));
        }
        Ok(())
    }

    fn release_edges(&mut self, owner: Handle, targets: &[Handle]) -> Result<Vec<Handle>, FibError> {
        let mut newly_freed = Vec::new();
        for &t in targets {
            let slot = self.slot_mut(t)?;
            slot.dependents.retain(|e| e.dependent_handle != owner);
            debug_assert!(slot.refcount > 0);
            slot.refcount -= 1;
            if slot.refcount == 0 {
                newly_freed.push(t);
            }
        }
        Ok(newly_freed)
    }

    /// Allocate a new resolution object and install its forward/reverse edges.
    ///
    /// # Errors
    ///
    /// `UnknownHandle` if any forward edge named by `object` does not exist in the
    /// store; `CycleDetected` if the object's edges would close a cycle; `CapacityExhausted`
    /// if the store is full. No mutation is visible after any of these errors.
    pub fn insert(&mut self, object: ResolutionObject) -> Result<Handle, FibError> {
        let edges = object.forward_edges();
        for &e in &edges {
            self.get(e)?;
        }

        let index = self.free_list.last().copied();
        let tentative = match index {
            Some(i) => {
                let Entry::Free { next_generation } = self.entries[i as usize] else {
                    unreachable!("free_list only references Free entries")
                };
                Handle::new(object.kind(), next_generation, i)
            }
            None => {
                if self.entries.len() as u64 >= u64::from(self.max_capacity) {
                    return Err(FibError::CapacityExhausted);
                }
                Handle::new(object.kind(), 0, self.entries.len() as u32)
            }
        };

        if self.would_cycle(tentative, &edges) {
            warn!(target: "fib-core::nodestore", handle = %tentative, "rejecting insert: would close a cycle");
            return Err(FibError::CycleDetected);
        }

        let slot = Slot {
            object,
            generation: tentative.generation(),
            refcount: 0,
            dependents: Vec::new(),
            hw: None,
        };

        match index {
            Some(i) => {
                self.free_list.pop();
                self.entries[i as usize] = Entry::Occupied(slot);
            }
            None => self.entries.push(Entry::Occupied(slot)),
        }

        // Every forward edge is conservatively treated as hardware-significant: any
        // resolution object's own reprogramming can affect a dependent's programmed
        // state, so `Conditional` dependent walks currently coincide with `Full` ones.
        self.retain_edges(tentative, &edges, true)?;
        trace!(target: "fib-core::nodestore", handle = %tentative, "inserted");
        Ok(tentative)
    }

    /// Replace the object at `handle` in place, re-checking acyclicity and bottom-up
    /// validity against the new edge set, and updating reverse edges to match.
    ///
    /// Used for the "insert-new + redirect + release-old" idiom only when the
    /// replacement happens at a *stable* handle (e.g. a `RecursiveNextHop`
    /// re-resolving in place keeps its own identity; only `resolved_to` changes).
    /// For label operation edits, spec §4.6 calls for a genuinely new handle
    /// instead; callers implement that with `insert` + updating referrers +
    /// `release`, not with this method.
    ///
    /// Any forward edge the old object held that the new object no longer holds is
    /// released; if that drops the target's refcount to zero, it (and its own
    /// descendants, recursively) are torn down exactly as in [`NodeStore::release`].
    /// Returns the set of handles destroyed this way, deepest first, with their
    /// last-known hardware binding, so the caller can free the corresponding HAL
    /// resources.
    ///
    /// # Errors
    ///
    /// Same as [`NodeStore::insert`], plus `UnknownHandle` if `handle` is not live.
    pub fn replace(&mut self, handle: Handle, object: ResolutionObject) -> Result<Vec<(Handle, Option<HwBinding>)>, FibError> {
        let old_edges = self.get(handle)?.forward_edges();
        let new_edges = object.forward_edges();
        for &e in &new_edges {
            self.get(e)?;
        }
        if self.would_cycle(handle, &new_edges) {
            return Err(FibError::CycleDetected);
        }

        let released = self.release_edges(handle, &old_edges)?;
        self.retain_edges(handle, &new_edges, true)?;
        self.slot_mut(handle)?.object = object;
        debug!(target: "fib-core::nodestore", %handle, "replaced in place");

        // A target released above may be named again by the new edge set (or by
        // anything else), so only a candidate whose refcount is still zero once the
        // new edges have been retained is actually torn down.
        let mut destroyed = Vec::new();
        for candidate in released {
            if matches!(self.refcount(candidate), Ok(0)) {
                destroyed.extend(self.destroy_cascade(candidate)?);
            }
        }
        Ok(destroyed)
    }

    /// Increment a handle's refcount: one more live referrer now points to it.
    pub fn retain(&mut self, handle: Handle) -> Result<(), FibError> {
        self.slot_mut(handle)?.refcount += 1;
        Ok(())
    }

    /// Decrement a handle's refcount; if it reaches zero, the object (and its own
    /// forward edges, recursively) are released and the handle's slot is freed.
    /// Returns the set of handles actually destroyed by this call, deepest first,
    /// together with their last-known hardware binding so the caller can free the
    /// corresponding HAL resources.
    ///
    /// # Errors
    ///
    /// `UnknownHandle` if `handle` is not live. `InUse` is never returned here —
    /// callers that must reject a non-zero-refcount release call [`NodeStore::refcount`]
    /// first.
    pub fn release(&mut self, handle: Handle) -> Result<Vec<(Handle, Option<HwBinding>)>, FibError> {
        let slot = self.slot_mut(handle)?;
        debug_assert!(slot.refcount > 0, "release called on a handle with zero refcount");
        slot.refcount -= 1;
        if slot.refcount != 0 {
            return Ok(Vec::new());
        }
        self.destroy_cascade(handle)
    }

    /// Tear down `handle` (whose refcount has already reached zero) and every
    /// descendant whose own refcount reaches zero as a result, without re-decrementing
    /// a handle's refcount a second time.
    ///
    /// [`NodeStore::release_edges`] already performs the one-and-only decrement each
    /// queued handle needs (it is driven entirely by forward edges owned by objects
    /// already being destroyed), so the queue here is processed by destruction alone.
    fn destroy_cascade(&mut self, handle: Handle) -> Result<Vec<(Handle, Option<HwBinding>)>, FibError> {
        let mut destroyed = Vec::new();
        let mut queue = vec![handle];
        while let Some(h) = queue.pop() {
            let slot = self.slot_mut(h)?;
            let object = slot.object.clone();
            let hw = slot.hw;
            let generation = slot.generation;
            let edges = object.forward_edges();
            let freed = self.release_edges(h, &edges)?;
            self.entries[h.index() as usize] = Entry::Free {
                next_generation: generation.wrapping_add(1),
            };
            self.free_list.push(h.index());
            debug!(target: "fib-core::nodestore", handle = %h, kind = %h.kind(), "released");
            destroyed.push((h, hw));
            queue.extend(freed);
        }
        Ok(destroyed)
    }

    /// Non-decrementing check used by callers (e.g. withdraw) that want to assert a
    /// handle is not in use before attempting to tear it down directly, per the `InUse`
    /// failure semantics in spec §4.1.
    pub fn ensure_releasable(&self, handle: Handle) -> Result<(), FibError> {
        if self.refcount(handle)? > 0 {
            return Err(FibError::InUse(handle));
        }
        Ok(())
    }

    /// All live handles of a given kind, in slot order. Used by orchestration for
    /// events that name a resource rather than a handle (e.g. `on_interface_down(port)`
    /// must find every `DirectNextHop` on that port).
    pub fn handles_of_kind(&self, kind: crate::handle::Kind) -> impl Iterator<Item = Handle> + '_ {
        self.entries.iter().enumerate().filter_map(move |(i, e)| match e {
            Entry::Occupied(slot) if slot.object.kind() == kind => {
                Some(Handle::new(kind, slot.generation, i as u32))
            }
            _ => None,
        })
    }

    /// Mutable access to a `DirectNextHop`, gated by [`InterfaceCapability`] since the
    /// only field this crate mutates in place is `reachable` (spec §4.1).
    pub fn get_direct_next_hop_mut(
        &mut self,
        handle: Handle,
        _cap: &InterfaceCapability,
    ) -> Result<&mut object::DirectNextHop, FibError> {
        match &mut self.slot_mut(handle)?.object {
            ResolutionObject::DirectNextHop(d) => Ok(d),
            _ => Err(FibError::InvalidArgument("handle does not refer to a DirectNextHop")),
        }
    }

    /// Mutable access to an `EcmpGroup`, gated by [`EcmpCapability`]. Only the ECMP
    /// engine mutates `member_live` and `resilient_table` in place; changing the
    /// member list itself goes through [`NodeStore::replace`] so refcounts stay
    /// accurate.
    pub fn get_ecmp_mut(
        &mut self,
        handle: Handle,
        _cap: &EcmpCapability,
    ) -> Result<&mut object::EcmpGroup, FibError> {
        match &mut self.slot_mut(handle)?.object {
            ResolutionObject::EcmpGroup(g) => Ok(g),
            _ => Err(FibError::InvalidArgument("handle does not refer to an EcmpGroup")),
        }
    }

    /// Mutable access to an `FrrProtected`, gated by [`FrrCapability`]. Only the FRR
    /// subsystem mutates `state` in place (spec §4.1).
    pub fn get_frr_mut(
        &mut self,
        handle: Handle,
        _cap: &FrrCapability,
    ) -> Result<&mut object::FrrProtected, FibError> {
        match &mut self.slot_mut(handle)?.object {
            ResolutionObject::FrrProtected(f) => Ok(f),
            _ => Err(FibError::InvalidArgument("handle does not refer to an FrrProtected")),
        }
    }
}

/// Capability token gating mutation of a live `DirectNextHop`'s `reachable` flag.
/// Held by the orchestration layer, which owns interface-state events.
pub struct InterfaceCapability(());

impl InterfaceCapability {
    #[must_use]
    pub(crate) fn new() -> Self {
        InterfaceCapability(())
    }
}

/// Capability token gating mutation of a live `EcmpGroup`'s liveness/resilient-table
/// fields. Held by [`crate::ecmp`], the only subsystem that touches them in place.
pub struct EcmpCapability(());

impl EcmpCapability {
    #[must_use]
    pub(crate) fn new() -> Self {
        EcmpCapability(())
    }
}

/// Capability token gating mutation of a live `FrrProtected`'s `state` field. Held by
/// [`crate::frr`], the only subsystem that touches it in place.
pub struct FrrCapability(());

impl FrrCapability {
    #[must_use]
    pub(crate) fn new() -> Self {
        FrrCapability(())
    }
}
