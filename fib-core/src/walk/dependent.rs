// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The dependent walk: upward propagation of a change to every (transitively)
//! affected object, subject to a policy (spec §4.4).

use crate::error::FibError;
use crate::handle::{Handle, Kind};
use crate::store::NodeStore;
use std::collections::{HashSet, VecDeque};
use tracectl::trace_target;
use tracing::trace;

trace_target!("fib-core::walk", tracing::Level::DEBUG, &["fib-core", "walk"]);

/// What kind of change to `changed_handle` triggered this walk (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    BecameUnresolved,
    BecameResolved,
    MacChanged,
    InterfaceDown,
    InterfaceUp,
}

/// Which dependents a walk notifies (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Every transitive dependent.
    Full,
    /// Only direct dependents; the walk does not expand past level 1.
    Immediate,
    /// Only dependents whose reverse edge is marked `requires_hw_update`, expanded
    /// transitively through edges that are themselves so marked.
    Conditional,
    /// Only dependents that currently hold a hardware resource of their own. Used by
    /// PIC Core/Edge (spec §4.8, §4.9) to confirm no route-level HAL call is needed.
    HardwareOnly,
}

/// One dependent reached by a [`dependent_walk`], with its BFS distance from the
/// changed handle (1 = direct dependent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub handle: Handle,
    pub kind: Kind,
    pub level: u32,
}

/// Propagate `change` on `changed` to its dependents according to `strategy`, bounded
/// by `max_levels` (spec §4.4).
///
/// Returns notifications in non-decreasing BFS-level order — children (closer to
/// `changed`) are returned before parents, matching the hardware-programming order
/// the orchestration layer must apply (dependency order, spec §4.4's ordering
/// guarantee).
///
/// # Errors
///
/// `UnknownHandle` if `changed` is not live.
pub fn dependent_walk(
    store: &NodeStore,
    changed: Handle,
    _change: ChangeKind,
    strategy: Strategy,
    max_levels: u32,
) -> Result<Vec<Notification>, FibError> {
    store.get(changed)?;

    let mut out = Vec::new();
    let mut visited: HashSet<Handle> = HashSet::new();
    visited.insert(changed);
    let mut queue: VecDeque<(Handle, u32)> = VecDeque::new();
    queue.push_back((changed, 0));

    while let Some((handle, level)) = queue.pop_front() {
        if level >= max_levels {
            continue;
        }
        for edge in store.dependents(handle)? {
            if !visited.insert(edge.dependent_handle) {
                continue;
            }
            let included = match strategy {
                Strategy::Full => true,
                Strategy::Immediate => level == 0,
                Strategy::Conditional => edge.requires_hw_update,
                Strategy::HardwareOnly => store
                    .hw_binding(edge.dependent_handle)?
                    .is_some_and(|hw| hw.eedb.is_some() || hw.ecmp.is_some() || hw.fec.is_some()),
            };
            if !included {
                continue;
            }
            let next_level = level + 1;
            out.push(Notification { handle: edge.dependent_handle, kind: edge.dependent_kind, level: next_level });
            if strategy != Strategy::Immediate {
                queue.push_back((edge.dependent_handle, next_level));
            }
        }
    }

    trace!(target: "fib-core::walk", %changed, notified = out.len(), "dependent walk complete");
    Ok(out)
}
