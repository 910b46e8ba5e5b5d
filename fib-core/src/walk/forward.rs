// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The forward walk: downward traversal assembling a [`ForwardingAssembly`] for a
//! route's resolution-object chain (spec §4.3).

use crate::error::FibError;
use crate::handle::Handle;
use crate::store::NodeStore;
use crate::store::object::{DirectNextHop, HashMode, Label, LabelOp, ResolutionObject};
use tracectl::trace_target;
use tracing::trace;

trace_target!("fib-core::walk", tracing::Level::DEBUG, &["fib-core", "walk"]);

/// The ECMP branch point of a [`ForwardingAssembly`]: one sub-assembly per currently
/// live member, in member order (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcmpDecision {
    pub hash_mode: HashMode,
    pub members: Vec<ForwardingAssembly>,
}

/// The FRR branch point of a [`ForwardingAssembly`]: both the primary and the backup
/// sub-assembly, always both present regardless of which is currently active (spec
/// §4.3: "recurse into primary and backup separately").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrrDecision {
    pub primary: Box<ForwardingAssembly>,
    pub backup: Box<ForwardingAssembly>,
}

/// What a packet matching a route should have done to it, assembled by a forward
/// walk from a resolution-object chain (spec §4.3).
///
/// `labels` accumulates in walk-visitation order: a handle's own labels are appended
/// before the walk recurses into whatever it chains to, so `labels[0]` is the label
/// pushed by the chain's root (the outermost entry a caller reads first).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForwardingAssembly {
    pub labels: Vec<Label>,
    pub terminal: Option<DirectNextHop>,
    pub ecmp: Option<EcmpDecision>,
    pub frr: Option<FrrDecision>,
    /// True if this (sub-)assembly has no resolvable forwarding path. A successful
    /// walk outcome, not an error (spec §4.3, §7).
    pub unresolved: bool,
    /// How many resolution objects were visited to build this assembly.
    pub depth: u8,
}

impl ForwardingAssembly {
    fn unresolved_at(depth: u8) -> Self {
        ForwardingAssembly { unresolved: true, depth, ..Default::default() }
    }
}

/// Run a forward walk from `root`, bounded by `max_depth` (spec §4.3).
///
/// # Errors
///
/// `WalkDepthExceeded` if the chain is deeper than `max_depth`; `UnknownHandle` if a
/// handle referenced along the way is not live (should not happen for a
/// store-internal chain, but a defensive check costs nothing here).
pub fn forward_walk(store: &NodeStore, root: Handle, max_depth: u8) -> Result<ForwardingAssembly, FibError> {
    walk(store, root, 0, max_depth)
}

fn walk(store: &NodeStore, handle: Handle, depth: u8, max_depth: u8) -> Result<ForwardingAssembly, FibError> {
    if depth > max_depth {
        return Err(FibError::WalkDepthExceeded(max_depth));
    }
    let object = store.get(handle)?;
    let assembly = match object {
        ResolutionObject::DirectNextHop(d) => {
            if d.reachable {
                ForwardingAssembly { terminal: Some(d.clone()), depth, ..Default::default() }
            } else {
                ForwardingAssembly::unresolved_at(depth)
            }
        }
        ResolutionObject::LabelOperation(l) => {
            let Some(next) = l.next else {
                return Ok(ForwardingAssembly::unresolved_at(depth));
            };
            let mut inner = walk(store, next, depth + 1, max_depth)?;
            if !inner.unresolved {
                prepend_at_root(&mut inner.labels, l.op, &l.labels);
            }
            inner.depth = depth;
            inner
        }
        ResolutionObject::RecursiveNextHop(r) => match r.resolved_to {
            Some(target) => {
                let mut inner = walk(store, target, depth + 1, max_depth)?;
                inner.depth = depth;
                inner
            }
            None => ForwardingAssembly::unresolved_at(depth),
        },
        ResolutionObject::EcmpGroup(g) => {
            let mut members = Vec::new();
            for (pos, member) in g.members.iter().enumerate() {
                let live = g.member_live.get(pos).copied().unwrap_or(false);
                let Some(h) = (if live { *member } else { None }) else { continue };
                members.push(walk(store, h, depth + 1, max_depth)?);
            }
            let all_unresolved = members.is_empty() || members.iter().all(|m| m.unresolved);
            if all_unresolved {
                ForwardingAssembly::unresolved_at(depth)
            } else {
                ForwardingAssembly {
                    ecmp: Some(EcmpDecision { hash_mode: g.hash_mode, members }),
                    depth,
                    ..Default::default()
                }
            }
        }
        ResolutionObject::FrrProtected(f) => {
            let primary = walk(store, f.primary, depth + 1, max_depth)?;
            let backup = walk(store, f.backup, depth + 1, max_depth)?;
            if primary.unresolved && backup.unresolved {
                ForwardingAssembly::unresolved_at(depth)
            } else {
                ForwardingAssembly {
                    frr: Some(FrrDecision { primary: Box::new(primary), backup: Box::new(backup) }),
                    depth,
                    ..Default::default()
                }
            }
        }
    };
    trace!(target: "fib-core::walk", %handle, unresolved = assembly.unresolved, "visited in forward walk");
    Ok(assembly)
}

/// Splice `op`'s labels onto the front of `labels` (the accumulated stack of
/// everything below this node), implementing Push/Swap/Pop at the label-stack level
/// (spec §4.3, §4.6). `Pop`/`PopAndForward` never contribute an entry of their own.
fn prepend_at_root(labels: &mut Vec<Label>, op: LabelOp, own: &[Label]) {
    match op {
        LabelOp::Push | LabelOp::SwapAndPush => {
            let mut combined = own.to_vec();
            combined.append(labels);
            *labels = combined;
        }
        LabelOp::Swap => {
            if labels.is_empty() {
                *labels = own.to_vec();
            } else if let Some(top) = own.first() {
                labels[0] = *top;
            }
        }
        LabelOp::Pop | LabelOp::PopAndForward => {
            if !labels.is_empty() {
                labels.remove(0);
            }
        }
    }
}
