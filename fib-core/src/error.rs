// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The error taxonomy for this crate.

use crate::handle::Handle;
use thiserror::Error;

/// Errors returned by the FIB core's public API.
///
/// Grouped along the taxonomy the core defines for itself: structural errors are
/// caller bugs (no partial state results), capacity errors are recoverable and leave
/// the route uninstalled, hardware errors may leave the system in a documented
/// `PartiallyApplied` state, and usage errors are misuse of the handle/refcount API.
/// `Unresolved` is deliberately not a member of this enum: it is a successful walk
/// outcome carried in [`crate::walk::forward::ForwardingAssembly`], not a failure.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum FibError {
    // -- structural --
    #[error("inserting this object would close a cycle reachable from a route")]
    CycleDetected,

    #[error("handle {0} does not refer to a live object")]
    UnknownHandle(Handle),

    #[error("forward walk exceeded the configured maximum depth ({0})")]
    WalkDepthExceeded(u8),

    #[error("recursive next-hop resolution exceeded the configured maximum depth ({0})")]
    RecursionExceeded(u8),

    // -- capacity --
    #[error("node store has no free slots")]
    CapacityExhausted,

    #[error("ecmp group is at its configured member capacity")]
    EcmpFull,

    #[error("hardware abstraction layer has no free resources of the requested kind")]
    HwResourceExhausted,

    // -- hardware --
    #[error("hardware abstraction layer failed to program a resource: {0}")]
    HwProgramFailed(String),

    #[error("hardware abstraction layer did not acknowledge drain within the configured timeout")]
    HwDrainTimeout,

    #[error("operation partially applied: new resources are live, old resources were not freed")]
    PartiallyApplied,

    // -- usage --
    #[error("attempted to release handle {0} while its refcount is non-zero")]
    InUse(Handle),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl FibError {
    /// Tell whether this error leaves the node store/hardware state exactly as it was
    /// before the operation began (true for everything except [`FibError::PartiallyApplied`]
    /// and [`FibError::HwDrainTimeout`], which the orchestrator must treat as
    /// make-before-break operations caught mid-flight per spec §5).
    #[must_use]
    pub fn is_no_op_failure(&self) -> bool {
        !matches!(self, FibError::PartiallyApplied | FibError::HwDrainTimeout)
    }
}
