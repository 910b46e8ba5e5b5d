// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The event sink the core emits on (spec §6).

use crate::error::FibError;
use crate::handle::Handle;
use crate::route::RouteKey;

/// Notifications the core emits through [`EventSink`] (spec §6, §7).
///
/// Every failure the core surfaces goes through here too, carrying the `RouteKey`
/// (when one is in scope), the error, and enough context (a `Handle`, when one is
/// implicated) to diagnose without re-deriving it from logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FibEvent {
    /// A route has a resolved, hardware-programmed path.
    RouteActivated(RouteKey),
    /// A route no longer has a resolved path (went `Unresolved`, or was withdrawn).
    RouteDeactivated(RouteKey),
    /// A HAL allocation failed for this route's chain; the route is not installed or
    /// remains in its previous state.
    HwResourceExhausted(RouteKey, Handle),
    /// A make-before-break update did not complete within the HAL's drain timeout;
    /// old and new hardware resources may both transiently exist (spec §5, §7).
    PartiallyApplied(RouteKey, Handle),
    /// An insert would have closed a cycle reachable from a route.
    CycleDetected(RouteKey),
    /// Recursive next-hop resolution exceeded the configured maximum depth.
    RecursionExceeded(RouteKey, Handle),
    /// A fallible operation failed with an error not otherwise broken out above.
    OperationFailed(RouteKey, FibError),
}

/// Sink for [`FibEvent`]s, implemented by the embedder (spec §6).
pub trait EventSink {
    fn notify(&mut self, event: FibEvent);
}
