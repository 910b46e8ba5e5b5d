// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! FRR protection: primary/backup state transitions for a `FrrProtected` pair (spec
//! §4.9).

use crate::config::RevertivePolicy;
use crate::error::FibError;
use crate::handle::Handle;
use crate::store::object::FrrState;
use crate::store::{FrrCapability, NodeStore};
use tracectl::trace_target;
use tracing::debug;

trace_target!("fib-core::frr", tracing::Level::DEBUG, &["fib-core", "frr"]);

/// Which side of an `FrrProtected` pair an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Primary,
    Backup,
}

/// An externally observed health change for one branch of a protected pair (fed in
/// by `on_link_event`/`on_bfd_down`/`on_bfd_up`, spec §4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrrEvent {
    Down(Branch),
    Up(Branch),
}

/// Result of applying an event or a revert timer: the resulting state and whether
/// it actually changed (callers only need a HAL `set_active` call when it did).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrrOutcome {
    pub state: FrrState,
    pub changed: bool,
}

/// Apply a health-change event to the pair at `handle` (spec §4.9).
///
/// Only [`RevertivePolicy::Immediate`] reverts to the primary within this call; a
/// `WaitToRestore` policy instead stays on the backup until
/// [`apply_revert_timer_elapsed`] is called once the embedder's own timer fires, and
/// `NonRevertive` never reverts automatically.
///
/// # Errors
///
/// `UnknownHandle`/`InvalidArgument` if `handle` is not a live `FrrProtected`.
pub fn apply_event(
    store: &mut NodeStore,
    handle: Handle,
    event: FrrEvent,
    cap: &FrrCapability,
) -> Result<FrrOutcome, FibError> {
    let f = store.get_frr_mut(handle, cap)?;
    let previous = f.state;
    let next = match (previous, event) {
        (FrrState::UsingPrimary, FrrEvent::Down(Branch::Primary)) => FrrState::UsingBackup,
        (FrrState::UsingBackup, FrrEvent::Down(Branch::Backup)) => FrrState::BothFailed,
        (FrrState::BothFailed, FrrEvent::Up(Branch::Primary)) => FrrState::UsingPrimary,
        (FrrState::BothFailed, FrrEvent::Up(Branch::Backup)) => FrrState::UsingBackup,
        (FrrState::UsingBackup, FrrEvent::Up(Branch::Primary)) => match f.revertive {
            RevertivePolicy::Immediate => FrrState::UsingPrimary,
            RevertivePolicy::WaitToRestore(_) | RevertivePolicy::NonRevertive => FrrState::UsingBackup,
        },
        (state, _) => state,
    };
    let changed = next != previous;
    f.state = next;
    debug!(target: "fib-core::frr", %handle, ?previous, ?next, changed, "applied frr event");
    Ok(FrrOutcome { state: next, changed })
}

/// Called once the embedder's own wait-to-restore timer elapses for a pair whose
/// `revertive` policy is [`RevertivePolicy::WaitToRestore`] (spec §9 Open Question
/// 3). A no-op unless the pair is currently on its backup with a healthy primary.
///
/// # Errors
///
/// `UnknownHandle`/`InvalidArgument` if `handle` is not a live `FrrProtected`.
pub fn apply_revert_timer_elapsed(
    store: &mut NodeStore,
    handle: Handle,
    primary_healthy: bool,
    cap: &FrrCapability,
) -> Result<FrrOutcome, FibError> {
    let f = store.get_frr_mut(handle, cap)?;
    let previous = f.state;
    if previous == FrrState::UsingBackup
        && primary_healthy
        && matches!(f.revertive, RevertivePolicy::WaitToRestore(_))
    {
        f.state = FrrState::UsingPrimary;
    }
    let changed = f.state != previous;
    Ok(FrrOutcome { state: f.state, changed })
}
