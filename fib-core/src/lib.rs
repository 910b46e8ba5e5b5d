// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Hierarchical FIB core: the in-memory data model, resolution hierarchy, and
//! hardware-programming orchestration that maps routes to concrete forwarding
//! actions, plus the protection/convergence primitives (ECMP, PIC Core, PIC Edge,
//! FRR) that exploit the hierarchy for sub-millisecond failover.
//!
//! This crate is a library, not a process: the embedder owns an
//! [`orchestrate::FibCore`], plugs in a [`hal::HardwareAbstraction`] and
//! [`lpm::LpmRouteTable`] implementation for the target ASIC and routing table, and
//! drives it from a single worker thread (no locking inside this crate; see the
//! module docs on [`orchestrate`] for the concurrency model this assumes).
//!
//! # Layout
//!
//! - [`handle`] / [`store`] — opaque generational handles and the arena that owns
//!   every resolution object, with refcounting and acyclicity enforced at every
//!   mutation.
//! - [`walk`] — the forward walk (route -> hardware assembly) and dependent walk
//!   (change -> affected hardware) that drive programming and convergence.
//! - [`ecmp`], [`frr`], [`recursive`] — the three subsystems that mutate live
//!   objects in place under a capability token: ECMP liveness/resilient hashing,
//!   FRR primary/backup state, and recursive next-hop re-resolution.
//! - [`hal`] — the trait this crate programs against; implementations live outside
//!   this crate.
//! - [`orchestrate`] — the public API ([`orchestrate::FibCore`]) sequencing the
//!   above into `install_route`/`update_route`/`withdraw_route` and the interface/
//!   link/BFD/route-change event handlers.
//! - [`testing`] (behind the `testing` feature) — mock HAL, mock LPM route table,
//!   and mock event sink used by this crate's own integration tests, exported so
//!   downstream embedders can build their own test harnesses against the same
//!   contract.

pub mod config;
pub mod ecmp;
pub mod error;
pub mod event;
pub mod frr;
pub mod hal;
pub mod handle;
pub mod lpm;
pub mod orchestrate;
pub mod recursive;
pub mod route;
pub mod store;
pub mod walk;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{FibCoreConfig, FibCoreConfigBuilder, RevertivePolicy};
pub use error::FibError;
pub use event::{EventSink, FibEvent};
pub use hal::HardwareAbstraction;
pub use handle::{Handle, Kind};
pub use lpm::{Change, LpmRouteTable};
pub use orchestrate::{FibCore, LinkTarget};
pub use route::{ProtocolId, Route, RouteKey};
