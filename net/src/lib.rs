// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Address-family-neutral network primitives shared across the FIB core: MAC addresses,
//! VLAN tags, and IP prefixes.

pub mod mac;
pub mod prefix;
pub mod vlan;

pub use mac::{Mac, MacFromStringError};
pub use prefix::{Prefix, PrefixError};
pub use vlan::{InvalidVid, Vid, Vlan};
