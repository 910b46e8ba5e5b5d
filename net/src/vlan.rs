// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! VLAN validation and manipulation.

use core::num::NonZero;
use tracing::instrument;

/// A validated, tagged VLAN Identifier (never zero, never the reserved value 4095).
///
/// Marked `#[repr(transparent)]` so that [`Option<Vid>`] is layout-identical to `u16`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[repr(transparent)]
pub struct Vid(NonZero<u16>);

/// Errors which can occur when converting a `u16` to a validated [`Vid`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[must_use]
pub enum InvalidVid {
    /// 4095 is a reserved [`Vid`] per the spec.
    #[error("4095 is a reserved Vid")]
    Reserved,
    /// The value is too large to be a legal VID (max is 2^12 - 2).
    #[error("{0:?} is too large to be a legal Vid (max is 2^12 - 2)")]
    TooLarge(u16),
}

impl Vid {
    /// The minimum legal tagged VID value (1).
    pub const MIN: u16 = 1;
    /// The maximum legal tagged VID value (2^12 - 2).
    pub const MAX: u16 = 4094;

    /// Create a new tagged [`Vid`] from a `u16`. Zero is rejected here because it is
    /// reserved for [`Vlan::Untagged`]; use [`Vlan::from_u16`] to accept both.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is 4095 (reserved) or greater than [`Vid::MAX`].
    #[instrument(level = "trace", ret)]
    pub fn new(vid: NonZero<u16>) -> Result<Self, InvalidVid> {
        match vid.get() {
            4095 => Err(InvalidVid::Reserved),
            v if v > Vid::MAX => Err(InvalidVid::TooLarge(v)),
            _ => Ok(Vid(vid)),
        }
    }

    /// Get the value of the [`Vid`] as a `u16`.
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self.0.get()
    }
}

impl From<Vid> for u16 {
    fn from(vid: Vid) -> u16 {
        vid.as_u16()
    }
}

impl core::fmt::Display for Vid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Outer VLAN tag on an egress rewrite: either untagged (0) or a validated tag.
///
/// This mirrors the wire convention used throughout the FIB data model: a `vlan` field of
/// `0` means "send untagged", any other value names the 802.1Q tag to push.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Vlan {
    /// No 802.1Q tag is pushed.
    Untagged,
    /// A validated 802.1Q tag is pushed.
    Tagged(Vid),
}

impl Vlan {
    /// Build a [`Vlan`] from the wire representation (`0` = untagged).
    ///
    /// # Errors
    ///
    /// Returns an error if `vlan` names a reserved or out-of-range tagged VID.
    pub fn from_u16(vlan: u16) -> Result<Self, InvalidVid> {
        match NonZero::new(vlan) {
            None => Ok(Vlan::Untagged),
            Some(vid) => Vid::new(vid).map(Vlan::Tagged),
        }
    }

    /// Render back to the wire representation (`0` = untagged).
    #[must_use]
    pub fn as_u16(self) -> u16 {
        match self {
            Vlan::Untagged => 0,
            Vlan::Tagged(vid) => vid.as_u16(),
        }
    }
}

impl Default for Vlan {
    fn default() -> Self {
        Vlan::Untagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_untagged() {
        assert_eq!(Vlan::from_u16(0).unwrap(), Vlan::Untagged);
    }

    #[test]
    fn rejects_reserved_and_oversized() {
        assert!(Vlan::from_u16(4095).is_err());
        assert!(Vlan::from_u16(5000).is_err());
    }

    #[test]
    fn round_trips_tagged_value() {
        let v = Vlan::from_u16(100).unwrap();
        assert_eq!(v.as_u16(), 100);
    }
}
