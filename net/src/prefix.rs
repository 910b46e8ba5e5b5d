// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Type to represent IP-version neutral network prefixes.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::cmp::Ordering;
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Errors which can occur while constructing a [`Prefix`]
#[derive(Debug, thiserror::Error)]
pub enum PrefixError {
    /// The address/length pair could not be parsed or is malformed.
    #[error("invalid prefix: {0}")]
    Invalid(String),
    /// The supplied mask length exceeds the address family's maximum.
    #[error("mask length {0} is invalid")]
    InvalidLength(u8),
}

/// Type to represent both IPv4 and IPv6 prefixes behind a single, address-family-neutral API.
///
/// Since prefixes are not stored en masse in this crate (only carried as route keys and
/// lookup/resolution inputs), the size penalty of keeping an IPv6-sized variant alongside
/// IPv4 is immaterial.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Prefix {
    /// An IPv4 network prefix.
    V4(Ipv4Net),
    /// An IPv6 network prefix.
    V6(Ipv6Net),
}

impl Prefix {
    /// Maximum mask length for IPv4.
    pub const MAX_LEN_IPV4: u8 = 32;
    /// Maximum mask length for IPv6.
    pub const MAX_LEN_IPV6: u8 = 128;

    /// Build the IPv4 default route, `0.0.0.0/0`.
    #[must_use]
    pub fn root_v4() -> Prefix {
        Prefix::V4(Ipv4Net::new(Ipv4Addr::UNSPECIFIED, 0).expect("0 is always a legal prefix len"))
    }

    /// Build the IPv6 default route, `::/0`.
    #[must_use]
    pub fn root_v6() -> Prefix {
        Prefix::V6(Ipv6Net::new(Ipv6Addr::UNSPECIFIED, 0).expect("0 is always a legal prefix len"))
    }

    /// Tell whether this is the default route for its address family.
    #[must_use]
    pub fn is_root(&self) -> bool {
        match self {
            Prefix::V4(_) => *self == Prefix::root_v4(),
            Prefix::V6(_) => *self == Prefix::root_v6(),
        }
    }

    /// Check whether the prefix is IPv4.
    #[must_use]
    pub fn is_ipv4(&self) -> bool {
        matches!(self, Prefix::V4(_))
    }

    /// Check whether the prefix is IPv6.
    #[must_use]
    pub fn is_ipv6(&self) -> bool {
        matches!(self, Prefix::V6(_))
    }

    /// Tell whether the prefix identifies a single host (a /32 or /128).
    #[must_use]
    pub fn is_host(&self) -> bool {
        match self {
            Prefix::V4(_) => self.length() == Prefix::MAX_LEN_IPV4,
            Prefix::V6(_) => self.length() == Prefix::MAX_LEN_IPV6,
        }
    }

    /// Get the network address of the prefix.
    #[must_use]
    pub fn network(&self) -> IpAddr {
        match *self {
            Prefix::V4(p) => IpAddr::V4(p.network()),
            Prefix::V6(p) => IpAddr::V6(p.network()),
        }
    }

    /// Get the mask length of the prefix.
    #[must_use]
    pub fn length(&self) -> u8 {
        match *self {
            Prefix::V4(p) => p.prefix_len(),
            Prefix::V6(p) => p.prefix_len(),
        }
    }

    /// Check whether this prefix covers (contains) a given address.
    #[must_use]
    pub fn covers_addr(&self, addr: &IpAddr) -> bool {
        match (self, addr) {
            (Prefix::V4(p), IpAddr::V4(a)) => p.contains(a),
            (Prefix::V6(p), IpAddr::V6(a)) => p.contains(a),
            _ => false,
        }
    }

    /// Check whether this prefix covers (is a less-specific supernet of, or equal to) another.
    #[must_use]
    pub fn covers(&self, other: &Prefix) -> bool {
        match (self, other) {
            (Prefix::V4(p1), Prefix::V4(p2)) => p1.contains(p2),
            (Prefix::V6(p1), Prefix::V6(p2)) => p1.contains(p2),
            _ => false,
        }
    }

    /// Build a [`Prefix`] from an address and mask length.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` exceeds the address family's maximum.
    pub fn new(addr: IpAddr, len: u8) -> Result<Self, PrefixError> {
        match addr {
            IpAddr::V4(a) => {
                Ipv4Net::new(a, len).map(Prefix::V4).map_err(|_| PrefixError::InvalidLength(len))
            }
            IpAddr::V6(a) => {
                Ipv6Net::new(a, len).map(Prefix::V6).map_err(|_| PrefixError::InvalidLength(len))
            }
        }
    }

    /// Build a [`Prefix`] from an address string and mask length.
    ///
    /// # Errors
    ///
    /// Returns an error if the address fails to parse or `len` is invalid for the family.
    pub fn try_from_tuple(addr_str: &str, len: u8) -> Result<Self, PrefixError> {
        let addr = IpAddr::from_str(addr_str).map_err(|e| PrefixError::Invalid(e.to_string()))?;
        Prefix::new(addr, len)
    }
}

impl From<Ipv4Net> for Prefix {
    fn from(value: Ipv4Net) -> Self {
        Prefix::V4(value)
    }
}

impl From<Ipv6Net> for Prefix {
    fn from(value: Ipv6Net) -> Self {
        Prefix::V6(value)
    }
}

impl From<Prefix> for IpNet {
    fn from(value: Prefix) -> Self {
        match value {
            Prefix::V4(p) => IpNet::V4(p),
            Prefix::V6(p) => IpNet::V6(p),
        }
    }
}

impl FromStr for Prefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(p) = Ipv4Net::from_str(s) {
            Ok(Prefix::V4(p))
        } else if let Ok(p) = Ipv6Net::from_str(s) {
            Ok(Prefix::V6(p))
        } else {
            Err(PrefixError::Invalid(s.to_string()))
        }
    }
}

impl Display for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Prefix::V4(p) => write!(f, "{p}"),
            Prefix::V6(p) => write!(f, "{p}"),
        }
    }
}

/// Ordering consistent with longest-prefix-match tie-breaking: within an address family,
/// more specific (longer) prefixes sort after less specific ones for equal networks, and
/// IPv4 sorts before IPv6.
impl PartialOrd for Prefix {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Prefix {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Prefix::V4(_), Prefix::V6(_)) => Ordering::Less,
            (Prefix::V6(_), Prefix::V4(_)) => Ordering::Greater,
            (Prefix::V4(a), Prefix::V4(b)) => {
                (a.network(), a.prefix_len()).cmp(&(b.network(), b.prefix_len()))
            }
            (Prefix::V6(a), Prefix::V6(b)) => {
                (a.network(), a.prefix_len()).cmp(&(b.network(), b.prefix_len()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_v4_and_v6() {
        assert!(matches!(Prefix::from_str("10.0.0.0/8").unwrap(), Prefix::V4(_)));
        assert!(matches!(Prefix::from_str("2001:db8::/32").unwrap(), Prefix::V6(_)));
    }

    #[test]
    fn root_prefixes_cover_everything() {
        let root = Prefix::root_v4();
        assert!(root.covers_addr(&IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))));
        assert!(root.is_root());
    }

    #[test]
    fn more_specific_covers_less_specific_is_false() {
        let narrow = Prefix::from_str("10.0.0.0/24").unwrap();
        let wide = Prefix::from_str("10.0.0.0/8").unwrap();
        assert!(wide.covers(&narrow));
        assert!(!narrow.covers(&wide));
    }

    #[test]
    fn host_prefix_detection() {
        let host = Prefix::try_from_tuple("10.0.0.1", 32).unwrap();
        assert!(host.is_host());
    }
}
