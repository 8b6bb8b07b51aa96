//! IPv4 subnets
//!
//! CIDR parsing follows the same rules as the routing config of the in-memory
//! network: a missing prefix means `/32`, prefixes above 32 are rejected.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::ScenarioError;

/// A network prefix. The stored address always has its host bits cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Subnet {
    network: Ipv4Addr,
    prefix: u8,
}

fn mask_bits(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl Ipv4Subnet {
    pub const DEFAULT_ROUTE: Ipv4Subnet = Ipv4Subnet {
        network: Ipv4Addr::UNSPECIFIED,
        prefix: 0,
    };

    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self, ScenarioError> {
        if prefix > 32 {
            return Err(ScenarioError::invalid(
                "subnet",
                format!("prefix /{prefix} is longer than 32 bits"),
            ));
        }
        let network = Ipv4Addr::from_bits(address.to_bits() & mask_bits(prefix));
        Ok(Self { network, prefix })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix
    }

    pub fn mask(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(mask_bits(self.prefix))
    }

    /// Number of addresses covered, including network and broadcast.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(self.network.to_bits() | !mask_bits(self.prefix))
    }

    pub fn usable_hosts(&self) -> u64 {
        self.size().saturating_sub(2)
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        ip.to_bits() & mask_bits(self.prefix) == self.network.to_bits()
    }

    /// Two prefixes overlap iff one contains the other.
    pub fn overlaps(&self, other: &Ipv4Subnet) -> bool {
        let shorter = self.prefix.min(other.prefix);
        let m = mask_bits(shorter);
        self.network.to_bits() & m == other.network.to_bits() & m
    }

    /// The `n`-th host address (`n = 1` is the first usable one). Network and
    /// broadcast addresses are never returned.
    pub fn host(&self, n: u32) -> Option<Ipv4Addr> {
        if n == 0 || u64::from(n) > self.usable_hosts() {
            return None;
        }
        Some(Ipv4Addr::from_bits(self.network.to_bits() + n))
    }

    /// The block of `size` addresses starting `offset` addresses into this
    /// subnet, if it fits.
    pub(crate) fn carve(&self, offset: u64, prefix: u8) -> Option<Ipv4Subnet> {
        if prefix < self.prefix || prefix > 32 {
            return None;
        }
        let size = 1u64 << (32 - u32::from(prefix));
        if offset % size != 0 || offset + size > self.size() {
            return None;
        }
        let base = u64::from(self.network.to_bits()) + offset;
        let base = u32::try_from(base).ok()?;
        Some(Ipv4Subnet {
            network: Ipv4Addr::from_bits(base),
            prefix,
        })
    }

    /// Shortest prefix whose block holds `addresses` addresses.
    pub(crate) fn prefix_for(addresses: u64) -> u8 {
        let mut prefix = 32u8;
        while prefix > 0 && (1u64 << (32 - u32::from(prefix))) < addresses {
            prefix -= 1;
        }
        prefix
    }
}

impl Display for Ipv4Subnet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Subnet {
    type Err = ScenarioError;

    // Parse ranges in CIDR syntax (e.g. 10.1.1.0/24)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let base: Ipv4Addr = parts
            .next()
            .unwrap_or_default()
            .parse()
            .map_err(|_| ScenarioError::invalid("subnet", format!("`{s}` is not an IPv4 address")))?;

        // A missing network prefix is interpreted as /32 (i.e. singleton ip range)
        let prefix: u8 = parts.next().unwrap_or("32").parse().map_err(|_| {
            ScenarioError::invalid("subnet", format!("`{s}` has an invalid prefix length"))
        })?;

        if parts.next().is_some() {
            return Err(ScenarioError::invalid(
                "subnet",
                format!("`{s}` contains trailing characters"),
            ));
        }

        Ipv4Subnet::new(base, prefix)
    }
}

impl TryFrom<String> for Ipv4Subnet {
    type Error = ScenarioError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Ipv4Subnet> for String {
    fn from(subnet: Ipv4Subnet) -> Self {
        subnet.to_string()
    }
}
