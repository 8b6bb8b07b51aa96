//! 地址规划
//!
//! Allocates one subnet per wired link from a per-category base range. The
//! walk is in link declaration order with one cursor per category, so the
//! same fabric always yields the same plan.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use tracing::{debug, info};

use super::topology::Topology;
use super::trace::SetupStep;
use crate::error::{Result, ScenarioError};
use crate::net::{Ipv4Subnet, LinkCategory, LinkId, Route, RouteOrigin};

/// Base range and natural prefix for one link category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryRange {
    pub category: LinkCategory,
    pub range: Ipv4Subnet,
    /// Prefix a link of this category gets unless it needs a bigger block.
    pub natural_prefix: u8,
}

#[derive(Debug, Clone, Default)]
pub struct AddressPolicy {
    pub ranges: Vec<CategoryRange>,
    /// Ranges owned by someone else (the subscriber pool). Never allocated.
    pub reserved: Vec<Ipv4Subnet>,
}

fn subnet(a: u8, b: u8, c: u8, d: u8, prefix: u8) -> Result<Ipv4Subnet> {
    Ipv4Subnet::new(Ipv4Addr::new(a, b, c, d), prefix)
}

impl AddressPolicy {
    /// The city plan: district `k` gets `10.1.k.0/24`, gateway trunks are
    /// carved as `/30`s out of `10.255.0.0/24`, and the anchor trunk uses
    /// `10.255.100.0/30`.
    pub fn city(districts: u8, reserved: Vec<Ipv4Subnet>) -> Result<Self> {
        let mut ranges = Vec::with_capacity(usize::from(districts) + 2);
        for k in 1..=districts {
            ranges.push(CategoryRange {
                category: LinkCategory::DistrictLan(k),
                range: subnet(10, 1, k, 0, 24)?,
                natural_prefix: 24,
            });
        }
        ranges.push(CategoryRange {
            category: LinkCategory::CoreTrunk,
            range: subnet(10, 255, 0, 0, 24)?,
            natural_prefix: 30,
        });
        ranges.push(CategoryRange {
            category: LinkCategory::AnchorTrunk,
            range: subnet(10, 255, 100, 0, 30)?,
            natural_prefix: 30,
        });
        Ok(Self { ranges, reserved })
    }

    pub fn range_for(&self, category: LinkCategory) -> Option<&CategoryRange> {
        self.ranges.iter().find(|r| r.category == category)
    }

    /// Category ranges must be pairwise disjoint and must not touch any
    /// reserved range.
    pub fn validate(&self) -> Result<()> {
        for (i, a) in self.ranges.iter().enumerate() {
            if a.natural_prefix < a.range.prefix_len() || a.natural_prefix > 30 {
                return Err(ScenarioError::invalid(
                    "natural_prefix",
                    format!("/{} does not fit inside {}", a.natural_prefix, a.range),
                ));
            }
            for b in &self.ranges[i + 1..] {
                if a.range.overlaps(&b.range) {
                    return Err(ScenarioError::AddressConflict {
                        a: a.range,
                        b: b.range,
                    });
                }
            }
            for r in &self.reserved {
                if a.range.overlaps(r) {
                    return Err(ScenarioError::AddressConflict { a: a.range, b: *r });
                }
            }
        }
        Ok(())
    }
}

/// Link → subnet mapping plus the ranges it must stay clear of.
#[derive(Debug, Clone, Default)]
pub struct AddressPlan {
    assignments: Vec<(LinkId, Ipv4Subnet)>,
    reserved: Vec<Ipv4Subnet>,
}

impl AddressPlan {
    pub fn subnet_of(&self, link: LinkId) -> Option<Ipv4Subnet> {
        self.assignments
            .iter()
            .find(|(l, _)| *l == link)
            .map(|(_, s)| *s)
    }

    /// Assignments in allocation order.
    pub fn assignments(&self) -> &[(LinkId, Ipv4Subnet)] {
        &self.assignments
    }

    pub fn reserved(&self) -> &[Ipv4Subnet] {
        &self.reserved
    }

    /// First overlapping pair among the assigned and reserved subnets.
    pub fn first_conflict(&self) -> Option<(Ipv4Subnet, Ipv4Subnet)> {
        let all: Vec<Ipv4Subnet> = self
            .assignments
            .iter()
            .map(|(_, s)| *s)
            .chain(self.reserved.iter().copied())
            .collect();
        for (i, a) in all.iter().enumerate() {
            if let Some(b) = all[i + 1..].iter().find(|b| a.overlaps(b)) {
                return Some((*a, *b));
            }
        }
        None
    }

    pub(crate) fn reserve(&mut self, range: Ipv4Subnet) {
        if !self.reserved.contains(&range) {
            self.reserved.push(range);
        }
    }
}

/// Assign subnets, interface addresses and connected routes to every wired
/// link of `topo`.
#[tracing::instrument(skip_all, fields(links = topo.links().len()))]
pub fn allocate(topo: &mut Topology, policy: &AddressPolicy) -> Result<()> {
    policy.validate()?;

    let mut cursors: HashMap<LinkCategory, u64> = HashMap::new();
    let link_ids: Vec<LinkId> = topo
        .links()
        .iter()
        .filter(|l| l.is_wired())
        .map(|l| l.id)
        .collect();

    for id in link_ids {
        let Some(link) = topo.link(id) else {
            return Err(ScenarioError::invalid("link", format!("{id} vanished")));
        };
        let name = link.name.clone();
        let attachments = link.attachments.clone();
        let range = policy
            .range_for(link.category)
            .ok_or_else(|| ScenarioError::NoAddressRange(name.clone()))?;

        let natural = 1u64 << (32 - u32::from(range.natural_prefix));
        let needed = (attachments.len() as u64 + 2).next_power_of_two();
        let prefix = Ipv4Subnet::prefix_for(natural.max(needed));
        let size = 1u64 << (32 - u32::from(prefix));

        let cursor = cursors.entry(range.category).or_insert(0);
        let offset = cursor.div_ceil(size) * size;
        let subnet = range
            .range
            .carve(offset, prefix)
            .ok_or(ScenarioError::AddressExhausted {
                range: range.range,
                link: name.clone(),
            })?;
        *cursor = offset + size;

        for (i, att) in attachments.iter().enumerate() {
            let n = u32::try_from(i + 1).unwrap_or(u32::MAX);
            let address = subnet.host(n).ok_or(ScenarioError::AddressExhausted {
                range: subnet,
                link: name.clone(),
            })?;
            topo.node_mut(att.node)?.assign(att.interface, address, subnet);
            topo.routing_table_mut(att.node)?.add(Route {
                destination: subnet,
                next_hop: None,
                interface: att.interface,
                origin: RouteOrigin::Connected,
            });
        }

        if let Some(link) = topo.link_mut(id) {
            link.subnet = Some(subnet);
        }
        topo.plan_mut().assignments.push((id, subnet));
        debug!(link = %id, %name, %subnet, "📐 subnet assigned");
        topo.record(SetupStep::SubnetAssigned {
            link: id,
            name,
            subnet,
        });
    }

    for r in &policy.reserved {
        topo.plan_mut().reserve(*r);
    }
    info!(subnets = topo.plan().assignments().len(), "✅ address plan allocated");
    Ok(())
}
