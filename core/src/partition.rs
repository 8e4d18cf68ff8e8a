//! # Target Partitioner
//!
//! Cuts a [`TargetExpression`] into [`ScanUnit`]s: one discovery invocation
//! each. Networks are split on subnet boundaries (coarser for light
//! profiles, finer for heavy ones), host lists into fixed-size batches, and
//! exclusions are subtracted before any unit is created.

use std::fmt;
use std::net::IpAddr;

use pnet::ipnetwork::Ipv4Network;
use sweepr_common::config::PartitionConfig;
use sweepr_common::network::range::{self, Ipv4Range};
use sweepr_common::network::target::{HostEntry, TargetExpression, TargetScope};
use sweepr_common::profile::{Granularity, ScanProfile};
use sweepr_common::{Error, Result};
use tracing::debug;
use uuid::Uuid;

/// Namespace for content-derived unit ids.
const UNIT_NAMESPACE: Uuid = Uuid::from_u128(0x5c1e_7a0d_4b2f_4e8a_9d63_0f1b_2c3d_4e5f);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnitTarget {
    Network(Ipv4Network),
    Host(HostEntry),
}

impl UnitTarget {
    pub fn address_count(&self) -> u64 {
        match self {
            Self::Network(net) => Ipv4Range::from_network(*net).len(),
            Self::Host(_) => 1,
        }
    }
}

impl fmt::Display for UnitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Single addresses render without the /32.
            Self::Network(net) if net.prefix() == 32 => write!(f, "{}", net.network()),
            Self::Network(net) => write!(f, "{}/{}", net.network(), net.prefix()),
            Self::Host(entry) => write!(f, "{entry}"),
        }
    }
}

/// One discovery invocation's worth of targets. Immutable once created; the
/// id depends only on the targets, so re-partitioning the same expression
/// yields the same ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanUnit {
    pub id: Uuid,
    pub index: usize,
    pub targets: Vec<UnitTarget>,
}

impl ScanUnit {
    pub fn new(index: usize, targets: Vec<UnitTarget>) -> Self {
        let content = targets
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        Self {
            id: Uuid::new_v5(&UNIT_NAMESPACE, content.as_bytes()),
            index,
            targets,
        }
    }

    pub fn target_args(&self) -> Vec<String> {
        self.targets.iter().map(ToString::to_string).collect()
    }

    pub fn address_count(&self) -> u64 {
        self.targets.iter().map(UnitTarget::address_count).sum()
    }

    /// Every literal IP address covered by the unit. Hostname entries are
    /// not resolved and therefore not included.
    pub fn addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.targets.iter().flat_map(|target| -> Box<dyn Iterator<Item = IpAddr>> {
            match target {
                UnitTarget::Network(net) => Box::new(Ipv4Range::from_network(*net).to_iter()),
                UnitTarget::Host(entry) => Box::new(entry.addr().into_iter()),
            }
        })
    }

    /// Short human label for logs and progress output.
    pub fn label(&self) -> String {
        match self.targets.as_slice() {
            [] => "(empty)".to_string(),
            [only] => only.to_string(),
            [first, .., last] => format!("{first} .. {last} ({} targets)", self.targets.len()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TargetPartitioner {
    config: PartitionConfig,
}

impl TargetPartitioner {
    pub fn new(config: PartitionConfig) -> Self {
        Self { config }
    }

    pub fn prefix_for(&self, profile: &ScanProfile) -> u8 {
        match profile.granularity() {
            Granularity::Coarse => self.config.coarse_prefix,
            Granularity::Fine => self.config.fine_prefix,
        }
    }

    /// Returns disjoint units whose union is the expression's addresses minus
    /// its exclusions, in ascending address (or list) order.
    pub fn partition(&self, expr: &TargetExpression, profile: &ScanProfile) -> Result<Vec<ScanUnit>> {
        let groups: Vec<Vec<UnitTarget>> = match &expr.scope {
            TargetScope::Network(network) => {
                self.split_network(*network, self.prefix_for(profile), expr)
            }
            TargetScope::HostList(entries) => self.batch_hosts(entries, expr),
            TargetScope::Single(entry) => {
                if is_excluded_entry(entry, expr) {
                    Vec::new()
                } else {
                    vec![vec![UnitTarget::Host(entry.clone())]]
                }
            }
        };

        let units: Vec<ScanUnit> = groups
            .into_iter()
            .filter(|group| !group.is_empty())
            .enumerate()
            .map(|(index, targets)| ScanUnit::new(index, targets))
            .collect();

        if units.is_empty() {
            return Err(Error::config(
                "target resolves to zero addresses after exclusions",
            ));
        }
        debug!(units = units.len(), profile = %profile, "partitioned target");
        Ok(units)
    }

    fn split_network(
        &self,
        network: Ipv4Network,
        prefix: u8,
        expr: &TargetExpression,
    ) -> Vec<Vec<UnitTarget>> {
        let holes = expr.excluded_v4_ranges();

        range::split_network(network, prefix)
            .into_iter()
            .map(|chunk| {
                let whole = Ipv4Range::from_network(chunk);
                let left = whole.subtract(&holes);
                if left.as_slice() == [whole] {
                    return vec![UnitTarget::Network(chunk)];
                }
                left.iter()
                    .flat_map(Ipv4Range::to_cidrs)
                    .map(UnitTarget::Network)
                    .collect()
            })
            .collect()
    }

    fn batch_hosts(&self, entries: &[HostEntry], expr: &TargetExpression) -> Vec<Vec<UnitTarget>> {
        let kept: Vec<UnitTarget> = entries
            .iter()
            .filter(|entry| !is_excluded_entry(entry, expr))
            .cloned()
            .map(UnitTarget::Host)
            .collect();

        kept.chunks(self.config.host_batch_size.max(1))
            .map(<[UnitTarget]>::to_vec)
            .collect()
    }
}

fn is_excluded_entry(entry: &HostEntry, expr: &TargetExpression) -> bool {
    entry.addr().is_some_and(|ip| expr.is_excluded(&ip))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn partitioner() -> TargetPartitioner {
        TargetPartitioner::default()
    }

    fn expr(s: &str) -> TargetExpression {
        s.parse().unwrap()
    }

    #[test]
    fn slash_23_splits_into_two_coarse_units() {
        let units = partitioner()
            .partition(&expr("10.0.0.0/23"), &ScanProfile::Top100)
            .unwrap();
        let labels: Vec<String> = units.iter().map(ScanUnit::label).collect();
        assert_eq!(labels, vec!["10.0.0.0/24", "10.0.1.0/24"]);
    }

    #[test]
    fn heavy_profiles_use_fine_units() {
        let units = partitioner()
            .partition(&expr("10.0.0.0/24"), &ScanProfile::AllPorts)
            .unwrap();
        assert_eq!(units.len(), 8);
        assert!(units.iter().all(|u| u.address_count() == 32));
    }

    #[test]
    fn small_network_is_one_unit() {
        let units = partitioner()
            .partition(&expr("192.168.1.0/28"), &ScanProfile::Ping)
            .unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].address_count(), 16);
    }

    #[test]
    fn exclusions_are_subtracted_and_units_stay_disjoint() {
        let target = expr("10.0.0.0/23")
            .with_excluded_addrs("10.0.0.0/24, 10.0.1.7")
            .unwrap();
        let units = partitioner().partition(&target, &ScanProfile::Top100).unwrap();
        assert_eq!(units.len(), 1);

        let addrs: Vec<IpAddr> = units.iter().flat_map(|u| u.addresses()).collect();
        let unique: HashSet<IpAddr> = addrs.iter().copied().collect();
        assert_eq!(addrs.len(), 255);
        assert_eq!(unique.len(), 255);
        assert!(!unique.contains(&"10.0.1.7".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn host_lists_are_batched() {
        let list = (1..=250)
            .map(|i| format!("10.1.{}.{}", i / 200, i % 200 + 1))
            .collect::<Vec<_>>()
            .join(",");
        let units = partitioner().partition(&expr(&list), &ScanProfile::Top100).unwrap();
        let sizes: Vec<usize> = units.iter().map(|u| u.targets.len()).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[test]
    fn single_host_is_exactly_one_unit() {
        let units = partitioner()
            .partition(&expr("web01.corp.local"), &ScanProfile::HttpPorts)
            .unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].label(), "web01.corp.local");
    }

    #[test]
    fn everything_excluded_is_a_configuration_error() {
        let target = expr("10.0.0.5").with_excluded_addrs("10.0.0.0/24").unwrap();
        let err = partitioner().partition(&target, &ScanProfile::Ping).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn unit_ids_are_content_derived() {
        let a = partitioner()
            .partition(&expr("10.0.0.0/23"), &ScanProfile::Top100)
            .unwrap();
        let b = partitioner()
            .partition(&expr("10.0.0.0/23"), &ScanProfile::Ping)
            .unwrap();
        assert_eq!(a[0].id, b[0].id);
        assert_ne!(a[0].id, a[1].id);
    }
}
