use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};

use sweepr_common::config::PartitionConfig;
use sweepr_common::network::target::TargetExpression;
use sweepr_common::profile::ScanProfile;
use sweepr_core::partition::TargetPartitioner;

fn expected(expr: &TargetExpression, candidates: impl Iterator<Item = IpAddr>) -> BTreeSet<IpAddr> {
    candidates.filter(|ip| !expr.is_excluded(ip)).collect()
}

fn v4_span(first: [u8; 4], count: u32) -> impl Iterator<Item = IpAddr> {
    let start = u32::from(Ipv4Addr::from(first));
    (start..start + count).map(|n| IpAddr::V4(Ipv4Addr::from(n)))
}

/// Units cover exactly the target minus exclusions, and no address is
/// scanned twice.
fn assert_complete(expr: &TargetExpression, profile: &ScanProfile, want: BTreeSet<IpAddr>) {
    let units = TargetPartitioner::new(PartitionConfig::default())
        .partition(expr, profile)
        .unwrap();

    let mut seen = BTreeSet::new();
    for unit in &units {
        for ip in unit.addresses() {
            assert!(seen.insert(ip), "{ip} appears in more than one unit");
        }
    }
    assert_eq!(seen, want);
}

#[test]
fn network_with_holes_is_covered_exactly() {
    let expr: TargetExpression = "10.0.0.0/22".parse().unwrap();
    let expr = expr
        .with_excluded_addrs("10.0.1.0/25, 10.0.2.7, 10.0.3.255")
        .unwrap();
    let want = expected(&expr, v4_span([10, 0, 0, 0], 1024));
    assert_eq!(want.len(), 1024 - 128 - 2);

    assert_complete(&expr, &ScanProfile::Top100, want.clone());
    assert_complete(&expr, &ScanProfile::AllPorts, want);
}

#[test]
fn host_list_with_ranges_is_covered_exactly() {
    let expr: TargetExpression = "10.0.0.1-150, 10.0.5.9, 10.0.0.20".parse().unwrap();
    let expr = expr.with_excluded_addrs("10.0.0.10/31").unwrap();

    let mut want = expected(&expr, v4_span([10, 0, 0, 1], 150));
    want.insert("10.0.5.9".parse().unwrap());
    assert_eq!(want.len(), 149);

    assert_complete(&expr, &ScanProfile::Top100, want);
}

#[test]
fn slash_23_splits_into_two_coarse_units() {
    let expr: TargetExpression = "10.0.0.0/23".parse().unwrap();
    let units = TargetPartitioner::new(PartitionConfig::default())
        .partition(&expr, &ScanProfile::Top100)
        .unwrap();
    let labels: Vec<String> = units.iter().map(|u| u.label()).collect();
    assert_eq!(labels, ["10.0.0.0/24", "10.0.1.0/24"]);
}

#[test]
fn fully_excluded_target_is_rejected() {
    let expr: TargetExpression = "10.0.0.0/24".parse().unwrap();
    let expr = expr.with_excluded_addrs("10.0.0.0/23").unwrap();
    assert!(
        TargetPartitioner::new(PartitionConfig::default())
            .partition(&expr, &ScanProfile::Top100)
            .is_err()
    );
}
