//! # Result Ingester
//!
//! Turns one unit's raw report into host/service observations and merges
//! them into the project. Parsing happens up front and may fail; merging
//! cannot, so a unit is merged entirely or not at all.
//!
//! Merge rules:
//! * Hosts are keyed by IP. Hostname and OS only ever move from unknown to
//!   known or from one known value to another, never back to unknown.
//! * Services are keyed by (port, protocol). Name/version are updated when
//!   they differ; proofs are never touched.

use std::collections::{BTreeSet, HashSet};

use sweepr_common::Result;
use sweepr_common::model::{Project, Service, ServiceKey};
use sweepr_protocols::nmap::{ObservedPort, ScanReport};
use tracing::debug;

use crate::scanner::RawOutput;

#[derive(Debug, Clone, Default)]
pub struct ResultIngester {
    excluded_ports: BTreeSet<u16>,
}

/// What a merge did to the project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub hosts_seen: usize,
    pub hosts_created: usize,
    /// Services created, or whose name/version changed. Order of first
    /// appearance in the report, without duplicates.
    pub changed: Vec<ServiceKey>,
}

impl ResultIngester {
    pub fn new(excluded_ports: BTreeSet<u16>) -> Self {
        Self { excluded_ports }
    }

    pub fn parse(&self, raw: &RawOutput) -> Result<ScanReport> {
        ScanReport::parse(&raw.report)
    }

    /// Merges `report` into `project`, associating every host with
    /// `asset_id`. The caller must hold exclusive access to the project.
    pub fn merge(&self, project: &mut Project, asset_id: Option<u32>, report: &ScanReport) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let mut changed_seen = HashSet::new();

        for observed in &report.hosts {
            outcome.hosts_seen += 1;
            let existed = project.host(&observed.ip).is_some();
            let host = project.upsert_host(observed.ip);
            if !existed {
                outcome.hosts_created += 1;
            }

            if !observed.hostname.is_empty() {
                host.hostname = observed.hostname.clone();
            }
            if !observed.os.is_empty() {
                host.os = observed.os.clone();
            }

            for port in &observed.ports {
                if self.excluded_ports.contains(&port.port) {
                    continue;
                }
                if merge_service(&mut host.services, port) {
                    let key = ServiceKey::new(observed.ip, port.port, port.protocol);
                    if changed_seen.insert(key) {
                        outcome.changed.push(key);
                    }
                }
            }

            let host_id = host.id;
            if let Some(asset_id) = asset_id {
                project.link_host(asset_id, host_id);
            }
        }

        if outcome.hosts_seen > 0 {
            project.touch();
        }
        debug!(
            hosts = outcome.hosts_seen,
            new_hosts = outcome.hosts_created,
            changed = outcome.changed.len(),
            "merged report"
        );
        outcome
    }
}

/// Returns true when the service was created or a non-empty observation
/// changed its name or version.
fn merge_service(services: &mut Vec<Service>, port: &ObservedPort) -> bool {
    match services
        .iter_mut()
        .find(|svc| svc.port == port.port && svc.protocol == port.protocol)
    {
        None => {
            let mut service = Service::new(port.port, port.protocol)
                .with_name(port.name.clone())
                .with_version(port.version.clone());
            service.extrainfo = port.extrainfo.clone();
            services.push(service);
            true
        }
        Some(existing) => {
            // An empty observation never erases what an earlier scan learned.
            let mut changed = false;
            for (known, seen) in [
                (&mut existing.name, &port.name),
                (&mut existing.version, &port.version),
            ] {
                if !seen.is_empty() && *known != *seen {
                    *known = seen.clone();
                    changed = true;
                }
            }
            if !port.extrainfo.is_empty() {
                existing.extrainfo = port.extrainfo.clone();
            }
            changed
        }
    }
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
    use chrono::Utc;
    use sweepr_common::model::{AssetKind, Proof, Protocol};

    fn raw(body: &str) -> RawOutput {
        RawOutput {
            report: format!("<nmaprun>{body}</nmaprun>"),
            ..RawOutput::default()
        }
    }

    fn host(ip: &str, hostname: &str, ports: &str) -> String {
        format!(
            r#"<host><status state="up"/><address addr="{ip}" addrtype="ipv4"/>
               <hostnames><hostname name="{hostname}"/></hostnames>
               <ports>{ports}</ports></host>"#
        )
    }

    fn port(id: u16, name: &str, product: &str) -> String {
        format!(
            r#"<port protocol="tcp" portid="{id}"><state state="open"/>
               <service name="{name}" product="{product}"/></port>"#
        )
    }

    fn ingest(ingester: &ResultIngester, project: &mut Project, body: &str) -> MergeOutcome {
        let report = ingester.parse(&raw(body)).unwrap();
        ingester.merge(project, None, &report)
    }

    #[test]
    fn creates_hosts_and_services() {
        let ingester = ResultIngester::default();
        let mut project = Project::new("acme");
        let body = host("10.0.0.1", "gw", &(port(22, "ssh", "OpenSSH") + &port(80, "http", "nginx")));

        let outcome = ingest(&ingester, &mut project, &body);
        assert_eq!(outcome.hosts_created, 1);
        assert_eq!(outcome.changed.len(), 2);
        assert_eq!(project.hosts[0].hostname, "gw");
        assert_eq!(project.service_count(), 2);
    }

    #[test]
    fn identical_report_twice_changes_nothing() {
        let ingester = ResultIngester::default();
        let mut project = Project::new("acme");
        let body = host("10.0.0.1", "gw", &port(80, "http", "nginx"));

        ingest(&ingester, &mut project, &body);
        let after_first = project.hosts.clone();
        let second = ingest(&ingester, &mut project, &body);

        assert!(second.changed.is_empty());
        assert_eq!(second.hosts_created, 0);
        assert_eq!(project.hosts, after_first);
    }

    #[test]
    fn unknown_values_never_overwrite_known_ones() {
        let ingester = ResultIngester::default();
        let mut project = Project::new("acme");
        ingest(&ingester, &mut project, &host("10.0.0.1", "gw.corp", ""));
        ingest(&ingester, &mut project, &host("10.0.0.1", "", ""));
        assert_eq!(project.hosts[0].hostname, "gw.corp");
    }

    #[test]
    fn blank_service_fields_keep_earlier_identification() {
        let ingester = ResultIngester::default();
        let mut project = Project::new("acme");
        ingest(&ingester, &mut project, &host("10.0.0.1", "gw", &port(80, "http", "nginx")));

        let outcome = ingest(&ingester, &mut project, &host("10.0.0.1", "gw", &port(80, "", "")));
        assert!(outcome.changed.is_empty());
        let service = project.hosts[0].service(80, Protocol::Tcp).unwrap();
        assert_eq!(service.name, "http");
        assert_eq!(service.version, "nginx");
    }

    #[test]
    fn version_change_is_reported_and_proofs_survive() {
        let ingester = ResultIngester::default();
        let mut project = Project::new("acme");
        ingest(&ingester, &mut project, &host("10.0.0.1", "gw", &port(80, "http", "nginx")));

        let key = ServiceKey::new("10.0.0.1".parse().unwrap(), 80, Protocol::Tcp);
        project.append_proof(
            &key,
            Proof {
                tool: "nuclei_web".into(),
                command: "nuclei".into(),
                result_paths: vec![],
                screenshot_path: None,
                completed_at: Utc::now(),
            },
        );

        let outcome = ingest(&ingester, &mut project, &host("10.0.0.1", "gw", &port(80, "http", "Apache")));
        assert_eq!(outcome.changed, vec![key]);
        let service = project.service(&key).unwrap();
        assert_eq!(service.version, "Apache");
        assert_eq!(service.proofs.len(), 1);
    }

    #[test]
    fn excluded_ports_are_not_merged() {
        let ingester = ResultIngester::new([9100].into_iter().collect());
        let mut project = Project::new("acme");
        let outcome = ingest(
            &ingester,
            &mut project,
            &host("10.0.0.1", "", &(port(9100, "jetdirect", "") + &port(80, "http", ""))),
        );
        assert_eq!(outcome.changed.len(), 1);
        assert!(project.hosts[0].service(9100, Protocol::Tcp).is_none());
    }

    #[test]
    fn hosts_are_linked_to_the_asset() {
        let ingester = ResultIngester::default();
        let mut project = Project::new("acme");
        let asset = project.ensure_asset("office", AssetKind::Network, "10.0.0.0/24");
        let report = ingester.parse(&raw(&host("10.0.0.1", "gw", ""))).unwrap();
        ingester.merge(&mut project, Some(asset), &report);
        assert!(project.hosts[0].asset_ids.contains(&asset));
        assert_eq!(project.asset(asset).unwrap().host_ids.len(), 1);
    }

    #[test]
    fn malformed_report_fails_before_merge() {
        let ingester = ResultIngester::default();
        assert!(ingester.parse(&raw("<host>")).is_err());
    }
}
