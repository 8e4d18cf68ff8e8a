use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::asset::{Asset, AssetKind};
use super::finding::Finding;
use super::host::Host;
use super::proof::Proof;
use super::service::{Service, ServiceKey};

/// The persistent aggregate everything is merged into: assets, hosts,
/// services and the proofs attached to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(alias = "project_id")]
    pub id: Uuid,
    #[serde(alias = "project_name")]
    pub name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(rename = "modified_ts", with = "chrono::serde::ts_seconds")]
    pub modified_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            assets: Vec::new(),
            hosts: Vec::new(),
            findings: Vec::new(),
            modified_at: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }

    /// Returns the asset recorded for `target`, creating it if this is the
    /// first batch aimed there.
    pub fn ensure_asset(&mut self, name: &str, kind: AssetKind, target: &str) -> u32 {
        if let Some(asset) = self
            .assets
            .iter()
            .find(|asset| asset.kind == kind && asset.target == target)
        {
            return asset.id;
        }
        let id = self.assets.iter().map(|asset| asset.id).max().unwrap_or(0) + 1;
        self.assets.push(Asset {
            id,
            name: name.to_string(),
            kind,
            target: target.to_string(),
            host_ids: Default::default(),
        });
        id
    }

    pub fn asset(&self, id: u32) -> Option<&Asset> {
        self.assets.iter().find(|asset| asset.id == id)
    }

    pub fn host(&self, ip: &IpAddr) -> Option<&Host> {
        self.hosts.iter().find(|host| host.ip == *ip)
    }

    pub fn host_mut(&mut self, ip: &IpAddr) -> Option<&mut Host> {
        self.hosts.iter_mut().find(|host| host.ip == *ip)
    }

    /// Returns the host for `ip`, creating an empty one if absent.
    pub fn upsert_host(&mut self, ip: IpAddr) -> &mut Host {
        let idx = match self.hosts.iter().position(|host| host.ip == ip) {
            Some(idx) => idx,
            None => {
                let id = self.hosts.iter().map(|host| host.id).max().unwrap_or(0) + 1;
                self.hosts.push(Host::new(id, ip));
                self.hosts.len() - 1
            }
        };
        &mut self.hosts[idx]
    }

    /// Records `host_id` under `asset_id` on both sides of the relation.
    pub fn link_host(&mut self, asset_id: u32, host_id: u32) {
        if let Some(asset) = self.assets.iter_mut().find(|asset| asset.id == asset_id) {
            asset.host_ids.insert(host_id);
        }
        if let Some(host) = self.hosts.iter_mut().find(|host| host.id == host_id) {
            host.asset_ids.insert(asset_id);
        }
    }

    pub fn service(&self, key: &ServiceKey) -> Option<&Service> {
        self.host(&key.ip)?.service(key.port, key.protocol)
    }

    pub fn service_mut(&mut self, key: &ServiceKey) -> Option<&mut Service> {
        self.host_mut(&key.ip)?.service_mut(key.port, key.protocol)
    }

    /// Every service in the project, in host then port order of insertion.
    pub fn service_keys(&self) -> Vec<ServiceKey> {
        self.hosts
            .iter()
            .flat_map(|host| {
                host.services
                    .iter()
                    .map(move |svc| ServiceKey::new(host.ip, svc.port, svc.protocol))
            })
            .collect()
    }

    /// Appends `proof` to the service at `key`. Returns false if the service
    /// no longer exists.
    pub fn append_proof(&mut self, key: &ServiceKey, proof: Proof) -> bool {
        match self.service_mut(key) {
            Some(service) => {
                service.proofs.push(proof);
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Records `finding` and lists its id on the host it names. Returns
    /// false, leaving the project untouched, if that host is unknown.
    pub fn add_finding(&mut self, finding: Finding) -> bool {
        let Some(host) = self.hosts.iter_mut().find(|host| host.id == finding.host_id) else {
            return false;
        };
        if !host.findings.contains(&finding.id) {
            host.findings.push(finding.id.clone());
        }
        self.findings.push(finding);
        self.touch();
        true
    }

    pub fn service_count(&self) -> usize {
        self.hosts.iter().map(|host| host.services.len()).sum()
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
