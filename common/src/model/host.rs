use std::{collections::BTreeSet, net::IpAddr};

use serde::{Deserialize, Serialize};

use super::service::{Protocol, Service};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    #[serde(alias = "host_id")]
    pub id: u32,
    pub ip: IpAddr,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub os: String,
    #[serde(default, alias = "assets")]
    pub asset_ids: BTreeSet<u32>,
    #[serde(default)]
    pub services: Vec<Service>,
    /// Ids of the project findings recorded against this host.
    #[serde(default)]
    pub findings: Vec<String>,
}

impl Host {
    pub fn new(id: u32, ip: IpAddr) -> Self {
        Self {
            id,
            ip,
            hostname: String::new(),
            os: String::new(),
            asset_ids: BTreeSet::new(),
            services: Vec::new(),
            findings: Vec::new(),
        }
    }

    pub fn service(&self, port: u16, protocol: Protocol) -> Option<&Service> {
        self.services
            .iter()
            .find(|svc| svc.port == port && svc.protocol == protocol)
    }

    pub fn service_mut(&mut self, port: u16, protocol: Protocol) -> Option<&mut Service> {
        self.services
            .iter_mut()
            .find(|svc| svc.port == port && svc.protocol == protocol)
    }
}
