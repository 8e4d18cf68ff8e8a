use std::{fmt, net::IpAddr, str::FromStr};

use serde::{Deserialize, Serialize};

use super::proof::Proof;
use crate::error::Error;

const HTTPS_PORTS: [u16; 3] = [443, 8443, 4443];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Sctp => "sctp",
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "sctp" => Ok(Self::Sctp),
            other => Err(Error::parse(format!("unknown protocol '{other}'"))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a service inside a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceKey {
    pub ip: IpAddr,
    pub port: u16,
    pub protocol: Protocol,
}

impl ServiceKey {
    pub fn new(ip: IpAddr, port: u16, protocol: Protocol) -> Self {
        Self { ip, port, protocol }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{ip}:{}/{}", self.port, self.protocol),
            IpAddr::V6(ip) => write!(f, "[{ip}]:{}/{}", self.port, self.protocol),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub port: u16,
    pub protocol: Protocol,
    #[serde(default, alias = "service_name")]
    pub name: String,
    #[serde(default, alias = "service_version")]
    pub version: String,
    #[serde(default)]
    pub extrainfo: String,
    #[serde(default, alias = "proof")]
    pub proofs: Vec<Proof>,
}

impl Service {
    pub fn new(port: u16, protocol: Protocol) -> Self {
        Self {
            port,
            protocol,
            name: String::new(),
            version: String::new(),
            extrainfo: String::new(),
            proofs: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn proofs_for<'a>(&'a self, tool: &'a str) -> impl Iterator<Item = &'a Proof> + 'a {
        self.proofs.iter().filter(move |proof| proof.tool == tool)
    }

    pub fn is_https(&self) -> bool {
        HTTPS_PORTS.contains(&self.port) || self.name.to_ascii_lowercase().contains("https")
    }

    pub fn url(&self, ip: &IpAddr) -> String {
        let scheme = if self.is_https() { "https" } else { "http" };
        match ip {
            IpAddr::V4(ip) => format!("{scheme}://{ip}:{}", self.port),
            IpAddr::V6(ip) => format!("{scheme}://[{ip}]:{}", self.port),
        }
    }
}
