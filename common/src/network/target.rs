//! # Target Expression Model
//!
//! Defines what a scan batch is pointed at:
//! * A CIDR block (e.g., `10.0.0.0/23`).
//! * A comma-separated host list (IPs, hostnames, `a.b.c.d-e` ranges).
//! * A file with one host per line.
//! * A single host.
//!
//! Exclusions (addresses/networks and ports) travel with the expression and
//! are applied by the partitioner.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::str::FromStr;

use pnet::ipnetwork::{IpNetwork, Ipv4Network};

use crate::error::{Error, Result};
use crate::network::range::{self, Ipv4Range};

/// One entry of a host list.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostEntry {
    Addr(IpAddr),
    Name(String),
}

impl HostEntry {
    pub fn addr(&self) -> Option<IpAddr> {
        match self {
            Self::Addr(ip) => Some(*ip),
            Self::Name(_) => None,
        }
    }
}

impl fmt::Display for HostEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Addr(ip) => write!(f, "{ip}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// What the batch scans, before exclusions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetScope {
    Network(Ipv4Network),
    HostList(Vec<HostEntry>),
    Single(HostEntry),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetExpression {
    pub scope: TargetScope,
    pub excluded_addrs: Vec<IpNetwork>,
    pub excluded_ports: BTreeSet<u16>,
}

impl TargetExpression {
    pub fn new(scope: TargetScope) -> Self {
        Self {
            scope,
            excluded_addrs: Vec::new(),
            excluded_ports: BTreeSet::new(),
        }
    }

    /// Reads a host list from a file: one entry per line, blank lines and
    /// `#` comments ignored.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut entries = Vec::new();
        for line in raw.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            entries.extend(parse_list_entry(line)?);
        }
        if entries.is_empty() {
            return Err(Error::config(format!(
                "host file {} contains no targets",
                path.display()
            )));
        }
        Ok(Self::new(TargetScope::HostList(dedup(entries))))
    }

    /// Parses a comma-separated list of IPs/CIDRs to exclude.
    pub fn with_excluded_addrs(mut self, spec: &str) -> Result<Self> {
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let net = part
                .parse::<IpNetwork>()
                .map_err(|e| Error::config(format!("invalid exclusion '{part}': {e}")))?;
            self.excluded_addrs.push(net);
        }
        Ok(self)
    }

    /// Parses a comma-separated list of ports to exclude.
    pub fn with_excluded_ports(mut self, spec: &str) -> Result<Self> {
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.parse::<u16>() {
                Ok(port) if port > 0 => {
                    self.excluded_ports.insert(port);
                }
                _ => return Err(Error::config(format!("invalid excluded port '{part}'"))),
            }
        }
        Ok(self)
    }

    pub fn is_excluded(&self, ip: &IpAddr) -> bool {
        self.excluded_addrs.iter().any(|net| net.contains(*ip))
    }

    /// Excluded IPv4 networks as address intervals.
    pub fn excluded_v4_ranges(&self) -> Vec<Ipv4Range> {
        self.excluded_addrs
            .iter()
            .filter_map(|net| match net {
                IpNetwork::V4(v4) => Some(Ipv4Range::from_network(*v4)),
                IpNetwork::V6(_) => None,
            })
            .collect()
    }
}

impl FromStr for TargetExpression {
    type Err = Error;

    /// Supported formats:
    /// * **CIDR**: "Network/Prefix" (e.g., "10.0.0.0/23").
    /// * **List**: "10.0.0.1, web01.corp, 10.0.0.20-30".
    /// * **Single**: "10.0.0.1", "::1" or a hostname.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::config("empty target expression"));
        }

        if s.contains(',') {
            return parse_commas(s).map(Self::new);
        }

        if let Some(network) = parse_cidr(s)? {
            return Ok(Self::new(TargetScope::Network(network)));
        }

        let mut entries = parse_list_entry(s)?;
        let scope = if entries.len() == 1 {
            TargetScope::Single(entries.remove(0))
        } else {
            TargetScope::HostList(entries)
        };
        Ok(Self::new(scope))
    }
}

/// Parses a comma-separated list of targets (e.g., "192.168.1.5, 10.0.0.1-50").
fn parse_commas(s: &str) -> Result<TargetScope> {
    let mut entries = Vec::new();

    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        entries.extend(parse_list_entry(part)?);
    }

    if entries.is_empty() {
        return Err(Error::config(format!("no targets in '{s}'")));
    }
    Ok(TargetScope::HostList(dedup(entries)))
}

fn dedup(entries: Vec<HostEntry>) -> Vec<HostEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.clone()))
        .collect()
}

/// One list element: an address, an IPv4 range, or a hostname.
fn parse_list_entry(s: &str) -> Result<Vec<HostEntry>> {
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Ok(vec![HostEntry::Addr(ip)]);
    }

    if let Some(range) = parse_ip_range(s)? {
        return Ok(range.to_iter().map(HostEntry::Addr).collect());
    }

    if s.contains('/') {
        return Err(Error::config(format!(
            "CIDR '{s}' cannot be mixed into a host list"
        )));
    }

    if is_hostname(s) {
        return Ok(vec![HostEntry::Name(s.to_ascii_lowercase())]);
    }

    Err(Error::config(format!("invalid target: {s}")))
}

fn is_hostname(s: &str) -> bool {
    s.len() <= 253
        && s.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
        && s.chars().any(|c| c.is_ascii_alphabetic())
}

/// Parses a range string like "1.1.1.1-2.2.2.2" or "1.1.1.1-50".
fn parse_ip_range(s: &str) -> Result<Option<Ipv4Range>> {
    let Some((start_str, end_str)) = s.split_once('-') else {
        return Ok(None);
    };

    let Ok(start_addr) = start_str.trim().parse::<Ipv4Addr>() else {
        return Ok(None);
    };

    let end_addr = parse_range_end_addr(end_str.trim(), &start_addr, s)?;
    if end_addr < start_addr {
        return Err(Error::config(format!("range '{s}' ends before it starts")));
    }

    Ok(Some(Ipv4Range::new(start_addr, end_addr)))
}

/// Helper to parse the end address of a range.
///
/// Handles abbreviated forms like "192.168.1.1-50" (implies 192.168.1.50)
/// and full forms like "192.168.1.1-192.168.1.255".
fn parse_range_end_addr(end_str: &str, start_addr: &Ipv4Addr, original_s: &str) -> Result<Ipv4Addr> {
    if let Ok(full_addr) = end_str.parse::<Ipv4Addr>() {
        return Ok(full_addr);
    }

    if end_str.is_empty() {
        return Err(Error::config(format!("End range cannot be empty: {original_s}")));
    }

    let mut end_octets = start_addr.octets();
    let partial_octets: Vec<u8> = end_str
        .split('.')
        .map(|octet_str| octet_str.parse::<u8>())
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|e| Error::config(format!("Invalid end range '{end_str}': {e}")))?;

    if partial_octets.len() > 4 {
        return Err(Error::config(format!("End range has too many octets: {end_str}")));
    }

    let start_index = 4 - partial_octets.len();
    end_octets[start_index..].copy_from_slice(&partial_octets);

    Ok(Ipv4Addr::from(end_octets))
}

/// Parses CIDR notation like "192.168.1.0/24".
fn parse_cidr(s: &str) -> Result<Option<Ipv4Network>> {
    let Some((ip_str, prefix_str)) = s.split_once('/') else {
        return Ok(None);
    };

    let ipv4_addr = ip_str
        .parse::<Ipv4Addr>()
        .map_err(|e| Error::config(format!("Invalid IP in CIDR '{ip_str}': {e}")))?;

    let prefix = prefix_str
        .parse::<u8>()
        .map_err(|e| Error::config(format!("Invalid prefix in CIDR '{prefix_str}': {e}")))?;

    let range = range::cidr_range(ipv4_addr, prefix)?;
    let network = Ipv4Network::new(range.start_addr, prefix)
        .map_err(|e| Error::config(format!("invalid CIDR '{s}': {e}")))?;
    Ok(Some(network))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
