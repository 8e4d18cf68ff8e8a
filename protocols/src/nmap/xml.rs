//! Reader for nmap's `-oX` report.
//!
//! Only what the project model stores is extracted: hosts that are up, their
//! first hostname and OS match, and open ports with service fingerprints.

use std::net::IpAddr;

use roxmltree::{Document, Node, ParsingOptions};
use sweepr_common::model::Protocol;
use sweepr_common::{Error, Result};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub hosts: Vec<ObservedHost>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedHost {
    pub ip: IpAddr,
    pub hostname: String,
    pub os: String,
    pub ports: Vec<ObservedPort>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedPort {
    pub port: u16,
    pub protocol: Protocol,
    pub name: String,
    /// `product` and `version` joined.
    pub version: String,
    pub extrainfo: String,
}

impl ScanReport {
    pub fn parse(xml: &str) -> Result<Self> {
        // nmap writes `<!DOCTYPE nmaprun>` at the top of every report.
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let doc = Document::parse_with_options(xml, options)
            .map_err(|e| Error::parse(format!("invalid XML: {e}")))?;
        let root = doc.root_element();
        if !root.has_tag_name("nmaprun") {
            return Err(Error::parse(format!(
                "expected <nmaprun> root, found <{}>",
                root.tag_name().name()
            )));
        }

        let mut hosts = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("host")) {
            if let Some(host) = parse_host(node)? {
                hosts.push(host);
            }
        }
        Ok(Self { hosts })
    }

    pub fn open_port_count(&self) -> usize {
        self.hosts.iter().map(|host| host.ports.len()).sum()
    }
}

fn parse_host(node: Node<'_, '_>) -> Result<Option<ObservedHost>> {
    let up = child(node, "status").and_then(|s| s.attribute("state")) == Some("up");
    if !up {
        return Ok(None);
    }

    let Some(ip) = host_address(node)? else {
        debug!("skipping host entry without an IP address");
        return Ok(None);
    };

    let hostname = child(node, "hostnames")
        .and_then(|h| child(h, "hostname"))
        .and_then(|h| h.attribute("name"))
        .unwrap_or_default()
        .to_string();

    let os = child(node, "os")
        .and_then(|o| child(o, "osmatch"))
        .and_then(|m| m.attribute("name"))
        .unwrap_or_default()
        .to_string();

    let mut ports = Vec::new();
    if let Some(list) = child(node, "ports") {
        for port in list.children().filter(|n| n.has_tag_name("port")) {
            if let Some(observed) = parse_port(port)? {
                ports.push(observed);
            }
        }
    }

    Ok(Some(ObservedHost {
        ip,
        hostname,
        os,
        ports,
    }))
}

/// IPv4 wins over IPv6 when both are reported; MAC entries are ignored.
fn host_address(node: Node<'_, '_>) -> Result<Option<IpAddr>> {
    let mut v6 = None;
    for addr in node.children().filter(|n| n.has_tag_name("address")) {
        let kind = addr.attribute("addrtype").unwrap_or("ipv4");
        if kind != "ipv4" && kind != "ipv6" {
            continue;
        }
        let raw = addr
            .attribute("addr")
            .ok_or_else(|| Error::parse("<address> without addr attribute"))?;
        let ip: IpAddr = raw
            .parse()
            .map_err(|_| Error::parse(format!("invalid host address '{raw}'")))?;
        if kind == "ipv4" {
            return Ok(Some(ip));
        }
        v6.get_or_insert(ip);
    }
    Ok(v6)
}

fn parse_port(node: Node<'_, '_>) -> Result<Option<ObservedPort>> {
    let raw_id = node
        .attribute("portid")
        .ok_or_else(|| Error::parse("<port> without portid"))?;
    let port: u16 = raw_id
        .parse()
        .map_err(|_| Error::parse(format!("invalid portid '{raw_id}'")))?;

    let open = child(node, "state").and_then(|s| s.attribute("state")) == Some("open");
    if port == 0 || !open {
        return Ok(None);
    }

    let raw_proto = node.attribute("protocol").unwrap_or("tcp");
    let Ok(protocol) = raw_proto.parse::<Protocol>() else {
        debug!(port, protocol = raw_proto, "skipping port with unsupported protocol");
        return Ok(None);
    };

    let service = child(node, "service");
    let attr = |name: &str| {
        service
            .and_then(|s| s.attribute(name))
            .unwrap_or_default()
            .to_string()
    };
    let version = format!("{} {}", attr("product"), attr("version"))
        .trim()
        .to_string();

    Ok(Some(ObservedPort {
        port,
        protocol,
        name: attr("name"),
        version,
        extrainfo: attr("extrainfo"),
    }))
}

fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
