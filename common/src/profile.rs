//! Scan profiles understood by the discovery program.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const HTTP_PORTS: &str = "80,443,593,808,3000,4443,5800,5801,7443,7627,8000,8003,8008,8080,8443,8888";
pub const NETSEC_KNOWN_PORTS: &str =
    "21,22,23,25,53,80,110,111,135,139,143,443,445,993,995,1723,3306,3389,5900,8080";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScanProfile {
    /// Host discovery only, no port scan.
    Ping,
    Top100,
    Top1000,
    HttpPorts,
    NetsecKnown,
    AllPorts,
    /// Caller-supplied port specification, e.g. `22,80,8000-8100`.
    Custom(String),
}

/// How finely a network target is cut into scan units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Coarse,
    Fine,
}

impl ScanProfile {
    /// Per-host cost grows with the number of probed ports, so heavy
    /// profiles get smaller units.
    pub fn granularity(&self) -> Granularity {
        match self {
            Self::AllPorts | Self::Top1000 => Granularity::Fine,
            _ => Granularity::Coarse,
        }
    }

    pub fn is_discovery_only(&self) -> bool {
        matches!(self, Self::Ping)
    }

    pub fn name(&self) -> String {
        match self {
            Self::Ping => "ping".into(),
            Self::Top100 => "top100".into(),
            Self::Top1000 => "top1000".into(),
            Self::HttpPorts => "http_ports".into(),
            Self::NetsecKnown => "netsec_known".into(),
            Self::AllPorts => "all_ports".into(),
            Self::Custom(ports) => format!("custom:{ports}"),
        }
    }
}

impl FromStr for ScanProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(ports) = s.strip_prefix("custom:") {
            return parse_custom_ports(ports).map(Self::Custom);
        }

        match s.to_ascii_lowercase().as_str() {
            "ping" | "discovery" => Ok(Self::Ping),
            "top100" => Ok(Self::Top100),
            "top1000" => Ok(Self::Top1000),
            "http_ports" => Ok(Self::HttpPorts),
            "netsec_known" => Ok(Self::NetsecKnown),
            "all_ports" | "full" => Ok(Self::AllPorts),
            other => Err(Error::config(format!("unknown scan profile '{other}'"))),
        }
    }
}

fn parse_custom_ports(spec: &str) -> Result<String, Error> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(Error::config("custom scan profile needs a port list"));
    }
    for part in spec.split(',') {
        let valid = match part.split_once('-') {
            Some((lo, hi)) => matches!(
                (lo.trim().parse::<u16>(), hi.trim().parse::<u16>()),
                (Ok(lo), Ok(hi)) if lo > 0 && lo <= hi
            ),
            None => matches!(part.trim().parse::<u16>(), Ok(p) if p > 0),
        };
        if !valid {
            return Err(Error::config(format!("invalid port specification '{part}'")));
        }
    }
    Ok(spec.replace(' ', ""))
}

impl TryFrom<String> for ScanProfile {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScanProfile> for String {
    fn from(profile: ScanProfile) -> Self {
        profile.name()
    }
}

impl fmt::Display for ScanProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
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
