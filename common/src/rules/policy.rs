use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_RERUN_DAYS: u32 = 2;

/// Whether a rule fires again against a service that already carries proof
/// from the same tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RerunPolicy {
    Always,
    Never,
    OlderThanDays(u32),
}

impl Default for RerunPolicy {
    fn default() -> Self {
        Self::OlderThanDays(DEFAULT_RERUN_DAYS)
    }
}

impl FromStr for RerunPolicy {
    type Err = Error;

    /// `"Y"` always reruns, `"N"` never does, a positive day count reruns
    /// once the newest proof is older than that many days.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_uppercase().as_str() {
            "Y" => Ok(Self::Always),
            "N" => Ok(Self::Never),
            _ => match s.parse::<u32>() {
                Ok(days) if days > 0 => Ok(Self::OlderThanDays(days)),
                _ => Err(Error::config(format!(
                    "invalid rerun policy '{s}': expected Y, N or a positive number of days"
                ))),
            },
        }
    }
}

impl TryFrom<String> for RerunPolicy {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RerunPolicy> for String {
    fn from(policy: RerunPolicy) -> Self {
        policy.to_string()
    }
}

impl fmt::Display for RerunPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Y"),
            Self::Never => f.write_str("N"),
            Self::OlderThanDays(days) => write!(f, "{days}"),
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
