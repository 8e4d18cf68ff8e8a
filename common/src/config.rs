//! Engine configuration.
//!
//! Every field has a default so a config file only needs to name what it
//! changes. The CLI layers its flags on top of whatever was loaded here.

use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rules::RerunPolicy;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scan: ScanConfig,
    pub partition: PartitionConfig,
    pub tools: ToolConfig,
    pub rerun: RerunPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Discovery program, looked up on `PATH` unless absolute.
    pub program: String,
    pub use_sudo: bool,
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub unit_timeout_secs: u64,
    /// Aggressiveness, 1 (slowest) to 5.
    pub timing: Option<u8>,
    pub interface: Option<String>,
    pub skip_host_discovery: bool,
    pub verbose: bool,
    pub probe_retries: u32,
    pub stats_every: String,
    pub user_agent: Option<String>,
    pub output_root: PathBuf,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            program: "nmap".to_string(),
            use_sudo: false,
            concurrency: 5,
            max_retries: 2,
            retry_backoff_ms: 2_000,
            unit_timeout_secs: 3_600,
            timing: None,
            interface: None,
            skip_host_discovery: false,
            verbose: false,
            probe_retries: 5,
            stats_every: "20s".to_string(),
            user_agent: None,
            output_root: PathBuf::from("sweepr-output"),
        }
    }
}

impl ScanConfig {
    pub fn unit_timeout(&self) -> Duration {
        Duration::from_secs(self.unit_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Subnet and batch sizes the partitioner cuts targets into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub coarse_prefix: u8,
    pub fine_prefix: u8,
    pub host_batch_size: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            coarse_prefix: 24,
            fine_prefix: 27,
            host_batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            timeout_secs: 300,
            probe_timeout_secs: 10,
        }
    }
}

impl ToolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let scan = &self.scan;
        if scan.program.trim().is_empty() {
            return Err(Error::config("scan.program must not be empty"));
        }
        if scan.concurrency == 0 {
            return Err(Error::config("scan.concurrency must be at least 1"));
        }
        if scan.unit_timeout_secs == 0 {
            return Err(Error::config("scan.unit_timeout_secs must be at least 1"));
        }
        if let Some(timing) = scan.timing {
            if !(1..=5).contains(&timing) {
                return Err(Error::config(format!(
                    "scan.timing must be between 1 and 5, got {timing}"
                )));
            }
        }
        if !is_duration_spec(&scan.stats_every) {
            return Err(Error::config(format!(
                "scan.stats_every '{}' is not a duration like 20s or 1m",
                scan.stats_every
            )));
        }
        if let Some(name) = &scan.interface {
            validate_interface(name)?;
        }

        let part = &self.partition;
        if part.coarse_prefix > 32 || part.fine_prefix > 32 {
            return Err(Error::config("partition prefixes must be at most 32"));
        }
        if part.fine_prefix < part.coarse_prefix {
            return Err(Error::config(format!(
                "partition.fine_prefix /{} is coarser than coarse_prefix /{}",
                part.fine_prefix, part.coarse_prefix
            )));
        }
        if part.host_batch_size == 0 {
            return Err(Error::config("partition.host_batch_size must be at least 1"));
        }

        if self.tools.concurrency == 0 {
            return Err(Error::config("tools.concurrency must be at least 1"));
        }
        if self.tools.timeout_secs == 0 || self.tools.probe_timeout_secs == 0 {
            return Err(Error::config("tool timeouts must be at least 1 second"));
        }
        Ok(())
    }
}

fn validate_interface(name: &str) -> Result<()> {
    let found = pnet::datalink::interfaces()
        .iter()
        .any(|intf| intf.name == name);
    if found {
        Ok(())
    } else {
        Err(Error::config(format!("network interface '{name}' not found")))
    }
}

fn is_duration_spec(s: &str) -> bool {
    let digits = s.trim_end_matches(|c: char| matches!(c, 's' | 'm' | 'h'));
    let suffix_len = s.len() - digits.len();
    suffix_len <= 1 && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
