//! The central **abstraction** over the external discovery program.
//!
//! The coordinator only ever talks to a [`DiscoveryBackend`]: hand it a
//! [`ScanUnit`], get back the program's raw report. The [`nmap`] backend is
//! the production implementation; tests substitute fakes.

use std::collections::BTreeSet;
use std::path::PathBuf;

use async_trait::async_trait;
use sweepr_common::Result;
use sweepr_common::profile::ScanProfile;

use crate::partition::ScanUnit;

pub mod nmap;

pub use nmap::NmapBackend;

/// Batch-wide parameters that apply to every unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    pub profile: ScanProfile,
    pub excluded_ports: BTreeSet<u16>,
}

/// Unparsed output of one discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    /// The structured (XML) report.
    pub report: String,
    /// Where the report was kept on disk, if anywhere.
    pub evidence: Option<PathBuf>,
    pub command: String,
}

#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Scans `unit` once. Errors are classified per
    /// [`sweepr_common::Error::is_transient`] by the caller.
    async fn discover(&self, unit: &ScanUnit, plan: &ScanPlan) -> Result<RawOutput>;
}
