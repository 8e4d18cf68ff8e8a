use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sweepr_common::config::ScanConfig;
use sweepr_common::{Error, Result};
use sweepr_plugins::process;
use sweepr_protocols::nmap::{self, NmapCommand, NmapTargets};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{DiscoveryBackend, RawOutput, ScanPlan};
use crate::partition::ScanUnit;

pub const SCANS_DIR: &str = "scans";

/// Drives the nmap binary. Reports are written to
/// `<output_root>/scans/<unit-id>.xml` and kept as evidence.
#[derive(Debug, Clone)]
pub struct NmapBackend {
    config: ScanConfig,
}

impl NmapBackend {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    fn scans_dir(&self) -> PathBuf {
        self.config.output_root.join(SCANS_DIR)
    }

    fn command(&self, plan: &ScanPlan) -> NmapCommand {
        let config = &self.config;
        NmapCommand::new(&config.program, plan.profile.clone())
            .sudo(config.use_sudo)
            .verbose(config.verbose)
            .skip_host_discovery(config.skip_host_discovery)
            .timing(config.timing)
            .max_retries(config.probe_retries)
            .stats_every(config.stats_every.clone())
            .interface(config.interface.as_deref())
            .exclude_ports(&plan.excluded_ports)
            .user_agent(config.user_agent.as_deref())
    }

    /// Units with more than one target entry go through a host file.
    async fn targets(&self, unit: &ScanUnit, dir: &Path) -> Result<NmapTargets> {
        let args = unit.target_args();
        if args.len() <= 1 {
            return Ok(NmapTargets::Inline(args));
        }
        let path = dir.join(format!("{}_targets.txt", unit.id));
        let mut body = args.join("\n");
        body.push('\n');
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| Error::io(&path, e))?;
        Ok(NmapTargets::File(path))
    }
}

#[async_trait]
impl DiscoveryBackend for NmapBackend {
    async fn discover(&self, unit: &ScanUnit, plan: &ScanPlan) -> Result<RawOutput> {
        let dir = self.scans_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::io(&dir, e))?;

        let xml_path = dir.join(format!("{}.xml", unit.id));
        if tokio::fs::try_exists(&xml_path).await.unwrap_or(false) {
            // A report left by an earlier attempt must not be mistaken for this one.
            tokio::fs::remove_file(&xml_path)
                .await
                .map_err(|e| Error::io(&xml_path, e))?;
        }

        let targets = self.targets(unit, &dir).await?;
        let invocation = self.command(plan).build(&targets, &xml_path);
        let shown = invocation.display();
        info!(unit = %unit.id, "{shown}");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);

        let program = self.config.program.as_str();
        let captured = process::run_captured(cmd, program, self.config.unit_timeout()).await?;
        debug!(
            unit = %unit.id,
            elapsed_ms = captured.elapsed.as_millis() as u64,
            "nmap exited with {}",
            captured.status
        );

        if let Some(line) = captured.lines().find(|line| nmap::is_interface_failure(line)) {
            warn!(unit = %unit.id, "{}", line.trim());
            return Err(Error::ExecutionFailure {
                program: program.to_string(),
                status: captured.status.to_string(),
                detail: "capture interface disappeared during the scan".to_string(),
            });
        }
        captured.into_result(program)?;

        let report = tokio::fs::read_to_string(&xml_path).await.map_err(|e| {
            Error::parse(format!(
                "{program} produced no report at {}: {e}",
                xml_path.display()
            ))
        })?;

        Ok(RawOutput {
            report,
            evidence: Some(xml_path),
            command: shown,
        })
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
