pub mod automate;
pub mod partition;
pub mod scan;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sweepr_common::config::EngineConfig;
use sweepr_common::network::target::TargetExpression;
use sweepr_common::profile::ScanProfile;
use sweepr_common::rules::{RerunPolicy, RuleTable};
use sweepr_core::SharedProject;
use sweepr_core::store::JsonProjectStore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser)]
#[command(name = "sweepr")]
#[command(version, about = "Partitioned network scanning with rule-driven tool automation.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log detail (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce output (-q warnings only, -qq errors only)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for scan reports, tool artifacts and checkpoints
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a target and run matching tools against what is found
    #[command(alias = "s")]
    Scan(ScanArgs),
    /// Run matching tools against every service already in the project
    #[command(alias = "a")]
    Automate(AutomateArgs),
    /// Show how a target would be split into scan units
    #[command(alias = "p")]
    Partition(PartitionArgs),
}

#[derive(Args)]
pub struct TargetArgs {
    /// CIDR network, comma-separated host list, or a single host
    #[arg(required_unless_present = "target_file")]
    pub target: Option<String>,

    /// Read hosts from a file, one per line
    #[arg(long, conflicts_with = "target")]
    pub target_file: Option<PathBuf>,

    /// Scan profile: ping, top100, top1000, http_ports, netsec_known, all_ports, custom:<ports>
    #[arg(long, default_value = "top100")]
    pub profile: ScanProfile,

    /// Addresses or networks to leave out, comma-separated
    #[arg(long)]
    pub exclude: Option<String>,

    /// Ports to leave out, comma-separated
    #[arg(long)]
    pub exclude_ports: Option<String>,
}

impl TargetArgs {
    pub fn expression(&self) -> anyhow::Result<TargetExpression> {
        let mut expr = match (&self.target, &self.target_file) {
            (_, Some(path)) => TargetExpression::from_file(path)
                .with_context(|| format!("reading targets from {}", path.display()))?,
            (Some(target), None) => target.parse()?,
            (None, None) => anyhow::bail!("no target given"),
        };
        if let Some(spec) = &self.exclude {
            expr = expr.with_excluded_addrs(spec)?;
        }
        if let Some(spec) = &self.exclude_ports {
            expr = expr.with_excluded_ports(spec)?;
        }
        Ok(expr)
    }

    /// The target as the user wrote it.
    pub fn label(&self) -> String {
        match (&self.target, &self.target_file) {
            (_, Some(path)) => path.display().to_string(),
            (Some(target), None) => target.trim().to_string(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Args)]
pub struct ProjectArgs {
    /// Project file; created if it does not exist
    #[arg(long)]
    pub project: PathBuf,

    /// Automation rule table (JSON)
    #[arg(long)]
    pub rules: PathBuf,

    /// Re-run policy: Y (always), N (never), or a number of days
    #[arg(long)]
    pub rerun: Option<RerunPolicy>,

    /// Maximum tools running at once
    #[arg(long)]
    pub tool_concurrency: Option<usize>,
}

#[derive(Args)]
pub struct ScanArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub project: ProjectArgs,

    /// Maximum scan units running at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Network interface for the scanner
    #[arg(long)]
    pub interface: Option<String>,

    /// Scanner timing template (1-5)
    #[arg(long)]
    pub timing: Option<u8>,

    /// Run the scanner through sudo
    #[arg(long)]
    pub sudo: bool,

    /// Asset name recorded in the project; defaults to the target
    #[arg(long)]
    pub asset_name: Option<String>,

    /// Scan only, do not run any tools
    #[arg(long)]
    pub no_automation: bool,
}

#[derive(Args)]
pub struct AutomateArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(Args)]
pub struct PartitionArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// File configuration with the global flags applied on top.
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(output) = &self.output {
            config.scan.output_root = output.clone();
        }
        config.scan.verbose |= self.verbose > 0;
        Ok(config)
    }
}

impl ProjectArgs {
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(policy) = self.rerun {
            config.rerun = policy;
        }
        if let Some(n) = self.tool_concurrency {
            config.tools.concurrency = n;
        }
    }
}

impl ScanArgs {
    pub fn apply(&self, config: &mut EngineConfig) {
        self.project.apply(config);
        if let Some(n) = self.concurrency {
            config.scan.concurrency = n;
        }
        if self.interface.is_some() {
            config.scan.interface = self.interface.clone();
        }
        if self.timing.is_some() {
            config.scan.timing = self.timing;
        }
        config.scan.use_sudo |= self.sudo;
    }
}

/// Loads the project named by `--project`, creating it when missing. The
/// project name defaults to the file stem.
pub fn open_project(args: &ProjectArgs) -> anyhow::Result<(Arc<JsonProjectStore>, SharedProject)> {
    let store = JsonProjectStore::new(&args.project);
    let name = args
        .project
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    let project = store
        .load_or_create(&name)
        .with_context(|| format!("opening project {}", args.project.display()))?;
    Ok((Arc::new(store), sweepr_core::shared(project)))
}

pub fn load_rules(args: &ProjectArgs) -> anyhow::Result<RuleTable> {
    RuleTable::from_file(&args.rules)
        .with_context(|| format!("loading rules from {}", args.rules.display()))
}

/// Cancels `token` on the first Ctrl-C.
pub fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after in-flight work");
            token.cancel();
        }
    });
}
