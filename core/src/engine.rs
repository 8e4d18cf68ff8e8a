//! The scan-to-proof pipeline:
//!
//! ```text
//! target -> partition -> coordinator (scan pool) -> merge -> matcher -> executor (tool pool)
//! ```
//!
//! Automation starts as soon as the first unit merges; the two pools run
//! side by side.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use sweepr_common::Result;
use sweepr_common::config::EngineConfig;
use sweepr_common::model::AssetKind;
use sweepr_common::network::target::TargetExpression;
use sweepr_common::profile::ScanProfile;
use sweepr_common::rules::RuleTable;
use sweepr_plugins::artifact::ArtifactAllocator;
use sweepr_plugins::probe::{ContentProbe, HttpProbe};
use sweepr_plugins::runner::{ProcessToolRunner, ToolRunner};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::SharedProject;
use crate::checkpoint::{CheckpointStore, JsonCheckpointStore};
use crate::coordinator::{BatchContext, ScanCoordinator};
use crate::event::{EngineEvent, EventSink, UnitStatus};
use crate::executor::{FiringReport, ToolExecutor};
use crate::ingest::ResultIngester;
use crate::matcher::AutomationMatcher;
use crate::partition::{ScanUnit, TargetPartitioner};
use crate::scanner::{DiscoveryBackend, NmapBackend, ScanPlan};
use crate::store::{MemoryProjectStore, ProjectStore};
use crate::summary::RunSummary;

const BATCH_NAMESPACE: Uuid = Uuid::from_u128(0x9a41_27c3_5d0e_4f6b_8e12_7b3c_1d2e_6f70);

/// One scan batch as requested by the caller.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub target: TargetExpression,
    /// The target as the user wrote it; recorded on the asset.
    pub target_label: String,
    pub profile: ScanProfile,
    pub asset_name: Option<String>,
    /// Run matching rules against changed services.
    pub automate: bool,
}

impl ScanRequest {
    /// Stable across runs of the same request against the same project,
    /// which is what lets a rerun resume from its checkpoint.
    pub fn batch_id(&self, project_id: Uuid) -> Uuid {
        let excluded_addrs = self
            .target
            .excluded_addrs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let excluded_ports = self
            .target
            .excluded_ports
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let key = format!(
            "{project_id}|{}|{}|{excluded_addrs}|{excluded_ports}",
            self.target_label, self.profile
        );
        Uuid::new_v5(&BATCH_NAMESPACE, key.as_bytes())
    }
}

pub struct Engine {
    config: EngineConfig,
    rules: Arc<RuleTable>,
    backend: Arc<dyn DiscoveryBackend>,
    runner: Arc<dyn ToolRunner>,
    probe: Arc<dyn ContentProbe>,
    checkpoints: Arc<dyn CheckpointStore>,
    store: Arc<dyn ProjectStore>,
    artifacts: Arc<ArtifactAllocator>,
    events: EventSink,
}

impl Engine {
    /// Production wiring: nmap, shell-run tools, HTTP probe, checkpoints
    /// under the output root. Swap any of them with the `with_*` methods.
    pub fn new(config: EngineConfig, rules: RuleTable) -> Result<Self> {
        config.validate()?;
        let probe = HttpProbe::new(config.tools.probe_timeout(), config.scan.user_agent.as_deref())?;
        Ok(Self {
            rules: Arc::new(rules),
            backend: Arc::new(NmapBackend::new(config.scan.clone())),
            runner: Arc::new(ProcessToolRunner::new()),
            probe: Arc::new(probe),
            checkpoints: Arc::new(JsonCheckpointStore::new(&config.scan.output_root)),
            store: Arc::new(MemoryProjectStore::new()),
            artifacts: Arc::new(ArtifactAllocator::new(&config.scan.output_root)),
            events: EventSink::disabled(),
            config,
        })
    }

    pub fn with_backend(mut self, backend: Arc<dyn DiscoveryBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn ContentProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ProjectStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        self.events = EventSink::new(events);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Partitions without scanning.
    pub fn plan(&self, target: &TargetExpression, profile: &ScanProfile) -> Result<Vec<ScanUnit>> {
        TargetPartitioner::new(self.config.partition.clone()).partition(target, profile)
    }

    fn matcher(&self) -> AutomationMatcher {
        AutomationMatcher::new(Arc::clone(&self.rules), self.config.rerun, Arc::clone(&self.probe))
    }

    fn executor(&self) -> ToolExecutor {
        ToolExecutor::new(
            Arc::clone(&self.runner),
            Arc::clone(&self.artifacts),
            Arc::clone(&self.store),
            &self.config.tools,
            self.events.clone(),
        )
    }

    /// Scans `request` into `project`, firing rules against whatever
    /// changed. Only configuration errors are returned as `Err`; unit and
    /// firing failures are counted in the summary.
    pub async fn run(
        &self,
        request: ScanRequest,
        project: SharedProject,
        cancel: CancellationToken,
    ) -> Result<RunSummary> {
        let units = self.plan(&request.target, &request.profile)?;

        let (batch_id, asset_id) = {
            let mut project = project.lock().await;
            let name = request
                .asset_name
                .clone()
                .unwrap_or_else(|| request.target_label.clone());
            let kind = AssetKind::from(&request.target.scope);
            let asset_id = project.ensure_asset(&name, kind, &request.target_label);
            (request.batch_id(project.id), asset_id)
        };

        let checkpoint = self.checkpoints.load(batch_id)?;
        let already_done = units.iter().filter(|u| checkpoint.is_done(&u.id)).count();
        self.events.emit(EngineEvent::BatchPlanned {
            batch_id,
            units: units.len(),
            already_done,
        });
        info!(
            batch = %batch_id,
            profile = %request.profile,
            units = units.len(),
            already_done,
            "scanning {}",
            request.target_label
        );

        let mut summary = RunSummary {
            units_total: units.len(),
            ..RunSummary::default()
        };

        let ctx = BatchContext {
            plan: Arc::new(ScanPlan {
                profile: request.profile.clone(),
                excluded_ports: request.target.excluded_ports.clone(),
            }),
            asset_id: Some(asset_id),
            project: project.clone(),
            checkpoint: Arc::new(StdMutex::new(checkpoint)),
        };
        let coordinator = ScanCoordinator::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.checkpoints),
            Arc::clone(&self.store),
            ResultIngester::new(request.target.excluded_ports.clone()),
            &self.config.scan,
            self.events.clone(),
        );
        let matcher = self.matcher();
        let executor = self.executor();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let scan = coordinator.run(units, ctx, cancel.clone(), Some(tx));
        let automation = async {
            let mut firings = JoinSet::new();
            let mut queued = HashSet::new();
            while let Some(report) = rx.recv().await {
                if !request.automate || report.changed.is_empty() || cancel.is_cancelled() {
                    continue;
                }
                let decisions = matcher.evaluate(&project, &report.changed, Utc::now()).await;
                for decision in decisions {
                    if queued.insert(decision.pair()) {
                        executor.spawn(&mut firings, decision, project.clone(), cancel.clone());
                    }
                }
            }
            collect(firings).await
        };
        let (unit_reports, firing_reports) = tokio::join!(scan, automation);

        for report in &unit_reports {
            summary.record_unit(report.status);
        }
        for report in &firing_reports {
            summary.record_firing(report.outcome);
        }
        summary.cancelled |= cancel.is_cancelled();

        let finished = unit_reports
            .iter()
            .all(|r| matches!(r.status, UnitStatus::Succeeded | UnitStatus::Skipped));
        if finished && !summary.cancelled {
            if let Err(e) = self.checkpoints.clear(batch_id) {
                warn!("could not remove checkpoint for finished batch: {e}");
            }
        }

        info!("{summary}");
        Ok(summary)
    }

    /// Evaluates every service already in the project. This is the pass that
    /// picks up tools which failed, or whose proof went stale, last time.
    pub async fn automate(&self, project: SharedProject, cancel: CancellationToken) -> Result<RunSummary> {
        let keys = project.lock().await.service_keys();
        info!(
            services = keys.len(),
            rules = self.rules.len(),
            policy = %self.config.rerun,
            "evaluating automation rules"
        );

        let decisions = self.matcher().evaluate(&project, &keys, Utc::now()).await;
        let reports = self.executor().run_all(decisions, project, cancel.clone()).await;

        let mut summary = RunSummary::default();
        for report in &reports {
            summary.record_firing(report.outcome);
        }
        summary.cancelled |= cancel.is_cancelled();
        info!("{summary}");
        Ok(summary)
    }
}

async fn collect(mut firings: JoinSet<FiringReport>) -> Vec<FiringReport> {
    let mut reports = Vec::with_capacity(firings.len());
    while let Some(joined) = firings.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => error!("firing task panicked: {e}"),
        }
    }
    reports
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::scanner::RawOutput;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use sweepr_common::Error;
    use sweepr_common::model::{Project, Protocol, ServiceKey};
    use sweepr_plugins::runner::{ToolOutput, ToolRequest};

    /// Reports port 80/http open on the first address of every unit, except
    /// units containing `broken`, which always fail.
    struct HttpEverywhere {
        broken: Option<String>,
    }

    #[async_trait]
    impl DiscoveryBackend for HttpEverywhere {
        async fn discover(&self, unit: &ScanUnit, _plan: &ScanPlan) -> Result<RawOutput> {
            if self.broken.as_deref().is_some_and(|b| unit.label().contains(b)) {
                return Err(Error::parse("truncated report"));
            }
            let ip = unit.addresses().next().unwrap();
            Ok(RawOutput {
                report: format!(
                    r#"<nmaprun><host><status state="up"/><address addr="{ip}" addrtype="ipv4"/>
                       <ports><port protocol="tcp" portid="80"><state state="open"/>
                       <service name="http"/></port></ports></host></nmaprun>"#
                ),
                ..RawOutput::default()
            })
        }
    }

    #[derive(Default)]
    struct CountingRunner {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl ToolRunner for CountingRunner {
        async fn run(&self, request: &ToolRequest) -> Result<ToolOutput> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(ToolOutput {
                stdout: format!("ran {}", request.command),
                stderr: String::new(),
            })
        }
    }

    struct EmptyProbe;

    #[async_trait]
    impl ContentProbe for EmptyProbe {
        async fn fetch(&self, _url: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    const RULES: &str = r#"[{"ports": [80], "tool_name": "Banner", "tool_type": "generic",
                             "command": "grab {ip} {port}"}]"#;

    struct Fixture {
        _dir: tempfile::TempDir,
        engine: Engine,
        runner: Arc<CountingRunner>,
        checkpoints: Arc<MemoryCheckpointStore>,
    }

    fn fixture(broken: Option<&str>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.scan.output_root = dir.path().to_path_buf();
        config.scan.retry_backoff_ms = 1;

        let runner = Arc::new(CountingRunner::default());
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let engine = Engine::new(config, RuleTable::from_json(RULES).unwrap())
            .unwrap()
            .with_backend(Arc::new(HttpEverywhere {
                broken: broken.map(str::to_string),
            }))
            .with_runner(runner.clone())
            .with_probe(Arc::new(EmptyProbe))
            .with_checkpoints(checkpoints.clone());
        Fixture {
            _dir: dir,
            engine,
            runner,
            checkpoints,
        }
    }

    fn request(target: &str, automate: bool) -> ScanRequest {
        ScanRequest {
            target: target.parse().unwrap(),
            target_label: target.to_string(),
            profile: ScanProfile::Top100,
            asset_name: None,
            automate,
        }
    }

    #[tokio::test]
    async fn scan_feeds_automation_and_clears_checkpoint() {
        let fx = fixture(None);
        let project = crate::shared(Project::new("acme"));
        let req = request("10.0.0.0/23", true);
        let batch = req.batch_id(project.lock().await.id);

        let summary = fx
            .engine
            .run(req, project.clone(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.units_succeeded, 2);
        assert_eq!(summary.firings_succeeded, 2);
        assert_eq!(fx.runner.runs.load(Ordering::SeqCst), 2);
        assert!(fx.checkpoints.load(batch).unwrap().completed.is_empty());

        let project = project.lock().await;
        assert_eq!(project.assets.len(), 1);
        let key = ServiceKey::new("10.0.1.0".parse().unwrap(), 80, Protocol::Tcp);
        assert_eq!(project.service(&key).unwrap().proofs.len(), 1);
    }

    #[tokio::test]
    async fn scan_without_automation_fires_nothing() {
        let fx = fixture(None);
        let project = crate::shared(Project::new("acme"));
        let summary = fx
            .engine
            .run(request("10.0.0.9", false), project, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.units_succeeded, 1);
        assert_eq!(summary.firings_attempted, 0);
        assert_eq!(fx.runner.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_unit_keeps_checkpoint_for_resume() {
        let fx = fixture(Some("10.0.1.0"));
        let project = crate::shared(Project::new("acme"));
        let req = request("10.0.0.0/23", false);
        let batch = req.batch_id(project.lock().await.id);

        let summary = fx
            .engine
            .run(req, project, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.units_succeeded, 1);
        assert_eq!(summary.units_failed, 1);
        assert_eq!(fx.checkpoints.load(batch).unwrap().completed.len(), 1);
    }

    #[tokio::test]
    async fn automate_pass_respects_recent_proofs() {
        let fx = fixture(None);
        let project = crate::shared(Project::new("acme"));
        fx.engine
            .run(request("10.0.0.9", true), project.clone(), CancellationToken::new())
            .await
            .unwrap();

        let again = fx
            .engine
            .automate(project, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(again.firings_attempted, 0);
        assert_eq!(fx.runner.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_id_depends_on_target_and_profile() {
        let project = Uuid::new_v4();
        let a = request("10.0.0.0/24", true);
        let mut b = a.clone();
        assert_eq!(a.batch_id(project), b.batch_id(project));
        b.profile = ScanProfile::AllPorts;
        assert_ne!(a.batch_id(project), b.batch_id(project));
        assert_ne!(a.batch_id(project), a.batch_id(Uuid::new_v4()));
    }

    #[test]
    fn new_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.scan.concurrency = 0;
        assert!(Engine::new(config, RuleTable::default()).is_err());
    }
}
