//! # Tool Executor
//!
//! Runs firing decisions on a worker pool of its own, separate from the scan
//! pool. A successful run appends a [`Proof`] to the service, plus any
//! findings a template scanner reported against the host; a failed one
//! leaves no trace on the model, so the next evaluation pass tries again.
//! Firings are never retried here.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sweepr_common::Error;
use sweepr_common::config::ToolConfig;
use sweepr_common::model::{Proof, ServiceKey};
use sweepr_common::rules::ToolKind;
use sweepr_plugins::artifact::{self, ArtifactAllocator};
use sweepr_plugins::{command, findings};
use sweepr_plugins::runner::{ToolRequest, ToolRunner};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::SharedProject;
use crate::event::{EngineEvent, EventSink, FiringOutcome};
use crate::matcher::FiringDecision;
use crate::store::ProjectStore;

#[derive(Debug, Clone)]
pub struct FiringReport {
    pub key: ServiceKey,
    pub tool_id: String,
    pub outcome: FiringOutcome,
    pub proof: Option<Proof>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct ToolExecutor {
    runner: Arc<dyn ToolRunner>,
    artifacts: Arc<ArtifactAllocator>,
    store: Arc<dyn ProjectStore>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    events: EventSink,
}

impl ToolExecutor {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        artifacts: Arc<ArtifactAllocator>,
        store: Arc<dyn ProjectStore>,
        config: &ToolConfig,
        events: EventSink,
    ) -> Self {
        Self {
            runner,
            artifacts,
            store,
            permits: Arc::new(Semaphore::new(config.concurrency.max(1))),
            timeout: config.timeout(),
            events,
        }
    }

    /// Runs every decision and waits for all of them.
    pub async fn run_all(
        &self,
        decisions: Vec<FiringDecision>,
        project: SharedProject,
        cancel: CancellationToken,
    ) -> Vec<FiringReport> {
        let mut tasks = JoinSet::new();
        for decision in decisions {
            self.spawn(&mut tasks, decision, project.clone(), cancel.clone());
        }

        let mut reports = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!("firing task panicked: {e}"),
            }
        }
        reports
    }

    /// Queues one firing on `tasks`. The pool bounds how many run at once.
    pub fn spawn(
        &self,
        tasks: &mut JoinSet<FiringReport>,
        decision: FiringDecision,
        project: SharedProject,
        cancel: CancellationToken,
    ) {
        self.events.emit(EngineEvent::FiringQueued {
            target: decision.key,
            tool: decision.rule.tool_id.clone(),
        });
        let executor = self.clone();
        tasks.spawn(async move { executor.fire(decision, project, cancel).await });
    }

    pub async fn fire(
        &self,
        decision: FiringDecision,
        project: SharedProject,
        cancel: CancellationToken,
    ) -> FiringReport {
        let span = info_span!("firing", tool = %decision.rule.tool_id, service = %decision.key);
        let report = self.fire_inner(&decision, &project, &cancel).instrument(span).await;
        self.events.emit(EngineEvent::FiringCompleted {
            target: report.key,
            tool: report.tool_id.clone(),
            outcome: report.outcome,
        });
        report
    }

    async fn fire_inner(
        &self,
        decision: &FiringDecision,
        project: &SharedProject,
        cancel: &CancellationToken,
    ) -> FiringReport {
        let rule = &decision.rule;
        let key = decision.key;
        let finish = |outcome: FiringOutcome, proof: Option<Proof>, error: Option<String>| FiringReport {
            key,
            tool_id: rule.tool_id.clone(),
            outcome,
            proof,
            error,
        };

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return finish(FiringOutcome::Cancelled, None, None),
            permit = self.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return finish(FiringOutcome::Cancelled, None, None),
            },
        };

        let started = Utc::now();
        let prepared = self
            .artifacts
            .allocate(&rule.tool_id, &key, rule.kind.output_extension(), started)
            .and_then(|paths| {
                command::render(&rule.command, &key, &decision.service, &paths)
                    .map(|cmd| (paths, cmd))
            });
        let (paths, cmd) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("cannot prepare {}: {e}", rule.tool_name);
                return finish(FiringOutcome::Failed, None, Some(e.to_string()));
            }
        };

        info!("{cmd}");
        let request = ToolRequest {
            tool_id: rule.tool_id.clone(),
            command: cmd.clone(),
            timeout: self.timeout,
        };
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.runner.run(&request) => result,
        };

        let output = match result {
            Ok(output) => output,
            Err(Error::Cancelled) => {
                info!("{} interrupted", rule.tool_name);
                return finish(FiringOutcome::Cancelled, None, None);
            }
            Err(e) => {
                warn!("{} failed: {e}", rule.tool_name);
                return finish(FiringOutcome::Failed, None, Some(e.to_string()));
            }
        };

        if !paths.output.exists() {
            if let Err(e) =
                artifact::persist_capture(&paths.output, &cmd, started, &output.stdout, &output.stderr)
            {
                warn!("could not save tool output: {e}");
            }
        }
        let result_paths: Vec<PathBuf> = [paths.output.clone()]
            .into_iter()
            .filter(|p| p.exists())
            .collect();
        let screenshot_path =
            (rule.captures_screenshot() && paths.screenshot.exists()).then(|| paths.screenshot.clone());

        let proof = Proof {
            tool: rule.tool_id.clone(),
            command: cmd,
            result_paths,
            screenshot_path,
            completed_at: Utc::now(),
        };

        let template_output = match rule.kind {
            ToolKind::VulnTemplate { .. } if paths.output.exists() => {
                match std::fs::read_to_string(&paths.output) {
                    Ok(text) => Some(text),
                    Err(e) => {
                        warn!("could not read {} output for findings: {e}", rule.tool_name);
                        None
                    }
                }
            }
            _ => None,
        };

        {
            let mut project = project.lock().await;
            let mut updated = project.clone();
            if !updated.append_proof(&key, proof.clone()) {
                warn!("service disappeared before proof could be recorded");
                return finish(FiringOutcome::Failed, None, Some("service not found".into()));
            }
            let found = match (&template_output, updated.host(&key.ip)) {
                (Some(text), Some(host)) => {
                    findings::parse_template_matches(text, host.id, key.port, &paths.output)
                }
                _ => Vec::new(),
            };
            let found_count = found.len();
            for finding in found {
                updated.add_finding(finding);
            }
            // Nothing is recorded unless it reached disk.
            if let Err(e) = self.store.save(&updated) {
                error!("could not persist project, dropping proof: {e}");
                return finish(FiringOutcome::Failed, None, Some(e.to_string()));
            }
            *project = updated;
            if found_count > 0 {
                info!("{} reported {found_count} findings", rule.tool_name);
            }
        }

        info!("{} completed", rule.tool_name);
        finish(FiringOutcome::Succeeded, Some(proof), None)
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
