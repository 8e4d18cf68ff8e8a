//! # Scan Coordinator
//!
//! Runs scan units on a bounded worker pool. Per unit:
//!
//! ```text
//! Pending -> Running -> Succeeded
//!                    -> FailedRetrying -> Running
//!                    -> FailedTerminal
//! ```
//!
//! Transient failures (non-zero exit, timeout) are retried with jittered
//! backoff; a missing program or unreadable report fails the unit at once.
//! Merging a unit's results, saving the project and advancing the
//! checkpoint happen in one critical section under the project lock.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use rand::Rng;
use sweepr_common::config::ScanConfig;
use sweepr_common::model::ServiceKey;
use sweepr_common::{Error, Result};
use tokio::sync::Semaphore;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::SharedProject;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::event::{EngineEvent, EventSink, UnitStatus};
use crate::ingest::ResultIngester;
use crate::partition::ScanUnit;
use crate::scanner::{DiscoveryBackend, ScanPlan};
use crate::store::ProjectStore;

/// Outcome of one unit.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub unit_id: Uuid,
    pub label: String,
    pub status: UnitStatus,
    pub attempts: u32,
    /// Services created or changed by this unit's merge.
    pub changed: Vec<ServiceKey>,
    pub error: Option<String>,
}

/// Everything that stays fixed across the units of one batch.
#[derive(Clone)]
pub struct BatchContext {
    pub plan: Arc<ScanPlan>,
    pub asset_id: Option<u32>,
    pub project: SharedProject,
    pub checkpoint: Arc<StdMutex<Checkpoint>>,
}

#[derive(Clone)]
pub struct ScanCoordinator {
    backend: Arc<dyn DiscoveryBackend>,
    checkpoints: Arc<dyn CheckpointStore>,
    store: Arc<dyn ProjectStore>,
    ingester: Arc<ResultIngester>,
    concurrency: usize,
    max_retries: u32,
    backoff: Duration,
    events: EventSink,
}

impl ScanCoordinator {
    pub fn new(
        backend: Arc<dyn DiscoveryBackend>,
        checkpoints: Arc<dyn CheckpointStore>,
        store: Arc<dyn ProjectStore>,
        ingester: ResultIngester,
        config: &ScanConfig,
        events: EventSink,
    ) -> Self {
        Self {
            backend,
            checkpoints,
            store,
            ingester: Arc::new(ingester),
            concurrency: config.concurrency.max(1),
            max_retries: config.max_retries,
            backoff: config.retry_backoff(),
            events,
        }
    }

    /// Runs every unit not already in the checkpoint. Each report is also
    /// sent on `completed` as soon as its unit finishes, so automation can
    /// start while the rest of the batch is still scanning.
    pub async fn run(
        &self,
        units: Vec<ScanUnit>,
        ctx: BatchContext,
        cancel: CancellationToken,
        completed: Option<UnboundedSender<UnitReport>>,
    ) -> Vec<UnitReport> {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut reports = Vec::with_capacity(units.len());

        for unit in units {
            let done = ctx
                .checkpoint
                .lock()
                .map(|cp| cp.is_done(&unit.id))
                .unwrap_or(false);
            if done {
                debug!(unit = %unit.id, "already completed, skipping");
                let report = UnitReport {
                    unit_id: unit.id,
                    label: unit.label(),
                    status: UnitStatus::Skipped,
                    attempts: 0,
                    changed: Vec::new(),
                    error: None,
                };
                self.publish(&report, completed.as_ref());
                reports.push(report);
                continue;
            }

            let worker = self.clone();
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            let permits = Arc::clone(&permits);
            let completed = completed.clone();
            tasks.spawn(async move {
                let span = info_span!("unit", id = %unit.id, label = %unit.label());
                let report = async {
                    let permit = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        permit = permits.acquire_owned() => permit.ok(),
                    };
                    let Some(_permit) = permit else {
                        return worker.cancelled(&unit, 0);
                    };
                    worker.run_unit(&unit, &ctx, &cancel).await
                }
                .instrument(span)
                .await;
                worker.publish(&report, completed.as_ref());
                report
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!("scan unit task panicked: {e}"),
            }
        }
        reports
    }

    fn publish(&self, report: &UnitReport, completed: Option<&UnboundedSender<UnitReport>>) {
        self.events.emit(EngineEvent::UnitCompleted {
            unit_id: report.unit_id,
            label: report.label.clone(),
            status: report.status,
            attempts: report.attempts,
            changed: report.changed.len(),
        });
        if let Some(tx) = completed {
            let _ = tx.send(report.clone());
        }
    }

    async fn run_unit(&self, unit: &ScanUnit, ctx: &BatchContext, cancel: &CancellationToken) -> UnitReport {
        let max_attempts = self.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            info!(attempt, "scanning {} address(es)", unit.address_count());

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                result = self.attempt(unit, ctx) => result,
            };

            match result {
                Ok(changed) => {
                    info!(changed = changed.len(), "unit complete");
                    return UnitReport {
                        unit_id: unit.id,
                        label: unit.label(),
                        status: UnitStatus::Succeeded,
                        attempts: attempt,
                        changed,
                        error: None,
                    };
                }
                Err(Error::Cancelled) => return self.cancelled(unit, attempt),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.jittered_backoff(attempt);
                    warn!(attempt, "{e}; retrying in {}ms", delay.as_millis());
                    tokio::select! {
                        _ = cancel.cancelled() => return self.cancelled(unit, attempt),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    error!(attempt, "unit failed: {e}");
                    return UnitReport {
                        unit_id: unit.id,
                        label: unit.label(),
                        status: UnitStatus::FailedTerminal,
                        attempts: attempt,
                        changed: Vec::new(),
                        error: Some(e.to_string()),
                    };
                }
            }
        }
    }

    /// One discovery run plus its merge. Dropping this future before the
    /// project lock is taken discards the unit; once the lock is held the
    /// merge, project save and checkpoint write run without yielding. The
    /// merge lands in a copy that replaces the project only after it has been
    /// saved, so a failed save leaves both project and checkpoint untouched.
    async fn attempt(&self, unit: &ScanUnit, ctx: &BatchContext) -> Result<Vec<ServiceKey>> {
        let raw = self.backend.discover(unit, &ctx.plan).await?;
        let report = self.ingester.parse(&raw)?;

        let mut project = ctx.project.lock().await;
        let mut merged = project.clone();
        let outcome = self.ingester.merge(&mut merged, ctx.asset_id, &report);
        // The unit only counts as done once its results are on disk.
        self.store.save(&merged).inspect_err(|e| {
            error!("could not persist project, discarding unit results: {e}");
        })?;
        *project = merged;
        match ctx.checkpoint.lock() {
            Ok(mut checkpoint) => {
                checkpoint.mark_done(unit.id);
                if let Err(e) = self.checkpoints.save(&checkpoint) {
                    error!("could not write checkpoint: {e}");
                }
            }
            Err(_) => error!("checkpoint state poisoned; unit not recorded"),
        }
        drop(project);

        Ok(outcome.changed)
    }

    fn cancelled(&self, unit: &ScanUnit, attempts: u32) -> UnitReport {
        UnitReport {
            unit_id: unit.id,
            label: unit.label(),
            status: UnitStatus::Cancelled,
            attempts,
            changed: Vec::new(),
            error: None,
        }
    }

    fn jittered_backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff.as_millis() as u64 * u64::from(attempt);
        let jitter = if base == 0 {
            0
        } else {
            rand::rng().random_range(0..=base / 2)
        };
        Duration::from_millis(base + jitter)
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
