//! Progress events emitted while a batch runs.

use sweepr_common::model::ServiceKey;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Succeeded,
    /// Already completed in an earlier run of the same batch.
    Skipped,
    FailedTerminal,
    /// Never started because the run was cancelled.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiringOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    BatchPlanned {
        batch_id: Uuid,
        units: usize,
        already_done: usize,
    },
    UnitCompleted {
        unit_id: Uuid,
        label: String,
        status: UnitStatus,
        attempts: u32,
        changed: usize,
    },
    FiringQueued {
        target: ServiceKey,
        tool: String,
    },
    FiringCompleted {
        target: ServiceKey,
        tool: String,
        outcome: FiringOutcome,
    },
}

/// Optional event channel. Sending never fails the engine: a dropped
/// receiver just means nobody is watching.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<EngineEvent>>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<EngineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
