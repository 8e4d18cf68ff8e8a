//! # sweepr-core
//!
//! The scan orchestration and tool automation engine.
//!
//! * **[`partition`]**: Target expression to scan units.
//! * **[`coordinator`]**: Bounded scan pool with retries and checkpoints.
//! * **[`ingest`]**: Report parsing and project merge.
//! * **[`matcher`]**: Rule evaluation and re-run suppression.
//! * **[`executor`]**: Bounded tool pool and proof recording.
//! * **[`engine`]**: The pipeline tying them together.
//!
//! Every component receives the project explicitly as a [`SharedProject`];
//! nothing here holds process-wide state.

use std::sync::Arc;

use sweepr_common::model::Project;
use tokio::sync::Mutex;

pub mod checkpoint;
pub mod coordinator;
pub mod engine;
pub mod event;
pub mod executor;
pub mod ingest;
pub mod matcher;
pub mod partition;
pub mod scanner;
pub mod store;
pub mod summary;

pub use engine::{Engine, ScanRequest};
pub use event::{EngineEvent, FiringOutcome, UnitStatus};
pub use summary::RunSummary;

/// The project under its single-writer lock.
pub type SharedProject = Arc<Mutex<Project>>;

pub fn shared(project: Project) -> SharedProject {
    Arc::new(Mutex::new(project))
}
