//! # Checkpoints
//!
//! A checkpoint lists the units of one batch whose results are fully merged
//! into the project. It is written in the same critical section as the
//! merge, so it never names a unit that is only partly merged.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sweepr_common::{Error, Result};
use uuid::Uuid;

use crate::store::write_json_atomic;

pub const CHECKPOINTS_DIR: &str = "checkpoints";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub batch_id: Uuid,
    #[serde(default)]
    pub completed: BTreeSet<Uuid>,
    #[serde(rename = "updated_ts", with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(batch_id: Uuid) -> Self {
        Self {
            batch_id,
            completed: BTreeSet::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_done(&self, unit: &Uuid) -> bool {
        self.completed.contains(unit)
    }

    pub fn mark_done(&mut self, unit: Uuid) {
        self.completed.insert(unit);
        self.updated_at = Utc::now();
    }
}

pub trait CheckpointStore: Send + Sync {
    /// Returns the stored checkpoint, or an empty one for a new batch.
    fn load(&self, batch_id: Uuid) -> Result<Checkpoint>;
    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
    /// Forgets a batch once every unit in it has succeeded.
    fn clear(&self, batch_id: Uuid) -> Result<()>;
}

/// `<root>/checkpoints/<batch-id>.json`.
#[derive(Debug, Clone)]
pub struct JsonCheckpointStore {
    dir: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(output_root: &Path) -> Self {
        Self {
            dir: output_root.join(CHECKPOINTS_DIR),
        }
    }

    fn path(&self, batch_id: Uuid) -> PathBuf {
        self.dir.join(format!("{batch_id}.json"))
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn load(&self, batch_id: Uuid) -> Result<Checkpoint> {
        let path = self.path(batch_id);
        if !path.exists() {
            return Ok(Checkpoint::new(batch_id));
        }
        let raw = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let checkpoint: Checkpoint = serde_json::from_str(&raw)?;
        if checkpoint.batch_id != batch_id {
            return Err(Error::config(format!(
                "checkpoint {} belongs to batch {}",
                path.display(),
                checkpoint.batch_id
            )));
        }
        Ok(checkpoint)
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        write_json_atomic(&self.path(checkpoint.batch_id), checkpoint)
    }

    fn clear(&self, batch_id: Uuid) -> Result<()> {
        let path = self.path(batch_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&path, e)),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    batches: Mutex<HashMap<Uuid, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn batches(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Checkpoint>>> {
        self.batches
            .lock()
            .map_err(|_| Error::config("checkpoint store poisoned"))
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, batch_id: Uuid) -> Result<Checkpoint> {
        Ok(self
            .batches()?
            .get(&batch_id)
            .cloned()
            .unwrap_or_else(|| Checkpoint::new(batch_id)))
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.batches()?
            .insert(checkpoint.batch_id, checkpoint.clone());
        Ok(())
    }

    fn clear(&self, batch_id: Uuid) -> Result<()> {
        self.batches()?.remove(&batch_id);
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_store_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCheckpointStore::new(dir.path());
        let batch = Uuid::new_v4();

        let mut cp = store.load(batch).unwrap();
        assert!(cp.completed.is_empty());

        let unit = Uuid::new_v4();
        cp.mark_done(unit);
        store.save(&cp).unwrap();
        assert!(dir.path().join(CHECKPOINTS_DIR).join(format!("{batch}.json")).exists());

        let reloaded = store.load(batch).unwrap();
        assert!(reloaded.is_done(&unit));

        store.clear(batch).unwrap();
        store.clear(batch).unwrap();
        assert!(store.load(batch).unwrap().completed.is_empty());
    }

    #[test]
    fn memory_store_is_per_batch() {
        let store = MemoryCheckpointStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut cp = Checkpoint::new(a);
        cp.mark_done(Uuid::nil());
        store.save(&cp).unwrap();

        assert!(store.load(a).unwrap().is_done(&Uuid::nil()));
        assert!(!store.load(b).unwrap().is_done(&Uuid::nil()));
    }
}
