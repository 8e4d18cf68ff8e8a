//! Project persistence.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use std::{fs, io};

use serde::Serialize;
use sweepr_common::model::Project;
use sweepr_common::{Error, Result};
use tracing::debug;

/// Receives the project after every merge and proof append, inside the same
/// critical section that made the change.
pub trait ProjectStore: Send + Sync {
    fn save(&self, project: &Project) -> Result<()>;
}

/// One JSON file per project.
#[derive(Debug, Clone)]
pub struct JsonProjectStore {
    path: PathBuf,
}

impl JsonProjectStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Project> {
        let raw = fs::read_to_string(&self.path).map_err(|e| Error::io(&self.path, e))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::config(format!("{} is not a project file: {e}", self.path.display())))
    }

    /// Loads the project, or starts a new one named `name` if the file does
    /// not exist yet.
    pub fn load_or_create(&self, name: &str) -> Result<Project> {
        if self.path.exists() {
            self.load()
        } else {
            debug!(path = %self.path.display(), "starting new project");
            Ok(Project::new(name))
        }
    }
}

impl ProjectStore for JsonProjectStore {
    fn save(&self, project: &Project) -> Result<()> {
        write_json_atomic(&self.path, project)
    }
}

/// Keeps the last saved copy in memory.
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    saved: Mutex<Option<Project>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_saved(&self) -> Option<Project> {
        self.saved.lock().ok().and_then(|saved| saved.clone())
    }
}

impl ProjectStore for MemoryProjectStore {
    fn save(&self, project: &Project) -> Result<()> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| Error::config("project store poisoned"))?;
        *saved = Some(project.clone());
        Ok(())
    }
}

/// Serializes `value` to a sibling temp file and renames it over `path`, so
/// readers never observe a half-written file.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("state");
    let tmp = parent
        .unwrap_or(Path::new("."))
        .join(format!(".{file_name}.tmp.{nanos}"));

    let result: io::Result<()> = fs::write(&tmp, &bytes).and_then(|_| fs::rename(&tmp, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(Error::io(path, e));
    }
    Ok(())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
