//! Output artifact naming for tool firings.
//!
//! Paths look like `<root>/auto_tools/<tool>_<ip>_<port>_<proto>_<millis>.<ext>`.
//! A `-N` suffix is added when the name is already taken on disk or by
//! another firing in this process.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use sweepr_common::model::ServiceKey;
use sweepr_common::naming::sanitize_ip;
use sweepr_common::{Error, Result};

pub const AUTO_TOOLS_DIR: &str = "auto_tools";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub output: PathBuf,
    pub screenshot: PathBuf,
}

#[derive(Debug)]
pub struct ArtifactAllocator {
    dir: PathBuf,
    reserved: Mutex<HashSet<PathBuf>>,
}

impl ArtifactAllocator {
    pub fn new(output_root: &Path) -> Self {
        Self {
            dir: output_root.join(AUTO_TOOLS_DIR),
            reserved: Mutex::new(HashSet::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserves a fresh output path (and sibling screenshot path) for one
    /// firing of `tool_id` against `key`.
    pub fn allocate(
        &self,
        tool_id: &str,
        key: &ServiceKey,
        extension: &str,
        at: DateTime<Utc>,
    ) -> Result<ArtifactPaths> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;

        let stem = format!(
            "{tool_id}_{}_{}_{}_{}",
            sanitize_ip(&key.ip),
            key.port,
            key.protocol,
            at.timestamp_millis()
        );

        let mut reserved = self
            .reserved
            .lock()
            .map_err(|_| Error::config("artifact registry poisoned"))?;

        let mut attempt = 0u32;
        loop {
            let name = match attempt {
                0 => stem.clone(),
                n => format!("{stem}-{n}"),
            };
            let output = self.dir.join(format!("{name}.{extension}"));
            let screenshot = self.dir.join(format!("{name}.png"));
            if !output.exists() && !screenshot.exists() && !reserved.contains(&output) {
                reserved.insert(output.clone());
                return Ok(ArtifactPaths { output, screenshot });
            }
            attempt += 1;
        }
    }
}

/// Writes a tool's console output to `path`, in the layout used for
/// artifacts the tool did not write itself.
pub fn persist_capture(
    path: &Path,
    command: &str,
    at: DateTime<Utc>,
    stdout: &str,
    stderr: &str,
) -> Result<()> {
    let body = format!(
        "Command: {command}\nTimestamp: {}\n\nSTDOUT:\n{stdout}\n\nSTDERR:\n{stderr}\n",
        at.to_rfc3339()
    );
    fs::write(path, body).map_err(|e| Error::io(path, e))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
