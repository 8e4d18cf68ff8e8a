//! Error taxonomy shared by every sweepr crate.
//!
//! Configuration errors are fatal before any work starts. Everything else is
//! scoped to a single scan unit or tool firing and ends up in the run summary.

use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed target expression, unknown scan profile, malformed rule table.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The discovery or automation program could not be found.
    #[error("external tool not found: {program}")]
    ToolMissing { program: String },

    #[error("{program} timed out after {}s", .after.as_secs())]
    Timeout { program: String, after: Duration },

    #[error("{program} failed ({status}): {detail}")]
    ExecutionFailure {
        program: String,
        status: String,
        detail: String,
    },

    /// The discovery program produced output we cannot read.
    #[error("malformed scan output: {0}")]
    Parse(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a scan unit hitting this error should be attempted again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ExecutionFailure { .. })
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
