//! Child process execution shared by the discovery backend and tool runner.

use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use sweepr_common::{Error, Result};
use tokio::process::Command;
use tracing::debug;

/// Exit code shells use for "command not found".
pub const EXIT_NOT_FOUND: i32 = 127;

#[derive(Debug, Clone)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().chain(self.stderr.lines())
    }

    /// Last few stderr lines, for error messages.
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.lines().filter(|l| !l.trim().is_empty()).collect();
        all[all.len().saturating_sub(lines)..].join(" | ")
    }

    /// Maps a non-zero exit to the matching error, naming `program`.
    pub fn into_result(self, program: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        if self.status.code() == Some(EXIT_NOT_FOUND) {
            return Err(Error::ToolMissing {
                program: program.to_string(),
            });
        }
        Err(Error::ExecutionFailure {
            program: program.to_string(),
            status: self.status.to_string(),
            detail: self.stderr_tail(3),
        })
    }
}

/// Kills a child's whole process group on drop unless disarmed.
struct GroupGuard {
    pgid: Option<i32>,
}

impl GroupGuard {
    fn disarm(mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.take() {
            // SAFETY: killpg takes no pointers. The group id stays reserved
            // while any member is unreaped.
            if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
                debug!(pgid, "killed process group");
            }
        }
    }
}

/// Runs `cmd` to completion within `deadline`, capturing both streams.
///
/// The child leads its own process group. Dropping the returned future
/// (deadline hit, or a caller racing it against cancellation) kills the
/// group, so pipelines and helpers forked by the tool go down with it.
pub async fn run_captured(mut cmd: Command, program: &str, deadline: Duration) -> Result<Captured> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let started = Instant::now();
    let child = cmd.spawn().map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::ToolMissing {
            program: program.to_string(),
        },
        _ => Error::ExecutionFailure {
            program: program.to_string(),
            status: "spawn failed".to_string(),
            detail: e.to_string(),
        },
    })?;
    debug!(program, pid = child.id(), "spawned");
    let guard = GroupGuard {
        pgid: if cfg!(unix) {
            child.id().and_then(|id| i32::try_from(id).ok())
        } else {
            None
        },
    };

    let output = match tokio::time::timeout(deadline, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            guard.disarm();
            output
        }
        Ok(Err(e)) => {
            return Err(Error::ExecutionFailure {
                program: program.to_string(),
                status: "wait failed".to_string(),
                detail: e.to_string(),
            });
        }
        Err(_) => {
            return Err(Error::Timeout {
                program: program.to_string(),
                after: deadline,
            });
        }
    };

    Ok(Captured {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        elapsed: started.elapsed(),
    })
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
