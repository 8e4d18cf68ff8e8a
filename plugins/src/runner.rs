//! Execution of auxiliary tools.

use std::time::Duration;

use async_trait::async_trait;
use sweepr_common::Result;
use tokio::process::Command;
use tracing::debug;

use crate::process::{self, Captured};

/// One rendered firing, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequest {
    pub tool_id: String,
    pub command: String,
    pub timeout: Duration,
}

impl ToolRequest {
    /// First word of the command, used to name the tool in errors.
    pub fn program(&self) -> &str {
        self.command.split_whitespace().next().unwrap_or(&self.tool_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs a firing to completion. `Ok` means the tool exited successfully;
/// a non-zero exit, timeout or missing program is an `Err`.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, request: &ToolRequest) -> Result<ToolOutput>;
}

/// Runs commands through `sh -c`.
#[derive(Debug, Clone)]
pub struct ProcessToolRunner {
    shell: String,
}

impl Default for ProcessToolRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl ProcessToolRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run(&self, request: &ToolRequest) -> Result<ToolOutput> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(&request.command);

        let program = request.program();
        let captured: Captured = process::run_captured(cmd, program, request.timeout)
            .await?
            .into_result(program)?;
        debug!(
            tool = %request.tool_id,
            elapsed_ms = captured.elapsed.as_millis() as u64,
            "tool exited cleanly"
        );

        Ok(ToolOutput {
            stdout: captured.stdout,
            stderr: captured.stderr,
        })
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
