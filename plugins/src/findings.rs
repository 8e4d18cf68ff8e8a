//! Findings extraction from vulnerability-template tool output.
//!
//! The tool writes one JSON object per match. Only the fields below are
//! read; lines that are blank or not JSON are skipped.

use std::path::Path;

use serde::Deserialize;
use sweepr_common::model::{Finding, Severity};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Match {
    #[serde(rename = "template-id", default)]
    template_id: String,
    #[serde(default)]
    info: MatchInfo,
    #[serde(rename = "matched-at", default)]
    matched_at: String,
}

#[derive(Debug, Default, Deserialize)]
struct MatchInfo {
    name: Option<String>,
    severity: Option<String>,
    #[serde(default)]
    description: String,
}

/// Turns JSONL `output` into findings on `host_id`, pointing back at the
/// file they came from.
pub fn parse_template_matches(
    output: &str,
    host_id: u32,
    port: u16,
    proof_file: &Path,
) -> Vec<Finding> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<Match>(line) {
            Ok(found) => Some(found),
            Err(e) => {
                debug!("skipping unreadable match line: {e}");
                None
            }
        })
        .map(|found| {
            let name = found.info.name.unwrap_or_else(|| found.template_id.clone());
            let severity = Severity::parse(found.info.severity.as_deref().unwrap_or("info"));
            let mut finding = Finding::new(host_id, name, severity);
            finding.description = if found.info.description.is_empty() {
                format!("Matched at: {}", found.matched_at)
            } else {
                format!("{}\n\nMatched at: {}", found.info.description.trim(), found.matched_at)
            };
            finding.port = Some(port);
            finding.proof_file = Some(proof_file.to_path_buf());
            finding
        })
        .collect()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
