//! # Automation Rule Table
//!
//! Rules decide which auxiliary tool runs against which discovered service.
//! The table is loaded once per run from JSON records of the form
//!
//! ```json
//! { "ports": [80, 443], "service_names": ["http"], "tool_name": "Nuclei Web",
//!   "tool_type": "nuclei", "regex_match": null, "command": "..." }
//! ```
//!
//! and validated completely at load time, so evaluation never meets an
//! unknown tool type or a broken regex.

use std::{collections::BTreeSet, fs, path::Path, sync::Arc};

use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::naming::sanitize_for_filename;

pub mod policy;
pub mod template;

pub use policy::RerunPolicy;
pub use template::{CommandTemplate, Placeholder, TemplateValues};

/// The kind of tool a rule drives. Each kind carries what it needs to decide
/// eligibility beyond the port/name predicate.
#[derive(Debug, Clone)]
pub enum ToolKind {
    NmapScript,
    /// Eligible only when the service's response content matches `pattern`.
    HttpRegex { pattern: Regex },
    VulnTemplate { template: Option<String> },
    Generic,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NmapScript => "nmap_custom",
            Self::HttpRegex { .. } => "http_custom",
            Self::VulnTemplate { .. } => "nuclei",
            Self::Generic => "generic",
        }
    }

    /// Artifact extension for the tool's primary output.
    pub fn output_extension(&self) -> &'static str {
        match self {
            Self::VulnTemplate { .. } => "jsonl",
            _ => "txt",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub tool_name: String,
    /// Identifier recorded on proofs; re-run suppression keys on it.
    pub tool_id: String,
    pub ports: BTreeSet<u16>,
    /// Lowercased service names.
    pub service_names: Vec<String>,
    pub kind: ToolKind,
    pub command: CommandTemplate,
}

impl Rule {
    /// `port ∈ ports OR service_name ∈ service_names`, names compared
    /// case-insensitively but otherwise exactly: `http` does not catch
    /// `ssl/http` or `http-proxy`, so a table wanting those lists them too.
    pub fn matches_service(&self, port: u16, service_name: &str) -> bool {
        if self.ports.contains(&port) {
            return true;
        }
        let name = service_name.trim().to_ascii_lowercase();
        !name.is_empty() && self.service_names.iter().any(|n| *n == name)
    }

    pub fn needs_content_probe(&self) -> bool {
        matches!(self.kind, ToolKind::HttpRegex { .. })
    }

    /// Extra eligibility check for kinds that inspect response content.
    /// Kinds without such a check always pass.
    pub fn content_matches(&self, content: &str) -> bool {
        match &self.kind {
            ToolKind::HttpRegex { pattern } => pattern.is_match(content),
            _ => true,
        }
    }

    pub fn captures_screenshot(&self) -> bool {
        self.command.uses(Placeholder::ScreenshotPath)
    }
}

/// Raw record as it appears in the rule file. Field aliases accept the
/// singular names older rule files use.
#[derive(Debug, Deserialize)]
struct RuleRecord {
    #[serde(default, alias = "port")]
    ports: Vec<u16>,
    #[serde(default, alias = "service_name")]
    service_names: Vec<String>,
    #[serde(default)]
    tool_name: String,
    #[serde(default)]
    tool_type: String,
    #[serde(default)]
    regex_match: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    nuclei_template: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RuleFile {
    List(Vec<RuleRecord>),
    Wrapped { tools: Vec<RuleRecord> },
}

/// Ordered, read-only rule table shared by the matcher and the executor.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Arc<Rule>>,
}

impl RuleTable {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: RuleFile = serde_json::from_str(raw)
            .map_err(|e| Error::config(format!("malformed rule table: {e}")))?;
        let records = match file {
            RuleFile::List(records) | RuleFile::Wrapped { tools: records } => records,
        };

        let mut seen = BTreeSet::new();
        let mut rules = Vec::with_capacity(records.len());
        for (idx, record) in records.into_iter().enumerate() {
            let rule = build_rule(record)
                .map_err(|e| Error::config(format!("rule #{idx}: {}", strip_prefix(&e))))?;
            if !seen.insert(rule.tool_id.clone()) {
                return Err(Error::config(format!(
                    "rule #{idx}: duplicate tool '{}'",
                    rule.tool_id
                )));
            }
            rules.push(Arc::new(rule));
        }

        Ok(Self { rules })
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self {
            rules: rules.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn strip_prefix(err: &Error) -> String {
    match err {
        Error::Configuration(msg) => msg.clone(),
        other => other.to_string(),
    }
}

fn build_rule(record: RuleRecord) -> Result<Rule> {
    let tool_name = record.tool_name.trim().to_string();
    let safe_name = sanitize_for_filename(&tool_name);
    if safe_name.is_empty() {
        return Err(Error::config("tool_name is missing"));
    }
    if record.ports.is_empty() && record.service_names.is_empty() {
        return Err(Error::config(format!(
            "'{tool_name}' matches nothing: give ports or service_names"
        )));
    }
    if record.ports.contains(&0) {
        return Err(Error::config(format!("'{tool_name}' lists port 0")));
    }

    let kind = match record.tool_type.trim() {
        "nmap_custom" => ToolKind::NmapScript,
        "http_custom" => {
            let raw = record.regex_match.as_deref().unwrap_or("").trim();
            if raw.is_empty() {
                return Err(Error::config(format!(
                    "'{tool_name}' is http_custom but has no regex_match"
                )));
            }
            let pattern = Regex::new(raw)
                .map_err(|e| Error::config(format!("'{tool_name}' has a bad regex: {e}")))?;
            ToolKind::HttpRegex { pattern }
        }
        "nuclei" => ToolKind::VulnTemplate {
            template: record.nuclei_template.clone(),
        },
        "generic" => ToolKind::Generic,
        "" => return Err(Error::config(format!("'{tool_name}' has no tool_type"))),
        other => {
            return Err(Error::config(format!(
                "'{tool_name}' has unknown tool_type '{other}'"
            )));
        }
    };

    if record.regex_match.is_some() && !matches!(kind, ToolKind::HttpRegex { .. }) {
        return Err(Error::config(format!(
            "'{tool_name}': regex_match is only valid for http_custom"
        )));
    }

    let tool_id = match (&kind, &record.nuclei_template) {
        (ToolKind::NmapScript, _) => format!("nmap_{safe_name}"),
        (ToolKind::HttpRegex { .. }, Some(_)) => format!("nuclei_{safe_name}"),
        (ToolKind::HttpRegex { .. }, None) => format!("http_{safe_name}"),
        (ToolKind::VulnTemplate { .. }, _) => format!("nuclei_{safe_name}"),
        (ToolKind::Generic, _) => safe_name,
    };

    let command = match record.command.as_deref().map(str::trim) {
        Some(cmd) if !cmd.is_empty() => CommandTemplate::parse(cmd)?,
        _ => match record.nuclei_template.as_deref() {
            Some(template) if !matches!(kind, ToolKind::NmapScript | ToolKind::Generic) => {
                CommandTemplate::parse(&nuclei_command(Some(template)))?
            }
            _ if matches!(kind, ToolKind::VulnTemplate { .. }) => {
                CommandTemplate::parse(&nuclei_command(None))?
            }
            _ => return Err(Error::config(format!("'{tool_name}' has no command"))),
        },
    };

    Ok(Rule {
        tool_name,
        tool_id,
        ports: record.ports.into_iter().collect(),
        service_names: record
            .service_names
            .iter()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        kind,
        command,
    })
}

fn nuclei_command(template: Option<&str>) -> String {
    let mut cmd = String::from("nuclei -u {url} -jsonl -o {output_path} -silent");
    if let Some(template) = template {
        cmd.push_str(" -t ");
        cmd.push_str(template);
    }
    cmd
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
