use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use sweepr_common::profile::{HTTP_PORTS, NETSEC_KNOWN_PORTS, ScanProfile};

/// Where nmap reads its targets from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NmapTargets {
    Inline(Vec<String>),
    /// A host file passed with `-iL`.
    File(PathBuf),
}

/// A fully built invocation: the program to spawn and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NmapInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl NmapInvocation {
    /// Shell-quoted rendering for logs and evidence.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Builder for a discovery run. Flags are emitted in a fixed order so the
/// same options always produce the same command line.
#[derive(Debug, Clone)]
pub struct NmapCommand {
    program: String,
    profile: ScanProfile,
    sudo: bool,
    verbose: bool,
    skip_host_discovery: bool,
    timing: Option<u8>,
    max_retries: Option<u32>,
    stats_every: Option<String>,
    interface: Option<String>,
    exclude_ports: BTreeSet<u16>,
    user_agent: Option<String>,
}

impl NmapCommand {
    pub fn new(program: impl Into<String>, profile: ScanProfile) -> Self {
        Self {
            program: program.into(),
            profile,
            sudo: false,
            verbose: false,
            skip_host_discovery: false,
            timing: None,
            max_retries: None,
            stats_every: None,
            interface: None,
            exclude_ports: BTreeSet::new(),
            user_agent: None,
        }
    }

    pub fn sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn skip_host_discovery(mut self, skip: bool) -> Self {
        self.skip_host_discovery = skip;
        self
    }

    /// Out-of-range values are ignored.
    pub fn timing(mut self, timing: Option<u8>) -> Self {
        self.timing = timing.filter(|t| (1..=5).contains(t));
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn stats_every(mut self, interval: impl Into<String>) -> Self {
        let interval = interval.into();
        self.stats_every = (!interval.is_empty()).then_some(interval);
        self
    }

    pub fn interface(mut self, interface: Option<&str>) -> Self {
        self.interface = interface.map(str::to_string);
        self
    }

    pub fn exclude_ports(mut self, ports: &BTreeSet<u16>) -> Self {
        self.exclude_ports = ports.clone();
        self
    }

    pub fn user_agent(mut self, agent: Option<&str>) -> Self {
        self.user_agent = agent.map(str::to_string);
        self
    }

    pub fn build(self, targets: &NmapTargets, xml_output: &Path) -> NmapInvocation {
        let mut args: Vec<String> = Vec::new();
        let program = if self.sudo {
            args.push(self.program.clone());
            "sudo".to_string()
        } else {
            self.program.clone()
        };

        match &self.profile {
            ScanProfile::Ping => args.push("-sn".into()),
            ScanProfile::Top100 => push_all(&mut args, &["--top-ports", "100", "-sV"]),
            ScanProfile::Top1000 => push_all(&mut args, &["--top-ports", "1000", "-sV"]),
            ScanProfile::HttpPorts => push_all(&mut args, &["-p", HTTP_PORTS, "-sV"]),
            ScanProfile::NetsecKnown => push_all(&mut args, &["-p", NETSEC_KNOWN_PORTS, "-sV"]),
            ScanProfile::AllPorts => push_all(&mut args, &["-p-", "-sV"]),
            ScanProfile::Custom(ports) => push_all(&mut args, &["-p", ports, "-sV"]),
        }

        if self.verbose {
            args.push("-v".into());
        }
        if self.skip_host_discovery {
            args.push("-Pn".into());
        }
        if let Some(timing) = self.timing {
            args.push(format!("-T{timing}"));
        }
        if let Some(retries) = self.max_retries {
            push_all(&mut args, &["--max-retries", &retries.to_string()]);
        }
        if let Some(interval) = &self.stats_every {
            push_all(&mut args, &["--stats-every", interval]);
        }
        if let Some(interface) = &self.interface {
            push_all(&mut args, &["-e", interface]);
        }
        if !self.exclude_ports.is_empty() && !self.profile.is_discovery_only() {
            let list = self
                .exclude_ports
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(",");
            push_all(&mut args, &["--exclude-ports", &list]);
        }
        if let Some(agent) = &self.user_agent {
            if !self.profile.is_discovery_only() {
                push_all(&mut args, &["--script-args", &format!("http.useragent={agent}")]);
            }
        }

        match targets {
            NmapTargets::Inline(hosts) => args.extend(hosts.iter().cloned()),
            NmapTargets::File(path) => {
                push_all(&mut args, &["-iL", &path.display().to_string()]);
            }
        }
        push_all(&mut args, &["-oX", &xml_output.display().to_string()]);

        NmapInvocation { program, args }
    }
}

fn push_all(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:,=@%+".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
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
