use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sweepr_common::config::EngineConfig;
use sweepr_common::rules::{RerunPolicy, RuleTable};
use sweepr_common::{Error, Result};
use sweepr_core::checkpoint::CheckpointStore;
use sweepr_core::partition::ScanUnit;
use sweepr_core::scanner::{DiscoveryBackend, RawOutput, ScanPlan};
use sweepr_core::{Engine, ScanRequest};
use sweepr_plugins::probe::ContentProbe;
use sweepr_plugins::runner::{ToolOutput, ToolRequest, ToolRunner};

/// Open `(port, service name)` pairs per live address.
pub type Network = BTreeMap<IpAddr, Vec<(u16, &'static str)>>;

pub fn network(hosts: &[(&str, &[(u16, &'static str)])]) -> Network {
    hosts
        .iter()
        .map(|(ip, ports)| (ip.parse().unwrap(), ports.to_vec()))
        .collect()
}

/// Renders the subset of nmap XML the ingester reads.
pub fn nmap_xml<'a>(hosts: impl IntoIterator<Item = (&'a IpAddr, &'a Vec<(u16, &'static str)>)>) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<!DOCTYPE nmaprun>\n<nmaprun scanner=\"nmap\">\n");
    for (ip, ports) in hosts {
        let addrtype = if ip.is_ipv4() { "ipv4" } else { "ipv6" };
        xml.push_str(&format!(
            "<host><status state=\"up\"/><address addr=\"{ip}\" addrtype=\"{addrtype}\"/><ports>"
        ));
        for (port, name) in ports {
            xml.push_str(&format!(
                "<port protocol=\"tcp\" portid=\"{port}\"><state state=\"open\"/><service name=\"{name}\"/></port>"
            ));
        }
        xml.push_str("</ports></host>\n");
    }
    xml.push_str("</nmaprun>\n");
    xml
}

/// Answers every unit with the live hosts it covers. Units whose label is in
/// `failing` fail with a retryable error until [`FakeBackend::heal`].
pub struct FakeBackend {
    network: Network,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, usize>>,
    running: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl FakeBackend {
    pub fn new(network: Network) -> Arc<Self> {
        Arc::new(Self {
            network,
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_millis(25),
        })
    }

    pub fn fail(&self, label: &str) {
        self.failing.lock().unwrap().insert(label.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self, label: &str) -> usize {
        self.calls.lock().unwrap().get(label).copied().unwrap_or(0)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryBackend for FakeBackend {
    async fn discover(&self, unit: &ScanUnit, _plan: &ScanPlan) -> Result<RawOutput> {
        let label = unit.label();
        *self.calls.lock().unwrap().entry(label.clone()).or_default() += 1;

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(&label) {
            return Err(Error::ExecutionFailure {
                program: "nmap".into(),
                status: "exit status: 1".into(),
                detail: "QUITTING!".into(),
            });
        }

        let covered: Vec<IpAddr> = unit.addresses().filter(|ip| self.network.contains_key(ip)).collect();
        let hosts = covered.iter().filter_map(|ip| self.network.get_key_value(ip));
        Ok(RawOutput {
            report: nmap_xml(hosts),
            evidence: None,
            command: format!("nmap {}", unit.target_args().join(" ")),
        })
    }
}

/// Records every command; fails while `failing` is set.
#[derive(Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolRunner for RecordingRunner {
    async fn run(&self, request: &ToolRequest) -> Result<ToolOutput> {
        self.commands.lock().unwrap().push(request.command.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::ExecutionFailure {
                program: request.program().to_string(),
                status: "exit status: 2".into(),
                detail: "connection refused".into(),
            });
        }
        Ok(ToolOutput {
            stdout: format!("[{}] done", request.tool_id),
            stderr: String::new(),
        })
    }
}

/// Serves fixed bodies by URL; anything else is an empty page.
#[derive(Default)]
pub struct CannedProbe {
    pages: HashMap<String, String>,
}

impl CannedProbe {
    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl ContentProbe for CannedProbe {
    async fn fetch(&self, url: &str) -> Result<String> {
        Ok(self.pages.get(url).cloned().unwrap_or_default())
    }
}

pub fn config(output_root: &Path, policy: RerunPolicy) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.scan.output_root = output_root.to_path_buf();
    config.scan.retry_backoff_ms = 1;
    config.rerun = policy;
    config
}

pub fn engine(
    config: EngineConfig,
    rules: &str,
    backend: Arc<FakeBackend>,
    runner: Arc<RecordingRunner>,
    probe: CannedProbe,
    checkpoints: Arc<dyn CheckpointStore>,
) -> Engine {
    Engine::new(config, RuleTable::from_json(rules).unwrap())
        .unwrap()
        .with_backend(backend)
        .with_runner(runner)
        .with_probe(Arc::new(probe))
        .with_checkpoints(checkpoints)
}

pub fn request(target: &str, automate: bool) -> ScanRequest {
    ScanRequest {
        target: target.parse().unwrap(),
        target_label: target.to_string(),
        profile: "top100".parse().unwrap(),
        asset_name: None,
        automate,
    }
}
