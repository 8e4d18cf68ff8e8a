//! # Automation Matcher
//!
//! Decides which rules fire against which services. Every rule is checked
//! against every service in table order; a service can satisfy several
//! rules and each is decided on its own. Content-matching rules fetch the
//! service's response once per pass, shared by every such rule.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sweepr_common::model::{Proof, Service, ServiceKey};
use sweepr_common::rules::{RerunPolicy, Rule, RuleTable};
use sweepr_plugins::probe::ContentProbe;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use sweepr_common::model::Project;

/// A matched (service, rule) pair cleared for execution.
#[derive(Debug, Clone)]
pub struct FiringDecision {
    pub key: ServiceKey,
    /// Service as it was when the decision was made.
    pub service: Service,
    pub rule: Arc<Rule>,
}

impl FiringDecision {
    pub fn pair(&self) -> (ServiceKey, String) {
        (self.key, self.rule.tool_id.clone())
    }
}

/// Re-run suppression. `prior` is every proof the rule's tool has left on
/// the service; failed runs leave none.
pub fn should_fire<'a>(
    policy: RerunPolicy,
    prior: impl IntoIterator<Item = &'a Proof>,
    now: DateTime<Utc>,
) -> bool {
    let latest = prior.into_iter().map(|proof| proof.completed_at).max();
    match (policy, latest) {
        (RerunPolicy::Always, _) => true,
        (_, None) => true,
        (RerunPolicy::Never, Some(_)) => false,
        (RerunPolicy::OlderThanDays(days), Some(latest)) => {
            now - latest > Duration::days(i64::from(days))
        }
    }
}

pub struct AutomationMatcher {
    rules: Arc<RuleTable>,
    policy: RerunPolicy,
    probe: Arc<dyn ContentProbe>,
}

impl AutomationMatcher {
    pub fn new(rules: Arc<RuleTable>, policy: RerunPolicy, probe: Arc<dyn ContentProbe>) -> Self {
        Self {
            rules,
            policy,
            probe,
        }
    }

    pub fn policy(&self) -> RerunPolicy {
        self.policy
    }

    /// Evaluates `keys` against the rule table. Services are snapshotted
    /// under the project lock, so proof history is read consistently with
    /// concurrent merges and proof appends.
    pub async fn evaluate(
        &self,
        project: &Mutex<Project>,
        keys: &[ServiceKey],
        now: DateTime<Utc>,
    ) -> Vec<FiringDecision> {
        if self.rules.is_empty() {
            return Vec::new();
        }

        let snapshot: Vec<(ServiceKey, Service)> = {
            let project = project.lock().await;
            let mut seen = HashSet::new();
            keys.iter()
                .filter(|key| seen.insert(**key))
                .filter_map(|key| project.service(key).map(|svc| (*key, svc.clone())))
                .collect()
        };

        let mut decisions = Vec::new();
        let mut queued = HashSet::new();
        let mut content: HashMap<ServiceKey, Option<String>> = HashMap::new();

        for (key, service) in snapshot {
            for rule in self.rules.iter() {
                if !rule.matches_service(service.port, &service.name) {
                    continue;
                }

                if rule.needs_content_probe() {
                    if !content.contains_key(&key) {
                        let fetched = self.fetch(&key, &service).await;
                        content.insert(key, fetched);
                    }
                    let matched = content
                        .get(&key)
                        .and_then(Option::as_deref)
                        .is_some_and(|body| rule.content_matches(body));
                    if !matched {
                        debug!(service = %key, tool = %rule.tool_id, "response content did not match");
                        continue;
                    }
                }

                if !should_fire(self.policy, service.proofs_for(&rule.tool_id), now) {
                    debug!(service = %key, tool = %rule.tool_id, policy = %self.policy, "suppressed by rerun policy");
                    continue;
                }

                if queued.insert((key, rule.tool_id.clone())) {
                    decisions.push(FiringDecision {
                        key,
                        service: service.clone(),
                        rule: Arc::clone(rule),
                    });
                }
            }
        }
        decisions
    }

    /// A failed probe makes content rules ineligible for this pass only.
    async fn fetch(&self, key: &ServiceKey, service: &Service) -> Option<String> {
        let url = service.url(&key.ip);
        match self.probe.fetch(&url).await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(service = %key, "content probe failed: {e}");
                None
            }
        }
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
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use sweepr_common::model::Protocol;
    use sweepr_common::{Error, Result};

    struct CannedProbe {
        body: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentProbe for CannedProbe {
        async fn fetch(&self, _url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.body
                .map(str::to_string)
                .ok_or_else(|| Error::parse("connection refused"))
        }
    }

    fn probe(body: Option<&'static str>) -> Arc<CannedProbe> {
        Arc::new(CannedProbe {
            body,
            calls: AtomicUsize::new(0),
        })
    }

    fn proof(tool: &str, age: Duration) -> Proof {
        Proof {
            tool: tool.into(),
            command: "x".into(),
            result_paths: vec![],
            screenshot_path: None,
            completed_at: Utc::now() - age,
        }
    }

    const RULES: &str = r#"[
        {"ports": [80, 443], "tool_name": "Web Scan", "tool_type": "nuclei"},
        {"service_names": ["http"], "tool_name": "Headers", "tool_type": "generic",
         "command": "curl -sI {url} -o {output_path}"},
        {"ports": [80], "tool_name": "WordPress", "tool_type": "http_custom",
         "regex_match": "wp-content", "command": "wpscan --url {url} -o {output_path}"},
        {"ports": [80], "tool_name": "Drupal", "tool_type": "http_custom",
         "regex_match": "Drupal", "command": "droopescan scan -u {url}"}
    ]"#;

    fn project_with(services: Vec<Service>) -> (Mutex<Project>, Vec<ServiceKey>) {
        let mut project = Project::new("acme");
        let ip = "10.0.0.5".parse().unwrap();
        let keys = services
            .iter()
            .map(|svc| ServiceKey::new(ip, svc.port, svc.protocol))
            .collect();
        project.upsert_host(ip).services = services;
        (Mutex::new(project), keys)
    }

    fn matcher(policy: RerunPolicy, probe: Arc<CannedProbe>) -> AutomationMatcher {
        AutomationMatcher::new(Arc::new(RuleTable::from_json(RULES).unwrap()), policy, probe)
    }

    fn tools(decisions: &[FiringDecision]) -> Vec<&str> {
        decisions.iter().map(|d| d.rule.tool_id.as_str()).collect()
    }

    #[test]
    fn older_than_days_boundaries() {
        let now = Utc::now();
        let policy = RerunPolicy::OlderThanDays(2);
        assert!(!should_fire(policy, [&proof("t", Duration::days(1))], now));
        assert!(should_fire(policy, [&proof("t", Duration::days(3))], now));
        assert!(should_fire(policy, std::iter::empty(), now));
    }

    #[test]
    fn newest_proof_decides() {
        let now = Utc::now();
        let old = proof("t", Duration::days(10));
        let fresh = proof("t", Duration::hours(2));
        assert!(!should_fire(RerunPolicy::OlderThanDays(2), [&old, &fresh], now));
    }

    #[test]
    fn always_and_never() {
        let now = Utc::now();
        let prior = proof("t", Duration::days(365));
        assert!(should_fire(RerunPolicy::Always, [&prior], now));
        assert!(!should_fire(RerunPolicy::Never, [&prior], now));
        assert!(should_fire(RerunPolicy::Never, std::iter::empty(), now));
    }

    #[tokio::test]
    async fn port_rule_matches_http_but_not_ssh() {
        let (project, keys) = project_with(vec![
            Service::new(80, Protocol::Tcp).with_name("http"),
            Service::new(22, Protocol::Tcp).with_name("ssh"),
        ]);
        let decisions = matcher(RerunPolicy::default(), probe(Some("<html></html>")))
            .evaluate(&project, &keys, Utc::now())
            .await;

        assert!(decisions.iter().all(|d| d.key.port == 80));
        assert_eq!(tools(&decisions), vec!["nuclei_web_scan", "headers"]);
    }

    #[tokio::test]
    async fn content_rules_share_one_probe_per_service() {
        let (project, keys) = project_with(vec![Service::new(80, Protocol::Tcp).with_name("http")]);
        let probe = probe(Some("<link href=\"/wp-content/themes/x.css\">"));
        let decisions = matcher(RerunPolicy::default(), probe.clone())
            .evaluate(&project, &keys, Utc::now())
            .await;

        assert_eq!(
            tools(&decisions),
            vec!["nuclei_web_scan", "headers", "http_wordpress"]
        );
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_probe_skips_only_content_rules() {
        let (project, keys) = project_with(vec![Service::new(80, Protocol::Tcp).with_name("http")]);
        let decisions = matcher(RerunPolicy::default(), probe(None))
            .evaluate(&project, &keys, Utc::now())
            .await;
        assert_eq!(tools(&decisions), vec!["nuclei_web_scan", "headers"]);
    }

    #[tokio::test]
    async fn recent_proof_suppresses_only_its_tool() {
        let mut web = Service::new(80, Protocol::Tcp).with_name("http");
        web.proofs.push(proof("nuclei_web_scan", Duration::hours(5)));
        let (project, keys) = project_with(vec![web]);

        let decisions = matcher(RerunPolicy::OlderThanDays(2), probe(Some("")))
            .evaluate(&project, &keys, Utc::now())
            .await;
        assert_eq!(tools(&decisions), vec!["headers"]);
    }

    #[tokio::test]
    async fn duplicate_keys_are_decided_once() {
        let (project, keys) = project_with(vec![Service::new(443, Protocol::Tcp).with_name("https")]);
        let doubled: Vec<ServiceKey> = keys.iter().chain(keys.iter()).copied().collect();
        let decisions = matcher(RerunPolicy::Always, probe(Some("")))
            .evaluate(&project, &doubled, Utc::now())
            .await;
        assert_eq!(tools(&decisions), vec!["nuclei_web_scan"]);
    }
}
