use std::sync::Arc;

use chrono::{Duration, Utc};
use sweepr_common::model::{Project, Proof, Protocol, Service, ServiceKey};
use sweepr_common::rules::RerunPolicy;
use sweepr_core::checkpoint::MemoryCheckpointStore;
use sweepr_core::store::JsonProjectStore;
use sweepr_core::{SharedProject, shared};
use tokio_util::sync::CancellationToken;

use crate::support::{CannedProbe, FakeBackend, RecordingRunner, config, engine, network, request};

const NUCLEI: &str = r#"[{"ports": [80, 443], "tool_name": "Nuclei", "tool_type": "nuclei", "regex_match": null}]"#;

fn key(ip: &str, port: u16) -> ServiceKey {
    ServiceKey::new(ip.parse().unwrap(), port, Protocol::Tcp)
}

/// A project that already knows 10.0.0.5:80/http, optionally with a proof
/// from the nuclei rule `age` ago.
fn seeded(age: Option<Duration>) -> SharedProject {
    let mut project = Project::new("seeded");
    let ip = "10.0.0.5".parse().unwrap();
    let mut service = Service::new(80, Protocol::Tcp).with_name("http");
    if let Some(age) = age {
        service.proofs.push(Proof {
            tool: "nuclei_nuclei".into(),
            command: "nuclei -u http://10.0.0.5:80".into(),
            result_paths: Vec::new(),
            screenshot_path: None,
            completed_at: Utc::now() - age,
        });
    }
    project.upsert_host(ip).services.push(service);
    shared(project)
}

fn idle_backend() -> Arc<FakeBackend> {
    FakeBackend::new(network(&[]))
}

#[tokio::test]
async fn vuln_rule_fires_for_http_but_not_ssh() {
    let dir = tempfile::tempdir().unwrap();
    let runner = RecordingRunner::new();
    let engine = engine(
        config(dir.path(), RerunPolicy::default()),
        NUCLEI,
        FakeBackend::new(network(&[("10.0.0.5", &[(22, "ssh"), (80, "http")])])),
        runner.clone(),
        CannedProbe::default(),
        Arc::new(MemoryCheckpointStore::new()),
    );
    let project = shared(Project::new("lab"));

    let summary = engine
        .run(request("10.0.0.5", true), project.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.firings_succeeded, 1);
    let commands = runner.commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].starts_with("nuclei -u http://10.0.0.5:80 "));

    let project = project.lock().await;
    let http = project.service(&key("10.0.0.5", 80)).unwrap();
    assert_eq!(http.proofs.len(), 1);
    assert_eq!(http.proofs[0].tool, "nuclei_nuclei");
    assert!(project.service(&key("10.0.0.5", 22)).unwrap().proofs.is_empty());
}

#[tokio::test]
async fn recent_proof_suppresses_rerun_for_two_days() {
    let dir = tempfile::tempdir().unwrap();
    let runner = RecordingRunner::new();
    let engine = engine(
        config(dir.path(), RerunPolicy::OlderThanDays(2)),
        NUCLEI,
        idle_backend(),
        runner.clone(),
        CannedProbe::default(),
        Arc::new(MemoryCheckpointStore::new()),
    );

    let fresh = engine
        .automate(seeded(Some(Duration::days(1))), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(fresh.firings_attempted, 0);

    let stale = engine
        .automate(seeded(Some(Duration::days(3))), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stale.firings_succeeded, 1);
    assert_eq!(runner.commands().len(), 1);
}

#[tokio::test]
async fn never_policy_retries_a_tool_that_failed() {
    let dir = tempfile::tempdir().unwrap();
    let runner = RecordingRunner::new();
    runner.set_failing(true);
    let engine = engine(
        config(dir.path(), RerunPolicy::Never),
        NUCLEI,
        idle_backend(),
        runner.clone(),
        CannedProbe::default(),
        Arc::new(MemoryCheckpointStore::new()),
    );
    let project = seeded(None);

    let failed = engine
        .automate(project.clone(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(failed.firings_failed, 1);
    assert!(project.lock().await.service(&key("10.0.0.5", 80)).unwrap().proofs.is_empty());

    runner.set_failing(false);
    let retried = engine
        .automate(project.clone(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(retried.firings_succeeded, 1);

    let settled = engine
        .automate(project.clone(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(settled.firings_attempted, 0);
    assert_eq!(runner.commands().len(), 2);
}

#[tokio::test]
async fn content_rule_fires_only_where_the_page_matches() {
    let dir = tempfile::tempdir().unwrap();
    let runner = RecordingRunner::new();
    let engine = engine(
        config(dir.path(), RerunPolicy::default()),
        r#"[{"ports": [80], "tool_name": "WP Scan", "tool_type": "http_custom",
             "regex_match": "wp-content", "command": "wpscan --url {url} -o {output_path}"}]"#,
        FakeBackend::new(network(&[
            ("10.0.0.5", &[(80, "http")]),
            ("10.0.0.6", &[(80, "http")]),
        ])),
        runner.clone(),
        CannedProbe::default().with_page(
            "http://10.0.0.5:80",
            "HTTP/1.1 200 OK\n\n<link href=\"/wp-content/themes/x.css\">",
        ),
        Arc::new(MemoryCheckpointStore::new()),
    );
    let project = shared(Project::new("lab"));

    engine
        .run(request("10.0.0.5, 10.0.0.6", true), project.clone(), CancellationToken::new())
        .await
        .unwrap();

    let commands = runner.commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].starts_with("wpscan --url http://10.0.0.5:80 -o "));

    let project = project.lock().await;
    assert_eq!(project.service(&key("10.0.0.5", 80)).unwrap().proofs[0].tool, "http_wp_scan");
    assert!(project.service(&key("10.0.0.6", 80)).unwrap().proofs.is_empty());
}

#[tokio::test]
async fn proofs_are_saved_with_their_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonProjectStore::new(dir.path().join("lab.json")));
    let engine = engine(
        config(dir.path(), RerunPolicy::default()),
        NUCLEI,
        idle_backend(),
        RecordingRunner::new(),
        CannedProbe::default(),
        Arc::new(MemoryCheckpointStore::new()),
    )
    .with_store(store.clone());

    engine
        .automate(seeded(None), CancellationToken::new())
        .await
        .unwrap();

    let saved = store.load().unwrap();
    let proof = &saved.service(&key("10.0.0.5", 80)).unwrap().proofs[0];
    assert_eq!(proof.result_paths.len(), 1);
    let artifact = std::fs::read_to_string(&proof.result_paths[0]).unwrap();
    assert!(artifact.contains("[nuclei_nuclei] done"));
    assert!(proof.result_paths[0].starts_with(dir.path().join("auto_tools")));
}
