use std::sync::Arc;

use sweepr_common::model::{Project, Protocol, ServiceKey};
use sweepr_common::rules::RerunPolicy;
use sweepr_core::checkpoint::{CheckpointStore, JsonCheckpointStore, MemoryCheckpointStore};
use sweepr_core::ingest::ResultIngester;
use sweepr_core::scanner::RawOutput;
use sweepr_core::shared;
use tokio_util::sync::CancellationToken;

use crate::support::{
    CannedProbe, FakeBackend, RecordingRunner, config, engine, network, nmap_xml, request,
};

const NO_RULES: &str = "[]";

fn lab() -> Arc<FakeBackend> {
    FakeBackend::new(network(&[
        ("10.0.0.5", &[(22, "ssh"), (80, "http")]),
        ("10.0.0.77", &[(443, "https")]),
        ("10.0.1.20", &[(3306, "mysql")]),
    ]))
}

#[tokio::test]
async fn slash_23_launches_both_units_in_one_wave() {
    let dir = tempfile::tempdir().unwrap();
    let backend = lab();
    let engine = engine(
        config(dir.path(), RerunPolicy::default()),
        NO_RULES,
        backend.clone(),
        RecordingRunner::new(),
        CannedProbe::default(),
        Arc::new(MemoryCheckpointStore::new()),
    );
    let project = shared(Project::new("lab"));

    let summary = engine
        .run(request("10.0.0.0/23", false), project.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.units_total, 2);
    assert_eq!(summary.units_succeeded, 2);
    assert_eq!(backend.peak(), 2);

    let project = project.lock().await;
    assert_eq!(project.hosts.len(), 3);
    assert_eq!(project.service_count(), 4);
    let asset = &project.assets[0];
    assert_eq!(asset.target, "10.0.0.0/23");
    assert_eq!(asset.host_ids.len(), 3);
}

#[tokio::test]
async fn failed_unit_does_not_roll_back_its_sibling() {
    let dir = tempfile::tempdir().unwrap();
    let backend = lab();
    backend.fail("10.0.1.0/24");
    let checkpoints = Arc::new(JsonCheckpointStore::new(dir.path()));
    let engine = engine(
        config(dir.path(), RerunPolicy::default()),
        NO_RULES,
        backend.clone(),
        RecordingRunner::new(),
        CannedProbe::default(),
        checkpoints.clone(),
    );
    let project = shared(Project::new("lab"));
    let req = request("10.0.0.0/23", false);
    let batch = req.batch_id(project.lock().await.id);

    let summary = engine
        .run(req, project.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.units_succeeded, 1);
    assert_eq!(summary.units_failed, 1);
    assert!(!summary.is_clean());
    // one initial attempt plus the default two retries
    assert_eq!(backend.calls("10.0.1.0/24"), 3);

    let project = project.lock().await;
    assert_eq!(project.hosts.len(), 2);
    assert!(project.hosts.iter().all(|h| h.ip.to_string().starts_with("10.0.0.")));
    assert_eq!(checkpoints.load(batch).unwrap().completed.len(), 1);
}

#[tokio::test]
async fn resumed_batch_skips_completed_units() {
    let dir = tempfile::tempdir().unwrap();
    let backend = lab();
    backend.fail("10.0.1.0/24");
    let checkpoints = Arc::new(JsonCheckpointStore::new(dir.path()));
    let engine = engine(
        config(dir.path(), RerunPolicy::default()),
        NO_RULES,
        backend.clone(),
        RecordingRunner::new(),
        CannedProbe::default(),
        checkpoints.clone(),
    );
    let project = shared(Project::new("lab"));
    let req = request("10.0.0.0/23", false);
    let batch = req.batch_id(project.lock().await.id);

    engine
        .run(req.clone(), project.clone(), CancellationToken::new())
        .await
        .unwrap();
    backend.heal();

    let summary = engine
        .run(req, project.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.units_skipped, 1);
    assert_eq!(summary.units_succeeded, 1);
    assert_eq!(backend.calls("10.0.0.0/24"), 1);
    assert_eq!(backend.calls("10.0.1.0/24"), 4);
    assert_eq!(project.lock().await.hosts.len(), 3);

    // finished batches leave no checkpoint behind
    let file = dir.path().join("checkpoints").join(format!("{batch}.json"));
    assert!(!file.exists());
}

#[tokio::test]
async fn cancelled_run_starts_nothing_and_keeps_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let backend = lab();
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let engine = engine(
        config(dir.path(), RerunPolicy::default()),
        NO_RULES,
        backend.clone(),
        RecordingRunner::new(),
        CannedProbe::default(),
        checkpoints,
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = engine
        .run(request("10.0.0.0/23", true), shared(Project::new("lab")), cancel)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.units_attempted, 0);
    assert_eq!(backend.calls("10.0.0.0/24"), 0);
}

#[test]
fn ingesting_the_same_report_twice_is_a_no_op() {
    let net = network(&[("10.0.0.5", &[(22, "ssh"), (80, "http")])]);
    let raw = RawOutput {
        report: nmap_xml(&net),
        ..RawOutput::default()
    };
    let ingester = ResultIngester::default();
    let report = ingester.parse(&raw).unwrap();

    let mut project = Project::new("lab");
    let first = ingester.merge(&mut project, None, &report);
    let hosts_after_first = project.hosts.clone();
    let second = ingester.merge(&mut project, None, &report);

    assert_eq!(first.changed.len(), 2);
    assert!(second.changed.is_empty());
    assert_eq!(second.hosts_created, 0);
    assert_eq!(project.hosts, hosts_after_first);
    assert_eq!(project.service_count(), 2);
}

#[tokio::test]
async fn rescanning_unchanged_hosts_fires_nothing_new() {
    let dir = tempfile::tempdir().unwrap();
    let runner = RecordingRunner::new();
    let engine = engine(
        config(dir.path(), RerunPolicy::Always),
        r#"[{"ports": [22], "tool_name": "SSH Audit", "tool_type": "generic",
             "command": "ssh-audit {ip}:{port}"}]"#,
        lab(),
        runner.clone(),
        CannedProbe::default(),
        Arc::new(MemoryCheckpointStore::new()),
    );
    let project = shared(Project::new("lab"));

    for _ in 0..2 {
        engine
            .run(request("10.0.0.5", true), project.clone(), CancellationToken::new())
            .await
            .unwrap();
    }

    assert_eq!(runner.commands(), ["ssh-audit 10.0.0.5:22"]);
    let key = ServiceKey::new("10.0.0.5".parse().unwrap(), 22, Protocol::Tcp);
    assert_eq!(project.lock().await.service(&key).unwrap().proofs.len(), 1);
}
