use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use sweepr_common::config::EngineConfig;
use sweepr_core::store::ProjectStore;
use sweepr_core::{Engine, ScanRequest};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::commands::{ScanArgs, cancel_on_interrupt, load_rules, open_project};
use crate::terminal::{print, progress};

pub async fn scan(args: ScanArgs, mut config: EngineConfig) -> anyhow::Result<()> {
    args.apply(&mut config);
    let target = args.target.expression()?;
    let rules = load_rules(&args.project)?;
    let (store, project) = open_project(&args.project)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let engine = Engine::new(config, rules)?
        .with_store(store.clone())
        .with_events(tx);

    let request = ScanRequest {
        target,
        target_label: args.target.label(),
        profile: args.target.profile.clone(),
        asset_name: args.asset_name.clone(),
        automate: !args.no_automation,
    };

    print::header("scanning");
    print::aligned_line("Target", &request.target_label);
    print::aligned_line("Profile", &request.profile.to_string());
    print::aligned_line("Project", &store.path().display().to_string());
    print::aligned_line("Rules", &engine.rules().len().to_string());

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());
    let tracker = progress::track(rx);

    let started = Instant::now();
    let summary = engine.run(request, Arc::clone(&project), cancel).await;
    drop(engine);
    let _ = tracker.await;
    let summary = summary?;

    let project = project.lock().await;
    store
        .save(&project)
        .with_context(|| format!("saving project {}", store.path().display()))?;

    print::run_summary(&summary, &project, started.elapsed());
    Ok(())
}
