use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use sweepr_common::config::EngineConfig;
use sweepr_core::Engine;
use sweepr_core::store::ProjectStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::commands::{AutomateArgs, cancel_on_interrupt, load_rules, open_project};
use crate::terminal::{print, progress};

pub async fn automate(args: AutomateArgs, mut config: EngineConfig) -> anyhow::Result<()> {
    args.project.apply(&mut config);
    let rules = load_rules(&args.project)?;
    let (store, project) = open_project(&args.project)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let engine = Engine::new(config, rules)?
        .with_store(store.clone())
        .with_events(tx);

    print::header("automation pass");
    print::aligned_line("Project", &store.path().display().to_string());
    print::aligned_line("Services", &project.lock().await.service_count().to_string());
    print::aligned_line("Re-run", &engine.config().rerun.to_string());

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());
    let tracker = progress::track(rx);

    let started = Instant::now();
    let summary = engine.automate(Arc::clone(&project), cancel).await;
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
