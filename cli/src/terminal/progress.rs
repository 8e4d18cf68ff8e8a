use std::sync::OnceLock;
use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use sweepr_core::{EngineEvent, FiringOutcome, UnitStatus};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

static BAR: OnceLock<ProgressBar> = OnceLock::new();

/// The single progress bar. Hidden until a batch is planned, so log output
/// can always be routed through it.
pub fn bar() -> &'static ProgressBar {
    BAR.get_or_init(ProgressBar::hidden)
}

fn style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} [{bar:30.green/white}] {pos}/{len} units {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_strings(&[
            "▁▁▁▁▁",
            "▁▂▂▂▁",
            "▁▄▂▄▁",
            "▂▄▆▄▂",
            "▄▆█▆▄",
            "▂▄▆▄▂",
            "▁▄▂▄▁",
            "▁▂▂▂▁",
            "▁▁▁▁▁",
        ])
        .progress_chars("=> ")
}

#[derive(Default)]
struct Tally {
    queued: usize,
    done: usize,
    failed: usize,
}

impl Tally {
    fn message(&self) -> String {
        if self.queued == 0 {
            return String::new();
        }
        let mut msg = format!("| tools {}/{}", self.done, self.queued);
        if self.failed > 0 {
            msg.push_str(&format!(" ({} failed)", self.failed.to_string().red()));
        }
        msg
    }
}

/// Drives the bar from engine events until the engine drops its sender.
pub fn track(mut rx: UnboundedReceiver<EngineEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let pb = bar();
        let mut tally = Tally::default();

        while let Some(event) = rx.recv().await {
            match event {
                EngineEvent::BatchPlanned { units, .. } => {
                    pb.set_style(style());
                    pb.set_length(units as u64);
                    pb.set_position(0);
                    pb.set_draw_target(ProgressDrawTarget::stderr());
                    pb.enable_steady_tick(Duration::from_millis(100));
                }
                EngineEvent::UnitCompleted { status, .. } => {
                    if status != UnitStatus::Cancelled {
                        pb.inc(1);
                    }
                }
                EngineEvent::FiringQueued { .. } => {
                    tally.queued += 1;
                    if pb.is_hidden() {
                        pb.set_style(
                            ProgressStyle::with_template("{spinner:.blue} {msg}")
                                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                        );
                        pb.set_draw_target(ProgressDrawTarget::stderr());
                        pb.enable_steady_tick(Duration::from_millis(100));
                    }
                }
                EngineEvent::FiringCompleted { outcome, .. } => {
                    tally.done += 1;
                    if outcome == FiringOutcome::Failed {
                        tally.failed += 1;
                    }
                }
            }
            pb.set_message(tally.message());
        }

        pb.finish_and_clear();
    })
}
