use std::future::Future;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use notify::event::CreateKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::WatchConfig;
use crate::ledger::ProcessedLedger;
use crate::scan::enqueue_existing;
use crate::tracker::{ActivityTracker, EpicConverter, ProcessOutcome};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonSummary {
    pub converted: usize,
    pub unchanged: usize,
    pub vanished: usize,
    pub deferred: usize,
    pub failed: usize,
}

impl DaemonSummary {
    fn absorb(&mut self, outcomes: &[ProcessOutcome]) {
        for outcome in outcomes {
            match outcome {
                ProcessOutcome::Converted(_) => self.converted += 1,
                ProcessOutcome::Unchanged(_) => self.unchanged += 1,
                ProcessOutcome::Vanished(_) => self.vanished += 1,
                ProcessOutcome::Deferred { .. } => self.deferred += 1,
                ProcessOutcome::Failed { .. } => self.failed += 1,
            }
        }
    }
}

/// Watches `config.input_dir` and converts settled files until `shutdown`
/// resolves.
pub async fn run<F>(config: WatchConfig, shutdown: F) -> Result<DaemonSummary>
where
    F: Future<Output = ()>,
{
    let ledger = match &config.state_file {
        Some(path) => ProcessedLedger::load(path)
            .with_context(|| format!("failed to load state file '{}'", path.display()))?,
        None => ProcessedLedger::new(),
    };
    info!(entries = ledger.len(), "Loaded processed-file ledger");

    let mut tracker = ActivityTracker::new(config.tracker_options(), ledger);
    let converter = EpicConverter::new(&config.output_dir);

    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        // Receiver only goes away during shutdown.
        let _ = tx.send(res);
    })
    .context("failed to create filesystem watcher")?;

    let mode = if config.recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher
        .watch(&config.input_dir, mode)
        .with_context(|| format!("failed to watch '{}'", config.input_dir.display()))?;

    if config.scan_existing {
        let queued = enqueue_existing(
            &mut tracker,
            &config.input_dir,
            &config.extension,
            config.recursive,
            Instant::now(),
        )
        .context("invalid scan pattern for input directory")?;
        info!(queued, "Queued existing files from startup scan");
    }

    info!(
        input_dir = %config.input_dir.display(),
        output_dir = %config.output_dir.display(),
        "Started watcher. Monitoring for new .{} files...",
        config.extension
    );

    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut summary = DaemonSummary::default();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            Some(res) = rx.recv() => handle_event(&mut tracker, res),
            _ = ticker.tick() => {
                // Conversion does blocking file IO; run it off the async workers.
                let mut processor = converter.clone();
                let (returned, outcomes) = tokio::task::spawn_blocking(move || {
                    let outcomes = tracker.check_and_process(Instant::now(), &mut processor);
                    (tracker, outcomes)
                })
                .await
                .context("conversion task panicked")?;
                tracker = returned;
                summary.absorb(&outcomes);
                if outcomes.iter().any(ProcessOutcome::touched_ledger) {
                    persist_ledger(config.state_file.as_deref(), tracker.ledger());
                }
            }
        }
    }

    drop(watcher);
    persist_ledger(config.state_file.as_deref(), tracker.ledger());
    info!(?summary, "Watcher stopped");
    Ok(summary)
}

fn handle_event(tracker: &mut ActivityTracker, res: notify::Result<Event>) {
    let event = match res {
        Ok(event) => event,
        Err(err) => {
            warn!("Filesystem watcher error: {err}");
            return;
        }
    };

    let now = Instant::now();
    match event.kind {
        EventKind::Create(kind) => {
            for path in &event.paths {
                let is_dir = matches!(kind, CreateKind::Folder) || path.is_dir();
                tracker.on_created(path, is_dir, now);
            }
        }
        EventKind::Modify(_) => {
            for path in &event.paths {
                tracker.on_modified(path, path.is_dir(), now);
            }
        }
        other => debug!(kind = ?other, "Ignoring filesystem event"),
    }
}

fn persist_ledger(state_file: Option<&Path>, ledger: &ProcessedLedger) {
    let Some(path) = state_file else {
        return;
    };
    if let Err(err) = ledger.save(path) {
        error!("Failed to save state file {}: {err}", path.display());
    }
}
