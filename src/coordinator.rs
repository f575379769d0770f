//! Polling cycle orchestration.
//!
//! One cycle:
//!
//! ```text
//! load known ids → size worker pool → detect per source (parallel, joined)
//!   → merge → persist → notify → sleep
//! ```
//!
//! Cycles never overlap. New identities are always persisted before the
//! notifier runs, so a crash in between can lose an alert but never repeat one.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::detector::Detector;
use crate::domain::{CycleResult, Item, Source};
use crate::notifier::Notifier;
use crate::scheduler::Scheduler;
use crate::store::IdentityStore;

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Sleep between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Whether to run a cycle immediately on start
    pub run_on_start: bool,
    /// Prune identities older than this at the start of each cycle
    pub retention: Option<chrono::Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            run_on_start: true,
            retention: None,
        }
    }
}

impl CoordinatorConfig {
    /// Parse interval string like "1h", "30m", "6h", "1d"
    pub fn parse_interval(s: &str) -> std::result::Result<Duration, String> {
        let s = s.trim().to_lowercase();

        let (value, unit, name) = if let Some(hours) = s.strip_suffix('h') {
            (hours, 3600, "hours")
        } else if let Some(minutes) = s.strip_suffix('m') {
            (minutes, 60, "minutes")
        } else if let Some(days) = s.strip_suffix('d') {
            (days, 86400, "days")
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, 1, "seconds")
        } else {
            // Bare numbers are minutes, like interval_minutes in the config file
            let minutes = s
                .parse::<u64>()
                .map_err(|_| format!("Invalid interval: {}. Use format like '15m', '1h', '1d'", s))?;
            return Self::to_interval(minutes, 60, &s);
        };

        let count = value
            .parse::<u64>()
            .map_err(|_| format!("Invalid {}: {}", name, value))?;
        Self::to_interval(count, unit, &s)
    }

    fn to_interval(count: u64, unit: u64, input: &str) -> std::result::Result<Duration, String> {
        let secs = count
            .checked_mul(unit)
            .ok_or_else(|| format!("Interval too large: {}", input))?;

        if secs == 0 {
            return Err("Interval must be greater than zero".to_string());
        }
        Ok(Duration::from_secs(secs))
    }

    /// Format interval for display
    pub fn format_interval(interval: Duration) -> String {
        let secs = interval.as_secs();
        if secs >= 86400 && secs.is_multiple_of(86400) {
            format!("{}d", secs / 86400)
        } else if secs >= 3600 && secs.is_multiple_of(3600) {
            format!("{}h", secs / 3600)
        } else if secs >= 60 && secs.is_multiple_of(60) {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The identity store could not be read; nothing was fetched.
    Skipped,
    NoNewItems,
    Notified,
    /// New items were persisted but the notification failed.
    NotifyFailed,
    /// New items could not be persisted, so no notification was sent.
    PersistFailed,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub workers: usize,
    pub failed_sources: Vec<String>,
    pub new_items: usize,
    pub elapsed: Duration,
}

impl CycleReport {
    fn skipped(start: Instant) -> Self {
        Self {
            outcome: CycleOutcome::Skipped,
            workers: 0,
            failed_sources: Vec::new(),
            new_items: 0,
            elapsed: start.elapsed(),
        }
    }
}

pub struct Coordinator {
    store: Arc<dyn IdentityStore + Send + Sync>,
    detector: Arc<Detector>,
    scheduler: Scheduler,
    notifier: Arc<dyn Notifier + Send + Sync>,
    sources: Vec<Source>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn IdentityStore + Send + Sync>,
        detector: Arc<Detector>,
        scheduler: Scheduler,
        notifier: Arc<dyn Notifier + Send + Sync>,
        sources: Vec<Source>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            detector,
            scheduler,
            notifier,
            sources,
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run cycles until `shutdown` turns true.
    ///
    /// A running cycle is always allowed to finish; only the sleep between
    /// cycles is interrupted.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            sources = self.sources.len(),
            "Coordinator started (interval: {})",
            CoordinatorConfig::format_interval(self.config.interval)
        );

        if self.config.run_on_start && !*shutdown.borrow() {
            self.log_report(&self.run_cycle().await);
        }

        while !*shutdown.borrow() {
            tokio::select! {
                _ = sleep(self.config.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            if *shutdown.borrow() {
                break;
            }

            self.log_report(&self.run_cycle().await);
        }

        info!("Coordinator shutting down");
    }

    /// Run exactly one cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();
        info!("Starting cycle over {} source(s)", self.sources.len());

        if let Some(retention) = self.config.retention {
            match Utc::now().checked_sub_signed(retention) {
                Some(cutoff) => match self.store.prune_older_than(cutoff) {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "Pruned expired identities"),
                    Err(e) => warn!("Failed to prune identities: {}", e),
                },
                None => warn!(
                    "Retention of {} days is out of range, nothing pruned",
                    retention.num_days()
                ),
            }
        }

        let known = match self.store.load() {
            Ok(known) => Arc::new(known),
            Err(e) => {
                error!("Identity store unavailable, skipping cycle: {}", e);
                return CycleReport::skipped(start);
            }
        };

        let workers = self
            .scheduler
            .available_concurrency()
            .await
            .min(self.sources.len())
            .max(1);

        let outputs = self.detect_all(known, workers).await;

        let mut result = CycleResult::new();
        let mut failed_sources = Vec::new();
        for (source, output) in self.sources.iter().zip(outputs) {
            match output {
                Some(items) => {
                    result.merge(source, items);
                }
                None => failed_sources.push(source.label.clone()),
            }
        }

        let new_items = result.item_count();
        let outcome = self.commit(&result).await;

        CycleReport {
            outcome,
            workers,
            failed_sources,
            new_items,
            elapsed: start.elapsed(),
        }
    }

    /// Fan out detection over every source with at most `workers` in flight,
    /// then wait for all of them. Output order matches `self.sources`; a
    /// failed source yields `None`.
    async fn detect_all(
        &self,
        known: Arc<HashSet<String>>,
        workers: usize,
    ) -> Vec<Option<Vec<Item>>> {
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut handles = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let detector = self.detector.clone();
            let known = known.clone();
            let semaphore = semaphore.clone();
            let source = source.clone();

            let handle = tokio::spawn(async move {
                // The semaphore is never closed, so the permit is always granted.
                let _permit = semaphore.acquire().await;
                detector.detect(&source, &known).await
            });

            handles.push(handle);
        }

        let mut outputs = Vec::with_capacity(handles.len());
        for (source, handle) in self.sources.iter().zip(handles) {
            let output = match handle.await {
                Ok(Ok(items)) => Some(items),
                Ok(Err(e)) if e.is_fetch_error() => {
                    warn!(source = %source.label, "Fetch failed: {}", e);
                    None
                }
                Ok(Err(e)) => {
                    error!(source = %source.label, "Detection failed: {}", e);
                    None
                }
                Err(e) => {
                    error!(source = %source.label, "Detection task join error: {}", e);
                    None
                }
            };
            outputs.push(output);
        }

        outputs
    }

    /// Persist then notify. Nothing is sent unless the save succeeded.
    async fn commit(&self, result: &CycleResult) -> CycleOutcome {
        if result.is_empty() {
            info!("No new posts at this time");
            return CycleOutcome::NoNewItems;
        }

        match self.store.save(&result.items()) {
            Ok(inserted) => info!(inserted, "Saved new posts"),
            Err(e) => {
                error!("Failed to save new posts, skipping notification: {}", e);
                return CycleOutcome::PersistFailed;
            }
        }

        match self.notifier.notify(result).await {
            Ok(()) => CycleOutcome::Notified,
            Err(e) => {
                error!("Failed to send notification: {}", e);
                CycleOutcome::NotifyFailed
            }
        }
    }

    pub fn log_report(&self, report: &CycleReport) {
        info!(
            outcome = ?report.outcome,
            workers = report.workers,
            "Cycle complete: {} new items, {} failed sources ({:.1}s)",
            report.new_items,
            report.failed_sources.len(),
            report.elapsed.as_secs_f64()
        );
    }
}

/// Flip the returned receiver to `true` on SIGINT/SIGTERM (Ctrl-C elsewhere).
pub fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Stop requested, finishing current cycle");
        let _ = tx.send(true);
    });

    rx
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {},
                _ = sigint.recv() => {},
            }
        }
        _ => {
            warn!("Failed to set up signal handlers, falling back to Ctrl-C");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
