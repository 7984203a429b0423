//! Detection scheduler - timer-driven and manual scans over one watcher

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::detector::ChangeRecord;
use crate::error::{Result, WatchError};
use crate::watcher::Watcher;

/// Lifecycle of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No scan running
    Idle,
    /// At least one scan is running or waiting for the lock
    ScanInProgress,
    /// Terminated; no further scans start
    Terminated,
}

/// How a scan reports its results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    /// Manual command: every record, including unchanged files
    Interactive,
    /// Timer tick: changes only
    Silent,
}

impl DetectionMode {
    pub fn is_manual(self) -> bool {
        matches!(self, DetectionMode::Interactive)
    }
}

#[derive(Debug, Default)]
struct Tracker {
    in_flight: usize,
    terminated: bool,
}

/// Decrements the in-flight count even if the scan future is dropped
struct ScanGuard {
    tracker: Arc<Mutex<Tracker>>,
}

impl ScanGuard {
    fn begin(tracker: &Arc<Mutex<Tracker>>) -> Option<Self> {
        let mut state = tracker.lock();
        if state.terminated {
            return None;
        }
        state.in_flight += 1;
        Some(Self {
            tracker: Arc::clone(tracker),
        })
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        let mut state = self.tracker.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

async fn scan(
    watcher: &Watcher,
    tracker: &Arc<Mutex<Tracker>>,
    mode: DetectionMode,
) -> Result<Vec<ChangeRecord>> {
    let _guard = ScanGuard::begin(tracker).ok_or(WatchError::Terminated)?;
    watcher.run_detection(mode.is_manual()).await
}

/// Drives scans from a fixed-interval timer and from manual requests.
///
/// Both paths go through the watcher's lock, so a timer scan never observes
/// a commit or revert half done.
pub struct DetectionScheduler {
    watcher: Arc<Watcher>,
    interval: Duration,
    tracker: Arc<Mutex<Tracker>>,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl DetectionScheduler {
    /// Create a scheduler using the watcher's configured interval
    pub fn new(watcher: Arc<Watcher>) -> Self {
        let interval = watcher.config().scan_interval();
        Self::with_interval(watcher, interval)
    }

    /// Create a scheduler with an explicit interval
    pub fn with_interval(watcher: Arc<Watcher>, interval: Duration) -> Self {
        Self {
            watcher,
            interval: interval.max(Duration::from_millis(1)),
            tracker: Arc::new(Mutex::new(Tracker::default())),
            background: Mutex::new(None),
        }
    }

    /// Watcher driven by this scheduler
    pub fn watcher(&self) -> &Arc<Watcher> {
        &self.watcher
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Current lifecycle state
    pub fn state(&self) -> SchedulerState {
        let tracker = self.tracker.lock();
        if tracker.terminated {
            SchedulerState::Terminated
        } else if tracker.in_flight > 0 {
            SchedulerState::ScanInProgress
        } else {
            SchedulerState::Idle
        }
    }

    /// Spawn the background timer. Must be called within a tokio runtime.
    ///
    /// The first scan fires one interval after start. Calling this again
    /// while the timer is running does nothing.
    pub fn start(&self) -> Result<()> {
        if self.tracker.lock().terminated {
            return Err(WatchError::Terminated);
        }

        let mut background = self.background.lock();
        if background.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Background scan timer already running");
            return Ok(());
        }

        let watcher = Arc::clone(&self.watcher);
        let tracker = Arc::clone(&self.tracker);
        let period = self.interval;

        *background = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match scan(&watcher, &tracker, DetectionMode::Silent).await {
                    Ok(changes) => report_changes(&changes),
                    Err(WatchError::Terminated) => break,
                    Err(e) => warn!(error = %e, "Background scan failed"),
                }
            }
        }));

        info!(interval_ms = period.as_millis() as u64, "Started background scans");
        Ok(())
    }

    /// Run a verbose scan now, serialized with the timer
    pub async fn trigger_manual(&self) -> Result<Vec<ChangeRecord>> {
        scan(&self.watcher, &self.tracker, DetectionMode::Interactive).await
    }

    /// Stop the timer immediately without waiting for an in-flight scan
    pub fn terminate(&self) {
        self.tracker.lock().terminated = true;
        if let Some(handle) = self.background.lock().take() {
            handle.abort();
        }
        info!("Scheduler terminated");
    }
}

impl Drop for DetectionScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.background.lock().take() {
            handle.abort();
        }
    }
}

fn report_changes(changes: &[ChangeRecord]) {
    if changes.is_empty() {
        debug!("Background scan found no changes");
        return;
    }
    for change in changes {
        info!(path = %change.path().display(), kind = ?change.kind(), "{}", change);
    }
}
