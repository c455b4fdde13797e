//! Stall detection for running jobs.
//!
//! The watchdog periodically scans watched jobs and fires `on_stall` once
//! when a job goes longer than the configured threshold without a progress
//! report; a later report fires `on_recovery` once. Signals are
//! observational only — the watchdog never cancels anything.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bitforge_types::JobId;
use tokio::task::JoinHandle;

/// Callback invoked with the affected job id.
pub type StallCallback = Arc<dyn Fn(JobId) + Send + Sync>;

/// Watchdog thresholds.
#[derive(Debug, Clone, Copy)]
pub struct StallWatchdogConfig {
    /// A job is stalled after this long without a progress report.
    pub max_stall_ms: u64,
    /// Scan period.
    pub check_interval_ms: u64,
}

impl Default for StallWatchdogConfig {
    fn default() -> Self {
        Self { max_stall_ms: 30_000, check_interval_ms: 5_000 }
    }
}

#[derive(Debug)]
struct WatchEntry {
    last_progress: Instant,
    stalled: bool,
}

struct WatchdogInner {
    config: StallWatchdogConfig,
    entries: Mutex<HashMap<JobId, WatchEntry>>,
    on_stall: Option<StallCallback>,
    on_recovery: Option<StallCallback>,
}

/// Builder for a [`StallWatchdog`].
pub struct StallWatchdogBuilder {
    config: StallWatchdogConfig,
    on_stall: Option<StallCallback>,
    on_recovery: Option<StallCallback>,
}

impl StallWatchdogBuilder {
    /// Invoke `f` when a watched job stalls.
    pub fn on_stall(mut self, f: impl Fn(JobId) + Send + Sync + 'static) -> Self {
        self.on_stall = Some(Arc::new(f));
        self
    }

    /// Invoke `f` when a stalled job reports progress again.
    pub fn on_recovery(mut self, f: impl Fn(JobId) + Send + Sync + 'static) -> Self {
        self.on_recovery = Some(Arc::new(f));
        self
    }

    /// Start the scan task.
    pub fn spawn(self) -> StallWatchdog {
        let inner = Arc::new(WatchdogInner {
            config: self.config,
            entries: Mutex::new(HashMap::new()),
            on_stall: self.on_stall,
            on_recovery: self.on_recovery,
        });
        let scan_inner = inner.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(
                scan_inner.config.check_interval_ms.max(1),
            ));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                scan_inner.scan();
            }
        });
        StallWatchdog { inner, task }
    }
}

impl WatchdogInner {
    fn scan(&self) {
        let threshold = Duration::from_millis(self.config.max_stall_ms);
        let mut newly_stalled = Vec::new();
        {
            let mut entries = self.entries.lock().expect("watchdog lock");
            for (id, entry) in entries.iter_mut() {
                if !entry.stalled && entry.last_progress.elapsed() > threshold {
                    entry.stalled = true;
                    newly_stalled.push(*id);
                }
            }
        }
        // Callbacks run outside the lock.
        for id in newly_stalled {
            tracing::warn!(job = %id, "job appears stalled");
            if let Some(cb) = &self.on_stall {
                cb(id);
            }
        }
    }
}

/// Periodic stall scanner over watched jobs.
pub struct StallWatchdog {
    inner: Arc<WatchdogInner>,
    task: JoinHandle<()>,
}

impl StallWatchdog {
    /// Start building a watchdog with the given thresholds.
    pub fn builder(config: StallWatchdogConfig) -> StallWatchdogBuilder {
        StallWatchdogBuilder { config, on_stall: None, on_recovery: None }
    }

    /// Begin watching a job, with the clock starting now.
    pub fn watch(&self, id: JobId) {
        self.inner
            .entries
            .lock()
            .expect("watchdog lock")
            .insert(id, WatchEntry { last_progress: Instant::now(), stalled: false });
    }

    /// Stop watching a job.
    pub fn unwatch(&self, id: JobId) {
        self.inner.entries.lock().expect("watchdog lock").remove(&id);
    }

    /// Record a progress update for a watched job.
    pub fn report_progress(&self, id: JobId) {
        let recovered = {
            let mut entries = self.inner.entries.lock().expect("watchdog lock");
            match entries.get_mut(&id) {
                Some(entry) => {
                    let recovered = entry.stalled;
                    entry.last_progress = Instant::now();
                    entry.stalled = false;
                    recovered
                }
                None => false,
            }
        };
        if recovered {
            tracing::info!(job = %id, "stalled job recovered");
            if let Some(cb) = &self.inner.on_recovery {
                cb(id);
            }
        }
    }
}

impl Drop for StallWatchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}
