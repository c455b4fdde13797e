//! Job scheduling — queue, priority, parallelism, retries, ETA, stalls.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        JobManager                          │
//! │  active: {JobId → job + control channel}                   │
//! │  archive: {JobId → terminal job}                           │
//! │  - admission: priority rank, then created_at (queue.rs)    │
//! │  - one run task per admitted job, ≤ max_parallel           │
//! │  - pause/cancel: watch channel, iteration boundaries only  │
//! │  - ETA per progress tick (eta.rs)                          │
//! │  - StallWatchdog scan (watchdog.rs), observational only    │
//! └────────────────────────────────────────────────────────────┘
//! ```

mod eta;
mod manager;
mod queue;
mod watchdog;

pub use eta::{estimate_eta, format_duration_ms};
pub use manager::{JobManager, JobManagerConfig, JobValidation, SchedulerError};
pub use queue::{admission_order, dependencies_met};
pub use watchdog::{StallCallback, StallWatchdog, StallWatchdogBuilder, StallWatchdogConfig};
