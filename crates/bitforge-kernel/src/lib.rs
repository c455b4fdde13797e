//! bitforge kernel — pipeline execution, script sandbox, and job scheduling.
//!
//! The kernel runs untrusted, user-authored transformation scripts against
//! mutable bit buffers under a resource budget. Strategies bundle stage
//! scripts (Scheduler → Algorithms → Scoring → Policy); jobs wrap a source
//! buffer and an ordered preset list; the job manager governs admission by
//! priority under a max-parallel cap with cooperative pause/cancel. Every
//! buffer mutation is recorded as a transformation for deterministic
//! replay.
//!
//! Start with [`Workbench`] to get a fully wired subsystem, or assemble
//! the parts ([`scheduler::JobManager`], [`pipeline::ExecutionEngine`],
//! the stores) yourself.

pub mod catalog;
pub mod kernel;
pub mod pipeline;
pub mod report;
pub mod sandbox;
pub mod scheduler;
pub mod store;

pub use kernel::{Workbench, WorkbenchConfig};

// Re-export the type system so embedders need only this crate.
pub use bitforge_types as types;
