//! Pure data types for bitforge — buffers, jobs, transformations, results.
//!
//! This crate is a leaf dependency with no async runtime and no I/O. It
//! exists so that embedders can work with bitforge's type system without
//! pulling the kernel's transitive deps.

pub mod bits;
pub mod eta;
pub mod handle;
pub mod job;
pub mod result;
pub mod strategy;
pub mod transform;

// Flat re-exports for convenience
pub use bits::*;
pub use eta::*;
pub use handle::*;
pub use job::*;
pub use result::*;
pub use strategy::*;
pub use transform::*;
