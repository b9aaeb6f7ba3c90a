//! Tiered-lane task scheduler.
//!
//! Split into focused submodules:
//! - `core`: Scheduler handle, shared state, construction, submission and configuration
//! - `checking`: the admission pass that decides what runs next
//! - `execution`: dispatch to the executor and per-attempt cleanup
//! - `bulk`: predicate-based cancel, restart and completion queries

mod bulk;
mod checking;
mod core;
mod execution;

pub use self::bulk::BulkResult;
pub use self::core::{Scheduler, DEFAULT_PING_INTERVAL};
