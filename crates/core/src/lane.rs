//! Priority lanes shared by the config layer and the scheduler.

use std::collections::BTreeMap;

/// Task priority. Higher values are dispatched first; the value doubles as
/// the key used to look up an allocation lane.
pub type Priority = u32;

/// Ascending mapping of priority threshold to the number of tasks that may
/// run concurrently in that lane.
pub type AllocationMap = BTreeMap<Priority, usize>;
