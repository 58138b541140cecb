use std::num::NonZeroUsize;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

pub const DEFAULT_THREAD_NAME: &str = "evloop-worker";

/// Worker configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "with-serde", serde(default, rename_all = "camelCase"))]
pub struct WorkerConfig {
    /// Name of the worker thread
    pub thread_name: String,

    /// Maximum number of pending events
    ///
    /// Unbounded if `None`. Posting events into a full queue
    /// fails immediately without blocking.
    pub queue_capacity: Option<NonZeroUsize>,

    /// Run the worker thread with maximum priority
    ///
    /// Requires the feature `with-thread-priority`. Failing to
    /// adjust the priority is logged and otherwise ignored.
    pub adjust_thread_priority: bool,
}

#[must_use]
pub fn default_config() -> WorkerConfig {
    WorkerConfig {
        thread_name: DEFAULT_THREAD_NAME.to_owned(),
        queue_capacity: None,
        adjust_thread_priority: false,
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        default_config()
    }
}
