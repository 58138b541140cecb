pub(crate) use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// The observed effect of switching an atomic state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchAtomicStateOk<T> {
    Accepted {
        previous_state: T,
    },

    /// Unchanged, i.e. already as desired
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchAtomicStateErr<T> {
    Rejected { current_state: T },
}

pub type SwitchAtomicStateResult<T> = Result<SwitchAtomicStateOk<T>, SwitchAtomicStateErr<T>>;

/// Atomic operations for state transitions
///
/// Needed for implementing state machines with atomic state transitions.
pub trait AtomicState {
    type State: Copy;

    /// Peek the current state
    ///
    /// Uses relaxed memory ordering semantics.
    fn peek(&self) -> Self::State;

    /// Load the current state
    ///
    /// Uses the same memory ordering semantics as when switching
    /// the state.
    fn load(&self) -> Self::State;

    /// Switch to the desired state unconditionally
    ///
    /// Replaces the current state with the desired state independent
    /// of the current state and returns the previous state.
    fn switch_to_desired(&self, desired_state: Self::State) -> SwitchAtomicStateOk<Self::State>;

    /// Switch to the desired state conditionally
    ///
    /// Replaces the current state with the desired state if it equals
    /// the given expected state and returns the previous state. Otherwise
    /// returns the unmodified current state.
    fn switch_from_expected_to_desired(
        &self,
        expected_state: Self::State,
        desired_state: Self::State,
    ) -> SwitchAtomicStateResult<Self::State>;
}

/// Monotonic event counter
///
/// Only used for statistics, i.e. relaxed memory ordering
/// is sufficient.
#[derive(Debug, Default)]
pub(crate) struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    pub(crate) const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub(crate) fn add(&self, count: u64) {
        if count > 0 {
            self.0.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub(crate) fn increment(&self) {
        self.add(1);
    }

    pub(crate) fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
