use std::{
    any::Any,
    collections::VecDeque,
    fmt,
    panic::{self, AssertUnwindSafe},
};

use arc_swap::ArcSwap;

use crate::{
    event::{Message, Transition},
    machine::{ApplyError, Context, StateMachine},
    queue::EventQueue,
    sync::{
        atomic::{
            AtomicCounter, AtomicState, AtomicU8, Ordering, SwitchAtomicStateErr,
            SwitchAtomicStateOk, SwitchAtomicStateResult,
        },
        Arc,
    },
};

pub mod thread;

/// Lifecycle of the worker
///
/// ```text
/// NotStarted -> Running -> Draining -> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Not started yet, events are rejected
    NotStarted,

    /// Accepting and processing events
    Running,

    /// Shutting down, new events are rejected
    Draining,

    /// The worker thread has been joined and all pending
    /// events have been discarded
    Stopped,
}

impl Lifecycle {
    pub const fn default() -> Self {
        Self::NotStarted
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::default()
    }
}

type AtomicValue = u8;

// Ordered by progression
const LIFECYCLE_NOT_STARTED: AtomicValue = 0;
const LIFECYCLE_RUNNING: AtomicValue = 1;
const LIFECYCLE_DRAINING: AtomicValue = 2;
const LIFECYCLE_STOPPED: AtomicValue = 3;

fn lifecycle_from_atomic_value(from: AtomicValue) -> Lifecycle {
    match from {
        LIFECYCLE_NOT_STARTED => Lifecycle::NotStarted,
        LIFECYCLE_RUNNING => Lifecycle::Running,
        LIFECYCLE_DRAINING => Lifecycle::Draining,
        LIFECYCLE_STOPPED => Lifecycle::Stopped,
        unexpected_value => unreachable!("unexpected lifecycle value: {}", unexpected_value),
    }
}

const fn lifecycle_to_atomic_value(from: Lifecycle) -> AtomicValue {
    match from {
        Lifecycle::NotStarted => LIFECYCLE_NOT_STARTED,
        Lifecycle::Running => LIFECYCLE_RUNNING,
        Lifecycle::Draining => LIFECYCLE_DRAINING,
        Lifecycle::Stopped => LIFECYCLE_STOPPED,
    }
}

/// Atomic [`Lifecycle`] (thread-safe, lock-free)
///
/// Read by producer threads before posting events, written by the
/// controller and the worker thread.
#[derive(Debug)]
pub(crate) struct AtomicLifecycle(AtomicU8);

impl AtomicState for AtomicLifecycle {
    type State = Lifecycle;

    fn peek(&self) -> Self::State {
        lifecycle_from_atomic_value(self.0.load(Ordering::Relaxed))
    }

    fn load(&self) -> Self::State {
        lifecycle_from_atomic_value(self.0.load(Ordering::Acquire))
    }

    fn switch_to_desired(&self, desired_state: Self::State) -> SwitchAtomicStateOk<Self::State> {
        let desired_value = lifecycle_to_atomic_value(desired_state);
        let previous_value = self.0.swap(desired_value, Ordering::AcqRel);
        // The lifecycle only moves forward
        debug_assert!(previous_value <= desired_value);
        if previous_value == desired_value {
            return SwitchAtomicStateOk::Ignored;
        }
        SwitchAtomicStateOk::Accepted {
            previous_state: lifecycle_from_atomic_value(previous_value),
        }
    }

    fn switch_from_expected_to_desired(
        &self,
        expected_state: Self::State,
        desired_state: Self::State,
    ) -> SwitchAtomicStateResult<Self::State> {
        let expected_value = lifecycle_to_atomic_value(expected_state);
        let desired_value = lifecycle_to_atomic_value(desired_state);
        self.0
            .compare_exchange(
                expected_value,
                desired_value,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|previous_value| {
                debug_assert_eq!(expected_value, previous_value);
                if desired_value == expected_value {
                    SwitchAtomicStateOk::Ignored
                } else {
                    SwitchAtomicStateOk::Accepted {
                        previous_state: expected_state,
                    }
                }
            })
            .or_else(|current_value| {
                debug_assert_ne!(expected_value, current_value);
                if desired_value == current_value {
                    Ok(SwitchAtomicStateOk::Ignored)
                } else {
                    Err(SwitchAtomicStateErr::Rejected {
                        current_state: lifecycle_from_atomic_value(current_value),
                    })
                }
            })
    }
}

impl AtomicLifecycle {
    pub(crate) const fn default() -> Self {
        Self(AtomicU8::new(lifecycle_to_atomic_value(Lifecycle::default())))
    }

    /// Switch from [`Lifecycle::NotStarted`] to [`Lifecycle::Running`]
    pub(crate) fn start(&self) -> SwitchAtomicStateResult<Lifecycle> {
        self.switch_from_expected_to_desired(Lifecycle::NotStarted, Lifecycle::Running)
    }

    /// Switch from [`Lifecycle::Running`] to [`Lifecycle::Draining`]
    pub(crate) fn drain(&self) -> SwitchAtomicStateResult<Lifecycle> {
        self.switch_from_expected_to_desired(Lifecycle::Running, Lifecycle::Draining)
    }

    /// Switch from any state to [`Lifecycle::Stopped`]
    pub(crate) fn stop(&self) -> SwitchAtomicStateOk<Lifecycle> {
        self.switch_to_desired(Lifecycle::Stopped)
    }
}

impl Default for AtomicLifecycle {
    fn default() -> Self {
        Self::default()
    }
}

/// Callbacks about the progress of the worker
///
/// All functions are invoked on the worker thread, except for
/// [`Lifecycle::Stopped`] that is notified by the thread that
/// invoked [`Controller::stop()`](crate::Controller::stop) after
/// joining the worker thread.
///
/// A panic while events are processed terminates the worker like
/// a fatal error.
pub trait Notifications {
    fn notify_lifecycle_changed(&mut self, lifecycle: Lifecycle);

    /// A recoverable error occurred while applying an event
    ///
    /// Processing continues with the next event.
    fn notify_event_failed(&mut self, error: &ApplyError);

    /// The worker has been terminated unexpectedly
    ///
    /// Invoked at most once. Whether the process should be terminated
    /// in response is up to the receiver.
    fn notify_fault(&mut self, fault: &anyhow::Error);
}

pub type NotificationsBoxed = Box<dyn Notifications + Send + 'static>;

impl Notifications for NotificationsBoxed {
    fn notify_lifecycle_changed(&mut self, lifecycle: Lifecycle) {
        (**self).notify_lifecycle_changed(lifecycle);
    }

    fn notify_event_failed(&mut self, error: &ApplyError) {
        (**self).notify_event_failed(error);
    }

    fn notify_fault(&mut self, fault: &anyhow::Error) {
        (**self).notify_fault(fault);
    }
}

/// Ignore all notifications
///
/// Errors are still logged by the worker.
impl Notifications for () {
    fn notify_lifecycle_changed(&mut self, _lifecycle: Lifecycle) {}

    fn notify_event_failed(&mut self, _error: &ApplyError) {}

    fn notify_fault(&mut self, _fault: &anyhow::Error) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Events that have been applied successfully, including
    /// those that left the state unchanged
    pub applied: u64,

    /// Events that failed to apply
    pub failed: u64,

    /// Events that have never been applied due to a shutdown
    pub discarded: u64,
}

#[derive(Debug, Default)]
pub(crate) struct AtomicStatistics {
    pub(crate) applied: AtomicCounter,
    pub(crate) failed: AtomicCounter,
    pub(crate) discarded: AtomicCounter,
}

impl AtomicStatistics {
    pub(crate) const fn new() -> Self {
        Self {
            applied: AtomicCounter::new(),
            failed: AtomicCounter::new(),
            discarded: AtomicCounter::new(),
        }
    }

    pub(crate) fn load(&self) -> Statistics {
        Statistics {
            applied: self.applied.get(),
            failed: self.failed.get(),
            discarded: self.discarded.get(),
        }
    }
}

/// State that is shared between the controller, producers, and
/// the worker thread
pub(crate) struct Shared<M: StateMachine> {
    pub(crate) queue: EventQueue<Message<M::Payload>>,
    pub(crate) lifecycle: AtomicLifecycle,
    pub(crate) snapshot: ArcSwap<M::State>,
    pub(crate) statistics: AtomicStatistics,
}

impl<M: StateMachine> Shared<M> {
    pub(crate) fn new(initial_state: M::State, queue: EventQueue<Message<M::Payload>>) -> Self {
        Self {
            queue,
            lifecycle: AtomicLifecycle::default(),
            snapshot: ArcSwap::from_pointee(initial_state),
            statistics: AtomicStatistics::new(),
        }
    }

    /// Close the queue and discard all pending events
    ///
    /// Events that are posted afterwards are rejected. Returns the
    /// number of discarded events.
    pub(crate) fn discard_pending(&self) -> u64 {
        let mut pending = self.queue.close();
        discard_batch(&self.statistics, &mut pending)
    }
}

impl<M: StateMachine> fmt::Debug for Shared<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("pending", &self.queue.len())
            .field("lifecycle", &self.lifecycle.load())
            .field("statistics", &self.statistics.load())
            .finish_non_exhaustive()
    }
}

pub(crate) fn discard_batch<T>(statistics: &AtomicStatistics, batch: &mut VecDeque<Message<T>>) -> u64 {
    let discarded = batch
        .drain(..)
        .filter(|message| matches!(message, Message::Event(_)))
        .count() as u64;
    statistics.discarded.add(discarded);
    discarded
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        return *message;
    }
    if let Some(message) = panic.downcast_ref::<String>() {
        return message.as_str();
    }
    "<unknown>"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchCompletion {
    /// Wait for the next batch
    Continue,

    /// Exit the event loop
    Shutdown,
}

/// Run the event loop until shut down
///
/// Blocks until events are pending, detaches all of them at once and
/// applies them in order while the queue is unlocked.
///
/// Returns `Ok` after the shutdown sentinel has been received or a
/// shutdown has been requested while applying an event. Returns the
/// error of the first fatal failure otherwise.
///
/// The `batch` buffer must be empty. It still contains the unprocessed
/// events if the event loop unwinds.
pub(crate) fn run_event_loop<M, N>(
    shared: &Shared<M>,
    machine: &mut M,
    notifications: &mut N,
    batch: &mut VecDeque<Message<M::Payload>>,
) -> anyhow::Result<()>
where
    M: StateMachine,
    N: Notifications,
{
    let mut state = shared.snapshot.load_full();
    loop {
        shared.queue.wait_swap_all(batch);
        log::trace!("Processing {} pending event(s)", batch.len());
        let completion = process_batch(shared, machine, notifications, &mut state, batch);
        // Events following a shutdown or fatal failure are never applied
        let discarded = discard_batch(&shared.statistics, batch);
        if discarded > 0 {
            log::debug!("Discarded {} event(s) after shutdown", discarded);
        }
        match completion? {
            BatchCompletion::Continue => (),
            BatchCompletion::Shutdown => return Ok(()),
        }
    }
}

fn process_batch<M, N>(
    shared: &Shared<M>,
    machine: &mut M,
    notifications: &mut N,
    state: &mut Arc<M::State>,
    batch: &mut VecDeque<Message<M::Payload>>,
) -> anyhow::Result<BatchCompletion>
where
    M: StateMachine,
    N: Notifications,
{
    while let Some(message) = batch.pop_front() {
        let event = match message {
            Message::Event(event) => event,
            Message::Shutdown => {
                log::debug!("Received shutdown");
                return Ok(BatchCompletion::Shutdown);
            }
        };
        let mut context = Context::new(&shared.queue);
        // Panics are handled like fatal errors
        let transition = panic::catch_unwind(AssertUnwindSafe(|| {
            machine.transition(&**state, event, &mut context)
        }))
        .unwrap_or_else(|panic| {
            Err(ApplyError::Fatal(anyhow::anyhow!(
                "Panicked while applying event: {}",
                panic_message(&*panic)
            )))
        });
        match transition {
            Ok(Transition::Next(next_state)) => {
                *state = Arc::new(next_state);
                shared.snapshot.store(Arc::clone(state));
                shared.statistics.applied.increment();
            }
            Ok(Transition::Unchanged) => {
                shared.statistics.applied.increment();
            }
            Err(ApplyError::Fatal(err)) => {
                shared.statistics.failed.increment();
                return Err(err);
            }
            Err(err) => {
                shared.statistics.failed.increment();
                log::warn!("Failed to apply event: {}", err);
                notifications.notify_event_failed(&err);
            }
        }
        if context.is_shutdown_requested() {
            log::debug!("Shutdown requested");
            return Ok(BatchCompletion::Shutdown);
        }
    }
    Ok(BatchCompletion::Continue)
}
