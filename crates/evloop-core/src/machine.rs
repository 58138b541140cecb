use thiserror::Error;

use crate::{
    event::{Event, Message, Transition},
    queue::{EnqueueError, EventQueue},
};

/// Failure while applying a single event
///
/// All variants except [`ApplyError::Fatal`] are recoverable, i.e. the
/// worker reports them and continues with the next event.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The event is not permitted in the current state
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Recoverable(anyhow::Error),

    /// Terminates the worker
    #[error("fatal: {0}")]
    Fatal(anyhow::Error),
}

impl ApplyError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Invocation context while applying an event
///
/// Allows the state machine to post follow-up events and to
/// request the shutdown of the worker.
#[allow(missing_debug_implementations)]
pub struct Context<'a, T> {
    queue: &'a EventQueue<Message<T>>,
    shutdown_requested: bool,
}

impl<'a, T> Context<'a, T> {
    pub(crate) const fn new(queue: &'a EventQueue<Message<T>>) -> Self {
        Self {
            queue,
            shutdown_requested: false,
        }
    }

    /// Post a follow-up event
    ///
    /// The event is processed after all events that are already
    /// pending. Fails if the queue is bounded and full, returning
    /// the rejected event.
    pub fn post_event(&self, event: Event<T>) -> Result<(), EnqueueError<Event<T>>> {
        self.queue.enqueue_map(event, Message::Event)
    }

    /// Terminate the worker after the current event
    ///
    /// All subsequent events are discarded.
    pub fn shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    #[must_use]
    pub const fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }
}

/// Domain logic that is driven by the worker
///
/// All invocations happen on the worker thread. The state machine
/// is moved into the worker thread when started and is recovered
/// after the worker thread has been joined.
pub trait StateMachine {
    /// Domain-specific event payload
    type Payload;

    /// The state that is published as a snapshot after each transition
    type State;

    /// Apply an event to the current state
    ///
    /// Must not block indefinitely, otherwise all subsequent
    /// events are stalled.
    ///
    /// Returning an error leaves the current state untouched.
    fn transition(
        &mut self,
        state: &Self::State,
        event: Event<Self::Payload>,
        context: &mut Context<'_, Self::Payload>,
    ) -> Result<Transition<Self::State>, ApplyError>;
}
