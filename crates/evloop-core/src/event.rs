//! Events that are posted to the worker

/// Unit of work
///
/// Events are immutable. Ownership is transferred to the queue when
/// posted and to the worker when dequeued. Each event is applied at
/// most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T> {
    /// Request to start the domain activity
    Start,

    /// Request to stop the domain activity
    ///
    /// Unrelated to the shutdown of the worker!
    Stop,

    /// Domain-specific payload
    Custom(T),
}

impl<T> Event<T> {
    /// Transform the payload of [`Event::Custom`]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Event<U> {
        match self {
            Self::Start => Event::Start,
            Self::Stop => Event::Stop,
            Self::Custom(payload) => Event::Custom(f(payload)),
        }
    }
}

impl<T> From<T> for Event<T> {
    fn from(payload: T) -> Self {
        Self::Custom(payload)
    }
}

/// The message actually queued
///
/// The shutdown sentinel is never passed to the state machine.
#[derive(Debug)]
pub(crate) enum Message<T> {
    Event(Event<T>),
    Shutdown,
}

/// The outcome of applying an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<S> {
    /// Replace the current state
    Next(S),

    /// Keep the current state
    ///
    /// Also the result for events that are not handled in
    /// the current state.
    Unchanged,
}

impl<S> Transition<S> {
    #[must_use]
    pub const fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }
}
