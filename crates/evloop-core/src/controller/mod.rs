use std::{fmt, io, mem};

use thiserror::Error;

use crate::{
    config::WorkerConfig,
    event::{Event, Message},
    machine::StateMachine,
    queue::{EnqueueError, EventQueue},
    sync::{
        atomic::{AtomicState as _, SwitchAtomicStateOk},
        Arc, Mutex,
    },
    worker::{
        thread::{JoinedThread, RecoverableParams, TerminatedThread, WorkerThread},
        Lifecycle, Notifications, Shared, Statistics,
    },
};

/// Contract violations and rejected events
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("not started")]
    NotStarted,

    #[error("already started")]
    AlreadyStarted,

    #[error("shutting down")]
    ShuttingDown,

    #[error("stopped")]
    Stopped,

    #[error("queue capacity of {capacity} exhausted")]
    QueueFull { capacity: usize },

    #[error("failed to spawn worker thread")]
    Spawn(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ControlError>;

fn accept_events(lifecycle: Lifecycle) -> Result<()> {
    match lifecycle {
        Lifecycle::NotStarted => Err(ControlError::NotStarted),
        Lifecycle::Running => Ok(()),
        Lifecycle::Draining => Err(ControlError::ShuttingDown),
        Lifecycle::Stopped => Err(ControlError::Stopped),
    }
}

fn post_event<M: StateMachine>(shared: &Shared<M>, event: Event<M::Payload>) -> Result<()> {
    accept_events(shared.lifecycle.load())?;
    shared
        .queue
        .enqueue_map(event, Message::Event)
        .map_err(|err| match err {
            EnqueueError::Full { capacity, .. } => ControlError::QueueFull { capacity },
            // Stopped concurrently
            EnqueueError::Closed { .. } => ControlError::Stopped,
        })
}

/// Posts events from arbitrary threads
///
/// Can be cloned and passed to producer threads independent of the
/// [`Controller`]. Events posted after the worker has been stopped
/// are rejected.
pub struct EventSender<M: StateMachine> {
    shared: Arc<Shared<M>>,
}

impl<M: StateMachine> Clone for EventSender<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: StateMachine> fmt::Debug for EventSender<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("shared", &self.shared)
            .finish()
    }
}

impl<M: StateMachine> EventSender<M> {
    /// Post an event without blocking
    pub fn post_event(&self, event: impl Into<Event<M::Payload>>) -> Result<()> {
        post_event(&self.shared, event.into())
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.lifecycle.load()
    }
}

enum WorkerSlot<M, N> {
    Pending(RecoverableParams<M, N>),
    Spawned(WorkerThread<M, N>),
    Joined,
}

/// Public facade of the worker
///
/// Owns the event queue, the worker thread, and the state machine.
/// The state machine is moved into the worker thread when started
/// and handed back when stopped. It is never accessible from any
/// other thread while the worker is running.
///
/// Call order: [`Controller::start()`] once, then post events, then
/// [`Controller::stop()`] once. Dropping a running controller stops
/// the worker implicitly.
pub struct Controller<M: StateMachine, N: Notifications = ()> {
    config: WorkerConfig,
    shared: Arc<Shared<M>>,
    worker: Mutex<WorkerSlot<M, N>>,
}

impl<M: StateMachine, N: Notifications> fmt::Debug for Controller<M, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

impl<M: StateMachine> Controller<M> {
    /// Create a controller with default configuration and without
    /// notifications
    pub fn with_default_config(machine: M, initial_state: M::State) -> Self {
        Self::new(machine, initial_state, (), WorkerConfig::default())
    }
}

impl<M: StateMachine, N: Notifications> Controller<M, N> {
    pub fn new(
        machine: M,
        initial_state: M::State,
        notifications: N,
        config: WorkerConfig,
    ) -> Self {
        let queue = EventQueue::new(config.queue_capacity);
        let shared = Arc::new(Shared::new(initial_state, queue));
        let worker = Mutex::new(WorkerSlot::Pending(RecoverableParams {
            machine,
            notifications,
        }));
        Self {
            config,
            shared,
            worker,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.lifecycle.load()
    }

    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.shared.statistics.load()
    }

    /// Snapshot of the current state
    ///
    /// Reflects the state after the most recently completed transition.
    #[must_use]
    pub fn current_state(&self) -> Arc<M::State> {
        self.shared.snapshot.load_full()
    }

    /// Post an event without blocking
    ///
    /// Fails if the worker is not running or if the queue is bounded
    /// and full.
    pub fn post_event(&self, event: impl Into<Event<M::Payload>>) -> Result<()> {
        post_event(&self.shared, event.into())
    }

    pub fn post_start(&self) -> Result<()> {
        self.post_event(Event::Start)
    }

    pub fn post_stop(&self) -> Result<()> {
        self.post_event(Event::Stop)
    }

    pub fn post_custom(&self, payload: M::Payload) -> Result<()> {
        self.post_event(Event::Custom(payload))
    }

    #[must_use]
    pub fn event_sender(&self) -> EventSender<M> {
        EventSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Shut down and join the worker thread
    ///
    /// All events that have been posted before are applied. Events
    /// posted concurrently or afterwards are discarded.
    ///
    /// Always returns after the worker thread has been joined, even
    /// if it terminated unexpectedly. The fault is then contained
    /// in the returned outcome.
    pub fn stop(&self) -> Result<JoinedThread<M, N>> {
        // Holding the lock while joining serializes concurrent invocations
        let mut worker = self.worker.lock();
        let worker_thread = match mem::replace(&mut *worker, WorkerSlot::Joined) {
            WorkerSlot::Spawned(worker_thread) => worker_thread,
            WorkerSlot::Pending(recoverable_params) => {
                *worker = WorkerSlot::Pending(recoverable_params);
                return Err(ControlError::NotStarted);
            }
            WorkerSlot::Joined => {
                return Err(ControlError::Stopped);
            }
        };
        if let Ok(SwitchAtomicStateOk::Accepted { .. }) = self.shared.lifecycle.drain() {
            log::debug!("Shutting down");
        }
        // The sentinel must be accepted even if the queue is full
        if self.shared.queue.enqueue_unbounded(Message::Shutdown).is_err() {
            log::warn!("Event queue has already been closed");
        }
        log::debug!("Joining worker thread");
        let mut joined = worker_thread.join();
        let discarded = self.shared.discard_pending();
        if discarded > 0 {
            log::debug!("Discarded {} pending event(s)", discarded);
        }
        self.shared.lifecycle.stop();
        log::info!("Stopped");
        if let JoinedThread::Terminated(TerminatedThread {
            recovered_params, ..
        }) = &mut joined
        {
            recovered_params
                .notifications
                .notify_lifecycle_changed(Lifecycle::Stopped);
        }
        Ok(joined)
    }
}

impl<M, N> Controller<M, N>
where
    M: StateMachine + Send + 'static,
    M::Payload: Send + 'static,
    M::State: Send + Sync + 'static,
    N: Notifications + Send + 'static,
{
    /// Spawn the worker thread
    ///
    /// Can only be invoked once.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        let recoverable_params = match mem::replace(&mut *worker, WorkerSlot::Joined) {
            WorkerSlot::Pending(recoverable_params) => recoverable_params,
            WorkerSlot::Spawned(worker_thread) => {
                *worker = WorkerSlot::Spawned(worker_thread);
                return Err(ControlError::AlreadyStarted);
            }
            WorkerSlot::Joined => {
                return Err(ControlError::Stopped);
            }
        };
        if let Err(err) = self.shared.lifecycle.start() {
            log::warn!("Unexpected lifecycle when starting: {:?}", err);
        }
        log::info!("Starting worker thread {:?}", self.config.thread_name);
        match WorkerThread::spawn(&self.config, Arc::clone(&self.shared), recoverable_params) {
            Ok(worker_thread) => {
                *worker = WorkerSlot::Spawned(worker_thread);
                Ok(())
            }
            Err(err) => {
                log::error!("Failed to spawn worker thread: {}", err);
                self.shared.lifecycle.stop();
                Err(err.into())
            }
        }
    }
}

impl<M: StateMachine, N: Notifications> Drop for Controller<M, N> {
    fn drop(&mut self) {
        if !matches!(self.worker.get_mut(), WorkerSlot::Spawned(_)) {
            return;
        }
        log::debug!("Stopping worker thread implicitly");
        match self.stop() {
            Ok(JoinedThread::Terminated(TerminatedThread { result, .. })) => {
                if let Err(err) = result {
                    log::warn!("Worker thread terminated with error: {:#}", err);
                }
            }
            Ok(JoinedThread::JoinError(_)) => {
                log::error!("Failed to join worker thread");
            }
            Err(err) => {
                log::warn!("Failed to stop worker thread: {}", err);
            }
        }
    }
}
