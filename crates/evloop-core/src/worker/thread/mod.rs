use std::{
    any::Any,
    collections::VecDeque,
    io,
    panic::{self, AssertUnwindSafe},
    thread::{self, JoinHandle},
};

use anyhow::Result;

use crate::{config::WorkerConfig, machine::StateMachine, sync::Arc};

use super::{discard_batch, panic_message, run_event_loop, Lifecycle, Notifications, Shared};

/// Spawn parameters
///
/// The parameters are passed into the worker thread when spawned
/// and are recovered after joining the worker thread for later reuse.
///
/// If joining the work thread fails these parameters will be lost
/// inevitably!
#[allow(missing_debug_implementations)]
pub struct RecoverableParams<M, N> {
    pub machine: M,
    pub notifications: N,
}

#[derive(Debug)]
pub(crate) struct WorkerThread<M, N> {
    join_handle: JoinHandle<TerminatedThread<M, N>>,
}

#[cfg(all(feature = "with-thread-priority", target_os = "linux"))]
fn adjust_current_thread_priority() {
    use thread_priority::{
        unix::{RealtimeThreadSchedulePolicy, ThreadSchedulePolicy},
        ThreadPriority,
    };
    let thread_id = thread_priority::unix::thread_native_id();
    if let Err(err) = thread_priority::unix::set_thread_priority_and_policy(
        thread_id,
        ThreadPriority::Max,
        // Non-preemptive scheduling (in contrast to RoundRobin)
        ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
    ) {
        log::warn!(
            "Failed to adjust real-time thread priority and policy: {:?}",
            err
        );
        // Fallback: Only maximize the priority
        if let Err(err) = thread_priority::set_current_thread_priority(ThreadPriority::Max) {
            log::warn!("Failed to adjust thread priority: {:?}", err);
        }
    }
}

#[cfg(all(feature = "with-thread-priority", not(target_os = "linux")))]
fn adjust_current_thread_priority() {
    if let Err(err) =
        thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Max)
    {
        log::warn!("Failed to adjust thread priority: {:?}", err);
    }
}

#[cfg(not(feature = "with-thread-priority"))]
fn adjust_current_thread_priority() {
    log::warn!("Adjusting the thread priority requires the feature \"with-thread-priority\"");
}

/// Notifications that panic after the event loop has terminated
/// are only logged
fn notify_contained(action: &str, notify: impl FnOnce()) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(notify)) {
        log::error!(
            "Panicked while notifying about {}: {}",
            action,
            panic_message(&*panic)
        );
    }
}

fn thread_fn<M, N>(shared: &Shared<M>, recoverable_params: &mut RecoverableParams<M, N>) -> Result<()>
where
    M: StateMachine,
    N: Notifications,
{
    let RecoverableParams {
        machine,
        notifications,
    } = recoverable_params;

    // Owned outside of the unwind boundary for discarding
    // the remaining events after a panic
    let mut batch = VecDeque::new();

    log::info!("Running");
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        notifications.notify_lifecycle_changed(Lifecycle::Running);
        run_event_loop(shared, machine, notifications, &mut batch)
    }))
    .unwrap_or_else(|panic| {
        Err(anyhow::anyhow!(
            "Panicked while processing events: {}",
            panic_message(&*panic)
        ))
    });
    let discarded = discard_batch(&shared.statistics, &mut batch);
    if discarded > 0 {
        log::debug!("Discarded {} event(s) after panic", discarded);
    }

    // Stop accepting new events, even if stop() has not been invoked yet
    let _ = shared.lifecycle.drain();
    log::info!("Draining");
    notify_contained("draining", || {
        notifications.notify_lifecycle_changed(Lifecycle::Draining);
    });

    if let Err(err) = &result {
        log::error!("Event loop terminated unexpectedly: {:#}", err);
        notify_contained("reporting the fault", || notifications.notify_fault(err));
    }

    log::info!("Exiting");
    result
}

/// Outcome of [`WorkerThread::join()`]
#[allow(missing_debug_implementations)]
pub struct TerminatedThread<M, N> {
    /// The result of the thread function
    ///
    /// Contains the fault if the worker has been terminated
    /// unexpectedly.
    pub result: Result<()>,

    /// The recovered parameters
    pub recovered_params: RecoverableParams<M, N>,
}

/// Outcome of [`WorkerThread::join()`]
#[allow(missing_debug_implementations)]
pub enum JoinedThread<M, N> {
    Terminated(TerminatedThread<M, N>),
    JoinError(Box<dyn Any + Send + 'static>),
}

impl<M, N> JoinedThread<M, N> {
    /// Recover the parameters or fail with the fault
    ///
    /// Discards the recovered parameters of a faulty worker.
    pub fn into_result(self) -> Result<RecoverableParams<M, N>> {
        match self {
            Self::Terminated(TerminatedThread {
                result,
                recovered_params,
            }) => result.map(|()| recovered_params),
            Self::JoinError(err) => Err(anyhow::anyhow!(
                "Failed to join worker thread: {}",
                panic_message(&*err)
            )),
        }
    }
}

impl<M, N> WorkerThread<M, N>
where
    M: StateMachine + Send + 'static,
    M::Payload: Send + 'static,
    M::State: Send + Sync + 'static,
    N: Notifications + Send + 'static,
{
    pub(crate) fn spawn(
        config: &WorkerConfig,
        shared: Arc<Shared<M>>,
        recoverable_params: RecoverableParams<M, N>,
    ) -> io::Result<Self> {
        let adjust_thread_priority = config.adjust_thread_priority;
        let join_handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                if adjust_thread_priority {
                    adjust_current_thread_priority();
                }
                // The function parameters need to be mutable within the worker thread
                let mut recoverable_params = recoverable_params;
                let result = thread_fn(&shared, &mut recoverable_params);
                let recovered_params = recoverable_params;
                TerminatedThread {
                    result,
                    recovered_params,
                }
            })?;
        Ok(Self { join_handle })
    }
}

impl<M, N> WorkerThread<M, N> {
    pub(crate) fn join(self) -> JoinedThread<M, N> {
        let Self { join_handle } = self;
        join_handle
            .join()
            .map(JoinedThread::Terminated)
            .unwrap_or_else(JoinedThread::JoinError)
    }
}
