//! Fixtures for unit tests

use anyhow::anyhow;

use crate::{
    event::{Event, Transition},
    machine::{ApplyError, Context, StateMachine},
    worker::{Lifecycle, Notifications},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Counter {
    pub(crate) started: bool,
    pub(crate) value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Add(i64),
    InvalidArgument,
    Fatal,
    Panic,
    /// Post `Add` as a follow-up event
    FollowUp(i64),
    /// Post `Shutdown` as a follow-up event
    FollowUpShutdown,
    Shutdown,
}

#[derive(Debug, Default)]
pub(crate) struct CounterMachine {
    pub(crate) transitions: usize,
}

impl StateMachine for CounterMachine {
    type Payload = Command;
    type State = Counter;

    fn transition(
        &mut self,
        state: &Counter,
        event: Event<Command>,
        context: &mut Context<'_, Command>,
    ) -> Result<Transition<Counter>, ApplyError> {
        self.transitions += 1;
        let command = match (state.started, event) {
            (false, Event::Start) => {
                return Ok(Transition::Next(Counter {
                    started: true,
                    ..state.clone()
                }));
            }
            (true, Event::Start) => return Err(ApplyError::rejected("already started")),
            (true, Event::Stop) => {
                return Ok(Transition::Next(Counter {
                    started: false,
                    ..state.clone()
                }));
            }
            (false, Event::Stop | Event::Custom(_)) => return Ok(Transition::Unchanged),
            (true, Event::Custom(command)) => command,
        };
        match command {
            Command::Add(delta) => Ok(Transition::Next(Counter {
                value: state.value + delta,
                ..state.clone()
            })),
            Command::InvalidArgument => Err(ApplyError::invalid_argument("invalid")),
            Command::Fatal => Err(ApplyError::Fatal(anyhow!("fatal"))),
            Command::Panic => panic!("panic"),
            Command::FollowUp(delta) => {
                context
                    .post_event(Event::Custom(Command::Add(delta)))
                    .map_err(|err| ApplyError::rejected(err.to_string()))?;
                Ok(Transition::Unchanged)
            }
            Command::FollowUpShutdown => {
                context
                    .post_event(Event::Custom(Command::Shutdown))
                    .map_err(|err| ApplyError::rejected(err.to_string()))?;
                Ok(Transition::Unchanged)
            }
            Command::Shutdown => {
                context.shutdown();
                Ok(Transition::Unchanged)
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingNotifications {
    pub(crate) lifecycle: Vec<Lifecycle>,
    pub(crate) failed_events: Vec<String>,
    pub(crate) faults: Vec<String>,
}

impl Notifications for RecordingNotifications {
    fn notify_lifecycle_changed(&mut self, lifecycle: Lifecycle) {
        self.lifecycle.push(lifecycle);
    }

    fn notify_event_failed(&mut self, error: &ApplyError) {
        self.failed_events.push(error.to_string());
    }

    fn notify_fault(&mut self, fault: &anyhow::Error) {
        self.faults.push(fault.to_string());
    }
}

/// Panics when notified about a failed event
#[derive(Debug, Default)]
pub(crate) struct PanickingNotifications {
    pub(crate) recorded: RecordingNotifications,
}

impl Notifications for PanickingNotifications {
    fn notify_lifecycle_changed(&mut self, lifecycle: Lifecycle) {
        self.recorded.notify_lifecycle_changed(lifecycle);
    }

    fn notify_event_failed(&mut self, error: &ApplyError) {
        self.recorded.notify_event_failed(error);
        panic!("notification failed");
    }

    fn notify_fault(&mut self, fault: &anyhow::Error) {
        self.recorded.notify_fault(fault);
    }
}
