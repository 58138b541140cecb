use std::{num::NonZeroUsize, thread, time::Duration};

use anyhow::Result;
use evloop::{
    core::RecoverableParams, ApplyError, Context, Controller, Event, JoinedThread, Lifecycle,
    Notifications, StateMachine, TerminatedThread, Transition, WorkerConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Light {
    Off,
    Red,
    RedAmber,
    Green,
    Amber,
}

impl Light {
    const fn next(self) -> Self {
        match self {
            Self::Off => Self::Off,
            Self::Red => Self::RedAmber,
            Self::RedAmber => Self::Green,
            Self::Green => Self::Amber,
            Self::Amber => Self::Red,
        }
    }
}

#[derive(Debug)]
enum Signal {
    Tick,
    Emergency,
}

#[derive(Debug, Default)]
struct TrafficLight {
    cycles: usize,
}

impl StateMachine for TrafficLight {
    type Payload = Signal;
    type State = Light;

    fn transition(
        &mut self,
        state: &Light,
        event: Event<Signal>,
        context: &mut Context<'_, Signal>,
    ) -> Result<Transition<Light>, ApplyError> {
        match (state, event) {
            (Light::Off, Event::Start) => Ok(Transition::Next(Light::Red)),
            (_, Event::Start) => Err(ApplyError::rejected("already switched on")),
            (Light::Off, Event::Custom(_)) => Err(ApplyError::rejected("switched off")),
            (_, Event::Stop) => Ok(Transition::Next(Light::Off)),
            (state, Event::Custom(Signal::Tick)) => {
                let next = state.next();
                if next == Light::Red {
                    self.cycles += 1;
                }
                Ok(Transition::Next(next))
            }
            (_, Event::Custom(Signal::Emergency)) => {
                log::warn!("Emergency: Switching off");
                context.shutdown();
                Ok(Transition::Next(Light::Off))
            }
        }
    }
}

#[derive(Debug)]
struct LogNotifications;

impl Notifications for LogNotifications {
    fn notify_lifecycle_changed(&mut self, lifecycle: Lifecycle) {
        log::info!("Lifecycle changed: {:?}", lifecycle);
    }

    fn notify_event_failed(&mut self, err: &ApplyError) {
        log::warn!("Event failed: {}", err);
    }

    fn notify_fault(&mut self, err: &anyhow::Error) {
        log::error!("Fault: {:#}", err);
    }
}

fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();
    log::info!("Starting traffic light example");

    let config = WorkerConfig {
        thread_name: "traffic-light".to_owned(),
        queue_capacity: NonZeroUsize::new(16),
        ..Default::default()
    };
    let controller = Controller::new(
        TrafficLight::default(),
        Light::Off,
        LogNotifications,
        config,
    );
    controller.start()?;
    controller.post_start()?;

    let sender = controller.event_sender();
    let ticker = thread::spawn(move || {
        for _ in 0..12 {
            if let Err(err) = sender.post_event(Signal::Tick) {
                log::warn!("Failed to post tick: {}", err);
                break;
            }
            thread::sleep(Duration::from_millis(50));
        }
    });

    for _ in 0..6 {
        thread::sleep(Duration::from_millis(100));
        log::info!("Current light: {:?}", controller.current_state());
    }
    ticker
        .join()
        .map_err(|_| anyhow::anyhow!("ticker thread panicked"))?;
    controller.post_custom(Signal::Emergency)?;

    let joined = controller.stop()?;
    log::info!(
        "Final light: {:?}, {:?}",
        controller.current_state(),
        controller.statistics()
    );
    match joined {
        JoinedThread::Terminated(TerminatedThread {
            result,
            recovered_params: RecoverableParams { machine, .. },
        }) => {
            result?;
            log::info!("Completed {} cycle(s)", machine.cycles);
        }
        JoinedThread::JoinError(_) => {
            anyhow::bail!("failed to join worker thread");
        }
    }
    Ok(())
}
